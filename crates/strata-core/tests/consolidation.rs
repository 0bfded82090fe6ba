//! Aggregation semantics of the consolidators, exercised without a store.

use chrono::{DateTime, TimeZone, Utc};
use serde_json::json;

use strata_core::consolidate::{ConversationsSummary, TOKENS_TOTAL};
use strata_core::{
    consolidate, ConsolidationError, Inputs, Period, RawRecord, RecordKind, SummaryData,
    SummaryNode, Tier,
};

fn utc(d: u32, h: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 7, d, h, 0, 0).unwrap()
}

fn tokens(id: &str, at: DateTime<Utc>, value: f64) -> RawRecord {
    RawRecord::new(
        id,
        RecordKind::Metrics,
        at,
        json!({"metric_name": TOKENS_TOTAL, "value": value}),
    )
}

/// Basic summary of the block containing `at`, holding the given records.
fn basic(kind: RecordKind, at: DateTime<Utc>, records: Vec<RawRecord>) -> SummaryNode {
    let period = Period::containing(Tier::Basic, at).unwrap();
    consolidate(kind, Tier::Basic, &period, &Inputs::Raw(records))
        .unwrap()
        .summary
        .unwrap()
}

fn metrics(summary: &SummaryNode) -> &strata_core::consolidate::MetricsSummary {
    summary.data.as_metrics().unwrap()
}

#[test]
fn test_daily_token_total_is_sum_of_basic_totals() {
    let values = [100.0, 150.0, 80.0, 120.0];
    let basics: Vec<SummaryNode> = values
        .iter()
        .enumerate()
        .map(|(i, v)| {
            let at = utc(7, i as u32 * 6 + 1);
            basic(RecordKind::Metrics, at, vec![tokens(&format!("r{i}"), at, *v)])
        })
        .collect();

    let nodes = basics.iter().map(|s| s.to_node().unwrap()).collect();
    let day = Period::containing(Tier::Daily, utc(7, 0)).unwrap();
    let daily = consolidate(RecordKind::Metrics, Tier::Daily, &day, &Inputs::Summaries(nodes))
        .unwrap()
        .summary
        .unwrap();

    assert_eq!(daily.id.as_str(), "metrics_summary_daily_20250707");
    assert_eq!(metrics(&daily).resources.tokens, 450.0);
    assert_eq!(daily.source_count, 4);
    assert_eq!(daily.record_count, 4);
    assert_eq!(daily.first_record_at, utc(7, 1));
    assert_eq!(daily.last_record_at, utc(7, 19));
}

#[test]
fn test_rates_are_recomputed_not_averaged() {
    // 60 tokens in one 6h block and none in the others: 10/h for the block,
    // 2.5/h for the day.
    let at = utc(7, 2);
    let block = basic(RecordKind::Metrics, at, vec![tokens("r", at, 60.0)]);
    assert_eq!(metrics(&block).tokens_per_hour, 10.0);

    let day = Period::containing(Tier::Daily, at).unwrap();
    let daily = consolidate(
        RecordKind::Metrics,
        Tier::Daily,
        &day,
        &Inputs::Summaries(vec![block.to_node().unwrap()]),
    )
    .unwrap()
    .summary
    .unwrap();
    assert_eq!(metrics(&daily).tokens_per_hour, 2.5);
}

#[test]
fn test_partial_day_still_consolidates() {
    let first = basic(RecordKind::Metrics, utc(7, 1), vec![tokens("a", utc(7, 1), 10.0)]);
    let third = basic(RecordKind::Metrics, utc(7, 13), vec![tokens("b", utc(7, 13), 5.0)]);
    let day = Period::containing(Tier::Daily, utc(7, 0)).unwrap();

    let daily = consolidate(
        RecordKind::Metrics,
        Tier::Daily,
        &day,
        &Inputs::Summaries(vec![first.to_node().unwrap(), third.to_node().unwrap()]),
    )
    .unwrap()
    .summary
    .unwrap();
    assert_eq!(daily.source_count, 2);
    assert_eq!(metrics(&daily).resources.tokens, 15.0);
}

#[test]
fn test_invalid_records_are_skipped_and_counted() {
    let at = utc(7, 3);
    let period = Period::containing(Tier::Basic, at).unwrap();
    let records = vec![
        tokens("good", at, 7.0),
        RawRecord::new("no-value", RecordKind::Metrics, at, json!({"metric_name": "x"})),
        RawRecord::new(
            "empty-name",
            RecordKind::Metrics,
            at,
            json!({"metric_name": " ", "value": 1.0}),
        ),
    ];

    let result =
        consolidate(RecordKind::Metrics, Tier::Basic, &period, &Inputs::Raw(records)).unwrap();
    assert_eq!(result.skipped, 2);
    let summary = result.summary.unwrap();
    assert_eq!(summary.source_count, 1);
    assert_eq!(metrics(&summary).resources.tokens, 7.0);
}

#[test]
fn test_no_valid_inputs_means_no_summary() {
    let at = utc(7, 3);
    let period = Period::containing(Tier::Basic, at).unwrap();

    let empty = consolidate(RecordKind::Audit, Tier::Basic, &period, &Inputs::Raw(vec![])).unwrap();
    assert!(empty.summary.is_none());
    assert_eq!(empty.skipped, 0);

    let junk = vec![RawRecord::new("j", RecordKind::Audit, at, json!({"actor": "x"}))];
    let result = consolidate(RecordKind::Audit, Tier::Basic, &period, &Inputs::Raw(junk)).unwrap();
    assert!(result.summary.is_none());
    assert_eq!(result.skipped, 1);
}

#[test]
fn test_identical_inputs_give_identical_summaries() {
    let at = utc(7, 8);
    let records = || {
        vec![
            RawRecord::new(
                "t1",
                RecordKind::Traces,
                at,
                json!({"trace_id": "a", "component": "planner", "duration_ms": 12.5}),
            ),
            RawRecord::new(
                "t2",
                RecordKind::Traces,
                at,
                json!({"trace_id": "a", "component": "tools", "duration_ms": 3.0, "status": "error"}),
            ),
        ]
    };
    let a = basic(RecordKind::Traces, at, records());
    let b = basic(RecordKind::Traces, at, records());

    assert_eq!(a.content_digest, b.content_digest);
    assert_eq!(
        serde_json::to_vec(&a.to_node().unwrap()).unwrap(),
        serde_json::to_vec(&b.to_node().unwrap()).unwrap()
    );
}

#[test]
fn test_overflow_fails_the_period_without_a_summary() {
    let day = Period::containing(Tier::Daily, utc(7, 0)).unwrap();
    let huge = |h: u32| {
        let period = Period::containing(Tier::Basic, utc(7, h)).unwrap();
        SummaryNode::new(
            RecordKind::Conversations,
            Tier::Basic,
            period.clone(),
            SummaryData::Conversations(ConversationsSummary {
                message_count: 1,
                total_tokens: u64::MAX - 1,
                ..Default::default()
            }),
            1,
            1,
            period.start,
            period.start,
        )
        .unwrap()
        .to_node()
        .unwrap()
    };

    let err = consolidate(
        RecordKind::Conversations,
        Tier::Daily,
        &day,
        &Inputs::Summaries(vec![huge(0), huge(6)]),
    )
    .unwrap_err();
    assert!(matches!(err, ConsolidationError::Aggregation(_)));
}

#[test]
fn test_monthly_reads_daily_summaries() {
    let at = utc(31, 20);
    let block = basic(RecordKind::Metrics, at, vec![tokens("r", at, 9.0)]);
    let day = Period::containing(Tier::Daily, at).unwrap();
    let daily = consolidate(
        RecordKind::Metrics,
        Tier::Daily,
        &day,
        &Inputs::Summaries(vec![block.to_node().unwrap()]),
    )
    .unwrap()
    .summary
    .unwrap();

    let july = Period::containing(Tier::Monthly, at).unwrap();
    let monthly = consolidate(
        RecordKind::Metrics,
        Tier::Monthly,
        &july,
        &Inputs::Summaries(vec![daily.to_node().unwrap()]),
    )
    .unwrap()
    .summary
    .unwrap();
    assert_eq!(monthly.id.as_str(), "metrics_summary_monthly_20250701");
    assert_eq!(metrics(&monthly).resources.tokens, 9.0);

    // Basic summaries are not monthly inputs.
    let skipped = consolidate(
        RecordKind::Metrics,
        Tier::Monthly,
        &july,
        &Inputs::Summaries(vec![block.to_node().unwrap()]),
    )
    .unwrap();
    assert!(skipped.summary.is_none());
    assert_eq!(skipped.skipped, 1);
}

#[test]
fn test_mismatched_tier_is_rejected() {
    let day = Period::containing(Tier::Daily, utc(7, 0)).unwrap();
    let err = consolidate(RecordKind::Metrics, Tier::Basic, &day, &Inputs::Raw(vec![])).unwrap_err();
    assert!(matches!(err, ConsolidationError::InvalidPeriod(_)));

    let err =
        consolidate(RecordKind::Metrics, Tier::Daily, &day, &Inputs::Raw(vec![])).unwrap_err();
    assert!(matches!(err, ConsolidationError::InvalidPeriod(_)));
}
