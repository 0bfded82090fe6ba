//! Failures stay scoped to the period, kind or cycle they happen in.

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use serde_json::json;

use strata_core::{
    EngineConfig, GraphStore, MemoryGraphStore, Orchestrator, Period, PeriodError, RawRecord,
    RecordKind, Tier,
};

fn utc(d: u32, h: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 7, d, h, 0, 0).unwrap()
}

async fn ingest(store: &MemoryGraphStore, id: &str, kind: RecordKind, at: DateTime<Utc>, payload: serde_json::Value) {
    let record = RawRecord::new(id, kind, at, payload);
    store.upsert_node(record.to_node()).await.unwrap();
}

async fn seeded_store() -> Arc<MemoryGraphStore> {
    let store = Arc::new(MemoryGraphStore::new());
    let tokens = |v: f64| json!({"metric_name": "llm.tokens.total", "value": v});
    ingest(&store, "m-0706", RecordKind::Metrics, utc(6, 10), tokens(40.0)).await;
    for (i, value) in [100.0, 150.0, 80.0, 120.0].into_iter().enumerate() {
        let at = utc(7, i as u32 * 6 + 1);
        ingest(&store, &format!("m-0707-{i}"), RecordKind::Metrics, at, tokens(value)).await;
    }
    store
}

fn count(errors: &[PeriodError], kind: RecordKind, tier: Tier) -> usize {
    errors
        .iter()
        .filter(|e| e.kind == Some(kind) && e.tier == tier)
        .count()
}

#[tokio::test]
async fn test_unavailable_store_defers_everything() {
    let store = seeded_store().await;
    let engine = Orchestrator::new(store.clone(), EngineConfig::default());
    let nodes_before = store.node_count();

    store.set_available(false);
    let report = engine.run_cycle(utc(8, 1)).await;
    assert_eq!(report.periods_processed, 0);
    assert_eq!(report.summaries_created, 0);
    assert_eq!(report.edges_created, 0);
    assert_eq!(report.nodes_purged, 0);
    assert!(!report.is_clean());
    assert!(report.errors.iter().all(|e| e.message.contains("unavailable")));

    // Each lineage gives up after its first unavailable error.
    assert_eq!(count(&report.errors, RecordKind::Metrics, Tier::Daily), 1);
    assert_eq!(count(&report.errors, RecordKind::Audit, Tier::Basic), 1);

    let keys: Vec<_> = report
        .errors
        .iter()
        .map(|e| (e.tier, e.kind, e.period_label.clone()))
        .collect();
    let mut sorted = keys.clone();
    sorted.sort();
    assert_eq!(keys, sorted);

    store.set_available(true);
    assert_eq!(store.node_count(), nodes_before);
    let recovered = engine.run_cycle(utc(8, 1)).await;
    assert!(recovered.is_clean(), "{:?}", recovered.errors);
    assert_eq!(recovered.summaries_created, 8);
    assert_eq!(recovered.edges_created, 10);
}

#[tokio::test]
async fn test_edge_failure_keeps_the_summary() {
    let store = seeded_store().await;
    let engine = Orchestrator::new(store.clone(), EngineConfig::default());

    store.fail_edge_writes(true);
    let report = engine.run_cycle(utc(8, 1)).await;
    assert_eq!(report.summaries_created, 8);
    assert_eq!(report.edges_created, 0);
    assert!(!report.is_clean());
    assert!(report
        .errors
        .iter()
        .all(|e| e.kind == Some(RecordKind::Metrics)));
    assert_eq!(store.edge_count(), 0);
    assert!(store
        .exists_node(&"metrics_summary_daily_20250707".into())
        .await
        .unwrap());

    store.fail_edge_writes(false);
    let retry = engine.run_cycle(utc(8, 1)).await;
    assert!(retry.is_clean(), "{:?}", retry.errors);
    assert_eq!(retry.summaries_created, 0);
    assert_eq!(retry.edges_created, 10);
}

#[tokio::test]
async fn test_overflow_fails_only_its_own_period() {
    let store = Arc::new(MemoryGraphStore::new());
    let message = |tokens: u64| json!({"channel_id": "ops", "role": "agent", "tokens": tokens});
    ingest(&store, "c1", RecordKind::Conversations, utc(7, 1), message(u64::MAX)).await;
    ingest(&store, "c2", RecordKind::Conversations, utc(7, 2), message(1)).await;
    ingest(&store, "c3", RecordKind::Conversations, utc(7, 8), message(5)).await;
    ingest(
        &store,
        "m1",
        RecordKind::Metrics,
        utc(7, 1),
        json!({"metric_name": "llm.tokens.total", "value": 3.0}),
    )
    .await;
    let engine = Orchestrator::new(store.clone(), EngineConfig::default());

    for _ in 0..2 {
        let report = engine.run_cycle(utc(8, 1)).await;
        assert_eq!(report.errors.len(), 1, "{:?}", report.errors);
        let err = &report.errors[0];
        assert_eq!(err.kind, Some(RecordKind::Conversations));
        assert_eq!(err.tier, Tier::Basic);
        assert_eq!(err.period_label, "2025-07-07T00");
        assert!(err.message.contains("overflow"));
    }

    let broken = Period::containing(Tier::Basic, utc(7, 1)).unwrap();
    assert!(!engine
        .consolidation_status(RecordKind::Conversations, &broken)
        .await
        .unwrap());
    let healthy = Period::containing(Tier::Basic, utc(7, 8)).unwrap();
    assert!(engine
        .consolidation_status(RecordKind::Conversations, &healthy)
        .await
        .unwrap());
    assert!(engine
        .consolidation_status(RecordKind::Metrics, &broken)
        .await
        .unwrap());
}
