//! Temporal chains and same-day cross links.

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use serde_json::{json, Value};

use strata_core::{
    consolidate, EdgeManager, EngineConfig, GraphStore, Inputs, MemoryGraphStore, Orchestrator,
    Period, RawRecord, RecordKind, SummaryNode, Tier,
};
use strata_store::{EdgeRelation, GraphEdge};

fn utc(d: u32, h: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 7, d, h, 0, 0).unwrap()
}

fn payload(kind: RecordKind) -> Value {
    match kind {
        RecordKind::Metrics => json!({"metric_name": "llm.tokens.total", "value": 10.0}),
        RecordKind::Audit => json!({"action": "deploy", "actor": "ci", "outcome": "success"}),
        RecordKind::Traces => json!({"trace_id": "t", "component": "planner", "duration_ms": 4.0}),
        RecordKind::Conversations => json!({"channel_id": "c", "role": "user", "tokens": 3}),
        RecordKind::Tasks => json!({"task_id": "k", "status": "done"}),
    }
}

async fn ingest(store: &MemoryGraphStore, kind: RecordKind, at: DateTime<Utc>) {
    let id = format!("{kind}-{}", at.format("%d%H"));
    let record = RawRecord::new(id, kind, at, payload(kind));
    store.upsert_node(record.to_node()).await.unwrap();
}

fn daily_edges(store: &MemoryGraphStore, relation: EdgeRelation) -> Vec<GraphEdge> {
    store
        .edges_with_relation(relation)
        .into_iter()
        .filter(|e| e.source_id.as_str().starts_with("metrics_summary_daily_"))
        .collect()
}

/// Basic summary of the block containing `at`, written straight to the store.
async fn write_basic(store: &MemoryGraphStore, at: DateTime<Utc>) -> SummaryNode {
    let period = Period::containing(Tier::Basic, at).unwrap();
    let record = RawRecord::new(
        format!("r{}", at.timestamp()),
        RecordKind::Metrics,
        at,
        payload(RecordKind::Metrics),
    );
    let summary = consolidate(RecordKind::Metrics, Tier::Basic, &period, &Inputs::Raw(vec![record]))
        .unwrap()
        .summary
        .unwrap();
    store.upsert_node(summary.to_node().unwrap()).await.unwrap();
    summary
}

#[tokio::test]
async fn test_consecutive_days_form_one_chain() {
    let store = Arc::new(MemoryGraphStore::new());
    for day in 1..=5 {
        ingest(&store, RecordKind::Metrics, utc(day, 12)).await;
    }
    let engine = Orchestrator::new(store.clone(), EngineConfig::default());
    engine.run_cycle(utc(6, 1)).await;

    let prev = daily_edges(&store, EdgeRelation::TemporalPrev);
    let next = daily_edges(&store, EdgeRelation::TemporalNext);
    assert_eq!(prev.len(), 4);
    assert_eq!(next.len(), 4);

    for edge in &prev {
        let back = store.edges_from(&edge.target_id).await.unwrap();
        assert!(back
            .iter()
            .any(|e| e.relation == EdgeRelation::TemporalNext && e.target_id == edge.source_id));
        assert!(edge.source_id > edge.target_id);
        assert_eq!(edge.attributes["days_apart"], 1);
        assert_eq!(edge.attributes["tier"], "daily");
    }
}

#[tokio::test]
async fn test_out_of_order_backfill_links_both_sides() {
    let store = Arc::new(MemoryGraphStore::new());
    for day in [7, 8, 9] {
        ingest(&store, RecordKind::Metrics, utc(day, 12)).await;
    }
    let engine = Orchestrator::new(store.clone(), EngineConfig::default());
    let now = utc(12, 0);

    engine.backfill(utc(9, 0), utc(10, 0), now).await;
    engine.backfill(utc(7, 0), utc(8, 0), now).await;
    // The 7th reached forward to the 9th across the gap.
    assert_eq!(daily_edges(&store, EdgeRelation::TemporalNext).len(), 1);

    let report = engine.backfill(utc(8, 0), utc(9, 0), now).await;
    assert!(report.is_clean());

    let middle = store
        .edges_from(&"metrics_summary_daily_20250708".into())
        .await
        .unwrap();
    let targets: Vec<(EdgeRelation, &str)> = middle
        .iter()
        .map(|e| (e.relation, e.target_id.as_str()))
        .collect();
    assert!(targets.contains(&(EdgeRelation::TemporalPrev, "metrics_summary_daily_20250707")));
    assert!(targets.contains(&(EdgeRelation::TemporalNext, "metrics_summary_daily_20250709")));

    let incoming = store
        .edges_to(&"metrics_summary_daily_20250708".into())
        .await
        .unwrap();
    assert_eq!(incoming.len(), 2);
    // The gap-spanning pair between the 7th and the 9th is gone.
    assert_eq!(daily_edges(&store, EdgeRelation::TemporalNext).len(), 2);
    assert_eq!(daily_edges(&store, EdgeRelation::TemporalPrev).len(), 2);
}

#[tokio::test]
async fn test_backfill_never_purges() {
    let store = Arc::new(MemoryGraphStore::new());
    ingest(&store, RecordKind::Metrics, utc(1, 3)).await;
    let engine = Orchestrator::new(store.clone(), EngineConfig::default());

    let report = engine.backfill(utc(1, 0), utc(2, 0), utc(28, 0)).await;
    assert_eq!(report.nodes_purged, 0);
    assert_eq!(store.nodes_of_type("raw.metrics").len(), 1);
    assert_eq!(store.nodes_of_type("summary.metrics.daily").len(), 1);
}

#[tokio::test]
async fn test_same_day_links_every_pair_once() {
    let store = Arc::new(MemoryGraphStore::new());
    let kinds = [
        RecordKind::Metrics,
        RecordKind::Audit,
        RecordKind::Traces,
        RecordKind::Tasks,
    ];
    for kind in kinds {
        ingest(&store, kind, utc(7, 3)).await;
    }
    let engine = Orchestrator::new(store.clone(), EngineConfig::default());
    engine.run_cycle(utc(8, 1)).await;

    let same_day = store.edges_with_relation(EdgeRelation::SameDaySummary);
    assert_eq!(same_day.len(), 6);
    for edge in &same_day {
        assert!(edge.source_id < edge.target_id);
        assert!(edge.source_id.as_str().contains("_summary_daily_"));
        assert_eq!(edge.attributes["date"], "2025-07-07");
    }

    let again = engine.run_cycle(utc(8, 1)).await;
    assert_eq!(again.edges_created, 0);
    assert_eq!(store.edges_with_relation(EdgeRelation::SameDaySummary).len(), 6);
}

#[tokio::test]
async fn test_single_kind_day_has_no_same_day_links() {
    let store = Arc::new(MemoryGraphStore::new());
    ingest(&store, RecordKind::Tasks, utc(7, 3)).await;
    let engine = Orchestrator::new(store.clone(), EngineConfig::default());
    engine.run_cycle(utc(8, 1)).await;

    assert!(store
        .edges_with_relation(EdgeRelation::SameDaySummary)
        .is_empty());
}

#[tokio::test]
async fn test_same_day_rejects_summaries_from_other_days() {
    let store = Arc::new(MemoryGraphStore::new());
    let a = write_basic(&store, utc(7, 3)).await;
    let b = write_basic(&store, utc(8, 3)).await;
    let edges = EdgeManager::new(store.clone());

    let day = a.period.day();
    assert!(edges.link_same_day(day, &[a.clone(), b]).await.is_err());

    // Duplicates collapse; one node alone yields nothing.
    assert_eq!(edges.link_same_day(day, &[a.clone(), a]).await.unwrap(), 0);
    assert_eq!(store.edge_count(), 0);
}

#[tokio::test]
async fn test_filling_a_gap_replaces_the_bypass_pair() {
    let store = Arc::new(MemoryGraphStore::new());
    let first = write_basic(&store, utc(7, 1)).await;
    let third = write_basic(&store, utc(7, 13)).await;
    let edges = EdgeManager::new(store.clone());

    assert_eq!(edges.link_temporal(&third).await.unwrap(), 2);
    assert_eq!(edges.link_temporal(&first).await.unwrap(), 0);

    let second = write_basic(&store, utc(7, 7)).await;
    assert_eq!(edges.link_temporal(&second).await.unwrap(), 4);

    // Three summaries, two pairs: first and third are no longer adjacent.
    assert_eq!(store.edges_with_relation(EdgeRelation::TemporalPrev).len(), 2);
    assert_eq!(store.edges_with_relation(EdgeRelation::TemporalNext).len(), 2);
    let from_first = store.edges_from(&first.id).await.unwrap();
    assert_eq!(from_first.len(), 1);
    assert_eq!(from_first[0].relation, EdgeRelation::TemporalNext);
    assert_eq!(from_first[0].target_id, second.id);
    let from_third = store.edges_from(&third.id).await.unwrap();
    assert_eq!(from_third.len(), 1);
    assert_eq!(from_third[0].relation, EdgeRelation::TemporalPrev);
    assert_eq!(from_third[0].target_id, second.id);

    for summary in [&first, &second, &third] {
        assert_eq!(edges.link_temporal(summary).await.unwrap(), 0);
    }
    assert_eq!(store.edge_count(), 4);
}

#[tokio::test]
async fn test_late_record_in_a_gap_day_keeps_one_pair_per_neighbour() {
    let store = Arc::new(MemoryGraphStore::new());
    ingest(&store, RecordKind::Metrics, utc(7, 12)).await;
    ingest(&store, RecordKind::Metrics, utc(9, 12)).await;
    let engine = Orchestrator::new(store.clone(), EngineConfig::default());

    let report = engine.run_cycle(utc(10, 1)).await;
    assert!(report.is_clean(), "{:?}", report.errors);
    let next = daily_edges(&store, EdgeRelation::TemporalNext);
    assert_eq!(next.len(), 1);
    assert_eq!(next[0].attributes["days_apart"], 2);

    ingest(&store, RecordKind::Metrics, utc(8, 12)).await;
    let report = engine.run_cycle(utc(10, 2)).await;
    assert!(report.is_clean(), "{:?}", report.errors);

    let prev = daily_edges(&store, EdgeRelation::TemporalPrev);
    let next = daily_edges(&store, EdgeRelation::TemporalNext);
    assert_eq!(prev.len(), 2);
    assert_eq!(next.len(), 2);
    let out_of_seventh: Vec<&GraphEdge> = next
        .iter()
        .filter(|e| e.source_id.as_str() == "metrics_summary_daily_20250707")
        .collect();
    assert_eq!(out_of_seventh.len(), 1);
    assert_eq!(
        out_of_seventh[0].target_id.as_str(),
        "metrics_summary_daily_20250708"
    );
    assert!(prev.iter().all(|e| e.attributes["days_apart"] == 1));
}
