//! Graph linking between summaries.
//!
//! Temporal edges chain summaries of one `(kind, tier)` lineage; they are
//! always written as a reciprocal pair: `TEMPORAL_PREV` from the later node
//! to the earlier one and `TEMPORAL_NEXT` back. Same-day edges connect the
//! daily summaries of different kinds that share a calendar day.
//!
//! Every write relies on the store's `(source, target, relation)`
//! uniqueness, so linking can be re-run freely. A lineage of N summaries
//! carries N-1 pairs, also after a gap is filled late. An edge failure never
//! touches the summary it was linking; the next cycle retries it.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde_json::json;
use strata_store::{Direction, EdgeKey, EdgeRelation, GraphEdge, GraphStore, NodeId};
use tracing::{debug, instrument};

use crate::error::{ConsolidationError, Result};
use crate::model::{summary_id, Period, RecordKind, SummaryNode, Tier};

#[derive(Clone)]
pub struct EdgeManager {
    store: Arc<dyn GraphStore>,
}

/// One end of a temporal pair.
struct Endpoint {
    id: NodeId,
    at: DateTime<Utc>,
}

impl EdgeManager {
    pub fn new(store: Arc<dyn GraphStore>) -> Self {
        Self { store }
    }

    /// Link a freshly written summary to its nearest neighbours.
    pub async fn link_temporal(&self, summary: &SummaryNode) -> Result<u64> {
        self.reconcile_temporal(summary.kind, summary.tier, &summary.period)
            .await
    }

    /// Complete both temporal directions of the `(kind, tier, period)`
    /// summary. Returns the number of edges created.
    ///
    /// A missing `TEMPORAL_PREV` is filled from the nearest earlier summary
    /// of the lineage and a missing `TEMPORAL_NEXT` from the nearest later
    /// one, however large the gap. This is what repairs links when periods
    /// are consolidated out of order. Once the summary sits between two
    /// neighbours, any direct pair between those neighbours is removed so
    /// the chain keeps exactly one pair per adjacent summary.
    #[instrument(skip(self, period), fields(kind = %kind, tier = %tier, period = %period.label))]
    pub async fn reconcile_temporal(
        &self,
        kind: RecordKind,
        tier: Tier,
        period: &Period,
    ) -> Result<u64> {
        let node_type = kind.summary_node_type(tier);
        let this = Endpoint {
            id: summary_id(kind, tier, period),
            at: period.start,
        };

        let outgoing = self.store.edges_from(&this.id).await?;
        let has = |relation: EdgeRelation| outgoing.iter().any(|e| e.relation == relation);
        let (has_prev, has_next) = (
            has(EdgeRelation::TemporalPrev),
            has(EdgeRelation::TemporalNext),
        );
        let earlier = self
            .store
            .nearest_node(&node_type, this.at, Direction::Before)
            .await?
            .map(|n| Endpoint {
                id: n.id,
                at: n.timestamp,
            });
        let later = self
            .store
            .nearest_node(&node_type, this.at, Direction::After)
            .await?
            .map(|n| Endpoint {
                id: n.id,
                at: n.timestamp,
            });

        let mut created = 0;
        if let (false, Some(earlier)) = (has_prev, &earlier) {
            created += self.link_pair(&this, earlier, tier).await?;
        }
        if let (false, Some(later)) = (has_next, &later) {
            created += self.link_pair(later, &this, tier).await?;
        }
        if let (Some(earlier), Some(later)) = (&earlier, &later) {
            self.retire_bypass(later, earlier).await?;
        }
        Ok(created)
    }

    /// Remove the direct pair between two summaries that are no longer
    /// adjacent.
    async fn retire_bypass(&self, later: &Endpoint, earlier: &Endpoint) -> Result<u64> {
        let keys = [
            EdgeKey {
                source_id: later.id.clone(),
                target_id: earlier.id.clone(),
                relation: EdgeRelation::TemporalPrev,
            },
            EdgeKey {
                source_id: earlier.id.clone(),
                target_id: later.id.clone(),
                relation: EdgeRelation::TemporalNext,
            },
        ];
        let removed = self.store.delete_edges(&keys).await?;
        if removed > 0 {
            debug!(later = %later.id, earlier = %earlier.id, removed, "bypass pair retired");
        }
        Ok(removed)
    }

    async fn link_pair(&self, later: &Endpoint, earlier: &Endpoint, tier: Tier) -> Result<u64> {
        let attributes = json!({
            "days_apart": (later.at - earlier.at).num_days(),
            "tier": tier,
        });

        let mut created = 0;
        for (source, target, relation) in [
            (&later.id, &earlier.id, EdgeRelation::TemporalPrev),
            (&earlier.id, &later.id, EdgeRelation::TemporalNext),
        ] {
            let edge = GraphEdge::new(source.clone(), target.clone(), relation, attributes.clone());
            if self.store.insert_edge(edge).await?.was_created() {
                created += 1;
            }
        }
        debug!(later = %later.id, earlier = %earlier.id, created, "temporal pair linked");
        Ok(created)
    }

    /// Link every pair of distinct summaries on `day` with one
    /// `SAME_DAY_SUMMARY` edge, directed from the smaller id to the larger.
    /// `T` summaries yield `C(T, 2)` edges. Returns the number created.
    #[instrument(skip(self, summaries), fields(day = %day))]
    pub async fn link_same_day(&self, day: NaiveDate, summaries: &[SummaryNode]) -> Result<u64> {
        let mut on_day: BTreeMap<&NodeId, RecordKind> = BTreeMap::new();
        for summary in summaries {
            if summary.period.day() != day {
                return Err(ConsolidationError::InvalidPeriod(format!(
                    "{} does not fall on {day}",
                    summary.id
                )));
            }
            on_day.insert(&summary.id, summary.kind);
        }

        let nodes: Vec<(&NodeId, RecordKind)> = on_day.into_iter().collect();
        let mut created = 0;
        for (i, (source, source_kind)) in nodes.iter().enumerate() {
            for (target, target_kind) in &nodes[i + 1..] {
                let edge = GraphEdge::new(
                    (*source).clone(),
                    (*target).clone(),
                    EdgeRelation::SameDaySummary,
                    json!({
                        "date": day.to_string(),
                        "source_kind": source_kind,
                        "target_kind": target_kind,
                    }),
                );
                if self.store.insert_edge(edge).await?.was_created() {
                    created += 1;
                }
            }
        }
        debug!(summaries = nodes.len(), created, "same-day summaries linked");
        Ok(created)
    }
}
