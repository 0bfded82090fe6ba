//! Input retrieval for consolidation and cleanup.
//!
//! Every query is restricted to `[period.start, period.end)` and returns
//! nodes ordered by `(timestamp, id)`, so re-issuing it against unchanged
//! storage yields the same inputs in the same order.

use std::sync::Arc;

use strata_store::{GraphStore, NodeId};
use tracing::{debug, warn};

use crate::consolidate::Inputs;
use crate::error::Result;
use crate::model::{Period, RawRecord, RecordKind, SummaryNode, Tier};

#[derive(Clone)]
pub struct QueryManager {
    store: Arc<dyn GraphStore>,
}

impl QueryManager {
    pub fn new(store: Arc<dyn GraphStore>) -> Self {
        Self { store }
    }

    /// Inputs of `(kind, tier, period)`: raw records for basic periods,
    /// otherwise summaries of [`Tier::input_tier`].
    pub async fn fetch_inputs(
        &self,
        kind: RecordKind,
        tier: Tier,
        period: &Period,
    ) -> Result<Inputs> {
        let inputs = match tier.input_tier() {
            None => {
                let nodes = self
                    .store
                    .get_nodes_in_range(&kind.raw_node_type(), period.start, period.end)
                    .await?;
                let records = nodes
                    .iter()
                    .map(|node| RawRecord::from_node(kind, node))
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Inputs::Raw(records)
            }
            Some(input_tier) => Inputs::Summaries(
                self.store
                    .get_nodes_in_range(
                        &kind.summary_node_type(input_tier),
                        period.start,
                        period.end,
                    )
                    .await?,
            ),
        };
        debug!(kind = %kind, period = %period, inputs = inputs.len(), "inputs fetched");
        Ok(inputs)
    }

    /// Ids of every `node_type` node inside the period.
    pub async fn fetch_node_ids(&self, node_type: &str, period: &Period) -> Result<Vec<NodeId>> {
        Ok(self
            .store
            .get_nodes_in_range(node_type, period.start, period.end)
            .await?
            .into_iter()
            .map(|node| node.id)
            .collect())
    }

    /// Daily summaries of `kinds` for one day. Undecodable nodes are logged
    /// and left out.
    pub async fn daily_summaries(
        &self,
        kinds: &[RecordKind],
        day: &Period,
    ) -> Result<Vec<SummaryNode>> {
        let mut summaries = Vec::new();
        for kind in kinds {
            let nodes = self
                .store
                .get_nodes_in_range(&kind.summary_node_type(Tier::Daily), day.start, day.end)
                .await?;
            for node in &nodes {
                match SummaryNode::from_node(node) {
                    Ok(summary) => summaries.push(summary),
                    Err(err) => warn!(error = %err, "unreadable daily summary ignored"),
                }
            }
        }
        Ok(summaries)
    }
}
