//! Consolidators: one aggregation strategy per record kind.
//!
//! [`consolidate`] is pure. It never touches the store or the clock, so the
//! same ordered inputs always produce a byte-identical summary.

mod audit;
mod common;
mod conversations;
mod metrics;
mod tasks;
mod traces;

pub use audit::AuditSummary;
pub use common::{Aggregate, Tally};
pub use conversations::ConversationsSummary;
pub use metrics::{
    MetricStats, MetricsSummary, ResourceTotals, ACTION_PREFIX, CARBON_GRAMS, COST_CENTS,
    ENERGY_KWH, ERROR_PREFIX, TOKENS_TOTAL,
};
pub use tasks::TasksSummary;
pub use traces::TracesSummary;

use strata_store::GraphNode;

use crate::error::{ConsolidationError, Result};
use crate::model::{Period, RawRecord, RecordKind, SummaryNode, Tier};

/// Inputs of one period, ordered by `(timestamp, id)`.
#[derive(Debug, Clone)]
pub enum Inputs {
    /// Raw records (basic tier).
    Raw(Vec<RawRecord>),
    /// Lower-tier summary nodes, still undecoded.
    Summaries(Vec<GraphNode>),
}

impl Inputs {
    pub fn len(&self) -> usize {
        match self {
            Inputs::Raw(records) => records.len(),
            Inputs::Summaries(nodes) => nodes.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Result of consolidating one period.
#[derive(Debug, Clone)]
pub struct Consolidation {
    /// `None` when no valid input existed; the period stays unconsolidated.
    pub summary: Option<SummaryNode>,
    /// Inputs that failed validation and were left out.
    pub skipped: u64,
}

/// Reduce the inputs of `(kind, tier, period)` into one summary.
pub fn consolidate(
    kind: RecordKind,
    tier: Tier,
    period: &Period,
    inputs: &Inputs,
) -> Result<Consolidation> {
    if period.tier != tier {
        return Err(ConsolidationError::InvalidPeriod(format!(
            "{period} cannot be consolidated as {tier}"
        )));
    }
    match (tier.input_tier(), inputs) {
        (None, Inputs::Raw(_)) | (Some(_), Inputs::Summaries(_)) => {}
        _ => {
            return Err(ConsolidationError::InvalidPeriod(format!(
                "{tier} summaries are not built from these inputs"
            )))
        }
    }

    match kind {
        RecordKind::Metrics => common::reduce::<MetricsSummary>(tier, period, inputs),
        RecordKind::Audit => common::reduce::<AuditSummary>(tier, period, inputs),
        RecordKind::Traces => common::reduce::<TracesSummary>(tier, period, inputs),
        RecordKind::Conversations => common::reduce::<ConversationsSummary>(tier, period, inputs),
        RecordKind::Tasks => common::reduce::<TasksSummary>(tier, period, inputs),
    }
}
