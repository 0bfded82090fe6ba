//! Summary nodes.
//!
//! A summary is the immutable result of consolidating one `(kind, tier,
//! period)`. Its id is derived from those three values alone, so writing the
//! same summary twice is an idempotent no-op rather than a duplicate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use strata_store::{GraphNode, NodeId};

use super::kind::RecordKind;
use super::period::Period;
use super::tier::Tier;
use crate::consolidate::{
    AuditSummary, ConversationsSummary, MetricsSummary, TasksSummary, TracesSummary,
};
use crate::error::{Result, ValidationError};

/// Deterministic summary id: `<kind>_summary_<tier>_<YYYYMMDD>[_<HH>]`.
pub fn summary_id(kind: RecordKind, tier: Tier, period: &Period) -> NodeId {
    NodeId(format!("{kind}_summary_{tier}_{}", period.id_stamp()))
}

/// Aggregated fields, one concrete struct per record kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SummaryData {
    Metrics(MetricsSummary),
    Audit(AuditSummary),
    Traces(TracesSummary),
    Conversations(ConversationsSummary),
    Tasks(TasksSummary),
}

impl SummaryData {
    pub fn kind(&self) -> RecordKind {
        match self {
            SummaryData::Metrics(_) => RecordKind::Metrics,
            SummaryData::Audit(_) => RecordKind::Audit,
            SummaryData::Traces(_) => RecordKind::Traces,
            SummaryData::Conversations(_) => RecordKind::Conversations,
            SummaryData::Tasks(_) => RecordKind::Tasks,
        }
    }

    pub fn as_metrics(&self) -> Option<&MetricsSummary> {
        match self {
            SummaryData::Metrics(m) => Some(m),
            _ => None,
        }
    }
}

/// Consolidated view of one `(kind, tier, period)`.
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryNode {
    pub id: NodeId,
    pub kind: RecordKind,
    pub tier: Tier,
    pub period: Period,
    pub data: SummaryData,
    /// Inputs consumed (raw records for basic, lower-tier summaries above).
    pub source_count: u64,
    /// Raw records covered, summed through the tiers.
    pub record_count: u64,
    /// Inputs fetched for the period but left out as invalid.
    pub skipped_count: u64,
    pub first_record_at: DateTime<Utc>,
    pub last_record_at: DateTime<Utc>,
    /// SHA-256 of the summary content, hex encoded.
    pub content_digest: String,
    /// Equal to `period.end`: the instant the content became final.
    pub created_at: DateTime<Utc>,
}

/// Attribute layout of a summary node in the store.
#[derive(Debug, Serialize, Deserialize)]
struct SummaryAttributes {
    kind: RecordKind,
    tier: Tier,
    label: String,
    period_end: DateTime<Utc>,
    source_count: u64,
    record_count: u64,
    #[serde(default)]
    skipped_count: u64,
    first_record_at: DateTime<Utc>,
    last_record_at: DateTime<Utc>,
    content_digest: String,
    data: SummaryData,
}

/// Everything the digest covers, in a fixed field order.
#[derive(Serialize)]
struct DigestInput<'a> {
    id: &'a NodeId,
    label: &'a str,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    source_count: u64,
    record_count: u64,
    first_record_at: DateTime<Utc>,
    last_record_at: DateTime<Utc>,
    data: &'a SummaryData,
}

impl SummaryNode {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        kind: RecordKind,
        tier: Tier,
        period: Period,
        data: SummaryData,
        source_count: u64,
        record_count: u64,
        first_record_at: DateTime<Utc>,
        last_record_at: DateTime<Utc>,
    ) -> Result<Self> {
        let id = summary_id(kind, tier, &period);
        let input = DigestInput {
            id: &id,
            label: &period.label,
            start: period.start,
            end: period.end,
            source_count,
            record_count,
            first_record_at,
            last_record_at,
            data: &data,
        };
        let content_digest = hex::encode(Sha256::digest(serde_json::to_vec(&input)?));
        let created_at = period.end;

        Ok(Self {
            id,
            kind,
            tier,
            period,
            data,
            source_count,
            record_count,
            skipped_count: 0,
            first_record_at,
            last_record_at,
            content_digest,
            created_at,
        })
    }

    /// Record how many fetched inputs were left out.
    pub fn with_skipped_count(mut self, skipped: u64) -> Self {
        self.skipped_count = skipped;
        self
    }

    /// Number of inputs the period held when it was consolidated, valid or
    /// not. Anything beyond this arrived after the summary was written.
    pub fn inputs_seen(&self) -> u64 {
        self.source_count.saturating_add(self.skipped_count)
    }

    pub fn node_type(&self) -> String {
        self.kind.summary_node_type(self.tier)
    }

    /// Store representation; `timestamp` is the period start.
    pub fn to_node(&self) -> Result<GraphNode> {
        let attributes = SummaryAttributes {
            kind: self.kind,
            tier: self.tier,
            label: self.period.label.clone(),
            period_end: self.period.end,
            source_count: self.source_count,
            record_count: self.record_count,
            skipped_count: self.skipped_count,
            first_record_at: self.first_record_at,
            last_record_at: self.last_record_at,
            content_digest: self.content_digest.clone(),
            data: self.data.clone(),
        };
        Ok(GraphNode {
            id: self.id.clone(),
            node_type: self.node_type(),
            timestamp: self.period.start,
            attributes: serde_json::to_value(attributes)?,
            created_at: self.created_at,
        })
    }

    /// Decode a stored summary node, checking it against its own id and type.
    pub fn from_node(node: &GraphNode) -> std::result::Result<Self, ValidationError> {
        let malformed = |reason: String| ValidationError::MalformedSummary {
            id: node.id.to_string(),
            reason,
        };

        let attrs: SummaryAttributes = serde_json::from_value(node.attributes.clone())
            .map_err(|e| malformed(e.to_string()))?;
        if node.node_type != attrs.kind.summary_node_type(attrs.tier) {
            return Err(malformed(format!(
                "node type {} does not match {} {}",
                node.node_type, attrs.kind, attrs.tier
            )));
        }
        if attrs.data.kind() != attrs.kind {
            return Err(malformed(format!(
                "{} data stored on a {} summary",
                attrs.data.kind(),
                attrs.kind
            )));
        }

        let period =
            Period::from_start(attrs.tier, node.timestamp).map_err(|e| malformed(e.to_string()))?;
        if period.end != attrs.period_end {
            return Err(malformed(format!(
                "period end {} does not match {}",
                attrs.period_end, period.end
            )));
        }
        if summary_id(attrs.kind, attrs.tier, &period) != node.id {
            return Err(malformed("id does not match its period".to_string()));
        }

        Ok(Self {
            id: node.id.clone(),
            kind: attrs.kind,
            tier: attrs.tier,
            period,
            data: attrs.data,
            source_count: attrs.source_count,
            record_count: attrs.record_count,
            skipped_count: attrs.skipped_count,
            first_record_at: attrs.first_record_at,
            last_record_at: attrs.last_record_at,
            content_digest: attrs.content_digest,
            created_at: node.created_at,
        })
    }
}

/// Content digest recorded on a stored summary node, if any.
pub fn stored_digest(node: &GraphNode) -> Option<&str> {
    node.attributes.get("content_digest").and_then(|v| v.as_str())
}
