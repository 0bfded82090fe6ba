//! Domain model: kinds, tiers, periods, raw records and summaries.

pub mod kind;
pub mod period;
pub mod record;
pub mod summary;
pub mod tier;

pub use kind::RecordKind;
pub use period::Period;
pub use record::{
    AuditEvent, ConversationMessage, MetricPoint, Payload, RawRecord, TaskEvent, TraceSpan,
};
pub use summary::{stored_digest, summary_id, SummaryData, SummaryNode};
pub use tier::Tier;
