//! Strata Core: tiered consolidation of agent runtime records
//!
//! Raw records stored as typed graph nodes are rolled up into basic (6h),
//! daily, weekly and monthly summary nodes, chained into a temporal graph,
//! cross-linked per day, and purged once safely superseded.
//!
//! ## Key Components
//!
//! - `period_manager`: calendar-aligned periods, due and consolidated checks
//! - `query`: period-bounded input retrieval
//! - `consolidate`: one aggregation strategy per record kind
//! - `edges`: temporal and same-day linking
//! - `cleanup`: retention-gated purging
//! - `orchestrator`: the consolidation cycle and its report

pub mod cleanup;
pub mod clock;
pub mod config;
pub mod consolidate;
pub mod edges;
pub mod error;
pub mod metrics;
pub mod model;
pub mod obs;
pub mod orchestrator;
pub mod period_manager;
pub mod query;
pub mod telemetry;

pub use cleanup::{CleanupManager, PurgeOutcome, RetentionPolicy, SkipReason};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ConfigError, EngineConfig, RetentionConfig};
pub use consolidate::{consolidate, Consolidation, Inputs};
pub use edges::EdgeManager;
pub use error::{AggregationError, ConsolidationError, Result, ValidationError};
pub use model::{
    summary_id, Period, RawRecord, RecordKind, SummaryData, SummaryNode, Tier,
};
pub use orchestrator::{CycleReport, Orchestrator, PeriodError};
pub use period_manager::{compute_periods, is_due, PeriodManager};
pub use query::QueryManager;

pub use strata_store::{GraphStore, MemoryGraphStore, NodeId};
