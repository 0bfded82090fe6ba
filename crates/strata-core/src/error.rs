//! Error taxonomy for the consolidation engine.
//!
//! Failures are scoped to a single `(kind, tier, period)`; nothing here is
//! fatal to the process. Idempotent writes that find their target already
//! present are reported as [`strata_store::WriteOutcome::AlreadyExisted`],
//! never as errors.

use strata_store::StorageError;

/// A fetched input that does not match the shape its kind expects.
///
/// The offending record is skipped and counted; the period still
/// consolidates from the remaining inputs.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("record {id}: malformed {kind} payload: {reason}")]
    MalformedPayload {
        id: String,
        kind: String,
        reason: String,
    },

    #[error("record {id}: invalid {field}: {reason}")]
    InvalidField {
        id: String,
        field: &'static str,
        reason: String,
    },

    #[error("summary {id}: {reason}")]
    MalformedSummary { id: String, reason: String },

    #[error("unknown record kind: {0}")]
    UnknownKind(String),

    #[error("unknown tier: {0}")]
    UnknownTier(String),
}

/// Numeric failure while reducing inputs.
///
/// The whole period fails for this cycle; no partial summary is written.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AggregationError {
    #[error("{field} overflowed")]
    Overflow { field: &'static str },

    #[error("{field} is not a finite number")]
    NonFinite { field: &'static str },
}

/// Errors surfaced by engine operations.
#[derive(Debug, thiserror::Error)]
pub enum ConsolidationError {
    /// Transient: the store could not be reached. The period stays pending.
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("store error: {0}")]
    Store(StorageError),

    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("aggregation error: {0}")]
    Aggregation(#[from] AggregationError),

    #[error("invalid period: {0}")]
    InvalidPeriod(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ConsolidationError {
    pub fn is_store_unavailable(&self) -> bool {
        matches!(self, ConsolidationError::StoreUnavailable(_))
    }
}

impl From<StorageError> for ConsolidationError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Unavailable(msg) => ConsolidationError::StoreUnavailable(msg),
            other => ConsolidationError::Store(other),
        }
    }
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, ConsolidationError>;
