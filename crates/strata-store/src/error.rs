//! Error types for strata-store

use thiserror::Error;

/// Errors raised while connecting to a backend or preparing its schema
#[derive(Error, Debug)]
pub enum StateError {
    /// Database connection error
    #[error("Database connection failed: {0}")]
    Connection(String),

    /// Database query error
    #[error("Database query failed: {0}")]
    Query(String),

    /// Serialization error
    #[error("Serialization failed: {0}")]
    Serialization(String),

    /// Schema setup error
    #[error("Schema setup failed: {0}")]
    SchemaSetup(String),
}

impl From<surrealdb::Error> for StateError {
    fn from(err: surrealdb::Error) -> Self {
        StateError::Query(err.to_string())
    }
}

impl From<serde_json::Error> for StateError {
    fn from(err: serde_json::Error) -> Self {
        StateError::Serialization(err.to_string())
    }
}

/// Errors returned by [`crate::GraphStore`] operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// The store could not be reached; the caller should retry later
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The backend rejected or failed the operation
    #[error("storage backend error: {0}")]
    Backend(String),

    /// A row could not be encoded or decoded
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A node that was expected to exist is missing
    #[error("node not found: {id}")]
    NotFound { id: String },
}

impl StorageError {
    /// Whether the failure is expected to clear on its own (retry next cycle).
    pub fn is_transient(&self) -> bool {
        matches!(self, StorageError::Unavailable(_))
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}
