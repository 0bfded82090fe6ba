//! Strata-Store: graph persistence for the Strata consolidation engine
//!
//! The consolidation engine treats its node/edge store as an external
//! collaborator. This crate defines that collaborator's interface and ships
//! two implementations of it.
//!
//! ## Key Components
//!
//! - `GraphStore`: async range-query / upsert / edge / delete interface
//! - `MemoryGraphStore`: in-memory fake with fault injection (tests, dry runs)
//! - `SurrealGraphStore`: SurrealDB backend (`nodes` + `edges` tables)
//! - `CloudConfig`: connection settings read from the environment

mod error;
pub mod fakes;
mod handle;
pub mod graph;
pub mod migrations;
mod schema;
pub mod surreal_graph;

pub use error::{StateError, StorageError};
pub use fakes::MemoryGraphStore;
pub use graph::{
    Direction, EdgeKey, EdgeRelation, GraphEdge, GraphNode, GraphStore, NodeId, StorageResult,
    WriteOutcome,
};
pub use handle::CloudConfig;
pub use schema::{EdgeRow, NodeRow};
pub use surreal_graph::SurrealGraphStore;

/// Result type for connection and schema operations
pub type Result<T> = std::result::Result<T, StateError>;
