//! Graph store interface consumed by the consolidation engine
//!
//! The store holds typed nodes (raw records and summaries alike) keyed by a
//! caller-chosen id, plus directed, labelled edges between them. Guarantees
//! every implementation must uphold:
//!
//! - `upsert_node` is insert-if-absent: an existing node is never overwritten.
//! - Edges are unique per `(source_id, target_id, relation)`.
//! - Each node write, edge write and delete call is individually atomic.
//! - Deleting an edge by key never touches its nodes.
//! - Deleting a node deletes every edge that touches it.
//!
//! In-memory fakes are provided for testing via the `fakes` module.

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::StorageError;

/// Result type for storage operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

// ---------------------------------------------------------------------------
// Nodes
// ---------------------------------------------------------------------------

/// Identifier of a graph node.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        NodeId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        NodeId(s.to_string())
    }
}

/// A typed node in the graph.
///
/// `timestamp` is the instant range queries filter on: the event time for a
/// raw record, the period start for a summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: NodeId,
    pub node_type: String,
    pub timestamp: DateTime<Utc>,
    pub attributes: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Outcome of an idempotent write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WriteOutcome {
    Created,
    /// The node or edge was already present; nothing was written.
    AlreadyExisted,
}

impl WriteOutcome {
    pub fn was_created(self) -> bool {
        self == WriteOutcome::Created
    }
}

/// Search direction for [`GraphStore::nearest_node`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Latest node with `timestamp < pivot`.
    Before,
    /// Earliest node with `timestamp > pivot`.
    After,
}

// ---------------------------------------------------------------------------
// Edges
// ---------------------------------------------------------------------------

/// Relation carried by a consolidation edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EdgeRelation {
    TemporalPrev,
    TemporalNext,
    SameDaySummary,
}

impl EdgeRelation {
    pub fn as_str(self) -> &'static str {
        match self {
            EdgeRelation::TemporalPrev => "TEMPORAL_PREV",
            EdgeRelation::TemporalNext => "TEMPORAL_NEXT",
            EdgeRelation::SameDaySummary => "SAME_DAY_SUMMARY",
        }
    }
}

impl fmt::Display for EdgeRelation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EdgeRelation {
    type Err = StorageError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "TEMPORAL_PREV" => Ok(EdgeRelation::TemporalPrev),
            "TEMPORAL_NEXT" => Ok(EdgeRelation::TemporalNext),
            "SAME_DAY_SUMMARY" => Ok(EdgeRelation::SameDaySummary),
            other => Err(StorageError::Serialization(format!(
                "unknown edge relation: {other}"
            ))),
        }
    }
}

/// Uniqueness key of an edge.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EdgeKey {
    pub source_id: NodeId,
    pub target_id: NodeId,
    pub relation: EdgeRelation,
}

impl EdgeKey {
    /// Stable hex digest of the key, usable as a backend record id.
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.source_id.as_str().as_bytes());
        hasher.update(b"\0");
        hasher.update(self.target_id.as_str().as_bytes());
        hasher.update(b"\0");
        hasher.update(self.relation.as_str().as_bytes());
        hex::encode(hasher.finalize())
    }
}

/// Directed, labelled edge between two nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphEdge {
    pub source_id: NodeId,
    pub target_id: NodeId,
    pub relation: EdgeRelation,
    pub attributes: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl GraphEdge {
    pub fn new(
        source_id: NodeId,
        target_id: NodeId,
        relation: EdgeRelation,
        attributes: serde_json::Value,
    ) -> Self {
        Self {
            source_id,
            target_id,
            relation,
            attributes,
            created_at: Utc::now(),
        }
    }

    pub fn key(&self) -> EdgeKey {
        EdgeKey {
            source_id: self.source_id.clone(),
            target_id: self.target_id.clone(),
            relation: self.relation,
        }
    }
}

// ---------------------------------------------------------------------------
// GraphStore
// ---------------------------------------------------------------------------

/// Node/edge store used by the consolidation engine.
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Nodes of `node_type` with `start <= timestamp < end`, ordered by
    /// `(timestamp, id)`.
    async fn get_nodes_in_range(
        &self,
        node_type: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> StorageResult<Vec<GraphNode>>;

    /// Closest node of `node_type` strictly before or after `pivot`,
    /// regardless of how far away it is.
    async fn nearest_node(
        &self,
        node_type: &str,
        pivot: DateTime<Utc>,
        direction: Direction,
    ) -> StorageResult<Option<GraphNode>>;

    /// Fetch a node by id.
    async fn get_node(&self, id: &NodeId) -> StorageResult<Option<GraphNode>>;

    /// Check whether a node exists.
    async fn exists_node(&self, id: &NodeId) -> StorageResult<bool>;

    /// Insert the node unless one with the same id already exists.
    async fn upsert_node(&self, node: GraphNode) -> StorageResult<WriteOutcome>;

    /// Insert the edge unless one with the same key already exists.
    async fn insert_edge(&self, edge: GraphEdge) -> StorageResult<WriteOutcome>;

    /// Edges whose source is `id`.
    async fn edges_from(&self, id: &NodeId) -> StorageResult<Vec<GraphEdge>>;

    /// Edges whose target is `id`.
    async fn edges_to(&self, id: &NodeId) -> StorageResult<Vec<GraphEdge>>;

    /// Delete the edges with the given keys, leaving their nodes in place.
    /// Returns the number of edges actually deleted; missing keys are ignored.
    async fn delete_edges(&self, keys: &[EdgeKey]) -> StorageResult<u64>;

    /// Delete the given nodes and every edge touching them. Returns the
    /// number of nodes actually deleted; ids that do not exist are ignored.
    async fn delete_nodes(&self, ids: &[NodeId]) -> StorageResult<u64>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edge_key_digest_is_stable_and_relation_sensitive() {
        let key = |relation| EdgeKey {
            source_id: NodeId::from("a"),
            target_id: NodeId::from("b"),
            relation,
        };
        assert_eq!(
            key(EdgeRelation::TemporalPrev).digest(),
            key(EdgeRelation::TemporalPrev).digest()
        );
        assert_ne!(
            key(EdgeRelation::TemporalPrev).digest(),
            key(EdgeRelation::TemporalNext).digest()
        );
        assert_eq!(key(EdgeRelation::SameDaySummary).digest().len(), 64);
    }

    #[test]
    fn test_edge_relation_round_trips_through_str() {
        for relation in [
            EdgeRelation::TemporalPrev,
            EdgeRelation::TemporalNext,
            EdgeRelation::SameDaySummary,
        ] {
            let parsed: EdgeRelation = relation.as_str().parse().unwrap();
            assert_eq!(parsed, relation);
        }
        assert!("SIDEWAYS".parse::<EdgeRelation>().is_err());
    }
}
