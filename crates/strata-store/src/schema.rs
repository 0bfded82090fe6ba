//! Row types for the SurrealDB tables
//!
//! Tables:
//! - nodes: typed graph nodes (raw records and summaries)
//! - edges: labelled relations between nodes
//!
//! Rows convert to/from the backend-agnostic `graph` types at the boundary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StorageError;
use crate::graph::{EdgeKey, GraphEdge, GraphNode, NodeId};

/// Module for serializing chrono DateTime to SurrealDB datetime format
pub(crate) mod surreal_datetime {
    use chrono::{DateTime, Utc};
    use serde::{self, Deserialize, Deserializer, Serializer};
    use surrealdb::sql::Datetime as SurrealDatetime;

    pub fn serialize<S>(date: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let sd = SurrealDatetime::from(*date);
        serde::Serialize::serialize(&sd, serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let sd = SurrealDatetime::deserialize(deserializer)?;
        Ok(DateTime::from(sd))
    }
}

/// Node row - one graph node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeRow {
    /// SurrealDB record ID (derived from `node_id`, never serialized)
    #[serde(default, skip_serializing)]
    pub id: Option<surrealdb::sql::Thing>,
    /// Caller-chosen node id
    pub node_id: String,
    /// Node type, e.g. "raw.metrics" or "summary.metrics.daily"
    pub node_type: String,
    /// Instant range queries filter on
    #[serde(with = "surreal_datetime")]
    pub ts: DateTime<Utc>,
    /// Node payload (JSON)
    pub attributes: serde_json::Value,
    /// Write timestamp
    #[serde(with = "surreal_datetime")]
    pub created_at: DateTime<Utc>,
}

impl From<GraphNode> for NodeRow {
    fn from(node: GraphNode) -> Self {
        NodeRow {
            id: None,
            node_id: node.id.0,
            node_type: node.node_type,
            ts: node.timestamp,
            attributes: node.attributes,
            created_at: node.created_at,
        }
    }
}

impl From<NodeRow> for GraphNode {
    fn from(row: NodeRow) -> Self {
        GraphNode {
            id: NodeId(row.node_id),
            node_type: row.node_type,
            timestamp: row.ts,
            attributes: row.attributes,
            created_at: row.created_at,
        }
    }
}

/// Edge row - one labelled relation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeRow {
    /// SurrealDB record ID (digest of the edge key, never serialized)
    #[serde(default, skip_serializing)]
    pub id: Option<surrealdb::sql::Thing>,
    pub source_id: String,
    pub target_id: String,
    /// "TEMPORAL_PREV" | "TEMPORAL_NEXT" | "SAME_DAY_SUMMARY"
    pub relation: String,
    pub attributes: serde_json::Value,
    #[serde(with = "surreal_datetime")]
    pub created_at: DateTime<Utc>,
}

impl EdgeRow {
    pub fn key_digest(&self) -> Result<String, StorageError> {
        Ok(EdgeKey {
            source_id: NodeId(self.source_id.clone()),
            target_id: NodeId(self.target_id.clone()),
            relation: self.relation.parse()?,
        }
        .digest())
    }
}

impl From<GraphEdge> for EdgeRow {
    fn from(edge: GraphEdge) -> Self {
        EdgeRow {
            id: None,
            source_id: edge.source_id.0,
            target_id: edge.target_id.0,
            relation: edge.relation.as_str().to_string(),
            attributes: edge.attributes,
            created_at: edge.created_at,
        }
    }
}

impl TryFrom<EdgeRow> for GraphEdge {
    type Error = StorageError;

    fn try_from(row: EdgeRow) -> Result<Self, Self::Error> {
        Ok(GraphEdge {
            source_id: NodeId(row.source_id),
            target_id: NodeId(row.target_id),
            relation: row.relation.parse()?,
            attributes: row.attributes,
            created_at: row.created_at,
        })
    }
}
