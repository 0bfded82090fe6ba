//! SurrealDB-backed GraphStore implementation
//!
//! Uses `schema::NodeRow` and `schema::EdgeRow` for persistence, converting
//! to/from `graph` types at the boundary. Node records are keyed by node id
//! and edge records by the digest of their `(source, target, relation)` key,
//! so the unique indexes and the record ids agree on identity.

use std::collections::BTreeSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use surrealdb::engine::any::Any;
use surrealdb::sql::Datetime as SurrealDatetime;
use surrealdb::Surreal;
use tracing::{debug, info, instrument};

use crate::error::StorageError;
use crate::graph::{
    Direction, EdgeKey, GraphEdge, GraphNode, GraphStore, NodeId, StorageResult, WriteOutcome,
};
use crate::handle;
use crate::schema::{EdgeRow, NodeRow};

/// SurrealDB-backed implementation of [`GraphStore`].
#[derive(Clone)]
pub struct SurrealGraphStore {
    db: Surreal<Any>,
}

/// Map a SurrealDB error onto the storage taxonomy.
///
/// Lost connections and datastores that cannot start a transaction are
/// `Unavailable`; everything else is a `Backend` failure.
fn map_err(err: surrealdb::Error) -> StorageError {
    use surrealdb::error::{Api, Db};

    let unavailable = match &err {
        surrealdb::Error::Api(api) => matches!(
            api,
            Api::Http(_) | Api::Ws(_) | Api::ConnectionUninitialised
        ),
        surrealdb::Error::Db(db) => {
            matches!(db, Db::Ds(_) | Db::TxFailure | Db::QueryTimedout)
        }
    };
    if unavailable {
        StorageError::Unavailable(err.to_string())
    } else {
        StorageError::Backend(err.to_string())
    }
}

impl SurrealGraphStore {
    /// Create an in-memory instance for testing.
    ///
    /// Connects to `mem://`, selects `strata/main`, and runs `init_schema`.
    pub async fn in_memory() -> crate::Result<Self> {
        let db = handle::connect_url("mem://").await?;
        info!("SurrealGraphStore connected (in-memory)");
        Ok(Self { db })
    }

    /// Connect to an explicit URL (`mem://`, `surrealkv://path`, `ws://host`).
    pub async fn connect(url: &str) -> crate::Result<Self> {
        let db = handle::connect_url(url).await?;
        info!("SurrealGraphStore connected ({})", url);
        Ok(Self { db })
    }

    /// Create from environment variables (cloud, then `SURREALDB_URL`, then
    /// local persistence in `.strata/db`).
    pub async fn from_env() -> crate::Result<Self> {
        let db = handle::connect_from_env().await?;
        Ok(Self { db })
    }

    // -- private helpers -----------------------------------------------------

    async fn fetch_node_row(&self, id: &str) -> StorageResult<Option<NodeRow>> {
        let id_owned = id.to_string();
        let mut res = self
            .db
            .query("SELECT * FROM nodes WHERE node_id = $id LIMIT 1")
            .bind(("id", id_owned))
            .await
            .map_err(map_err)?;

        let rows: Vec<NodeRow> = res.take(0).map_err(map_err)?;
        Ok(rows.into_iter().next())
    }

    async fn edge_exists(&self, digest: &str) -> StorageResult<bool> {
        let row: Option<EdgeRow> = self
            .db
            .select(("edges", digest.to_string()))
            .await
            .map_err(map_err)?;
        Ok(row.is_some())
    }

    async fn select_edges(&self, sql: &'static str, id: &NodeId) -> StorageResult<Vec<GraphEdge>> {
        let id_owned = id.0.clone();
        let mut res = self
            .db
            .query(sql)
            .bind(("id", id_owned))
            .await
            .map_err(map_err)?;

        let rows: Vec<EdgeRow> = res.take(0).map_err(map_err)?;
        rows.into_iter().map(GraphEdge::try_from).collect()
    }
}

#[async_trait]
impl GraphStore for SurrealGraphStore {
    #[instrument(skip(self), fields(node_type = %node_type))]
    async fn get_nodes_in_range(
        &self,
        node_type: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> StorageResult<Vec<GraphNode>> {
        let mut res = self
            .db
            .query(
                "SELECT * FROM nodes WHERE node_type = $t AND ts >= $start AND ts < $end \
                 ORDER BY ts ASC, node_id ASC",
            )
            .bind(("t", node_type.to_string()))
            .bind(("start", SurrealDatetime::from(start)))
            .bind(("end", SurrealDatetime::from(end)))
            .await
            .map_err(map_err)?;

        let rows: Vec<NodeRow> = res.take(0).map_err(map_err)?;
        debug!(count = rows.len(), "range query");
        Ok(rows.into_iter().map(GraphNode::from).collect())
    }

    #[instrument(skip(self), fields(node_type = %node_type))]
    async fn nearest_node(
        &self,
        node_type: &str,
        pivot: DateTime<Utc>,
        direction: Direction,
    ) -> StorageResult<Option<GraphNode>> {
        let sql = match direction {
            Direction::Before => {
                "SELECT * FROM nodes WHERE node_type = $t AND ts < $pivot \
                 ORDER BY ts DESC, node_id DESC LIMIT 1"
            }
            Direction::After => {
                "SELECT * FROM nodes WHERE node_type = $t AND ts > $pivot \
                 ORDER BY ts ASC, node_id ASC LIMIT 1"
            }
        };

        let mut res = self
            .db
            .query(sql)
            .bind(("t", node_type.to_string()))
            .bind(("pivot", SurrealDatetime::from(pivot)))
            .await
            .map_err(map_err)?;

        let rows: Vec<NodeRow> = res.take(0).map_err(map_err)?;
        Ok(rows.into_iter().next().map(GraphNode::from))
    }

    async fn get_node(&self, id: &NodeId) -> StorageResult<Option<GraphNode>> {
        Ok(self.fetch_node_row(id.as_str()).await?.map(GraphNode::from))
    }

    async fn exists_node(&self, id: &NodeId) -> StorageResult<bool> {
        Ok(self.fetch_node_row(id.as_str()).await?.is_some())
    }

    #[instrument(skip(self, node), fields(node_id = %node.id))]
    async fn upsert_node(&self, node: GraphNode) -> StorageResult<WriteOutcome> {
        let id = node.id.clone();
        if self.exists_node(&id).await? {
            debug!("node already present, write skipped");
            return Ok(WriteOutcome::AlreadyExisted);
        }

        let row = NodeRow::from(node);
        let created: Result<Option<NodeRow>, surrealdb::Error> =
            self.db.create(("nodes", id.0.clone())).content(row).await;

        match created {
            Ok(_) => Ok(WriteOutcome::Created),
            Err(err) => {
                // A concurrent writer may have won between the check and the create.
                if self.exists_node(&id).await? {
                    debug!(error = %err, "lost create race, node already present");
                    Ok(WriteOutcome::AlreadyExisted)
                } else {
                    Err(map_err(err))
                }
            }
        }
    }

    #[instrument(skip(self, edge), fields(source = %edge.source_id, target = %edge.target_id, relation = %edge.relation))]
    async fn insert_edge(&self, edge: GraphEdge) -> StorageResult<WriteOutcome> {
        let digest = edge.key().digest();
        if self.edge_exists(&digest).await? {
            return Ok(WriteOutcome::AlreadyExisted);
        }

        let row = EdgeRow::from(edge);
        let created: Result<Option<EdgeRow>, surrealdb::Error> =
            self.db.create(("edges", digest.clone())).content(row).await;

        match created {
            Ok(_) => Ok(WriteOutcome::Created),
            Err(err) => {
                if self.edge_exists(&digest).await? {
                    debug!(error = %err, "lost create race, edge already present");
                    Ok(WriteOutcome::AlreadyExisted)
                } else {
                    Err(map_err(err))
                }
            }
        }
    }

    async fn edges_from(&self, id: &NodeId) -> StorageResult<Vec<GraphEdge>> {
        self.select_edges(
            "SELECT * FROM edges WHERE source_id = $id ORDER BY relation ASC, target_id ASC",
            id,
        )
        .await
    }

    async fn edges_to(&self, id: &NodeId) -> StorageResult<Vec<GraphEdge>> {
        self.select_edges(
            "SELECT * FROM edges WHERE target_id = $id ORDER BY relation ASC, source_id ASC",
            id,
        )
        .await
    }

    #[instrument(skip(self, keys), fields(requested = keys.len()))]
    async fn delete_edges(&self, keys: &[EdgeKey]) -> StorageResult<u64> {
        let digests: BTreeSet<String> = keys.iter().map(EdgeKey::digest).collect();
        let mut deleted = 0u64;
        for digest in digests {
            let removed: Option<EdgeRow> = self
                .db
                .delete(("edges", digest))
                .await
                .map_err(map_err)?;
            if removed.is_some() {
                deleted += 1;
            }
        }
        debug!(deleted, "edges deleted");
        Ok(deleted)
    }

    #[instrument(skip(self, ids), fields(requested = ids.len()))]
    async fn delete_nodes(&self, ids: &[NodeId]) -> StorageResult<u64> {
        if ids.is_empty() {
            return Ok(0);
        }
        let id_list: Vec<String> = ids.iter().map(|id| id.0.clone()).collect();

        // Edges go first: an interrupted delete leaves nodes without links,
        // which the next cycle re-links, never links without nodes.
        self.db
            .query("DELETE FROM edges WHERE source_id IN $ids OR target_id IN $ids")
            .bind(("ids", id_list.clone()))
            .await
            .map_err(map_err)?
            .check()
            .map_err(map_err)?;

        let mut res = self
            .db
            .query("DELETE FROM nodes WHERE node_id IN $ids RETURN BEFORE")
            .bind(("ids", id_list))
            .await
            .map_err(map_err)?;

        let deleted: Vec<NodeRow> = res.take(0).map_err(map_err)?;
        debug!(deleted = deleted.len(), "nodes deleted");
        Ok(deleted.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use surrealdb::error::{Api, Db};

    #[test]
    fn test_map_err_classifies_by_variant() {
        let lost = map_err(surrealdb::Error::Api(Api::Ws("connection reset".into())));
        assert!(lost.is_transient());
        assert!(map_err(surrealdb::Error::Api(Api::ConnectionUninitialised)).is_transient());
        assert!(map_err(surrealdb::Error::Db(Db::TxFailure)).is_transient());

        // Wording alone never makes an error transient.
        let query = map_err(surrealdb::Error::Api(Api::Query(
            "connection field is not defined".into(),
        )));
        assert!(matches!(query, StorageError::Backend(_)));
        assert!(matches!(
            map_err(surrealdb::Error::Db(Db::Thrown("nope".into()))),
            StorageError::Backend(_)
        ));
    }
}
