//! SurrealDB schema initialization
//!
//! Sets up the `nodes` and `edges` tables with the uniqueness constraints the
//! [`crate::GraphStore`] contract relies on.

use crate::Result;
use surrealdb::engine::any::Any;
use surrealdb::Surreal;
use tracing::{debug, info};

/// Initialize all Strata tables in SurrealDB
///
/// Safe to call multiple times (idempotent).
pub async fn init_schema(db: &Surreal<Any>) -> Result<()> {
    info!("Initializing Strata SurrealDB schema");

    init_nodes_table(db).await?;
    init_edges_table(db).await?;

    info!("Strata schema initialization complete");
    Ok(())
}

/// Initialize `nodes` table with constraints and indexes
///
/// Schema:
/// ```text
/// TABLE nodes {
///   node_id:     STRING (unique, also the record id)
///   node_type:   STRING (indexed)
///   ts:          DATETIME (indexed with node_type for range queries)
///   attributes:  OBJECT
///   created_at:  DATETIME
/// }
/// ```
///
/// Constraints:
/// - `node_id` is unique, so a second write of the same summary id is rejected
///   and reported as already existing
async fn init_nodes_table(db: &Surreal<Any>) -> Result<()> {
    debug!("Initializing nodes table");

    let sql = r#"
        DEFINE TABLE IF NOT EXISTS nodes SCHEMALESS;

        DEFINE INDEX IF NOT EXISTS idx_node_id ON TABLE nodes COLUMNS node_id UNIQUE;

        -- Range queries always filter on (node_type, ts)
        DEFINE INDEX IF NOT EXISTS idx_node_type_ts ON TABLE nodes COLUMNS node_type, ts;
    "#;

    db.query(sql).await?.check()?;
    debug!("nodes table initialized");
    Ok(())
}

/// Initialize `edges` table with constraints and indexes
///
/// Schema:
/// ```text
/// TABLE edges {
///   source_id:   STRING
///   target_id:   STRING
///   relation:    STRING (TEMPORAL_PREV | TEMPORAL_NEXT | SAME_DAY_SUMMARY)
///   attributes:  OBJECT
///   created_at:  DATETIME
/// }
/// ```
///
/// Constraints:
/// - `(source_id, target_id, relation)` is unique
async fn init_edges_table(db: &Surreal<Any>) -> Result<()> {
    debug!("Initializing edges table");

    let sql = r#"
        DEFINE TABLE IF NOT EXISTS edges SCHEMALESS;

        DEFINE INDEX IF NOT EXISTS idx_edge_key ON TABLE edges COLUMNS source_id, target_id, relation UNIQUE;
        DEFINE INDEX IF NOT EXISTS idx_edge_source ON TABLE edges COLUMNS source_id;
        DEFINE INDEX IF NOT EXISTS idx_edge_target ON TABLE edges COLUMNS target_id;
    "#;

    db.query(sql).await?.check()?;
    debug!("edges table initialized");
    Ok(())
}
