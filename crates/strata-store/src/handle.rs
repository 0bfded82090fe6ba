//! SurrealDB connection handling
//!
//! Supports in-memory, URL-addressed, local file (`surrealkv://`) and cloud
//! (WebSocket) connections. Every connection selects the namespace/database
//! and runs schema initialisation before it is handed out.

use surrealdb::engine::any::Any;
use surrealdb::opt::auth::{Database, Root};
use surrealdb::Surreal;
use tracing::{info, instrument};

use crate::error::StateError;
use crate::migrations;
use crate::Result;

const DEFAULT_NAMESPACE: &str = "strata";
const DEFAULT_DATABASE: &str = "main";
const LOCAL_DB_PATH: &str = ".strata/db";

/// Remote (cloud) connection settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloudConfig {
    /// WebSocket endpoint, e.g. `wss://xxx.aws-use1.surrealdb.cloud`
    pub endpoint: String,
    pub username: String,
    pub password: String,
    pub namespace: String,
    pub database: String,
    /// Sign in as a root user rather than a database user
    pub is_root: bool,
}

impl CloudConfig {
    /// Read the `SURREALDB_*` variables from the process environment.
    pub fn from_env() -> Result<Option<Self>> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build the config from `SURREALDB_ENDPOINT`, `SURREALDB_USERNAME`,
    /// `SURREALDB_PASSWORD` and the optional `SURREALDB_NAMESPACE`,
    /// `SURREALDB_DATABASE` and `SURREALDB_ROOT`.
    ///
    /// `Ok(None)` when no endpoint is set. An endpoint without credentials
    /// is an error, not a silent fallback to local storage.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Option<Self>> {
        let Some(endpoint) = lookup("SURREALDB_ENDPOINT") else {
            return Ok(None);
        };
        let required = |var: &str| {
            lookup(var).ok_or_else(|| {
                StateError::Connection(format!("SURREALDB_ENDPOINT is set but {var} is not"))
            })
        };

        Ok(Some(Self {
            endpoint,
            username: required("SURREALDB_USERNAME")?,
            password: required("SURREALDB_PASSWORD")?,
            namespace: lookup("SURREALDB_NAMESPACE")
                .unwrap_or_else(|| DEFAULT_NAMESPACE.to_string()),
            database: lookup("SURREALDB_DATABASE").unwrap_or_else(|| DEFAULT_DATABASE.to_string()),
            is_root: lookup("SURREALDB_ROOT").is_some_and(|v| v.eq_ignore_ascii_case("true")),
        }))
    }
}

/// Connect to `url`, select the default namespace/database and init the schema.
#[instrument(skip_all, fields(url = %url))]
pub(crate) async fn connect_url(url: &str) -> Result<Surreal<Any>> {
    let db = surrealdb::engine::any::connect(url)
        .await
        .map_err(|e| StateError::Connection(format!("Failed to connect to {}: {}", url, e)))?;

    db.use_ns(DEFAULT_NAMESPACE)
        .use_db(DEFAULT_DATABASE)
        .await
        .map_err(|e| StateError::Connection(e.to_string()))?;

    migrations::init_schema(&db).await?;
    Ok(db)
}

/// Connect to SurrealDB Cloud
#[instrument(skip(config), fields(endpoint = %config.endpoint, namespace = %config.namespace, database = %config.database))]
pub(crate) async fn connect_cloud(config: &CloudConfig) -> Result<Surreal<Any>> {
    info!("Connecting to SurrealDB Cloud (root={})", config.is_root);

    let db = surrealdb::engine::any::connect(&config.endpoint)
        .await
        .map_err(|e| {
            StateError::Connection(format!("Failed to connect to {}: {}", config.endpoint, e))
        })?;

    if config.is_root {
        db.signin(Root {
            username: &config.username,
            password: &config.password,
        })
        .await
        .map_err(|e| StateError::Connection(format!("Root authentication failed: {}", e)))?;
    } else {
        db.signin(Database {
            namespace: &config.namespace,
            database: &config.database,
            username: &config.username,
            password: &config.password,
        })
        .await
        .map_err(|e| StateError::Connection(format!("Database authentication failed: {}", e)))?;
    }

    db.use_ns(&config.namespace)
        .use_db(&config.database)
        .await
        .map_err(|e| {
            StateError::Connection(format!("Failed to select namespace/database: {}", e))
        })?;

    migrations::init_schema(&db).await?;
    info!("SurrealDB Cloud connected and schema initialized");
    Ok(db)
}

/// Connect using environment variables
///
/// If SURREALDB_ENDPOINT is set, connects to cloud.
/// If SURREALDB_URL is set, connects to that URL.
/// Otherwise, falls back to local persistence under `.strata/db`.
#[instrument(skip_all)]
pub(crate) async fn connect_from_env() -> Result<Surreal<Any>> {
    if let Some(config) = CloudConfig::from_env()? {
        info!("Cloud config found, connecting to SurrealDB Cloud");
        return connect_cloud(&config).await;
    }

    if let Ok(url) = std::env::var("SURREALDB_URL") {
        info!("SURREALDB_URL found, connecting to {}", url);
        return connect_url(&url).await;
    }

    std::fs::create_dir_all(LOCAL_DB_PATH).map_err(|e| {
        StateError::Connection(format!(
            "Failed to create database directory {}: {}",
            LOCAL_DB_PATH, e
        ))
    })?;
    let url = format!("surrealkv://{}", LOCAL_DB_PATH);
    info!(
        "No cloud config or SURREALDB_URL found, using local persistence: {}",
        url
    );
    connect_url(&url).await
}
