//! Strata daemon: runs a consolidation cycle every `cycle_interval_secs`
//! until interrupted.

use std::future::Future;
use std::sync::Arc;

use anyhow::{Context, Result};
use strata_core::{EngineConfig, Orchestrator};
use strata_store::SurrealGraphStore;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn, Level};

const LOG_FORMAT_VAR: &str = "STRATA_LOG_FORMAT";

#[tokio::main]
async fn main() -> Result<()> {
    let json = std::env::var(LOG_FORMAT_VAR).is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    strata_core::telemetry::init_tracing(json, Level::INFO);

    let config = EngineConfig::from_env().context("Invalid engine configuration")?;
    let store = SurrealGraphStore::from_env()
        .await
        .context("Failed to connect to the graph store")?;

    info!(
        interval_secs = config.cycle_interval_secs,
        lookback_days = config.lookback_days,
        "stratad started"
    );
    let engine = Orchestrator::new(Arc::new(store), config);
    let cycles = run(&engine, async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    })
    .await;

    info!(cycles, "stratad stopped");
    Ok(())
}

/// Tick the engine on its interval until `shutdown` resolves. The first
/// cycle runs immediately; a cycle in progress is finished before stopping.
async fn run(engine: &Orchestrator, shutdown: impl Future<Output = ()>) -> u64 {
    let mut interval = tokio::time::interval(engine.config().cycle_interval());
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    tokio::pin!(shutdown);

    let mut cycles = 0;
    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("shutdown requested");
                break;
            }
            _ = interval.tick() => {
                let report = engine.tick().await;
                cycles += 1;
                if !report.is_clean() {
                    warn!(
                        cycle_id = %report.cycle_id,
                        errors = report.errors.len(),
                        "cycle finished with errors"
                    );
                }
            }
        }
    }
    cycles
}
