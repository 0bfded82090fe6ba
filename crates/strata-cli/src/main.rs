//! Strata - tiered consolidation CLI
//!
//! The `strata` command drives the consolidation engine by hand.
//!
//! ## Commands
//!
//! - `cycle`: run one consolidation cycle
//! - `backfill`: consolidate an explicit historical range
//! - `status`: check whether a period has been consolidated
//! - `periods`: list the aligned periods of a tier
//! - `ingest`: load raw records from a JSON Lines file

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use serde::Deserialize;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, Level};

use strata_core::{
    compute_periods, is_due, CycleReport, EngineConfig, GraphStore, Orchestrator, Period,
    RawRecord, RecordKind, Tier,
};
use strata_store::{SurrealGraphStore, WriteOutcome};

#[derive(Parser)]
#[command(name = "strata")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Tiered consolidation of agent runtime records", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Engine configuration file (TOML); falls back to STRATA_CONFIG
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Store URL (mem://, surrealkv://path, ws://host); falls back to the
    /// SURREALDB_* environment
    #[arg(long, global = true, env = "STRATA_DB_URL")]
    db: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one consolidation cycle
    Cycle {
        /// Instant to run the cycle at (RFC 3339, default: now)
        #[arg(long)]
        now: Option<DateTime<Utc>>,
    },

    /// Consolidate and link a historical range without purging anything
    Backfill {
        /// Range start (RFC 3339)
        #[arg(long)]
        from: DateTime<Utc>,

        /// Range end, exclusive (RFC 3339)
        #[arg(long)]
        to: DateTime<Utc>,

        /// Instant deciding which periods are due (default: now)
        #[arg(long)]
        now: Option<DateTime<Utc>>,
    },

    /// Show whether the period containing an instant is consolidated
    Status {
        /// Record kind (metrics, audit, traces, conversations, tasks)
        #[arg(short, long)]
        kind: RecordKind,

        /// Tier (basic, daily, weekly, monthly)
        #[arg(short, long)]
        tier: Tier,

        /// Any instant inside the period (RFC 3339)
        #[arg(long)]
        at: DateTime<Utc>,
    },

    /// List the aligned periods of a tier over a range
    Periods {
        /// Tier (basic, daily, weekly, monthly)
        #[arg(short, long)]
        tier: Tier,

        /// Range start (RFC 3339)
        #[arg(long)]
        from: DateTime<Utc>,

        /// Range end, exclusive (RFC 3339)
        #[arg(long)]
        to: DateTime<Utc>,

        /// Instant used to mark periods as due (default: now)
        #[arg(long)]
        now: Option<DateTime<Utc>>,
    },

    /// Load raw records from a JSON Lines file
    Ingest {
        /// Record kind of every line
        #[arg(short, long)]
        kind: RecordKind,

        /// File with one `{"id", "timestamp", "payload"}` object per line
        #[arg(short, long)]
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    strata_core::telemetry::init_tracing(cli.json, level);

    // Pure calendar arithmetic; no store needed.
    if let Commands::Periods {
        tier,
        from,
        to,
        now,
    } = &cli.command
    {
        return cmd_periods(*tier, *from, *to, now.unwrap_or_else(Utc::now));
    }

    let config = load_config(cli.config.as_deref())?;
    let store: Arc<dyn GraphStore> = Arc::new(
        connect(cli.db.as_deref())
            .await
            .context("Failed to connect to the graph store")?,
    );

    match cli.command {
        Commands::Cycle { now } => cmd_cycle(store, config, now.unwrap_or_else(Utc::now)).await,
        Commands::Backfill { from, to, now } => {
            cmd_backfill(store, config, from, to, now.unwrap_or_else(Utc::now)).await
        }
        Commands::Status { kind, tier, at } => cmd_status(store, config, kind, tier, at).await,
        Commands::Ingest { kind, file } => cmd_ingest(store.as_ref(), kind, &file)
            .await
            .map(|_| ()),
        Commands::Periods { .. } => Ok(()),
    }
}

fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    match path {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display())),
        None => EngineConfig::from_env().context("Invalid engine configuration"),
    }
}

async fn connect(url: Option<&str>) -> strata_store::Result<SurrealGraphStore> {
    match url {
        Some(url) => SurrealGraphStore::connect(url).await,
        None => SurrealGraphStore::from_env().await,
    }
}

/// Run one cycle and print its report
async fn cmd_cycle(
    store: Arc<dyn GraphStore>,
    config: EngineConfig,
    now: DateTime<Utc>,
) -> Result<()> {
    let report = Orchestrator::new(store, config)
        .trigger_consolidation_cycle(now)
        .await;
    print_report(&report);
    check_report(&report)
}

/// Consolidate `[from, to)` as of `now`
async fn cmd_backfill(
    store: Arc<dyn GraphStore>,
    config: EngineConfig,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<()> {
    if from >= to {
        bail!("--from must be before --to");
    }
    info!(%from, %to, "backfilling");
    let report = Orchestrator::new(store, config).backfill(from, to, now).await;
    print_report(&report);
    check_report(&report)
}

/// Show consolidation status of one period
async fn cmd_status(
    store: Arc<dyn GraphStore>,
    config: EngineConfig,
    kind: RecordKind,
    tier: Tier,
    at: DateTime<Utc>,
) -> Result<()> {
    let period = Period::containing(tier, at)?;
    let consolidated = Orchestrator::new(store, config)
        .consolidation_status(kind, &period)
        .await
        .context("Failed to read consolidation status")?;

    let state = if consolidated {
        "consolidated"
    } else {
        "pending"
    };
    println!("{} {} [{} .. {}): {}", kind, period, period.start, period.end, state);
    Ok(())
}

/// One row of `strata periods`
fn period_rows(
    tier: Tier,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<Vec<String>> {
    let periods = compute_periods(tier, from, to)?;
    Ok(periods
        .iter()
        .map(|p| {
            let due = if is_due(p, now) { "due" } else { "open" };
            format!(
                "{:<14} {} {} {}",
                p.label,
                p.start.format("%Y-%m-%d %H:%M"),
                p.end.format("%Y-%m-%d %H:%M"),
                due
            )
        })
        .collect())
}

/// List aligned periods
fn cmd_periods(
    tier: Tier,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<()> {
    let rows = period_rows(tier, from, to, now)?;
    if rows.is_empty() {
        println!("No {} periods in range", tier);
        return Ok(());
    }
    for row in rows {
        println!("{}", row);
    }
    Ok(())
}

/// One line of an ingest file.
#[derive(Debug, Deserialize)]
struct IngestLine {
    #[serde(default)]
    id: Option<String>,
    timestamp: DateTime<Utc>,
    payload: serde_json::Value,
}

fn parse_line(kind: RecordKind, line: &str) -> Result<RawRecord> {
    let parsed: IngestLine = serde_json::from_str(line)?;
    let id = parsed
        .id
        .unwrap_or_else(|| format!("{}-{}", kind, uuid::Uuid::new_v4()));
    Ok(RawRecord::new(id, kind, parsed.timestamp, parsed.payload))
}

/// Counts printed by `strata ingest`.
#[derive(Debug, Default, PartialEq, Eq)]
struct IngestCounts {
    created: u64,
    existing: u64,
}

/// Store every record of a JSON Lines file; blank lines are ignored
async fn cmd_ingest(store: &dyn GraphStore, kind: RecordKind, file: &Path) -> Result<IngestCounts> {
    let handle = std::fs::File::open(file)
        .with_context(|| format!("Failed to open {}", file.display()))?;

    let mut counts = IngestCounts::default();
    for (index, line) in BufReader::new(handle).lines().enumerate() {
        let line = line.with_context(|| format!("Failed to read {}", file.display()))?;
        if line.trim().is_empty() {
            continue;
        }
        let record = parse_line(kind, &line)
            .with_context(|| format!("{}:{}: invalid record", file.display(), index + 1))?;
        match store.upsert_node(record.to_node()).await? {
            WriteOutcome::Created => counts.created += 1,
            WriteOutcome::AlreadyExisted => counts.existing += 1,
        }
    }

    println!(
        "Ingested {} {} records ({} already present)",
        counts.created, kind, counts.existing
    );
    Ok(counts)
}

fn print_report(report: &CycleReport) {
    println!("cycle {}", report.cycle_id);
    println!("Now:       {}", report.now.format("%Y-%m-%d %H:%M:%S UTC"));
    println!("Periods:   {}", report.periods_processed);
    println!("Summaries: {}", report.summaries_created);
    println!("Edges:     {}", report.edges_created);
    println!("Purged:    {}", report.nodes_purged);
    println!("Skipped:   {}", report.records_skipped);
    for err in &report.errors {
        let kind = err.kind.map(|k| k.to_string()).unwrap_or_else(|| "*".into());
        println!("  ! {} {} {}: {}", kind, err.tier, err.period_label, err.message);
    }
}

fn check_report(report: &CycleReport) -> Result<()> {
    if report.is_clean() {
        Ok(())
    } else {
        bail!("cycle finished with {} error(s)", report.errors.len())
    }
}
