//! Structured observability hooks for consolidation cycles.
//!
//! This module provides:
//! - A cycle-scoped tracing span carrying the `cycle_id`
//! - Emission functions for the lifecycle events operators alert on
//!
//! Events are emitted at `info!` level, failures at `warn!`. Filter with
//! `RUST_LOG`; see [`crate::telemetry::init_tracing`] for JSON output.

use tracing::{info, warn};

use crate::model::{RecordKind, Tier};
use crate::orchestrator::CycleReport;

/// Span every event of one cycle is recorded under.
///
/// Attach it with `tracing::Instrument` so it follows the cycle across
/// await points.
pub fn cycle_span(cycle_id: &str) -> tracing::Span {
    tracing::info_span!("strata.cycle", cycle_id = %cycle_id)
}

/// Emit event: cycle started.
pub fn emit_cycle_started(cycle_id: &str, now: &chrono::DateTime<chrono::Utc>) {
    info!(event = "cycle.started", cycle_id = %cycle_id, now = %now);
}

/// Emit event: cycle finished, with its counters.
pub fn emit_cycle_finished(report: &CycleReport, duration_ms: u64) {
    info!(
        event = "cycle.finished",
        cycle_id = %report.cycle_id,
        duration_ms = duration_ms,
        periods_processed = report.periods_processed,
        summaries_created = report.summaries_created,
        edges_created = report.edges_created,
        nodes_purged = report.nodes_purged,
        records_skipped = report.records_skipped,
        errors = report.errors.len(),
    );
}

/// Emit event: a summary was written.
pub fn emit_period_consolidated(kind: RecordKind, tier: Tier, label: &str, source_count: u64) {
    info!(
        event = "period.consolidated",
        kind = %kind,
        tier = %tier,
        period = %label,
        source_count = source_count,
    );
}

/// Emit event: a period failed this cycle (warning level).
pub fn emit_period_failed(kind: RecordKind, tier: Tier, label: &str, error: &dyn std::fmt::Display) {
    warn!(
        event = "period.failed",
        kind = %kind,
        tier = %tier,
        period = %label,
        error = %error,
    );
}

/// Emit event: a stored summary differs from the one just recomputed.
pub fn emit_summary_drift(summary_id: &str, stored: &str, recomputed: &str) {
    warn!(
        event = "summary.drift",
        summary_id = %summary_id,
        stored_digest = %stored,
        recomputed_digest = %recomputed,
    );
}

/// Emit event: a delete removed a different number of nodes than requested.
pub fn emit_purge_mismatch(kind: RecordKind, label: &str, requested: u64, deleted: u64) {
    warn!(
        event = "purge.mismatch",
        kind = %kind,
        period = %label,
        requested = requested,
        deleted = deleted,
    );
}

/// Emit event: raw records arrived in a block after its summary was
/// written; the block is kept instead of purged.
pub fn emit_uncovered_records(kind: RecordKind, label: &str, seen: u64, present: u64) {
    warn!(
        event = "purge.uncovered_records",
        kind = %kind,
        period = %label,
        summarized = seen,
        present = present,
    );
}
