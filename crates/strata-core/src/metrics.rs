//! Global atomic counters for consolidation observability.
//!
//! Counters are incremented at the call site. [`Metrics::flush`] emits the
//! current values as a single `tracing::info!` event; the orchestrator
//! calls it at the end of every cycle.

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

/// Lightweight atomic counters, no allocations and no locking.
pub struct Metrics {
    cycles_run: AtomicU64,
    summaries_created: AtomicU64,
    edges_created: AtomicU64,
    nodes_purged: AtomicU64,
    periods_failed: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            cycles_run: AtomicU64::new(0),
            summaries_created: AtomicU64::new(0),
            edges_created: AtomicU64::new(0),
            nodes_purged: AtomicU64::new(0),
            periods_failed: AtomicU64::new(0),
        }
    }

    pub fn inc_cycles(&self) {
        self.cycles_run.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_summaries(&self) {
        self.summaries_created.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_edges(&self, n: u64) {
        self.edges_created.fetch_add(n, Ordering::Relaxed);
    }

    pub fn add_purged(&self, n: u64) {
        self.nodes_purged.fetch_add(n, Ordering::Relaxed);
    }

    pub fn inc_periods_failed(&self) {
        self.periods_failed.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "periods_failed", "counter incremented");
    }

    /// Emit all current counter values as a single `info!` event.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            cycles_run = self.cycles_run(),
            summaries_created = self.summaries_created(),
            edges_created = self.edges_created(),
            nodes_purged = self.nodes_purged(),
            periods_failed = self.periods_failed(),
        );
    }

    pub fn cycles_run(&self) -> u64 {
        self.cycles_run.load(Ordering::Relaxed)
    }

    pub fn summaries_created(&self) -> u64 {
        self.summaries_created.load(Ordering::Relaxed)
    }

    pub fn edges_created(&self) -> u64 {
        self.edges_created.load(Ordering::Relaxed)
    }

    pub fn nodes_purged(&self) -> u64 {
        self.nodes_purged.load(Ordering::Relaxed)
    }

    pub fn periods_failed(&self) -> u64 {
        self.periods_failed.load(Ordering::Relaxed)
    }

    /// Reset all counters to zero (useful in tests).
    pub fn reset(&self) {
        self.cycles_run.store(0, Ordering::Relaxed);
        self.summaries_created.store(0, Ordering::Relaxed);
        self.edges_created.store(0, Ordering::Relaxed);
        self.nodes_purged.store(0, Ordering::Relaxed);
        self.periods_failed.store(0, Ordering::Relaxed);
    }
}
