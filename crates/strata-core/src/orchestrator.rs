//! Consolidation cycle driver.
//!
//! A cycle walks the tiers bottom-up over a look-back window. Within a
//! tier every record kind is an independent lineage and runs as its own
//! worker task, bounded by `max_parallel`; inside a lineage periods are
//! visited oldest first so temporal linking finds its predecessor already
//! written. After the daily tier, summaries sharing a day are cross-linked.
//! Cleanup runs last.
//!
//! Nothing here needs a lock. Summary ids are deterministic and every write
//! is insert-if-absent, so overlapping cycles converge on the same graph.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strata_store::{GraphStore, WriteOutcome};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn, Instrument};
use uuid::Uuid;

use crate::cleanup::{CleanupManager, RetentionPolicy};
use crate::clock::{Clock, SystemClock};
use crate::config::EngineConfig;
use crate::consolidate::consolidate;
use crate::edges::EdgeManager;
use crate::error::{ConsolidationError, Result};
use crate::metrics::METRICS;
use crate::model::{stored_digest, Period, RecordKind, Tier};
use crate::obs;
use crate::period_manager::{compute_periods, is_due, PeriodManager};
use crate::query::QueryManager;

/// One failure recorded during a cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodError {
    /// `None` when the failure spans every kind (e.g. same-day linking).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<RecordKind>,
    pub tier: Tier,
    pub period_label: String,
    pub message: String,
}

impl PeriodError {
    fn new(
        kind: Option<RecordKind>,
        tier: Tier,
        period_label: impl Into<String>,
        err: &dyn std::fmt::Display,
    ) -> Self {
        Self {
            kind,
            tier,
            period_label: period_label.into(),
            message: err.to_string(),
        }
    }
}

/// Outcome of one cycle; the operator-facing signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleReport {
    pub cycle_id: String,
    pub now: DateTime<Utc>,
    /// Period attempts that completed, whether or not they wrote anything.
    pub periods_processed: u64,
    pub summaries_created: u64,
    pub edges_created: u64,
    pub nodes_purged: u64,
    /// Inputs skipped by validation.
    pub records_skipped: u64,
    pub errors: Vec<PeriodError>,
}

impl CycleReport {
    fn new(cycle_id: String, now: DateTime<Utc>) -> Self {
        Self {
            cycle_id,
            now,
            periods_processed: 0,
            summaries_created: 0,
            edges_created: 0,
            nodes_purged: 0,
            records_skipped: 0,
            errors: Vec::new(),
        }
    }

    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }

    fn absorb(&mut self, part: LineageReport) {
        self.periods_processed += part.periods_processed;
        self.summaries_created += part.summaries_created;
        self.edges_created += part.edges_created;
        self.nodes_purged += part.nodes_purged;
        self.records_skipped += part.records_skipped;
        self.errors.extend(part.errors);
    }
}

/// Counters of one worker, folded into the cycle report.
#[derive(Debug, Default)]
struct LineageReport {
    periods_processed: u64,
    summaries_created: u64,
    edges_created: u64,
    nodes_purged: u64,
    records_skipped: u64,
    errors: Vec<PeriodError>,
}

impl LineageReport {
    /// Record a failure. Returns `true` when the lineage should stop for
    /// this cycle because the store is gone.
    fn fail(&mut self, kind: RecordKind, tier: Tier, label: &str, err: &ConsolidationError) -> bool {
        obs::emit_period_failed(kind, tier, label, err);
        METRICS.inc_periods_failed();
        self.errors.push(PeriodError::new(Some(kind), tier, label, err));
        if err.is_store_unavailable() {
            warn!(kind = %kind, tier = %tier, "store unavailable, remaining periods deferred");
            true
        } else {
            false
        }
    }
}

/// Everything a lineage worker needs; cheap to clone into a task.
#[derive(Clone)]
struct Worker {
    store: Arc<dyn GraphStore>,
    periods: PeriodManager,
    query: QueryManager,
    edges: EdgeManager,
    cleanup: CleanupManager,
}

impl Worker {
    async fn consolidate_lineage(
        &self,
        kind: RecordKind,
        tier: Tier,
        periods: &[Period],
    ) -> LineageReport {
        let mut report = LineageReport::default();
        for period in periods {
            match self.consolidate_period(kind, tier, period, &mut report).await {
                Ok(()) => report.periods_processed += 1,
                Err(err) => {
                    if report.fail(kind, tier, &period.label, &err) {
                        break;
                    }
                }
            }
        }
        report
    }

    async fn consolidate_period(
        &self,
        kind: RecordKind,
        tier: Tier,
        period: &Period,
        report: &mut LineageReport,
    ) -> Result<()> {
        if self.periods.is_consolidated(kind, tier, period).await? {
            // Links deferred by an earlier failure or an out-of-order backfill.
            let created = self.edges.reconcile_temporal(kind, tier, period).await?;
            report.edges_created += created;
            METRICS.add_edges(created);
            return Ok(());
        }

        let inputs = self.query.fetch_inputs(kind, tier, period).await?;
        let consolidation = consolidate(kind, tier, period, &inputs)?;
        report.records_skipped += consolidation.skipped;
        let Some(summary) = consolidation.summary else {
            debug!(kind = %kind, period = %period, "no valid inputs, period left open");
            return Ok(());
        };

        match self.store.upsert_node(summary.to_node()?).await? {
            WriteOutcome::Created => {
                report.summaries_created += 1;
                METRICS.inc_summaries();
                obs::emit_period_consolidated(kind, tier, &period.label, summary.source_count);
            }
            WriteOutcome::AlreadyExisted => {
                // A concurrent cycle won the write; check it agrees with us.
                if let Some(existing) = self.store.get_node(&summary.id).await? {
                    let stored = stored_digest(&existing).unwrap_or_default();
                    if stored != summary.content_digest {
                        obs::emit_summary_drift(summary.id.as_str(), stored, &summary.content_digest);
                    }
                }
            }
        }

        match self.edges.link_temporal(&summary).await {
            Ok(created) => {
                report.edges_created += created;
                METRICS.add_edges(created);
            }
            Err(err) => {
                report.fail(kind, tier, &period.label, &err);
            }
        }
        Ok(())
    }

    async fn cleanup_lineage(
        &self,
        kind: RecordKind,
        basic: &[Period],
        days: &[Period],
        now: DateTime<Utc>,
    ) -> LineageReport {
        let mut report = LineageReport::default();
        if self.cleanup.policy().is_exempt(kind) {
            debug!(kind = %kind, "purge-exempt, cleanup skipped");
            return report;
        }

        // Raw first: it is gated on the basic summaries the second pass deletes.
        for period in basic {
            match self.cleanup.purge_raw(kind, period, now).await {
                Ok(outcome) => report.nodes_purged += outcome.deleted(),
                Err(err) => {
                    if report.fail(kind, Tier::Basic, &period.label, &err) {
                        return report;
                    }
                }
            }
        }
        for day in days {
            match self.cleanup.purge_lower_tier(kind, day, now).await {
                Ok(outcome) => report.nodes_purged += outcome.deleted(),
                Err(err) => {
                    if report.fail(kind, Tier::Daily, &day.label, &err) {
                        return report;
                    }
                }
            }
        }
        METRICS.add_purged(report.nodes_purged);
        report
    }
}

/// Drives consolidation cycles against one store.
pub struct Orchestrator {
    config: EngineConfig,
    clock: Arc<dyn Clock>,
    worker: Worker,
    limiter: Arc<Semaphore>,
}

impl Orchestrator {
    pub fn new(store: Arc<dyn GraphStore>, config: EngineConfig) -> Self {
        let worker = Worker {
            periods: PeriodManager::new(Arc::clone(&store)),
            query: QueryManager::new(Arc::clone(&store)),
            edges: EdgeManager::new(Arc::clone(&store)),
            cleanup: CleanupManager::new(Arc::clone(&store), RetentionPolicy::from_config(&config)),
            store,
        };
        Self {
            limiter: Arc::new(Semaphore::new(config.max_parallel.max(1))),
            config,
            clock: Arc::new(SystemClock),
            worker,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run one cycle at the clock's current time.
    pub async fn tick(&self) -> CycleReport {
        self.run_cycle(self.clock.now()).await
    }

    /// Entry point for schedulers and operators.
    pub async fn trigger_consolidation_cycle(&self, now: DateTime<Utc>) -> CycleReport {
        self.run_cycle(now).await
    }

    /// Consolidate, link and clean up every due period in
    /// `[now - lookback, now)`.
    pub async fn run_cycle(&self, now: DateTime<Utc>) -> CycleReport {
        let cycle_id = Uuid::new_v4().to_string();
        let span = obs::cycle_span(&cycle_id);
        self.run(cycle_id, now - self.config.lookback(), now, now, true)
            .instrument(span)
            .await
    }

    /// Consolidate an explicit historical range. Periods are linked into
    /// whatever already exists on both sides; nothing is purged.
    pub async fn backfill(
        &self,
        range_start: DateTime<Utc>,
        range_end: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> CycleReport {
        let cycle_id = Uuid::new_v4().to_string();
        let span = obs::cycle_span(&cycle_id);
        self.run(cycle_id, range_start, range_end, now, false)
            .instrument(span)
            .await
    }

    /// Whether `(kind, period.tier, period)` has a summary.
    pub async fn consolidation_status(&self, kind: RecordKind, period: &Period) -> Result<bool> {
        self.worker
            .periods
            .is_consolidated(kind, period.tier, period)
            .await
    }

    async fn run(
        &self,
        cycle_id: String,
        range_start: DateTime<Utc>,
        range_end: DateTime<Utc>,
        now: DateTime<Utc>,
        with_cleanup: bool,
    ) -> CycleReport {
        let started = Instant::now();
        obs::emit_cycle_started(&cycle_id, &now);
        METRICS.inc_cycles();
        let mut report = CycleReport::new(cycle_id, now);

        let mut basic = Vec::new();
        let mut days = Vec::new();
        for tier in Tier::ALL {
            let due = match compute_periods(tier, range_start, range_end) {
                Ok(periods) => periods
                    .into_iter()
                    .filter(|p| is_due(p, now))
                    .collect::<Vec<_>>(),
                Err(err) => {
                    report
                        .errors
                        .push(PeriodError::new(None, tier, "", &err));
                    continue;
                }
            };
            debug!(tier = %tier, due = due.len(), "due periods");

            let due = Arc::new(due);
            let lineages = self.config.kinds.iter().map(|&kind| {
                let worker = self.worker.clone();
                let periods = Arc::clone(&due);
                (kind, async move {
                    worker.consolidate_lineage(kind, tier, &periods).await
                })
            });
            self.run_workers(tier, lineages, &mut report).await;

            match tier {
                Tier::Basic => basic = due.to_vec(),
                Tier::Daily => {
                    self.link_same_days(&due, &mut report).await;
                    days = due.to_vec();
                }
                Tier::Weekly | Tier::Monthly => {}
            }
        }

        if with_cleanup {
            let basic = Arc::new(basic);
            let days = Arc::new(days);
            let lineages = self.config.kinds.iter().map(|&kind| {
                let worker = self.worker.clone();
                let (basic, days) = (Arc::clone(&basic), Arc::clone(&days));
                (kind, async move {
                    worker.cleanup_lineage(kind, &basic, &days, now).await
                })
            });
            self.run_workers(Tier::Basic, lineages, &mut report).await;
        }

        report.errors.sort_by(|a, b| {
            (a.tier, a.kind, &a.period_label).cmp(&(b.tier, b.kind, &b.period_label))
        });
        METRICS.flush();
        obs::emit_cycle_finished(&report, started.elapsed().as_millis() as u64);
        report
    }

    /// Spawn one task per lineage, at most `max_parallel` running at once,
    /// and fold their reports in.
    async fn run_workers<F>(
        &self,
        tier: Tier,
        lineages: impl Iterator<Item = (RecordKind, F)>,
        report: &mut CycleReport,
    ) where
        F: std::future::Future<Output = LineageReport> + Send + 'static,
    {
        let mut handles = Vec::new();
        for (kind, lineage) in lineages {
            let limiter = Arc::clone(&self.limiter);
            let task = tokio::spawn(
                async move {
                    let _permit = limiter.acquire_owned().await.ok();
                    lineage.await
                }
                .instrument(tracing::Span::current()),
            );
            handles.push((kind, task));
        }

        let kinds: Vec<RecordKind> = handles.iter().map(|(kind, _)| *kind).collect();
        let results = futures::future::join_all(handles.into_iter().map(|(_, task)| task)).await;
        for (kind, result) in kinds.into_iter().zip(results) {
            match result {
                Ok(part) => report.absorb(part),
                Err(join_err) => {
                    warn!(kind = %kind, tier = %tier, error = %join_err, "lineage worker died");
                    report
                        .errors
                        .push(PeriodError::new(Some(kind), tier, "", &join_err));
                }
            }
        }
    }

    /// Cross-link the daily summaries of each due day.
    async fn link_same_days(&self, days: &[Period], report: &mut CycleReport) {
        for day in days {
            match self.link_day(day).await {
                Ok(created) => {
                    report.edges_created += created;
                    METRICS.add_edges(created);
                }
                Err(err) => {
                    report
                        .errors
                        .push(PeriodError::new(None, Tier::Daily, day.label.as_str(), &err));
                    if err.is_store_unavailable() {
                        warn!("store unavailable, same-day linking deferred");
                        break;
                    }
                }
            }
        }
        info!(days = days.len(), "same-day linking done");
    }

    async fn link_day(&self, day: &Period) -> Result<u64> {
        let summaries = self
            .worker
            .query
            .daily_summaries(&self.config.kinds, day)
            .await?;
        if summaries.len() < 2 {
            return Ok(0);
        }
        self.worker.edges.link_same_day(day.day(), &summaries).await
    }
}
