//! Retention-gated deletion of superseded data.
//!
//! Data is deleted only when all three gates hold: the kind is not
//! purge-exempt, the retention window has elapsed since the period ended,
//! and the covering summary exists in the store. No gate is inferred from
//! another. Raw records are also kept while their block holds more of them
//! than its summary counted. Deleting a node also deletes every edge
//! touching it.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use strata_store::{GraphStore, NodeId};
use tracing::{debug, instrument};

use crate::config::EngineConfig;
use crate::error::{ConsolidationError, Result};
use crate::model::{summary_id, Period, RecordKind, SummaryNode, Tier};
use crate::obs;
use crate::period_manager::PeriodManager;
use crate::query::QueryManager;

/// Why a purge call deleted nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// The kind is purge-exempt.
    Exempt,
    /// The retention window has not elapsed yet.
    WithinRetention,
    /// The covering summary does not exist.
    NotConsolidated,
    /// Raw records arrived after the basic summary was written, so deleting
    /// them would lose data no summary holds.
    UncoveredRecords,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PurgeOutcome {
    Purged { requested: u64, deleted: u64 },
    Skipped(SkipReason),
}

impl PurgeOutcome {
    pub fn deleted(&self) -> u64 {
        match self {
            PurgeOutcome::Purged { deleted, .. } => *deleted,
            PurgeOutcome::Skipped(_) => 0,
        }
    }
}

/// Purge policy: static exemptions plus retention windows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetentionPolicy {
    pub raw_retention: Duration,
    pub summary_retention: Duration,
    pub exempt: BTreeSet<RecordKind>,
}

impl RetentionPolicy {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            raw_retention: config.raw_retention(),
            summary_retention: config.summary_retention(),
            exempt: config.exempt_kinds(),
        }
    }

    pub fn is_exempt(&self, kind: RecordKind) -> bool {
        kind.exempt_from_purge() || self.exempt.contains(&kind)
    }
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}

#[derive(Clone)]
pub struct CleanupManager {
    store: Arc<dyn GraphStore>,
    periods: PeriodManager,
    query: QueryManager,
    policy: RetentionPolicy,
}

impl CleanupManager {
    pub fn new(store: Arc<dyn GraphStore>, policy: RetentionPolicy) -> Self {
        Self {
            periods: PeriodManager::new(Arc::clone(&store)),
            query: QueryManager::new(Arc::clone(&store)),
            store,
            policy,
        }
    }

    pub fn policy(&self) -> &RetentionPolicy {
        &self.policy
    }

    /// Delete the raw records of a basic period once its basic summary
    /// exists and `raw_retention` has passed since the period ended.
    ///
    /// The block is left alone, with a warning, when it holds more raw
    /// records than the summary saw.
    #[instrument(skip(self, period, now), fields(kind = %kind, period = %period.label))]
    pub async fn purge_raw(
        &self,
        kind: RecordKind,
        period: &Period,
        now: DateTime<Utc>,
    ) -> Result<PurgeOutcome> {
        require_tier(period, Tier::Basic, "raw purge")?;
        if let Some(reason) = self
            .gate(kind, Tier::Basic, period, now, self.policy.raw_retention)
            .await?
        {
            return Ok(PurgeOutcome::Skipped(reason));
        }

        let ids = self
            .query
            .fetch_node_ids(&kind.raw_node_type(), period)
            .await?;
        let present = ids.len() as u64;
        let Some(node) = self
            .store
            .get_node(&summary_id(kind, Tier::Basic, period))
            .await?
        else {
            return Ok(PurgeOutcome::Skipped(SkipReason::NotConsolidated));
        };
        let seen = SummaryNode::from_node(&node)?.inputs_seen();
        if present > seen {
            obs::emit_uncovered_records(kind, &period.label, seen, present);
            return Ok(PurgeOutcome::Skipped(SkipReason::UncoveredRecords));
        }
        self.delete(kind, period, &ids).await
    }

    /// Delete the basic summaries of a day once its daily summary exists and
    /// `summary_retention` has passed since the day ended.
    #[instrument(skip(self, day, now), fields(kind = %kind, day = %day.label))]
    pub async fn purge_lower_tier(
        &self,
        kind: RecordKind,
        day: &Period,
        now: DateTime<Utc>,
    ) -> Result<PurgeOutcome> {
        require_tier(day, Tier::Daily, "lower-tier purge")?;
        if let Some(reason) = self
            .gate(kind, Tier::Daily, day, now, self.policy.summary_retention)
            .await?
        {
            return Ok(PurgeOutcome::Skipped(reason));
        }

        let ids = self
            .query
            .fetch_node_ids(&kind.summary_node_type(Tier::Basic), day)
            .await?;
        self.delete(kind, day, &ids).await
    }

    /// Cheapest gate first; the store is consulted last.
    async fn gate(
        &self,
        kind: RecordKind,
        covering_tier: Tier,
        period: &Period,
        now: DateTime<Utc>,
        retention: Duration,
    ) -> Result<Option<SkipReason>> {
        if self.policy.is_exempt(kind) {
            return Ok(Some(SkipReason::Exempt));
        }
        if now - period.end <= retention {
            return Ok(Some(SkipReason::WithinRetention));
        }
        if !self
            .periods
            .is_consolidated(kind, covering_tier, period)
            .await?
        {
            return Ok(Some(SkipReason::NotConsolidated));
        }
        Ok(None)
    }

    async fn delete(&self, kind: RecordKind, period: &Period, ids: &[NodeId]) -> Result<PurgeOutcome> {
        let requested = ids.len() as u64;
        if requested == 0 {
            return Ok(PurgeOutcome::Purged {
                requested: 0,
                deleted: 0,
            });
        }

        let deleted = self.store.delete_nodes(ids).await?;
        if deleted != requested {
            obs::emit_purge_mismatch(kind, &period.label, requested, deleted);
        }
        debug!(requested, deleted, "purge complete");
        Ok(PurgeOutcome::Purged { requested, deleted })
    }
}

fn require_tier(period: &Period, tier: Tier, what: &str) -> Result<()> {
    if period.tier == tier {
        Ok(())
    } else {
        Err(ConsolidationError::InvalidPeriod(format!(
            "{what} needs a {tier} period, got {period}"
        )))
    }
}
