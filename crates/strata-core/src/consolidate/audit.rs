//! Audit-adjacent counters.
//!
//! Only counts are consolidated here; the audit records themselves are
//! purge-exempt and stay in the store.

use serde::{Deserialize, Serialize};

use super::common::{add_count, merge_tally, per_hour, tally_of, Aggregate, Tally};
use crate::error::{AggregationError, ValidationError};
use crate::model::{AuditEvent, Period, RawRecord, RecordKind, SummaryData};

const FAILURE_OUTCOMES: [&str; 4] = ["failure", "failed", "error", "denied"];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuditSummary {
    pub event_count: u64,
    pub actions: Tally,
    pub actors: Tally,
    pub outcomes: Tally,
    pub failures: u64,
    pub events_per_hour: f64,
}

impl Aggregate for AuditSummary {
    const KIND: RecordKind = RecordKind::Audit;

    fn from_record(record: &RawRecord) -> Result<Self, ValidationError> {
        let event: AuditEvent = record.payload_as()?;
        let failed = event
            .outcome
            .as_deref()
            .is_some_and(|o| FAILURE_OUTCOMES.iter().any(|f| o.eq_ignore_ascii_case(f)));

        Ok(Self {
            event_count: 1,
            actions: tally_of(&event.action),
            actors: tally_of(&event.actor),
            outcomes: event.outcome.as_deref().map(tally_of).unwrap_or_default(),
            failures: u64::from(failed),
            events_per_hour: 0.0,
        })
    }

    fn from_data(data: SummaryData) -> Option<Self> {
        match data {
            SummaryData::Audit(summary) => Some(summary),
            _ => None,
        }
    }

    fn merge(&mut self, other: Self) -> Result<(), AggregationError> {
        add_count(&mut self.event_count, other.event_count, "event_count")?;
        merge_tally(&mut self.actions, other.actions, "actions")?;
        merge_tally(&mut self.actors, other.actors, "actors")?;
        merge_tally(&mut self.outcomes, other.outcomes, "outcomes")?;
        add_count(&mut self.failures, other.failures, "failures")
    }

    fn finalize(&mut self, period: &Period) {
        self.events_per_hour = per_hour(self.event_count as f64, period.duration_hours());
    }

    fn into_data(self) -> SummaryData {
        SummaryData::Audit(self)
    }
}
