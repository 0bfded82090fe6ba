//! Task consolidation.

use serde::{Deserialize, Serialize};

use super::common::{add_amount, add_count, mean, merge_tally, per_hour, tally_of, Aggregate, Tally};
use crate::error::{AggregationError, ValidationError};
use crate::model::{Period, RawRecord, RecordKind, SummaryData, TaskEvent};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TasksSummary {
    pub task_count: u64,
    pub statuses: Tally,
    pub handlers: Tally,
    /// Tasks that reported a duration; the denominator of the mean.
    pub timed_count: u64,
    pub total_duration_ms: f64,
    pub mean_duration_ms: f64,
    pub tasks_per_hour: f64,
}

impl Aggregate for TasksSummary {
    const KIND: RecordKind = RecordKind::Tasks;

    fn from_record(record: &RawRecord) -> Result<Self, ValidationError> {
        let task: TaskEvent = record.payload_as()?;
        Ok(Self {
            task_count: 1,
            statuses: tally_of(&task.status),
            handlers: task.handler.as_deref().map(tally_of).unwrap_or_default(),
            timed_count: u64::from(task.duration_ms.is_some()),
            total_duration_ms: task.duration_ms.unwrap_or(0.0),
            ..Default::default()
        })
    }

    fn from_data(data: SummaryData) -> Option<Self> {
        match data {
            SummaryData::Tasks(summary) => Some(summary),
            _ => None,
        }
    }

    fn merge(&mut self, other: Self) -> Result<(), AggregationError> {
        add_count(&mut self.task_count, other.task_count, "task_count")?;
        merge_tally(&mut self.statuses, other.statuses, "statuses")?;
        merge_tally(&mut self.handlers, other.handlers, "handlers")?;
        add_count(&mut self.timed_count, other.timed_count, "timed_count")?;
        add_amount(
            &mut self.total_duration_ms,
            other.total_duration_ms,
            "total_duration_ms",
        )
    }

    fn finalize(&mut self, period: &Period) {
        self.mean_duration_ms = mean(self.total_duration_ms, self.timed_count);
        self.tasks_per_hour = per_hour(self.task_count as f64, period.duration_hours());
    }

    fn into_data(self) -> SummaryData {
        SummaryData::Tasks(self)
    }
}
