//! Trace span consolidation.

use serde::{Deserialize, Serialize};

use super::common::{add_amount, add_count, mean, merge_tally, per_hour, tally_of, Aggregate, Tally};
use crate::error::{AggregationError, ValidationError};
use crate::model::{Period, RawRecord, RecordKind, SummaryData, TraceSpan};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TracesSummary {
    pub span_count: u64,
    pub components: Tally,
    pub error_count: u64,
    pub total_duration_ms: f64,
    pub max_duration_ms: f64,
    pub mean_duration_ms: f64,
    pub spans_per_hour: f64,
}

impl Aggregate for TracesSummary {
    const KIND: RecordKind = RecordKind::Traces;

    fn from_record(record: &RawRecord) -> Result<Self, ValidationError> {
        let span: TraceSpan = record.payload_as()?;
        let errored = span
            .status
            .as_deref()
            .is_some_and(|s| s.eq_ignore_ascii_case("error"));

        Ok(Self {
            span_count: 1,
            components: tally_of(&span.component),
            error_count: u64::from(errored),
            total_duration_ms: span.duration_ms,
            max_duration_ms: span.duration_ms,
            ..Default::default()
        })
    }

    fn from_data(data: SummaryData) -> Option<Self> {
        match data {
            SummaryData::Traces(summary) => Some(summary),
            _ => None,
        }
    }

    fn merge(&mut self, other: Self) -> Result<(), AggregationError> {
        add_count(&mut self.span_count, other.span_count, "span_count")?;
        merge_tally(&mut self.components, other.components, "components")?;
        add_count(&mut self.error_count, other.error_count, "error_count")?;
        add_amount(
            &mut self.total_duration_ms,
            other.total_duration_ms,
            "total_duration_ms",
        )?;
        self.max_duration_ms = self.max_duration_ms.max(other.max_duration_ms);
        Ok(())
    }

    fn finalize(&mut self, period: &Period) {
        self.mean_duration_ms = mean(self.total_duration_ms, self.span_count);
        self.spans_per_hour = per_hour(self.span_count as f64, period.duration_hours());
    }

    fn into_data(self) -> SummaryData {
        SummaryData::Traces(self)
    }
}
