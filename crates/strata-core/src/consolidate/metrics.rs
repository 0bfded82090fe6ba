//! Metrics consolidation.
//!
//! Every datapoint feeds per-metric statistics. Well-known LLM resource
//! metrics also feed the resource totals; `action.<kind>` and `error.*`
//! datapoints carry occurrence counts in their value.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::common::{add_amount, add_count, mean, merge_tally, per_hour, Aggregate, Tally};
use crate::error::{AggregationError, ValidationError};
use crate::model::{MetricPoint, Period, RawRecord, RecordKind, SummaryData};

pub const TOKENS_TOTAL: &str = "llm.tokens.total";
pub const COST_CENTS: &str = "llm.cost.cents";
pub const CARBON_GRAMS: &str = "llm.carbon.grams";
pub const ENERGY_KWH: &str = "llm.energy.kwh";
pub const ACTION_PREFIX: &str = "action.";
pub const ERROR_PREFIX: &str = "error.";

/// Count/sum/min/max/mean of one metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricStats {
    pub count: u64,
    pub sum: f64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
}

impl MetricStats {
    fn single(value: f64) -> Self {
        Self {
            count: 1,
            sum: value,
            min: value,
            max: value,
            mean: value,
        }
    }

    fn merge(&mut self, other: MetricStats) -> Result<(), AggregationError> {
        add_count(&mut self.count, other.count, "metrics.count")?;
        add_amount(&mut self.sum, other.sum, "metrics.sum")?;
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
        Ok(())
    }
}

/// Token, cost, carbon and energy totals.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceTotals {
    pub tokens: f64,
    pub cost_cents: f64,
    pub carbon_grams: f64,
    pub energy_kwh: f64,
}

impl ResourceTotals {
    fn merge(&mut self, other: ResourceTotals) -> Result<(), AggregationError> {
        add_amount(&mut self.tokens, other.tokens, "resources.tokens")?;
        add_amount(&mut self.cost_cents, other.cost_cents, "resources.cost_cents")?;
        add_amount(&mut self.carbon_grams, other.carbon_grams, "resources.carbon_grams")?;
        add_amount(&mut self.energy_kwh, other.energy_kwh, "resources.energy_kwh")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsSummary {
    pub datapoints: u64,
    pub resources: ResourceTotals,
    pub actions: Tally,
    pub error_count: u64,
    pub metrics: BTreeMap<String, MetricStats>,
    pub tokens_per_hour: f64,
    pub cost_cents_per_hour: f64,
}

/// `u64::MAX as f64` rounds up to 2^64, which no `u64` can hold.
fn occurrences(record: &RawRecord, value: f64) -> Result<u64, ValidationError> {
    if value.fract() == 0.0 && value >= 0.0 && value < u64::MAX as f64 {
        Ok(value as u64)
    } else {
        Err(ValidationError::InvalidField {
            id: record.id.to_string(),
            field: "value",
            reason: format!("counter datapoints need a non-negative integer, got {value}"),
        })
    }
}

fn resource(record: &RawRecord, value: f64) -> Result<f64, ValidationError> {
    if value >= 0.0 {
        Ok(value)
    } else {
        Err(ValidationError::InvalidField {
            id: record.id.to_string(),
            field: "value",
            reason: format!("resource totals cannot be negative, got {value}"),
        })
    }
}

impl Aggregate for MetricsSummary {
    const KIND: RecordKind = RecordKind::Metrics;

    fn from_record(record: &RawRecord) -> Result<Self, ValidationError> {
        let point: MetricPoint = record.payload_as()?;
        let mut summary = MetricsSummary {
            datapoints: 1,
            ..Default::default()
        };

        match point.metric_name.as_str() {
            TOKENS_TOTAL => summary.resources.tokens = resource(record, point.value)?,
            COST_CENTS => summary.resources.cost_cents = resource(record, point.value)?,
            CARBON_GRAMS => summary.resources.carbon_grams = resource(record, point.value)?,
            ENERGY_KWH => summary.resources.energy_kwh = resource(record, point.value)?,
            name => {
                if let Some(action) = name.strip_prefix(ACTION_PREFIX) {
                    if action.is_empty() {
                        return Err(ValidationError::InvalidField {
                            id: record.id.to_string(),
                            field: "metric_name",
                            reason: "action metric without an action kind".to_string(),
                        });
                    }
                    summary
                        .actions
                        .insert(action.to_string(), occurrences(record, point.value)?);
                } else if name.starts_with(ERROR_PREFIX) {
                    summary.error_count = occurrences(record, point.value)?;
                }
            }
        }

        summary
            .metrics
            .insert(point.metric_name, MetricStats::single(point.value));
        Ok(summary)
    }

    fn from_data(data: SummaryData) -> Option<Self> {
        match data {
            SummaryData::Metrics(summary) => Some(summary),
            _ => None,
        }
    }

    fn merge(&mut self, other: Self) -> Result<(), AggregationError> {
        add_count(&mut self.datapoints, other.datapoints, "datapoints")?;
        self.resources.merge(other.resources)?;
        merge_tally(&mut self.actions, other.actions, "actions")?;
        add_count(&mut self.error_count, other.error_count, "error_count")?;
        for (name, stats) in other.metrics {
            match self.metrics.get_mut(&name) {
                Some(existing) => existing.merge(stats)?,
                None => {
                    self.metrics.insert(name, stats);
                }
            }
        }
        Ok(())
    }

    fn finalize(&mut self, period: &Period) {
        let hours = period.duration_hours();
        self.tokens_per_hour = per_hour(self.resources.tokens, hours);
        self.cost_cents_per_hour = per_hour(self.resources.cost_cents, hours);
        for stats in self.metrics.values_mut() {
            stats.mean = mean(stats.sum, stats.count);
        }
    }

    fn into_data(self) -> SummaryData {
        SummaryData::Metrics(self)
    }
}
