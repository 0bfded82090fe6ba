//! Shared reduction machinery.
//!
//! Field classes reduce the same way for every kind: counts and tallies
//! add (key-wise for tallies), extrema take min/max, totals add, and rates
//! and means are recomputed from the merged totals in `finalize`, never
//! averaged from child values.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use tracing::warn;

use super::{Consolidation, Inputs};
use crate::error::{AggregationError, Result, ValidationError};
use crate::model::{Period, RawRecord, RecordKind, SummaryData, SummaryNode, Tier};

/// Per-key occurrence counts, ordered for deterministic output.
pub type Tally = BTreeMap<String, u64>;

/// One kind's aggregated fields.
pub trait Aggregate: Sized {
    const KIND: RecordKind;

    /// Partial aggregate of a single raw record.
    fn from_record(record: &RawRecord) -> std::result::Result<Self, ValidationError>;

    /// Partial aggregate of a lower-tier summary; `None` if `data` belongs
    /// to another kind.
    fn from_data(data: SummaryData) -> Option<Self>;

    fn merge(&mut self, other: Self) -> std::result::Result<(), AggregationError>;

    /// Recompute derived fields for the period being written.
    fn finalize(&mut self, period: &Period);

    fn into_data(self) -> SummaryData;
}

pub(crate) fn add_count(
    total: &mut u64,
    n: u64,
    field: &'static str,
) -> std::result::Result<(), AggregationError> {
    *total = total
        .checked_add(n)
        .ok_or(AggregationError::Overflow { field })?;
    Ok(())
}

pub(crate) fn add_amount(
    total: &mut f64,
    x: f64,
    field: &'static str,
) -> std::result::Result<(), AggregationError> {
    let sum = *total + x;
    if !sum.is_finite() {
        return Err(AggregationError::NonFinite { field });
    }
    *total = sum;
    Ok(())
}

pub(crate) fn merge_tally(
    into: &mut Tally,
    from: Tally,
    field: &'static str,
) -> std::result::Result<(), AggregationError> {
    for (key, n) in from {
        add_count(into.entry(key).or_insert(0), n, field)?;
    }
    Ok(())
}

pub(crate) fn tally_of(key: &str) -> Tally {
    let mut tally = Tally::new();
    tally.insert(key.to_string(), 1);
    tally
}

pub(crate) fn per_hour(total: f64, hours: f64) -> f64 {
    if hours > 0.0 {
        total / hours
    } else {
        0.0
    }
}

pub(crate) fn mean(sum: f64, count: u64) -> f64 {
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

/// Earliest and latest record instants seen so far.
#[derive(Debug, Clone, Copy)]
struct Extent {
    first: DateTime<Utc>,
    last: DateTime<Utc>,
}

impl Extent {
    fn widen(current: Option<Extent>, first: DateTime<Utc>, last: DateTime<Utc>) -> Extent {
        match current {
            Some(e) => Extent {
                first: e.first.min(first),
                last: e.last.max(last),
            },
            None => Extent { first, last },
        }
    }
}

fn fold<A: Aggregate>(acc: &mut Option<A>, part: A) -> std::result::Result<(), AggregationError> {
    match acc {
        Some(existing) => existing.merge(part),
        None => {
            *acc = Some(part);
            Ok(())
        }
    }
}

/// Reduce `inputs` into a summary of `A`'s kind.
///
/// Invalid inputs are skipped and counted. Any aggregation error fails the
/// whole period.
pub(crate) fn reduce<A: Aggregate>(
    tier: Tier,
    period: &Period,
    inputs: &Inputs,
) -> Result<Consolidation> {
    let mut acc: Option<A> = None;
    let mut extent: Option<Extent> = None;
    let mut source_count = 0u64;
    let mut record_count = 0u64;
    let mut skipped = 0u64;

    match inputs {
        Inputs::Raw(records) => {
            for record in records {
                if record.kind != A::KIND || !period.contains(record.timestamp) {
                    warn!(record = %record.id, period = %period, "raw record outside its lineage, skipped");
                    skipped += 1;
                    continue;
                }
                match A::from_record(record) {
                    Ok(part) => {
                        fold(&mut acc, part)?;
                        add_count(&mut source_count, 1, "source_count")?;
                        add_count(&mut record_count, 1, "record_count")?;
                        extent = Some(Extent::widen(extent, record.timestamp, record.timestamp));
                    }
                    Err(err) => {
                        warn!(error = %err, "invalid record skipped");
                        skipped += 1;
                    }
                }
            }
        }
        Inputs::Summaries(nodes) => {
            for node in nodes {
                let summary = match SummaryNode::from_node(node) {
                    Ok(summary) => summary,
                    Err(err) => {
                        warn!(error = %err, "invalid summary input skipped");
                        skipped += 1;
                        continue;
                    }
                };
                if summary.kind != A::KIND
                    || Some(summary.tier) != tier.input_tier()
                    || !period.contains(summary.period.start)
                {
                    warn!(summary = %summary.id, period = %period, "summary outside its lineage, skipped");
                    skipped += 1;
                    continue;
                }
                let (covered, first, last) = (
                    summary.record_count,
                    summary.first_record_at,
                    summary.last_record_at,
                );
                let Some(part) = A::from_data(summary.data) else {
                    warn!(summary = %node.id, "summary data of another kind skipped");
                    skipped += 1;
                    continue;
                };
                fold(&mut acc, part)?;
                add_count(&mut source_count, 1, "source_count")?;
                add_count(&mut record_count, covered, "record_count")?;
                extent = Some(Extent::widen(extent, first, last));
            }
        }
    }

    let (Some(mut data), Some(extent)) = (acc, extent) else {
        return Ok(Consolidation {
            summary: None,
            skipped,
        });
    };
    data.finalize(period);

    let summary = SummaryNode::new(
        A::KIND,
        tier,
        period.clone(),
        data.into_data(),
        source_count,
        record_count,
        extent.first,
        extent.last,
    )?
    .with_skipped_count(skipped);
    Ok(Consolidation {
        summary: Some(summary),
        skipped,
    })
}
