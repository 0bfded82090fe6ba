//! Which periods exist, which are due, which are already consolidated.
//!
//! Consolidation status is never cached; it is re-derived from the store
//! through the deterministic summary id every time it is asked for.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use strata_store::GraphStore;

use crate::error::Result;
use crate::model::{summary_id, Period, RecordKind, Tier};

/// Aligned periods of `tier` covering `[range_start, range_end)`, oldest
/// first. The first period contains `range_start`; the range is empty when
/// `range_start >= range_end`.
pub fn compute_periods(
    tier: Tier,
    range_start: DateTime<Utc>,
    range_end: DateTime<Utc>,
) -> Result<Vec<Period>> {
    let mut periods = Vec::new();
    if range_start >= range_end {
        return Ok(periods);
    }

    let mut current = Period::containing(tier, range_start)?;
    while current.start < range_end {
        let next = current.next()?;
        periods.push(current);
        current = next;
    }
    Ok(periods)
}

/// A period is due once it has fully elapsed.
pub fn is_due(period: &Period, now: DateTime<Utc>) -> bool {
    now >= period.end
}

/// Store-backed consolidation status.
#[derive(Clone)]
pub struct PeriodManager {
    store: Arc<dyn GraphStore>,
}

impl PeriodManager {
    pub fn new(store: Arc<dyn GraphStore>) -> Self {
        Self { store }
    }

    /// Whether the summary of `(kind, tier, period)` exists.
    pub async fn is_consolidated(
        &self,
        kind: RecordKind,
        tier: Tier,
        period: &Period,
    ) -> Result<bool> {
        Ok(self
            .store
            .exists_node(&summary_id(kind, tier, period))
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn utc(m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, m, d, h, 0, 0).unwrap()
    }

    #[test]
    fn test_periods_cover_the_range_contiguously() {
        let periods = compute_periods(Tier::Basic, utc(7, 7, 3), utc(7, 8, 0)).unwrap();
        assert_eq!(periods.len(), 4);
        assert_eq!(periods[0].start, utc(7, 7, 0));
        for pair in periods.windows(2) {
            assert_eq!(pair[0].end, pair[1].start);
        }
        assert_eq!(periods[3].end, utc(7, 8, 0));
    }

    #[test]
    fn test_empty_range_yields_nothing() {
        assert!(compute_periods(Tier::Daily, utc(7, 8, 0), utc(7, 8, 0))
            .unwrap()
            .is_empty());
        assert!(compute_periods(Tier::Daily, utc(7, 9, 0), utc(7, 8, 0))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_due_only_after_the_period_ends() {
        let day = Period::containing(Tier::Daily, utc(7, 7, 12)).unwrap();
        assert!(!is_due(&day, utc(7, 7, 23)));
        assert!(is_due(&day, utc(7, 8, 0)));
    }

    #[test]
    fn test_restartable_from_any_point() {
        let full = compute_periods(Tier::Weekly, utc(6, 1, 0), utc(8, 1, 0)).unwrap();
        let tail = compute_periods(Tier::Weekly, full[3].start, utc(8, 1, 0)).unwrap();
        assert_eq!(&full[3..], &tail[..]);
    }
}
