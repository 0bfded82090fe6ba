//! Calendar-aligned periods.
//!
//! Every tier partitions UTC time into contiguous, non-overlapping windows.
//! A period is identified by its tier and start; the end and label are
//! derived from those two and never stored independently.

use std::fmt;

use chrono::{DateTime, Datelike, Duration, Months, NaiveDate, TimeZone, Timelike, Utc};
use serde::{Deserialize, Serialize};

use super::tier::Tier;
use crate::error::{ConsolidationError, Result};

const BASIC_BLOCK_HOURS: u32 = 6;

/// One `[start, end)` window of a tier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Period {
    pub tier: Tier,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// Human-readable label: `2025-07-07T06`, `2025-07-07`, `2025-W28`, `2025-07`.
    pub label: String,
}

impl Period {
    /// The period of `tier` that contains the instant `t`.
    pub fn containing(tier: Tier, t: DateTime<Utc>) -> Result<Self> {
        let date = t.date_naive();
        let start = match tier {
            Tier::Basic => at_hour(date, t.hour() / BASIC_BLOCK_HOURS * BASIC_BLOCK_HOURS)?,
            Tier::Daily => at_hour(date, 0)?,
            Tier::Weekly => {
                let back = i64::from(date.weekday().num_days_from_monday());
                let monday = date
                    .checked_sub_signed(Duration::days(back))
                    .ok_or_else(|| out_of_range(tier, t))?;
                at_hour(monday, 0)?
            }
            Tier::Monthly => {
                let first = NaiveDate::from_ymd_opt(date.year(), date.month(), 1)
                    .ok_or_else(|| out_of_range(tier, t))?;
                at_hour(first, 0)?
            }
        };
        Self::build(tier, start)
    }

    /// The period of `tier` starting exactly at `start`.
    ///
    /// Fails with `InvalidPeriod` when `start` is not on a boundary of `tier`.
    pub fn from_start(tier: Tier, start: DateTime<Utc>) -> Result<Self> {
        let period = Self::containing(tier, start)?;
        if period.start != start {
            return Err(ConsolidationError::InvalidPeriod(format!(
                "{start} is not a {tier} boundary (nearest start {})",
                period.start
            )));
        }
        Ok(period)
    }

    /// The period immediately after this one.
    pub fn next(&self) -> Result<Self> {
        Self::build(self.tier, self.end)
    }

    pub fn contains(&self, t: DateTime<Utc>) -> bool {
        self.start <= t && t < self.end
    }

    /// Calendar day (UTC) the period starts in.
    pub fn day(&self) -> NaiveDate {
        self.start.date_naive()
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    /// Length in hours; the denominator of every per-hour rate.
    pub fn duration_hours(&self) -> f64 {
        self.duration().num_seconds() as f64 / 3600.0
    }

    /// Compact start stamp used in summary ids: `YYYYMMDD_HH` for basic
    /// periods, `YYYYMMDD` otherwise.
    pub fn id_stamp(&self) -> String {
        match self.tier {
            Tier::Basic => self.start.format("%Y%m%d_%H").to_string(),
            _ => self.start.format("%Y%m%d").to_string(),
        }
    }

    fn build(tier: Tier, start: DateTime<Utc>) -> Result<Self> {
        let end = match tier {
            Tier::Basic => start.checked_add_signed(Duration::hours(i64::from(BASIC_BLOCK_HOURS))),
            Tier::Daily => start.checked_add_signed(Duration::days(1)),
            Tier::Weekly => start.checked_add_signed(Duration::days(7)),
            Tier::Monthly => start.checked_add_months(Months::new(1)),
        }
        .ok_or_else(|| out_of_range(tier, start))?;

        Ok(Self {
            tier,
            start,
            end,
            label: label(tier, start),
        })
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.tier, self.label)
    }
}

fn label(tier: Tier, start: DateTime<Utc>) -> String {
    match tier {
        Tier::Basic => start.format("%Y-%m-%dT%H").to_string(),
        Tier::Daily => start.format("%Y-%m-%d").to_string(),
        Tier::Weekly => {
            let week = start.iso_week();
            format!("{}-W{:02}", week.year(), week.week())
        }
        Tier::Monthly => start.format("%Y-%m").to_string(),
    }
}

fn at_hour(date: NaiveDate, hour: u32) -> Result<DateTime<Utc>> {
    date.and_hms_opt(hour, 0, 0)
        .map(|naive| Utc.from_utc_datetime(&naive))
        .ok_or_else(|| {
            ConsolidationError::InvalidPeriod(format!("{date} {hour:02}:00 is not a valid instant"))
        })
}

fn out_of_range(tier: Tier, t: DateTime<Utc>) -> ConsolidationError {
    ConsolidationError::InvalidPeriod(format!("{tier} period around {t} is out of range"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utc(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    #[test]
    fn test_basic_blocks_align_to_six_hours() {
        let p = Period::containing(Tier::Basic, utc(2025, 7, 7, 11, 59)).unwrap();
        assert_eq!(p.start, utc(2025, 7, 7, 6, 0));
        assert_eq!(p.end, utc(2025, 7, 7, 12, 0));
        assert_eq!(p.label, "2025-07-07T06");
        assert_eq!(p.id_stamp(), "20250707_06");
    }

    #[test]
    fn test_weekly_starts_on_monday_with_iso_label() {
        // 2025-07-09 is a Wednesday.
        let p = Period::containing(Tier::Weekly, utc(2025, 7, 9, 15, 0)).unwrap();
        assert_eq!(p.start, utc(2025, 7, 7, 0, 0));
        assert_eq!(p.end, utc(2025, 7, 14, 0, 0));
        assert_eq!(p.label, "2025-W28");
    }

    #[test]
    fn test_iso_week_year_differs_from_calendar_year() {
        // 2024-12-30 is the Monday of ISO week 1 of 2025.
        let p = Period::containing(Tier::Weekly, utc(2025, 1, 1, 0, 0)).unwrap();
        assert_eq!(p.start, utc(2024, 12, 30, 0, 0));
        assert_eq!(p.label, "2025-W01");
    }

    #[test]
    fn test_monthly_handles_short_months_and_year_end() {
        let feb = Period::containing(Tier::Monthly, utc(2024, 2, 29, 23, 0)).unwrap();
        assert_eq!(feb.start, utc(2024, 2, 1, 0, 0));
        assert_eq!(feb.end, utc(2024, 3, 1, 0, 0));
        assert_eq!(feb.label, "2024-02");

        let dec = Period::containing(Tier::Monthly, utc(2025, 12, 31, 0, 0)).unwrap();
        assert_eq!(dec.end, utc(2026, 1, 1, 0, 0));
    }

    #[test]
    fn test_from_start_rejects_unaligned_instants() {
        assert!(Period::from_start(Tier::Daily, utc(2025, 7, 7, 0, 0)).is_ok());
        let err = Period::from_start(Tier::Daily, utc(2025, 7, 7, 3, 0)).unwrap_err();
        assert!(matches!(err, ConsolidationError::InvalidPeriod(_)));
    }

    #[test]
    fn test_duration_hours() {
        let day = Period::containing(Tier::Daily, utc(2025, 7, 7, 0, 0)).unwrap();
        assert_eq!(day.duration_hours(), 24.0);
        let july = Period::containing(Tier::Monthly, utc(2025, 7, 7, 0, 0)).unwrap();
        assert_eq!(july.duration_hours(), 31.0 * 24.0);
    }
}
