//! Calendar alignment of periods across day, week, month and year boundaries.

use chrono::{DateTime, Duration, TimeZone, Utc};

use strata_core::{compute_periods, is_due, Period, Tier};

fn utc(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
}

#[test]
fn test_days_across_month_boundary_are_exact() {
    let days = compute_periods(Tier::Daily, utc(2025, 1, 30, 15), utc(2025, 2, 2, 0)).unwrap();
    let labels: Vec<&str> = days.iter().map(|p| p.label.as_str()).collect();
    assert_eq!(labels, vec!["2025-01-30", "2025-01-31", "2025-02-01"]);

    for day in &days {
        assert_eq!(day.duration(), Duration::hours(24));
        assert_eq!(day.start, day.start.date_naive().and_hms_opt(0, 0, 0).unwrap().and_utc());
    }
    assert_eq!(days[1].end, utc(2025, 2, 1, 0));
    assert_eq!(days[2].start, utc(2025, 2, 1, 0));
}

#[test]
fn test_basic_blocks_never_straddle_midnight() {
    let blocks = compute_periods(Tier::Basic, utc(2025, 1, 31, 13), utc(2025, 2, 1, 7)).unwrap();
    let labels: Vec<&str> = blocks.iter().map(|p| p.label.as_str()).collect();
    assert_eq!(
        labels,
        vec!["2025-01-31T12", "2025-01-31T18", "2025-02-01T00", "2025-02-01T06"]
    );
    assert_eq!(blocks[1].end, utc(2025, 2, 1, 0));
}

#[test]
fn test_weeks_span_month_boundaries_monday_to_monday() {
    // 2025-07-28 is a Monday; its week runs into August.
    let week = Period::containing(Tier::Weekly, utc(2025, 8, 2, 9)).unwrap();
    assert_eq!(week.start, utc(2025, 7, 28, 0));
    assert_eq!(week.end, utc(2025, 8, 4, 0));
    assert_eq!(week.label, "2025-W31");
}

#[test]
fn test_months_follow_the_calendar() {
    let months = compute_periods(Tier::Monthly, utc(2023, 12, 15, 0), utc(2024, 3, 1, 0)).unwrap();
    let hours: Vec<f64> = months.iter().map(|p| p.duration_hours()).collect();
    assert_eq!(hours, vec![31.0 * 24.0, 31.0 * 24.0, 29.0 * 24.0]);
    assert_eq!(months[0].label, "2023-12");
    assert_eq!(months[2].label, "2024-02");
}

#[test]
fn test_periods_of_a_tier_are_contiguous_and_aligned() {
    for tier in Tier::ALL {
        let periods = compute_periods(tier, utc(2024, 11, 17, 5), utc(2025, 3, 3, 0)).unwrap();
        assert!(!periods.is_empty());
        for pair in periods.windows(2) {
            assert_eq!(pair[0].end, pair[1].start, "{tier} gap");
        }
        for p in &periods {
            assert_eq!(&Period::from_start(tier, p.start).unwrap(), p);
        }
    }
}

#[test]
fn test_nothing_is_due_before_it_ends() {
    let now = utc(2025, 7, 7, 12);
    let periods = compute_periods(Tier::Basic, utc(2025, 7, 7, 0), utc(2025, 7, 8, 0)).unwrap();
    let due: Vec<&str> = periods
        .iter()
        .filter(|p| is_due(p, now))
        .map(|p| p.label.as_str())
        .collect();
    assert_eq!(due, vec!["2025-07-07T00", "2025-07-07T06"]);
}
