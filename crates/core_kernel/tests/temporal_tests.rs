//! Unit tests for the Temporal module
//!
//! Tests cover ValidPeriod, Timezone month boundaries and the clocks.

use chrono::{Duration, TimeZone, Utc};
use core_kernel::{Clock, FixedClock, SystemClock, Timezone, ValidPeriod};
use core_kernel::temporal::TemporalError;

mod valid_period {
    use super::*;

    #[test]
    fn test_new_fails_when_start_after_end() {
        let start = Utc.with_ymd_and_hms(2024, 12, 31, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();

        assert!(matches!(
            ValidPeriod::new(start, Some(end)),
            Err(TemporalError::InvalidPeriod { .. })
        ));
    }

    #[test]
    fn test_unbounded_period_contains_far_future() {
        let period = ValidPeriod::from(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());

        assert!(period.is_unbounded());
        assert!(period.contains(Utc.with_ymd_and_hms(2099, 1, 1, 0, 0, 0).unwrap()));
        assert!(!period.contains(Utc.with_ymd_and_hms(2023, 12, 31, 23, 59, 59).unwrap()));
    }

    #[test]
    fn test_close_at_bounds_the_period() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let mut period = ValidPeriod::from(start);
        let close = Utc.with_ymd_and_hms(2024, 4, 1, 0, 0, 0).unwrap();

        period.close_at(close).unwrap();
        assert_eq!(period.end, Some(close));
        assert!(period.close_at(start).is_err());
    }

    #[test]
    fn test_adjacent_periods_do_not_overlap() {
        let q1 = ValidPeriod::bounded(
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 4, 1, 0, 0, 0).unwrap(),
        ).unwrap();
        let q2 = ValidPeriod::bounded(
            Utc.with_ymd_and_hms(2024, 4, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 7, 1, 0, 0, 0).unwrap(),
        ).unwrap();

        assert!(!q1.overlaps(&q2));
        assert!(!q2.overlaps(&q1));
    }
}

mod timezone {
    use super::*;

    #[test]
    fn test_from_name() {
        let tz = Timezone::from_name("Asia/Singapore").unwrap();
        assert_eq!(tz.to_string(), "Asia/Singapore");
        assert!(Timezone::from_name("Mars/Olympus").is_err());
    }

    #[test]
    fn test_february_leap_year_period() {
        let tz = Timezone::from_name("UTC").unwrap();
        let period = tz.month_period(2024, 2).unwrap();

        assert_eq!(period.end.unwrap() - period.start, Duration::days(29));
    }

    #[test]
    fn test_year_month_uses_local_calendar() {
        let tz = Timezone::default();
        // 2024-01-31 17:00 UTC is already 1 February in Kuala Lumpur
        let instant = Utc.with_ymd_and_hms(2024, 1, 31, 17, 0, 0).unwrap();

        assert_eq!(tz.year_month(instant), (2024, 2));
    }

    #[test]
    fn test_timezone_serde() {
        let tz = Timezone::default();
        let json = serde_json::to_string(&tz).unwrap();
        assert_eq!(json, "\"Asia/Kuala_Lumpur\"");
        let back: Timezone = serde_json::from_str(&json).unwrap();
        assert_eq!(back, tz);
    }
}

mod clocks {
    use super::*;

    #[test]
    fn test_fixed_clock_set() {
        let clock = FixedClock::new(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
        let later = Utc.with_ymd_and_hms(2024, 6, 1, 12, 30, 0).unwrap();
        clock.set(later);

        assert_eq!(clock.now(), later);
    }

    #[test]
    fn test_system_clock_moves_forward() {
        let clock = SystemClock;
        let a = clock.now();
        let b = clock.now();
        assert!(b >= a);
    }
}
