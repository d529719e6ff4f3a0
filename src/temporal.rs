//! Rolling time windows over onset dates.

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};

/// Start of a window reaching `days` back from `now`.
pub fn window_start(now: NaiveDateTime, days: u32) -> NaiveDateTime {
    now - Duration::days(i64::from(days))
}

/// An onset date counts as its midnight, so with `now` in the afternoon the
/// day exactly `days` back falls just outside the window.
pub fn onset_in_window(onset: NaiveDate, now: NaiveDateTime, days: u32) -> bool {
    onset.and_time(NaiveTime::MIN) >= window_start(now, days)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(y: i32, m: u32, d: u32, h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d).unwrap().and_hms_opt(h, 0, 0).unwrap()
    }

    #[test]
    fn boundary_day_depends_on_time_of_now() {
        let onset = NaiveDate::from_ymd_opt(2025, 6, 3).unwrap();
        assert!(onset_in_window(onset, at(2025, 6, 10, 0), 7));
        assert!(!onset_in_window(onset, at(2025, 6, 10, 15), 7));
    }

    #[test]
    fn future_onset_is_inside() {
        let onset = NaiveDate::from_ymd_opt(2025, 6, 12).unwrap();
        assert!(onset_in_window(onset, at(2025, 6, 10, 12), 7));
    }

    #[test]
    fn zero_day_window_keeps_only_from_now() {
        let today = NaiveDate::from_ymd_opt(2025, 6, 10).unwrap();
        assert!(onset_in_window(today, at(2025, 6, 10, 0), 0));
        assert!(!onset_in_window(today, at(2025, 6, 10, 9), 0));
    }
}
