//! UTC day arithmetic shared by the weighting and reconstruction engines.
//!
//! Every "align to midnight" decision in the crate goes through this module.

use super::Timestamp;
use chrono::{DateTime, NaiveDate};

pub const SECONDS_PER_DAY: i64 = 86_400;

/// Returns `ts` unchanged if it is exactly UTC midnight, else the following UTC midnight.
pub fn ceil_to_midnight(ts: Timestamp) -> Timestamp {
    let rem = ts.as_i64().rem_euclid(SECONDS_PER_DAY);
    if rem == 0 {
        ts
    } else {
        Timestamp::new(ts.as_i64() - rem + SECONDS_PER_DAY)
    }
}

/// Returns the UTC midnight at or before `ts`.
pub fn floor_to_midnight(ts: Timestamp) -> Timestamp {
    Timestamp::new(ts.as_i64() - ts.as_i64().rem_euclid(SECONDS_PER_DAY))
}

pub fn is_midnight(ts: Timestamp) -> bool {
    ts.as_i64().rem_euclid(SECONDS_PER_DAY) == 0
}

pub fn add_days(ts: Timestamp, days: i64) -> Timestamp {
    Timestamp::new(ts.as_i64() + days * SECONDS_PER_DAY)
}

/// Whole days between two midnights, `b - a`.
pub fn days_between(a: Timestamp, b: Timestamp) -> i64 {
    (b.as_i64() - a.as_i64()).div_euclid(SECONDS_PER_DAY)
}

/// Midnights in the half-open range `[start, end)`. Both bounds are aligned up first.
pub fn days_in_range(start: Timestamp, end: Timestamp) -> impl Iterator<Item = Timestamp> {
    let start = ceil_to_midnight(start).as_i64();
    let end = ceil_to_midnight(end).as_i64();
    (start..end)
        .step_by(SECONDS_PER_DAY as usize)
        .map(Timestamp::new)
}

/// Calendar date of the UTC day containing `ts`.
pub fn to_date(ts: Timestamp) -> NaiveDate {
    DateTime::from_timestamp(floor_to_midnight(ts).as_i64(), 0)
        .map(|dt| dt.date_naive())
        .unwrap_or_default()
}

/// UTC midnight of `date`.
pub fn from_date(date: NaiveDate) -> Timestamp {
    Timestamp::new(date.and_hms_opt(0, 0, 0).unwrap_or_default().and_utc().timestamp())
}

#[cfg(test)]
mod tests {
    use super::*;

    const DAY: i64 = SECONDS_PER_DAY;

    #[test]
    fn test_ceil_keeps_midnight() {
        let ts = Timestamp::new(19_000 * DAY);
        assert_eq!(ceil_to_midnight(ts), ts);
    }

    #[test]
    fn test_ceil_rounds_up_to_next_midnight() {
        let ts = Timestamp::new(19_000 * DAY + 1);
        assert_eq!(ceil_to_midnight(ts), Timestamp::new(19_001 * DAY));
        let ts = Timestamp::new(19_001 * DAY - 1);
        assert_eq!(ceil_to_midnight(ts), Timestamp::new(19_001 * DAY));
    }

    #[test]
    fn test_floor() {
        assert_eq!(
            floor_to_midnight(Timestamp::new(19_000 * DAY + 3600)),
            Timestamp::new(19_000 * DAY)
        );
        assert_eq!(floor_to_midnight(Timestamp::new(-1)), Timestamp::new(-DAY));
    }

    #[test]
    fn test_days_in_range_is_half_open() {
        let start = Timestamp::new(10 * DAY);
        let end = Timestamp::new(13 * DAY);
        let days: Vec<i64> = days_in_range(start, end).map(|t| t.as_i64()).collect();
        assert_eq!(days, vec![10 * DAY, 11 * DAY, 12 * DAY]);
        assert_eq!(days_in_range(end, start).count(), 0);
    }

    #[test]
    fn test_date_round_trip() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let ts = from_date(date);
        assert!(is_midnight(ts));
        assert_eq!(to_date(ts), date);
        assert_eq!(to_date(Timestamp::new(ts.as_i64() + 7_200)), date);
    }

    #[test]
    fn test_days_between() {
        assert_eq!(days_between(Timestamp::new(2 * DAY), Timestamp::new(9 * DAY)), 7);
    }
}
