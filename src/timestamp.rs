//! The `updates` timestamp format: a 16+ digit integer `YYYYMMDDhhmmssuuuuuu`
//! (microsecond precision), comparable numerically.

use chrono::{DateTime, Datelike, Timelike, Utc};

/// Returns the current UTC time as a `YYYYMMDDhhmmssuuuuuu` integer.
pub fn now() -> i64 {
    of(Utc::now())
}

/// Converts a UTC instant into the `YYYYMMDDhhmmssuuuuuu` integer.
pub fn of(date: DateTime<Utc>) -> i64 {
    let micros = i64::from(date.nanosecond() / 1_000);
    micros
        + i64::from(date.second()) * 10i64.pow(6)
        + i64::from(date.minute()) * 10i64.pow(8)
        + i64::from(date.hour()) * 10i64.pow(10)
        + i64::from(date.day()) * 10i64.pow(12)
        + i64::from(date.month()) * 10i64.pow(14)
        + i64::from(date.year()) * 10i64.pow(16)
}

/// A broken-down UTC tuple `(year, month, day, hour, minute, second, micros)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Parts {
    pub year: i64,
    pub month: i64,
    pub day: i64,
    pub hour: i64,
    pub minute: i64,
    pub second: i64,
    pub micros: i64,
}

/// Parses a `YYYYMMDDhhmmssuuuuuu` integer back into its components.
pub fn parse(mut t: i64) -> Parts {
    let year = t / 10i64.pow(16);
    t -= year * 10i64.pow(16);
    let month = t / 10i64.pow(14);
    t -= month * 10i64.pow(14);
    let day = t / 10i64.pow(12);
    t -= day * 10i64.pow(12);
    let hour = t / 10i64.pow(10);
    t -= hour * 10i64.pow(10);
    let minute = t / 10i64.pow(8);
    t -= minute * 10i64.pow(8);
    let second = t / 10i64.pow(6);
    t -= second * 10i64.pow(6);
    let micros = t;
    Parts {
        year,
        month,
        day,
        hour,
        minute,
        second,
        micros,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn round_trips_through_parse() {
        let date = Utc.with_ymd_and_hms(2024, 3, 7, 13, 45, 9).unwrap();
        let stamp = of(date);
        let parts = parse(stamp);
        assert_eq!(parts.year, 2024);
        assert_eq!(parts.month, 3);
        assert_eq!(parts.day, 7);
        assert_eq!(parts.hour, 13);
        assert_eq!(parts.minute, 45);
        assert_eq!(parts.second, 9);
    }

    #[test]
    fn is_monotonic_for_successive_instants() {
        let a = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let b = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 1).unwrap();
        assert!(of(a) < of(b));
    }
}
