//! Serial date numbers
//!
//! Dates are stored in packages as fractional days since an epoch. The 1900
//! system counts the nonexistent 1900-02-29 as serial 60, so serials below 61
//! are shifted by one day.

use chrono::{NaiveDate, NaiveDateTime, TimeDelta};

const MILLIS_PER_DAY: f64 = 86_400_000.0;

fn epoch(date1904: bool) -> NaiveDateTime {
    let date = if date1904 {
        NaiveDate::from_ymd_opt(1904, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(1899, 12, 30)
    };
    date.unwrap_or_default().and_time(chrono::NaiveTime::MIN)
}

fn leap_bug_boundary() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(1900, 3, 1)
        .unwrap_or_default()
        .and_time(chrono::NaiveTime::MIN)
}

pub fn datetime_to_serial(value: NaiveDateTime, date1904: bool) -> f64 {
    let millis = (value - epoch(date1904)).num_milliseconds() as f64;
    let mut serial = millis / MILLIS_PER_DAY;
    if !date1904 && value < leap_bug_boundary() {
        serial -= 1.0;
    }
    serial
}

pub fn serial_to_datetime(serial: f64, date1904: bool) -> Option<NaiveDateTime> {
    if !serial.is_finite() || serial < 0.0 || serial >= 2_958_466.0 {
        return None;
    }
    let mut days = serial;
    if !date1904 && serial < 61.0 {
        days += 1.0;
    }
    let millis = (days * MILLIS_PER_DAY).round() as i64;
    epoch(date1904).checked_add_signed(TimeDelta::milliseconds(millis))
}

pub fn duration_to_serial(value: TimeDelta) -> f64 {
    value.num_milliseconds() as f64 / MILLIS_PER_DAY
}

pub fn serial_to_duration(serial: f64) -> Option<TimeDelta> {
    if !serial.is_finite() {
        return None;
    }
    TimeDelta::try_milliseconds((serial * MILLIS_PER_DAY).round() as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dt(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, 0)
            .unwrap()
    }

    #[test]
    fn test_known_serials() {
        assert_eq!(datetime_to_serial(dt(1900, 1, 1, 0, 0), false), 1.0);
        assert_eq!(datetime_to_serial(dt(1900, 2, 28, 0, 0), false), 59.0);
        assert_eq!(datetime_to_serial(dt(1900, 3, 1, 0, 0), false), 61.0);
        assert_eq!(datetime_to_serial(dt(2024, 1, 15, 12, 0), false), 45306.5);
        assert_eq!(datetime_to_serial(dt(1904, 1, 2, 0, 0), true), 1.0);
    }

    #[test]
    fn test_serial_to_datetime() {
        assert_eq!(serial_to_datetime(45306.5, false), Some(dt(2024, 1, 15, 12, 0)));
        assert_eq!(serial_to_datetime(1.0, false), Some(dt(1900, 1, 1, 0, 0)));
        assert_eq!(serial_to_datetime(61.0, false), Some(dt(1900, 3, 1, 0, 0)));
        assert_eq!(serial_to_datetime(-1.0, false), None);
    }

    #[test]
    fn test_durations() {
        let d = TimeDelta::hours(36);
        assert_eq!(duration_to_serial(d), 1.5);
        assert_eq!(serial_to_duration(1.5), Some(d));
    }
}
