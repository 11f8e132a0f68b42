//! UTC clock helpers. All timestamps in the crate are UTC unix milliseconds;
//! calendar-day and time-of-day math goes through chrono and never touches
//! the local timezone.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};

use crate::model::{Ms, Span};

pub const DAY_MS: Ms = 86_400_000;

pub fn now_ms() -> Ms {
    Utc::now().timestamp_millis()
}

/// Time-of-day component of a timestamp. Timestamps are range-checked at the
/// mutation boundary, so the out-of-range fallback is unreachable in practice.
pub fn time_of_day(t: Ms) -> NaiveTime {
    DateTime::from_timestamp_millis(t)
        .map(|dt| dt.time())
        .unwrap_or(NaiveTime::MIN)
}

pub fn date_of(t: Ms) -> Option<NaiveDate> {
    DateTime::from_timestamp_millis(t).map(|dt| dt.date_naive())
}

/// The UTC calendar day as a half-open span [midnight, next midnight).
pub fn day_bounds(date: NaiveDate) -> Span {
    let start = date.and_time(NaiveTime::MIN).and_utc().timestamp_millis();
    Span::new(start, start + DAY_MS)
}

pub fn today_utc() -> NaiveDate {
    Utc::now().date_naive()
}

/// Timestamp of a clock time on a given day.
pub fn at(date: NaiveDate, time: NaiveTime) -> Ms {
    date.and_time(time).and_utc().timestamp_millis()
}
