//! Fractional-day arithmetic on UTC timestamps.

use chrono::{DateTime, TimeDelta, Utc};

const MILLIS_PER_DAY: f64 = 86_400_000.0;

/// `None` for non-finite or out-of-range spans.
pub fn span(days: f64) -> Option<TimeDelta> {
    if !days.is_finite() {
        return None;
    }
    let millis = (days * MILLIS_PER_DAY).round();
    if millis.abs() >= i64::MAX as f64 {
        return None;
    }
    TimeDelta::try_milliseconds(millis as i64)
}

pub fn offset(from: DateTime<Utc>, days: f64) -> Option<DateTime<Utc>> {
    from.checked_add_signed(span(days)?)
}

pub fn between(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    (to - from).num_milliseconds() as f64 / MILLIS_PER_DAY
}
