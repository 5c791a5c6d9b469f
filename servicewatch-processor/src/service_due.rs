//! Service due calculator: three independent candidates for the next service.
//!
//! - calendar: last service date plus the interval in whole months (rounded up)
//! - hours:    date the projected engine hours reach the next service threshold
//! - distance: date the projected odometer reaches the next service threshold
//!
//! A candidate is computed only when every input it needs is present.

use crate::baseline::MaintenanceBaseline;
use crate::days;
use crate::snapshot::CounterReading;
use crate::usage::UsageRateEstimate;
use chrono::{DateTime, Months, Utc};

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ServiceCandidates {
    pub calendar: Option<DateTime<Utc>>,
    pub hours: Option<DateTime<Utc>>,
    pub distance: Option<DateTime<Utc>>,
}

impl ServiceCandidates {
    pub fn compute(
        now: DateTime<Utc>,
        baseline: &MaintenanceBaseline,
        current: CounterReading,
        usage: UsageRateEstimate,
    ) -> Self {
        Self {
            calendar: calendar_candidate(baseline),
            hours: counter_candidate(now, baseline.next_service_hours(), current.hours, usage.hours_per_day),
            distance: counter_candidate(now, baseline.next_service_km(), current.odometer_km, usage.km_per_day),
        }
    }

    pub fn to_array(self) -> [Option<DateTime<Utc>>; 3] {
        [self.calendar, self.hours, self.distance]
    }
}

/// A zero-month interval means "no calendar constraint".
pub fn calendar_candidate(baseline: &MaintenanceBaseline) -> Option<DateTime<Utc>> {
    let last = baseline.last_service_date?;
    let months = baseline.service_interval_months?.ceil();
    if !months.is_finite() || months < 1.0 || months > u32::MAX as f64 {
        return None;
    }
    let due = last.checked_add_months(Months::new(months as u32))?;
    Some(due.and_hms_opt(0, 0, 0)?.and_utc())
}

/// `now + (target - current) / rate`. A zero rate cannot be projected.
pub fn counter_candidate(
    now: DateTime<Utc>,
    target: Option<f64>,
    current: Option<f64>,
    rate_per_day: Option<f64>,
) -> Option<DateTime<Utc>> {
    let rate = rate_per_day.filter(|r| *r != 0.0)?;
    let days_to_run = (target? - current?) / rate;
    days::offset(now, days_to_run)
}

/// Signed linear remainder; negative once the threshold is passed.
pub fn remaining(target: Option<f64>, current: Option<f64>) -> Option<f64> {
    let left = target? - current?;
    left.is_finite().then_some(left)
}
