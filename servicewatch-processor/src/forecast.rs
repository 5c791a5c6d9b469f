//! Forecast selector
//!
//! The asset is due at the first constraint it will hit: the earliest of the
//! calendar, hours and distance candidates. The countdown keeps fractional
//! days; display and alerting use the floored value.

use crate::baseline::MaintenanceBaseline;
use crate::days;
use crate::service_due::{remaining, ServiceCandidates};
use crate::snapshot::TelemetrySnapshot;
use crate::usage::UsageRateEstimate;
use chrono::{DateTime, Utc};

/// Everything one forecast cycle is allowed to look at.
#[derive(Debug, Clone, Copy)]
pub struct ForecastContext<'a> {
    pub now: DateTime<Utc>,
    pub snapshot: &'a TelemetrySnapshot,
    pub baseline: &'a MaintenanceBaseline,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ServiceForecast {
    pub next_service_date: Option<DateTime<Utc>>,
    pub days_until_due: Option<f64>,
    pub hours_until_due: Option<f64>,
    pub km_until_due: Option<f64>,
}

impl ServiceForecast {
    /// Whole days for display, negative when overdue.
    pub fn display_days(&self) -> Option<i64> {
        self.days_until_due.map(|d| d.floor() as i64)
    }
}

/// Candidates and forecast of one cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ForecastReport {
    pub usage: UsageRateEstimate,
    pub candidates: ServiceCandidates,
    pub forecast: ServiceForecast,
}

/// Earliest non-null candidate; independent of candidate order.
pub fn select(candidates: &[Option<DateTime<Utc>>]) -> Option<DateTime<Utc>> {
    candidates.iter().flatten().min().copied()
}

pub fn forecast(ctx: &ForecastContext<'_>, usage: UsageRateEstimate) -> ForecastReport {
    let current = ctx.snapshot.counters();
    let candidates = ServiceCandidates::compute(ctx.now, ctx.baseline, current, usage);
    let next_service_date = select(&candidates.to_array());

    ForecastReport {
        usage,
        candidates,
        forecast: ServiceForecast {
            next_service_date,
            days_until_due: next_service_date.map(|due| days::between(ctx.now, due)),
            hours_until_due: remaining(ctx.baseline.next_service_hours(), current.hours),
            km_until_due: remaining(ctx.baseline.next_service_km(), current.odometer_km),
        },
    }
}

/// Fires when the countdown enters the lead window: the current countdown is
/// within `lead_days` and the previously published one was not (or unknown).
pub fn alert_due(previous_days: Option<i64>, current_days: Option<i64>, lead_days: f64) -> bool {
    let Some(current) = current_days else {
        return false;
    };
    let within = |days: i64| days as f64 <= lead_days;
    within(current) && !previous_days.is_some_and(within)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeDelta, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 6, 0, 0).unwrap()
    }

    fn snapshot(hours: Option<f64>, odometer: Option<f64>) -> TelemetrySnapshot {
        TelemetrySnapshot {
            identity: None,
            timestamp: now(),
            engine_hours: hours,
            odometer_km: odometer,
            engine_running: Some(true),
            location: None,
        }
    }

    #[test]
    fn test_select_is_order_independent() {
        let a = Some(now() + TimeDelta::days(3));
        let b = Some(now() + TimeDelta::days(1));
        let c = None;
        assert_eq!(select(&[a, b, c]), b);
        assert_eq!(select(&[c, a, b]), b);
        assert_eq!(select(&[b, c, a]), b);
        assert_eq!(select(&[None, None, None]), None);
    }

    #[test]
    fn test_earliest_constraint_wins() {
        let baseline = MaintenanceBaseline {
            last_service_date: NaiveDate::from_ymd_opt(2024, 1, 1),
            service_interval_months: Some(12.0),
            last_service_hours: Some(100.0),
            service_interval_hours: Some(250.0),
            ..MaintenanceBaseline::default()
        };
        let snap = snapshot(Some(200.0), None);
        let ctx = ForecastContext { now: now(), snapshot: &snap, baseline: &baseline };
        let usage = UsageRateEstimate { hours_per_day: Some(5.0), km_per_day: None };

        let report = forecast(&ctx, usage);
        assert_eq!(report.forecast.next_service_date, Some(now() + TimeDelta::days(30)));
        assert_eq!(report.forecast.days_until_due, Some(30.0));
        assert_eq!(report.forecast.display_days(), Some(30));
        assert_eq!(report.forecast.hours_until_due, Some(150.0));
        assert_eq!(report.forecast.km_until_due, None);
    }

    #[test]
    fn test_all_null_forecast() {
        let baseline = MaintenanceBaseline::default();
        let snap = snapshot(Some(200.0), Some(4000.0));
        let ctx = ForecastContext { now: now(), snapshot: &snap, baseline: &baseline };

        let report = forecast(&ctx, UsageRateEstimate::default());
        assert_eq!(report.forecast, ServiceForecast::default());
        assert_eq!(report.forecast.display_days(), None);
    }

    #[test]
    fn test_overdue_days_are_floored() {
        let forecast = ServiceForecast {
            days_until_due: Some(-0.25),
            ..ServiceForecast::default()
        };
        assert_eq!(forecast.display_days(), Some(-1));

        let forecast = ServiceForecast {
            days_until_due: Some(13.9),
            ..ServiceForecast::default()
        };
        assert_eq!(forecast.display_days(), Some(13));
    }

    #[test]
    fn test_forecast_is_idempotent() {
        let baseline = MaintenanceBaseline {
            last_service_odometer_km: Some(1000.0),
            service_interval_km: Some(5000.0),
            ..MaintenanceBaseline::default()
        };
        let snap = snapshot(None, Some(4000.0));
        let ctx = ForecastContext { now: now(), snapshot: &snap, baseline: &baseline };
        let usage = UsageRateEstimate { hours_per_day: None, km_per_day: Some(80.0) };
        assert_eq!(forecast(&ctx, usage), forecast(&ctx, usage));
    }

    #[test]
    fn test_alert_hysteresis() {
        assert!(alert_due(Some(15), Some(14), 14.0));
        assert!(alert_due(None, Some(3), 14.0));
        assert!(alert_due(Some(20), Some(-2), 14.0));
        assert!(!alert_due(Some(14), Some(13), 14.0));
        assert!(!alert_due(Some(40), Some(30), 14.0));
        assert!(!alert_due(Some(5), None, 14.0));
    }
}
