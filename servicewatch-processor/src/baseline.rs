//! Operator-configured maintenance parameters, read from the aggregate of the
//! ui_cmds channel (`{"cmds": {...}}`).

use crate::json::{at, f64_at};
use chrono::{DateTime, NaiveDate};
use serde_json::Value;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MaintenanceBaseline {
    pub last_service_date: Option<NaiveDate>,
    pub last_service_hours: Option<f64>,
    pub last_service_odometer_km: Option<f64>,
    pub service_interval_months: Option<f64>,
    pub service_interval_hours: Option<f64>,
    pub service_interval_km: Option<f64>,
    pub averaging_window_days: Option<f64>,
    pub sms_alert_lead_days: Option<f64>,
}

impl MaintenanceBaseline {
    /// Decodes the operator commands aggregate. A missing aggregate yields an
    /// empty baseline, which disables every estimator branch.
    pub fn from_commands(commands: Option<&Value>) -> Self {
        let Some(doc) = commands else {
            return Self::default();
        };

        Self {
            last_service_date: at(doc, &["cmds", "lastServiceDate"]).and_then(parse_service_date),
            last_service_hours: f64_at(doc, &["cmds", "lastServiceHours"]),
            last_service_odometer_km: f64_at(doc, &["cmds", "lastServiceOdo"]),
            service_interval_months: f64_at(doc, &["cmds", "serviceIntervalMonths"]),
            service_interval_hours: f64_at(doc, &["cmds", "serviceIntervalHours"]),
            service_interval_km: f64_at(doc, &["cmds", "serviceIntervalOdo"]),
            averaging_window_days: f64_at(doc, &["cmds", "aveCalcDays"]),
            sms_alert_lead_days: f64_at(doc, &["cmds", "warningSmsPeriod"]),
        }
    }

    /// Engine hours at which the next service falls due.
    pub fn next_service_hours(&self) -> Option<f64> {
        Some(self.last_service_hours? + self.service_interval_hours?)
    }

    /// Odometer reading at which the next service falls due.
    pub fn next_service_km(&self) -> Option<f64> {
        Some(self.last_service_odometer_km? + self.service_interval_km?)
    }
}

/// Date params arrive as epoch seconds from the date picker, or as RFC 3339 /
/// `YYYY-MM-DD` strings when set through the API.
fn parse_service_date(raw: &Value) -> Option<NaiveDate> {
    match raw {
        Value::Number(n) => {
            let secs = n.as_f64()?;
            if !secs.is_finite() {
                return None;
            }
            DateTime::from_timestamp(secs.floor() as i64, 0).map(|dt| dt.date_naive())
        }
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.date_naive())
            .ok()
            .or_else(|| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_full_commands() {
        let cmds = json!({"cmds": {
            "lastServiceDate": "2024-01-15",
            "lastServiceHours": 100.0,
            "lastServiceOdo": 2000.0,
            "serviceIntervalMonths": 6,
            "serviceIntervalHours": 250.0,
            "serviceIntervalOdo": 5000.0,
            "aveCalcDays": 7,
            "warningSmsPeriod": 10
        }});

        let baseline = MaintenanceBaseline::from_commands(Some(&cmds));
        assert_eq!(baseline.last_service_date, NaiveDate::from_ymd_opt(2024, 1, 15));
        assert_eq!(baseline.next_service_hours(), Some(350.0));
        assert_eq!(baseline.next_service_km(), Some(7000.0));
        assert_eq!(baseline.service_interval_months, Some(6.0));
        assert_eq!(baseline.averaging_window_days, Some(7.0));
        assert_eq!(baseline.sms_alert_lead_days, Some(10.0));
    }

    #[test]
    fn test_service_date_formats() {
        // 2024-03-01T00:00:00Z
        assert_eq!(parse_service_date(&json!(1709251200)), NaiveDate::from_ymd_opt(2024, 3, 1));
        assert_eq!(
            parse_service_date(&json!("2024-03-01T08:30:00+00:00")),
            NaiveDate::from_ymd_opt(2024, 3, 1)
        );
        assert_eq!(parse_service_date(&json!("01/03/2024")), None);
        assert_eq!(parse_service_date(&json!(true)), None);
    }

    #[test]
    fn test_missing_and_mistyped_fields() {
        let cmds = json!({"cmds": {"lastServiceHours": "100", "serviceIntervalHours": 250.0}});
        let baseline = MaintenanceBaseline::from_commands(Some(&cmds));
        assert_eq!(baseline.last_service_hours, None);
        assert_eq!(baseline.next_service_hours(), None);

        assert_eq!(MaintenanceBaseline::from_commands(None), MaintenanceBaseline::default());
    }
}
