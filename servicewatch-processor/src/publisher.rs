//! Forecast publisher: outbound documents of an uplink cycle.
//!
//! Field names are stable across cycles. Values the cycle could not compute
//! are published as `null`, never dropped and never zeroed.

use crate::baseline::MaintenanceBaseline;
use crate::forecast::ForecastReport;
use crate::json::f64_at;
use crate::snapshot::{Location, TelemetrySnapshot};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::fmt::Write;
use tracing::warn;

const FALLBACK_DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ForecastDocument {
    pub engine_on: Option<bool>,
    pub device_run_hours: Option<f64>,
    pub device_odometer: Option<f64>,
    pub next_service_est: Option<String>,
    pub days_till_next_service: Option<i64>,
    pub hours_till_next_service: Option<f64>,
    pub kms_till_next_service: Option<f64>,
    pub ave_hours_per_day: Option<f64>,
    pub ave_kms_per_day: Option<f64>,
}

/// Read-only values of the maintenance submodule.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MaintenanceSummary {
    pub next_service_due: Option<String>,
    pub next_service_hours: Option<f64>,
    pub next_service_odo: Option<f64>,
}

impl ForecastDocument {
    pub fn build(snapshot: &TelemetrySnapshot, report: &ForecastReport, date_format: &str) -> Self {
        Self {
            engine_on: snapshot.engine_running,
            device_run_hours: snapshot.engine_hours,
            device_odometer: snapshot.odometer_km,
            next_service_est: report.forecast.next_service_date.map(|d| format_date(d, date_format)),
            days_till_next_service: report.forecast.display_days(),
            hours_till_next_service: report.forecast.hours_until_due,
            kms_till_next_service: report.forecast.km_until_due,
            ave_hours_per_day: report.usage.hours_per_day,
            ave_kms_per_day: report.usage.km_per_day,
        }
    }
}

impl MaintenanceSummary {
    pub fn build(baseline: &MaintenanceBaseline, report: &ForecastReport, date_format: &str) -> Self {
        Self {
            next_service_due: report.candidates.calendar.map(|d| format_date(d, date_format)),
            next_service_hours: baseline.next_service_hours(),
            next_service_odo: baseline.next_service_km(),
        }
    }
}

/// `{"state": {"children": {<field>: {"currentValue": v}, "location": {...}, "maintenance_submodule": {...}}}}`
pub fn ui_state_document(
    forecast: &ForecastDocument,
    maintenance: &MaintenanceSummary,
    location: Option<&Location>,
) -> Result<Value, serde_json::Error> {
    let mut children = current_values(serde_json::to_value(forecast)?);
    children.insert(
        "location".to_string(),
        json!({"currentValue": location.map(location_document)}),
    );
    children.insert(
        "maintenance_submodule".to_string(),
        json!({"children": current_values(serde_json::to_value(maintenance)?)}),
    );
    Ok(json!({"state": {"children": children}}))
}

fn current_values(fields: Value) -> Map<String, Value> {
    match fields {
        Value::Object(map) => map
            .into_iter()
            .map(|(name, value)| (name, json!({"currentValue": value})))
            .collect(),
        _ => Map::new(),
    }
}

pub fn location_document(location: &Location) -> Value {
    json!({"lat": location.lat, "long": location.long, "alt": location.alt})
}

pub fn alert_document(forecast: &ForecastDocument) -> Value {
    let message = match (forecast.days_till_next_service, &forecast.next_service_est) {
        (Some(days), Some(date)) if days < 0 => format!("Service overdue by {} days (was due {})", -days, date),
        (Some(days), Some(date)) => format!("Service due in {} days ({})", days, date),
        _ => "Service due soon".to_string(),
    };
    json!({
        "message": message,
        "daysTillNextService": forecast.days_till_next_service,
        "nextServiceEst": forecast.next_service_est,
    })
}

/// Countdown published by the previous cycle, read back from the ui_state aggregate.
pub fn previous_days(ui_state: Option<&Value>) -> Option<i64> {
    f64_at(ui_state?, &["state", "children", "daysTillNextService", "currentValue"]).map(|d| d.floor() as i64)
}

/// Invalid format strings fall back to ISO dates instead of failing the cycle.
pub fn format_date(date: DateTime<Utc>, format: &str) -> String {
    let mut out = String::new();
    if write!(out, "{}", date.format(format)).is_err() {
        warn!("invalid date format {:?}, using {}", format, FALLBACK_DATE_FORMAT);
        return date.format(FALLBACK_DATE_FORMAT).to_string();
    }
    out
}
