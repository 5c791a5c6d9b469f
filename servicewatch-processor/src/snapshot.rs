//! Telemetry snapshot model
//!
//! Equipment documents follow the ISO 15143-3 snapshot layout served by the
//! telematics provider and relayed on the uplink channel:
//! - `EquipmentHeader { OEMName, Model, SerialNumber }`
//! - `CumulativeOperatingHours { Hour, Datetime }`
//! - `Distance { Odometer }`
//! - `EngineStatus { Running }`
//! - `Location { Latitude, Longitude, Altitude }`
//!
//! Every leaf is optional.

use crate::json::{bool_at, f64_at, str_at};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

/// Make / model / serial triple identifying one asset
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EquipmentIdentity {
    pub make: String,
    pub model: String,
    pub serial_number: String,
}

impl EquipmentIdentity {
    pub fn new(make: impl Into<String>, model: impl Into<String>, serial_number: impl Into<String>) -> Self {
        Self {
            make: make.into(),
            model: model.into(),
            serial_number: serial_number.into(),
        }
    }

    /// Reads the `EquipmentHeader` block. All three fields must be strings.
    pub fn from_document(doc: &Value) -> Option<Self> {
        Some(Self {
            make: str_at(doc, &["EquipmentHeader", "OEMName"])?.to_string(),
            model: str_at(doc, &["EquipmentHeader", "Model"])?.to_string(),
            serial_number: str_at(doc, &["EquipmentHeader", "SerialNumber"])?.to_string(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub lat: f64,
    pub long: f64,
    pub alt: f64,
}

/// Current engine-hours / odometer pair
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CounterReading {
    pub hours: Option<f64>,
    pub odometer_km: Option<f64>,
}

impl CounterReading {
    /// Extracts counters from an equipment snapshot stored on the uplink channel.
    pub fn from_payload(payload: &Value) -> Self {
        Self {
            hours: f64_at(payload, &["CumulativeOperatingHours", "Hour"]),
            odometer_km: f64_at(payload, &["Distance", "Odometer"]),
        }
    }
}

/// Normalized view of one equipment reading
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetrySnapshot {
    pub identity: Option<EquipmentIdentity>,
    pub timestamp: DateTime<Utc>,
    pub engine_hours: Option<f64>,
    pub odometer_km: Option<f64>,
    pub engine_running: Option<bool>,
    pub location: Option<Location>,
}

impl TelemetrySnapshot {
    /// Decodes an equipment document. `received_at` stands in for the reading
    /// time when the document carries no `CumulativeOperatingHours.Datetime`.
    pub fn from_document(doc: &Value, received_at: DateTime<Utc>) -> Self {
        let timestamp = str_at(doc, &["CumulativeOperatingHours", "Datetime"])
            .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
            .map(|ts| ts.with_timezone(&Utc))
            .unwrap_or(received_at);

        let location = match (
            f64_at(doc, &["Location", "Latitude"]),
            f64_at(doc, &["Location", "Longitude"]),
            f64_at(doc, &["Location", "Altitude"]),
        ) {
            (Some(lat), Some(long), Some(alt)) => Some(Location { lat, long, alt }),
            _ => None,
        };

        let snapshot = Self {
            identity: EquipmentIdentity::from_document(doc),
            timestamp,
            engine_hours: f64_at(doc, &["CumulativeOperatingHours", "Hour"]),
            odometer_km: f64_at(doc, &["Distance", "Odometer"]),
            engine_running: bool_at(doc, &["EngineStatus", "Running"]),
            location,
        };

        if snapshot.engine_hours.is_none() {
            debug!("snapshot has no usable CumulativeOperatingHours.Hour");
        }
        if snapshot.odometer_km.is_none() {
            debug!("snapshot has no usable Distance.Odometer");
        }
        if snapshot.location.is_none() {
            debug!("snapshot has no complete Location block");
        }

        snapshot
    }

    pub fn counters(&self) -> CounterReading {
        CounterReading {
            hours: self.engine_hours,
            odometer_km: self.odometer_km,
        }
    }
}
