/*!
Channel document builders

Build the JSON documents a device's channels carry, without spelling out the
nested layout in every test:
- equipment snapshots as relayed on the uplink channel
- operator maintenance commands (`{"cmds": {...}}`)
- ui_state documents as a previous forecast cycle left them
*/

use serde_json::{json, Map, Value};
use servicewatch_processor::EquipmentIdentity;

/// Equipment snapshot in the ISO 15143-3 layout.
#[derive(Debug, Clone)]
pub struct EquipmentBuilder {
    identity: EquipmentIdentity,
    hours: Option<f64>,
    hours_datetime: Option<String>,
    odometer_km: Option<f64>,
    running: Option<bool>,
    location: Option<(f64, f64, f64)>,
}

impl EquipmentBuilder {
    pub fn new(identity: &EquipmentIdentity) -> Self {
        Self {
            identity: identity.clone(),
            hours: None,
            hours_datetime: None,
            odometer_km: None,
            running: None,
            location: None,
        }
    }

    pub fn hours(mut self, hours: f64) -> Self {
        self.hours = Some(hours);
        self
    }

    pub fn hours_at(mut self, datetime: impl Into<String>) -> Self {
        self.hours_datetime = Some(datetime.into());
        self
    }

    pub fn odometer(mut self, km: f64) -> Self {
        self.odometer_km = Some(km);
        self
    }

    pub fn running(mut self, running: bool) -> Self {
        self.running = Some(running);
        self
    }

    pub fn location(mut self, lat: f64, long: f64, alt: f64) -> Self {
        self.location = Some((lat, long, alt));
        self
    }

    pub fn build(self) -> Value {
        let mut doc = json!({
            "EquipmentHeader": {
                "OEMName": self.identity.make,
                "Model": self.identity.model,
                "SerialNumber": self.identity.serial_number,
            }
        });

        if self.hours.is_some() || self.hours_datetime.is_some() {
            let mut block = Map::new();
            if let Some(hours) = self.hours {
                block.insert("Hour".into(), json!(hours));
            }
            if let Some(datetime) = self.hours_datetime {
                block.insert("Datetime".into(), json!(datetime));
            }
            doc["CumulativeOperatingHours"] = Value::Object(block);
        }
        if let Some(km) = self.odometer_km {
            doc["Distance"] = json!({"OdometerUnits": "kilometre", "Odometer": km});
        }
        if let Some(running) = self.running {
            doc["EngineStatus"] = json!({"Running": running});
        }
        if let Some((lat, long, alt)) = self.location {
            doc["Location"] = json!({"Latitude": lat, "Longitude": long, "Altitude": alt});
        }
        doc
    }
}

/// Operator commands aggregate of the ui_cmds channel.
#[derive(Debug, Clone, Default)]
pub struct CommandsBuilder {
    cmds: Map<String, Value>,
}

impl CommandsBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw setter, for values of the wrong type or unusual encodings.
    pub fn set(mut self, key: &str, value: Value) -> Self {
        self.cmds.insert(key.to_string(), value);
        self
    }

    /// `YYYY-MM-DD`, as sent through the API.
    pub fn last_service_date(self, date: &str) -> Self {
        self.set("lastServiceDate", json!(date))
    }

    pub fn last_service_hours(self, hours: f64) -> Self {
        self.set("lastServiceHours", json!(hours))
    }

    pub fn last_service_odo(self, km: f64) -> Self {
        self.set("lastServiceOdo", json!(km))
    }

    pub fn interval_months(self, months: f64) -> Self {
        self.set("serviceIntervalMonths", json!(months))
    }

    pub fn interval_hours(self, hours: f64) -> Self {
        self.set("serviceIntervalHours", json!(hours))
    }

    pub fn interval_odo(self, km: f64) -> Self {
        self.set("serviceIntervalOdo", json!(km))
    }

    pub fn averaging_days(self, days: f64) -> Self {
        self.set("aveCalcDays", json!(days))
    }

    pub fn sms_lead_days(self, days: f64) -> Self {
        self.set("warningSmsPeriod", json!(days))
    }

    pub fn build(self) -> Value {
        json!({"cmds": self.cmds})
    }
}

/// ui_state document carrying only the countdown of a previous cycle.
pub fn previous_ui_state(days_till_next_service: Option<i64>) -> Value {
    json!({
        "state": {
            "children": {
                "daysTillNextService": {"currentValue": days_till_next_service}
            }
        }
    })
}
