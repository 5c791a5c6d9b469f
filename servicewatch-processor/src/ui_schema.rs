//! Static UI schema published to the ui_state channel on deployment.

use serde_json::{json, Value};

fn variable(name: &str, var_type: &str, label: &str, precision: Option<u8>) -> Value {
    let mut var = json!({
        "type": "uiVariable",
        "varType": var_type,
        "name": name,
        "displayString": label,
    });
    if let Some(p) = precision {
        var["decPrecision"] = json!(p);
    }
    var
}

fn float_param(name: &str, label: &str, min: Option<f64>, max: Option<f64>) -> Value {
    let mut param = json!({
        "type": "uiFloatParam",
        "name": name,
        "displayString": label,
    });
    if let Some(min) = min {
        param["min"] = json!(min);
    }
    if let Some(max) = max {
        param["max"] = json!(max);
    }
    param
}

/// Builds the deployment document; `sms_lead_days` is shown on the alert stream.
pub fn deployment_document(sms_lead_days: f64) -> Value {
    let maintenance = json!({
        "type": "uiSubmodule",
        "name": "maintenance_submodule",
        "displayString": "Maintenance",
        "children": {
            "lastServiceDate": {
                "type": "uiDatetimeParam",
                "includeTime": false,
                "name": "lastServiceDate",
                "displayString": "Last service done",
            },
            "lastServiceHours": float_param("lastServiceHours", "At hours (hrs)", Some(0.0), None),
            "lastServiceOdo": float_param("lastServiceOdo", "And at Odometer (kms)", Some(0.0), None),
            "serviceIntervalMonths": float_param(
                "serviceIntervalMonths",
                "Service Interval (months)",
                Some(0.0),
                Some(60.0),
            ),
            "serviceIntervalHours": float_param("serviceIntervalHours", "Service Interval (hrs)", Some(0.0), None),
            "serviceIntervalOdo": float_param("serviceIntervalOdo", "Service Interval (kms)", Some(0.0), None),
            "nextServiceDue": variable("nextServiceDue", "text", "Next Service due (max)", None),
            "nextServiceHours": variable("nextServiceHours", "float", "At hours (hrs)", None),
            "nextServiceOdo": variable("nextServiceOdo", "float", "And at Odometer (kms)", None),
        }
    });

    let config = json!({
        "type": "uiSubmodule",
        "name": "config_submodule",
        "displayString": "Config",
        "children": {
            "setHours": float_param("setHours", "Set Machine Hours (hrs)", None, None),
            "setKms": float_param("setKms", "Set Odometer (km)", None, None),
            "warningSmsPeriod": float_param("warningSmsPeriod", "SMS Alert Period (days)", None, None),
            "aveCalcDays": float_param("aveCalcDays", "Ave Use Calculation (days)", None, None),
        }
    });

    json!({
        "state": {
            "type": "uiContainer",
            "displayString": "",
            "children": {
                "significantEvent": {
                    "type": "uiAlertStream",
                    "name": "significantEvent",
                    "displayString": "Notify me of any problems",
                },
                "location": {
                    "type": "uiVariable",
                    "varType": "location",
                    "hide": true,
                    "name": "location",
                    "displayString": "Location",
                },
                "deviceRunHours": variable("deviceRunHours", "float", "Engine Hours (hrs)", Some(2)),
                "deviceOdometer": variable("deviceOdometer", "float", "Machine Odometer (km)", Some(1)),
                "nextServiceEst": variable("nextServiceEst", "text", "Next Service Estimate", None),
                "daysTillNextService": variable("daysTillNextService", "float", "Days To Next Service (days)", Some(0)),
                "smsServiceAlert": {
                    "type": "uiAlertStream",
                    "name": "significantEvent",
                    "displayString": format!("Text me {} days before next service", sms_lead_days),
                },
                "hoursTillNextService": variable(
                    "hoursTillNextService",
                    "float",
                    "Hours To Next Service (hrs)",
                    Some(1),
                ),
                "kmsTillNextService": variable("kmsTillNextService", "float", "Kms Till Next Service (kms)", Some(1)),
                "aveHoursPerDay": variable("aveHoursPerDay", "float", "Ave Hours Per Day (hrs)", Some(1)),
                "aveKmsPerDay": variable("aveKmsPerDay", "float", "Ave Kms Per Day (kms)", Some(1)),
                "engineOn": variable("engineOn", "bool", "Engine On", None),
                "maintenance_submodule": maintenance,
                "config_submodule": config,
                "node_connection_info": {
                    "type": "uiConnectionInfo",
                    "name": "node_connection_info",
                    "connectionType": "periodic",
                    "connectionPeriod": 600,
                    "nextConnection": 600,
                },
            }
        }
    })
}
