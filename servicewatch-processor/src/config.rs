//! Processor configuration
//!
//! Loaded from `servicewatch.yaml` (or `$SERVICEWATCH_CONFIG`). A missing,
//! empty or invalid file falls back to defaults. Secrets can be injected from
//! the environment, which wins over the file:
//! - `SERVICEWATCH_PLATFORM_TOKEN`
//! - `SERVICEWATCH_TELEMATICS_CLIENT_ID` / `SERVICEWATCH_TELEMATICS_CLIENT_SECRET`

use crate::history::DEFAULT_SPAN_DAYS;
use crate::snapshot::EquipmentIdentity;
use crate::telematics::ClientCredentials;
use crate::usage::DEFAULT_MAX_RETRIES;
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, path::Path};
use tokio::fs;
use tracing::{info, warn};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub mqtt: MqttConf,
    pub platform: PlatformConf,
    pub telematics: TelematicsConf,
    pub channels: ChannelNames,
    pub forecast: ForecastConf,
    /// agent id -> asset identity
    pub assets: HashMap<String, EquipmentIdentity>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MqttConf {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub invoke_topic: String,
    pub result_topic: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlatformConf {
    pub api_endpoint: String,
    #[serde(skip_serializing)]
    pub access_token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelematicsConf {
    pub token_endpoint: String,
    pub equipment_endpoint: String,
    pub scope: String,
    pub client_id: Option<String>,
    #[serde(skip_serializing)]
    pub client_secret: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelNames {
    pub uplink: String,
    pub ui_state: String,
    pub ui_cmds: String,
    pub location: String,
    pub notifications: String,
    pub activity_log: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ForecastConf {
    pub max_retries: u32,
    pub history_span_days: f64,
    pub date_format: String,
    pub default_sms_lead_days: f64,
}

impl Default for MqttConf {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            port: 1883,
            client_id: "servicewatch-processor".into(),
            invoke_topic: "servicewatch/tasks/invoke@v1".into(),
            result_topic: "servicewatch/tasks/result@v1".into(),
        }
    }
}

impl Default for PlatformConf {
    fn default() -> Self {
        Self {
            api_endpoint: "http://localhost:8080".into(),
            access_token: None,
        }
    }
}

impl Default for TelematicsConf {
    fn default() -> Self {
        Self {
            token_endpoint: "https://fedlogin.cat.com/as/token.oauth2".into(),
            equipment_endpoint: "https://services.cat.com/telematics/iso15143/fleet/equipment/makeModelSerial".into(),
            scope: "manage:all".into(),
            client_id: None,
            client_secret: None,
        }
    }
}

impl Default for ChannelNames {
    fn default() -> Self {
        Self {
            uplink: "uplink_recv".into(),
            ui_state: "ui_state".into(),
            ui_cmds: "ui_cmds".into(),
            location: "location".into(),
            notifications: "significantEvent".into(),
            activity_log: "activity_logs".into(),
        }
    }
}

impl Default for ForecastConf {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            history_span_days: DEFAULT_SPAN_DAYS,
            date_format: "%d/%m/%Y".into(),
            default_sms_lead_days: 14.0,
        }
    }
}

impl TelematicsConf {
    /// Both halves of the client credentials, or nothing.
    pub fn credentials(&self) -> Option<ClientCredentials> {
        Some(ClientCredentials {
            client_id: self.client_id.clone()?,
            client_secret: self.client_secret.clone()?,
        })
    }
}

impl AppConfig {
    /// Environment secrets override whatever the file holds.
    pub fn apply_env_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(token) = var("SERVICEWATCH_PLATFORM_TOKEN") {
            self.platform.access_token = Some(token);
        }
        if let Some(id) = var("SERVICEWATCH_TELEMATICS_CLIENT_ID") {
            self.telematics.client_id = Some(id);
        }
        if let Some(secret) = var("SERVICEWATCH_TELEMATICS_CLIENT_SECRET") {
            self.telematics.client_secret = Some(secret);
        }
    }

    pub fn asset(&self, agent_id: &str) -> Option<&EquipmentIdentity> {
        self.assets.get(agent_id)
    }
}

pub async fn load_config() -> AppConfig {
    let path = std::env::var("SERVICEWATCH_CONFIG").unwrap_or_else(|_| "servicewatch.yaml".into());
    let mut config = load_config_from(&path).await;
    config.apply_env_overrides(|name| std::env::var(name).ok());
    config
}

pub async fn load_config_from(path: impl AsRef<Path>) -> AppConfig {
    let path = path.as_ref();
    if !path.exists() {
        warn!("no config at {}, using defaults", path.display());
        return AppConfig::default();
    }

    let txt = fs::read_to_string(path).await.unwrap_or_default();
    if txt.trim().is_empty() {
        return AppConfig::default();
    }

    match serde_yaml::from_str::<AppConfig>(&txt) {
        Ok(config) => {
            info!("loaded config from {} ({} assets)", path.display(), config.assets.len());
            config
        }
        Err(e) => {
            warn!("invalid config {}: {}, using defaults", path.display(), e);
            AppConfig::default()
        }
    }
}
