/**
 * PROCESSOR - One invocation of the service forecasting task for one device
 *
 * ROLE:
 * Dispatches an invocation (DEPLOY, UPLINK, FETCH, DOWNLINK) against the
 * channels of one device. Every input is re-read from the channels; nothing
 * survives the invocation except what gets published.
 *
 * UPLINK CYCLE:
 * uplink aggregate -> identity check (fail closed) -> snapshot decode
 * -> usage rates from uplink history -> service candidates -> earliest wins
 * -> publish ui state, location, alert
 *
 * ERRORS:
 * Missing fields become nulls. Every read happens before the first publish,
 * so identity mismatch and channel/provider read failures abort with nothing
 * published. ui_state goes out first: if it fails, nothing else is written.
 */

use crate::activity::ActivityLog;
use crate::baseline::MaintenanceBaseline;
use crate::channels::{ChannelError, ChannelStore};
use crate::config::{ChannelNames, ForecastConf};
use crate::forecast::{self, ForecastContext, ForecastReport};
use crate::history::HistoryReader;
use crate::publisher::{self, ForecastDocument, MaintenanceSummary};
use crate::snapshot::{EquipmentIdentity, TelemetrySnapshot};
use crate::telematics::{NoTelematics, TelematicsError, TelematicsSource};
use crate::ui_schema;
use crate::usage::UsageRateEstimator;
use crate::validator::{self, Rejection};
use chrono::{DateTime, Utc};
use serde::{de, Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TaskKind {
    Deploy,
    Uplink,
    Fetch,
    Downlink,
}

impl TaskKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::Deploy => "DEPLOY",
            TaskKind::Uplink => "UPLINK",
            TaskKind::Fetch => "FETCH",
            TaskKind::Downlink => "DOWNLINK",
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown task type: {0}")]
pub struct UnknownTask(pub String);

impl FromStr for TaskKind {
    type Err = UnknownTask;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "DEPLOY" => Ok(TaskKind::Deploy),
            "UPLINK" => Ok(TaskKind::Uplink),
            "FETCH" => Ok(TaskKind::Fetch),
            "DOWNLINK" => Ok(TaskKind::Downlink),
            _ => Err(UnknownTask(s.to_string())),
        }
    }
}

/// Same case-insensitive names as `FromStr`.
impl<'de> Deserialize<'de> for TaskKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(de::Error::custom)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CycleError {
    #[error("no asset configured for agent {0}")]
    MissingAssetConfig(String),
    #[error("uplink rejected: {0}")]
    IdentityMismatch(#[from] Rejection),
    #[error(transparent)]
    Channel(#[from] ChannelError),
    #[error(transparent)]
    Telematics(#[from] TelematicsError),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutcome {
    Deployed,
    Fetched { published: bool },
    Forecast(Box<ForecastReport>),
    Ignored,
}

/// Per-invocation settings, resolved from the application config.
#[derive(Debug, Clone)]
pub struct ProcessorSettings {
    pub agent_id: String,
    pub identity: Option<EquipmentIdentity>,
    pub channels: ChannelNames,
    pub forecast: ForecastConf,
}

pub struct Processor<S, T = NoTelematics> {
    store: S,
    telematics: T,
    settings: ProcessorSettings,
}

impl<S: ChannelStore> Processor<S, NoTelematics> {
    pub fn new(store: S, settings: ProcessorSettings) -> Self {
        Self {
            store,
            telematics: NoTelematics,
            settings,
        }
    }
}

impl<S: ChannelStore, T: TelematicsSource> Processor<S, T> {
    pub fn with_telematics<U: TelematicsSource>(self, telematics: U) -> Processor<S, U> {
        Processor {
            store: self.store,
            telematics,
            settings: self.settings,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Runs one invocation and publishes its activity log, whatever the outcome.
    pub async fn invoke(&self, task: TaskKind, now: DateTime<Utc>) -> Result<TaskOutcome, CycleError> {
        let mut log = ActivityLog::new(&self.settings.agent_id, task.as_str(), now);
        let result = self.handle(task, now, &mut log).await;

        if let Err(e) = &result {
            error!("{} failed for agent {}: {}", task, self.settings.agent_id, e);
            log.record(format!("ERROR {}", e));
        }
        self.complete_log(&log).await;
        result
    }

    pub async fn handle(
        &self,
        task: TaskKind,
        now: DateTime<Utc>,
        log: &mut ActivityLog,
    ) -> Result<TaskOutcome, CycleError> {
        match task {
            TaskKind::Deploy => self.deploy(log).await,
            TaskKind::Uplink => self.uplink(now, log).await,
            TaskKind::Fetch => self.fetch(log).await,
            TaskKind::Downlink => {
                log.record("downlink received, nothing to process");
                Ok(TaskOutcome::Ignored)
            }
        }
    }

    fn identity(&self) -> Result<&EquipmentIdentity, CycleError> {
        self.settings
            .identity
            .as_ref()
            .ok_or_else(|| CycleError::MissingAssetConfig(self.settings.agent_id.clone()))
    }

    async fn deploy(&self, log: &mut ActivityLog) -> Result<TaskOutcome, CycleError> {
        let commands = self.store.get_aggregate(&self.settings.channels.ui_cmds).await?;
        let baseline = MaintenanceBaseline::from_commands(commands.as_ref());
        let lead_days = baseline
            .sms_alert_lead_days
            .unwrap_or(self.settings.forecast.default_sms_lead_days);

        let schema = ui_schema::deployment_document(lead_days);
        self.store.publish(&self.settings.channels.ui_state, &schema).await?;
        log.record(format!("deployed ui schema (sms lead {} days)", lead_days));
        Ok(TaskOutcome::Deployed)
    }

    async fn fetch(&self, log: &mut ActivityLog) -> Result<TaskOutcome, CycleError> {
        let identity = self.identity()?;
        log.record(format!(
            "fetching {} {} {} from telematics provider",
            identity.make, identity.model, identity.serial_number
        ));

        match self.telematics.equipment_snapshot(identity).await? {
            Some(document) => {
                self.store.publish(&self.settings.channels.uplink, &document).await?;
                log.record("published equipment snapshot to uplink channel");
                Ok(TaskOutcome::Fetched { published: true })
            }
            None => {
                log.record("telematics provider returned no equipment");
                Ok(TaskOutcome::Fetched { published: false })
            }
        }
    }

    async fn uplink(&self, now: DateTime<Utc>, log: &mut ActivityLog) -> Result<TaskOutcome, CycleError> {
        let channels = &self.settings.channels;
        let identity = self.identity()?;

        let uplink = self.store.get_aggregate(&channels.uplink).await?;
        let document = validator::check(uplink.as_ref(), identity)?;
        log.record("machine details match uplink");

        let commands = self.store.get_aggregate(&channels.ui_cmds).await?;
        let baseline = MaintenanceBaseline::from_commands(commands.as_ref());
        let snapshot = TelemetrySnapshot::from_document(document, now);
        log.record(format!(
            "engine hours {:?}, odometer {:?}, engine running {:?}",
            snapshot.engine_hours, snapshot.odometer_km, snapshot.engine_running
        ));

        let history = HistoryReader::new(&self.store, &channels.uplink)
            .with_span_days(self.settings.forecast.history_span_days);
        let usage = UsageRateEstimator::new(history)
            .with_max_retries(self.settings.forecast.max_retries)
            .estimate(now, snapshot.counters(), baseline.averaging_window_days)
            .await?;

        let ctx = ForecastContext {
            now,
            snapshot: &snapshot,
            baseline: &baseline,
        };
        let report = forecast::forecast(&ctx, usage);

        let date_format = &self.settings.forecast.date_format;
        let document = ForecastDocument::build(&snapshot, &report, date_format);
        let maintenance = MaintenanceSummary::build(&baseline, &report, date_format);
        let ui_state = publisher::ui_state_document(&document, &maintenance, snapshot.location.as_ref())?;

        let previous = self.store.get_aggregate(&channels.ui_state).await?;
        let lead_days = baseline
            .sms_alert_lead_days
            .unwrap_or(self.settings.forecast.default_sms_lead_days);
        let raise_alert = forecast::alert_due(
            publisher::previous_days(previous.as_ref()),
            document.days_till_next_service,
            lead_days,
        );

        self.store.publish(&channels.ui_state, &ui_state).await?;
        log.record(format!(
            "next service {:?} ({:?} days)",
            document.next_service_est, document.days_till_next_service
        ));
        if let Some(location) = &snapshot.location {
            self.store
                .publish(&channels.location, &publisher::location_document(location))
                .await?;
        }

        if raise_alert {
            self.store
                .publish(&channels.notifications, &publisher::alert_document(&document))
                .await?;
            log.record(format!("service alert raised ({} day lead)", lead_days));
        }

        info!(
            "forecast published for agent {}: {:?}",
            self.settings.agent_id, report.forecast.next_service_date
        );
        Ok(TaskOutcome::Forecast(Box::new(report)))
    }

    async fn complete_log(&self, log: &ActivityLog) {
        let document = match serde_json::to_value(log) {
            Ok(doc) => doc,
            Err(e) => {
                warn!("could not serialize activity log: {}", e);
                return;
            }
        };
        if let Err(e) = self.store.publish(&self.settings.channels.activity_log, &document).await {
            warn!("could not publish activity log: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channels::MemoryChannelStore;
    use chrono::TimeZone;
    use serde_json::json;

    fn settings(identity: Option<EquipmentIdentity>) -> ProcessorSettings {
        ProcessorSettings {
            agent_id: "agent-1".into(),
            identity,
            channels: ChannelNames::default(),
            forecast: ForecastConf::default(),
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_task_kind_parsing() {
        assert_eq!("uplink".parse::<TaskKind>().unwrap(), TaskKind::Uplink);
        assert_eq!("FETCH".parse::<TaskKind>().unwrap(), TaskKind::Fetch);
        assert!("REBOOT".parse::<TaskKind>().is_err());
        assert_eq!(serde_json::to_value(TaskKind::Deploy).unwrap(), json!("DEPLOY"));
        assert_eq!(serde_json::from_value::<TaskKind>(json!("downlink")).unwrap(), TaskKind::Downlink);
        assert!(serde_json::from_value::<TaskKind>(json!("REBOOT")).is_err());
    }

    #[tokio::test]
    async fn test_missing_asset_config_fails_closed() {
        let store = MemoryChannelStore::new();
        store.insert("uplink_recv", now(), json!({"EquipmentHeader": {"OEMName": "CAT"}}));
        let processor = Processor::new(store.clone(), settings(None));

        let result = processor.invoke(TaskKind::Uplink, now()).await;
        assert!(matches!(result, Err(CycleError::MissingAssetConfig(_))));
        assert!(store.messages("ui_state").is_empty());
        assert_eq!(store.messages("activity_logs").len(), 1);
    }

    #[tokio::test]
    async fn test_fetch_without_credentials_fails() {
        let store = MemoryChannelStore::new();
        let identity = EquipmentIdentity::new("CAT", "D11T", "AMA00883");
        let processor = Processor::new(store.clone(), settings(Some(identity)));

        let result = processor.invoke(TaskKind::Fetch, now()).await;
        assert!(matches!(result, Err(CycleError::Telematics(TelematicsError::NotConfigured))));
        assert!(store.messages("uplink_recv").is_empty());
    }

    #[tokio::test]
    async fn test_downlink_is_ignored() {
        let store = MemoryChannelStore::new();
        let processor = Processor::new(store.clone(), settings(None));
        assert_eq!(processor.invoke(TaskKind::Downlink, now()).await.unwrap(), TaskOutcome::Ignored);

        let log = store.latest("activity_logs").unwrap();
        assert_eq!(log["task"], "DOWNLINK");
        assert_eq!(log["lines"][0], "downlink received, nothing to process");
    }
}
