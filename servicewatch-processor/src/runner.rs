//! Wires one invocation to the live platform and telematics provider.

use anyhow::{Context, Result};
use chrono::Utc;
use servicewatch_processor::config::AppConfig;
use servicewatch_processor::platform::PlatformChannelStore;
use servicewatch_processor::telematics::IsoTelematicsClient;
use servicewatch_processor::{Processor, ProcessorSettings, TaskKind, TaskOutcome};
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Clone)]
pub struct Runner {
    config: AppConfig,
    http: reqwest::Client,
}

impl Runner {
    pub fn new(config: AppConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(concat!("servicewatch-processor/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self { config, http })
    }

    fn settings(&self, agent_id: &str) -> ProcessorSettings {
        let identity = self.config.asset(agent_id).cloned();
        if identity.is_none() {
            warn!("no asset configured for agent {}", agent_id);
        }
        ProcessorSettings {
            agent_id: agent_id.to_string(),
            identity,
            channels: self.config.channels.clone(),
            forecast: self.config.forecast.clone(),
        }
    }

    pub async fn invoke(&self, agent_id: &str, task: TaskKind) -> Result<TaskOutcome> {
        let store = PlatformChannelStore::new(
            self.http.clone(),
            &self.config.platform.api_endpoint,
            self.config.platform.access_token.clone(),
            agent_id,
        );
        let processor = Processor::new(store, self.settings(agent_id));
        let now = Utc::now();

        let outcome = match self.config.telematics.credentials() {
            Some(credentials) => {
                let client = IsoTelematicsClient::new(self.http.clone(), self.config.telematics.clone(), credentials);
                processor.with_telematics(client).invoke(task, now).await
            }
            None => {
                debug!("telematics credentials not set");
                processor.invoke(task, now).await
            }
        };

        outcome.with_context(|| format!("{} failed for agent {}", task, agent_id))
    }
}
