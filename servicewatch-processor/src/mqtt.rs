//! MQTT listener mode.
//!
//! Invocations arrive on the invoke topic as
//! `{"agent_id": "...", "message_type": "UPLINK"}` and are processed one at a
//! time, in arrival order. Each one answers on the result topic.

use crate::runner::Runner;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rumqttc::{AsyncClient, Event, Incoming, MqttOptions, QoS};
use serde::{Deserialize, Serialize};
use servicewatch_processor::config::MqttConf;
use servicewatch_processor::TaskKind;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

#[derive(Debug, Deserialize)]
pub struct InvokeRequest {
    pub agent_id: String,
    pub message_type: TaskKind,
}

#[derive(Debug, Serialize)]
pub struct InvokeResult {
    pub agent_id: String,
    pub message_type: TaskKind,
    pub status: String,
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl InvokeResult {
    fn from_outcome<T>(request: &InvokeRequest, outcome: &Result<T>) -> Self {
        let (status, error) = match outcome {
            Ok(_) => ("success".to_string(), None),
            Err(e) => ("failed".to_string(), Some(format!("{:#}", e))),
        };
        Self {
            agent_id: request.agent_id.clone(),
            message_type: request.message_type,
            status,
            error,
            timestamp: Utc::now(),
        }
    }
}

pub async fn listen(conf: &MqttConf, runner: Runner) -> Result<()> {
    let mut options = MqttOptions::new(&conf.client_id, &conf.host, conf.port);
    options.set_keep_alive(Duration::from_secs(30));
    options.set_clean_session(true);

    let (client, mut eventloop) = AsyncClient::new(options, 10);
    client
        .subscribe(&conf.invoke_topic, QoS::AtLeastOnce)
        .await
        .context("Failed to subscribe to invoke topic")?;
    info!("Listening for invocations on {}", conf.invoke_topic);

    let (tx, mut rx) = mpsc::channel::<InvokeRequest>(64);
    let invoke_topic = conf.invoke_topic.clone();

    tokio::spawn(async move {
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Incoming::Publish(publish))) if publish.topic == invoke_topic => {
                    match serde_json::from_slice::<InvokeRequest>(&publish.payload) {
                        Ok(request) => {
                            if tx.send(request).await.is_err() {
                                break;
                            }
                        }
                        Err(e) => warn!("Ignoring malformed invocation: {}", e),
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    error!("MQTT connection error: {}", e);
                    tokio::time::sleep(Duration::from_secs(5)).await;
                }
            }
        }
    });

    while let Some(request) = rx.recv().await {
        debug!("Invocation {} for agent {}", request.message_type, request.agent_id);
        let outcome = runner.invoke(&request.agent_id, request.message_type).await;
        if let Err(e) = &outcome {
            error!("{:#}", e);
        }

        let result = InvokeResult::from_outcome(&request, &outcome);
        let payload = serde_json::to_string(&result).context("Failed to serialize invocation result")?;
        if let Err(e) = client
            .publish(&conf.result_topic, QoS::AtLeastOnce, false, payload)
            .await
        {
            warn!("Failed to publish invocation result: {}", e);
        }
    }

    Ok(())
}
