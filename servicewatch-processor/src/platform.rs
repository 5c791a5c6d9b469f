//! HTTP adapter for the channel platform.
//!
//! Endpoints, relative to `api_endpoint`:
//! - `POST /channels/{agent}/{channel}/messages` publish a JSON document
//! - `GET  /channels/{agent}/{channel}` -> `{"aggregate": {"payload": ...}}`
//! - `GET  /channels/{agent}/{channel}/messages?after=<s>&before=<s>`
//!   -> `{"messages": [{"timestamp": <epoch s>, "payload": ...}]}`
//!
//! Payloads published as JSON strings come back decoded.

use crate::channels::{ChannelError, ChannelMessage, ChannelStore};
use chrono::{DateTime, Utc};
use reqwest::{RequestBuilder, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

#[derive(Clone)]
pub struct PlatformChannelStore {
    client: reqwest::Client,
    api_endpoint: String,
    access_token: Option<String>,
    agent_id: String,
}

#[derive(Debug, Deserialize)]
struct AggregateResponse {
    aggregate: Option<AggregateBody>,
}

#[derive(Debug, Deserialize)]
struct AggregateBody {
    payload: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    messages: Vec<WireMessage>,
}

#[derive(Debug, Deserialize)]
struct WireMessage {
    timestamp: f64,
    payload: Value,
}

impl PlatformChannelStore {
    pub fn new(
        client: reqwest::Client,
        api_endpoint: impl Into<String>,
        access_token: Option<String>,
        agent_id: impl Into<String>,
    ) -> Self {
        Self {
            client,
            api_endpoint: api_endpoint.into(),
            access_token,
            agent_id: agent_id.into(),
        }
    }

    fn channel_url(&self, channel: &str) -> String {
        format!(
            "{}/channels/{}/{}",
            self.api_endpoint.trim_end_matches('/'),
            self.agent_id,
            channel
        )
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.access_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

impl ChannelStore for PlatformChannelStore {
    async fn publish(&self, channel: &str, document: &Value) -> Result<(), ChannelError> {
        let url = format!("{}/messages", self.channel_url(channel));
        let response = self.authorize(self.client.post(&url)).json(document).send().await?;
        if !response.status().is_success() {
            return Err(status_error(channel, response.status()));
        }
        debug!("published to {}", channel);
        Ok(())
    }

    async fn get_aggregate(&self, channel: &str) -> Result<Option<Value>, ChannelError> {
        let response = self.authorize(self.client.get(self.channel_url(channel))).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(status_error(channel, response.status()));
        }

        let body: AggregateResponse = response.json().await?;
        Ok(body.aggregate.and_then(|a| a.payload).map(decode_payload))
    }

    async fn get_messages_in_window(
        &self,
        channel: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<ChannelMessage>, ChannelError> {
        let url = format!("{}/messages", self.channel_url(channel));
        let response = self
            .authorize(self.client.get(&url))
            .query(&[("after", epoch_seconds(start)), ("before", epoch_seconds(end))])
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(status_error(channel, response.status()));
        }

        let body: MessagesResponse = response.json().await?;
        body.messages
            .into_iter()
            .map(|m| {
                let timestamp = from_epoch_seconds(m.timestamp).ok_or_else(|| ChannelError::Decode {
                    channel: channel.to_string(),
                    reason: format!("timestamp {} out of range", m.timestamp),
                })?;
                Ok(ChannelMessage {
                    timestamp,
                    payload: decode_payload(m.payload),
                })
            })
            .collect()
    }
}

fn status_error(channel: &str, status: StatusCode) -> ChannelError {
    ChannelError::Status {
        channel: channel.to_string(),
        status: status.as_u16(),
    }
}

fn decode_payload(payload: Value) -> Value {
    match payload {
        Value::String(raw) => serde_json::from_str(&raw).unwrap_or(Value::String(raw)),
        other => other,
    }
}

fn epoch_seconds(ts: DateTime<Utc>) -> String {
    format!("{:.3}", ts.timestamp_millis() as f64 / 1000.0)
}

fn from_epoch_seconds(secs: f64) -> Option<DateTime<Utc>> {
    if !secs.is_finite() {
        return None;
    }
    let millis = (secs * 1000.0).round() as i64;
    DateTime::from_timestamp(millis.div_euclid(1000), (millis.rem_euclid(1000) * 1_000_000) as u32)
}
