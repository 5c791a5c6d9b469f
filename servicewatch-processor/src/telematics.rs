//! Telematics provider client (ISO 15143-3 snapshot API)
//!
//! Flow:
//! - Client-credentials token exchange (HTTP Basic, form encoded)
//! - `GET {equipment_endpoint}/{make}/{model}/{serial}` with the bearer token
//! - First entry of the `Equipment` array is the asset's snapshot
//!
//! No retries: a failed call fails the invocation.

use crate::config::TelematicsConf;
use crate::snapshot::EquipmentIdentity;
use reqwest::header::ACCEPT;
use serde::Deserialize;
use serde_json::Value;
use std::future::Future;
use tokio::sync::OnceCell;
use tracing::{debug, info};

const SNAPSHOT_MEDIA_TYPE: &str = "application/iso15143-snapshot+json";

#[derive(Debug, thiserror::Error)]
pub enum TelematicsError {
    #[error("telematics credentials are not configured")]
    NotConfigured,
    #[error("telematics transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("token exchange answered HTTP {0}")]
    TokenStatus(u16),
    #[error("token response carried no access_token")]
    MissingToken,
    #[error("equipment request answered HTTP {0}")]
    Status(u16),
}

/// Source of fresh equipment snapshots.
pub trait TelematicsSource {
    fn equipment_snapshot(
        &self,
        identity: &EquipmentIdentity,
    ) -> impl Future<Output = Result<Option<Value>, TelematicsError>> + Send;
}

/// Stand-in used when no provider credentials are configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoTelematics;

impl TelematicsSource for NoTelematics {
    async fn equipment_snapshot(&self, _identity: &EquipmentIdentity) -> Result<Option<Value>, TelematicsError> {
        Err(TelematicsError::NotConfigured)
    }
}

#[derive(Clone)]
pub struct ClientCredentials {
    pub client_id: String,
    pub client_secret: String,
}

impl std::fmt::Debug for ClientCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"***")
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EquipmentResponse {
    #[serde(rename = "Equipment", default)]
    equipment: Vec<Value>,
}

pub struct IsoTelematicsClient {
    client: reqwest::Client,
    settings: TelematicsConf,
    credentials: ClientCredentials,
    token: OnceCell<String>,
}

impl IsoTelematicsClient {
    pub fn new(client: reqwest::Client, settings: TelematicsConf, credentials: ClientCredentials) -> Self {
        Self {
            client,
            settings,
            credentials,
            token: OnceCell::new(),
        }
    }

    /// Client-credentials exchange. The token is kept for the client's lifetime.
    async fn bearer_token(&self) -> Result<&str, TelematicsError> {
        let token = self
            .token
            .get_or_try_init(|| async {
                debug!("requesting telematics token from {}", self.settings.token_endpoint);
                let response = self
                    .client
                    .post(&self.settings.token_endpoint)
                    .basic_auth(&self.credentials.client_id, Some(&self.credentials.client_secret))
                    .form(&[("grant_type", "client_credentials"), ("scope", self.settings.scope.as_str())])
                    .send()
                    .await?;

                if !response.status().is_success() {
                    return Err(TelematicsError::TokenStatus(response.status().as_u16()));
                }

                let body: TokenResponse = response.json().await?;
                body.access_token.ok_or(TelematicsError::MissingToken)
            })
            .await?;
        Ok(token.as_str())
    }

    fn equipment_url(&self, identity: &EquipmentIdentity) -> String {
        format!(
            "{}/{}/{}/{}",
            self.settings.equipment_endpoint.trim_end_matches('/'),
            identity.make,
            identity.model,
            identity.serial_number
        )
    }
}

impl TelematicsSource for IsoTelematicsClient {
    async fn equipment_snapshot(&self, identity: &EquipmentIdentity) -> Result<Option<Value>, TelematicsError> {
        let token = self.bearer_token().await?;
        let response = self
            .client
            .get(self.equipment_url(identity))
            .bearer_auth(token)
            .header(ACCEPT, SNAPSHOT_MEDIA_TYPE)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(TelematicsError::Status(response.status().as_u16()));
        }

        let body: EquipmentResponse = response.json().await?;
        info!(
            "telematics returned {} equipment entries for {}",
            body.equipment.len(),
            identity.serial_number
        );
        Ok(body.equipment.into_iter().next())
    }
}
