//! HTTP implementation of the progress gateway.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use url::Url;

use crate::config::GatewayConfig;
use crate::error::GatewayError;
use crate::progress::{ProgressSnapshot, SnapshotRecord};

use super::ProgressGateway;

/// REST client for the progress endpoints.
///
/// The transport contract is narrow: one endpoint returning the weekly
/// snapshot envelope, one returning a single habit record. Auth is an
/// opaque bearer token supplied by the host.
pub struct HttpProgressGateway {
    client: reqwest::Client,
    base_url: Url,
    user_id: String,
    auth_token: String,
    client_id: Option<String>,
}

impl HttpProgressGateway {
    /// Build a gateway from config. Fails if no auth token is configured
    /// or the endpoint URL is malformed.
    pub fn new(config: &GatewayConfig, timeout_secs: u64) -> Result<Self, GatewayError> {
        let auth_token = config.auth_token.clone().ok_or(GatewayError::Auth)?;
        let base_url =
            Url::parse(&config.base_url).map_err(|e| GatewayError::InvalidUrl(e.to_string()))?;
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url,
            user_id: config.user_id.clone(),
            auth_token,
            client_id: None,
        })
    }

    /// Attach a per-install client id sent as `X-Client-Id`.
    pub fn with_client_id(mut self, client_id: String) -> Self {
        self.client_id = Some(client_id);
        self
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, GatewayError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| GatewayError::InvalidUrl("cannot-be-a-base URL".into()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get_json(&self, url: Url) -> Result<serde_json::Value, GatewayError> {
        let mut request = self.client.get(url).bearer_auth(&self.auth_token);
        if let Some(ref client_id) = self.client_id {
            request = request.header("X-Client-Id", client_id);
        }

        let response = request.send().await?;
        let status = response.status();
        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(GatewayError::Auth);
        }
        if !status.is_success() {
            return Err(GatewayError::Status {
                status: status.as_u16(),
            });
        }
        Ok(response.json().await?)
    }
}

#[async_trait]
impl ProgressGateway for HttpProgressGateway {
    async fn fetch_snapshot(&self) -> Result<ProgressSnapshot, GatewayError> {
        let url = self.endpoint(&["v1", "users", &self.user_id, "progress", "weekly"])?;
        let body = self.get_json(url).await?;

        let items = body["habits"]
            .as_array()
            .ok_or_else(|| GatewayError::Decode("missing 'habits' array".into()))?;
        let records = items
            .iter()
            .map(parse_record)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ProgressSnapshot::new(records))
    }

    async fn fetch_habit(&self, habit_id: &str) -> Result<SnapshotRecord, GatewayError> {
        let url = self.endpoint(&["v1", "users", &self.user_id, "habits", habit_id, "progress"])?;
        let body = self.get_json(url).await?;
        parse_record(&body)
    }
}

/// Parse one progress record from the server's JSON shape.
pub fn parse_record(value: &serde_json::Value) -> Result<SnapshotRecord, GatewayError> {
    let habit_id = value["habit_id"]
        .as_str()
        .ok_or_else(|| GatewayError::Decode("missing habit_id".into()))?;

    let current_count = value["current_count"]
        .as_u64()
        .ok_or_else(|| GatewayError::Decode("missing current_count".into()))?;

    let target_count = value["target_count"]
        .as_u64()
        .filter(|&t| t > 0)
        .ok_or_else(|| GatewayError::Decode("missing or zero target_count".into()))?;

    let updated_str = value["updated_at"]
        .as_str()
        .ok_or_else(|| GatewayError::Decode("missing updated_at".into()))?;
    let updated_at: DateTime<Utc> = DateTime::parse_from_rfc3339(updated_str)
        .map_err(|e| GatewayError::Decode(format!("invalid updated_at: {}", e)))?
        .with_timezone(&Utc);

    Ok(SnapshotRecord {
        habit_id: habit_id.to_string(),
        current_count: current_count as u32,
        target_count: target_count as u32,
        updated_at,
    })
}
