use crate::{AccountRecord, ServiceError};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;

/// Source of account metadata, one request per batch of logins
#[async_trait]
pub trait UserSource: Send + Sync {
    /// Logins without an account are simply absent from the result.
    async fn fetch_users(&self, logins: &[String]) -> Result<Vec<AccountRecord>, ServiceError>;
}

#[derive(Debug, Deserialize)]
struct HelixUser {
    id: String,
    login: String,
    #[serde(rename = "type", default)]
    user_type: String,
}

#[derive(Debug, Deserialize)]
struct GetUsersResponse {
    data: Vec<HelixUser>,
}

#[derive(Clone)]
pub struct HelixClient {
    client: Client,
    base_url: String,
    client_id: String,
    token: String,
}

impl HelixClient {
    pub fn new(
        base_url: String,
        client_id: String,
        token: String,
        timeout: Duration,
    ) -> Result<Self, ServiceError> {
        let client = Client::builder().timeout(timeout).build().map_err(|e| {
            ServiceError::UpstreamUnavailable(format!("Failed to create HTTP client: {}", e))
        })?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            client_id,
            token,
        })
    }
}

#[async_trait]
impl UserSource for HelixClient {
    async fn fetch_users(&self, logins: &[String]) -> Result<Vec<AccountRecord>, ServiceError> {
        if logins.is_empty() {
            return Ok(Vec::new());
        }

        let query: Vec<(&str, &str)> = logins.iter().map(|login| ("login", login.as_str())).collect();

        let response = self
            .client
            .get(format!("{}/users", self.base_url))
            .query(&query)
            .header("Client-ID", &self.client_id)
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| ServiceError::UpstreamUnavailable(format!("Helix request failed: {}", e)))?;

        if response.status() != StatusCode::OK {
            return Err(ServiceError::UpstreamUnavailable(format!(
                "Helix responded with status {}",
                response.status().as_u16()
            )));
        }

        let body = response.text().await.map_err(|e| {
            ServiceError::UpstreamUnavailable(format!("Failed to read Helix response: {}", e))
        })?;

        let users = serde_json::from_str::<GetUsersResponse>(&body).map_err(|e| {
            ServiceError::MalformedUpstreamResponse(format!(
                "Failed to parse Helix response: {} for body: {}",
                e, body
            ))
        })?;

        Ok(users
            .data
            .into_iter()
            .map(|user| AccountRecord {
                login: user.login,
                id: user.id,
                account_type: user.user_type,
            })
            .collect())
    }
}
