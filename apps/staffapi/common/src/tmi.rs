use crate::{ChatRoomSnapshot, Chatters, ServiceError};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tracing::info;

/// Source of the current chatter list for a room
#[async_trait]
pub trait ChatterSource: Send + Sync {
    async fn fetch_room(&self, channel: &str) -> Result<ChatRoomSnapshot, ServiceError>;
}

#[derive(Debug, Deserialize)]
struct TmiResponse {
    #[serde(default)]
    chatter_count: Option<usize>,
    chatters: Chatters,
}

#[derive(Clone)]
pub struct TmiClient {
    client: Client,
    base_url: String,
}

impl TmiClient {
    pub fn new(base_url: String, timeout: Duration) -> Result<Self, ServiceError> {
        let client = Client::builder().timeout(timeout).build().map_err(|e| {
            ServiceError::UpstreamUnavailable(format!("Failed to create HTTP client: {}", e))
        })?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl ChatterSource for TmiClient {
    async fn fetch_room(&self, channel: &str) -> Result<ChatRoomSnapshot, ServiceError> {
        let url = format!("{}/group/user/{}/chatters", self.base_url, channel);

        info!("[Fetch] TMI chatters in #{}", channel);
        let response = self.client.get(&url).send().await.map_err(|e| {
            ServiceError::UpstreamUnavailable(format!("TMI request failed: {}", e))
        })?;

        if response.status() != StatusCode::OK {
            return Err(ServiceError::UpstreamUnavailable(format!(
                "TMI responded with status {}",
                response.status().as_u16()
            )));
        }

        let body = response.text().await.map_err(|e| {
            ServiceError::UpstreamUnavailable(format!("Failed to read TMI response: {}", e))
        })?;

        let tmi_response = serde_json::from_str::<TmiResponse>(&body).map_err(|e| {
            ServiceError::MalformedUpstreamResponse(format!(
                "Failed to parse TMI response: {} for body: {}",
                e, body
            ))
        })?;

        let chatter_count = tmi_response
            .chatter_count
            .unwrap_or_else(|| tmi_response.chatters.total());

        Ok(ChatRoomSnapshot {
            channel: channel.to_string(),
            chatter_count,
            chatters: tmi_response.chatters,
        })
    }
}
