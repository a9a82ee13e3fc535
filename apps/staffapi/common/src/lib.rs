pub mod cache;
pub mod helix;
pub mod room;
pub mod routes;
pub mod staff;
pub mod tmi;
pub mod users;

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Chat role buckets reported by the chatter list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Broadcaster,
    Vip,
    Moderator,
    Staff,
    Viewer,
}

impl Role {
    pub const ALL: [Role; 5] = [
        Role::Broadcaster,
        Role::Vip,
        Role::Moderator,
        Role::Staff,
        Role::Viewer,
    ];
}

/// Usernames in a room, partitioned by role
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chatters {
    #[serde(default)]
    pub broadcaster: Vec<String>,
    #[serde(default)]
    pub vips: Vec<String>,
    #[serde(default)]
    pub moderators: Vec<String>,
    #[serde(default)]
    pub staff: Vec<String>,
    #[serde(default)]
    pub viewers: Vec<String>,
}

impl Chatters {
    pub fn get(&self, role: Role) -> &[String] {
        match role {
            Role::Broadcaster => &self.broadcaster,
            Role::Vip => &self.vips,
            Role::Moderator => &self.moderators,
            Role::Staff => &self.staff,
            Role::Viewer => &self.viewers,
        }
    }

    pub fn total(&self) -> usize {
        Role::ALL.iter().map(|role| self.get(*role).len()).sum()
    }
}

/// Room occupancy as last seen by the chatter source, cached under `room:<channel>`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatRoomSnapshot {
    pub channel: String,
    pub chatter_count: usize,
    pub chatters: Chatters,
}

/// Account metadata for a single login, cached under `user:<login>`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountRecord {
    pub login: String,
    pub id: String,
    #[serde(rename = "type")]
    pub account_type: String,
}

impl AccountRecord {
    /// Staff and admin accounts, matched exactly as reported upstream
    pub fn is_staff(&self) -> bool {
        matches!(self.account_type.as_str(), "staff" | "admin")
    }
}

/// Result of a staff lookup for one room
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StaffReport {
    pub channel: String,
    pub staff: Vec<String>,
    pub chatter_count: usize,
}

/// Custom error types
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Invalid channel name: {0:?}")]
    InvalidChannelName(String),

    #[error("Cache unavailable: {0}")]
    CacheUnavailable(String),

    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("Malformed upstream response: {0}")]
    MalformedUpstreamResponse(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    IO(#[from] std::io::Error),
}

impl From<redis::RedisError> for ServiceError {
    fn from(e: redis::RedisError) -> Self {
        ServiceError::CacheUnavailable(e.to_string())
    }
}

/// Redis keys and prefixes
pub struct RedisKeys;

impl RedisKeys {
    pub const ROOM_PREFIX: &'static str = "room:";
    pub const USER_PREFIX: &'static str = "user:";

    pub fn room_key(channel: &str) -> String {
        format!("{}{}", Self::ROOM_PREFIX, channel)
    }

    pub fn user_key(login: &str) -> String {
        format!("{}{}", Self::USER_PREFIX, login)
    }
}

/// Lifetimes of cached entries
pub struct CacheTtl;

impl CacheTtl {
    pub const ROOM: Duration = Duration::from_secs(120);
    pub const USER: Duration = Duration::from_secs(3 * 24 * 60 * 60);
}

/// Upstream user lookups are batched by this many logins
pub const USER_CHUNK_SIZE: usize = 100;

/// Ceiling on simultaneous user-source requests per resolver
pub const MAX_IN_FLIGHT_REQUESTS: usize = 10;

/// Utility functions
pub mod utils {
    use super::ServiceError;
    use regex::Regex;
    use std::sync::LazyLock;

    static CHANNEL_REGEX: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"^[a-z0-9](?-u:\w){0,24}$").expect("valid channel regex"));

    pub fn normalize_login(login: &str) -> String {
        login.to_lowercase()
    }

    /// Lowercases `raw` and checks it against the channel name pattern.
    pub fn normalize_channel(raw: &str) -> Result<String, ServiceError> {
        let channel = raw.to_lowercase();
        if CHANNEL_REGEX.is_match(&channel) {
            Ok(channel)
        } else {
            Err(ServiceError::InvalidChannelName(raw.to_string()))
        }
    }

    /// Splits `items` into consecutive chunks of at most `chunk_size` elements.
    pub fn chunk_logins(items: &[String], chunk_size: usize) -> Vec<&[String]> {
        items.chunks(chunk_size.max(1)).collect()
    }
}

pub mod config {
    use config::{Config, ConfigError, Environment};
    use dotenv::dotenv;
    use serde::Deserialize;
    use std::time::Duration;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum CacheBackend {
        Redis,
        Memory,
    }

    #[derive(Debug, Clone, Deserialize)]
    pub struct ServiceConfig {
        pub helix_client_id: String,
        pub helix_token: String,
        pub redis_url: String,
        pub bind_address: String,
        pub tmi_url: String,
        pub helix_url: String,
        pub http_timeout_secs: u64,
        pub request_timeout_secs: u64,
        pub cache_backend: String,
    }

    impl ServiceConfig {
        pub fn new() -> Result<Self, ConfigError> {
            // Load environment variables from .env file
            dotenv().ok();

            let mut s = Config::new();
            s.set_default("redis_url", "redis://localhost:6379/3")?;
            s.set_default("bind_address", "0.0.0.0:2559")?;
            s.set_default("tmi_url", "https://tmi.twitch.tv")?;
            s.set_default("helix_url", "https://api.twitch.tv/helix")?;
            s.set_default("http_timeout_secs", 10_i64)?;
            // Room fetch plus several waves of user chunks
            s.set_default("request_timeout_secs", 60_i64)?;
            s.set_default("cache_backend", "redis")?;

            // Eg.. `APP_HELIX_TOKEN=abc` sets the `helix_token` key
            s.merge(Environment::with_prefix("APP"))?;

            let settings: ServiceConfig = s.try_into()?;
            settings.validate()?;
            Ok(settings)
        }

        pub fn validate(&self) -> Result<(), ConfigError> {
            if self.helix_client_id.trim().is_empty() || self.helix_token.trim().is_empty() {
                return Err(ConfigError::Message(
                    "Both APP_HELIX_CLIENT_ID and APP_HELIX_TOKEN have to be set".to_string(),
                ));
            }
            if self.request_timeout_secs <= self.http_timeout_secs {
                return Err(ConfigError::Message(format!(
                    "APP_REQUEST_TIMEOUT_SECS ({}) has to be larger than APP_HTTP_TIMEOUT_SECS ({})",
                    self.request_timeout_secs, self.http_timeout_secs
                )));
            }
            self.backend()?;
            Ok(())
        }

        pub fn backend(&self) -> Result<CacheBackend, ConfigError> {
            match self.cache_backend.trim().to_lowercase().as_str() {
                "redis" => Ok(CacheBackend::Redis),
                "memory" => Ok(CacheBackend::Memory),
                other => Err(ConfigError::Message(format!(
                    "Unknown cache backend {:?}, expected \"redis\" or \"memory\"",
                    other
                ))),
            }
        }

        pub fn http_timeout(&self) -> Duration {
            Duration::from_secs(self.http_timeout_secs)
        }

        /// Deadline for a whole `/staff` lookup
        pub fn request_timeout(&self) -> Duration {
            Duration::from_secs(self.request_timeout_secs)
        }
    }
}
