use crate::cache::KvCache;
use crate::tmi::ChatterSource;
use crate::{CacheTtl, ChatRoomSnapshot, RedisKeys, ServiceError};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Cache-aside wrapper around the chatter source
#[derive(Clone)]
pub struct RoomResolver {
    cache: Arc<dyn KvCache>,
    source: Arc<dyn ChatterSource>,
    ttl: Duration,
}

impl RoomResolver {
    pub fn new(cache: Arc<dyn KvCache>, source: Arc<dyn ChatterSource>) -> Self {
        Self {
            cache,
            source,
            ttl: CacheTtl::ROOM,
        }
    }

    /// Returns the cached snapshot for `channel`, fetching and caching it on a miss.
    ///
    /// A cache read error fails the call. An entry that no longer deserializes is
    /// treated as a miss. Failing to write the fresh snapshot back is only logged.
    pub async fn resolve(&self, channel: &str) -> Result<ChatRoomSnapshot, ServiceError> {
        let key = RedisKeys::room_key(channel);

        if let Some(raw) = self.cache.get(&key).await? {
            match serde_json::from_str::<ChatRoomSnapshot>(&raw) {
                Ok(room) => {
                    debug!("Cache hit for {}", key);
                    return Ok(room);
                }
                Err(e) => warn!("Discarding unreadable cache entry {}: {}", key, e),
            }
        }

        let room = self.source.fetch_room(channel).await?;

        if let Err(e) = self.store(&key, &room).await {
            warn!("Error setting {:?}: {}", key, e);
        }

        Ok(room)
    }

    async fn store(&self, key: &str, room: &ChatRoomSnapshot) -> Result<(), ServiceError> {
        let encoded = serde_json::to_string(room)?;
        self.cache.set(key, &encoded, self.ttl).await
    }
}
