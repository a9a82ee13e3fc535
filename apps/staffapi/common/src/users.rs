use crate::cache::KvCache;
use crate::helix::UserSource;
use crate::utils::{chunk_logins, normalize_login};
use crate::{
    AccountRecord, CacheTtl, MAX_IN_FLIGHT_REQUESTS, RedisKeys, ServiceError, USER_CHUNK_SIZE,
};
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

/// Logins quoted in the "no data" warning
const LOGGED_SAMPLE: usize = 5;

/// Cache-aside wrapper around the user source.
///
/// Cache misses are fetched upstream in chunks of `chunk_size` logins, with at most
/// `max_in_flight` chunk requests running at once. The limit is owned by the resolver,
/// so separate resolvers never share slots.
#[derive(Clone)]
pub struct UserResolver {
    cache: Arc<dyn KvCache>,
    source: Arc<dyn UserSource>,
    slots: Arc<Semaphore>,
    chunk_size: usize,
    ttl: Duration,
}

impl UserResolver {
    pub fn new(cache: Arc<dyn KvCache>, source: Arc<dyn UserSource>) -> Self {
        Self::with_limits(cache, source, USER_CHUNK_SIZE, MAX_IN_FLIGHT_REQUESTS)
    }

    pub fn with_limits(
        cache: Arc<dyn KvCache>,
        source: Arc<dyn UserSource>,
        chunk_size: usize,
        max_in_flight: usize,
    ) -> Self {
        Self {
            cache,
            source,
            slots: Arc::new(Semaphore::new(max_in_flight.max(1))),
            chunk_size: chunk_size.max(1),
            ttl: CacheTtl::USER,
        }
    }

    /// Resolves account records for `logins`.
    ///
    /// Cached records come first, then freshly fetched ones, each in input order.
    /// Logins without an account are left out. Only the initial cache read can fail
    /// the call; a failed upstream chunk contributes no records.
    pub async fn resolve(&self, logins: &[String]) -> Result<Vec<AccountRecord>, ServiceError> {
        if logins.is_empty() {
            return Ok(Vec::new());
        }

        let logins: Vec<String> = logins.iter().map(|login| normalize_login(login)).collect();
        let keys: Vec<String> = logins.iter().map(|login| RedisKeys::user_key(login)).collect();

        let cached = self.cache.mget(&keys).await?;

        let mut users = Vec::with_capacity(logins.len());
        let mut missing = Vec::new();

        // Both logins and cached share the same indices
        for (login, value) in logins.into_iter().zip(cached) {
            let Some(raw) = value else {
                missing.push(login);
                continue;
            };

            match serde_json::from_str::<AccountRecord>(&raw) {
                Ok(user) => users.push(user),
                Err(e) => {
                    warn!("Discarding unreadable cache entry user:{}: {}", login, e);
                    missing.push(login);
                }
            }
        }

        debug!(
            "{} users cached, {} to fetch",
            users.len(),
            missing.len()
        );

        if !missing.is_empty() {
            let fetched = self.fetch_missing(&missing).await;

            if fetched.is_empty() {
                warn!(
                    "Helix didn't return any data for {} users, starting with {:?}",
                    missing.len(),
                    &missing[..missing.len().min(LOGGED_SAMPLE)]
                );
            } else {
                users.extend(fetched);
            }
        }

        Ok(users)
    }

    /// Fans the missing logins out in chunks and waits for every chunk to settle.
    async fn fetch_missing(&self, missing: &[String]) -> Vec<AccountRecord> {
        let chunks = chunk_logins(missing, self.chunk_size);
        let total = chunks.len();

        let results = join_all(
            chunks
                .into_iter()
                .enumerate()
                .map(|(i, chunk)| self.fetch_chunk(i, total, chunk)),
        )
        .await;

        let mut users = Vec::new();
        for (i, result) in results.into_iter().enumerate() {
            match result {
                Ok(fetched) => users.extend(fetched),
                Err(e) => warn!("[Fetch] Helix req {}/{} failed: {}", i + 1, total, e),
            }
        }
        users
    }

    /// Fetches one chunk and caches its records before giving the slot back, so
    /// finished chunks stay cached even if the surrounding resolve is dropped.
    async fn fetch_chunk(
        &self,
        i: usize,
        total: usize,
        chunk: &[String],
    ) -> Result<Vec<AccountRecord>, ServiceError> {
        let _permit = self.slots.acquire().await.map_err(|_| {
            ServiceError::UpstreamUnavailable("Helix request slots closed".to_string())
        })?;

        info!("[Fetch] Helix req {}/{}; {} users", i + 1, total, chunk.len());
        let users = self.source.fetch_users(chunk).await?;

        if let Err(e) = self.store(&users).await {
            warn!(
                "Error caching {} users from Helix req {}/{}: {}",
                users.len(),
                i + 1,
                total,
                e
            );
        }

        Ok(users)
    }

    async fn store(&self, users: &[AccountRecord]) -> Result<(), ServiceError> {
        if users.is_empty() {
            return Ok(());
        }

        let mut entries = Vec::with_capacity(users.len());
        for user in users {
            let key = RedisKeys::user_key(&normalize_login(&user.login));
            entries.push((key, serde_json::to_string(user)?));
        }

        self.cache.set_many(&entries, self.ttl).await
    }
}
