//! TTL cache store over Redis, with an in-process fallback.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use deadpool_redis::redis::AsyncCommands;
use deadpool_redis::{Pool, PoolConfig, Runtime};
use serde_json::Value;

use crate::key::CacheKey;

/// Errors surfaced by the cache store.
///
/// Only reads report errors to callers; writes are fire-and-forget and log
/// their failures instead.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("failed to create redis pool: {0}")]
    CreatePool(#[from] deadpool_redis::CreatePoolError),

    #[error("redis connection unavailable: {0}")]
    Pool(#[from] deadpool_redis::PoolError),

    #[error("redis command failed: {0}")]
    Redis(#[from] deadpool_redis::redis::RedisError),
}

/// Connection settings for the Redis-backed store.
#[derive(Debug, Clone)]
pub struct RedisOptions {
    pub url: String,
    pub pool_size: usize,
    pub timeout: Duration,
}

/// A locally cached value with its expiry.
#[derive(Clone, Debug)]
pub struct CachedEntry {
    pub value: Arc<Value>,
    pub cached_at: Instant,
    pub ttl: Duration,
}

impl CachedEntry {
    pub fn new(value: Value, ttl: Duration) -> Self {
        Self {
            value: Arc::new(value),
            cached_at: Instant::now(),
            ttl,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.cached_at.elapsed() >= self.ttl
    }
}

/// Get/set-with-TTL store for JSON values.
///
/// ## Modes
///
/// - **Local**: per-process DashMap; entries expire after the store TTL.
/// - **Redis**: shared across workers; values are stored as JSON text with
///   `SET key value EX ttl`, expiry is left to Redis.
///
/// The TTL is fixed when the store is built and applies to every entry.
#[derive(Clone)]
pub enum CacheStore {
    Local {
        entries: Arc<DashMap<String, CachedEntry>>,
        ttl: Duration,
    },
    Redis {
        pool: Pool,
        ttl: Duration,
    },
}

impl CacheStore {
    /// Create an in-process store.
    pub fn new_local(ttl: Duration) -> Self {
        CacheStore::Local {
            entries: Arc::new(DashMap::new()),
            ttl,
        }
    }

    /// Create a store over an existing Redis pool.
    pub fn new_redis(pool: Pool, ttl: Duration) -> Self {
        CacheStore::Redis { pool, ttl }
    }

    /// Build a Redis pool and check that a connection can be established.
    ///
    /// `options.timeout` bounds waiting for, creating and recycling pool
    /// connections, so an unresponsive server fails here instead of hanging.
    pub async fn connect_redis(options: &RedisOptions, ttl: Duration) -> Result<Self, CacheError> {
        let mut config = deadpool_redis::Config::from_url(&options.url);
        // `from_url` leaves `pool` unset.
        let mut pool_config = PoolConfig::new(options.pool_size);
        pool_config.timeouts.wait = Some(options.timeout);
        pool_config.timeouts.create = Some(options.timeout);
        pool_config.timeouts.recycle = Some(options.timeout);
        config.pool = Some(pool_config);
        let pool = config.create_pool(Some(Runtime::Tokio1))?;

        // Fail fast: a worker without its store must not report ready.
        drop(pool.get().await?);

        tracing::info!(url = %options.url, ttl_secs = ttl.as_secs(), "connected to redis");
        Ok(CacheStore::new_redis(pool, ttl))
    }

    /// Look up a key.
    ///
    /// Returns `Ok(None)` on a miss or an expired entry. A stored value that
    /// no longer parses as JSON is logged and reported as a miss; the next
    /// `set` for the key overwrites it.
    pub async fn get(&self, key: &CacheKey) -> Result<Option<Value>, CacheError> {
        match self {
            CacheStore::Local { entries, .. } => {
                let hit = match entries.get(key.as_str()) {
                    Some(entry) if !entry.is_expired() => Some(Value::clone(&entry.value)),
                    Some(entry) => {
                        drop(entry);
                        entries.remove(key.as_str());
                        None
                    }
                    None => None,
                };
                tracing::debug!(cache.key = %key, hit = hit.is_some(), "cache lookup (local)");
                Ok(hit)
            }
            CacheStore::Redis { pool, .. } => {
                let mut conn = pool.get().await?;
                let raw: Option<String> = conn.get(key.as_str()).await?;
                let Some(text) = raw else {
                    tracing::debug!(cache.key = %key, "cache miss");
                    return Ok(None);
                };

                match serde_json::from_str(&text) {
                    Ok(value) => {
                        tracing::debug!(cache.key = %key, "cache hit");
                        Ok(Some(value))
                    }
                    Err(e) => {
                        tracing::warn!(cache.key = %key, error = %e, "discarding unreadable cache entry");
                        Ok(None)
                    }
                }
            }
        }
    }

    /// Store a value under a key with the store TTL.
    ///
    /// Redis writes run on a background task; the caller never waits for
    /// them and their failures are only logged.
    pub async fn set(&self, key: &CacheKey, value: &Value) {
        match self {
            CacheStore::Local { entries, ttl } => {
                entries.insert(key.to_string(), CachedEntry::new(value.clone(), *ttl));
            }
            CacheStore::Redis { pool, ttl } => {
                let text = match serde_json::to_string(value) {
                    Ok(text) => text,
                    Err(e) => {
                        tracing::warn!(cache.key = %key, error = %e, "cache value not serializable");
                        return;
                    }
                };

                let pool = pool.clone();
                let key = key.to_string();
                let ttl_secs = ttl.as_secs().max(1);
                tokio::spawn(async move {
                    match pool.get().await {
                        Ok(mut conn) => {
                            if let Err(e) = conn.set_ex::<_, _, ()>(&key, text, ttl_secs).await {
                                tracing::warn!(cache.key = %key, error = %e, "redis SET error");
                            } else {
                                tracing::debug!(cache.key = %key, ttl_secs, "cache set");
                            }
                        }
                        Err(e) => {
                            tracing::warn!(cache.key = %key, error = %e, "redis connection unavailable for SET");
                        }
                    }
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::RequestDescriptor;
    use serde_json::{Map, json};

    fn key(path: &str) -> CacheKey {
        CacheKey::derive(&RequestDescriptor::new(path, "GET", Map::new(), json!({}))).unwrap()
    }

    #[tokio::test]
    async fn test_local_round_trip() {
        let store = CacheStore::new_local(Duration::from_secs(60));
        let value = json!({"lat": 48.8, "lon": 2.3, "tags": ["a", "b"]});

        store.set(&key("/a"), &value).await;

        assert_eq!(store.get(&key("/a")).await.unwrap(), Some(value));
        assert_eq!(store.get(&key("/b")).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_local_expiration() {
        let store = CacheStore::new_local(Duration::from_millis(50));
        store.set(&key("/expiring"), &json!(["Europe/Paris"])).await;

        assert!(store.get(&key("/expiring")).await.unwrap().is_some());

        tokio::time::sleep(Duration::from_millis(80)).await;

        assert_eq!(store.get(&key("/expiring")).await.unwrap(), None);
        let CacheStore::Local { entries, .. } = &store else {
            unreachable!()
        };
        assert!(entries.is_empty());
    }

    #[tokio::test]
    async fn test_local_overwrite_refreshes_value() {
        let store = CacheStore::new_local(Duration::from_secs(60));
        store.set(&key("/k"), &json!({"v": 1})).await;
        store.set(&key("/k"), &json!({"v": 2})).await;

        assert_eq!(store.get(&key("/k")).await.unwrap(), Some(json!({"v": 2})));
    }

    #[test]
    fn test_entry_expiry() {
        let entry = CachedEntry::new(json!({}), Duration::ZERO);
        assert!(entry.is_expired());

        let entry = CachedEntry::new(json!({}), Duration::from_secs(60));
        assert!(!entry.is_expired());
    }

    #[tokio::test]
    async fn test_connect_redis_times_out_on_silent_server() {
        // Accepts connections and never answers.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let silent = tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let options = RedisOptions {
            url: format!("redis://{addr}/0"),
            pool_size: 1,
            timeout: Duration::from_millis(200),
        };
        let started = Instant::now();
        let outcome = tokio::time::timeout(
            Duration::from_secs(3),
            CacheStore::connect_redis(&options, Duration::from_secs(60)),
        )
        .await
        .expect("connect_redis must give up on its own");

        assert!(matches!(outcome, Err(CacheError::Pool(_))));
        assert!(started.elapsed() < Duration::from_secs(2));
        silent.abort();
    }
}
