//! Redis distributed cache (L2).
//!
//! Plain string values with a millisecond expiry:
//! - `set`    → `SET key value PX ttl_ms`
//! - `get`    → pipelined `GET` + `PTTL`, so an L2 hit can seed L1 with
//!   the entry's real remaining lifetime
//! - patterns → cursor `SCAN MATCH`, then `DEL` in chunks
//!
//! All keys carry an optional prefix for namespacing a shared instance;
//! callers only ever see unprefixed keys.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{cmd, pipe, AsyncCommands, Client};

use super::traits::{BackendError, CachedValue, DistributedCache, HealthProbe};
use crate::resilience::retry::{retry, RetryConfig};

const SCAN_COUNT: usize = 200;
const DELETE_CHUNK: usize = 500;
const SLOW_PING: Duration = Duration::from_millis(100);

fn map_redis_error(err: redis::RedisError) -> BackendError {
    if err.is_timeout() {
        BackendError::Timeout(Duration::ZERO)
    } else if err.is_io_error() || err.is_connection_dropped() || err.is_connection_refusal() {
        BackendError::Connection(err.to_string())
    } else {
        BackendError::Query(err.to_string())
    }
}

/// Apply a prefix to a key (or pattern).
fn prefixed(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{prefix}{key}")
    }
}

/// Strip the prefix from a key returned by the server.
fn unprefixed<'a>(prefix: &str, key: &'a str) -> &'a str {
    if prefix.is_empty() {
        key
    } else {
        key.strip_prefix(prefix).unwrap_or(key)
    }
}

/// `PTTL` reply → remaining TTL (`-1` no expiry, `-2` missing).
fn ttl_from_pttl(pttl: i64) -> Option<Duration> {
    u64::try_from(pttl).ok().map(Duration::from_millis)
}

pub struct RedisCache {
    connection: ConnectionManager,
    prefix: String,
}

impl RedisCache {
    /// Connect without a key prefix.
    pub async fn connect(connection_string: &str) -> Result<Self, BackendError> {
        Self::with_prefix(connection_string, None).await
    }

    /// Connect with an optional key prefix.
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// # use catalog_search::storage::redis::RedisCache;
    /// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// // Keys will be prefixed: "catalog:search:…", "catalog:material:42"
    /// let cache = RedisCache::with_prefix("redis://localhost", Some("catalog:")).await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn with_prefix(
        connection_string: &str,
        prefix: Option<&str>,
    ) -> Result<Self, BackendError> {
        let client = Client::open(connection_string)
            .map_err(|e| BackendError::Connection(e.to_string()))?;

        let connection = retry("redis_connect", &RetryConfig::startup(), || async {
            ConnectionManager::new(client.clone()).await.map_err(map_redis_error)
        })
        .await?;

        Ok(Self { connection, prefix: prefix.unwrap_or("").to_string() })
    }

    /// Get the configured prefix
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    async fn scan_prefixed(&self, pattern: &str) -> Result<Vec<String>, BackendError> {
        let mut conn = self.connection.clone();
        let pattern = prefixed(&self.prefix, pattern);
        let mut cursor: u64 = 0;
        let mut keys = Vec::new();
        loop {
            let (next, batch): (u64, Vec<String>) = cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_COUNT)
                .query_async(&mut conn)
                .await
                .map_err(map_redis_error)?;
            keys.extend(batch);
            if next == 0 {
                break;
            }
            cursor = next;
        }
        keys.sort();
        keys.dedup();
        Ok(keys)
    }
}

#[async_trait]
impl DistributedCache for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<CachedValue>, BackendError> {
        let mut conn = self.connection.clone();
        let key = prefixed(&self.prefix, key);
        let (value, pttl): (Option<String>, i64) = pipe()
            .get(&key)
            .cmd("PTTL")
            .arg(&key)
            .query_async(&mut conn)
            .await
            .map_err(map_redis_error)?;
        Ok(value.map(|value| CachedValue { value, ttl_remaining: ttl_from_pttl(pttl) }))
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), BackendError> {
        let mut conn = self.connection.clone();
        let ttl_ms = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1);
        let _: () = cmd("SET")
            .arg(prefixed(&self.prefix, key))
            .arg(value)
            .arg("PX")
            .arg(ttl_ms)
            .query_async(&mut conn)
            .await
            .map_err(map_redis_error)?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), BackendError> {
        let mut conn = self.connection.clone();
        let _: () = conn.del(prefixed(&self.prefix, key)).await.map_err(map_redis_error)?;
        Ok(())
    }

    async fn scan_pattern(&self, pattern: &str) -> Result<Vec<String>, BackendError> {
        Ok(self
            .scan_prefixed(pattern)
            .await?
            .iter()
            .map(|k| unprefixed(&self.prefix, k).to_string())
            .collect())
    }

    async fn delete_pattern(&self, pattern: &str) -> Result<u64, BackendError> {
        let keys = self.scan_prefixed(pattern).await?;
        let mut conn = self.connection.clone();
        let mut deleted = 0u64;
        for chunk in keys.chunks(DELETE_CHUNK) {
            let n: u64 =
                cmd("DEL").arg(chunk).query_async(&mut conn).await.map_err(map_redis_error)?;
            deleted += n;
        }
        Ok(deleted)
    }

    async fn health_check(&self) -> Result<HealthProbe, BackendError> {
        let mut conn = self.connection.clone();
        let start = Instant::now();
        let reply: String = cmd("PING").query_async(&mut conn).await.map_err(map_redis_error)?;
        let elapsed = start.elapsed();
        if reply != "PONG" {
            return Err(BackendError::Query(format!("unexpected PING reply: {reply}")));
        }
        if elapsed > SLOW_PING {
            Ok(HealthProbe::degraded(format!("slow PING: {}ms", elapsed.as_millis())))
        } else {
            Ok(HealthProbe::healthy(format!("PING {}ms", elapsed.as_millis())))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_round_trip() {
        assert_eq!(prefixed("", "search:abc"), "search:abc");
        assert_eq!(prefixed("cat:", "search:*"), "cat:search:*");
        assert_eq!(unprefixed("cat:", "cat:material:1"), "material:1");
        assert_eq!(unprefixed("cat:", "other:material:1"), "other:material:1");
    }

    #[test]
    fn test_pttl_mapping() {
        assert_eq!(ttl_from_pttl(1500), Some(Duration::from_millis(1500)));
        assert_eq!(ttl_from_pttl(-1), None);
        assert_eq!(ttl_from_pttl(-2), None);
    }
}
