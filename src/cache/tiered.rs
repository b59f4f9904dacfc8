// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Two-level cache: L1 in-process, L2 distributed.
//!
//! ```text
//! get(key)
//!   │
//!   ├─→ L1 hit ─────────────────────────────────────→ value
//!   │
//!   ├─→ replay deferred L2 deletes (failure → miss)
//!   │
//!   ├─→ L2 hit → populate L1 (min(L2 ttl, L1 max)) → value
//!   │
//!   └─→ miss (also: L2 error, L2 timeout, L2 unhealthy)
//! ```
//!
//! Nothing here returns an error. L2 failures are logged and mark the
//! cache backend unavailable in the shared health tracker; L2 reads and
//! writes are then bypassed until a health check clears it.
//!
//! Deletes are always attempted against L2, healthy or not. A delete
//! that fails is kept and replayed before L2 is used again, so a stale
//! entry never outlives the write that invalidated it.

use std::collections::BTreeSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use super::keys::key_family;
use super::l1::LocalCache;
use crate::metrics;
use crate::resilience::BackendHealthTracker;
use crate::storage::traits::{BackendError, BackendKind, DistributedCache};

/// Tier limits for [`TieredCache`].
#[derive(Debug, Clone)]
pub struct TierSettings {
    pub l1_max_ttl: Duration,
    pub l2_max_ttl: Duration,
    pub op_timeout: Duration,
    /// When false L2 is never consulted (vector-only mode, disabled cache)
    pub l2_enabled: bool,
}

/// An L2 delete that did not go through.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum DeferredDelete {
    Key(String),
    Pattern(String),
}

pub struct TieredCache {
    l1: Arc<LocalCache>,
    l2: Arc<dyn DistributedCache>,
    health: Arc<BackendHealthTracker>,
    settings: TierSettings,
    deferred: Mutex<BTreeSet<DeferredDelete>>,
}

impl TieredCache {
    pub fn new(
        l1: Arc<LocalCache>,
        l2: Arc<dyn DistributedCache>,
        health: Arc<BackendHealthTracker>,
        settings: TierSettings,
    ) -> Self {
        Self { l1, l2, health, settings, deferred: Mutex::new(BTreeSet::new()) }
    }

    #[must_use]
    pub fn l1(&self) -> &Arc<LocalCache> {
        &self.l1
    }

    #[must_use]
    pub fn l2(&self) -> &Arc<dyn DistributedCache> {
        &self.l2
    }

    /// Number of L2 deletes waiting for the cache backend to come back.
    #[must_use]
    pub fn deferred_deletes(&self) -> usize {
        self.deferred.lock().len()
    }

    /// L2 may serve reads and take writes: enabled, healthy, and no
    /// deferred delete left unapplied.
    async fn l2_ready(&self) -> bool {
        self.settings.l2_enabled
            && self.health.is_healthy(BackendKind::Cache)
            && self.replay_deferred().await
    }

    async fn replay_deferred(&self) -> bool {
        let deferred: Vec<DeferredDelete> = self.deferred.lock().iter().cloned().collect();
        if deferred.is_empty() {
            return true;
        }
        for entry in &deferred {
            if self.apply_delete(entry).await.is_none() {
                return false;
            }
            self.deferred.lock().remove(entry);
        }
        info!(replayed = deferred.len(), "Deferred L2 deletes applied");
        true
    }

    /// One L2 delete under the op timeout. `None` when it failed, in which
    /// case it is deferred.
    async fn apply_delete(&self, entry: &DeferredDelete) -> Option<u64> {
        let removed = match entry {
            DeferredDelete::Key(key) => self
                .l2_call("delete", key, self.l2.delete(key))
                .await
                .map(|()| 1),
            DeferredDelete::Pattern(pattern) => {
                self.l2_call("invalidate", pattern, self.l2.delete_pattern(pattern))
                    .await
            }
        };
        if removed.is_none() {
            self.deferred.lock().insert(entry.clone());
        }
        removed
    }

    /// Run one L2 call under the per-operation timeout. Failures are
    /// absorbed and recorded against the cache backend.
    async fn l2_call<T, Fut>(&self, operation: &'static str, key: &str, fut: Fut) -> Option<T>
    where
        Fut: Future<Output = Result<T, BackendError>>,
    {
        let err = match timeout(self.settings.op_timeout, fut).await {
            Ok(Ok(value)) => return Some(value),
            Ok(Err(e)) => e,
            Err(_) => BackendError::Timeout(self.settings.op_timeout),
        };
        warn!(operation, key, error = %err, "L2 cache operation failed, continuing without it");
        metrics::record_cache_error("L2", operation);
        self.health.record_failure(BackendKind::Cache, &err.to_string());
        None
    }

    /// Raw string lookup.
    pub async fn get_raw(&self, key: &str) -> Option<String> {
        if let Some((value, _)) = self.l1.get(key) {
            metrics::record_cache("L1", true);
            debug!(key, tier = "L1", "Cache hit");
            return Some(value);
        }
        metrics::record_cache("L1", false);

        if !self.l2_ready().await {
            return None;
        }

        match self.l2_call("get", key, self.l2.get(key)).await.flatten() {
            Some(cached) => {
                metrics::record_cache("L2", true);
                debug!(key, tier = "L2", "Cache hit");
                let ttl = cached
                    .ttl_remaining
                    .map_or(self.settings.l1_max_ttl, |t| t.min(self.settings.l1_max_ttl));
                self.l1.insert(key, cached.value.clone(), ttl);
                Some(cached.value)
            }
            None => {
                metrics::record_cache("L2", false);
                None
            }
        }
    }

    /// Typed lookup. An entry that no longer deserializes is dropped and
    /// reported as a miss.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = self.get_raw(key).await?;
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(key, error = %e, "Discarding undecodable cache entry");
                self.delete(key).await;
                None
            }
        }
    }

    /// Write-through, L1 then L2, each clamped to its own max TTL.
    pub async fn set_raw(&self, key: &str, value: String, ttl: Duration) {
        let l1_ttl = ttl.min(self.settings.l1_max_ttl);
        let l2_ttl = ttl.min(self.settings.l2_max_ttl);

        self.l1.insert(key, value.clone(), l1_ttl);
        if !l2_ttl.is_zero() && self.l2_ready().await {
            self.l2_call("set", key, self.l2.set(key, &value, l2_ttl)).await;
        }
    }

    pub async fn set<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) {
        match serde_json::to_string(value) {
            Ok(raw) => self.set_raw(key, raw, ttl).await,
            Err(e) => warn!(key, error = %e, "Value not cacheable"),
        }
    }

    /// Drop one exact key from both tiers. The key is never read as a glob.
    pub async fn delete(&self, key: &str) {
        self.l1.remove(key);
        if self.settings.l2_enabled {
            self.apply_delete(&DeferredDelete::Key(key.to_string())).await;
        }
    }

    /// Drop every key matching `pattern` from both tiers. L1 is cleared
    /// synchronously; L2 gets a single pattern delete.
    pub async fn invalidate(&self, pattern: &str) -> u64 {
        let l1_removed = self.l1.invalidate(pattern);
        let l2_removed = if self.settings.l2_enabled {
            self.apply_delete(&DeferredDelete::Pattern(pattern.to_string()))
                .await
                .unwrap_or(0)
        } else {
            0
        };
        let total = l1_removed + l2_removed;
        debug!(pattern, l1_removed, l2_removed, "Cache invalidated");
        metrics::record_invalidation(key_family(pattern), total);
        total
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::storage::memory::InMemoryCache;
    use crate::storage::traits::{CachedValue, HealthProbe};

    fn settings() -> TierSettings {
        TierSettings {
            l1_max_ttl: Duration::from_secs(60),
            l2_max_ttl: Duration::from_secs(600),
            op_timeout: Duration::from_millis(50),
            l2_enabled: true,
        }
    }

    fn tiered(l2: Arc<dyn DistributedCache>) -> (TieredCache, Arc<BackendHealthTracker>) {
        let health = Arc::new(BackendHealthTracker::new());
        let l1 = Arc::new(LocalCache::new(100, 10));
        let cache = TieredCache::new(l1, l2, health.clone(), settings());
        (cache, health)
    }

    /// L2 that always fails
    struct BrokenCache;

    #[async_trait]
    impl DistributedCache for BrokenCache {
        async fn get(&self, _key: &str) -> Result<Option<CachedValue>, BackendError> {
            Err(BackendError::Connection("refused".into()))
        }
        async fn set(&self, _key: &str, _value: &str, _ttl: Duration) -> Result<(), BackendError> {
            Err(BackendError::Connection("refused".into()))
        }
        async fn delete(&self, _key: &str) -> Result<(), BackendError> {
            Err(BackendError::Connection("refused".into()))
        }
        async fn scan_pattern(&self, _pattern: &str) -> Result<Vec<String>, BackendError> {
            Err(BackendError::Connection("refused".into()))
        }
        async fn health_check(&self) -> Result<HealthProbe, BackendError> {
            Err(BackendError::Connection("refused".into()))
        }
    }

    /// L2 that never answers
    struct HangingCache;

    #[async_trait]
    impl DistributedCache for HangingCache {
        async fn get(&self, _key: &str) -> Result<Option<CachedValue>, BackendError> {
            std::future::pending().await
        }
        async fn set(&self, _key: &str, _value: &str, _ttl: Duration) -> Result<(), BackendError> {
            std::future::pending().await
        }
        async fn delete(&self, _key: &str) -> Result<(), BackendError> {
            std::future::pending().await
        }
        async fn scan_pattern(&self, _pattern: &str) -> Result<Vec<String>, BackendError> {
            std::future::pending().await
        }
        async fn health_check(&self) -> Result<HealthProbe, BackendError> {
            std::future::pending().await
        }
    }

    /// In-memory L2 that can be switched into failing
    #[derive(Default)]
    struct SwitchableCache {
        inner: InMemoryCache,
        down: AtomicBool,
    }

    impl SwitchableCache {
        fn check(&self) -> Result<(), BackendError> {
            if self.down.load(Ordering::SeqCst) {
                return Err(BackendError::Connection("refused".into()));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl DistributedCache for SwitchableCache {
        async fn get(&self, key: &str) -> Result<Option<CachedValue>, BackendError> {
            self.check()?;
            self.inner.get(key).await
        }
        async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), BackendError> {
            self.check()?;
            self.inner.set(key, value, ttl).await
        }
        async fn delete(&self, key: &str) -> Result<(), BackendError> {
            self.check()?;
            self.inner.delete(key).await
        }
        async fn scan_pattern(&self, pattern: &str) -> Result<Vec<String>, BackendError> {
            self.check()?;
            self.inner.scan_pattern(pattern).await
        }
        async fn health_check(&self) -> Result<HealthProbe, BackendError> {
            self.check()?;
            self.inner.health_check().await
        }
    }

    #[tokio::test]
    async fn test_set_then_get() {
        let (cache, _) = tiered(Arc::new(InMemoryCache::new()));
        cache.set("material:1", &vec![1, 2, 3], Duration::from_secs(30)).await;
        let got: Option<Vec<i32>> = cache.get("material:1").await;
        assert_eq!(got, Some(vec![1, 2, 3]));
    }

    #[tokio::test]
    async fn test_l2_hit_populates_l1() {
        let l2 = Arc::new(InMemoryCache::new());
        l2.set("material:9", "\"gravel\"", Duration::from_secs(30)).await.unwrap();
        let (cache, _) = tiered(l2);

        assert!(cache.l1().get("material:9").is_none());
        let got: Option<String> = cache.get("material:9").await;
        assert_eq!(got.as_deref(), Some("gravel"));

        let (_, remaining) = cache.l1().get("material:9").unwrap();
        assert!(remaining <= Duration::from_secs(30));
    }

    #[tokio::test]
    async fn test_l1_ttl_clamped_to_l1_max() {
        let (cache, _) = tiered(Arc::new(InMemoryCache::new()));
        cache.set_raw("k", "v".into(), Duration::from_secs(3_600)).await;
        let (_, remaining) = cache.l1().get("k").unwrap();
        assert!(remaining <= Duration::from_secs(60));
    }

    #[tokio::test]
    async fn test_broken_l2_degrades_to_l1_and_marks_unhealthy() {
        let (cache, health) = tiered(Arc::new(BrokenCache));

        cache.set_raw("k", "v".into(), Duration::from_secs(30)).await;
        assert!(!health.is_healthy(BackendKind::Cache));
        assert_eq!(cache.get_raw("k").await.as_deref(), Some("v"));
        assert!(cache.get_raw("other").await.is_none());
    }

    #[tokio::test]
    async fn test_hanging_l2_times_out_as_miss() {
        let (cache, health) = tiered(Arc::new(HangingCache));
        assert!(cache.get_raw("k").await.is_none());
        assert!(!health.is_healthy(BackendKind::Cache));
    }

    #[tokio::test]
    async fn test_invalidate_clears_both_tiers() {
        let l2 = Arc::new(InMemoryCache::new());
        let (cache, _) = tiered(l2.clone());
        cache.set_raw("search:a", "1".into(), Duration::from_secs(30)).await;
        cache.set_raw("search:b", "2".into(), Duration::from_secs(30)).await;
        cache.set_raw("material:42", "3".into(), Duration::from_secs(30)).await;

        let removed = cache.invalidate("search:*").await;
        assert_eq!(removed, 4); // two per tier
        assert!(cache.get_raw("search:a").await.is_none());
        assert!(l2.get("search:b").await.unwrap().is_none());
        assert_eq!(cache.get_raw("material:42").await.as_deref(), Some("3"));
    }

    #[tokio::test]
    async fn test_undecodable_entry_is_a_miss() {
        let (cache, _) = tiered(Arc::new(InMemoryCache::new()));
        cache.set_raw("k", "not json".into(), Duration::from_secs(30)).await;
        let got: Option<Vec<u8>> = cache.get("k").await;
        assert!(got.is_none());
        assert!(cache.get_raw("k").await.is_none());
    }

    #[tokio::test]
    async fn test_set_visible_in_l1_while_l2_write_in_flight() {
        let (cache, _) = tiered(Arc::new(HangingCache));
        let write = cache.set_raw("k", "v".into(), Duration::from_secs(30));
        let read = async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            cache.l1().get("k").map(|(v, _)| v)
        };
        let ((), during) = tokio::join!(write, read);
        assert_eq!(during.as_deref(), Some("v"));
    }

    #[tokio::test]
    async fn test_invalidate_reaches_l2_while_marked_unhealthy() {
        let l2 = Arc::new(InMemoryCache::new());
        let (cache, health) = tiered(l2.clone());
        cache.set_raw("search:a", "1".into(), Duration::from_secs(30)).await;

        health.mark_unavailable(BackendKind::Cache, "flapped");
        assert_eq!(cache.invalidate("search:*").await, 2);
        assert!(l2.get("search:a").await.unwrap().is_none());

        health.record_success(BackendKind::Cache);
        assert!(cache.get_raw("search:a").await.is_none());
    }

    #[tokio::test]
    async fn test_delete_is_exact_not_a_glob() {
        let l2 = Arc::new(InMemoryCache::new());
        let (cache, _) = tiered(l2.clone());
        cache.set_raw("material:A1", "1".into(), Duration::from_secs(30)).await;
        cache.set_raw("material:A*", "2".into(), Duration::from_secs(30)).await;

        cache.delete("material:A*").await;
        assert!(cache.get_raw("material:A*").await.is_none());
        assert!(l2.get("material:A1").await.unwrap().is_some());
        assert_eq!(cache.get_raw("material:A1").await.as_deref(), Some("1"));
    }

    #[tokio::test]
    async fn test_failed_l2_delete_replayed_before_next_read() {
        let l2 = Arc::new(SwitchableCache::default());
        let (cache, health) = tiered(l2.clone());
        cache.set_raw("search:a", "1".into(), Duration::from_secs(30)).await;
        cache.set_raw("material:7", "2".into(), Duration::from_secs(30)).await;

        l2.down.store(true, Ordering::SeqCst);
        assert_eq!(cache.invalidate("search:*").await, 1);
        cache.delete("material:7").await;
        assert_eq!(cache.deferred_deletes(), 2);
        assert!(!health.is_healthy(BackendKind::Cache));

        // still down: the replay fails, so L2 stays out of reads
        health.record_success(BackendKind::Cache);
        assert!(cache.get_raw("search:a").await.is_none());
        assert_eq!(cache.deferred_deletes(), 2);

        l2.down.store(false, Ordering::SeqCst);
        health.record_success(BackendKind::Cache);
        assert!(cache.get_raw("search:a").await.is_none());
        assert_eq!(cache.deferred_deletes(), 0);
        assert!(l2.inner.get("search:a").await.unwrap().is_none());
        assert!(l2.inner.get("material:7").await.unwrap().is_none());
    }
}
