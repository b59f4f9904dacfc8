//! In-process adapters.
//!
//! - [`InMemoryVectorStore`]: brute-force cosine search, for tests, demos
//!   and small catalogs
//! - [`InMemoryCache`]: expiring key/value map standing in for Redis
//! - [`NoopCache`] / [`DisabledRelational`]: what vector-only mode wires in

use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::time::Instant;

use super::traits::{
    BackendError, CachedValue, DistributedCache, HealthProbe, RelationalBackend,
    RelationalTransaction, Row, VectorBackend, VectorHit, VectorPoint,
};
use crate::cache::glob_match;
use crate::search::{Filter, SqlParam};

/// Cosine similarity clamped to `[0, 1]` (opposed vectors score 0).
#[must_use]
pub fn cosine_score(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0f32;
    let mut na = 0.0f32;
    let mut nb = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        na += x * x;
        nb += y * y;
    }
    if na == 0.0 || nb == 0.0 {
        return 0.0;
    }
    (dot / (na.sqrt() * nb.sqrt())).clamp(0.0, 1.0)
}

// ═══════════════════════════════════════════════════════════════════════════
// VECTOR
// ═══════════════════════════════════════════════════════════════════════════

pub struct InMemoryVectorStore {
    collections: DashMap<String, DashMap<String, VectorPoint>>,
}

impl InMemoryVectorStore {
    #[must_use]
    pub fn new() -> Self {
        Self { collections: DashMap::new() }
    }

    /// Get current point count across all collections
    #[must_use]
    pub fn len(&self) -> usize {
        self.collections.iter().map(|c| c.len()).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.collections.clear();
    }
}

impl Default for InMemoryVectorStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VectorBackend for InMemoryVectorStore {
    async fn search(
        &self,
        collection: &str,
        vector: &[f32],
        limit: usize,
        filter: &[Filter],
    ) -> Result<Vec<VectorHit>, BackendError> {
        let Some(points) = self.collections.get(collection) else {
            return Ok(Vec::new());
        };
        let mut hits: Vec<VectorHit> = points
            .iter()
            .filter(|p| filter.iter().all(|f| f.matches(&p.payload)))
            .map(|p| VectorHit {
                id: p.id.clone(),
                score: cosine_score(vector, &p.vector),
                payload: p.payload.clone(),
            })
            .collect();
        hits.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.id.cmp(&b.id)));
        hits.truncate(limit);
        Ok(hits)
    }

    async fn upsert(
        &self,
        collection: &str,
        points: Vec<VectorPoint>,
    ) -> Result<usize, BackendError> {
        let target = self.collections.entry(collection.to_string()).or_default();
        let n = points.len();
        for point in points {
            target.insert(point.id.clone(), point);
        }
        Ok(n)
    }

    async fn delete(&self, collection: &str, ids: &[String]) -> Result<usize, BackendError> {
        let Some(points) = self.collections.get(collection) else {
            return Ok(0);
        };
        Ok(ids.iter().filter(|id| points.remove(*id).is_some()).count())
    }

    async fn get_by_id(
        &self,
        collection: &str,
        id: &str,
    ) -> Result<Option<VectorPoint>, BackendError> {
        Ok(self
            .collections
            .get(collection)
            .and_then(|points| points.get(id).map(|p| p.clone())))
    }

    async fn count(&self, collection: &str) -> Result<u64, BackendError> {
        Ok(self.collections.get(collection).map_or(0, |p| p.len() as u64))
    }

    async fn health_check(&self) -> Result<HealthProbe, BackendError> {
        Ok(HealthProbe::healthy(format!("in-memory, {} points", self.len())))
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// CACHE
// ═══════════════════════════════════════════════════════════════════════════

pub struct InMemoryCache {
    data: DashMap<String, (String, Instant)>,
}

impl InMemoryCache {
    #[must_use]
    pub fn new() -> Self {
        Self { data: DashMap::new() }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl Default for InMemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DistributedCache for InMemoryCache {
    async fn get(&self, key: &str) -> Result<Option<CachedValue>, BackendError> {
        let now = Instant::now();
        if let Some(entry) = self.data.get(key) {
            let (value, expires_at) = entry.value();
            if *expires_at > now {
                return Ok(Some(CachedValue {
                    value: value.clone(),
                    ttl_remaining: Some(*expires_at - now),
                }));
            }
            drop(entry);
            self.data.remove(key);
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), BackendError> {
        self.data.insert(key.to_string(), (value.to_string(), Instant::now() + ttl));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), BackendError> {
        self.data.remove(key);
        Ok(())
    }

    async fn scan_pattern(&self, pattern: &str) -> Result<Vec<String>, BackendError> {
        let now = Instant::now();
        let mut keys: Vec<String> = self
            .data
            .iter()
            .filter(|e| e.value().1 > now && glob_match(pattern, e.key()))
            .map(|e| e.key().clone())
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn delete_pattern(&self, pattern: &str) -> Result<u64, BackendError> {
        let before = self.data.len();
        self.data.retain(|k, _| !glob_match(pattern, k));
        Ok((before - self.data.len()) as u64)
    }

    async fn health_check(&self) -> Result<HealthProbe, BackendError> {
        Ok(HealthProbe::healthy(format!("in-memory, {} keys", self.data.len())))
    }
}

/// Distributed cache that stores nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopCache;

#[async_trait]
impl DistributedCache for NoopCache {
    async fn get(&self, _key: &str) -> Result<Option<CachedValue>, BackendError> {
        Ok(None)
    }

    async fn set(&self, _key: &str, _value: &str, _ttl: Duration) -> Result<(), BackendError> {
        Ok(())
    }

    async fn delete(&self, _key: &str) -> Result<(), BackendError> {
        Ok(())
    }

    async fn scan_pattern(&self, _pattern: &str) -> Result<Vec<String>, BackendError> {
        Ok(Vec::new())
    }

    async fn health_check(&self) -> Result<HealthProbe, BackendError> {
        Ok(HealthProbe::healthy("no-op"))
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// RELATIONAL
// ═══════════════════════════════════════════════════════════════════════════

/// Relational backend that refuses every call.
#[derive(Debug, Clone)]
pub struct DisabledRelational {
    reason: String,
}

impl DisabledRelational {
    pub fn new(reason: impl Into<String>) -> Self {
        Self { reason: reason.into() }
    }

    fn refuse<T>(&self) -> Result<T, BackendError> {
        Err(BackendError::Disabled(self.reason.clone()))
    }
}

#[async_trait]
impl RelationalBackend for DisabledRelational {
    async fn query(&self, _sql: &str, _params: &[SqlParam]) -> Result<Vec<Row>, BackendError> {
        self.refuse()
    }

    async fn execute(&self, _sql: &str, _params: &[SqlParam]) -> Result<u64, BackendError> {
        self.refuse()
    }

    async fn begin_transaction(&self) -> Result<Box<dyn RelationalTransaction>, BackendError> {
        self.refuse()
    }

    async fn health_check(&self) -> Result<HealthProbe, BackendError> {
        self.refuse()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn point(id: &str, vector: Vec<f32>, unit: &str) -> VectorPoint {
        VectorPoint { id: id.into(), vector, payload: json!({"id": id, "unit": unit}) }
    }

    #[test]
    fn test_cosine_score() {
        assert!((cosine_score(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert_eq!(cosine_score(&[1.0, 0.0], &[0.0, 1.0]), 0.0);
        assert_eq!(cosine_score(&[1.0, 0.0], &[-1.0, 0.0]), 0.0);
        assert_eq!(cosine_score(&[1.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_score(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }

    #[tokio::test]
    async fn test_vector_search_orders_and_filters() {
        let store = InMemoryVectorStore::new();
        store
            .upsert(
                "materials",
                vec![
                    point("a", vec![1.0, 0.0], "kg"),
                    point("b", vec![0.8, 0.6], "kg"),
                    point("c", vec![1.0, 0.1], "m"),
                ],
            )
            .await
            .unwrap();

        let hits = store.search("materials", &[1.0, 0.0], 10, &[]).await.unwrap();
        let ids: Vec<_> = hits.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c", "b"]);

        let hits = store
            .search("materials", &[1.0, 0.0], 10, &[Filter::eq("unit", "kg")])
            .await
            .unwrap();
        assert_eq!(hits.len(), 2);

        assert!(store.search("other", &[1.0, 0.0], 10, &[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_vector_upsert_replaces_and_deletes() {
        let store = InMemoryVectorStore::new();
        store.upsert("m", vec![point("a", vec![1.0], "kg")]).await.unwrap();
        store.upsert("m", vec![point("a", vec![0.5], "t")]).await.unwrap();
        assert_eq!(store.count("m").await.unwrap(), 1);
        assert_eq!(store.get_by_id("m", "a").await.unwrap().unwrap().vector, vec![0.5]);

        assert_eq!(store.delete("m", &["a".into(), "zz".into()]).await.unwrap(), 1);
        assert!(store.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cache_expiry_and_remaining_ttl() {
        let cache = InMemoryCache::new();
        cache.set("k", "v", Duration::from_secs(10)).await.unwrap();

        tokio::time::advance(Duration::from_secs(4)).await;
        let got = cache.get("k").await.unwrap().unwrap();
        assert_eq!(got.value, "v");
        assert_eq!(got.ttl_remaining, Some(Duration::from_secs(6)));

        tokio::time::advance(Duration::from_secs(7)).await;
        assert!(cache.get("k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_cache_pattern_ops() {
        let cache = InMemoryCache::new();
        for key in ["search:1", "search:2", "material:42"] {
            cache.set(key, "x", Duration::from_secs(60)).await.unwrap();
        }
        assert_eq!(cache.scan_pattern("search:*").await.unwrap(), vec!["search:1", "search:2"]);
        assert_eq!(cache.delete_pattern("search:*").await.unwrap(), 2);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_disabled_relational_refuses() {
        let backend = DisabledRelational::new("vector-only mode");
        let err = backend.query("SELECT 1", &[]).await.unwrap_err();
        assert_eq!(err, BackendError::Disabled("vector-only mode".into()));
        assert!(backend.begin_transaction().await.is_err());
    }

    #[tokio::test]
    async fn test_noop_cache_stores_nothing() {
        let cache = NoopCache;
        cache.set("k", "v", Duration::from_secs(60)).await.unwrap();
        assert!(cache.get("k").await.unwrap().is_none());
        assert_eq!(cache.delete_pattern("*").await.unwrap(), 0);
    }
}
