//! End-to-end scenarios for the hybrid search engine.
//!
//! Backends are scripted test doubles, so every scenario is deterministic
//! and runs without Docker:
//! 1. **Fusion** - vector + relational results merged with agreement bonus
//! 2. **Fallback** - unhealthy or failing backends skipped, others serve
//! 3. **Exhaustion** - every backend down surfaces one error with a per-backend map
//! 4. **SKU resolution** - unit match beats raw similarity
//! 5. **Cache** - repeat queries served from cache, writes invalidate (also
//!    across a cache outage)
//!
//! # Running
//! ```bash
//! cargo test --test scenarios
//! ```

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};

use catalog_search::search::{
    Filter, MaterialRecord, SearchMode, SearchQuery, SqlParam, StrategyKind,
};
use catalog_search::sku::{SkuRequest, SkuStatus};
use catalog_search::storage::traits::{
    BackendError, BackendKind, CachedValue, DistributedCache, HealthProbe, RelationalBackend,
    RelationalTransaction, Row, VectorBackend, VectorHit, VectorPoint,
};
use catalog_search::storage::{HashEmbedder, InMemoryCache, InMemoryVectorStore};
use catalog_search::{
    Backends, HybridError, HybridSearchConfig, HybridSearchEngine, Registry, ResultSource,
};

// =============================================================================
// Scripted Backends - Precise Error Injection
// =============================================================================

/// Vector store returning fixed hits (whatever the query vector).
struct ScriptedVector {
    hits: Vec<VectorHit>,
    fail: AtomicBool,
    hang: AtomicBool,
    calls: AtomicUsize,
}

impl ScriptedVector {
    fn new(hits: &[(&str, f32, Value)]) -> Arc<Self> {
        Arc::new(Self {
            hits: hits
                .iter()
                .map(|(id, score, payload)| VectorHit {
                    id: id.to_string(),
                    score: *score,
                    payload: payload.clone(),
                })
                .collect(),
            fail: AtomicBool::new(false),
            hang: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
        })
    }

    fn failing(self: Arc<Self>) -> Arc<Self> {
        self.fail.store(true, Ordering::SeqCst);
        self
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VectorBackend for ScriptedVector {
    async fn search(
        &self,
        _collection: &str,
        _vector: &[f32],
        limit: usize,
        _filter: &[Filter],
    ) -> Result<Vec<VectorHit>, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.hang.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(BackendError::Connection("vector store refused".into()));
        }
        Ok(self.hits.iter().take(limit).cloned().collect())
    }

    async fn upsert(
        &self,
        _collection: &str,
        points: Vec<VectorPoint>,
    ) -> Result<usize, BackendError> {
        Ok(points.len())
    }

    async fn delete(&self, _collection: &str, ids: &[String]) -> Result<usize, BackendError> {
        Ok(ids.len())
    }

    async fn get_by_id(
        &self,
        _collection: &str,
        id: &str,
    ) -> Result<Option<VectorPoint>, BackendError> {
        Ok(self.hits.iter().find(|h| h.id == id).map(|h| VectorPoint {
            id: h.id.clone(),
            vector: Vec::new(),
            payload: h.payload.clone(),
        }))
    }

    async fn count(&self, _collection: &str) -> Result<u64, BackendError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(BackendError::Connection("vector store refused".into()));
        }
        Ok(self.hits.len() as u64)
    }

    async fn health_check(&self) -> Result<HealthProbe, BackendError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(BackendError::Connection("vector store refused".into()));
        }
        Ok(HealthProbe::healthy("scripted"))
    }
}

/// Relational store returning fixed rows for every SELECT.
struct ScriptedRelational {
    rows: Vec<Row>,
    fail: AtomicBool,
    /// SELECTs binding exactly this LIKE pattern fail
    rejected_pattern: Mutex<Option<String>>,
    calls: AtomicUsize,
}

impl ScriptedRelational {
    fn new(rows: Vec<Value>) -> Arc<Self> {
        Arc::new(Self {
            rows: rows.into_iter().filter_map(|v| v.as_object().cloned()).collect(),
            fail: AtomicBool::new(false),
            rejected_pattern: Mutex::new(None),
            calls: AtomicUsize::new(0),
        })
    }

    fn failing(self: Arc<Self>) -> Arc<Self> {
        self.fail.store(true, Ordering::SeqCst);
        self
    }

    fn rejecting(self: Arc<Self>, pattern: &str) -> Arc<Self> {
        *self.rejected_pattern.lock() = Some(pattern.to_string());
        self
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<(), BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            Err(BackendError::Connection("database refused".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl RelationalBackend for ScriptedRelational {
    async fn query(&self, sql: &str, params: &[SqlParam]) -> Result<Vec<Row>, BackendError> {
        self.check()?;
        if let Some(rejected) = self.rejected_pattern.lock().as_deref() {
            if params.iter().any(|p| matches!(p, SqlParam::Text(t) if t == rejected)) {
                return Err(BackendError::Query(format!("statement timeout on {rejected}")));
            }
        }
        if sql.contains("COUNT(*)") {
            let mut row = Row::new();
            row.insert("n".into(), json!(self.rows.len()));
            return Ok(vec![row]);
        }
        Ok(self.rows.clone())
    }

    async fn execute(&self, _sql: &str, _params: &[SqlParam]) -> Result<u64, BackendError> {
        self.check()?;
        Ok(1)
    }

    async fn begin_transaction(&self) -> Result<Box<dyn RelationalTransaction>, BackendError> {
        self.check()?;
        Ok(Box::new(NoopTransaction))
    }

    async fn health_check(&self) -> Result<HealthProbe, BackendError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(BackendError::Connection("database refused".into()));
        }
        Ok(HealthProbe::healthy("scripted"))
    }
}

/// In-memory distributed cache that can go down, and logs every delete.
#[derive(Default)]
struct FlakyCache {
    inner: InMemoryCache,
    down: AtomicBool,
    deletes: Mutex<Vec<String>>,
    pattern_deletes: Mutex<Vec<String>>,
}

impl FlakyCache {
    fn check(&self) -> Result<(), BackendError> {
        if self.down.load(Ordering::SeqCst) {
            return Err(BackendError::Connection("cache refused".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl DistributedCache for FlakyCache {
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
        self.deletes.lock().push(key.to_string());
        self.inner.delete(key).await
    }

    async fn scan_pattern(&self, pattern: &str) -> Result<Vec<String>, BackendError> {
        self.check()?;
        self.inner.scan_pattern(pattern).await
    }

    async fn delete_pattern(&self, pattern: &str) -> Result<u64, BackendError> {
        self.check()?;
        self.pattern_deletes.lock().push(pattern.to_string());
        self.inner.delete_pattern(pattern).await
    }

    async fn health_check(&self) -> Result<HealthProbe, BackendError> {
        self.check()?;
        self.inner.health_check().await
    }
}

struct NoopTransaction;

#[async_trait]
impl RelationalTransaction for NoopTransaction {
    async fn execute(&mut self, _sql: &str, _params: &[SqlParam]) -> Result<u64, BackendError> {
        Ok(1)
    }
    async fn commit(self: Box<Self>) -> Result<(), BackendError> {
        Ok(())
    }
    async fn rollback(self: Box<Self>) -> Result<(), BackendError> {
        Ok(())
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn engine(
    config: HybridSearchConfig,
    vector: Arc<dyn VectorBackend>,
    relational: Arc<dyn RelationalBackend>,
) -> HybridSearchEngine {
    engine_with_cache(config, vector, relational, Arc::new(InMemoryCache::new()))
}

fn engine_with_cache(
    config: HybridSearchConfig,
    vector: Arc<dyn VectorBackend>,
    relational: Arc<dyn RelationalBackend>,
    cache: Arc<dyn DistributedCache>,
) -> HybridSearchEngine {
    let registry = Arc::new(Registry::new(&config));
    let backends = Backends {
        vector,
        relational,
        cache,
        embedder: Arc::new(HashEmbedder::new(config.embedding_dimension)),
    };
    HybridSearchEngine::new(config, backends, registry).unwrap()
}

/// Vector store plus shared cache; the relational side is switched off.
fn vector_store_config() -> HybridSearchConfig {
    HybridSearchConfig { enable_relational: false, embedding_dimension: 256, ..Default::default() }
}

fn cement(id: &str, grade: &str) -> MaterialRecord {
    MaterialRecord::new(id, format!("Portland cement {grade}")).with_unit("kg")
}

fn cement_vector() -> Arc<ScriptedVector> {
    ScriptedVector::new(&[
        ("a", 0.9, json!({"id": "a", "name": "Portland cement M500", "unit": "kg"})),
        ("b", 0.8, json!({"id": "b", "name": "Portland cement M400", "unit": "kg"})),
        ("c", 0.6, json!({"id": "c", "name": "White cement", "unit": "kg"})),
    ])
}

fn cement_rows() -> Arc<ScriptedRelational> {
    ScriptedRelational::new(vec![
        json!({"id": "a", "name": "Portland cement M500", "unit": "kg", "score": 0.85}),
        json!({"id": "d", "name": "Cement mortar", "unit": "bag", "score": 0.75}),
    ])
}

// =============================================================================
// Fusion
// =============================================================================

#[tokio::test]
async fn scenario_a_vector_and_relational_fused() {
    let config = HybridSearchConfig { enable_fuzzy: false, ..Default::default() };
    let engine = engine(config, cement_vector(), cement_rows());

    let response = engine.search(SearchQuery::new("portland cement")).await.unwrap();

    assert_eq!(response.total, 4);
    let ids: Vec<_> = response.record_ids();
    assert_eq!(ids.len(), 4);
    assert_eq!(ids[0], "a");

    let shared = &response.candidates[0];
    assert_eq!(
        shared.strategies.iter().copied().collect::<Vec<_>>(),
        vec![StrategyKind::Vector, StrategyKind::Relational]
    );
    assert!(shared.score > 0.9, "agreement bonus applied: {}", shared.score);
    assert!(response.candidates.iter().all(|c| (0.0..=1.0).contains(&c.score)));
    assert!(response.candidates.windows(2).all(|w| w[0].score >= w[1].score));
    assert_eq!(response.source, ResultSource::Live);
}

#[tokio::test]
async fn empty_results_are_a_success() {
    let engine = engine(
        HybridSearchConfig::default(),
        ScriptedVector::new(&[]),
        ScriptedRelational::new(vec![]),
    );
    let response = engine.search(SearchQuery::new("unobtainium")).await.unwrap();
    assert!(response.is_empty());
    assert_eq!(response.total, 0);
}

#[tokio::test]
async fn pagination_and_sort_apply_after_fusion() {
    let config = HybridSearchConfig { enable_fuzzy: false, ..Default::default() };
    let engine = engine(config, cement_vector(), cement_rows());

    let page = engine
        .search(SearchQuery::new("portland cement").limit(2).page(1))
        .await
        .unwrap();
    assert_eq!(page.total, 4);
    assert_eq!(page.page, 1);
    assert_eq!(page.candidates.len(), 2);

    let sorted = engine
        .search(SearchQuery::new("portland cement").sort_by("name", false))
        .await
        .unwrap();
    let names: Vec<_> = sorted
        .candidates
        .iter()
        .map(|c| c.payload["name"].as_str().unwrap_or_default().to_lowercase())
        .collect();
    let mut expected = names.clone();
    expected.sort();
    assert_eq!(names, expected);
}

// =============================================================================
// Fallback
// =============================================================================

#[tokio::test]
async fn scenario_b_unhealthy_vector_serves_relational_only() {
    let vector = cement_vector();
    let engine = engine(HybridSearchConfig::default(), vector.clone(), cement_rows());
    engine.health().mark_unavailable(BackendKind::Vector, "forced");

    let response = engine.search(SearchQuery::new("cement")).await.unwrap();

    assert!(!response.is_empty());
    assert_eq!(vector.calls(), 0, "unhealthy backend must not be invoked");
    assert!(response
        .candidates
        .iter()
        .all(|c| !c.strategies.contains(&StrategyKind::Vector)));
    let skipped = response
        .strategies
        .iter()
        .find(|r| r.strategy == StrategyKind::Vector)
        .unwrap();
    assert_eq!(skipped.status, "skipped");
}

#[tokio::test]
async fn failing_strategy_in_hybrid_round_marks_backend_unhealthy() {
    let vector = cement_vector().failing();
    let engine = engine(HybridSearchConfig::default(), vector.clone(), cement_rows());

    let response = engine.search(SearchQuery::new("cement")).await.unwrap();
    assert!(!response.is_empty());
    assert!(!engine.health().is_healthy(BackendKind::Vector));
    assert!(engine.health().is_healthy(BackendKind::Relational));

    // partial rounds are not cached; the next round skips the vector store
    engine.search(SearchQuery::new("cement")).await.unwrap();
    assert_eq!(vector.calls(), 1);
}

#[tokio::test]
async fn failed_strategy_on_serving_backend_is_not_cached() {
    // the fuzzy stem query fails while the full-token relational query succeeds
    let relational = cement_rows().rejecting("%cem%");
    let engine = engine(HybridSearchConfig::default(), cement_vector(), relational);

    let first = engine.search(SearchQuery::new("cement")).await.unwrap();
    let status = |kind: StrategyKind| {
        first.strategies.iter().find(|r| r.strategy == kind).map(|r| r.status.clone())
    };
    assert_eq!(status(StrategyKind::Relational).as_deref(), Some("completed"));
    assert_eq!(status(StrategyKind::Fuzzy).as_deref(), Some("failed"));
    assert_eq!(first.source, ResultSource::Live);

    let second = engine.search(SearchQuery::new("cement")).await.unwrap();
    assert_eq!(second.source, ResultSource::Live);
}

#[tokio::test]
async fn single_mode_falls_back_deterministically() {
    let vector = cement_vector().failing();
    let relational = cement_rows();
    let engine = engine(HybridSearchConfig::default(), vector.clone(), relational.clone());

    let query = SearchQuery::new("cement").mode(SearchMode::Vector);
    let first = engine.search(query.clone()).await.unwrap();
    assert_eq!(first.strategies.len(), 1);
    assert_eq!(first.strategies[0].strategy, StrategyKind::Relational);
    assert_eq!(vector.calls(), 1);

    let second = engine.search(query).await.unwrap();
    assert_eq!(second.record_ids(), first.record_ids());
    assert_eq!(vector.calls(), 1, "failed backend is skipped until a health check");
    assert_eq!(relational.calls(), 2);
}

#[tokio::test]
async fn fallback_disabled_keeps_single_mode_on_its_backend() {
    let config = HybridSearchConfig { fallback_enabled: false, ..Default::default() };
    let engine = engine(config, cement_vector().failing(), cement_rows());

    let err = engine
        .search(SearchQuery::new("cement").mode(SearchMode::Vector))
        .await
        .unwrap_err();
    let errors = err.backend_errors().unwrap();
    assert_eq!(errors.keys().copied().collect::<Vec<_>>(), vec![BackendKind::Vector]);
}

#[tokio::test]
async fn health_check_restores_failed_backend() {
    let vector = cement_vector();
    let engine = engine(HybridSearchConfig::default(), vector.clone(), cement_rows());
    engine.health().mark_unavailable(BackendKind::Vector, "forced");
    assert!(!engine.health().is_healthy(BackendKind::Vector));

    let report = engine.check_health().await;
    assert!(engine.health().is_healthy(BackendKind::Vector));
    assert!(report.backend(BackendKind::Vector).unwrap().healthy);
}

#[tokio::test(start_paused = true)]
async fn hanging_strategy_abandoned_at_deadline() {
    let vector = cement_vector();
    vector.hang.store(true, Ordering::SeqCst);
    let config = HybridSearchConfig { search_timeout_ms: 200, ..Default::default() };
    let engine = engine(config, vector, cement_rows());

    let response = engine.search(SearchQuery::new("cement")).await.unwrap();
    let report = response
        .strategies
        .iter()
        .find(|r| r.strategy == StrategyKind::Vector)
        .unwrap();
    assert_eq!(report.status, "timed_out");
    assert!(!response.is_empty());
}

// =============================================================================
// Exhaustion
// =============================================================================

#[tokio::test]
async fn scenario_c_all_backends_unhealthy() {
    let engine = engine(HybridSearchConfig::default(), cement_vector(), cement_rows());
    engine.health().mark_unavailable(BackendKind::Vector, "forced");
    engine.health().mark_unavailable(BackendKind::Relational, "forced");

    let err = engine.search(SearchQuery::new("cement")).await.unwrap_err();
    let HybridError::AllBackendsUnavailable { errors, .. } = &err else {
        panic!("expected exhaustion, got {err:?}");
    };
    assert_eq!(errors.len(), 2);
    assert!(errors.values().all(|e| e.starts_with("skipped: ")));
    assert!(err.is_availability_error());
}

#[tokio::test]
async fn every_backend_failing_is_exhaustion() {
    let engine = engine(
        HybridSearchConfig::default(),
        cement_vector().failing(),
        cement_rows().failing(),
    );
    let err = engine.search(SearchQuery::new("cement")).await.unwrap_err();
    let errors = err.backend_errors().unwrap();
    assert!(errors.contains_key(&BackendKind::Vector));
    assert!(errors.contains_key(&BackendKind::Relational));
}

#[tokio::test]
async fn validation_errors_touch_no_backend() {
    let vector = cement_vector();
    let relational = cement_rows();
    let engine = engine(HybridSearchConfig::default(), vector.clone(), relational.clone());

    let err = engine.search(SearchQuery::new("   ")).await.unwrap_err();
    assert!(matches!(err, HybridError::Validation(_)));
    assert_eq!(vector.calls() + relational.calls(), 0);
}

// =============================================================================
// SKU Resolution
// =============================================================================

#[tokio::test]
async fn scenario_d_unit_match_beats_similarity() {
    let vector = ScriptedVector::new(&[
        (
            "m-metre",
            0.95,
            json!({"id": "m-metre", "name": "Cement M500", "unit": "m", "sku": "CEM500-M"}),
        ),
        (
            "m-kg",
            0.9,
            json!({"id": "m-kg", "name": "Cement M500", "unit": "kg", "sku": "CEM500"}),
        ),
    ]);
    let engine = engine(HybridSearchConfig::default(), vector, cement_rows());

    let resolution = engine.resolve_sku(&SkuRequest::new("Cement M500", "kg")).await.unwrap();
    assert_eq!(resolution.sku.as_deref(), Some("CEM500"));
    assert_eq!(resolution.record_id.as_deref(), Some("m-kg"));
    assert_eq!(resolution.status, SkuStatus::Resolved);
    assert_eq!(resolution.evaluated, 2);
    assert_eq!(resolution.matched, 1);
}

#[tokio::test]
async fn sku_resolution_with_vector_down_is_exhaustion() {
    let engine = engine(HybridSearchConfig::default(), cement_vector(), cement_rows());
    engine.health().mark_unavailable(BackendKind::Vector, "forced");

    let err = engine.resolve_sku(&SkuRequest::new("Cement", "kg")).await.unwrap_err();
    assert_eq!(err.backend_errors().unwrap().len(), 1);
}

// =============================================================================
// Cache + Writes
// =============================================================================

#[tokio::test]
async fn repeat_query_served_from_cache() {
    let relational = cement_rows();
    let engine = engine(HybridSearchConfig::default(), cement_vector(), relational.clone());

    let first = engine.search(SearchQuery::new("Portland  Cement")).await.unwrap();
    let calls = relational.calls();
    // normalized text hits the same key
    let second = engine.search(SearchQuery::new("portland cement")).await.unwrap();

    assert_eq!(second.source, ResultSource::Cache);
    assert_eq!(second.record_ids(), first.record_ids());
    assert_eq!(relational.calls(), calls);
}

#[tokio::test]
async fn writes_invalidate_cached_searches() {
    let config =
        HybridSearchConfig { vector_only: true, embedding_dimension: 256, ..Default::default() };
    let engine = engine(config, Arc::new(InMemoryVectorStore::new()), cement_rows());

    let report = engine.upsert_material(cement("1", "M500").with_sku("CEM500")).await.unwrap();
    assert!(report.vector);
    assert!(!report.relational);

    let query = SearchQuery::new("portland cement");
    let live = engine.search(query.clone()).await.unwrap();
    assert_eq!(live.record_ids(), vec!["1"]);
    assert_eq!(engine.search(query.clone()).await.unwrap().source, ResultSource::Cache);

    engine.upsert_material(cement("2", "M400")).await.unwrap();
    let after = engine.search(query).await.unwrap();
    assert_eq!(after.source, ResultSource::Live);
    assert_eq!(after.total, 2);
}

#[tokio::test]
async fn write_while_cache_marked_unhealthy_still_invalidates_shared_tier() {
    let engine = engine_with_cache(
        vector_store_config(),
        Arc::new(InMemoryVectorStore::new()),
        cement_rows(),
        Arc::new(InMemoryCache::new()),
    );
    let query = SearchQuery::new("portland cement");

    engine.upsert_material(cement("1", "M500")).await.unwrap();
    assert_eq!(engine.search(query.clone()).await.unwrap().total, 1);

    engine.health().mark_unavailable(BackendKind::Cache, "flapped");
    engine.upsert_material(cement("2", "M400")).await.unwrap();
    engine.check_health().await;
    assert!(engine.health().is_healthy(BackendKind::Cache));

    let after = engine.search(query).await.unwrap();
    assert_eq!(after.source, ResultSource::Live);
    assert_eq!(after.total, 2);
}

#[tokio::test]
async fn invalidation_missed_during_cache_outage_is_replayed() {
    let cache = Arc::new(FlakyCache::default());
    let engine = engine_with_cache(
        vector_store_config(),
        Arc::new(InMemoryVectorStore::new()),
        cement_rows(),
        cache.clone(),
    );
    let query = SearchQuery::new("portland cement");

    engine.upsert_material(cement("1", "M500")).await.unwrap();
    assert_eq!(engine.search(query.clone()).await.unwrap().total, 1);

    cache.down.store(true, Ordering::SeqCst);
    let report = engine.upsert_material(cement("2", "M400")).await.unwrap();
    assert!(report.vector);
    assert!(!engine.health().is_healthy(BackendKind::Cache));

    cache.down.store(false, Ordering::SeqCst);
    engine.check_health().await;
    assert!(engine.health().is_healthy(BackendKind::Cache));

    let after = engine.search(query).await.unwrap();
    assert_eq!(after.source, ResultSource::Live);
    assert_eq!(after.total, 2);
}

#[tokio::test]
async fn glob_characters_in_ids_delete_only_their_own_key() {
    let cache = Arc::new(FlakyCache::default());
    let engine = engine_with_cache(
        vector_store_config(),
        Arc::new(InMemoryVectorStore::new()),
        cement_rows(),
        cache.clone(),
    );

    engine.upsert_material(cement("A1", "M500")).await.unwrap();
    assert!(engine.get_material("A1").await.unwrap().is_some());
    assert!(cache.inner.get("material:A1").await.unwrap().is_some());

    for id in ["A*", "A?", "A[1]", "A\\1"] {
        engine.upsert_material(cement(id, "M400")).await.unwrap();
    }

    assert!(cache.inner.get("material:A1").await.unwrap().is_some());
    assert_eq!(
        *cache.deletes.lock(),
        vec!["material:A1", "material:A*", "material:A?", "material:A[1]", "material:A\\1"]
    );
    assert!(cache
        .pattern_deletes
        .lock()
        .iter()
        .all(|p| p == "search:*" || p == "vector_search:*"));
}

#[tokio::test]
async fn get_material_falls_back_to_vector_store() {
    let engine = engine(HybridSearchConfig::default(), cement_vector(), cement_rows().failing());

    let record = engine.get_material("a").await.unwrap().unwrap();
    assert_eq!(record.name, "Portland cement M500");
    assert!(!engine.health().is_healthy(BackendKind::Relational));

    let stats = engine.catalog_stats().await.unwrap();
    assert_eq!(stats.source, BackendKind::Vector);
    assert_eq!(stats.records, 3);
}

#[tokio::test]
async fn get_material_miss_is_none() {
    let engine =
        engine(HybridSearchConfig::default(), cement_vector(), ScriptedRelational::new(vec![]));
    assert!(engine.get_material("missing").await.unwrap().is_none());
}

#[tokio::test]
async fn delete_reports_stores_and_invalidates() {
    let engine = engine(HybridSearchConfig::default(), cement_vector(), cement_rows());
    engine.search(SearchQuery::new("cement")).await.unwrap();

    let report = engine.delete_material("a").await.unwrap();
    assert!(report.vector && report.relational);
    assert!(report.invalidated >= 1);
    assert_eq!(
        engine.search(SearchQuery::new("cement")).await.unwrap().source,
        ResultSource::Live
    );
}

#[tokio::test]
async fn health_report_is_cached_between_checks() {
    let vector = cement_vector();
    let engine = engine(HybridSearchConfig::default(), vector.clone(), cement_rows());

    let first = engine.health_report().await;
    vector.fail.store(true, Ordering::SeqCst);
    // within the health TTL the cached report is returned without a new check
    let second = engine.health_report().await;
    assert_eq!(first, second);

    let fresh = engine.check_health().await;
    assert!(!fresh.backend(BackendKind::Vector).unwrap().healthy);
}
