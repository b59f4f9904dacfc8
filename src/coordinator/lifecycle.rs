//! Engine lifecycle: connecting adapters and probing backend health.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::cache::keys::HEALTH_REPORT_KEY;
use crate::config::HybridSearchConfig;
use crate::error::HybridError;
use crate::registry::Registry;
use crate::resilience::retry::{retry, RetryConfig};
use crate::storage::memory::{DisabledRelational, InMemoryVectorStore, NoopCache};
use crate::storage::traits::{
    BackendError, BackendKind, DistributedCache, Embedder, HealthProbe, RelationalBackend,
    VectorBackend,
};
use crate::storage::{HashEmbedder, RedisCache, SqlBackend};

use super::types::{HealthReport, OverallHealth};
use super::{Backends, HybridSearchEngine};

impl HybridSearchEngine {
    /// Connect with the built-in in-process vector store and hash embedder.
    ///
    /// Relational and cache adapters come from `sql_url` / `redis_url`.
    pub async fn connect(
        config: HybridSearchConfig,
        registry: Arc<Registry>,
    ) -> Result<Self, HybridError> {
        let vector = Arc::new(InMemoryVectorStore::new());
        let embedder = Arc::new(HashEmbedder::new(config.embedding_dimension));
        Self::connect_with(config, vector, embedder, registry).await
    }

    /// Connect the relational and cache adapters named in `config`, using
    /// the given vector store and embedder.
    ///
    /// Startup sequence:
    /// 1. Validate configuration
    /// 2. SQL (when relational search is active): connect with startup
    ///    retry, ensure the catalog table
    /// 3. Redis (when the distributed cache is active and configured)
    /// 4. Initial health probe
    #[tracing::instrument(
        skip_all,
        fields(has_sql = config.sql_url.is_some(), has_redis = config.redis_url.is_some())
    )]
    pub async fn connect_with(
        config: HybridSearchConfig,
        vector: Arc<dyn VectorBackend>,
        embedder: Arc<dyn Embedder>,
        registry: Arc<Registry>,
    ) -> Result<Self, HybridError> {
        let startup = std::time::Instant::now();
        config.validate()?;

        if embedder.dimension() != config.embedding_dimension {
            return Err(HybridError::Configuration(format!(
                "embedder dimension {} does not match embedding_dimension {}",
                embedder.dimension(),
                config.embedding_dimension
            )));
        }

        let relational: Arc<dyn RelationalBackend> = if config.relational_active() {
            let Some(url) = config.sql_url.as_deref() else {
                return Err(HybridError::Configuration(
                    "relational search is enabled but sql_url is not set".into(),
                ));
            };
            info!("Connecting to SQL...");
            let backend = SqlBackend::connect(url)
                .await
                .map_err(|e| HybridError::from_backend(BackendKind::Relational, e))?;
            backend
                .ensure_catalog_schema(&config.table)
                .await
                .map_err(|e| HybridError::from_backend(BackendKind::Relational, e))?;
            Arc::new(backend)
        } else {
            Arc::new(DisabledRelational::new("relational search disabled"))
        };

        let cache_active = config.distributed_cache_active();
        let cache: Arc<dyn DistributedCache> = match (cache_active, config.redis_url.as_deref()) {
            (true, Some(url)) => {
                info!("Connecting to Redis...");
                let cache = RedisCache::with_prefix(url, config.redis_prefix.as_deref())
                    .await
                    .map_err(|e| HybridError::from_backend(BackendKind::Cache, e))?;
                Arc::new(cache)
            }
            (true, None) => {
                info!("No redis_url configured, running with L1 only");
                Arc::new(NoopCache)
            }
            (false, _) => Arc::new(NoopCache),
        };

        let engine = Self::new(config, Backends { vector, relational, cache, embedder }, registry)?;
        let report = engine.check_health().await;
        info!(
            overall = %report.overall,
            elapsed_ms = startup.elapsed().as_millis() as u64,
            "Engine connected"
        );
        Ok(engine)
    }

    /// Probe every active backend (in parallel), apply the outcomes to the
    /// shared health tracker and return a fresh report.
    ///
    /// This is the only way a backend marked unavailable comes back.
    pub async fn check_health(&self) -> HealthReport {
        let active = self.active_backends();
        let (vector, relational, cache) = tokio::join!(
            self.probe_if_active(BackendKind::Vector, &active),
            self.probe_if_active(BackendKind::Relational, &active),
            self.probe_if_active(BackendKind::Cache, &active),
        );

        let health = self.health();
        for (kind, outcome) in [
            (BackendKind::Vector, vector),
            (BackendKind::Relational, relational),
            (BackendKind::Cache, cache),
        ] {
            if let Some(result) = outcome {
                if let Err(e) = &result {
                    warn!(backend = %kind, error = %e, "Health probe failed");
                }
                health.probe(kind, result);
            }
        }

        let backends: Vec<_> = active.iter().map(|k| health.get(*k)).collect();
        let report = HealthReport { overall: OverallHealth::from_backends(&backends), backends };

        match serde_json::to_string(&report) {
            Ok(raw) => {
                self.registry.l1().insert(HEALTH_REPORT_KEY, raw, self.config.health_cache_ttl())
            }
            Err(e) => warn!(error = %e, "Health report not cacheable"),
        }
        debug!(overall = %report.overall, "Health checked");
        report
    }

    /// Last health report if still fresh, otherwise a new probe.
    ///
    /// Reports are kept process-local (L1 only): they describe this
    /// process's view of the backends.
    pub async fn health_report(&self) -> HealthReport {
        if let Some((raw, _)) = self.registry.l1().get(HEALTH_REPORT_KEY) {
            if let Ok(report) = serde_json::from_str::<HealthReport>(&raw) {
                return report;
            }
        }
        self.check_health().await
    }

    async fn probe_if_active(
        &self,
        kind: BackendKind,
        active: &[BackendKind],
    ) -> Option<Result<HealthProbe, BackendError>> {
        if !active.contains(&kind) {
            return None;
        }
        Some(self.probe(kind).await)
    }

    async fn probe(&self, kind: BackendKind) -> Result<HealthProbe, BackendError> {
        let limit: Duration = self.config.search_timeout();
        retry("health_probe", &RetryConfig::probe(), || async move {
            let call = match kind {
                BackendKind::Vector => self.backends.vector.health_check(),
                BackendKind::Relational => self.backends.relational.health_check(),
                BackendKind::Cache => self.backends.cache.health_check(),
            };
            tokio::time::timeout(limit, call)
                .await
                .map_err(|_| BackendError::Timeout(limit))?
        })
        .await
    }
}
