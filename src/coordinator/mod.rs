// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Hybrid search engine coordinator.
//!
//! The [`HybridSearchEngine`] ties together all components:
//! - search strategies (vector, relational, fuzzy) behind one orchestrator
//! - confidence-weighted fusion
//! - health-aware fallback across backends
//! - L1 in-process + L2 distributed cache
//! - two-phase SKU resolution
//!
//! # Lifecycle
//!
//! ```text
//! HybridSearchConfig ──validate──▶ connect / new ──▶ search · resolve_sku · upsert · check_health
//!                                      ▲
//!                      Arc<Registry> ──┘ (shared health, L1, permits)
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use catalog_search::{HybridSearchConfig, HybridSearchEngine, Registry};
//! use catalog_search::search::{MaterialRecord, SearchQuery};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), catalog_search::HybridError> {
//! let config = HybridSearchConfig {
//!     sql_url: Some("sqlite://catalog.db?mode=rwc".into()),
//!     ..Default::default()
//! };
//! let registry = Arc::new(Registry::new(&config));
//! let engine = HybridSearchEngine::connect(config, registry).await?;
//!
//! engine
//!     .upsert_material(MaterialRecord::new("1", "Portland cement M500").with_unit("kg"))
//!     .await?;
//! let response = engine.search(SearchQuery::new("portland cement")).await?;
//! println!("{} candidates", response.total);
//! # Ok(())
//! # }
//! ```

mod api;
mod lifecycle;
mod search_api;
mod types;

pub use types::{
    CatalogStats, HealthReport, OverallHealth, ResultSource, SearchResponse, StrategyReport,
    WriteReport,
};

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::cache::{L1Stats, TierSettings, TieredCache};
use crate::config::HybridSearchConfig;
use crate::error::HybridError;
use crate::registry::Registry;
use crate::resilience::{BackendHealthTracker, FallbackCoordinator};
use crate::search::{
    ConfidenceRanker, FuzzyStrategy, ParallelSearchOrchestrator, RankerSettings,
    RelationalStrategy, SearchStrategy, StrategyKind, VectorStrategy,
};
use crate::sku::SkuResolver;
use crate::storage::memory::{DisabledRelational, NoopCache};
use crate::storage::traits::{
    BackendKind, DistributedCache, Embedder, RelationalBackend, VectorBackend,
};

/// The adapters an engine runs against.
#[derive(Clone)]
pub struct Backends {
    pub vector: Arc<dyn VectorBackend>,
    pub relational: Arc<dyn RelationalBackend>,
    pub cache: Arc<dyn DistributedCache>,
    pub embedder: Arc<dyn Embedder>,
}

/// Hybrid catalog search engine.
///
/// # Thread Safety
///
/// The engine is `Send + Sync`; share it behind an `Arc`. All mutable
/// state (health, L1, permits) lives in the injected [`Registry`].
pub struct HybridSearchEngine {
    pub(super) config: HybridSearchConfig,
    pub(super) backends: Backends,
    pub(super) registry: Arc<Registry>,
    pub(super) fallback: FallbackCoordinator,
    pub(super) orchestrator: Arc<ParallelSearchOrchestrator>,
    pub(super) ranker: ConfidenceRanker,
    pub(super) cache: Arc<TieredCache>,
    pub(super) strategies: BTreeMap<StrategyKind, Arc<dyn SearchStrategy>>,
    pub(super) resolver: SkuResolver,
}

impl HybridSearchEngine {
    /// Build an engine over already-connected adapters.
    ///
    /// In vector-only mode the relational and cache adapters are replaced
    /// with [`DisabledRelational`] and [`NoopCache`] whatever was passed.
    pub fn new(
        config: HybridSearchConfig,
        backends: Backends,
        registry: Arc<Registry>,
    ) -> Result<Self, HybridError> {
        config.validate()?;

        let mut backends = backends;
        if !config.relational_active() {
            backends.relational = Arc::new(DisabledRelational::new("relational search disabled"));
        }
        if !config.distributed_cache_active() {
            backends.cache = Arc::new(NoopCache);
        }

        let health = Arc::clone(registry.health());
        let orchestrator = Arc::new(ParallelSearchOrchestrator::new(
            Arc::clone(registry.search_permits()),
            config.search_timeout(),
        ));

        let cache = Arc::new(TieredCache::new(
            Arc::clone(registry.l1()),
            Arc::clone(&backends.cache),
            Arc::clone(&health),
            TierSettings {
                l1_max_ttl: Duration::from_secs(config.l1_max_ttl_secs),
                l2_max_ttl: Duration::from_secs(config.l2_max_ttl_secs),
                op_timeout: config.cache_op_timeout(),
                l2_enabled: config.distributed_cache_active(),
            },
        ));

        let vector: Arc<dyn SearchStrategy> = Arc::new(VectorStrategy::new(
            Arc::clone(&backends.vector),
            Arc::clone(&backends.embedder),
            config.collection.clone(),
            config.threshold(StrategyKind::Vector),
        ));
        let mut strategies: BTreeMap<StrategyKind, Arc<dyn SearchStrategy>> = BTreeMap::new();
        for kind in config.enabled_strategies() {
            let strategy: Arc<dyn SearchStrategy> = match kind {
                StrategyKind::Vector => Arc::clone(&vector),
                StrategyKind::Relational => Arc::new(RelationalStrategy::new(
                    Arc::clone(&backends.relational),
                    config.table.clone(),
                    config.threshold(kind),
                )),
                StrategyKind::Fuzzy => Arc::new(FuzzyStrategy::new(
                    Arc::clone(&backends.relational),
                    config.table.clone(),
                    config.threshold(kind),
                )),
            };
            strategies.insert(kind, strategy);
        }

        let resolver = SkuResolver::new(
            Arc::clone(&orchestrator),
            vector,
            Arc::clone(&cache),
            Arc::clone(&health),
            config.sku_similarity_floor,
            config.sku_candidate_limit,
            config.search_cache_ttl(),
        );

        info!(
            strategies = ?strategies.keys().map(StrategyKind::as_str).collect::<Vec<_>>(),
            vector_only = config.vector_only,
            l2 = config.distributed_cache_active(),
            "Hybrid search engine ready"
        );

        Ok(Self {
            ranker: ConfidenceRanker::new(RankerSettings::from_config(&config)),
            fallback: FallbackCoordinator::new(health),
            config,
            backends,
            registry,
            orchestrator,
            cache,
            strategies,
            resolver,
        })
    }

    #[must_use]
    pub fn config(&self) -> &HybridSearchConfig {
        &self.config
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    #[must_use]
    pub fn health(&self) -> &Arc<BackendHealthTracker> {
        self.registry.health()
    }

    #[must_use]
    pub fn cache(&self) -> &Arc<TieredCache> {
        &self.cache
    }

    #[must_use]
    pub fn l1_stats(&self) -> L1Stats {
        self.registry.l1().stats()
    }

    /// Backends this configuration actually talks to, in `BackendKind` order.
    #[must_use]
    pub fn active_backends(&self) -> Vec<BackendKind> {
        let mut out = Vec::with_capacity(3);
        if self.config.enable_vector {
            out.push(BackendKind::Vector);
        }
        if self.config.relational_active() {
            out.push(BackendKind::Relational);
        }
        if self.config.distributed_cache_active() {
            out.push(BackendKind::Cache);
        }
        out
    }

    /// Drop cached entries whose key matches a glob, from both tiers.
    pub async fn invalidate(&self, pattern: &str) -> u64 {
        self.cache.invalidate(pattern).await
    }
}
