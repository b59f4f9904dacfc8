// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Process-wide shared state.
//!
//! Built once at startup and handed (as `Arc<Registry>`) to every engine
//! in the process, so that health state, the L1 map and the strategy
//! permit pool are shared rather than rebuilt per engine.
//!
//! ```rust
//! use std::sync::Arc;
//! use catalog_search::{HybridSearchConfig, Registry};
//!
//! let config = HybridSearchConfig::default();
//! let registry = Arc::new(Registry::new(&config));
//! assert_eq!(registry.search_permits().available_permits(), 10);
//! registry.reset();
//! ```

use std::sync::Arc;

use tokio::sync::Semaphore;
use tracing::debug;

use crate::cache::LocalCache;
use crate::config::HybridSearchConfig;
use crate::resilience::BackendHealthTracker;

pub struct Registry {
    health: Arc<BackendHealthTracker>,
    l1: Arc<LocalCache>,
    search_permits: Arc<Semaphore>,
}

impl Registry {
    pub fn new(config: &HybridSearchConfig) -> Self {
        Self {
            health: Arc::new(BackendHealthTracker::new()),
            l1: Arc::new(LocalCache::new(config.l1_capacity, config.l1_eviction_batch)),
            search_permits: Arc::new(Semaphore::new(config.max_concurrent_searches.max(1))),
        }
    }

    #[must_use]
    pub fn health(&self) -> &Arc<BackendHealthTracker> {
        &self.health
    }

    #[must_use]
    pub fn l1(&self) -> &Arc<LocalCache> {
        &self.l1
    }

    #[must_use]
    pub fn search_permits(&self) -> &Arc<Semaphore> {
        &self.search_permits
    }

    /// Clear health state and L1. Outstanding permits are unaffected.
    pub fn reset(&self) {
        self.health.reset();
        self.l1.clear();
        debug!("Registry reset");
    }
}
