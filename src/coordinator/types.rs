//! Public types returned by the engine.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::resilience::BackendHealth;
use crate::search::{FusedCandidate, StrategyKind, StrategyResult};
use crate::storage::traits::{BackendKind, HealthStatus};

/// Where a search response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultSource {
    /// Fresh dispatch round
    Live,
    /// Tiered cache (L1 or L2)
    Cache,
}

impl ResultSource {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Live => "live",
            Self::Cache => "cache",
        }
    }
}

/// Outcome of one strategy in the round that produced a response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrategyReport {
    pub strategy: StrategyKind,
    /// `completed`, `failed`, `timed_out` or `skipped`
    pub status: String,
    pub hits: usize,
    pub elapsed_ms: u64,
    #[serde(default)]
    pub error: Option<String>,
}

impl StrategyReport {
    pub(super) fn from_result(result: &StrategyResult) -> Self {
        let error = match &result.status {
            crate::search::StrategyStatus::Failed(e) => Some(e.clone()),
            _ => None,
        };
        Self {
            strategy: result.strategy,
            status: result.status.as_str().to_string(),
            hits: result.hits.len(),
            elapsed_ms: result.elapsed.as_millis() as u64,
            error,
        }
    }

    pub(super) fn skipped(strategy: StrategyKind, reason: String) -> Self {
        Self { strategy, status: "skipped".into(), hits: 0, elapsed_ms: 0, error: Some(reason) }
    }
}

/// One page of fused results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    pub candidates: Vec<FusedCandidate>,
    /// Fused candidates across all pages
    pub total: usize,
    pub page: usize,
    pub source: ResultSource,
    pub strategies: Vec<StrategyReport>,
    pub elapsed: Duration,
}

impl SearchResponse {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    /// Record ids on this page, best first.
    #[must_use]
    pub fn record_ids(&self) -> Vec<&str> {
        self.candidates.iter().map(|c| c.record_id.as_str()).collect()
    }
}

/// Roll-up over the active backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverallHealth {
    Healthy,
    Degraded,
    Unavailable,
}

impl OverallHealth {
    /// Healthy when every backend is, unavailable when none is serving.
    #[must_use]
    pub fn from_backends(backends: &[BackendHealth]) -> Self {
        if backends.is_empty() || backends.iter().all(|b| b.status == HealthStatus::Healthy) {
            Self::Healthy
        } else if backends.iter().all(|b| !b.healthy) {
            Self::Unavailable
        } else {
            Self::Degraded
        }
    }
}

impl std::fmt::Display for OverallHealth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Healthy => write!(f, "healthy"),
            Self::Degraded => write!(f, "degraded"),
            Self::Unavailable => write!(f, "unavailable"),
        }
    }
}

/// Health of every active backend, suitable for `/health` endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthReport {
    pub overall: OverallHealth,
    pub backends: Vec<BackendHealth>,
}

impl HealthReport {
    #[must_use]
    pub fn backend(&self, kind: BackendKind) -> Option<&BackendHealth> {
        self.backends.iter().find(|b| b.backend == kind)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogStats {
    pub records: u64,
    /// Backend that answered the count
    pub source: BackendKind,
}

/// Which stores accepted a write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteReport {
    pub record_id: String,
    pub vector: bool,
    pub relational: bool,
    /// Cached search entries dropped by the write
    pub invalidated: u64,
}

impl WriteReport {
    /// At least one store took the write.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.vector || self.relational
    }
}
