// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! SKU resolution.
//!
//! Resolves a free-text item description plus attributes to one catalog
//! SKU in two phases:
//!
//! ```text
//! Phase 1: vector similarity (floor, candidate cap)
//!     │       cached under vector_search:<hash>
//!     ├─→ no survivors → NoCandidates (phase 2 skipped)
//!     ▼
//! Phase 2: per candidate
//!     unit_match    = normalize(unit) == normalize(requested unit)
//!     color_match   = requested color is None, or equal ignoring case
//!     overall_match = unit_match && color_match
//!     ▼
//! Selection: most similar overall match that carries a SKU
//! ```
//!
//! Colour matching keeps the flexible contract (`None` = wildcard) even
//! though catalog rows rarely carry a colour today.

pub mod units;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::cache::{vector_search_key, TieredCache};
use crate::error::HybridError;
use crate::metrics;
use crate::resilience::BackendHealthTracker;
use crate::search::{
    value_as_text, ParallelSearchOrchestrator, RawHit, SearchMode, SearchQuery, SearchStrategy,
    StrategyStatus,
};
use crate::storage::traits::BackendKind;

pub use units::{normalize_unit, units_match};

/// What to resolve.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkuRequest {
    pub name: String,
    pub unit: String,
    #[serde(default)]
    pub color: Option<String>,
}

impl SkuRequest {
    pub fn new(name: impl Into<String>, unit: impl Into<String>) -> Self {
        Self { name: name.into(), unit: unit.into(), color: None }
    }

    #[must_use]
    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = Some(color.into());
        self
    }

    pub fn validate(&self) -> Result<(), HybridError> {
        if self.name.trim().is_empty() {
            return Err(HybridError::Validation("SKU request name is empty".into()));
        }
        if self.unit.trim().is_empty() {
            return Err(HybridError::Validation("SKU request unit is empty".into()));
        }
        Ok(())
    }

    fn wanted_color(&self) -> Option<String> {
        self.color
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_lowercase)
    }
}

/// One phase-1 survivor after phase-2 attribute checks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkuCandidate {
    pub record_id: String,
    pub sku: Option<String>,
    /// Normalized unit code
    pub unit: Option<String>,
    /// Lowercased colour
    pub color: Option<String>,
    pub similarity: f32,
    pub unit_match: bool,
    pub color_match: bool,
    pub overall_match: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkuStatus {
    Resolved,
    /// Phase 1 found nothing above the floor
    NoCandidates,
    /// Candidates found, none matched unit/colour
    NoMatch,
    /// Matches found, none carried a SKU
    NoSku,
}

impl SkuStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Resolved => "resolved",
            Self::NoCandidates => "no_candidates",
            Self::NoMatch => "no_match",
            Self::NoSku => "no_sku",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkuResolution {
    pub sku: Option<String>,
    pub record_id: Option<String>,
    /// Every phase-1 candidate, most similar first
    pub candidates: Vec<SkuCandidate>,
    pub evaluated: usize,
    pub matched: usize,
    pub elapsed: Duration,
    pub status: SkuStatus,
}

fn payload_text(payload: &Value, field: &str) -> Option<String> {
    payload
        .get(field)
        .and_then(value_as_text)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Phase 2: attribute checks, most similar first.
#[must_use]
pub fn evaluate(request: &SkuRequest, hits: &[RawHit]) -> Vec<SkuCandidate> {
    let wanted_unit = normalize_unit(&request.unit);
    let wanted_color = request.wanted_color();

    let mut candidates: Vec<SkuCandidate> = hits
        .iter()
        .map(|hit| {
            let unit = payload_text(&hit.payload, "unit").map(|u| normalize_unit(&u));
            let color = payload_text(&hit.payload, "color").map(|c| c.to_lowercase());
            let unit_match = unit.as_deref().is_some_and(|u| !u.is_empty() && u == wanted_unit);
            let color_match = match (&wanted_color, &color) {
                (None, _) => true,
                (Some(want), Some(have)) => want == have,
                (Some(_), None) => false,
            };
            SkuCandidate {
                record_id: hit.record_id.clone(),
                sku: payload_text(&hit.payload, "sku"),
                unit,
                color,
                similarity: hit.score,
                unit_match,
                color_match,
                overall_match: unit_match && color_match,
            }
        })
        .collect();
    candidates.sort_by(|a, b| {
        b.similarity
            .total_cmp(&a.similarity)
            .then_with(|| a.record_id.cmp(&b.record_id))
    });
    candidates
}

/// Selection over candidates already ordered by [`evaluate`].
#[must_use]
pub fn select(candidates: &[SkuCandidate]) -> (Option<&SkuCandidate>, SkuStatus) {
    if candidates.is_empty() {
        return (None, SkuStatus::NoCandidates);
    }
    let mut matches = candidates.iter().filter(|c| c.overall_match).peekable();
    if matches.peek().is_none() {
        return (None, SkuStatus::NoMatch);
    }
    match matches.find(|c| c.sku.is_some()) {
        Some(chosen) => (Some(chosen), SkuStatus::Resolved),
        None => (None, SkuStatus::NoSku),
    }
}

pub struct SkuResolver {
    orchestrator: Arc<ParallelSearchOrchestrator>,
    vector: Arc<dyn SearchStrategy>,
    cache: Arc<TieredCache>,
    health: Arc<BackendHealthTracker>,
    floor: f32,
    candidate_limit: usize,
    cache_ttl: Duration,
}

impl SkuResolver {
    pub fn new(
        orchestrator: Arc<ParallelSearchOrchestrator>,
        vector: Arc<dyn SearchStrategy>,
        cache: Arc<TieredCache>,
        health: Arc<BackendHealthTracker>,
        floor: f32,
        candidate_limit: usize,
        cache_ttl: Duration,
    ) -> Self {
        Self { orchestrator, vector, cache, health, floor, candidate_limit, cache_ttl }
    }

    pub async fn resolve(&self, request: &SkuRequest) -> Result<SkuResolution, HybridError> {
        request.validate()?;
        let start = Instant::now();

        let hits = self.phase_one(&request.name).await?;
        let candidates = evaluate(request, &hits);
        let (chosen, status) = select(&candidates);
        let sku = chosen.and_then(|c| c.sku.clone());
        let record_id = chosen.map(|c| c.record_id.clone());
        let matched = candidates.iter().filter(|c| c.overall_match).count();
        let elapsed = start.elapsed();

        metrics::record_sku_resolution(status.as_str());
        info!(
            name = %request.name,
            unit = %request.unit,
            status = status.as_str(),
            sku = sku.as_deref().unwrap_or("-"),
            evaluated = candidates.len(),
            matched,
            elapsed_ms = elapsed.as_millis() as u64,
            "SKU resolution finished"
        );

        Ok(SkuResolution {
            sku,
            record_id,
            evaluated: candidates.len(),
            matched,
            candidates,
            elapsed,
            status,
        })
    }

    async fn phase_one(&self, name: &str) -> Result<Vec<RawHit>, HybridError> {
        let key = vector_search_key(name, self.candidate_limit, self.floor);
        if let Some(hits) = self.cache.get::<Vec<RawHit>>(&key).await {
            debug!(key = %key, candidates = hits.len(), "SKU phase 1 served from cache");
            return Ok(hits);
        }

        let start = Instant::now();
        let unavailable = |message: String| {
            let mut errors = BTreeMap::new();
            errors.insert(BackendKind::Vector, message);
            metrics::record_exhaustion("resolve_sku");
            HybridError::AllBackendsUnavailable {
                operation: "resolve_sku".into(),
                errors,
                elapsed: start.elapsed(),
            }
        };

        if !self.health.is_healthy(BackendKind::Vector) {
            let last = self
                .health
                .last_error(BackendKind::Vector)
                .unwrap_or_else(|| "marked unhealthy".to_string());
            return Err(unavailable(format!("skipped: {}", last)));
        }

        let query = SearchQuery::new(name)
            .mode(SearchMode::Vector)
            .limit(self.candidate_limit)
            .threshold(self.floor);
        let round = self
            .orchestrator
            .run(Arc::new(query), std::slice::from_ref(&self.vector))
            .await?;

        let Some(result) = round.results.into_iter().next() else {
            return Ok(Vec::new());
        };
        match result.status {
            StrategyStatus::Completed => {
                self.health.record_success(BackendKind::Vector);
                self.cache.set(&key, &result.hits, self.cache_ttl).await;
                Ok(result.hits)
            }
            StrategyStatus::Failed(e) => {
                self.health.record_failure(BackendKind::Vector, &e);
                Err(unavailable(e))
            }
            StrategyStatus::TimedOut => Err(HybridError::Timeout {
                operation: "resolve_sku".into(),
                elapsed: round.elapsed,
            }),
        }
    }
}
