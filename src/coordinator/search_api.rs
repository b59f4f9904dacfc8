//! Search API for HybridSearchEngine
//!
//! # Architecture
//!
//! ```text
//! search(query)
//!       │
//!       ├─→ validate (never retried)
//!       │
//!       ├─→ TieredCache  search:<sha256>
//!       │        └─→ Hit? Return (source = cache)
//!       │
//!       ├─→ hybrid: skip strategies on unhealthy backends,
//!       │           run the rest in one orchestrated round
//!       │
//!       ├─→ single: FallbackCoordinator over the backend chain
//!       │           (requested strategy first, then the other backends)
//!       │
//!       └─→ ConfidenceRanker → sort → page → cache (complete rounds only)
//! ```

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;
use tracing::{debug, error};

use crate::cache::search_key;
use crate::error::HybridError;
use crate::metrics::{self, LatencyTimer};
use crate::search::{
    FusedCandidate, RoundState, SearchQuery, SearchStrategy, SortSpec, StrategyKind,
    StrategyResult, StrategyStatus,
};
use crate::storage::traits::{BackendError, BackendKind};

use super::types::{ResultSource, SearchResponse, StrategyReport};
use super::HybridSearchEngine;

/// What a round (hybrid or single-mode) handed to the ranker.
struct RoundOutcome {
    results: Vec<StrategyResult>,
    reports: Vec<StrategyReport>,
    /// Every dispatched strategy completed and nothing was skipped; only
    /// complete rounds are cached
    complete: bool,
}

impl HybridSearchEngine {
    // ═══════════════════════════════════════════════════════════════════════════
    // Search API
    // ═══════════════════════════════════════════════════════════════════════════

    /// Run a catalog search.
    ///
    /// Partial backend failure is absorbed: the response carries whatever
    /// the surviving strategies found. Only when every backend is skipped
    /// or fails does this return [`HybridError::AllBackendsUnavailable`].
    /// An empty result set is a successful response.
    #[tracing::instrument(skip(self, query), fields(mode = query.mode.as_str(), source))]
    pub async fn search(&self, query: SearchQuery) -> Result<SearchResponse, HybridError> {
        query.validate()?;
        let _timer = LatencyTimer::new("search");
        let start = Instant::now();
        let mode = query.mode.as_str();

        let key = search_key(&query);
        if let Some(mut cached) = self.cache.get::<SearchResponse>(&key).await {
            cached.source = ResultSource::Cache;
            cached.elapsed = start.elapsed();
            tracing::Span::current().record("source", "cache");
            metrics::record_search(mode, ResultSource::Cache.as_str());
            return Ok(cached);
        }

        let query = Arc::new(query);
        let outcome = match query.mode.single() {
            Some(kind) => self.search_single(kind, &query).await?,
            None => self.search_hybrid(&query).await?,
        };

        let mut fused = self.ranker.fuse(&outcome.results);
        if let Some(sort) = &query.sort {
            sort_candidates(&mut fused, sort);
        }
        let total = fused.len();
        let candidates: Vec<FusedCandidate> = fused
            .into_iter()
            .skip(query.page.saturating_mul(query.limit))
            .take(query.limit)
            .collect();

        let response = SearchResponse {
            candidates,
            total,
            page: query.page,
            source: ResultSource::Live,
            strategies: outcome.reports,
            elapsed: start.elapsed(),
        };

        if outcome.complete {
            self.cache.set(&key, &response, self.config.search_cache_ttl()).await;
        } else {
            debug!(key = %key, "Partial round, response not cached");
        }

        tracing::Span::current().record("source", "live");
        metrics::record_search(mode, ResultSource::Live.as_str());
        metrics::record_search_results(total);
        debug!(
            total,
            returned = response.candidates.len(),
            elapsed_ms = response.elapsed.as_millis() as u64,
            "Search finished"
        );
        Ok(response)
    }

    /// All enabled strategies whose backend is healthy, in one round.
    async fn search_hybrid(&self, query: &Arc<SearchQuery>) -> Result<RoundOutcome, HybridError> {
        let start = Instant::now();
        let health = self.health();
        let mut errors: BTreeMap<BackendKind, String> = BTreeMap::new();
        let mut reports = Vec::new();
        let mut dispatch: Vec<Arc<dyn SearchStrategy>> = Vec::new();

        for (kind, strategy) in &self.strategies {
            let backend = kind.backend();
            if health.is_healthy(backend) {
                dispatch.push(Arc::clone(strategy));
                continue;
            }
            let reason = format!(
                "skipped: {}",
                health.last_error(backend).unwrap_or_else(|| "marked unhealthy".to_string())
            );
            debug!(strategy = %kind, backend = %backend, "Skipping strategy on unhealthy backend");
            metrics::record_fallback("search", backend.as_str(), "skipped");
            reports.push(StrategyReport::skipped(*kind, reason.clone()));
            errors.entry(backend).or_insert(reason);
        }

        if dispatch.is_empty() {
            return Err(self.exhausted("search", errors, start));
        }

        let round = self.orchestrator.run(Arc::clone(query), &dispatch).await?;

        // backend → (served anything, first failure)
        let mut verdicts: BTreeMap<BackendKind, (bool, Option<String>)> = BTreeMap::new();
        for result in &round.results {
            let verdict = verdicts.entry(result.strategy.backend()).or_insert((false, None));
            match &result.status {
                StrategyStatus::Completed => verdict.0 = true,
                StrategyStatus::Failed(e) => {
                    verdict.1.get_or_insert_with(|| e.clone());
                }
                StrategyStatus::TimedOut => {}
            }
        }
        for (backend, (served, failure)) in verdicts {
            if served {
                health.record_success(backend);
            } else if let Some(message) = failure {
                health.record_failure(backend, &message);
                errors.insert(backend, message);
            } else {
                errors.insert(backend, "timed out".to_string());
            }
        }

        reports.extend(round.results.iter().map(StrategyReport::from_result));
        reports.sort_by_key(|r| r.strategy);

        if !round.results.iter().any(StrategyResult::is_completed) {
            return Err(self.exhausted("search", errors, start));
        }

        // a backend can be healthy while one of its strategies failed
        let complete = errors.is_empty()
            && round.state == RoundState::Completed
            && round.results.iter().all(StrategyResult::is_completed);
        Ok(RoundOutcome { results: round.results, reports, complete })
    }

    /// One strategy, falling back across backends in chain order.
    async fn search_single(
        &self,
        kind: StrategyKind,
        query: &Arc<SearchQuery>,
    ) -> Result<RoundOutcome, HybridError> {
        let chain = self.fallback_chain(kind);
        let Some(primary) = chain.first().map(|s| s.kind().backend()) else {
            return Err(HybridError::Validation(format!("{kind} search is disabled")));
        };
        let backends: Vec<BackendKind> = chain.iter().map(|s| s.kind().backend()).collect();
        let orchestrator = &self.orchestrator;
        let timeout = self.config.search_timeout();

        let (result, served_by) = self
            .fallback
            .execute("search", &backends, |backend| {
                let strategy = chain.iter().find(|s| s.kind().backend() == backend).cloned();
                let query = Arc::clone(query);
                async move {
                    let strategy = strategy.ok_or_else(|| {
                        BackendError::Disabled(format!("no strategy for {backend}"))
                    })?;
                    let round = orchestrator
                        .run(query, std::slice::from_ref(&strategy))
                        .await
                        .map_err(|e| match e {
                            HybridError::Timeout { elapsed, .. } => BackendError::Timeout(elapsed),
                            other => BackendError::Query(other.to_string()),
                        })?;
                    let result = round
                        .results
                        .into_iter()
                        .next()
                        .ok_or_else(|| BackendError::Query("empty round".into()))?;
                    match &result.status {
                        StrategyStatus::Completed => Ok(result),
                        StrategyStatus::Failed(e) => Err(BackendError::Query(e.clone())),
                        StrategyStatus::TimedOut => Err(BackendError::Timeout(timeout)),
                    }
                }
            })
            .await?;

        Ok(RoundOutcome {
            reports: vec![StrategyReport::from_result(&result)],
            results: vec![result],
            complete: served_by == primary,
        })
    }

    /// Requested strategy first (when enabled), then, with fallback on,
    /// one enabled strategy per remaining backend in canonical order.
    fn fallback_chain(&self, kind: StrategyKind) -> Vec<Arc<dyn SearchStrategy>> {
        let mut chain: Vec<Arc<dyn SearchStrategy>> = Vec::new();
        if let Some(strategy) = self.strategies.get(&kind) {
            chain.push(Arc::clone(strategy));
        }
        if !self.config.fallback_enabled {
            return chain;
        }
        for (other, strategy) in &self.strategies {
            if chain.iter().all(|s| s.kind().backend() != other.backend()) {
                chain.push(Arc::clone(strategy));
            }
        }
        chain
    }

    pub(super) fn exhausted(
        &self,
        operation: &str,
        errors: BTreeMap<BackendKind, String>,
        start: Instant,
    ) -> HybridError {
        let elapsed = start.elapsed();
        error!(
            operation,
            backends = errors.len(),
            elapsed_ms = elapsed.as_millis() as u64,
            "All backends unavailable"
        );
        metrics::record_exhaustion(operation);
        HybridError::AllBackendsUnavailable { operation: operation.to_string(), errors, elapsed }
    }
}

#[derive(Debug, PartialEq)]
enum SortKey {
    Number(f64),
    Text(String),
}

fn sort_key(payload: &Value, field: &str) -> Option<SortKey> {
    match payload.get(field)? {
        Value::Number(n) => n.as_f64().map(SortKey::Number),
        Value::String(s) => Some(SortKey::Text(s.to_lowercase())),
        Value::Bool(b) => Some(SortKey::Number(if *b { 1.0 } else { 0.0 })),
        _ => None,
    }
}

fn compare_keys(a: &SortKey, b: &SortKey) -> Ordering {
    match (a, b) {
        (SortKey::Number(x), SortKey::Number(y)) => x.total_cmp(y),
        (SortKey::Text(x), SortKey::Text(y)) => x.cmp(y),
        (SortKey::Number(_), SortKey::Text(_)) => Ordering::Less,
        (SortKey::Text(_), SortKey::Number(_)) => Ordering::Greater,
    }
}

/// Stable re-sort by a payload field. Missing values go last in either
/// direction; equal keys keep fused order.
fn sort_candidates(candidates: &mut [FusedCandidate], sort: &SortSpec) {
    candidates.sort_by(|a, b| {
        match (sort_key(&a.payload, &sort.field), sort_key(&b.payload, &sort.field)) {
            (Some(x), Some(y)) => {
                let ord = compare_keys(&x, &y);
                if sort.descending {
                    ord.reverse()
                } else {
                    ord
                }
            }
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        }
    });
}
