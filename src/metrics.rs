// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Metrics instrumentation for catalog-search.
//!
//! Uses the `metrics` crate for backend-agnostic metrics collection.
//! The host application is responsible for choosing the exporter (Prometheus, OTEL, etc.)
//!
//! # Metric Naming Convention
//! - `catalog_search_` prefix for all metrics
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Labels
//! - `strategy`: vector, relational, fuzzy
//! - `backend`: vector, relational, cache
//! - `tier`: L1, L2
//! - `status` / `outcome`: completed, failed, timed_out, success, error, skipped

use std::time::{Duration, Instant};

use metrics::{counter, gauge, histogram};

// ═══════════════════════════════════════════════════════════════════════════
// SEARCH - Orchestrator and ranker
// ═══════════════════════════════════════════════════════════════════════════

/// Record the outcome of one strategy task
pub fn record_strategy_result(strategy: &str, status: &str) {
    counter!(
        "catalog_search_strategy_total",
        "strategy" => strategy.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record strategy latency
pub fn record_strategy_latency(strategy: &str, duration: Duration) {
    histogram!(
        "catalog_search_strategy_seconds",
        "strategy" => strategy.to_string()
    )
    .record(duration.as_secs_f64());
}

/// Record a search request by mode and how it was answered
pub fn record_search(mode: &str, source: &str) {
    counter!(
        "catalog_search_requests_total",
        "mode" => mode.to_string(),
        "source" => source.to_string()
    )
    .increment(1);
}

/// Record fused result count
pub fn record_search_results(count: usize) {
    histogram!("catalog_search_results").record(count as f64);
}

/// Record a round that hit its deadline with at least one task still running
pub fn record_round_timeout() {
    counter!("catalog_search_round_timeouts_total").increment(1);
}

/// Record end-to-end operation latency
pub fn record_latency(operation: &str, duration: Duration) {
    histogram!(
        "catalog_search_operation_seconds",
        "operation" => operation.to_string()
    )
    .record(duration.as_secs_f64());
}

// ═══════════════════════════════════════════════════════════════════════════
// CACHE - L1 / L2
// ═══════════════════════════════════════════════════════════════════════════

/// Record a cache lookup (hit/miss) per tier
pub fn record_cache(tier: &str, hit: bool) {
    counter!(
        "catalog_search_cache_total",
        "tier" => tier.to_string(),
        "result" => if hit { "hit" } else { "miss" }
    )
    .increment(1);
}

/// Record an absorbed cache error (operation degraded to a miss / no-op)
pub fn record_cache_error(tier: &str, operation: &str) {
    counter!(
        "catalog_search_cache_errors_total",
        "tier" => tier.to_string(),
        "operation" => operation.to_string()
    )
    .increment(1);
}

/// Record L1 batch eviction
pub fn record_eviction(count: usize) {
    counter!("catalog_search_l1_evictions_total").increment(count as u64);
}

/// Set current L1 entry count
pub fn set_l1_entries(count: usize) {
    gauge!("catalog_search_l1_entries").set(count as f64);
}

/// Record an invalidation and how many entries it removed, labeled by
/// key family (`search`, `vector_search`, `material`, `health`)
pub fn record_invalidation(family: &'static str, removed: u64) {
    counter!("catalog_search_invalidated_total", "family" => family).increment(removed);
}

// ═══════════════════════════════════════════════════════════════════════════
// RESILIENCE - Health and fallback
// ═══════════════════════════════════════════════════════════════════════════

/// Set backend health status (1 = healthy, 0 = unhealthy)
pub fn set_backend_healthy(backend: &str, healthy: bool) {
    gauge!(
        "catalog_search_backend_healthy",
        "backend" => backend.to_string()
    )
    .set(if healthy { 1.0 } else { 0.0 });
}

/// Record one step of a fallback chain
pub fn record_fallback(operation: &str, backend: &str, outcome: &str) {
    counter!(
        "catalog_search_fallback_total",
        "operation" => operation.to_string(),
        "backend" => backend.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// Record a fallback chain where every backend failed or was skipped
pub fn record_exhaustion(operation: &str) {
    counter!(
        "catalog_search_exhausted_total",
        "operation" => operation.to_string()
    )
    .increment(1);
}

// ═══════════════════════════════════════════════════════════════════════════
// SKU
// ═══════════════════════════════════════════════════════════════════════════

/// Record a SKU resolution outcome
pub fn record_sku_resolution(status: &str) {
    counter!(
        "catalog_search_sku_resolutions_total",
        "status" => status.to_string()
    )
    .increment(1);
}

/// A timing guard that records latency on drop
pub struct LatencyTimer {
    operation: &'static str,
    start: Instant,
}

impl LatencyTimer {
    /// Start a new latency timer
    pub fn new(operation: &'static str) -> Self {
        Self {
            operation,
            start: Instant::now(),
        }
    }
}

impl Drop for LatencyTimer {
    fn drop(&mut self) {
        record_latency(self.operation, self.start.elapsed());
    }
}
