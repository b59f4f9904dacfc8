// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Per-backend health state.
//!
//! Consulted before every dispatch and updated after every backend call.
//! A single failure marks a backend unavailable and it stays that way
//! (sticky) until a successful call or an explicit probe says otherwise.
//!
//! ```text
//!            record_failure / mark_unavailable / probe(Err)
//!   Healthy ───────────────────────────────────────────▶ Unavailable
//!      ▲  ▲                                                  │
//!      │  └──────────── record_success / probe(Healthy) ─────┘
//!      │
//!      └── probe(Degraded) keeps the backend dispatchable
//! ```

use std::time::{SystemTime, UNIX_EPOCH};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::metrics;
use crate::storage::traits::{BackendError, BackendKind, HealthProbe, HealthStatus};

/// Health record for one backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendHealth {
    pub backend: BackendKind,
    pub healthy: bool,
    pub status: HealthStatus,
    pub last_error: Option<String>,
    /// Epoch millis of the last update (0 = never touched)
    pub last_checked_ms: u64,
    pub consecutive_failures: u64,
}

impl BackendHealth {
    fn initial(backend: BackendKind) -> Self {
        Self {
            backend,
            healthy: true,
            status: HealthStatus::Healthy,
            last_error: None,
            last_checked_ms: 0,
            consecutive_failures: 0,
        }
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_millis() as u64)
}

/// Shared health state, one entry per backend. Untouched backends are
/// assumed healthy.
#[derive(Debug, Default)]
pub struct BackendHealthTracker {
    states: DashMap<BackendKind, BackendHealth>,
}

impl BackendHealthTracker {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_healthy(&self, backend: BackendKind) -> bool {
        self.states.get(&backend).map_or(true, |s| s.healthy)
    }

    #[must_use]
    pub fn get(&self, backend: BackendKind) -> BackendHealth {
        self.states
            .get(&backend)
            .map_or_else(|| BackendHealth::initial(backend), |s| s.clone())
    }

    #[must_use]
    pub fn last_error(&self, backend: BackendKind) -> Option<String> {
        self.states.get(&backend).and_then(|s| s.last_error.clone())
    }

    /// A call against `backend` succeeded.
    pub fn record_success(&self, backend: BackendKind) {
        let mut entry = self
            .states
            .entry(backend)
            .or_insert_with(|| BackendHealth::initial(backend));
        if !entry.healthy {
            info!(backend = %backend, "Backend recovered");
            entry.status = HealthStatus::Healthy;
            entry.last_error = None;
        }
        entry.healthy = true;
        entry.consecutive_failures = 0;
        entry.last_checked_ms = now_ms();
        drop(entry);
        metrics::set_backend_healthy(backend.as_str(), true);
    }

    /// A call against `backend` failed; it is skipped until it recovers.
    pub fn record_failure(&self, backend: BackendKind, error: &str) {
        let mut entry = self
            .states
            .entry(backend)
            .or_insert_with(|| BackendHealth::initial(backend));
        if entry.healthy {
            warn!(backend = %backend, error, "Backend marked unavailable");
        }
        entry.healthy = false;
        entry.status = HealthStatus::Unavailable;
        entry.last_error = Some(error.to_string());
        entry.consecutive_failures += 1;
        entry.last_checked_ms = now_ms();
        drop(entry);
        metrics::set_backend_healthy(backend.as_str(), false);
    }

    /// Operator / test override.
    pub fn mark_unavailable(&self, backend: BackendKind, reason: &str) {
        self.record_failure(backend, reason);
    }

    /// Apply the outcome of a `health_check()` call.
    pub fn probe(&self, backend: BackendKind, result: Result<HealthProbe, BackendError>) {
        match result {
            Ok(probe) => match probe.status {
                HealthStatus::Healthy => self.record_success(backend),
                HealthStatus::Degraded => {
                    let mut entry = self
                        .states
                        .entry(backend)
                        .or_insert_with(|| BackendHealth::initial(backend));
                    if !entry.healthy {
                        info!(
                            backend = %backend,
                            detail = %probe.detail,
                            "Backend recovered (degraded)"
                        );
                    }
                    entry.healthy = true;
                    entry.status = HealthStatus::Degraded;
                    entry.last_error = Some(probe.detail);
                    entry.consecutive_failures = 0;
                    entry.last_checked_ms = now_ms();
                    drop(entry);
                    metrics::set_backend_healthy(backend.as_str(), true);
                }
                HealthStatus::Unavailable => self.record_failure(backend, &probe.detail),
            },
            Err(e) => self.record_failure(backend, &e.to_string()),
        }
    }

    /// Every backend, in `BackendKind` order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<BackendHealth> {
        BackendKind::ALL.iter().map(|k| self.get(*k)).collect()
    }

    /// Forget everything (tests).
    pub fn reset(&self) {
        self.states.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_untouched_backend_is_healthy() {
        let tracker = BackendHealthTracker::new();
        assert!(tracker.is_healthy(BackendKind::Vector));
        let h = tracker.get(BackendKind::Vector);
        assert_eq!(h.status, HealthStatus::Healthy);
        assert_eq!(h.last_checked_ms, 0);
    }

    #[test]
    fn test_failure_is_sticky_until_success() {
        let tracker = BackendHealthTracker::new();
        tracker.record_failure(BackendKind::Relational, "connection refused");
        assert!(!tracker.is_healthy(BackendKind::Relational));
        assert!(!tracker.is_healthy(BackendKind::Relational));
        assert_eq!(
            tracker.last_error(BackendKind::Relational).as_deref(),
            Some("connection refused")
        );

        tracker.record_failure(BackendKind::Relational, "still refused");
        assert_eq!(tracker.get(BackendKind::Relational).consecutive_failures, 2);

        tracker.record_success(BackendKind::Relational);
        let h = tracker.get(BackendKind::Relational);
        assert!(h.healthy);
        assert_eq!(h.consecutive_failures, 0);
        assert!(h.last_error.is_none());
    }

    #[test]
    fn test_probe_outcomes() {
        let tracker = BackendHealthTracker::new();

        tracker.probe(BackendKind::Cache, Err(BackendError::Connection("refused".into())));
        assert!(!tracker.is_healthy(BackendKind::Cache));

        tracker.probe(BackendKind::Cache, Ok(HealthProbe::degraded("high latency")));
        let h = tracker.get(BackendKind::Cache);
        assert!(h.healthy);
        assert_eq!(h.status, HealthStatus::Degraded);

        tracker.probe(BackendKind::Cache, Ok(HealthProbe::healthy("PONG")));
        assert_eq!(tracker.get(BackendKind::Cache).status, HealthStatus::Healthy);
    }

    #[test]
    fn test_snapshot_order_and_reset() {
        let tracker = BackendHealthTracker::new();
        tracker.mark_unavailable(BackendKind::Vector, "forced");

        let snap = tracker.snapshot();
        let kinds: Vec<_> = snap.iter().map(|h| h.backend).collect();
        assert_eq!(kinds, BackendKind::ALL.to_vec());
        assert!(!snap[0].healthy);

        tracker.reset();
        assert!(tracker.is_healthy(BackendKind::Vector));
    }
}
