// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Ordered backend fallback.
//!
//! ```text
//! for backend in chain:
//!     unhealthy?  → record "skipped: <last error>", next
//!     call        → Ok  → mark healthy, return (value, backend)
//!                 → Err → record error, mark unhealthy, next
//! all skipped/failed → AllBackendsUnavailable { one entry per backend }
//! ```

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, error, warn};

use super::health::BackendHealthTracker;
use crate::error::HybridError;
use crate::metrics;
use crate::storage::traits::{BackendError, BackendKind};

/// Tries an operation against an ordered list of backends.
#[derive(Debug, Clone)]
pub struct FallbackCoordinator {
    health: Arc<BackendHealthTracker>,
}

impl FallbackCoordinator {
    pub fn new(health: Arc<BackendHealthTracker>) -> Self {
        Self { health }
    }

    #[must_use]
    pub fn health(&self) -> &Arc<BackendHealthTracker> {
        &self.health
    }

    /// Run `op` against each backend in `chain` until one succeeds.
    ///
    /// Returns the value and the backend that produced it. A backend
    /// already marked unhealthy is not invoked.
    pub async fn execute<T, F, Fut>(
        &self,
        operation: &str,
        chain: &[BackendKind],
        mut op: F,
    ) -> Result<(T, BackendKind), HybridError>
    where
        F: FnMut(BackendKind) -> Fut,
        Fut: Future<Output = Result<T, BackendError>>,
    {
        let start = Instant::now();
        let mut errors = BTreeMap::new();

        for &backend in chain {
            if !self.health.is_healthy(backend) {
                let last = self
                    .health
                    .last_error(backend)
                    .unwrap_or_else(|| "marked unhealthy".to_string());
                debug!(operation, backend = %backend, "Skipping unhealthy backend");
                metrics::record_fallback(operation, backend.as_str(), "skipped");
                errors.insert(backend, format!("skipped: {}", last));
                continue;
            }

            match op(backend).await {
                Ok(value) => {
                    self.health.record_success(backend);
                    metrics::record_fallback(operation, backend.as_str(), "success");
                    if !errors.is_empty() {
                        debug!(operation, backend = %backend, "Served by fallback backend");
                    }
                    return Ok((value, backend));
                }
                Err(e) => {
                    warn!(
                        operation,
                        backend = %backend,
                        error = %e,
                        "Backend call failed, trying next"
                    );
                    metrics::record_fallback(operation, backend.as_str(), "error");
                    let message = e.to_string();
                    self.health.record_failure(backend, &message);
                    errors.insert(backend, message);
                }
            }
        }

        let elapsed = start.elapsed();
        error!(
            operation,
            backends = errors.len(),
            elapsed_ms = elapsed.as_millis() as u64,
            "All backends unavailable"
        );
        metrics::record_exhaustion(operation);
        Err(HybridError::AllBackendsUnavailable {
            operation: operation.to_string(),
            errors,
            elapsed,
        })
    }
}
