// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Parallel strategy dispatch.
//!
//! One round per query:
//!
//! ```text
//!  Dispatched ──spawn one task per strategy (each waits for a permit)──▶ Running
//!      │
//!      ▼  await every handle against one shared deadline
//!  ┌──────────────────────────────────────────────────────────┐
//!  │ finished Ok      → Completed(hits, elapsed)              │
//!  │ finished Err     → Failed(error)                         │
//!  │ panicked         → Failed("task panicked: ...")          │
//!  │ deadline passed  → TimedOut, task aborted                │
//!  └──────────────────────────────────────────────────────────┘
//!      │
//!      ▼
//!  Completed | TimedOut   (Err(Timeout) if nothing finished at all)
//! ```
//!
//! The permit pool is process-wide (shared through the registry), so
//! concurrent queries compete for the same slots.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Semaphore;
use tokio::time::timeout_at;
use tracing::{debug, warn};

use super::query::{SearchQuery, StrategyKind};
use super::strategy::{RawHit, SearchStrategy};
use crate::error::HybridError;
use crate::metrics;
use crate::storage::traits::BackendError;

#[derive(Debug, Clone, PartialEq)]
pub enum StrategyStatus {
    Completed,
    Failed(String),
    TimedOut,
}

impl StrategyStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Failed(_) => "failed",
            Self::TimedOut => "timed_out",
        }
    }
}

/// What one strategy produced in one round.
#[derive(Debug, Clone)]
pub struct StrategyResult {
    pub strategy: StrategyKind,
    pub hits: Vec<RawHit>,
    /// Time the strategy itself ran (excludes waiting for a permit). For
    /// panicked and timed-out tasks, time since dispatch.
    pub elapsed: Duration,
    pub status: StrategyStatus,
}

impl StrategyResult {
    #[must_use]
    pub fn completed(strategy: StrategyKind, hits: Vec<RawHit>, elapsed: Duration) -> Self {
        Self { strategy, hits, elapsed, status: StrategyStatus::Completed }
    }

    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.status == StrategyStatus::Completed
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundState {
    /// Every task finished (successfully or not) before the deadline
    Completed,
    /// At least one task was abandoned at the deadline
    TimedOut,
}

#[derive(Debug, Clone)]
pub struct SearchRound {
    pub results: Vec<StrategyResult>,
    pub state: RoundState,
    pub elapsed: Duration,
}

pub struct ParallelSearchOrchestrator {
    permits: Arc<Semaphore>,
    timeout: Duration,
}

impl ParallelSearchOrchestrator {
    pub fn new(permits: Arc<Semaphore>, timeout: Duration) -> Self {
        Self { permits, timeout }
    }

    /// Run every strategy concurrently against one deadline.
    ///
    /// Results come back in the order `strategies` was given.
    pub async fn run(
        &self,
        query: Arc<SearchQuery>,
        strategies: &[Arc<dyn SearchStrategy>],
    ) -> Result<SearchRound, HybridError> {
        let start = Instant::now();
        let deadline = tokio::time::Instant::now() + self.timeout;

        let mut handles = Vec::with_capacity(strategies.len());
        for strategy in strategies {
            let kind = strategy.kind();
            let strategy = Arc::clone(strategy);
            let query = Arc::clone(&query);
            let permits = Arc::clone(&self.permits);
            // elapsed is measured in the task, not when its handle is awaited
            let handle = tokio::spawn(async move {
                let Ok(_permit) = permits.acquire_owned().await else {
                    let closed = BackendError::Connection("search permit pool closed".into());
                    return (Err(closed), Duration::ZERO);
                };
                let t = Instant::now();
                let outcome = strategy.search(&query).await;
                (outcome, t.elapsed())
            });
            handles.push((kind, handle));
        }
        debug!(
            strategies = handles.len(),
            timeout_ms = self.timeout.as_millis() as u64,
            "Round dispatched"
        );

        let mut results = Vec::with_capacity(handles.len());
        for (kind, mut handle) in handles {
            let result = match timeout_at(deadline, &mut handle).await {
                Ok(Ok((Ok(hits), elapsed))) => StrategyResult::completed(kind, hits, elapsed),
                Ok(Ok((Err(e), elapsed))) => {
                    warn!(strategy = %kind, error = %e, "Strategy failed");
                    StrategyResult {
                        strategy: kind,
                        hits: Vec::new(),
                        elapsed,
                        status: StrategyStatus::Failed(e.to_string()),
                    }
                }
                Ok(Err(join_err)) => {
                    warn!(strategy = %kind, error = %join_err, "Strategy task panicked");
                    StrategyResult {
                        strategy: kind,
                        hits: Vec::new(),
                        elapsed: start.elapsed(),
                        status: StrategyStatus::Failed(format!("task panicked: {}", join_err)),
                    }
                }
                Err(_) => {
                    handle.abort();
                    warn!(
                        strategy = %kind,
                        timeout_ms = self.timeout.as_millis() as u64,
                        "Strategy abandoned at deadline"
                    );
                    StrategyResult {
                        strategy: kind,
                        hits: Vec::new(),
                        elapsed: start.elapsed(),
                        status: StrategyStatus::TimedOut,
                    }
                }
            };
            metrics::record_strategy_result(kind.as_str(), result.status.as_str());
            metrics::record_strategy_latency(kind.as_str(), result.elapsed);
            results.push(result);
        }

        let elapsed = start.elapsed();
        let timed_out = results.iter().filter(|r| r.status == StrategyStatus::TimedOut).count();
        if timed_out > 0 {
            metrics::record_round_timeout();
            if timed_out == results.len() {
                return Err(HybridError::Timeout { operation: "search".into(), elapsed });
            }
        }

        let state = if timed_out > 0 { RoundState::TimedOut } else { RoundState::Completed };
        debug!(
            completed = results.iter().filter(|r| r.is_completed()).count(),
            timed_out,
            elapsed_ms = elapsed.as_millis() as u64,
            "Round finished"
        );
        Ok(SearchRound { results, state, elapsed })
    }
}
