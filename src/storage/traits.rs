// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Capability interfaces for the external stores.
//!
//! Every adapter (Redis, SQL, in-memory, no-op) and every test double
//! implements one of these traits. The engine only ever talks to
//! `Arc<dyn VectorBackend>`, `Arc<dyn RelationalBackend>`,
//! `Arc<dyn DistributedCache>` and `Arc<dyn Embedder>`.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::search::{Filter, SqlParam};

/// A relational row, column name → JSON value.
pub type Row = serde_json::Map<String, serde_json::Value>;

/// Error returned by a single backend call.
///
/// These never reach the caller directly: the orchestrator and the
/// fallback coordinator turn them into health updates and, on exhaustion,
/// into [`crate::HybridError`].
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BackendError {
    #[error("connection failed: {0}")]
    Connection(String),
    #[error("query rejected: {0}")]
    Query(String),
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),
    #[error("backend disabled: {0}")]
    Disabled(String),
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Identity of an external store, used as the key of health state and
/// of the per-backend error map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    Vector,
    Relational,
    Cache,
}

impl BackendKind {
    pub const ALL: [BackendKind; 3] =
        [BackendKind::Vector, BackendKind::Relational, BackendKind::Cache];

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Vector => "vector",
            Self::Relational => "relational",
            Self::Cache => "cache",
        }
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Health level reported by a probe or derived from call outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    /// Serving normally
    Healthy,
    /// Serving, but the probe reported a problem (still dispatched to)
    Degraded,
    /// Not dispatched to until the next successful probe
    Unavailable,
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Healthy => write!(f, "healthy"),
            Self::Degraded => write!(f, "degraded"),
            Self::Unavailable => write!(f, "unavailable"),
        }
    }
}

/// Result of a `health_check()` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthProbe {
    pub status: HealthStatus,
    pub detail: String,
}

impl HealthProbe {
    pub fn healthy(detail: impl Into<String>) -> Self {
        Self { status: HealthStatus::Healthy, detail: detail.into() }
    }

    pub fn degraded(detail: impl Into<String>) -> Self {
        Self { status: HealthStatus::Degraded, detail: detail.into() }
    }
}

/// A stored embedding plus its payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorPoint {
    pub id: String,
    pub vector: Vec<f32>,
    pub payload: serde_json::Value,
}

/// One hit from a vector similarity search. `score` is in `[0, 1]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorHit {
    pub id: String,
    pub score: f32,
    pub payload: serde_json::Value,
}

/// A cached value with the TTL it has left, if the store knows it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedValue {
    pub value: String,
    pub ttl_remaining: Option<Duration>,
}

#[async_trait]
pub trait VectorBackend: Send + Sync {
    async fn search(
        &self,
        collection: &str,
        vector: &[f32],
        limit: usize,
        filter: &[Filter],
    ) -> Result<Vec<VectorHit>, BackendError>;

    async fn upsert(
        &self,
        collection: &str,
        points: Vec<VectorPoint>,
    ) -> Result<usize, BackendError>;

    async fn delete(&self, collection: &str, ids: &[String]) -> Result<usize, BackendError>;

    async fn get_by_id(
        &self,
        collection: &str,
        id: &str,
    ) -> Result<Option<VectorPoint>, BackendError>;

    /// Number of points in the collection.
    async fn count(&self, collection: &str) -> Result<u64, BackendError>;

    async fn health_check(&self) -> Result<HealthProbe, BackendError>;
}

/// An open relational transaction. Dropping it without `commit` rolls back.
#[async_trait]
pub trait RelationalTransaction: Send {
    async fn execute(&mut self, sql: &str, params: &[SqlParam]) -> Result<u64, BackendError>;
    async fn commit(self: Box<Self>) -> Result<(), BackendError>;
    async fn rollback(self: Box<Self>) -> Result<(), BackendError>;
}

#[async_trait]
pub trait RelationalBackend: Send + Sync {
    async fn query(&self, sql: &str, params: &[SqlParam]) -> Result<Vec<Row>, BackendError>;

    /// Returns the number of affected rows.
    async fn execute(&self, sql: &str, params: &[SqlParam]) -> Result<u64, BackendError>;

    async fn begin_transaction(&self) -> Result<Box<dyn RelationalTransaction>, BackendError>;

    async fn health_check(&self) -> Result<HealthProbe, BackendError>;
}

#[async_trait]
pub trait DistributedCache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<CachedValue>, BackendError>;

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), BackendError>;

    async fn delete(&self, key: &str) -> Result<(), BackendError>;

    /// Keys matching a glob (`*`, `?`).
    async fn scan_pattern(&self, pattern: &str) -> Result<Vec<String>, BackendError>;

    /// Delete every key matching a glob. Returns the number deleted.
    /// Default implementation scans, then deletes key by key.
    async fn delete_pattern(&self, pattern: &str) -> Result<u64, BackendError> {
        let keys = self.scan_pattern(pattern).await?;
        for key in &keys {
            self.delete(key).await?;
        }
        Ok(keys.len() as u64)
    }

    async fn health_check(&self) -> Result<HealthProbe, BackendError>;
}

/// Text embedding provider.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, BackendError>;

    /// Default implementation calls `embed` in a loop.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, BackendError> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text).await?);
        }
        Ok(out)
    }

    /// Dimensionality of the produced vectors (constant per instance).
    fn dimension(&self) -> usize;
}
