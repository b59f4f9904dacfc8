// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Backend capability traits and their adapters.

pub mod embedding;
pub mod memory;
pub mod redis;
pub mod sql;
pub mod traits;

pub use embedding::HashEmbedder;
pub use memory::{DisabledRelational, InMemoryCache, InMemoryVectorStore, NoopCache};
pub use redis::RedisCache;
pub use sql::SqlBackend;
pub use traits::{
    BackendError, BackendKind, CachedValue, DistributedCache, Embedder, HealthProbe, HealthStatus,
    RelationalBackend, RelationalTransaction, Row, VectorBackend, VectorHit, VectorPoint,
};
