// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Tiered result/record cache.
//!
//! - [`LocalCache`]: bounded in-process L1 (shared via the registry)
//! - [`TieredCache`]: L1 + distributed L2 with write-through and pattern
//!   invalidation
//! - [`keys`]: deterministic key derivation and glob matching

pub mod keys;
mod l1;
mod tiered;

pub use keys::{glob_match, key_family, material_key, search_key, vector_search_key};
pub use l1::{L1Stats, LocalCache};
pub use tiered::{TierSettings, TieredCache};
