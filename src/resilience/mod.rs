// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Resilience: backend health, ordered fallback, connection retry.

pub mod fallback;
pub mod health;
pub mod retry;

pub use fallback::FallbackCoordinator;
pub use health::{BackendHealth, BackendHealthTracker};
pub use retry::{retry, RetryConfig};
