// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Caller-visible error taxonomy.
//!
//! Single-strategy and single-backend failures are absorbed inside the
//! engine. What reaches the caller is one of:
//!
//! | Variant | Meaning | Retried? |
//! |---------|---------|----------|
//! | `Configuration` | bad settings, fatal at construction | no |
//! | `Connection` | backend unreachable | via fallback |
//! | `Query` | backend rejected a well-formed request | via fallback |
//! | `Timeout` | round deadline exceeded before anything finished | no |
//! | `AllBackendsUnavailable` | every backend in a chain failed or was skipped | no |
//! | `Validation` | malformed request, rejected before dispatch | never |

use std::collections::BTreeMap;
use std::time::Duration;

use thiserror::Error;

use crate::storage::traits::{BackendError, BackendKind};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum HybridError {
    #[error("invalid configuration: {0}")]
    Configuration(String),

    #[error("{backend} backend unreachable: {message}")]
    Connection { backend: BackendKind, message: String },

    #[error("{backend} backend rejected query: {message}")]
    Query { backend: BackendKind, message: String },

    #[error("'{operation}' timed out after {elapsed:?}")]
    Timeout { operation: String, elapsed: Duration },

    #[error("all backends unavailable for '{operation}' after {elapsed:?}: {}", format_backend_errors(.errors))]
    AllBackendsUnavailable {
        operation: String,
        errors: BTreeMap<BackendKind, String>,
        elapsed: Duration,
    },

    #[error("invalid request: {0}")]
    Validation(String),
}

impl HybridError {
    /// Wrap a backend-level error for a caller that talked to exactly one backend.
    pub fn from_backend(backend: BackendKind, err: BackendError) -> Self {
        match err {
            BackendError::Query(message) | BackendError::Serialization(message) => {
                Self::Query { backend, message }
            }
            other => Self::Connection { backend, message: other.to_string() },
        }
    }

    /// True when the caller could not tell whether anything matched
    /// (as opposed to a malformed request).
    #[must_use]
    pub fn is_availability_error(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. } | Self::Timeout { .. } | Self::AllBackendsUnavailable { .. }
        )
    }

    /// Per-backend errors, empty for variants that do not carry them.
    #[must_use]
    pub fn backend_errors(&self) -> Option<&BTreeMap<BackendKind, String>> {
        match self {
            Self::AllBackendsUnavailable { errors, .. } => Some(errors),
            _ => None,
        }
    }
}

fn format_backend_errors(errors: &BTreeMap<BackendKind, String>) -> String {
    errors
        .iter()
        .map(|(backend, msg)| format!("{}: {}", backend, msg))
        .collect::<Vec<_>>()
        .join("; ")
}
