// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! L1: bounded in-process TTL map.
//!
//! Entries expire lazily on read. When an insert finds the map at capacity,
//! the oldest-inserted batch is dropped in one go rather than one entry per
//! insert.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::debug;

use super::keys::glob_match;
use crate::metrics;

#[derive(Clone, Debug)]
struct L1Entry {
    value: String,
    expires_at: Instant,
}

/// L1 statistics
#[derive(Debug, Clone, PartialEq)]
pub struct L1Stats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    /// Hit rate (0.0 - 1.0)
    pub hit_rate: f64,
}

/// Process-local cache shared through the registry.
pub struct LocalCache {
    entries: DashMap<String, L1Entry>,
    /// Insertion order for eviction (oldest first)
    order: Mutex<VecDeque<String>>,
    capacity: usize,
    eviction_batch: usize,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl LocalCache {
    pub fn new(capacity: usize, eviction_batch: usize) -> Self {
        Self {
            entries: DashMap::new(),
            order: Mutex::new(VecDeque::new()),
            capacity: capacity.max(1),
            eviction_batch: eviction_batch.clamp(1, capacity.max(1)),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Value and remaining TTL, or `None` if absent or expired.
    pub fn get(&self, key: &str) -> Option<(String, Duration)> {
        let now = Instant::now();
        if let Some(entry) = self.entries.get(key) {
            if entry.expires_at > now {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Some((entry.value.clone(), entry.expires_at - now));
            }
            drop(entry); // release read lock before removing
            self.entries.remove(key);
            self.order.lock().retain(|k| k != key);
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Insert or replace. A zero TTL is a no-op.
    pub fn insert(&self, key: &str, value: String, ttl: Duration) {
        if ttl.is_zero() {
            return;
        }
        let is_new = !self.entries.contains_key(key);
        if is_new && self.entries.len() >= self.capacity {
            self.evict_batch();
        }

        self.entries.insert(
            key.to_string(),
            L1Entry { value, expires_at: Instant::now() + ttl },
        );
        if is_new {
            self.order.lock().push_back(key.to_string());
        }
        metrics::set_l1_entries(self.entries.len());
    }

    fn evict_batch(&self) {
        let mut order = self.order.lock();
        let mut removed = 0;
        while removed < self.eviction_batch {
            let Some(old_key) = order.pop_front() else {
                break;
            };
            if self.entries.remove(&old_key).is_some() {
                removed += 1;
            }
        }
        drop(order);
        if removed > 0 {
            debug!(evicted = removed, capacity = self.capacity, "L1 batch eviction");
            self.evictions.fetch_add(removed as u64, Ordering::Relaxed);
            metrics::record_eviction(removed);
        }
    }

    pub fn remove(&self, key: &str) -> bool {
        let removed = self.entries.remove(key).is_some();
        if removed {
            self.order.lock().retain(|k| k != key);
        }
        removed
    }

    /// Remove every key matching a glob. Returns how many were removed.
    pub fn invalidate(&self, pattern: &str) -> u64 {
        let keys: Vec<String> = self
            .entries
            .iter()
            .filter(|e| glob_match(pattern, e.key()))
            .map(|e| e.key().clone())
            .collect();
        for key in &keys {
            self.entries.remove(key);
        }
        if !keys.is_empty() {
            self.order.lock().retain(|k| self.entries.contains_key(k));
            metrics::set_l1_entries(self.entries.len());
        }
        keys.len() as u64
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&self) {
        self.entries.clear();
        self.order.lock().clear();
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        self.evictions.store(0, Ordering::Relaxed);
    }

    pub fn stats(&self) -> L1Stats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        L1Stats {
            entries: self.entries.len(),
            hits,
            misses,
            evictions: self.evictions.load(Ordering::Relaxed),
            hit_rate: if total > 0 { hits as f64 / total as f64 } else { 0.0 },
        }
    }
}
