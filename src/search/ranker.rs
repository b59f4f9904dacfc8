// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Confidence-weighted fusion of per-strategy results.
//!
//! For a record found by strategies `S`:
//!
//! ```text
//! m_s    = time_factor(elapsed_s) × type_factor(s, raw_s)
//! eff_s  = (base_weight_s / Σ base_weight over dispatched) × m_s
//! base   = Σ eff_s × raw_s / Σ eff_s
//! bonus  = min(per_extra × (|S| - 1), max_bonus)
//! score  = min(1, max(base × (1 + bonus), max_s raw_s))
//! ```
//!
//! | Factor | Condition | Value |
//! |--------|-----------|-------|
//! | time | elapsed < fast threshold | 1.1 |
//! | time | elapsed > slow threshold | 0.9 |
//! | type | vector, raw ≥ 0.8 | 1.1 |
//! | type | relational, raw ≥ 0.95 | 1.05 |
//!
//! The floor at the best raw score means agreement never ranks a record
//! below what its strongest strategy alone would give it.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::orchestrator::StrategyResult;
use super::query::StrategyKind;
use crate::config::HybridSearchConfig;

const FAST_FACTOR: f32 = 1.1;
const SLOW_FACTOR: f32 = 0.9;
const VECTOR_STRONG_RAW: f32 = 0.8;
const VECTOR_STRONG_FACTOR: f32 = 1.1;
const RELATIONAL_EXACT_RAW: f32 = 0.95;
const RELATIONAL_EXACT_FACTOR: f32 = 1.05;

/// A deduplicated, scored record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusedCandidate {
    pub record_id: String,
    /// Fused score in `[0, 1]`
    pub score: f32,
    pub strategies: BTreeSet<StrategyKind>,
    /// Best per-strategy confidence, in `[0, 1]`
    pub confidence: f32,
    pub payload: Value,
}

#[derive(Debug, Clone)]
pub struct RankerSettings {
    pub weights: BTreeMap<StrategyKind, f32>,
    pub fast: Duration,
    pub slow: Duration,
    pub bonus_per_extra: f32,
    pub max_bonus: f32,
}

impl RankerSettings {
    pub fn from_config(config: &HybridSearchConfig) -> Self {
        let weights = [StrategyKind::Vector, StrategyKind::Relational, StrategyKind::Fuzzy]
            .into_iter()
            .map(|s| (s, config.weight(s)))
            .collect();
        Self {
            weights,
            fast: Duration::from_millis(config.fast_strategy_ms),
            slow: Duration::from_millis(config.slow_strategy_ms),
            bonus_per_extra: config.multi_strategy_bonus,
            max_bonus: config.max_multi_strategy_bonus,
        }
    }
}

impl Default for RankerSettings {
    fn default() -> Self {
        Self::from_config(&HybridSearchConfig::default())
    }
}

struct Contribution {
    raw: f32,
    multiplier: f32,
    weight: f32,
}

pub struct ConfidenceRanker {
    settings: RankerSettings,
}

impl ConfidenceRanker {
    pub fn new(settings: RankerSettings) -> Self {
        Self { settings }
    }

    fn time_factor(&self, elapsed: Duration) -> f32 {
        if elapsed < self.settings.fast {
            FAST_FACTOR
        } else if elapsed > self.settings.slow {
            SLOW_FACTOR
        } else {
            1.0
        }
    }

    fn type_factor(strategy: StrategyKind, raw: f32) -> f32 {
        match strategy {
            StrategyKind::Vector if raw >= VECTOR_STRONG_RAW => VECTOR_STRONG_FACTOR,
            StrategyKind::Relational if raw >= RELATIONAL_EXACT_RAW => RELATIONAL_EXACT_FACTOR,
            _ => 1.0,
        }
    }

    /// Merge every result of a round into one list, best first, ties by
    /// record id. Results that did not complete contribute nothing but
    /// still count towards weight normalization.
    pub fn fuse(&self, results: &[StrategyResult]) -> Vec<FusedCandidate> {
        let dispatched: BTreeSet<StrategyKind> = results.iter().map(|r| r.strategy).collect();
        let weight_total: f32 = dispatched
            .iter()
            .map(|s| self.settings.weights.get(s).copied().unwrap_or(0.0))
            .sum();

        // record → strategy → best contribution
        let mut grouped: BTreeMap<&str, BTreeMap<StrategyKind, (Contribution, &Value)>> =
            BTreeMap::new();
        for result in results.iter().filter(|r| r.is_completed()) {
            let time = self.time_factor(result.elapsed);
            let base = self.settings.weights.get(&result.strategy).copied().unwrap_or(0.0);
            let weight = if weight_total > 0.0 { base / weight_total } else { 0.0 };

            for hit in &result.hits {
                let raw = hit.score.clamp(0.0, 1.0);
                let contribution = Contribution {
                    raw,
                    multiplier: time * Self::type_factor(result.strategy, raw),
                    weight,
                };
                let per_record = grouped.entry(hit.record_id.as_str()).or_default();
                let better = per_record
                    .get(&result.strategy)
                    .map_or(true, |(existing, _)| raw > existing.raw);
                if better {
                    per_record.insert(result.strategy, (contribution, &hit.payload));
                }
            }
        }

        let mut fused: Vec<FusedCandidate> = grouped
            .into_iter()
            .map(|(record_id, by_strategy)| self.score_record(record_id, by_strategy))
            .collect();
        fused.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.record_id.cmp(&b.record_id))
        });
        fused
    }

    fn score_record(
        &self,
        record_id: &str,
        by_strategy: BTreeMap<StrategyKind, (Contribution, &Value)>,
    ) -> FusedCandidate {
        let mut eff_sum = 0.0f32;
        let mut weighted = 0.0f32;
        let mut best_raw = 0.0f32;
        let mut confidence = 0.0f32;
        let mut payload = Value::Null;

        for (contribution, hit_payload) in by_strategy.values() {
            let eff = contribution.weight * contribution.multiplier;
            eff_sum += eff;
            weighted += eff * contribution.raw;
            best_raw = best_raw.max(contribution.raw);
            confidence = confidence.max((contribution.raw * contribution.multiplier).min(1.0));
            if payload.is_null() && !hit_payload.is_null() {
                payload = (*hit_payload).clone();
            }
        }

        let base = if eff_sum > 0.0 { weighted / eff_sum } else { best_raw };
        let extra = by_strategy.len().saturating_sub(1) as f32;
        let bonus = (self.settings.bonus_per_extra * extra).min(self.settings.max_bonus);
        let score = (base * (1.0 + bonus)).max(best_raw).clamp(0.0, 1.0);

        FusedCandidate {
            record_id: record_id.to_string(),
            score,
            strategies: by_strategy.keys().copied().collect(),
            confidence,
            payload,
        }
    }
}
