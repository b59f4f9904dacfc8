// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! The three lookup strategies.
//!
//! Each strategy turns a [`SearchQuery`] into raw hits on its own score
//! scale in `[0, 1]`. Scales are not comparable across strategies; the
//! ranker reconciles them.
//!
//! | Strategy | Backend | Raw score |
//! |----------|---------|-----------|
//! | vector | vector store | cosine similarity mapped to `[0, 1]` |
//! | relational | SQL `LIKE` | backend `score` column, else lexical tiers |
//! | fuzzy | SQL candidates | trigram similarity computed in-process |

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::fuzzy;
use super::query::{value_as_text, SearchQuery, StrategyKind};
use super::sql_translator::{SqlQuery, SqlTranslator};
use crate::cache::keys::normalize_text;
use crate::storage::traits::{BackendError, Embedder, RelationalBackend, Row, VectorBackend};

/// Columns the text predicates look at.
pub const TEXT_COLUMNS: [&str; 3] = ["name", "sku", "category"];

/// Upper bound on rows pulled from SQL for in-process scoring.
const MAX_CANDIDATE_ROWS: usize = 500;

/// One hit on a strategy's own scale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawHit {
    pub record_id: String,
    pub score: f32,
    pub payload: Value,
}

#[async_trait]
pub trait SearchStrategy: Send + Sync {
    fn kind(&self) -> StrategyKind;

    /// Hits at or above the effective threshold, best first, at most
    /// `query.fetch_limit()` of them.
    async fn search(&self, query: &SearchQuery) -> Result<Vec<RawHit>, BackendError>;
}

fn finish(mut hits: Vec<RawHit>, limit: usize) -> Vec<RawHit> {
    hits.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| a.record_id.cmp(&b.record_id))
    });
    hits.truncate(limit);
    hits
}

fn row_hit(mut row: Row, score: f32) -> Option<RawHit> {
    row.remove("score");
    let record_id = row.get("id").and_then(value_as_text)?;
    Some(RawHit { record_id, score: score.clamp(0.0, 1.0), payload: Value::Object(row) })
}

// ═══════════════════════════════════════════════════════════════════════════
// VECTOR
// ═══════════════════════════════════════════════════════════════════════════

pub struct VectorStrategy {
    vector: Arc<dyn VectorBackend>,
    embedder: Arc<dyn Embedder>,
    collection: String,
    threshold: f32,
}

impl VectorStrategy {
    pub fn new(
        vector: Arc<dyn VectorBackend>,
        embedder: Arc<dyn Embedder>,
        collection: impl Into<String>,
        threshold: f32,
    ) -> Self {
        Self { vector, embedder, collection: collection.into(), threshold }
    }
}

#[async_trait]
impl SearchStrategy for VectorStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Vector
    }

    async fn search(&self, query: &SearchQuery) -> Result<Vec<RawHit>, BackendError> {
        let threshold = query.threshold.unwrap_or(self.threshold);
        let embedding = self.embedder.embed(&query.text).await?;
        let limit = query.fetch_limit();

        let hits = self
            .vector
            .search(&self.collection, &embedding, limit, &query.filters)
            .await?
            .into_iter()
            .filter(|h| h.score >= threshold)
            .map(|h| RawHit { record_id: h.id, score: h.score.clamp(0.0, 1.0), payload: h.payload })
            .collect();
        Ok(finish(hits, limit))
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// RELATIONAL
// ═══════════════════════════════════════════════════════════════════════════

/// Tiered lexical relevance of `name`/`sku` against the query text.
///
/// exact name or SKU 1.0, name prefix 0.9, name contains 0.8, otherwise
/// 0.7 × share of query tokens found in the name.
#[must_use]
pub fn lexical_score(query: &str, name: &str, sku: Option<&str>) -> f32 {
    let q = normalize_text(query);
    let n = normalize_text(name);
    if q.is_empty() {
        return 0.0;
    }
    if n == q || sku.is_some_and(|s| s.trim().eq_ignore_ascii_case(&q)) {
        return 1.0;
    }
    if n.starts_with(&q) {
        return 0.9;
    }
    if n.contains(&q) {
        return 0.8;
    }
    let tokens: Vec<&str> = q.split(' ').collect();
    let found = tokens.iter().filter(|t| n.contains(*t)).count();
    0.7 * found as f32 / tokens.len() as f32
}

fn token_predicate(text: &str, min_len: usize, stem: Option<usize>) -> SqlQuery {
    let parts = normalize_text(text)
        .split(' ')
        .filter(|t| t.chars().count() >= min_len)
        .take(8)
        .map(|t| {
            let needle: String = match stem {
                Some(n) => t.chars().take(n).collect(),
                None => t.to_string(),
            };
            SqlTranslator::text_match(&TEXT_COLUMNS, &needle)
        })
        .collect();
    SqlTranslator::any_of(parts)
}

pub struct RelationalStrategy {
    relational: Arc<dyn RelationalBackend>,
    table: String,
    threshold: f32,
}

impl RelationalStrategy {
    pub fn new(
        relational: Arc<dyn RelationalBackend>,
        table: impl Into<String>,
        threshold: f32,
    ) -> Self {
        Self { relational, table: table.into(), threshold }
    }
}

#[async_trait]
impl SearchStrategy for RelationalStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Relational
    }

    async fn search(&self, query: &SearchQuery) -> Result<Vec<RawHit>, BackendError> {
        let threshold = query.threshold.unwrap_or(self.threshold);
        let limit = query.fetch_limit();
        let text = token_predicate(&query.text, 1, None);
        let filters = SqlTranslator::translate(&query.filters);
        let (sql, params) = SqlTranslator::select(
            &self.table,
            &[text, filters],
            None,
            (limit * 3).min(MAX_CANDIDATE_ROWS),
        );

        let rows = self.relational.query(&sql, &params).await?;
        let hits = rows
            .into_iter()
            .filter_map(|row| {
                let score = match row.get("score").and_then(Value::as_f64) {
                    Some(s) => s as f32,
                    None => {
                        let name = row.get("name").and_then(Value::as_str).unwrap_or_default();
                        let sku = row.get("sku").and_then(Value::as_str);
                        lexical_score(&query.text, name, sku)
                    }
                };
                row_hit(row, score)
            })
            .filter(|h| h.score >= threshold)
            .collect();
        Ok(finish(hits, limit))
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// FUZZY
// ═══════════════════════════════════════════════════════════════════════════

pub struct FuzzyStrategy {
    relational: Arc<dyn RelationalBackend>,
    table: String,
    threshold: f32,
}

impl FuzzyStrategy {
    pub fn new(
        relational: Arc<dyn RelationalBackend>,
        table: impl Into<String>,
        threshold: f32,
    ) -> Self {
        Self { relational, table: table.into(), threshold }
    }
}

#[async_trait]
impl SearchStrategy for FuzzyStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Fuzzy
    }

    async fn search(&self, query: &SearchQuery) -> Result<Vec<RawHit>, BackendError> {
        let threshold = query.threshold.unwrap_or(self.threshold);
        let limit = query.fetch_limit();
        // candidates share a 3-char stem with some query token; typos past
        // the stem are scored in-process
        let stems = token_predicate(&query.text, 3, Some(3));
        let filters = SqlTranslator::translate(&query.filters);
        let (sql, params) = SqlTranslator::select(
            &self.table,
            &[stems, filters],
            None,
            (limit * 5).clamp(50, MAX_CANDIDATE_ROWS),
        );

        let rows = self.relational.query(&sql, &params).await?;
        let hits = rows
            .into_iter()
            .filter_map(|row| {
                let name = row.get("name").and_then(Value::as_str).unwrap_or_default();
                let score = fuzzy::best_similarity(&query.text, name);
                row_hit(row, score)
            })
            .filter(|h| h.score >= threshold)
            .collect();
        Ok(finish(hits, limit))
    }
}
