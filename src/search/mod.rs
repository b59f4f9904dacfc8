// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Search Infrastructure
//!
//! Hybrid lookup across a vector store and a relational catalog.
//!
//! # Architecture
//!
//! ```text
//! SearchQuery (validated, Arc-shared)
//!     ↓
//! ParallelSearchOrchestrator ── permit pool + deadline
//!     ├─→ VectorStrategy      → embed → vector similarity
//!     ├─→ RelationalStrategy  → SqlTranslator → LIKE + filters
//!     └─→ FuzzyStrategy       → SqlTranslator → trigram rescoring
//!     ↓
//! ConfidenceRanker → Vec<FusedCandidate>
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! # use catalog_search::HybridSearchEngine;
//! # use catalog_search::search::{Filter, SearchQuery};
//! # async fn example(engine: &HybridSearchEngine) {
//! let query = SearchQuery::new("portland cement")
//!     .limit(20)
//!     .filter(Filter::eq("unit", "kg"));
//!
//! let response = engine.search(query).await.unwrap();
//! for candidate in &response.candidates {
//!     println!("{} {:.3} {:?}", candidate.record_id, candidate.score, candidate.strategies);
//! }
//! # }
//! ```

pub mod fuzzy;
mod orchestrator;
mod query;
mod ranker;
mod sql_translator;
mod strategy;

pub use orchestrator::{
    ParallelSearchOrchestrator, RoundState, SearchRound, StrategyResult, StrategyStatus,
};
pub use query::{
    is_identifier, Filter, FilterOp, FilterValue, MaterialRecord, SearchMode, SearchQuery, SortSpec,
    StrategyKind, MAX_LIMIT, MAX_PAGE, MAX_QUERY_CHARS,
};
pub(crate) use query::value_as_text;
pub use ranker::{ConfidenceRanker, FusedCandidate, RankerSettings};
pub use sql_translator::{SqlParam, SqlQuery, SqlTranslator};
pub use strategy::{
    lexical_score, FuzzyStrategy, RawHit, RelationalStrategy, SearchStrategy, VectorStrategy,
    TEXT_COLUMNS,
};
