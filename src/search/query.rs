// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Search query model.
//!
//! A [`SearchQuery`] is built with chained constructors, validated once,
//! then shared immutably (`Arc<SearchQuery>`) with every strategy task.
//!
//! # Example
//!
//! ```rust
//! use catalog_search::search::{Filter, SearchMode, SearchQuery};
//!
//! let query = SearchQuery::new("portland cement")
//!     .mode(SearchMode::Hybrid)
//!     .limit(20)
//!     .filter(Filter::eq("category", "binders"))
//!     .filter(Filter::range("price", Some(100.0), Some(900.0)));
//!
//! assert!(query.validate().is_ok());
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::HybridError;
use crate::storage::traits::{BackendKind, Row};

/// Longest accepted query text, in characters.
pub const MAX_QUERY_CHARS: usize = 1_000;
/// Largest accepted page size.
pub const MAX_LIMIT: usize = 500;
/// Largest accepted page index.
pub const MAX_PAGE: usize = 100;

/// One lookup strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    Vector,
    Relational,
    Fuzzy,
}

impl StrategyKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Vector => "vector",
            Self::Relational => "relational",
            Self::Fuzzy => "fuzzy",
        }
    }

    /// The external store this strategy talks to.
    #[must_use]
    pub fn backend(&self) -> BackendKind {
        match self {
            Self::Vector => BackendKind::Vector,
            Self::Relational | Self::Fuzzy => BackendKind::Relational,
        }
    }
}

impl std::fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Requested strategy set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchMode {
    Vector,
    Relational,
    Fuzzy,
    /// Every enabled strategy, in parallel
    #[default]
    Hybrid,
}

impl SearchMode {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Vector => "vector",
            Self::Relational => "relational",
            Self::Fuzzy => "fuzzy",
            Self::Hybrid => "hybrid",
        }
    }

    /// The single strategy this mode names, `None` for hybrid.
    #[must_use]
    pub fn single(&self) -> Option<StrategyKind> {
        match self {
            Self::Vector => Some(StrategyKind::Vector),
            Self::Relational => Some(StrategyKind::Relational),
            Self::Fuzzy => Some(StrategyKind::Fuzzy),
            Self::Hybrid => None,
        }
    }
}

/// Scalar filter operand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    Bool(bool),
    Number(f64),
    Text(String),
}

impl FilterValue {
    fn matches(&self, value: &Value) -> bool {
        match (self, value) {
            (Self::Text(expected), Value::String(actual)) => expected.eq_ignore_ascii_case(actual),
            (Self::Number(expected), Value::Number(actual)) => {
                actual.as_f64().is_some_and(|a| (a - expected).abs() < f64::EPSILON)
            }
            (Self::Bool(expected), Value::Bool(actual)) => expected == actual,
            _ => false,
        }
    }
}

impl From<&str> for FilterValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for FilterValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<f64> for FilterValue {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<bool> for FilterValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

/// Filter operator and its operand(s).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "op", content = "value")]
pub enum FilterOp {
    /// field = value
    Eq(FilterValue),
    /// field IN (values)
    In(Vec<FilterValue>),
    /// min <= field <= max (either bound optional)
    Range { min: Option<f64>, max: Option<f64> },
    /// field contains substring (case-insensitive)
    Contains(String),
}

/// A predicate over one payload field / column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    pub field: String,
    #[serde(flatten)]
    pub op: FilterOp,
}

impl Filter {
    pub fn eq(field: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        Self { field: field.into(), op: FilterOp::Eq(value.into()) }
    }

    pub fn one_of(field: impl Into<String>, values: Vec<FilterValue>) -> Self {
        Self { field: field.into(), op: FilterOp::In(values) }
    }

    pub fn range(field: impl Into<String>, min: Option<f64>, max: Option<f64>) -> Self {
        Self { field: field.into(), op: FilterOp::Range { min, max } }
    }

    pub fn contains(field: impl Into<String>, text: impl Into<String>) -> Self {
        Self { field: field.into(), op: FilterOp::Contains(text.into()) }
    }

    /// Evaluate against a JSON payload (used by in-process backends).
    #[must_use]
    pub fn matches(&self, payload: &Value) -> bool {
        let Some(value) = payload.get(&self.field) else {
            return false;
        };
        match &self.op {
            FilterOp::Eq(expected) => expected.matches(value),
            FilterOp::In(values) => values.iter().any(|v| v.matches(value)),
            FilterOp::Range { min, max } => match value.as_f64() {
                Some(n) => min.map_or(true, |m| n >= m) && max.map_or(true, |m| n <= m),
                None => false,
            },
            FilterOp::Contains(needle) => value
                .as_str()
                .is_some_and(|s| s.to_lowercase().contains(&needle.to_lowercase())),
        }
    }

    fn validate(&self) -> Result<(), HybridError> {
        if !is_identifier(&self.field) {
            return Err(HybridError::Validation(format!(
                "filter field '{}' is not a plain identifier",
                self.field
            )));
        }
        match &self.op {
            FilterOp::In(values) if values.is_empty() => Err(HybridError::Validation(format!(
                "filter on '{}' has an empty value list",
                self.field
            ))),
            FilterOp::Range { min: None, max: None } => Err(HybridError::Validation(format!(
                "range filter on '{}' has no bounds",
                self.field
            ))),
            FilterOp::Range { min: Some(lo), max: Some(hi) } if lo > hi => {
                Err(HybridError::Validation(format!(
                    "range filter on '{}' has min {} > max {}",
                    self.field, lo, hi
                )))
            }
            _ => Ok(()),
        }
    }
}

/// Post-fusion ordering by a payload field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortSpec {
    pub field: String,
    #[serde(default)]
    pub descending: bool,
}

/// A search request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchQuery {
    pub text: String,
    #[serde(default)]
    pub mode: SearchMode,
    pub limit: usize,
    /// Overrides every strategy's configured base threshold
    #[serde(default)]
    pub threshold: Option<f32>,
    #[serde(default)]
    pub filters: Vec<Filter>,
    #[serde(default)]
    pub sort: Option<SortSpec>,
    /// Zero-based page index
    #[serde(default)]
    pub page: usize,
}

impl SearchQuery {
    /// Hybrid query, 10 results, first page.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            mode: SearchMode::Hybrid,
            limit: 10,
            threshold: None,
            filters: Vec::new(),
            sort: None,
            page: 0,
        }
    }

    #[must_use]
    pub fn mode(mut self, mode: SearchMode) -> Self {
        self.mode = mode;
        self
    }

    #[must_use]
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    #[must_use]
    pub fn threshold(mut self, threshold: f32) -> Self {
        self.threshold = Some(threshold);
        self
    }

    #[must_use]
    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    #[must_use]
    pub fn sort_by(mut self, field: impl Into<String>, descending: bool) -> Self {
        self.sort = Some(SortSpec { field: field.into(), descending });
        self
    }

    #[must_use]
    pub fn page(mut self, page: usize) -> Self {
        self.page = page;
        self
    }

    /// How many hits each strategy must return to fill the requested page.
    #[must_use]
    pub fn fetch_limit(&self) -> usize {
        self.limit.saturating_mul(self.page + 1)
    }

    /// Reject malformed requests before anything is dispatched.
    pub fn validate(&self) -> Result<(), HybridError> {
        let text = self.text.trim();
        if text.is_empty() {
            return Err(HybridError::Validation("query text is empty".into()));
        }
        if text.chars().count() > MAX_QUERY_CHARS {
            return Err(HybridError::Validation(format!(
                "query text exceeds {} characters",
                MAX_QUERY_CHARS
            )));
        }
        if self.limit == 0 || self.limit > MAX_LIMIT {
            return Err(HybridError::Validation(format!(
                "limit must be within 1..={}, got {}",
                MAX_LIMIT, self.limit
            )));
        }
        if self.page > MAX_PAGE {
            return Err(HybridError::Validation(format!(
                "page must be at most {}, got {}",
                MAX_PAGE, self.page
            )));
        }
        if let Some(t) = self.threshold {
            if !(0.0..=1.0).contains(&t) {
                return Err(HybridError::Validation(format!(
                    "threshold must be within [0, 1], got {}",
                    t
                )));
            }
        }
        for filter in &self.filters {
            filter.validate()?;
        }
        if let Some(ref sort) = self.sort {
            if !is_identifier(&sort.field) {
                return Err(HybridError::Validation(format!(
                    "sort field '{}' is not a plain identifier",
                    sort.field
                )));
            }
        }
        Ok(())
    }
}

/// A catalog record as written through the engine and returned as payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaterialRecord {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub sku: Option<String>,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
}

impl MaterialRecord {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            sku: None,
            unit: None,
            color: None,
            category: None,
        }
    }

    #[must_use]
    pub fn with_sku(mut self, sku: impl Into<String>) -> Self {
        self.sku = Some(sku.into());
        self
    }

    #[must_use]
    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    #[must_use]
    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = Some(color.into());
        self
    }

    #[must_use]
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    /// Payload form stored alongside vectors and returned in hits.
    #[must_use]
    pub fn to_payload(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// Rebuild from a relational row or a vector payload. `None` when the
    /// id or name column is missing.
    #[must_use]
    pub fn from_payload(payload: &Value) -> Option<Self> {
        let text = |k: &str| payload.get(k).and_then(value_as_text);
        Some(Self {
            id: text("id")?,
            name: text("name")?,
            sku: text("sku").filter(|s| !s.is_empty()),
            unit: text("unit").filter(|s| !s.is_empty()),
            color: text("color").filter(|s| !s.is_empty()),
            category: text("category").filter(|s| !s.is_empty()),
        })
    }

    #[must_use]
    pub fn from_row(row: &Row) -> Option<Self> {
        Self::from_payload(&Value::Object(row.clone()))
    }
}

/// Render a scalar JSON value as text (ids may come back as integers).
pub(crate) fn value_as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// `[A-Za-z_][A-Za-z0-9_]*`: the only shape allowed to reach SQL unquoted.
#[must_use]
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
