// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Cache key derivation and glob matching.
//!
//! Key families:
//!
//! | Pattern | Holds |
//! |---------|-------|
//! | `search:<sha256>` | fused search responses |
//! | `vector_search:<sha256>` | SKU phase-1 candidate lists |
//! | `material:<id>` | single catalog records |
//! | `health:report` | last health report |

use serde_json::{json, Value};
use sha2::{Digest, Sha256};

use crate::search::SearchQuery;

pub const SEARCH_PATTERN: &str = "search:*";
pub const VECTOR_SEARCH_PATTERN: &str = "vector_search:*";
pub const HEALTH_REPORT_KEY: &str = "health:report";

/// Lowercase, trim and collapse internal whitespace.
#[must_use]
pub fn normalize_text(text: &str) -> String {
    text.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

fn digest(canonical: &Value) -> String {
    // serde_json::Map is ordered by key, so to_string is canonical
    let bytes = canonical.to_string();
    hex::encode(Sha256::digest(bytes.as_bytes()))
}

/// Deterministic key for a search request. Filter order does not matter.
#[must_use]
pub fn search_key(query: &SearchQuery) -> String {
    let mut filters: Vec<String> = query
        .filters
        .iter()
        .filter_map(|f| serde_json::to_string(f).ok())
        .collect();
    filters.sort();

    let canonical = json!({
        "text": normalize_text(&query.text),
        "mode": query.mode,
        "limit": query.limit,
        "threshold": query.threshold,
        "filters": filters,
        "sort": query.sort,
        "page": query.page,
    });
    format!("search:{}", digest(&canonical))
}

/// Key for a SKU phase-1 candidate list.
#[must_use]
pub fn vector_search_key(text: &str, limit: usize, floor: f32) -> String {
    let canonical = json!({
        "text": normalize_text(text),
        "limit": limit,
        "floor": floor,
    });
    format!("vector_search:{}", digest(&canonical))
}

#[must_use]
pub fn material_key(id: &str) -> String {
    format!("material:{}", id)
}

/// Family a key or pattern belongs to, for metric labels. Anything
/// outside the known families is `other`.
#[must_use]
pub fn key_family(key: &str) -> &'static str {
    match key.split_once(':').map_or(key, |(prefix, _)| prefix) {
        "search" => "search",
        "vector_search" => "vector_search",
        "material" => "material",
        "health" => "health",
        _ => "other",
    }
}

/// Glob match supporting `*` (any run) and `?` (one char).
#[must_use]
pub fn glob_match(pattern: &str, key: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let k: Vec<char> = key.chars().collect();
    let (mut pi, mut ki) = (0, 0);
    let mut star: Option<(usize, usize)> = None;

    while ki < k.len() {
        if pi < p.len() && (p[pi] == '?' || p[pi] == k[ki]) {
            pi += 1;
            ki += 1;
        } else if pi < p.len() && p[pi] == '*' {
            star = Some((pi, ki));
            pi += 1;
        } else if let Some((sp, sk)) = star {
            pi = sp + 1;
            ki = sk + 1;
            star = Some((sp, sk + 1));
        } else {
            return false;
        }
    }
    while pi < p.len() && p[pi] == '*' {
        pi += 1;
    }
    pi == p.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::{Filter, SearchMode};

    #[test]
    fn test_key_family_is_bounded() {
        assert_eq!(key_family(SEARCH_PATTERN), "search");
        assert_eq!(key_family(VECTOR_SEARCH_PATTERN), "vector_search");
        assert_eq!(key_family(&material_key("A*[1]")), "material");
        assert_eq!(key_family(HEALTH_REPORT_KEY), "health");
        assert_eq!(key_family("*"), "other");
        assert_eq!(key_family("session:abc"), "other");
    }

    #[test]
    fn test_search_key_shape() {
        let key = search_key(&SearchQuery::new("cement"));
        assert!(key.starts_with("search:"));
        assert_eq!(key.len(), "search:".len() + 64);
    }

    #[test]
    fn test_search_key_normalizes_text() {
        let a = search_key(&SearchQuery::new("Portland  Cement"));
        let b = search_key(&SearchQuery::new("  portland cement "));
        assert_eq!(a, b);
    }

    #[test]
    fn test_search_key_ignores_filter_order() {
        let a = SearchQuery::new("cement")
            .filter(Filter::eq("unit", "kg"))
            .filter(Filter::range("price", Some(1.0), None));
        let b = SearchQuery::new("cement")
            .filter(Filter::range("price", Some(1.0), None))
            .filter(Filter::eq("unit", "kg"));
        assert_eq!(search_key(&a), search_key(&b));
    }

    #[test]
    fn test_search_key_distinguishes_parameters() {
        let base = SearchQuery::new("cement");
        let keys = [
            search_key(&base),
            search_key(&base.clone().mode(SearchMode::Vector)),
            search_key(&base.clone().limit(20)),
            search_key(&base.clone().page(1)),
            search_key(&base.clone().threshold(0.7)),
            search_key(&base.clone().sort_by("name", false)),
        ];
        let unique: std::collections::HashSet<_> = keys.iter().collect();
        assert_eq!(unique.len(), keys.len());
    }

    #[test]
    fn test_vector_search_and_material_keys() {
        assert!(vector_search_key("Cement M500", 20, 0.35).starts_with("vector_search:"));
        assert_eq!(
            vector_search_key("Cement M500", 20, 0.35),
            vector_search_key("cement  m500", 20, 0.35)
        );
        assert_eq!(material_key("42"), "material:42");
    }

    #[test]
    fn test_glob_match() {
        assert!(glob_match("search:*", "search:abc"));
        assert!(glob_match("search:*", "search:"));
        assert!(!glob_match("search:*", "material:42"));
        assert!(!glob_match("search:*", "vector_search:abc"));
        assert!(glob_match("material:4?", "material:42"));
        assert!(!glob_match("material:4?", "material:420"));
        assert!(glob_match("*", "anything"));
        assert!(glob_match("a*b*c", "axxbyyc"));
        assert!(!glob_match("a*b*c", "axxbyy"));
        assert!(glob_match("material:42", "material:42"));
    }
}
