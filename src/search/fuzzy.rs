// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Trigram similarity for in-process fuzzy scoring.
//!
//! Strings are lowercased, split on non-alphanumerics and padded per token
//! (`"  cement "`), the same shape `pg_trgm` uses. Similarity is the Jaccard
//! index of the two trigram sets.

use std::collections::HashSet;

fn trigrams(text: &str) -> HashSet<[char; 3]> {
    let mut set = HashSet::new();
    for token in text
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
    {
        let padded: Vec<char> = "  ".chars().chain(token.chars()).chain(" ".chars()).collect();
        for w in padded.windows(3) {
            set.insert([w[0], w[1], w[2]]);
        }
    }
    set
}

/// Jaccard similarity of the trigram sets, in `[0, 1]`.
#[must_use]
pub fn similarity(a: &str, b: &str) -> f32 {
    let ta = trigrams(a);
    let tb = trigrams(b);
    if ta.is_empty() || tb.is_empty() {
        return 0.0;
    }
    let shared = ta.intersection(&tb).count();
    let union = ta.len() + tb.len() - shared;
    shared as f32 / union as f32
}

/// Best of whole-string similarity and the needle against each word window
/// of the haystack with the same token count. Lets "cement" score well
/// against "Portland cement M500".
#[must_use]
pub fn best_similarity(needle: &str, haystack: &str) -> f32 {
    let whole = similarity(needle, haystack);
    let needle_tokens = needle.split_whitespace().count().max(1);
    let words: Vec<&str> = haystack.split_whitespace().collect();
    if words.len() <= needle_tokens {
        return whole;
    }
    words
        .windows(needle_tokens)
        .map(|w| similarity(needle, &w.join(" ")))
        .fold(whole, f32::max)
}
