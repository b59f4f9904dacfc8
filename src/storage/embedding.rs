// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Feature-hashing embedder.
//!
//! Deterministic, dependency-free stand-in for a model-backed embedder.
//! Each lowercased word and each padded character trigram is hashed
//! (SHA-256, first 8 bytes) into one of `dimension` buckets with a
//! hash-derived sign; the result is L2-normalized. Texts sharing words or
//! spelling fragments land close together in cosine space, which is what
//! the vector strategy needs for typo-tolerant lookups in tests and demos.

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use super::traits::{BackendError, Embedder};

const WORD_WEIGHT: f32 = 1.0;
const TRIGRAM_WEIGHT: f32 = 0.5;

#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dimension: usize,
}

impl HashEmbedder {
    /// `dimension` is clamped to at least 1.
    #[must_use]
    pub fn new(dimension: usize) -> Self {
        Self { dimension: dimension.max(1) }
    }

    fn bucket(&self, feature: &str) -> (usize, f32) {
        let digest = Sha256::digest(feature.as_bytes());
        let mut raw = [0u8; 8];
        raw.copy_from_slice(&digest[..8]);
        let h = u64::from_le_bytes(raw);
        let index = (h % self.dimension as u64) as usize;
        let sign = if (h >> 63) == 0 { 1.0 } else { -1.0 };
        (index, sign)
    }

    /// Synchronous embedding; the trait method delegates here.
    #[must_use]
    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];
        let lowered = text.to_lowercase();

        for word in lowered.split(|c: char| !c.is_alphanumeric()).filter(|w| !w.is_empty()) {
            let (i, sign) = self.bucket(&format!("w:{word}"));
            vector[i] += sign * WORD_WEIGHT;

            let padded: Vec<char> = format!(" {word} ").chars().collect();
            for gram in padded.windows(3) {
                let gram: String = gram.iter().collect();
                let (i, sign) = self.bucket(&format!("t:{gram}"));
                vector[i] += sign * TRIGRAM_WEIGHT;
            }
        }

        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut vector {
                *x /= norm;
            }
        }
        vector
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, BackendError> {
        Ok(self.embed_text(text))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}
