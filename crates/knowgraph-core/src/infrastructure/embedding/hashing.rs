//! Offline feature-hashing embeddings
//!
//! Each lowercase word is hashed with SHA-256 into a bucket and a sign; the
//! bucket counts are L2-normalized. Texts sharing vocabulary get high cosine
//! similarity, which is enough for local runs and tests without a model.

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use crate::domain::graph::{Embedding, EmbeddingProvider};
use crate::error::{Error, Result};

pub const DEFAULT_HASHING_DIMENSION: usize = 256;

const MODEL_NAME: &str = "feature-hashing-sha256";

#[derive(Debug, Clone)]
pub struct HashingEmbeddingProvider {
    dimension: usize,
}

impl Default for HashingEmbeddingProvider {
    fn default() -> Self {
        Self::new(DEFAULT_HASHING_DIMENSION)
    }
}

impl HashingEmbeddingProvider {
    /// Zero is bumped to one
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    pub fn embed_sync(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];

        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let digest = Sha256::digest(word.to_lowercase().as_bytes());
            let bucket = u64::from_le_bytes([
                digest[0], digest[1], digest[2], digest[3], digest[4], digest[5], digest[6],
                digest[7],
            ]) as usize
                % self.dimension;
            let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
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
impl EmbeddingProvider for HashingEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Embedding> {
        if text.trim().is_empty() {
            return Err(Error::EmbeddingFailed("cannot embed empty text".to_string()));
        }
        Ok(Embedding::new(self.embed_sync(text), MODEL_NAME))
    }

    fn model(&self) -> &str {
        MODEL_NAME
    }

    fn dimension(&self) -> Option<usize> {
        Some(self.dimension)
    }
}
