//! Embedding provider port
//!
//! The graph consumes embeddings; it never produces them. Adapters live in
//! `infrastructure::embedding`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// A vector embedding with the model that produced it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding {
    pub vector: Vec<f32>,
    pub model: String,
}

impl Embedding {
    pub fn new(vector: Vec<f32>, model: impl Into<String>) -> Self {
        Self {
            vector,
            model: model.into(),
        }
    }

    pub fn dimension(&self) -> usize {
        self.vector.len()
    }
}

/// Source of text embeddings
///
/// Implementations must return vectors of a fixed dimension; the service
/// rejects a vector whose dimension differs from the workspace's.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a single text
    async fn embed(&self, text: &str) -> Result<Embedding>;

    /// Model identifier
    fn model(&self) -> &str;

    /// Output dimension, when known up front
    fn dimension(&self) -> Option<usize> {
        None
    }
}
