//! Embedding provider adapters

mod hashing;
mod http;

pub use hashing::{DEFAULT_HASHING_DIMENSION, HashingEmbeddingProvider};
pub use http::HttpEmbeddingProvider;
