//! OpenAI-compatible `/embeddings` client
//!
//! Works against OpenRouter, OpenAI and local servers that expose the same
//! request shape. Rate-limited requests are retried with exponential backoff.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client as HttpClient, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::EmbeddingConfig;
use crate::domain::graph::{Embedding, EmbeddingProvider};
use crate::error::{Error, Result};

/// Maximum number of attempts for rate-limited requests
const MAX_RETRY_ATTEMPTS: u32 = 3;

/// Base delay for exponential backoff (in milliseconds)
const BACKOFF_BASE_MS: u64 = 500;

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
    #[serde(default)]
    model: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

enum Attempt {
    Done(Embedding),
    RateLimited,
}

/// HTTP embedding provider
#[derive(Clone)]
pub struct HttpEmbeddingProvider {
    http_client: HttpClient,
    api_key: Option<String>,
    base_url: String,
    model: String,
    dimensions: Option<usize>,
}

impl std::fmt::Debug for HttpEmbeddingProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpEmbeddingProvider")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("dimensions", &self.dimensions)
            .field("api_key", &self.api_key.is_some())
            .finish()
    }
}

impl HttpEmbeddingProvider {
    /// Build a provider from configuration, reading the API key from the
    /// environment
    pub fn from_config(config: &EmbeddingConfig) -> Result<Self> {
        let api_key = config
            .resolved_api_key()
            .map_err(|e| Error::ConfigError(e.to_string()))?;

        let http_client = HttpClient::builder()
            .timeout(config.timeout())
            .build()
            .map_err(Error::NetworkError)?;

        Ok(Self {
            http_client,
            api_key,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            dimensions: config.dimensions,
        })
    }

    /// Override the API key (e.g. for a local server that ignores it)
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    async fn send_request(&self, text: &str) -> Result<Attempt> {
        let url = format!("{}/embeddings", self.base_url);
        let request = EmbeddingRequest {
            model: &self.model,
            input: text,
            dimensions: self.dimensions,
        };

        let mut builder = self.http_client.post(&url).json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await.map_err(Error::NetworkError)?;
        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            return Ok(Attempt::RateLimited);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::EmbeddingFailed(format!(
                "provider returned {}: {}",
                status,
                body.chars().take(200).collect::<String>()
            )));
        }

        let parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| Error::EmbeddingFailed(format!("Failed to parse response: {}", e)))?;

        let vector = parsed
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| Error::EmbeddingFailed("Empty embedding from provider".to_string()))?;

        if let Some(expected) = self.dimensions
            && vector.len() != expected
        {
            return Err(Error::DimensionMismatch {
                expected,
                actual: vector.len(),
            });
        }

        Ok(Attempt::Done(Embedding::new(
            vector,
            parsed.model.unwrap_or_else(|| self.model.clone()),
        )))
    }
}

#[async_trait]
impl EmbeddingProvider for HttpEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Embedding> {
        let mut attempts = 0;

        loop {
            attempts += 1;
            debug!(model = %self.model, chars = text.len(), attempt = attempts, "Requesting embedding");

            match self.send_request(text).await? {
                Attempt::Done(embedding) => return Ok(embedding),
                Attempt::RateLimited if attempts < MAX_RETRY_ATTEMPTS => {
                    let backoff = BACKOFF_BASE_MS * 2u64.pow(attempts - 1);
                    warn!(attempt = attempts, wait_ms = backoff, "Embedding rate limited, retrying");
                    tokio::time::sleep(Duration::from_millis(backoff)).await;
                }
                Attempt::RateLimited => {
                    return Err(Error::EmbeddingFailed(format!(
                        "rate limited after {} attempts",
                        attempts
                    )));
                }
            }
        }
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn dimension(&self) -> Option<usize> {
        self.dimensions
    }
}
