//! # Embedding Client Module
//!
//! ## Purpose
//! Capability wrapper around the external embedding model: turns batches of
//! text into fixed-dimension vectors, with per-item failure reporting and a
//! retry policy that shrinks failing batches down to single items.
//!
//! ## Input/Output Specification
//! - **Input**: Ordered batches of unit texts or single query strings
//! - **Output**: One vector (or error) per input, in input order
//! - **Service**: Ollama-compatible HTTP API (`POST /api/embed`)
//!
//! ## Key Features
//! - Injectable `EmbeddingProvider` trait for testing without a network
//! - Bounded request timeout, bearer-token authentication
//! - Whole-batch failures retried with binary batch-size backoff
//! - Bounded concurrency across in-flight batches

use crate::config::EmbeddingConfig;
use crate::errors::{Result, StoreError};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

/// Per-item embedding outcome within a batch
pub type EmbedResult = std::result::Result<Vec<f32>, StoreError>;

/// Capability interface for embedding models.
///
/// `embed_batch` returns one result per input, in input order. An outer `Err`
/// means the whole attempt failed (transport error, timeout) and is eligible
/// for retry by the caller; inner per-item errors are final for that attempt.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<EmbedResult>>;

    /// Fixed output dimensionality of the pinned model
    fn dimension(&self) -> usize;

    /// Model identifier pinning vector compatibility across the store
    fn model_version(&self) -> &str;

    /// Provider name for logging
    fn name(&self) -> &str;

    /// Check if the provider is reachable
    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }
}

/// HTTP client for an Ollama-compatible embedding service
pub struct OllamaEmbeddingClient {
    client: reqwest::Client,
    base_url: String,
    model: String,
    dimension: usize,
    timeout_secs: u64,
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

impl OllamaEmbeddingClient {
    /// Create a new client from the embedding configuration
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let mut headers = reqwest::header::HeaderMap::new();
        if !config.auth_token.is_empty() {
            headers.insert(
                reqwest::header::AUTHORIZATION,
                format!("Bearer {}", config.auth_token)
                    .parse()
                    .map_err(|e| StoreError::Config {
                        message: format!("Invalid auth token format: {}", e),
                    })?,
            );
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .default_headers(headers)
            .user_agent(format!("legal-text-store/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| StoreError::Network {
                reason: e.to_string(),
            })?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            dimension: config.dimension,
            timeout_secs: config.timeout_seconds,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaEmbeddingClient {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<EmbedResult>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!("{}/api/embed", self.base_url);
        let request = EmbedRequest {
            model: &self.model,
            input: texts,
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    StoreError::EmbeddingTimeout {
                        timeout_secs: self.timeout_secs,
                    }
                } else {
                    StoreError::Network {
                        reason: e.to_string(),
                    }
                }
            })?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok());
            return Err(StoreError::RateLimited {
                retry_after_seconds: retry_after,
            });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::EmbeddingService {
                status: Some(status.as_u16()),
                reason: truncate_reason(&body),
            });
        }

        let parsed: EmbedResponse =
            response
                .json()
                .await
                .map_err(|e| StoreError::EmbeddingService {
                    status: None,
                    reason: format!("malformed embedding response: {}", e),
                })?;

        if parsed.embeddings.len() != texts.len() {
            return Err(StoreError::EmbeddingService {
                status: None,
                reason: format!(
                    "embedding count mismatch: sent {} texts, got {} vectors",
                    texts.len(),
                    parsed.embeddings.len()
                ),
            });
        }

        Ok(parsed
            .embeddings
            .into_iter()
            .map(|vector| {
                if vector.len() == self.dimension {
                    Ok(vector)
                } else {
                    Err(StoreError::EmbeddingService {
                        status: None,
                        reason: format!(
                            "dimension mismatch: expected {}, got {}",
                            self.dimension,
                            vector.len()
                        ),
                    })
                }
            })
            .collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_version(&self) -> &str {
        &self.model
    }

    fn name(&self) -> &str {
        "ollama"
    }

    async fn health_check(&self) -> Result<bool> {
        let url = format!("{}/api/tags", self.base_url);
        match self.client.get(&url).send().await {
            Ok(response) => Ok(response.status().is_success()),
            Err(_) => Ok(false),
        }
    }
}

/// Batching and retry layer over an [`EmbeddingProvider`].
///
/// Splits inputs into configured batch sizes. A whole-batch failure is split
/// in half and retried (down to single items) until the retry ceiling is
/// reached; per-item failures pass through unchanged. Batches run with
/// bounded concurrency.
pub struct BatchEmbedder {
    provider: Arc<dyn EmbeddingProvider>,
    batch_size: usize,
    max_retries: u32,
    retry_delay: Duration,
    max_concurrent: usize,
}

impl BatchEmbedder {
    pub fn new(provider: Arc<dyn EmbeddingProvider>, config: &EmbeddingConfig) -> Self {
        Self {
            provider,
            batch_size: config.batch_size.max(1),
            max_retries: config.max_retries.max(1),
            retry_delay: Duration::from_millis(config.retry_delay_ms),
            max_concurrent: config.max_concurrent_batches.max(1),
        }
    }

    /// The wrapped provider
    pub fn provider(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.provider
    }

    /// Embed all texts, returning one result per input in input order.
    pub async fn embed_all(&self, texts: &[String]) -> Vec<EmbedResult> {
        if texts.is_empty() {
            return Vec::new();
        }

        let chunks: Vec<(usize, Vec<String>)> = texts
            .chunks(self.batch_size)
            .enumerate()
            .map(|(i, chunk)| (i * self.batch_size, chunk.to_vec()))
            .collect();

        let chunk_results: Vec<(usize, Vec<EmbedResult>)> = stream::iter(chunks)
            .map(|(offset, chunk)| async move { (offset, self.embed_chunk(&chunk).await) })
            .buffer_unordered(self.max_concurrent)
            .collect()
            .await;

        let mut results: Vec<EmbedResult> = (0..texts.len())
            .map(|_| {
                Err(StoreError::Internal {
                    message: "embedding result missing".to_string(),
                })
            })
            .collect();
        for (offset, chunk) in chunk_results {
            for (i, item) in chunk.into_iter().enumerate() {
                results[offset + i] = item;
            }
        }
        results
    }

    /// Embed a single text under the same retry policy.
    pub async fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        let input = [text.to_string()];
        let mut results = self.embed_all(&input).await;
        results.pop().unwrap_or_else(|| {
            Err(StoreError::Internal {
                message: "embedding result missing".to_string(),
            })
        })
    }

    /// Embed one chunk, splitting on whole-batch failures.
    async fn embed_chunk(&self, texts: &[String]) -> Vec<EmbedResult> {
        let mut results: Vec<Option<EmbedResult>> = vec![None; texts.len()];
        let mut queue: VecDeque<(usize, usize, u32)> = VecDeque::new();
        queue.push_back((0, texts.len(), 0));

        while let Some((start, end, attempt)) = queue.pop_front() {
            let slice = &texts[start..end];
            match self.provider.embed_batch(slice).await {
                Ok(items) if items.len() == slice.len() => {
                    for (i, item) in items.into_iter().enumerate() {
                        results[start + i] = Some(item);
                    }
                }
                Ok(items) => {
                    tracing::error!(
                        sent = slice.len(),
                        received = items.len(),
                        "embedding provider broke the per-item contract"
                    );
                    for slot in results[start..end].iter_mut() {
                        *slot = Some(Err(StoreError::EmbeddingService {
                            status: None,
                            reason: "provider returned wrong result count".to_string(),
                        }));
                    }
                }
                Err(err) => {
                    let next_attempt = attempt + 1;
                    if next_attempt >= self.max_retries {
                        tracing::warn!(
                            error = %err,
                            items = slice.len(),
                            "embedding batch failed after retry ceiling"
                        );
                        for slot in results[start..end].iter_mut() {
                            *slot = Some(Err(err.clone()));
                        }
                        continue;
                    }

                    self.backoff(&err).await;
                    if end - start > 1 {
                        let mid = start + (end - start) / 2;
                        tracing::debug!(
                            error = %err,
                            items = slice.len(),
                            attempt = next_attempt,
                            "embedding batch failed, retrying in halves"
                        );
                        queue.push_back((start, mid, next_attempt));
                        queue.push_back((mid, end, next_attempt));
                    } else {
                        queue.push_back((start, end, next_attempt));
                    }
                }
            }
        }

        results
            .into_iter()
            .map(|slot| {
                slot.unwrap_or_else(|| {
                    Err(StoreError::Internal {
                        message: "embedding result missing".to_string(),
                    })
                })
            })
            .collect()
    }

    /// Wait before the next attempt; rate-limit responses extend the delay.
    async fn backoff(&self, err: &StoreError) {
        let delay = match err {
            StoreError::RateLimited {
                retry_after_seconds: Some(secs),
            } => Duration::from_secs((*secs).min(60)).max(self.retry_delay),
            _ => self.retry_delay,
        };
        if !delay.is_zero() {
            sleep(delay).await;
        }
    }
}

fn truncate_reason(body: &str) -> String {
    const MAX: usize = 300;
    if body.len() <= MAX {
        body.to_string()
    } else {
        let cut = body
            .char_indices()
            .take_while(|(i, _)| *i < MAX)
            .last()
            .map(|(i, c)| i + c.len_utf8())
            .unwrap_or(0);
        format!("{}...", &body[..cut])
    }
}
