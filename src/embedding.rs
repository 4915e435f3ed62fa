//! Embedding providers and the batching wrapper around them.
//!
//! [`EmbeddingProvider`] is the seam to the external embedding model; the
//! crate ships a deterministic [`MockEmbeddingProvider`] for tests and an
//! OpenAI-style [`HttpEmbeddingProvider`]. [`Embedder`] wraps a provider
//! with sub-batching, bounded in-flight batches, and retry with backoff.
//! A batch that still fails after retries yields `None` sentinels for its
//! items: those chunks are excluded from the index and logged, never
//! escalated to a pipeline failure.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

use crate::retry::RetryPolicy;
use crate::types::VerifyError;

/// Turns text into fixed-length vectors. `embed_batch` must preserve input
/// order and return exactly one vector per input.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, VerifyError>;

    /// Length of the vectors this provider produces.
    fn dimensions(&self) -> usize;
}

/// Deterministic hash-based embeddings for tests and offline runs.
///
/// Each whitespace token is hashed into one of the vector's components, so
/// texts sharing vocabulary land near each other under cosine similarity.
/// Identical input always produces identical output.
#[derive(Clone, Debug)]
pub struct MockEmbeddingProvider {
    dimensions: usize,
}

impl MockEmbeddingProvider {
    pub fn new() -> Self {
        Self { dimensions: 64 }
    }

    #[must_use]
    pub fn with_dimensions(mut self, dimensions: usize) -> Self {
        self.dimensions = dimensions;
        self
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];
        for token in text.split_whitespace() {
            let mut hasher = DefaultHasher::new();
            token.to_lowercase().hash(&mut hasher);
            let slot = (hasher.finish() as usize) % self.dimensions;
            vector[slot] += 1.0;
        }
        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        vector
    }
}

impl Default for MockEmbeddingProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EmbeddingProvider for MockEmbeddingProvider {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, VerifyError> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

/// Embedding provider speaking the OpenAI-compatible `/embeddings` wire
/// format over HTTP.
pub struct HttpEmbeddingProvider {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    model: String,
    dimensions: usize,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Deserialize)]
struct EmbeddingDatum {
    embedding: Vec<f32>,
}

impl HttpEmbeddingProvider {
    pub fn new(
        endpoint: impl Into<String>,
        model: impl Into<String>,
        dimensions: usize,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            api_key: None,
            model: model.into(),
            dimensions,
        }
    }

    #[must_use]
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }
}

#[async_trait]
impl EmbeddingProvider for HttpEmbeddingProvider {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, VerifyError> {
        let mut request = self
            .client
            .post(&self.endpoint)
            .json(&json!({ "model": self.model, "input": texts }));
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|err| VerifyError::Provider(format!("embedding request failed: {err}")))?;
        let status = response.status();
        if !status.is_success() {
            return Err(VerifyError::Provider(format!(
                "embedding endpoint returned {status}"
            )));
        }
        let body: EmbeddingResponse = response
            .json()
            .await
            .map_err(|err| VerifyError::Provider(format!("embedding response decode: {err}")))?;
        Ok(body.data.into_iter().map(|d| d.embedding).collect())
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

/// Batching and retry wrapper over an [`EmbeddingProvider`].
#[derive(Clone)]
pub struct Embedder {
    provider: Arc<dyn EmbeddingProvider>,
    retry: RetryPolicy,
    batch_size: usize,
    concurrency: usize,
}

impl Embedder {
    pub fn new(
        provider: Arc<dyn EmbeddingProvider>,
        retry: RetryPolicy,
        batch_size: usize,
        concurrency: usize,
    ) -> Self {
        Self {
            provider,
            retry,
            batch_size: batch_size.max(1),
            concurrency: concurrency.max(1),
        }
    }

    pub fn dimensions(&self) -> usize {
        self.provider.dimensions()
    }

    /// Embed one text. `None` means the provider failed permanently for
    /// this input; the caller decides what exclusion means.
    pub async fn embed(&self, text: &str) -> Option<Vec<f32>> {
        self.embed_batch(std::slice::from_ref(&text.to_string()))
            .await
            .into_iter()
            .next()
            .flatten()
    }

    /// Embed many texts, preserving input order. Each position holds
    /// `Some(vector)` on success or `None` when its batch exhausted the
    /// retry schedule.
    pub async fn embed_batch(&self, texts: &[String]) -> Vec<Option<Vec<f32>>> {
        if texts.is_empty() {
            return Vec::new();
        }

        let batches: Vec<Vec<String>> = texts
            .chunks(self.batch_size)
            .map(|c| c.to_vec())
            .collect();
        debug!(
            target: "claimsmith::embedding",
            inputs = texts.len(),
            batches = batches.len(),
            "embedding batch"
        );

        let results: Vec<Vec<Option<Vec<f32>>>> = stream::iter(batches)
            .map(|batch| {
                let provider = Arc::clone(&self.provider);
                let retry = self.retry.clone();
                async move {
                    let expected = batch.len();
                    let outcome = retry
                        .run("embed_batch", || {
                            let provider = Arc::clone(&provider);
                            let batch = batch.clone();
                            async move {
                                let vectors = provider.embed_batch(&batch).await?;
                                if vectors.len() != expected {
                                    return Err(VerifyError::Provider(format!(
                                        "provider returned {} vectors for {} inputs",
                                        vectors.len(),
                                        expected
                                    )));
                                }
                                Ok(vectors)
                            }
                        })
                        .await;
                    match outcome {
                        Ok(vectors) => vectors.into_iter().map(Some).collect(),
                        Err(err) => {
                            warn!(
                                target: "claimsmith::embedding",
                                items = expected,
                                error = %err,
                                "embedding batch exhausted retries, excluding items"
                            );
                            vec![None; expected]
                        }
                    }
                }
            })
            .buffered(self.concurrency)
            .collect()
            .await;

        results.into_iter().flatten().collect()
    }
}
