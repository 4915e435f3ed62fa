//! Engine tuning parameters.
//!
//! [`EngineConfig`] gathers every knob the pipeline consumes: chunking
//! geometry, retrieval depth, batch sizes, concurrency caps, and the skip
//! threshold for noise claims. All setters are builder-style; call
//! [`EngineConfig::validate`] (the orchestrator does this on construction)
//! to surface misconfiguration as a fatal
//! [`Configuration`](crate::types::VerifyError::Configuration) error before
//! any work starts.

use crate::retry::RetryPolicy;
use crate::types::VerifyError;

/// Tuning parameters for indexing and verification runs.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Character budget per chunk.
    pub chunk_size: usize,
    /// Characters repeated at the start of the next chunk.
    pub chunk_overlap: usize,
    /// Evidence chunks retrieved per claim.
    pub top_k: usize,
    /// Maximum texts per embedding provider call.
    pub embed_batch_size: usize,
    /// Embedding batches in flight at once.
    pub embed_concurrency: usize,
    /// Claims adjudicated concurrently per group.
    pub claim_group_size: usize,
    /// Claims shorter than this (in characters) bypass adjudication and
    /// stay pending.
    pub min_claim_chars: usize,
    /// Retry schedule shared by the embedder and adjudicator.
    pub retry: RetryPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            chunk_size: 800,
            chunk_overlap: 100,
            top_k: 3,
            embed_batch_size: 16,
            embed_concurrency: 5,
            claim_group_size: 4,
            min_claim_chars: 20,
            retry: RetryPolicy::default(),
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_chunking(mut self, chunk_size: usize, overlap: usize) -> Self {
        self.chunk_size = chunk_size;
        self.chunk_overlap = overlap;
        self
    }

    #[must_use]
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    #[must_use]
    pub fn with_embed_batching(mut self, batch_size: usize, concurrency: usize) -> Self {
        self.embed_batch_size = batch_size;
        self.embed_concurrency = concurrency;
        self
    }

    #[must_use]
    pub fn with_claim_group_size(mut self, size: usize) -> Self {
        self.claim_group_size = size;
        self
    }

    #[must_use]
    pub fn with_min_claim_chars(mut self, chars: usize) -> Self {
        self.min_claim_chars = chars;
        self
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Load overrides from the environment (and a `.env` file when present).
    ///
    /// Recognized variables, all optional:
    /// `CLAIMSMITH_CHUNK_SIZE`, `CLAIMSMITH_CHUNK_OVERLAP`,
    /// `CLAIMSMITH_TOP_K`, `CLAIMSMITH_EMBED_BATCH_SIZE`,
    /// `CLAIMSMITH_EMBED_CONCURRENCY`, `CLAIMSMITH_CLAIM_GROUP_SIZE`,
    /// `CLAIMSMITH_MIN_CLAIM_CHARS`, `CLAIMSMITH_RETRY_MAX_ATTEMPTS`.
    pub fn from_env() -> Result<Self, VerifyError> {
        dotenvy::dotenv().ok();
        let mut config = Self::default();

        if let Some(v) = read_env("CLAIMSMITH_CHUNK_SIZE")? {
            config.chunk_size = v;
        }
        if let Some(v) = read_env("CLAIMSMITH_CHUNK_OVERLAP")? {
            config.chunk_overlap = v;
        }
        if let Some(v) = read_env("CLAIMSMITH_TOP_K")? {
            config.top_k = v;
        }
        if let Some(v) = read_env("CLAIMSMITH_EMBED_BATCH_SIZE")? {
            config.embed_batch_size = v;
        }
        if let Some(v) = read_env("CLAIMSMITH_EMBED_CONCURRENCY")? {
            config.embed_concurrency = v;
        }
        if let Some(v) = read_env("CLAIMSMITH_CLAIM_GROUP_SIZE")? {
            config.claim_group_size = v;
        }
        if let Some(v) = read_env("CLAIMSMITH_MIN_CLAIM_CHARS")? {
            config.min_claim_chars = v;
        }
        if let Some(v) = read_env("CLAIMSMITH_RETRY_MAX_ATTEMPTS")? {
            config.retry.max_attempts = v as u32;
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject parameter combinations the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), VerifyError> {
        if self.chunk_size == 0 {
            return Err(VerifyError::config("chunk_size must be positive"));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(VerifyError::config(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        if self.top_k == 0 {
            return Err(VerifyError::config("top_k must be at least 1"));
        }
        if self.embed_batch_size == 0 {
            return Err(VerifyError::config("embed_batch_size must be at least 1"));
        }
        if self.embed_concurrency == 0 {
            return Err(VerifyError::config("embed_concurrency must be at least 1"));
        }
        if self.claim_group_size == 0 {
            return Err(VerifyError::config("claim_group_size must be at least 1"));
        }
        if self.retry.max_attempts == 0 {
            return Err(VerifyError::config("retry.max_attempts must be at least 1"));
        }
        Ok(())
    }
}

fn read_env(key: &str) -> Result<Option<usize>, VerifyError> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<usize>()
            .map(Some)
            .map_err(|err| VerifyError::config(format!("{key}={raw:?} is not a number: {err}"))),
        Err(_) => Ok(None),
    }
}
