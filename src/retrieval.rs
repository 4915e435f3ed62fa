//! Claim-to-evidence retrieval.
//!
//! Ties the embedder and the vector index together: embed the claim text,
//! query for the nearest chunks, hand back at most `top_k` hits. A claim
//! whose embedding fails permanently retrieves nothing; the adjudication
//! layer turns an empty result into its deterministic no-evidence verdict,
//! so retrieval itself never fails a run.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::embedding::Embedder;
use crate::index::{ScoredChunk, VectorIndex};
use crate::types::VerifyError;

pub struct Retriever {
    embedder: Embedder,
    index: Arc<dyn VectorIndex>,
    top_k: usize,
}

impl Retriever {
    pub fn new(embedder: Embedder, index: Arc<dyn VectorIndex>, top_k: usize) -> Self {
        Self {
            embedder,
            index,
            top_k: top_k.max(1),
        }
    }

    /// Nearest chunks for one claim, best first, at most `top_k` of them.
    /// Empty when the index holds nothing or the claim could not be
    /// embedded.
    pub async fn retrieve(&self, claim_text: &str) -> Result<Vec<ScoredChunk>, VerifyError> {
        let Some(vector) = self.embedder.embed(claim_text).await else {
            warn!(
                target: "claimsmith::retrieval",
                claim = %truncate_for_log(claim_text),
                "claim embedding failed, retrieving no evidence"
            );
            return Ok(Vec::new());
        };

        let hits = self.index.query(&vector, self.top_k).await?;
        debug!(
            target: "claimsmith::retrieval",
            hits = hits.len(),
            top_k = self.top_k,
            "retrieved evidence chunks"
        );
        Ok(hits)
    }
}

fn truncate_for_log(text: &str) -> String {
    const MAX: usize = 60;
    if text.chars().count() <= MAX {
        text.to_string()
    } else {
        let head: String = text.chars().take(MAX).collect();
        format!("{head}…")
    }
}
