//! Vector index trait and the in-memory implementation.
//!
//! [`VectorIndex`] abstracts nearest-neighbor storage the same way the
//! embedding and adjudication models are abstracted: upsert chunks keyed by
//! their own id, query by cosine similarity, delete per document. The
//! in-memory implementation is an explicitly owned value shared through an
//! `Arc`; concurrent upserts for different chunks cannot lose each other's
//! writes because every write is keyed by chunk id under one lock
//! acquisition. Nothing here tracks document indexing state; that lives in
//! the [`DocumentRegistry`](crate::documents::DocumentRegistry).

use async_trait::async_trait;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::types::{ChunkId, DocumentId, VerifyError};

/// Positional and provenance metadata carried alongside a chunk.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChunkMetadata {
    /// Human-readable source label (filename or document title).
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_number: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_char: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_char: Option<usize>,
}

impl ChunkMetadata {
    fn validate(&self) -> Result<(), VerifyError> {
        if let (Some(start), Some(end)) = (self.start_char, self.end_char) {
            if end <= start {
                return Err(VerifyError::config(format!(
                    "chunk span end_char ({end}) must exceed start_char ({start})"
                )));
            }
        }
        Ok(())
    }
}

/// A chunk as stored in the index: text, owned vector, and metadata.
#[derive(Clone, Debug)]
pub struct IndexedChunk {
    pub chunk_id: ChunkId,
    pub document_id: DocumentId,
    /// Position of the chunk within its document.
    pub sequence_index: usize,
    pub text: String,
    pub vector: Vec<f32>,
    pub metadata: ChunkMetadata,
}

/// A query hit: the chunk plus its cosine similarity to the query vector.
#[derive(Clone, Debug)]
pub struct ScoredChunk {
    pub chunk: IndexedChunk,
    pub score: f32,
}

/// Nearest-neighbor chunk storage.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Insert or replace the chunk keyed by its `chunk_id`.
    async fn upsert(&self, chunk: IndexedChunk) -> Result<(), VerifyError>;

    /// Top-`top_k` chunks by cosine similarity, descending; ties broken by
    /// insertion order. Chunks whose similarity is undefined (zero vector
    /// on either side) are excluded rather than faulting.
    async fn query(&self, vector: &[f32], top_k: usize) -> Result<Vec<ScoredChunk>, VerifyError>;

    /// Remove every chunk belonging to `document_id`; returns how many were
    /// removed. This is the explicit invalidation path for re-indexing.
    async fn delete_by_document(&self, document_id: DocumentId) -> Result<usize, VerifyError>;

    /// Total chunks stored.
    async fn count(&self) -> Result<usize, VerifyError>;
}

/// Cosine similarity with a zero-vector guard: mismatched dimensions or a
/// zero norm yield `None` (undefined) instead of dividing by zero.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Option<f32> {
    if a.len() != b.len() || a.is_empty() {
        return None;
    }
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return None;
    }
    Some(dot / (norm_a.sqrt() * norm_b.sqrt()))
}

#[derive(Clone, Debug)]
struct Slot {
    /// Monotonic stamp fixed at first insertion; replacing a chunk keeps
    /// its original position in tie-breaks.
    inserted_at: u64,
    chunk: IndexedChunk,
}

#[derive(Default)]
struct IndexState {
    slots: FxHashMap<ChunkId, Slot>,
    next_stamp: u64,
}

/// Process-local [`VectorIndex`] backed by a hash map under a `RwLock`.
#[derive(Default)]
pub struct InMemoryVectorIndex {
    state: RwLock<IndexState>,
}

impl InMemoryVectorIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VectorIndex for InMemoryVectorIndex {
    async fn upsert(&self, chunk: IndexedChunk) -> Result<(), VerifyError> {
        chunk.metadata.validate()?;
        let mut state = self.state.write();
        match state.slots.get_mut(&chunk.chunk_id) {
            Some(slot) => slot.chunk = chunk,
            None => {
                let stamp = state.next_stamp;
                state.next_stamp += 1;
                state.slots.insert(
                    chunk.chunk_id,
                    Slot {
                        inserted_at: stamp,
                        chunk,
                    },
                );
            }
        }
        Ok(())
    }

    async fn query(&self, vector: &[f32], top_k: usize) -> Result<Vec<ScoredChunk>, VerifyError> {
        if top_k == 0 {
            return Ok(Vec::new());
        }
        let state = self.state.read();
        let mut scored: Vec<(f32, u64, IndexedChunk)> = state
            .slots
            .values()
            .filter_map(|slot| {
                cosine_similarity(vector, &slot.chunk.vector)
                    .map(|score| (score, slot.inserted_at, slot.chunk.clone()))
            })
            .collect();
        drop(state);

        scored.sort_by(|a, b| {
            b.0.partial_cmp(&a.0)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.1.cmp(&b.1))
        });
        scored.truncate(top_k);
        Ok(scored
            .into_iter()
            .map(|(score, _, chunk)| ScoredChunk { chunk, score })
            .collect())
    }

    async fn delete_by_document(&self, document_id: DocumentId) -> Result<usize, VerifyError> {
        let mut state = self.state.write();
        let before = state.slots.len();
        state
            .slots
            .retain(|_, slot| slot.chunk.document_id != document_id);
        Ok(before - state.slots.len())
    }

    async fn count(&self) -> Result<usize, VerifyError> {
        Ok(self.state.read().slots.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn chunk_with(vector: Vec<f32>, document_id: DocumentId, seq: usize) -> IndexedChunk {
        IndexedChunk {
            chunk_id: Uuid::new_v4(),
            document_id,
            sequence_index: seq,
            text: format!("chunk {seq}"),
            vector,
            metadata: ChunkMetadata::default(),
        }
    }

    #[test]
    fn cosine_handles_zero_vectors() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), None);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), None);
        let score = cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]).unwrap();
        assert!((score - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn query_sorts_descending_and_respects_top_k() {
        let index = InMemoryVectorIndex::new();
        let doc = Uuid::new_v4();
        index.upsert(chunk_with(vec![1.0, 0.0], doc, 0)).await.unwrap();
        index.upsert(chunk_with(vec![0.8, 0.6], doc, 1)).await.unwrap();
        index.upsert(chunk_with(vec![0.0, 1.0], doc, 2)).await.unwrap();

        let hits = index.query(&[1.0, 0.0], 2).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert!(hits[0].score >= hits[1].score);
        assert_eq!(hits[0].chunk.sequence_index, 0);
        assert_eq!(hits[1].chunk.sequence_index, 1);
    }

    #[tokio::test]
    async fn ties_break_by_insertion_order() {
        let index = InMemoryVectorIndex::new();
        let doc = Uuid::new_v4();
        for seq in 0..3 {
            index.upsert(chunk_with(vec![1.0, 0.0], doc, seq)).await.unwrap();
        }
        let hits = index.query(&[1.0, 0.0], 3).await.unwrap();
        let order: Vec<usize> = hits.iter().map(|h| h.chunk.sequence_index).collect();
        assert_eq!(order, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn zero_vector_chunks_are_excluded_not_faulted() {
        let index = InMemoryVectorIndex::new();
        let doc = Uuid::new_v4();
        index.upsert(chunk_with(vec![0.0, 0.0], doc, 0)).await.unwrap();
        index.upsert(chunk_with(vec![1.0, 0.0], doc, 1)).await.unwrap();

        let hits = index.query(&[1.0, 0.0], 5).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].chunk.sequence_index, 1);
    }

    #[tokio::test]
    async fn upsert_replaces_by_chunk_id() {
        let index = InMemoryVectorIndex::new();
        let doc = Uuid::new_v4();
        let mut chunk = chunk_with(vec![1.0, 0.0], doc, 0);
        let id = chunk.chunk_id;
        index.upsert(chunk.clone()).await.unwrap();

        chunk.text = "revised".into();
        chunk.chunk_id = id;
        index.upsert(chunk).await.unwrap();

        assert_eq!(index.count().await.unwrap(), 1);
        let hits = index.query(&[1.0, 0.0], 1).await.unwrap();
        assert_eq!(hits[0].chunk.text, "revised");
    }

    #[tokio::test]
    async fn delete_by_document_removes_only_that_document() {
        let index = InMemoryVectorIndex::new();
        let doc_a = Uuid::new_v4();
        let doc_b = Uuid::new_v4();
        index.upsert(chunk_with(vec![1.0, 0.0], doc_a, 0)).await.unwrap();
        index.upsert(chunk_with(vec![1.0, 0.0], doc_a, 1)).await.unwrap();
        index.upsert(chunk_with(vec![1.0, 0.0], doc_b, 0)).await.unwrap();

        let removed = index.delete_by_document(doc_a).await.unwrap();
        assert_eq!(removed, 2);
        assert_eq!(index.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn invalid_span_metadata_is_rejected() {
        let index = InMemoryVectorIndex::new();
        let mut chunk = chunk_with(vec![1.0], Uuid::new_v4(), 0);
        chunk.metadata.start_char = Some(10);
        chunk.metadata.end_char = Some(10);
        assert!(index.upsert(chunk).await.is_err());
    }
}
