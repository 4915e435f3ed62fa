//! ```text
//! Documents ──► chunking::chunk ──► embedding::Embedder ──► index::VectorIndex
//!                                                                 │
//! Primary text ──► claims::ClaimSegmenter ──► ClaimStore          │
//!                              │                                  │
//!                              └─► retrieval::Retriever ◄─────────┘
//!                                          │
//!                                          ▼
//!                        adjudication::Adjudicator ──► claims::Verdict
//!                                          │
//! orchestrator::VerificationOrchestrator ──┴──► JobHandle / ProgressSink
//! ```
//!
pub mod adjudication;
pub mod chunking;
pub mod claims;
pub mod config;
pub mod documents;
pub mod embedding;
pub mod evidence;
pub mod index;
pub mod orchestrator;
pub mod retrieval;
pub mod retry;
pub mod types;

pub use adjudication::{AdjudicationModel, Adjudicator, HttpAdjudicationModel};
pub use chunking::{chunk, ChunkSpan};
pub use claims::{Claim, ClaimSegmenter, ClaimStatus, ClaimStore, ReviewVerdict, SentenceSegmenter, Verdict};
pub use config::EngineConfig;
pub use documents::{Document, DocumentKind, DocumentRegistry};
pub use embedding::{Embedder, EmbeddingProvider, HttpEmbeddingProvider, MockEmbeddingProvider};
pub use evidence::{EvidenceEntry, EvidenceList};
pub use index::{ChunkMetadata, InMemoryVectorIndex, IndexedChunk, ScoredChunk, VectorIndex};
pub use orchestrator::{
    CancelToken, ChannelSink, IndexOutcome, JobHandle, JobState, JobStatus, NullSink,
    ProgressEvent, ProgressSink, VerdictCounts, VerificationOrchestrator,
};
pub use retrieval::Retriever;
pub use retry::RetryPolicy;
pub use types::{ChunkId, DocumentId, JobId, VerifyError};
