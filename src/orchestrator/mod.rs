//! The verification orchestrator: wires chunking, embedding, retrieval,
//! and adjudication into the two long-running operations callers actually
//! invoke, indexing a document and verifying a prospectus.
//!
//! Indexing is idempotent on the registry's `indexed` flag. Verification
//! runs as a spawned job: claims are adjudicated in bounded concurrent
//! groups, verdicts are committed one claim at a time, and the returned
//! [`JobHandle`] carries status, progress, and cancellation. Only storage
//! failures abort a job; per-claim model failures downgrade to unverified
//! verdicts inside the adjudicator.

pub mod job;
pub mod progress;

use std::sync::Arc;

use futures_util::future::join_all;
use parking_lot::Mutex;
use rustc_hash::FxHashSet;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::adjudication::{Adjudicator, AdjudicationModel};
use crate::chunking::chunk;
use crate::claims::{Claim, ClaimSegmenter, ClaimStatus, ClaimStore, ReviewVerdict, SentenceSegmenter, Verdict};
use crate::config::EngineConfig;
use crate::documents::{DocumentKind, DocumentRegistry};
use crate::embedding::{Embedder, EmbeddingProvider};
use crate::index::{ChunkMetadata, InMemoryVectorIndex, IndexedChunk, VectorIndex};
use crate::retrieval::Retriever;
use crate::types::{DocumentId, VerifyError};

pub use job::{CancelToken, JobHandle, JobState, JobStatus, VerdictCounts};
pub use progress::{ChannelSink, NullSink, ProgressEvent, ProgressSink};

/// Result of an indexing request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IndexOutcome {
    /// The document was already indexed; nothing was re-embedded.
    AlreadyIndexed,
    Indexed {
        chunks_indexed: usize,
        chunks_skipped: usize,
    },
    /// The run was cancelled between batches. Chunks already upserted stay
    /// in the index; the document is not marked indexed, so a later request
    /// starts over and replaces them.
    Cancelled { chunks_indexed: usize },
}

pub struct VerificationOrchestrator {
    config: EngineConfig,
    registry: Arc<DocumentRegistry>,
    index: Arc<dyn VectorIndex>,
    claims: Arc<ClaimStore>,
    embedder: Embedder,
    adjudicator: Adjudicator,
    segmenter: Arc<dyn ClaimSegmenter>,
    sink: Arc<dyn ProgressSink>,
    active: Mutex<FxHashSet<DocumentId>>,
}

impl VerificationOrchestrator {
    pub fn new(
        config: EngineConfig,
        embedding: Arc<dyn EmbeddingProvider>,
        model: Arc<dyn AdjudicationModel>,
    ) -> Result<Self, VerifyError> {
        config.validate()?;
        let embedder = Embedder::new(
            embedding,
            config.retry.clone(),
            config.embed_batch_size,
            config.embed_concurrency,
        );
        let adjudicator = Adjudicator::new(model, config.retry.clone(), config.min_claim_chars);
        Ok(Self {
            config,
            registry: Arc::new(DocumentRegistry::new()),
            index: Arc::new(InMemoryVectorIndex::new()),
            claims: Arc::new(ClaimStore::new()),
            embedder,
            adjudicator,
            segmenter: Arc::new(SentenceSegmenter),
            sink: Arc::new(NullSink),
            active: Mutex::new(FxHashSet::default()),
        })
    }

    /// Swap in a different nearest-neighbor backend.
    #[must_use]
    pub fn with_index(mut self, index: Arc<dyn VectorIndex>) -> Self {
        self.index = index;
        self
    }

    #[must_use]
    pub fn with_segmenter(mut self, segmenter: Arc<dyn ClaimSegmenter>) -> Self {
        self.segmenter = segmenter;
        self
    }

    #[must_use]
    pub fn with_progress_sink(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn registry(&self) -> &Arc<DocumentRegistry> {
        &self.registry
    }

    pub fn claims(&self, document_id: DocumentId) -> Vec<Claim> {
        self.claims.claims(document_id)
    }

    /// Chunk, embed, and index one document. A second call for an already
    /// indexed document is a no-op; changed content must go through
    /// [`reindex_document`](Self::reindex_document).
    pub async fn index_document(
        &self,
        document_id: DocumentId,
    ) -> Result<IndexOutcome, VerifyError> {
        self.index_document_cancellable(document_id, &CancelToken::new())
            .await
    }

    /// [`index_document`](Self::index_document) with a cancellation
    /// checkpoint between embed batches. Cancellation is best effort: the
    /// batch in flight finishes and its chunks are committed before the
    /// flag is observed.
    #[instrument(skip(self, cancel), fields(document_id = %document_id))]
    pub async fn index_document_cancellable(
        &self,
        document_id: DocumentId,
        cancel: &CancelToken,
    ) -> Result<IndexOutcome, VerifyError> {
        let document = self.registry.get(document_id)?;
        if document.indexed {
            info!(target: "claimsmith::orchestrator", "document already indexed, skipping");
            return Ok(IndexOutcome::AlreadyIndexed);
        }

        let spans = chunk(
            &document.text,
            self.config.chunk_size,
            self.config.chunk_overlap,
        )?;
        // Clear partial leftovers from a cancelled earlier run.
        self.index.delete_by_document(document_id).await?;
        self.sink.publish(ProgressEvent::IndexingStarted {
            document_id,
            chunks_total: spans.len(),
        });

        let mut indexed = 0usize;
        let mut skipped = 0usize;
        let mut processed = 0usize;
        for batch in spans.chunks(self.config.embed_batch_size.max(1)) {
            if cancel.is_cancelled() {
                warn!(
                    target: "claimsmith::orchestrator",
                    chunks_indexed = indexed,
                    chunks_total = spans.len(),
                    "indexing cancelled, committed chunks kept"
                );
                return Ok(IndexOutcome::Cancelled {
                    chunks_indexed: indexed,
                });
            }

            let texts: Vec<String> = batch.iter().map(|s| s.text.clone()).collect();
            let vectors = self.embedder.embed_batch(&texts).await;

            for (span, vector) in batch.iter().zip(vectors) {
                match vector {
                    Some(vector) => {
                        self.index
                            .upsert(IndexedChunk {
                                chunk_id: Uuid::new_v4(),
                                document_id,
                                sequence_index: span.sequence_index,
                                text: span.text.clone(),
                                vector,
                                metadata: ChunkMetadata {
                                    source: document.name.clone(),
                                    page_number: None,
                                    start_char: Some(span.start_char),
                                    end_char: Some(span.end_char),
                                },
                            })
                            .await?;
                        indexed += 1;
                    }
                    None => {
                        warn!(
                            target: "claimsmith::orchestrator",
                            sequence_index = span.sequence_index,
                            "chunk excluded after embedding failure"
                        );
                        skipped += 1;
                    }
                }
            }

            processed += batch.len();
            self.sink.publish(ProgressEvent::IndexingProgress {
                document_id,
                chunks_processed: processed,
                chunks_total: spans.len(),
            });
        }

        self.registry.mark_indexed(document_id)?;
        self.sink.publish(ProgressEvent::IndexingCompleted {
            document_id,
            chunks_indexed: indexed,
            chunks_skipped: skipped,
        });
        info!(
            target: "claimsmith::orchestrator",
            chunks_indexed = indexed,
            chunks_skipped = skipped,
            "document indexed"
        );
        Ok(IndexOutcome::Indexed {
            chunks_indexed: indexed,
            chunks_skipped: skipped,
        })
    }

    /// Drop a document's index entries and embed it afresh. This is the
    /// only path that re-embeds already indexed content.
    pub async fn reindex_document(
        &self,
        document_id: DocumentId,
    ) -> Result<IndexOutcome, VerifyError> {
        self.registry.invalidate(document_id)?;
        self.index.delete_by_document(document_id).await?;
        self.index_document(document_id).await
    }

    /// Start verifying the claims of a primary document against the
    /// indexed evidence. Returns immediately with a [`JobHandle`]; the job
    /// runs on the Tokio runtime.
    ///
    /// With `rerun` unset, a document whose claims already carry verdicts
    /// is rejected with [`VerifyError::AlreadyVerified`]. A rerun replaces
    /// verdicts in place, claim by claim.
    pub fn start_verification(
        self: &Arc<Self>,
        document_id: DocumentId,
        rerun: bool,
    ) -> Result<JobHandle, VerifyError> {
        let document = self.registry.get(document_id)?;
        if document.kind != DocumentKind::Primary {
            return Err(VerifyError::config(format!(
                "document {document_id} is not a primary document"
            )));
        }

        let pending = self.registry.pending_evidence();
        if !pending.is_empty() {
            return Err(VerifyError::DependencyNotReady { pending });
        }
        if !rerun && self.claims.any_adjudicated(document_id) {
            return Err(VerifyError::AlreadyVerified(document_id));
        }
        {
            let mut active = self.active.lock();
            if !active.insert(document_id) {
                return Err(VerifyError::VerificationInProgress(document_id));
            }
        }

        let texts = self.segmenter.extract(&document.text);
        let total = self.claims.reconcile(document_id, &texts);

        let job = JobHandle::new(Uuid::new_v4(), document_id);
        job.set_totals(total);
        info!(
            target: "claimsmith::orchestrator",
            job_id = %job.id(),
            claims_total = total,
            rerun,
            "verification job started"
        );

        let orchestrator = Arc::clone(self);
        let handle = job.clone();
        tokio::spawn(async move {
            orchestrator.run_job(handle).await;
        });
        Ok(job)
    }

    /// Apply a human review verdict to one claim, bypassing the model.
    pub fn review_claim(
        &self,
        document_id: DocumentId,
        sequence_index: usize,
        review: ReviewVerdict,
        notes: Option<String>,
    ) -> Result<Claim, VerifyError> {
        self.claims.review(document_id, sequence_index, review, notes)
    }

    async fn run_job(self: Arc<Self>, job: JobHandle) {
        let document_id = job.document_id();
        job.set_state(JobState::Processing);
        self.sink.publish(ProgressEvent::JobStateChanged {
            job_id: job.id(),
            state: JobState::Processing,
        });

        let retriever = Retriever::new(
            self.embedder.clone(),
            Arc::clone(&self.index),
            self.config.top_k,
        );
        let claims = self.claims.claims(document_id);
        let total = claims.len();
        let mut adjudicated = 0usize;
        let mut counts = VerdictCounts::default();

        for group in claims.chunks(self.config.claim_group_size.max(1)) {
            if job.is_cancelled() {
                warn!(
                    target: "claimsmith::orchestrator",
                    job_id = %job.id(),
                    claims_adjudicated = adjudicated,
                    "verification cancelled, committed verdicts kept"
                );
                self.finish(&job, document_id, |j| {
                    j.fail("verification cancelled before completion")
                });
                return;
            }

            let min_claim_chars = self.config.min_claim_chars;
            let outcomes: Vec<Result<Option<Verdict>, VerifyError>> =
                join_all(group.iter().map(|claim| {
                let retriever = &retriever;
                let adjudicator = &self.adjudicator;
                async move {
                    // Noise fragments never reach retrieval or the model.
                    if claim.text.trim().chars().count() < min_claim_chars {
                        return Ok(None);
                    }
                    let evidence = retriever.retrieve(&claim.text).await?;
                    Ok(adjudicator.adjudicate(&claim.text, &evidence).await)
                }
            }))
            .await;

            for (claim, outcome) in group.iter().zip(outcomes) {
                let verdict = match outcome {
                    Ok(verdict) => verdict,
                    // Index read failures are storage faults and fail the
                    // job; only a failed claim embedding counts as empty
                    // evidence.
                    Err(err) => {
                        warn!(
                            target: "claimsmith::orchestrator",
                            job_id = %job.id(),
                            error = %err,
                            "evidence retrieval failed, aborting job"
                        );
                        self.finish(&job, document_id, |j| {
                            j.fail(format!("evidence retrieval failed: {err}"))
                        });
                        return;
                    }
                };
                adjudicated += 1;
                let Some(verdict) = verdict else {
                    continue;
                };
                match verdict.status {
                    ClaimStatus::Verified => counts.verified += 1,
                    ClaimStatus::Partial => counts.partial += 1,
                    ClaimStatus::Unverified => counts.unverified += 1,
                    ClaimStatus::Pending => {}
                }
                if let Err(err) =
                    self.claims
                        .apply_verdict(document_id, claim.sequence_index, verdict)
                {
                    warn!(
                        target: "claimsmith::orchestrator",
                        job_id = %job.id(),
                        error = %err,
                        "verdict commit failed, aborting job"
                    );
                    self.finish(&job, document_id, |j| {
                        j.fail(format!("verdict commit failed: {err}"))
                    });
                    return;
                }
            }

            job.record_progress(adjudicated, counts);
            self.sink.publish(ProgressEvent::VerificationProgress {
                job_id: job.id(),
                claims_adjudicated: adjudicated,
                claims_total: total,
                progress: job.status().progress,
            });
        }

        self.finish(&job, document_id, |j| j.set_state(JobState::Completed));
        self.sink.publish(ProgressEvent::VerificationCompleted {
            job_id: job.id(),
            verified: counts.verified,
            partial: counts.partial,
            unverified: counts.unverified,
        });
        info!(
            target: "claimsmith::orchestrator",
            job_id = %job.id(),
            verified = counts.verified,
            partial = counts.partial,
            unverified = counts.unverified,
            "verification job completed"
        );
    }

    fn finish(&self, job: &JobHandle, document_id: DocumentId, transition: impl FnOnce(&JobHandle)) {
        transition(job);
        self.active.lock().remove(&document_id);
        self.sink.publish(ProgressEvent::JobStateChanged {
            job_id: job.id(),
            state: job.status().state,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::documents::Document;
    use crate::embedding::MockEmbeddingProvider;
    use crate::retry::RetryPolicy;
    use async_trait::async_trait;

    struct AlwaysValidated;

    #[async_trait]
    impl AdjudicationModel for AlwaysValidated {
        async fn complete(&self, _system: &str, _prompt: &str) -> Result<String, VerifyError> {
            Ok(r#"{"status": "VALIDATED", "confidence": 90, "reasoning": "supported", "citations": []}"#.into())
        }
    }

    fn orchestrator() -> Arc<VerificationOrchestrator> {
        let config = EngineConfig::default().with_retry(RetryPolicy::immediate(2));
        Arc::new(
            VerificationOrchestrator::new(
                config,
                Arc::new(MockEmbeddingProvider::new()),
                Arc::new(AlwaysValidated),
            )
            .unwrap(),
        )
    }

    #[tokio::test]
    async fn verification_requires_indexed_evidence() {
        let orch = orchestrator();
        let primary = orch.registry().insert(Document::new(
            "prospectus",
            DocumentKind::Primary,
            "Revenue grew forty percent during fiscal 2023.",
        ));
        let evidence = orch.registry().insert(Document::new(
            "annex",
            DocumentKind::Evidence,
            "Audited figures show revenue grew forty percent.",
        ));

        let err = orch.start_verification(primary, false).unwrap_err();
        match err {
            VerifyError::DependencyNotReady { pending } => assert_eq!(pending, vec![evidence]),
            other => panic!("expected DependencyNotReady, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn evidence_documents_cannot_be_verified() {
        let orch = orchestrator();
        let evidence = orch
            .registry()
            .insert(Document::new("annex", DocumentKind::Evidence, "text"));
        assert!(matches!(
            orch.start_verification(evidence, false),
            Err(VerifyError::Configuration(_))
        ));
    }

    #[tokio::test]
    async fn indexing_twice_is_a_no_op() {
        let orch = orchestrator();
        let id = orch.registry().insert(Document::new(
            "annex",
            DocumentKind::Evidence,
            "Audited figures show revenue grew forty percent in fiscal 2023.",
        ));

        let first = orch.index_document(id).await.unwrap();
        assert!(matches!(first, IndexOutcome::Indexed { .. }));
        let second = orch.index_document(id).await.unwrap();
        assert_eq!(second, IndexOutcome::AlreadyIndexed);
    }
}
