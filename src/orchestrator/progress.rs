//! Progress events emitted while indexing and verifying.
//!
//! Sinks are fire-and-forget: publishing never blocks pipeline work and a
//! disconnected listener is not an error. The orchestrator publishes after
//! every committed unit of work (an embedded batch, an adjudicated group),
//! so a listener that connects mid-run still sees a monotonic sequence.

use serde::Serialize;

use crate::orchestrator::job::JobState;
use crate::types::{DocumentId, JobId};

/// One observable step of pipeline progress.
#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProgressEvent {
    IndexingStarted {
        document_id: DocumentId,
        chunks_total: usize,
    },
    IndexingProgress {
        document_id: DocumentId,
        chunks_processed: usize,
        chunks_total: usize,
    },
    IndexingCompleted {
        document_id: DocumentId,
        chunks_indexed: usize,
        chunks_skipped: usize,
    },
    JobStateChanged {
        job_id: JobId,
        state: JobState,
    },
    VerificationProgress {
        job_id: JobId,
        claims_adjudicated: usize,
        claims_total: usize,
        /// Fraction of the run completed, 0.0 through 1.0.
        progress: f32,
    },
    VerificationCompleted {
        job_id: JobId,
        verified: usize,
        partial: usize,
        unverified: usize,
    },
}

/// Receives progress events. Implementations must not block.
pub trait ProgressSink: Send + Sync {
    fn publish(&self, event: ProgressEvent);
}

/// Sink that discards everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullSink;

impl ProgressSink for NullSink {
    fn publish(&self, _event: ProgressEvent) {}
}

/// Sink backed by an unbounded channel. Dropping the receiver silently
/// stops delivery; the pipeline keeps running.
#[derive(Clone)]
pub struct ChannelSink {
    sender: flume::Sender<ProgressEvent>,
}

impl ChannelSink {
    pub fn pair() -> (Self, flume::Receiver<ProgressEvent>) {
        let (sender, receiver) = flume::unbounded();
        (Self { sender }, receiver)
    }
}

impl ProgressSink for ChannelSink {
    fn publish(&self, event: ProgressEvent) {
        let _ = self.sender.send(event);
    }
}
