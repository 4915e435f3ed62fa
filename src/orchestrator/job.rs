//! Verification job state and the handle callers hold on a running job.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::watch;

use crate::types::{DocumentId, JobId};

/// Shared cancellation flag for long-running work that has no full job
/// handle, such as an in-flight indexing run. Clones observe the same
/// flag.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Lifecycle of a verification job.
#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Pending,
    /// Supporting documents are still indexing. The orchestrator rejects a
    /// verification request in that situation up front
    /// ([`DependencyNotReady`](crate::types::VerifyError::DependencyNotReady))
    /// rather than parking a job here, so this state only appears when a
    /// caller mirrors status from an external scheduler that queues jobs
    /// behind indexing.
    Indexing,
    Processing,
    Completed,
    Failed,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed)
    }
}

/// Running tallies of adjudicated verdicts.
#[derive(Clone, Copy, Debug, Default, Serialize, PartialEq, Eq)]
pub struct VerdictCounts {
    pub verified: usize,
    pub partial: usize,
    pub unverified: usize,
}

/// Point-in-time snapshot of a job.
#[derive(Clone, Debug, Serialize)]
pub struct JobStatus {
    pub job_id: JobId,
    pub document_id: DocumentId,
    pub state: JobState,
    /// Fraction of the run completed, 0.0 through 1.0, monotonic.
    pub progress: f32,
    pub claims_total: usize,
    pub claims_adjudicated: usize,
    pub counts: VerdictCounts,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

struct JobInner {
    status: Mutex<JobStatus>,
    cancel: AtomicBool,
    done_tx: watch::Sender<bool>,
}

/// Cloneable handle on a verification job: inspect status, request
/// cancellation, await completion. The orchestrator holds the same handle
/// and drives the state transitions.
#[derive(Clone)]
pub struct JobHandle {
    inner: Arc<JobInner>,
    done_rx: watch::Receiver<bool>,
}

impl std::fmt::Debug for JobHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let status = self.status();
        f.debug_struct("JobHandle")
            .field("job_id", &status.job_id)
            .field("state", &status.state)
            .field("progress", &status.progress)
            .finish()
    }
}

impl JobHandle {
    pub(crate) fn new(job_id: JobId, document_id: DocumentId) -> Self {
        let (done_tx, done_rx) = watch::channel(false);
        Self {
            inner: Arc::new(JobInner {
                status: Mutex::new(JobStatus {
                    job_id,
                    document_id,
                    state: JobState::Pending,
                    progress: 0.0,
                    claims_total: 0,
                    claims_adjudicated: 0,
                    counts: VerdictCounts::default(),
                    error_message: None,
                    started_at: Utc::now(),
                    finished_at: None,
                }),
                cancel: AtomicBool::new(false),
                done_tx,
            }),
            done_rx,
        }
    }

    pub fn id(&self) -> JobId {
        self.inner.status.lock().job_id
    }

    pub fn document_id(&self) -> DocumentId {
        self.inner.status.lock().document_id
    }

    pub fn status(&self) -> JobStatus {
        self.inner.status.lock().clone()
    }

    /// Ask the job to stop at its next checkpoint. Work already committed
    /// stays committed.
    pub fn cancel(&self) {
        self.inner.cancel.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancel.load(Ordering::SeqCst)
    }

    /// Wait until the job reaches a terminal state and return the final
    /// status.
    pub async fn wait(&self) -> JobStatus {
        let mut rx = self.done_rx.clone();
        // A terminal state may already have been reached.
        while !*rx.borrow() {
            if rx.changed().await.is_err() {
                break;
            }
        }
        self.status()
    }

    pub(crate) fn set_state(&self, state: JobState) {
        let mut status = self.inner.status.lock();
        status.state = state;
        if state.is_terminal() {
            status.finished_at = Some(Utc::now());
            if status.state == JobState::Completed {
                status.progress = 1.0;
            }
            let _ = self.inner.done_tx.send(true);
        }
    }

    pub(crate) fn set_totals(&self, claims_total: usize) {
        self.inner.status.lock().claims_total = claims_total;
    }

    /// Record adjudication progress. Progress only moves forward; a
    /// recomputed fraction below the current value is ignored.
    pub(crate) fn record_progress(&self, claims_adjudicated: usize, counts: VerdictCounts) {
        let mut status = self.inner.status.lock();
        status.claims_adjudicated = claims_adjudicated;
        status.counts = counts;
        let fraction = if status.claims_total == 0 {
            1.0
        } else {
            claims_adjudicated as f32 / status.claims_total as f32
        };
        status.progress = status.progress.max(fraction.clamp(0.0, 1.0));
    }

    pub(crate) fn fail(&self, message: impl Into<String>) {
        self.inner.status.lock().error_message = Some(message.into());
        self.set_state(JobState::Failed);
    }
}
