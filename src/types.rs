//! Shared identifiers and the crate-wide error taxonomy.
//!
//! Every fallible operation in claimsmith returns [`VerifyError`]. The
//! variants split along one axis that matters to callers: whether the
//! failure is transient (worth retrying through a
//! [`RetryPolicy`](crate::retry::RetryPolicy)) or terminal for the request
//! or job that triggered it.
//!
//! - [`VerifyError::Configuration`] is always fatal and never retried.
//! - [`VerifyError::Provider`] and [`VerifyError::Parse`] are transient:
//!   retried with backoff, then downgraded to a per-item outcome (an
//!   excluded chunk, an unverified claim) instead of failing the job.
//! - [`VerifyError::DependencyNotReady`] rejects a verification request
//!   up front; the caller re-requests once indexing completes.
//! - [`VerifyError::Storage`] fails the current job but leaves already
//!   committed chunks and claims in place.

use thiserror::Error;
use uuid::Uuid;

/// Identifier for a document registered with the engine.
pub type DocumentId = Uuid;

/// Identifier for an indexed chunk.
pub type ChunkId = Uuid;

/// Identifier for an orchestrated job.
pub type JobId = Uuid;

/// Error type shared across the verification engine.
#[derive(Debug, Error)]
pub enum VerifyError {
    /// Invalid tuning parameters (e.g. overlap >= chunk size). Fatal,
    /// surfaced immediately, never retried.
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// A call to an external provider (embedding or adjudication model)
    /// failed in a way that may succeed on retry: rate limit, timeout,
    /// transport error, non-2xx response.
    #[error("provider call failed: {0}")]
    Provider(String),

    /// The adjudication model returned output that does not conform to the
    /// expected verdict schema.
    #[error("unparseable model output: {0}")]
    Parse(String),

    /// Verification was requested while supporting documents are still
    /// indexing. Carries the ids of the pending documents so the caller can
    /// report exactly what is blocking.
    #[error("{} supporting document(s) still indexing", pending.len())]
    DependencyNotReady { pending: Vec<DocumentId> },

    /// The vector index or backing store is unreachable or rejected a
    /// write. Fails the current job; committed work is not rolled back.
    #[error("storage failure: {0}")]
    Storage(String),

    /// A referenced document or claim does not exist.
    #[error("{what} not found")]
    NotFound { what: String },

    /// Verification was requested for a document whose claims already carry
    /// verdicts, without asking for an explicit rerun.
    #[error("document {0} already has adjudicated claims; rerun must be explicit")]
    AlreadyVerified(DocumentId),

    /// A verification job for this document is already running. Runs on the
    /// same document are serialized.
    #[error("verification already in progress for document {0}")]
    VerificationInProgress(DocumentId),
}

impl VerifyError {
    /// Whether a [`RetryPolicy`](crate::retry::RetryPolicy) should attempt
    /// this call again.
    pub fn is_transient(&self) -> bool {
        matches!(self, VerifyError::Provider(_) | VerifyError::Parse(_))
    }

    /// Configuration shorthand used by validators.
    pub fn config(msg: impl Into<String>) -> Self {
        VerifyError::Configuration(msg.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        VerifyError::NotFound { what: what.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(VerifyError::Provider("429".into()).is_transient());
        assert!(VerifyError::Parse("bad json".into()).is_transient());
        assert!(!VerifyError::config("overlap").is_transient());
        assert!(!VerifyError::Storage("down".into()).is_transient());
        assert!(!VerifyError::DependencyNotReady { pending: vec![] }.is_transient());
    }

    #[test]
    fn dependency_error_names_count() {
        let err = VerifyError::DependencyNotReady {
            pending: vec![Uuid::new_v4(), Uuid::new_v4()],
        };
        assert!(err.to_string().contains("2 supporting document(s)"));
    }
}
