//! Claim records, verdicts, and the per-document claim store.
//!
//! A claim is one atomic verifiable statement extracted from the primary
//! document. Claims are created once per document, keyed by
//! `sequence_index`, and mutated in place only through verdict application
//! (adjudication or human review). Re-running verification reconciles
//! against the existing records rather than appending new ones, so a rerun
//! over an unchanged document touches exactly the same ids.

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::evidence::EvidenceList;
use crate::types::{DocumentId, VerifyError};

/// Verification status of a claim.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClaimStatus {
    /// Not yet adjudicated (or skipped as a noise fragment).
    Pending,
    /// Evidence directly and fully supports the claim.
    Verified,
    /// Evidence supports with a discrepancy or covers the claim only
    /// partially.
    Partial,
    /// Evidence contradicts the claim or no sufficient evidence exists.
    Unverified,
}

impl ClaimStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ClaimStatus::Pending)
    }
}

/// The complete outcome of adjudicating one claim. Applied to a claim as a
/// single atomic write: status, confidence, reasoning, and evidence always
/// change together.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Verdict {
    pub status: ClaimStatus,
    /// Confidence in the verdict, 0 through 100.
    pub confidence: u8,
    pub reasoning: String,
    pub evidence: EvidenceList,
}

impl Verdict {
    /// Deterministic verdict for a claim with no retrieved evidence.
    pub fn no_evidence() -> Self {
        Self {
            status: ClaimStatus::Unverified,
            confidence: 0,
            reasoning: "no evidence retrieved from supporting documents".into(),
            evidence: EvidenceList::empty(),
        }
    }

    /// Downgrade verdict for a claim whose adjudication call failed
    /// permanently.
    pub fn adjudication_failed() -> Self {
        Self {
            status: ClaimStatus::Unverified,
            confidence: 0,
            reasoning: "adjudication failed".into(),
            evidence: EvidenceList::empty(),
        }
    }
}

/// Human override applied during claim review, bypassing the adjudicator.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReviewVerdict {
    Validated,
    Uncertain,
    Incorrect,
}

impl ReviewVerdict {
    fn as_verdict(self, notes: Option<String>) -> Verdict {
        let (status, confidence) = match self {
            ReviewVerdict::Validated => (ClaimStatus::Verified, 100),
            ReviewVerdict::Uncertain => (ClaimStatus::Partial, 50),
            ReviewVerdict::Incorrect => (ClaimStatus::Unverified, 0),
        };
        Verdict {
            status,
            confidence,
            reasoning: notes.unwrap_or_else(|| "manually reviewed".into()),
            evidence: EvidenceList::empty(),
        }
    }
}

/// One verifiable statement from the primary document.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Claim {
    /// Stable id within the document, assigned at extraction.
    pub sequence_index: usize,
    pub text: String,
    pub status: ClaimStatus,
    /// Absent while the claim is pending.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    #[serde(default)]
    pub evidence: EvidenceList,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_number: Option<u32>,
}

impl Claim {
    pub fn pending(sequence_index: usize, text: impl Into<String>) -> Self {
        Self {
            sequence_index,
            text: text.into(),
            status: ClaimStatus::Pending,
            confidence: None,
            reasoning: None,
            evidence: EvidenceList::empty(),
            page_number: None,
        }
    }

    fn apply(&mut self, verdict: Verdict) {
        self.status = verdict.status;
        self.confidence = Some(verdict.confidence.min(100));
        self.reasoning = Some(verdict.reasoning);
        self.evidence = verdict.evidence;
    }
}

/// Splits primary-document text into atomic claims. The real segmentation
/// service lives behind this seam; [`SentenceSegmenter`] is the shipped
/// default.
pub trait ClaimSegmenter: Send + Sync {
    fn extract(&self, text: &str) -> Vec<String>;
}

/// Naive sentence-per-claim segmentation: split on terminal punctuation
/// followed by whitespace, and on line breaks.
#[derive(Clone, Copy, Debug, Default)]
pub struct SentenceSegmenter;

impl ClaimSegmenter for SentenceSegmenter {
    fn extract(&self, text: &str) -> Vec<String> {
        let mut claims = Vec::new();
        let mut current = String::new();
        let mut chars = text.chars().peekable();
        while let Some(c) = chars.next() {
            if c == '\n' {
                flush(&mut current, &mut claims);
                continue;
            }
            current.push(c);
            if matches!(c, '.' | '!' | '?')
                && chars.peek().is_none_or(|next| next.is_whitespace())
            {
                flush(&mut current, &mut claims);
            }
        }
        flush(&mut current, &mut claims);
        claims
    }
}

fn flush(current: &mut String, claims: &mut Vec<String>) {
    let trimmed = current.trim();
    if !trimmed.is_empty() {
        claims.push(trimmed.to_string());
    }
    current.clear();
}

/// Shared store of claim records, keyed by primary document.
#[derive(Default)]
pub struct ClaimStore {
    inner: RwLock<FxHashMap<DocumentId, Vec<Claim>>>,
}

impl ClaimStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Align the stored records with a fresh extraction, matching by
    /// `sequence_index`. Existing records keep their identity (and current
    /// verdicts, pending in-place replacement); surplus old records are
    /// truncated. Returns the resulting claim count.
    pub fn reconcile(&self, document_id: DocumentId, texts: &[String]) -> usize {
        let mut guard = self.inner.write();
        let claims = guard.entry(document_id).or_default();
        for (idx, text) in texts.iter().enumerate() {
            match claims.get_mut(idx) {
                Some(existing) => {
                    if existing.text != *text {
                        // Changed text invalidates the old verdict.
                        *existing = Claim::pending(idx, text.clone());
                    }
                }
                None => claims.push(Claim::pending(idx, text.clone())),
            }
        }
        claims.truncate(texts.len());
        claims.len()
    }

    /// Snapshot of the claims for one document, ordered by sequence index.
    pub fn claims(&self, document_id: DocumentId) -> Vec<Claim> {
        self.inner
            .read()
            .get(&document_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Whether any claim for the document already carries a verdict.
    pub fn any_adjudicated(&self, document_id: DocumentId) -> bool {
        self.inner
            .read()
            .get(&document_id)
            .is_some_and(|claims| claims.iter().any(|c| c.status.is_terminal()))
    }

    /// Replace one claim's verdict in place. The whole verdict is written
    /// under a single lock acquisition; readers never observe a claim with
    /// a new status but stale evidence.
    pub fn apply_verdict(
        &self,
        document_id: DocumentId,
        sequence_index: usize,
        verdict: Verdict,
    ) -> Result<(), VerifyError> {
        let mut guard = self.inner.write();
        let claim = guard
            .get_mut(&document_id)
            .and_then(|claims| claims.get_mut(sequence_index))
            .ok_or_else(|| {
                VerifyError::not_found(format!("claim {sequence_index} of document {document_id}"))
            })?;
        claim.apply(verdict);
        Ok(())
    }

    /// Human review override; bypasses the adjudicator entirely.
    pub fn review(
        &self,
        document_id: DocumentId,
        sequence_index: usize,
        review: ReviewVerdict,
        notes: Option<String>,
    ) -> Result<Claim, VerifyError> {
        self.apply_verdict(document_id, sequence_index, review.as_verdict(notes))?;
        let guard = self.inner.read();
        Ok(guard[&document_id][sequence_index].clone())
    }
}
