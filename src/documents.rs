//! Document records and the in-process registry.
//!
//! The registry stands in for the durable document store: it owns the
//! uploaded text, the primary/evidence classification, and the `indexed`
//! flag the orchestrator consults for idempotence. Text is immutable once
//! indexed; re-embedding changed content requires an explicit
//! [`DocumentRegistry::invalidate`] first.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{DocumentId, VerifyError};

/// Role of a document within a verification project.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    /// The prospectus whose claims are verified.
    Primary,
    /// A supporting document claims are verified against.
    Evidence,
}

/// One registered document.
#[derive(Clone, Debug)]
pub struct Document {
    pub id: DocumentId,
    pub name: String,
    pub kind: DocumentKind,
    pub text: String,
    pub indexed: bool,
    pub indexed_at: Option<DateTime<Utc>>,
}

impl Document {
    pub fn new(name: impl Into<String>, kind: DocumentKind, text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            kind,
            text: text.into(),
            indexed: false,
            indexed_at: None,
        }
    }
}

/// Shared registry of the documents in one project.
#[derive(Default)]
pub struct DocumentRegistry {
    inner: RwLock<FxHashMap<DocumentId, Document>>,
}

impl DocumentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a document and return its id.
    pub fn insert(&self, document: Document) -> DocumentId {
        let id = document.id;
        self.inner.write().insert(id, document);
        id
    }

    pub fn get(&self, id: DocumentId) -> Result<Document, VerifyError> {
        self.inner
            .read()
            .get(&id)
            .cloned()
            .ok_or_else(|| VerifyError::not_found(format!("document {id}")))
    }

    /// Whether the document has completed indexing.
    pub fn is_indexed(&self, id: DocumentId) -> Result<bool, VerifyError> {
        Ok(self.get(id)?.indexed)
    }

    pub fn mark_indexed(&self, id: DocumentId) -> Result<(), VerifyError> {
        let mut guard = self.inner.write();
        let doc = guard
            .get_mut(&id)
            .ok_or_else(|| VerifyError::not_found(format!("document {id}")))?;
        doc.indexed = true;
        doc.indexed_at = Some(Utc::now());
        Ok(())
    }

    /// Clear the indexed flag so the next indexing request re-embeds the
    /// document. The caller is responsible for deleting its index entries.
    pub fn invalidate(&self, id: DocumentId) -> Result<(), VerifyError> {
        let mut guard = self.inner.write();
        let doc = guard
            .get_mut(&id)
            .ok_or_else(|| VerifyError::not_found(format!("document {id}")))?;
        doc.indexed = false;
        doc.indexed_at = None;
        Ok(())
    }

    /// Ids of evidence documents that have not finished indexing.
    pub fn pending_evidence(&self) -> Vec<DocumentId> {
        let guard = self.inner.read();
        let mut ids: Vec<DocumentId> = guard
            .values()
            .filter(|d| d.kind == DocumentKind::Evidence && !d.indexed)
            .map(|d| d.id)
            .collect();
        ids.sort();
        ids
    }

    /// All evidence document ids.
    pub fn evidence_ids(&self) -> Vec<DocumentId> {
        let guard = self.inner.read();
        let mut ids: Vec<DocumentId> = guard
            .values()
            .filter(|d| d.kind == DocumentKind::Evidence)
            .map(|d| d.id)
            .collect();
        ids.sort();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_get_and_mark_indexed() {
        let registry = DocumentRegistry::new();
        let id = registry.insert(Document::new("annex.txt", DocumentKind::Evidence, "text"));
        assert!(!registry.is_indexed(id).unwrap());

        registry.mark_indexed(id).unwrap();
        let doc = registry.get(id).unwrap();
        assert!(doc.indexed);
        assert!(doc.indexed_at.is_some());
    }

    #[test]
    fn invalidate_clears_indexed_state() {
        let registry = DocumentRegistry::new();
        let id = registry.insert(Document::new("annex.txt", DocumentKind::Evidence, "text"));
        registry.mark_indexed(id).unwrap();
        registry.invalidate(id).unwrap();
        assert!(!registry.is_indexed(id).unwrap());
    }

    #[test]
    fn pending_evidence_ignores_primary_documents() {
        let registry = DocumentRegistry::new();
        registry.insert(Document::new("prospectus", DocumentKind::Primary, "text"));
        let evidence = registry.insert(Document::new("annex", DocumentKind::Evidence, "text"));

        assert_eq!(registry.pending_evidence(), vec![evidence]);
        registry.mark_indexed(evidence).unwrap();
        assert!(registry.pending_evidence().is_empty());
    }

    #[test]
    fn missing_document_is_not_found() {
        let registry = DocumentRegistry::new();
        assert!(matches!(
            registry.get(Uuid::new_v4()),
            Err(VerifyError::NotFound { .. })
        ));
    }
}
