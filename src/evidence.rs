//! Canonical evidence collections.
//!
//! Every citation attached to a claim lives in an [`EvidenceList`]: an
//! ordered sequence of `{text, source_id?}` entries. This module is the
//! single parse/serialize boundary for that shape. Older exports stored a
//! claim's citation as one plain string; decoding accepts that form and
//! lifts it into a one-entry list with no resolved source, so consumers
//! never reimplement the fallback.

use serde::de::Deserializer;
use serde::{Deserialize, Serialize};

use crate::types::DocumentId;

/// One piece of cited evidence: an excerpt and, when resolvable, the
/// document it came from.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct EvidenceEntry {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_id: Option<DocumentId>,
}

impl EvidenceEntry {
    pub fn new(text: impl Into<String>, source_id: Option<DocumentId>) -> Self {
        Self {
            text: text.into(),
            source_id,
        }
    }

    /// An excerpt with no resolved source document.
    pub fn unsourced(text: impl Into<String>) -> Self {
        Self::new(text, None)
    }
}

/// Ordered collection of evidence entries for one claim.
///
/// Serializes as a JSON array of structured entries. Deserialization also
/// accepts the legacy single-string citation form:
///
/// ```
/// use claimsmith::evidence::EvidenceList;
///
/// let legacy: EvidenceList = serde_json::from_str(r#""quoted passage""#).unwrap();
/// assert_eq!(legacy.len(), 1);
/// assert_eq!(legacy.entries()[0].text, "quoted passage");
/// assert!(legacy.entries()[0].source_id.is_none());
/// ```
#[derive(Clone, Debug, Default, Serialize, PartialEq, Eq)]
pub struct EvidenceList(Vec<EvidenceEntry>);

impl EvidenceList {
    pub fn new(entries: Vec<EvidenceEntry>) -> Self {
        Self(entries)
    }

    pub fn empty() -> Self {
        Self(Vec::new())
    }

    /// Lift a legacy plain-string citation into a one-entry list.
    pub fn from_legacy(citation: impl Into<String>) -> Self {
        Self(vec![EvidenceEntry::unsourced(citation)])
    }

    pub fn entries(&self) -> &[EvidenceEntry] {
        &self.0
    }

    pub fn push(&mut self, entry: EvidenceEntry) {
        self.0.push(entry);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, EvidenceEntry> {
        self.0.iter()
    }
}

impl IntoIterator for EvidenceList {
    type Item = EvidenceEntry;
    type IntoIter = std::vec::IntoIter<EvidenceEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl FromIterator<EvidenceEntry> for EvidenceList {
    fn from_iter<I: IntoIterator<Item = EvidenceEntry>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'de> Deserialize<'de> for EvidenceList {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Structured(Vec<EvidenceEntry>),
            Legacy(String),
        }

        Ok(match Repr::deserialize(deserializer)? {
            Repr::Structured(entries) => EvidenceList(entries),
            Repr::Legacy(citation) => EvidenceList::from_legacy(citation),
        })
    }
}
