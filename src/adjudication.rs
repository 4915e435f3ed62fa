//! Model-backed claim adjudication.
//!
//! [`AdjudicationModel`] is the seam to the judgment model: it takes a
//! system prompt and a user prompt and returns the raw completion text.
//! [`Adjudicator`] owns everything around that call: the skip rule for
//! noise fragments, the deterministic no-evidence short circuit, prompt
//! assembly, response parsing with a bounded re-ask on malformed output,
//! and the downgrade of permanent failures to an unverified verdict so a
//! single bad claim never takes down the run.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

use crate::claims::{ClaimStatus, Verdict};
use crate::evidence::{EvidenceEntry, EvidenceList};
use crate::index::ScoredChunk;
use crate::retry::RetryPolicy;
use crate::types::VerifyError;

const SYSTEM_PROMPT: &str = "You are a meticulous financial fact checker. You are given one claim \
from an IPO prospectus and numbered evidence excerpts from supporting documents. Judge whether \
the evidence supports the claim. Respond with a single JSON object: \
{\"status\": \"VALIDATED\" | \"UNCERTAIN\" | \"INCORRECT\", \"confidence\": 0-100, \
\"reasoning\": \"...\", \"citations\": [{\"excerpt\": \"...\"}]}. Cite only text that appears \
verbatim in the evidence. Do not add any prose outside the JSON object.";

/// Chat-style completion model used to judge claims.
#[async_trait]
pub trait AdjudicationModel: Send + Sync {
    async fn complete(&self, system: &str, prompt: &str) -> Result<String, VerifyError>;
}

/// [`AdjudicationModel`] speaking the OpenAI-compatible `/chat/completions`
/// wire format.
pub struct HttpAdjudicationModel {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    model: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: String,
}

impl HttpAdjudicationModel {
    pub fn new(endpoint: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            api_key: None,
            model: model.into(),
        }
    }

    #[must_use]
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }
}

#[async_trait]
impl AdjudicationModel for HttpAdjudicationModel {
    async fn complete(&self, system: &str, prompt: &str) -> Result<String, VerifyError> {
        let mut request = self.client.post(&self.endpoint).json(&json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": prompt },
            ],
            "temperature": 0.0,
        }));
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|err| VerifyError::Provider(format!("adjudication request failed: {err}")))?;
        let status = response.status();
        if !status.is_success() {
            return Err(VerifyError::Provider(format!(
                "adjudication endpoint returned {status}"
            )));
        }
        let body: ChatResponse = response.json().await.map_err(|err| {
            VerifyError::Provider(format!("adjudication response decode: {err}"))
        })?;
        body.choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| VerifyError::Provider("adjudication response had no choices".into()))
    }
}

/// Raw model output, as declared in the system prompt.
#[derive(Debug, Deserialize)]
struct RawVerdict {
    status: String,
    #[serde(default)]
    confidence: f64,
    #[serde(default)]
    reasoning: String,
    #[serde(default)]
    citations: Vec<RawCitation>,
}

#[derive(Debug, Deserialize)]
struct RawCitation {
    excerpt: String,
}

/// Judges one claim against its retrieved evidence.
pub struct Adjudicator {
    model: Arc<dyn AdjudicationModel>,
    retry: RetryPolicy,
    min_claim_chars: usize,
}

impl Adjudicator {
    pub fn new(model: Arc<dyn AdjudicationModel>, retry: RetryPolicy, min_claim_chars: usize) -> Self {
        Self {
            model,
            retry,
            min_claim_chars,
        }
    }

    /// Judge one claim. Returns `None` when the claim is too short to be a
    /// verifiable statement and was skipped. Never propagates model
    /// failures: a claim whose call exhausts the retry schedule gets the
    /// downgrade verdict instead.
    pub async fn adjudicate(&self, claim_text: &str, evidence: &[ScoredChunk]) -> Option<Verdict> {
        if claim_text.trim().chars().count() < self.min_claim_chars {
            debug!(
                target: "claimsmith::adjudication",
                chars = claim_text.trim().chars().count(),
                "skipping noise fragment"
            );
            return None;
        }
        if evidence.is_empty() {
            return Some(Verdict::no_evidence());
        }

        let prompt = build_prompt(claim_text, evidence);
        let outcome = self
            .retry
            .run("adjudicate", || {
                let model = Arc::clone(&self.model);
                let prompt = prompt.clone();
                async move {
                    let raw = model.complete(SYSTEM_PROMPT, &prompt).await?;
                    parse_verdict(&raw)
                }
            })
            .await;

        match outcome {
            Ok(raw) => Some(resolve_verdict(raw, evidence)),
            Err(err) => {
                warn!(
                    target: "claimsmith::adjudication",
                    error = %err,
                    "adjudication exhausted retries, downgrading claim"
                );
                Some(Verdict::adjudication_failed())
            }
        }
    }
}

fn build_prompt(claim_text: &str, evidence: &[ScoredChunk]) -> String {
    let mut prompt = format!("Claim:\n{claim_text}\n\nEvidence:\n");
    for (i, hit) in evidence.iter().enumerate() {
        let source = if hit.chunk.metadata.source.is_empty() {
            hit.chunk.document_id.to_string()
        } else {
            hit.chunk.metadata.source.clone()
        };
        prompt.push_str(&format!("[{}] (source: {source})\n{}\n\n", i + 1, hit.chunk.text));
    }
    prompt.push_str("Judge the claim against the evidence above.");
    prompt
}

/// Extract the first balanced JSON object from the completion and decode
/// it. Models occasionally wrap the object in prose or code fences; the
/// brace scan tolerates both.
fn parse_verdict(raw: &str) -> Result<RawVerdict, VerifyError> {
    let object = extract_json_object(raw)
        .ok_or_else(|| VerifyError::Parse("no JSON object in completion".into()))?;
    let verdict: RawVerdict = serde_json::from_str(object)
        .map_err(|err| VerifyError::Parse(format!("malformed verdict object: {err}")))?;
    match verdict.status.as_str() {
        "VALIDATED" | "UNCERTAIN" | "INCORRECT" => Ok(verdict),
        other => Err(VerifyError::Parse(format!("unknown status {other:?}"))),
    }
}

fn extract_json_object(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, c) in raw[start..].char_indices() {
        if in_string {
            match c {
                '\\' if !escaped => escaped = true,
                '"' if !escaped => in_string = false,
                _ => escaped = false,
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&raw[start..start + offset + c.len_utf8()]);
                }
            }
            _ => {}
        }
    }
    None
}

fn resolve_verdict(raw: RawVerdict, evidence: &[ScoredChunk]) -> Verdict {
    let status = match raw.status.as_str() {
        "VALIDATED" => ClaimStatus::Verified,
        "UNCERTAIN" => ClaimStatus::Partial,
        _ => ClaimStatus::Unverified,
    };
    let confidence = raw.confidence.clamp(0.0, 100.0).round() as u8;

    let mut list = EvidenceList::empty();
    for citation in raw.citations {
        let source_id = matching_chunk(&citation.excerpt, evidence).map(|c| c.chunk.document_id);
        list.push(EvidenceEntry::new(citation.excerpt, source_id));
    }

    Verdict {
        status,
        confidence,
        reasoning: raw.reasoning,
        evidence: list,
    }
}

/// The chunk whose text contains the cited excerpt, else the top-ranked
/// chunk as the best available attribution.
fn matching_chunk<'a>(excerpt: &str, evidence: &'a [ScoredChunk]) -> Option<&'a ScoredChunk> {
    evidence
        .iter()
        .find(|hit| hit.chunk.text.contains(excerpt))
        .or_else(|| evidence.first())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{ChunkMetadata, IndexedChunk};
    use parking_lot::Mutex;
    use uuid::Uuid;

    fn hit(text: &str, document_id: Uuid) -> ScoredChunk {
        ScoredChunk {
            chunk: IndexedChunk {
                chunk_id: Uuid::new_v4(),
                document_id,
                sequence_index: 0,
                text: text.to_string(),
                vector: vec![1.0, 0.0],
                metadata: ChunkMetadata {
                    source: "annex.txt".into(),
                    ..ChunkMetadata::default()
                },
            },
            score: 0.9,
        }
    }

    struct ScriptedModel {
        responses: Mutex<Vec<String>>,
    }

    impl ScriptedModel {
        fn new(responses: Vec<&str>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into_iter().rev().map(String::from).collect()),
            })
        }
    }

    #[async_trait]
    impl AdjudicationModel for ScriptedModel {
        async fn complete(&self, _system: &str, _prompt: &str) -> Result<String, VerifyError> {
            self.responses
                .lock()
                .pop()
                .ok_or_else(|| VerifyError::Provider("script exhausted".into()))
        }
    }

    fn adjudicator(model: Arc<dyn AdjudicationModel>) -> Adjudicator {
        Adjudicator::new(model, RetryPolicy::immediate(2), 20)
    }

    #[tokio::test]
    async fn short_fragments_are_skipped_without_a_model_call() {
        let model = ScriptedModel::new(vec![]);
        let verdict = adjudicator(model)
            .adjudicate("Section 4.2", &[hit("anything", Uuid::new_v4())])
            .await;
        assert!(verdict.is_none());
    }

    #[tokio::test]
    async fn empty_evidence_short_circuits_to_unverified() {
        let model = ScriptedModel::new(vec![]);
        let verdict = adjudicator(model)
            .adjudicate("revenue grew forty percent during fiscal 2023", &[])
            .await
            .unwrap();
        assert_eq!(verdict.status, ClaimStatus::Unverified);
        assert_eq!(verdict.confidence, 0);
        assert!(verdict.evidence.is_empty());
    }

    #[tokio::test]
    async fn validated_response_maps_to_verified_with_resolved_citation() {
        let doc = Uuid::new_v4();
        let model = ScriptedModel::new(vec![
            r#"Here is my judgment: {"status": "VALIDATED", "confidence": 92, "reasoning": "figures match", "citations": [{"excerpt": "revenue grew 40%"}]}"#,
        ]);
        let evidence = vec![hit("the audited statement shows revenue grew 40% in 2023", doc)];

        let verdict = adjudicator(model)
            .adjudicate("revenue grew forty percent during 2023", &evidence)
            .await
            .unwrap();
        assert_eq!(verdict.status, ClaimStatus::Verified);
        assert_eq!(verdict.confidence, 92);
        assert_eq!(verdict.evidence.entries()[0].source_id, Some(doc));
    }

    #[tokio::test]
    async fn unmatched_citation_falls_back_to_top_chunk() {
        let doc = Uuid::new_v4();
        let model = ScriptedModel::new(vec![
            r#"{"status": "UNCERTAIN", "confidence": 55, "reasoning": "partial", "citations": [{"excerpt": "text not present in any chunk"}]}"#,
        ]);
        let evidence = vec![hit("completely different content", doc)];

        let verdict = adjudicator(model)
            .adjudicate("a claim of sufficient length to adjudicate", &evidence)
            .await
            .unwrap();
        assert_eq!(verdict.status, ClaimStatus::Partial);
        assert_eq!(verdict.evidence.entries()[0].source_id, Some(doc));
    }

    #[tokio::test]
    async fn malformed_output_is_reasked_once_then_parsed() {
        let model = ScriptedModel::new(vec![
            "I cannot answer in JSON, sorry.",
            r#"{"status": "INCORRECT", "confidence": 80, "reasoning": "contradicted", "citations": []}"#,
        ]);
        let verdict = adjudicator(model)
            .adjudicate("a claim of sufficient length to adjudicate", &[hit("x", Uuid::new_v4())])
            .await
            .unwrap();
        assert_eq!(verdict.status, ClaimStatus::Unverified);
        assert_eq!(verdict.confidence, 80);
    }

    #[tokio::test]
    async fn persistent_failure_downgrades_instead_of_erroring() {
        let model = ScriptedModel::new(vec![]);
        let verdict = adjudicator(model)
            .adjudicate(
                "a claim of sufficient length to adjudicate",
                &[hit("x", Uuid::new_v4())],
            )
            .await
            .unwrap();
        assert_eq!(verdict.status, ClaimStatus::Unverified);
        assert_eq!(verdict.confidence, 0);
        assert_eq!(verdict.reasoning, "adjudication failed");
    }

    #[tokio::test]
    async fn confidence_is_clamped_into_range() {
        let model = ScriptedModel::new(vec![
            r#"{"status": "VALIDATED", "confidence": 150, "reasoning": "r", "citations": []}"#,
        ]);
        let verdict = adjudicator(model)
            .adjudicate(
                "a claim of sufficient length to adjudicate",
                &[hit("x", Uuid::new_v4())],
            )
            .await
            .unwrap();
        assert_eq!(verdict.confidence, 100);
    }

    #[test]
    fn json_extraction_handles_braces_inside_strings() {
        let raw = r#"note {"status": "VALIDATED", "reasoning": "uses { and } freely"} trailing"#;
        let object = extract_json_object(raw).unwrap();
        assert!(object.starts_with('{') && object.ends_with('}'));
        assert!(object.contains("freely"));
    }

    #[test]
    fn unknown_status_is_a_parse_error() {
        let err = parse_verdict(r#"{"status": "MAYBE", "confidence": 1}"#).unwrap_err();
        assert!(matches!(err, VerifyError::Parse(_)));
    }
}
