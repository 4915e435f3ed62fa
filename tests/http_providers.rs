//! Wire-format tests for the HTTP-backed providers, served by a local mock
//! endpoint.

use std::sync::Arc;

use claimsmith::adjudication::{Adjudicator, AdjudicationModel, HttpAdjudicationModel};
use claimsmith::claims::ClaimStatus;
use claimsmith::embedding::{EmbeddingProvider, HttpEmbeddingProvider};
use claimsmith::index::{ChunkMetadata, IndexedChunk, ScoredChunk};
use claimsmith::retry::RetryPolicy;
use claimsmith::types::VerifyError;
use httpmock::prelude::*;
use serde_json::json;

#[tokio::test]
async fn embedding_provider_speaks_the_embeddings_wire_format() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/v1/embeddings")
                .header("authorization", "Bearer test-key")
                .json_body_partial(r#"{"model": "embed-small"}"#);
            then.status(200).json_body(json!({
                "data": [
                    { "embedding": [0.1, 0.2, 0.3] },
                    { "embedding": [0.4, 0.5, 0.6] },
                ]
            }));
        })
        .await;

    let provider = HttpEmbeddingProvider::new(server.url("/v1/embeddings"), "embed-small", 3)
        .with_api_key("test-key");
    let vectors = provider
        .embed_batch(&["first text".into(), "second text".into()])
        .await
        .unwrap();

    mock.assert_async().await;
    assert_eq!(vectors.len(), 2);
    assert_eq!(vectors[0], vec![0.1, 0.2, 0.3]);
    assert_eq!(provider.dimensions(), 3);
}

#[tokio::test]
async fn embedding_provider_maps_http_errors_to_provider_errors() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/v1/embeddings");
            then.status(503);
        })
        .await;

    let provider = HttpEmbeddingProvider::new(server.url("/v1/embeddings"), "embed-small", 3);
    let err = provider.embed_batch(&["text".into()]).await.unwrap_err();
    assert!(matches!(err, VerifyError::Provider(_)));
    assert!(err.is_transient());
}

#[tokio::test]
async fn adjudication_model_speaks_the_chat_wire_format() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/v1/chat/completions")
                .json_body_partial(r#"{"model": "judge-large"}"#);
            then.status(200).json_body(json!({
                "choices": [
                    {
                        "message": {
                            "content": "{\"status\": \"VALIDATED\", \"confidence\": 95, \"reasoning\": \"figures match\", \"citations\": [{\"excerpt\": \"revenue grew 40%\"}]}"
                        }
                    }
                ]
            }));
        })
        .await;

    let model = HttpAdjudicationModel::new(server.url("/v1/chat/completions"), "judge-large");
    let adjudicator = Adjudicator::new(Arc::new(model), RetryPolicy::immediate(2), 20);

    let evidence = vec![ScoredChunk {
        chunk: IndexedChunk {
            chunk_id: uuid::Uuid::new_v4(),
            document_id: uuid::Uuid::new_v4(),
            sequence_index: 0,
            text: "the audited statement shows revenue grew 40% in 2023".into(),
            vector: vec![1.0, 0.0],
            metadata: ChunkMetadata {
                source: "annex.txt".into(),
                ..ChunkMetadata::default()
            },
        },
        score: 0.92,
    }];

    let verdict = adjudicator
        .adjudicate("revenue grew forty percent during 2023", &evidence)
        .await
        .unwrap();

    mock.assert_async().await;
    assert_eq!(verdict.status, ClaimStatus::Verified);
    assert_eq!(verdict.confidence, 95);
    assert_eq!(
        verdict.evidence.entries()[0].source_id,
        Some(evidence[0].chunk.document_id)
    );
}

#[tokio::test]
async fn adjudication_model_maps_http_errors_to_provider_errors() {
    let server = MockServer::start_async().await;
    let failure = server
        .mock_async(|when, then| {
            when.method(POST).path("/v1/chat/completions");
            then.status(500);
        })
        .await;

    let model = HttpAdjudicationModel::new(server.url("/v1/chat/completions"), "judge-large");
    let err = model.complete("system", "prompt").await.unwrap_err();
    failure.assert_async().await;
    assert!(err.is_transient());
}
