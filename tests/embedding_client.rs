//! Integration tests for the Ollama embedding client against a mocked HTTP
//! service.

use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use legal_text_store::config::EmbeddingConfig;
use legal_text_store::embedding::{EmbeddingProvider, OllamaEmbeddingClient};
use legal_text_store::errors::StoreError;

fn config_for(server: &MockServer) -> EmbeddingConfig {
    EmbeddingConfig {
        base_url: server.uri(),
        model: "nomic-embed-text".to_string(),
        dimension: 3,
        timeout_seconds: 5,
        ..EmbeddingConfig::default()
    }
}

fn texts(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[tokio::test]
async fn returns_vectors_in_input_order() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .and(body_partial_json(json!({ "model": "nomic-embed-text" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "embeddings": [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0]]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = OllamaEmbeddingClient::new(&config_for(&server)).unwrap();
    let results = client
        .embed_batch(&texts(&["erster text", "zweiter text"]))
        .await
        .unwrap();

    assert_eq!(results.len(), 2);
    assert_eq!(results[0].as_ref().unwrap(), &vec![1.0, 0.0, 0.0]);
    assert_eq!(results[1].as_ref().unwrap(), &vec![0.0, 1.0, 0.0]);
}

#[tokio::test]
async fn empty_input_skips_the_network() {
    let server = MockServer::start().await;
    // No mock mounted: any request would 404 and fail the call

    let client = OllamaEmbeddingClient::new(&config_for(&server)).unwrap();
    let results = client.embed_batch(&[]).await.unwrap();
    assert!(results.is_empty());
}

#[tokio::test]
async fn sends_bearer_token_when_configured() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .and(header("authorization", "Bearer secret-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "embeddings": [[0.1, 0.2, 0.3]]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let mut config = config_for(&server);
    config.auth_token = "secret-token".to_string();
    let client = OllamaEmbeddingClient::new(&config).unwrap();

    let results = client.embed_batch(&texts(&["text"])).await.unwrap();
    assert!(results[0].is_ok());
}

#[tokio::test]
async fn server_error_fails_the_whole_attempt() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(ResponseTemplate::new(500).set_body_string("model crashed"))
        .mount(&server)
        .await;

    let client = OllamaEmbeddingClient::new(&config_for(&server)).unwrap();
    let err = client.embed_batch(&texts(&["text"])).await.unwrap_err();

    match err {
        StoreError::EmbeddingService { status, .. } => assert_eq!(status, Some(500)),
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn rate_limit_is_reported_with_retry_after() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(
            ResponseTemplate::new(429).insert_header("retry-after", "30"),
        )
        .mount(&server)
        .await;

    let client = OllamaEmbeddingClient::new(&config_for(&server)).unwrap();
    let err = client.embed_batch(&texts(&["text"])).await.unwrap_err();

    match err {
        StoreError::RateLimited {
            retry_after_seconds,
        } => assert_eq!(retry_after_seconds, Some(30)),
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn vector_count_mismatch_fails_the_attempt() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "embeddings": [[1.0, 0.0, 0.0]]
        })))
        .mount(&server)
        .await;

    let client = OllamaEmbeddingClient::new(&config_for(&server)).unwrap();
    let err = client
        .embed_batch(&texts(&["eins", "zwei"]))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::EmbeddingService { .. }));
}

#[tokio::test]
async fn wrong_dimension_fails_per_item() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "embeddings": [[1.0, 0.0, 0.0], [1.0, 0.0]]
        })))
        .mount(&server)
        .await;

    let client = OllamaEmbeddingClient::new(&config_for(&server)).unwrap();
    let results = client.embed_batch(&texts(&["eins", "zwei"])).await.unwrap();

    assert!(results[0].is_ok());
    assert!(matches!(
        results[1],
        Err(StoreError::EmbeddingService { .. })
    ));
}

#[tokio::test]
async fn malformed_body_fails_the_attempt() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&server)
        .await;

    let client = OllamaEmbeddingClient::new(&config_for(&server)).unwrap();
    let err = client.embed_batch(&texts(&["text"])).await.unwrap_err();
    assert!(matches!(err, StoreError::EmbeddingService { status: None, .. }));
}
