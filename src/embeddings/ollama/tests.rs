use super::*;

#[test]
fn client_configuration() {
    let config = OllamaConfig {
        protocol: "http".to_string(),
        host: "test-host".to_string(),
        port: 1234,
        model: "test-model".to_string(),
        batch_size: 128,
        embedding_dimension: 384,
    };
    let client = OllamaClient::new(&config).expect("Failed to create client");

    assert_eq!(client.model, "test-model");
    assert_eq!(client.batch_size, 128);
    assert_eq!(client.embedding_dimension, 384);
    assert_eq!(client.base_url.host_str(), Some("test-host"));
    assert_eq!(client.base_url.port(), Some(1234));
    assert_eq!(client.retry_attempts, DEFAULT_RETRY_ATTEMPTS);
}

#[test]
fn client_builder_methods() {
    let client = OllamaClient::new(&OllamaConfig::default())
        .expect("Failed to create client")
        .with_timeout(Duration::from_secs(60))
        .with_retry_attempts(5);
    assert_eq!(client.retry_attempts, 5);

    let client = client.with_retry_attempts(0);
    assert_eq!(client.retry_attempts, 1);
}

#[test]
fn model_id_names_provider_and_model() {
    let client = OllamaClient::new(&OllamaConfig::default()).expect("Failed to create client");
    assert_eq!(client.model_id(), "ollama/nomic-embed-text:latest");
}

#[test]
fn model_id_spells_out_implicit_tag() {
    let untagged = OllamaConfig {
        model: "nomic-embed-text".to_string(),
        ..OllamaConfig::default()
    };
    let tagged = OllamaConfig {
        model: "nomic-embed-text:latest".to_string(),
        ..OllamaConfig::default()
    };

    let untagged = OllamaClient::new(&untagged).expect("Failed to create client");
    let tagged = OllamaClient::new(&tagged).expect("Failed to create client");

    assert_eq!(untagged.model_id(), tagged.model_id());
    assert_eq!(untagged.model_id(), "ollama/nomic-embed-text:latest");
}

#[test]
fn invalid_url_is_a_config_error() {
    let config = OllamaConfig {
        host: "bad host with spaces".to_string(),
        ..OllamaConfig::default()
    };
    assert!(matches!(
        OllamaClient::new(&config),
        Err(RetrievalError::Config(_))
    ));
}

#[test]
fn untagged_models_match_latest() {
    assert!(same_model("nomic-embed-text:latest", "nomic-embed-text"));
    assert!(same_model("nomic-embed-text", "nomic-embed-text:latest"));
    assert!(same_model("bge-m3:567m", "bge-m3:567m"));
    assert!(!same_model("bge-m3:567m", "bge-m3"));
    assert!(!same_model("all-minilm:latest", "nomic-embed-text:latest"));
}

#[test]
fn dimension_check() {
    let client = OllamaClient::new(&OllamaConfig {
        embedding_dimension: 4,
        ..OllamaConfig::default()
    })
    .expect("Failed to create client");

    assert!(client.check_dimension(&[0.0; 4]).is_ok());
    assert!(client.check_dimension(&[0.0; 3]).is_err());
}

#[test]
fn embed_request_shapes() {
    let single = serde_json::to_value(EmbedRequest {
        model: "m",
        input: "hello",
    })
    .expect("serialize");
    assert_eq!(single, serde_json::json!({"model": "m", "input": "hello"}));

    let texts = vec!["a".to_string(), "b".to_string()];
    let batch = serde_json::to_value(BatchEmbedRequest {
        model: "m",
        input: &texts,
    })
    .expect("serialize");
    assert_eq!(batch, serde_json::json!({"model": "m", "input": ["a", "b"]}));
}
