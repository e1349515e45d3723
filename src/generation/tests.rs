use super::*;

fn config_with_key() -> GenerationConfig {
    GenerationConfig {
        api_key: Some("test-key".to_string()),
        ..GenerationConfig::default()
    }
}

#[test]
fn chat_model_detection() {
    assert!(CompletionClient::is_chat_model("gpt-3.5-turbo"));
    assert!(CompletionClient::is_chat_model("gpt-3.5-turbo-16k"));
    assert!(CompletionClient::is_chat_model("gpt-4o"));
    assert!(!CompletionClient::is_chat_model("text-davinci-003"));
}

#[test]
fn missing_api_key_is_a_config_error() {
    let result = CompletionClient::new(&GenerationConfig::default());
    assert!(matches!(result, Err(RetrievalError::Config(_))));

    let blank = GenerationConfig {
        api_key: Some("  ".to_string()),
        ..GenerationConfig::default()
    };
    assert!(CompletionClient::new(&blank).is_err());
}

#[test]
fn client_takes_model_from_config() {
    let client = CompletionClient::new(&config_with_key()).expect("client should build");
    assert_eq!(client.model(), "gpt-3.5-turbo");
}

#[test]
fn stop_in_config_and_call_conflicts() {
    let config = GenerationConfig {
        stop: Some(vec!["Human:".to_string()]),
        ..config_with_key()
    };
    let client = CompletionClient::new(&config).expect("client should build");

    let result = client.generate_with_stop("hi", Some(&["\n".to_string()]));
    assert!(matches!(result, Err(RetrievalError::Generation(_))));
}

#[test]
fn parse_chat_completion() {
    let body = r#"{"choices":[{"index":0,"message":{"role":"assistant","content":"  It costs 499.\n"}}]}"#;
    assert_eq!(
        parse_completion(body, true).expect("should parse"),
        "It costs 499."
    );
}

#[test]
fn parse_text_completion() {
    let body = r#"{"choices":[{"text":"\nYes, it is waterproof. "}]}"#;
    assert_eq!(
        parse_completion(body, false).expect("should parse"),
        "Yes, it is waterproof."
    );
}

#[test]
fn parse_rejects_empty_or_mismatched_choices() {
    assert!(parse_completion(r#"{"choices":[]}"#, true).is_err());
    assert!(parse_completion(r#"{"choices":[{"text":"x"}]}"#, true).is_err());
    assert!(parse_completion("not json", false).is_err());
}

#[test]
fn chat_request_shape() {
    let stop = vec!["END".to_string()];
    let request = ChatRequest {
        model: "gpt-3.5-turbo",
        messages: vec![ChatMessage {
            role: "user",
            content: "hello",
        }],
        temperature: 0.0,
        max_tokens: 16,
        stop: Some(&stop),
    };

    let value = serde_json::to_value(&request).expect("serialize");
    assert_eq!(value["messages"][0]["role"], "user");
    assert_eq!(value["messages"][0]["content"], "hello");
    assert_eq!(value["stop"][0], "END");

    let request = CompletionRequest {
        model: "text-davinci-003",
        prompt: "hello",
        temperature: 0.0,
        max_tokens: 16,
        stop: None,
    };
    let value = serde_json::to_value(&request).expect("serialize");
    assert_eq!(value["prompt"], "hello");
    assert!(value.get("stop").is_none());
}
