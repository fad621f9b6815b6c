#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use deskpilot_providers::{ChatMessage, LLMProvider, OpenAICompatibleProvider, ProviderError};
use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn provider(server: &MockServer) -> OpenAICompatibleProvider {
    OpenAICompatibleProvider::new(server.uri(), Some("sk-test".into()), "gpt-4o-mini".into())
        .with_retry(1, Duration::from_millis(1))
}

#[tokio::test]
async fn test_plain_text_response() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("authorization", "Bearer sk-test"))
        .and(body_partial_json(json!({"model": "gpt-4o-mini"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{
                "message": {"role": "assistant", "content": "Hello there"},
                "finish_reason": "stop"
            }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let response = provider(&server)
        .generate(&[ChatMessage::user("hi")], None)
        .await
        .unwrap();

    assert_eq!(response.content.as_deref(), Some("Hello there"));
    assert!(response.tool_calls.is_empty());
    assert_eq!(response.finish_reason, "stop");
}

#[tokio::test]
async fn test_model_override_reaches_request_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_partial_json(json!({"model": "gpt-4o"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{
                "message": {"role": "assistant", "content": "ok"},
                "finish_reason": "stop"
            }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let response = provider(&server)
        .generate_with_model("gpt-4o", &[ChatMessage::user("hi")], None)
        .await
        .unwrap();

    assert_eq!(response.content.as_deref(), Some("ok"));
}

#[tokio::test]
async fn test_tool_call_response() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_partial_json(json!({"tool_choice": "auto"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{
                        "id": "call_abc",
                        "type": "function",
                        "function": {"name": "control_volume", "arguments": "{\"action\":\"mute\"}"}
                    }]
                },
                "finish_reason": "tool_calls"
            }]
        })))
        .mount(&server)
        .await;

    let tools = vec![json!({"type": "function", "function": {"name": "control_volume"}})];
    let response = provider(&server)
        .generate(&[ChatMessage::user("mute")], Some(&tools))
        .await
        .unwrap();

    assert!(response.content.is_none());
    assert_eq!(response.tool_calls.len(), 1);
    assert_eq!(response.tool_calls[0].id, "call_abc");
    assert_eq!(response.tool_calls[0].function.name, "control_volume");
    assert_eq!(response.tool_calls[0].function.arguments, "{\"action\":\"mute\"}");
}

#[tokio::test]
async fn test_auth_failure_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
        .expect(1)
        .mount(&server)
        .await;

    let err = provider(&server)
        .generate(&[ChatMessage::user("hi")], None)
        .await
        .unwrap_err();

    match err {
        ProviderError::Api(msg) => assert!(msg.contains("Authentication failed")),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_server_error_is_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(503).set_body_string("busy"))
        .expect(2)
        .mount(&server)
        .await;

    let result = provider(&server)
        .generate(&[ChatMessage::user("hi")], None)
        .await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_empty_choices_is_parse_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
        .mount(&server)
        .await;

    let err = provider(&server)
        .generate(&[ChatMessage::user("hi")], None)
        .await
        .unwrap_err();
    assert!(matches!(err, ProviderError::Parse(_)));
}
