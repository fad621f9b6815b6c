#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use base64::Engine;
use deskpilot_core::Arguments;
use deskpilot_tools::handlers::{MediaConfig, MediaHandler, WebConfig, WebHandler};
use deskpilot_tools::CapabilityHandler;
use serde_json::{json, Value};
use tempfile::TempDir;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn args(value: Value) -> Arguments {
    value.as_object().cloned().unwrap()
}

fn web(server: &MockServer) -> WebHandler {
    WebHandler::new(WebConfig {
        search_endpoint: format!("{}/", server.uri()),
        search_page: "https://duckduckgo.com/".to_string(),
        ..WebConfig::default()
    })
    .unwrap()
}

#[tokio::test]
async fn test_search_web_summarizes_instant_answer() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(query_param("q", "rust language"))
        .and(query_param("format", "json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "Heading": "Rust",
            "AbstractText": "Rust is a systems programming language.",
            "AbstractURL": "https://en.wikipedia.org/wiki/Rust",
            "RelatedTopics": [
                {"Text": "Cargo - package manager", "FirstURL": "https://duckduckgo.com/Cargo"},
                {"Name": "Category", "Topics": []}
            ]
        })))
        .mount(&server)
        .await;

    let result = web(&server)
        .execute("search_web", &args(json!({"query": "rust language"})))
        .await
        .unwrap();

    assert!(result.ok);
    assert!(result.message.starts_with("Search results for: rust language"));
    assert!(result.message.contains("Rust: Rust is a systems programming language."));
    assert!(result.message.contains("- Cargo - package manager https://duckduckgo.com/Cargo"));
    assert_eq!(result.data.unwrap()["related"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_search_images_returns_link() {
    let server = MockServer::start().await;
    let result = web(&server)
        .execute("search_images", &args(json!({"query": "red panda"})))
        .await
        .unwrap();
    assert!(result.message.starts_with("Image search results for: red panda\n"));
    let url = result.data.unwrap()["url"].as_str().unwrap().to_string();
    assert!(url.contains("q=red+panda"));
    assert!(url.contains("ia=images"));
}

#[tokio::test]
async fn test_download_image_checks_content_type() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/page"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/html")
                .set_body_string("<html></html>"),
        )
        .mount(&server)
        .await;
    let dir = TempDir::new().unwrap();
    let target = dir.path().join("img.png");

    let result = web(&server)
        .execute(
            "download_image",
            &args(json!({
                "url": format!("{}/page", server.uri()),
                "path": target.to_str().unwrap(),
            })),
        )
        .await
        .unwrap();

    assert!(!result.ok);
    assert_eq!(
        result.message,
        "Error: URL does not point to an image (content-type: text/html)"
    );
    assert!(!target.exists());
}

#[tokio::test]
async fn test_download_file_streams_body() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/data.bin"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![7u8; 4096]))
        .mount(&server)
        .await;
    let dir = TempDir::new().unwrap();
    let target = dir.path().join("nested/data.bin");

    let result = web(&server)
        .execute(
            "download_file",
            &args(json!({
                "url": format!("{}/data.bin", server.uri()),
                "path": target.to_str().unwrap(),
            })),
        )
        .await
        .unwrap();

    assert!(result.ok);
    assert_eq!(std::fs::read(&target).unwrap().len(), 4096);
    assert_eq!(result.data.unwrap()["bytes"], 4096);
}

#[tokio::test]
async fn test_download_http_error_is_handler_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    let dir = TempDir::new().unwrap();

    let err = web(&server)
        .execute(
            "download_video",
            &args(json!({
                "url": format!("{}/missing.mp4", server.uri()),
                "path": dir.path().join("v.mp4").to_str().unwrap(),
            })),
        )
        .await
        .unwrap_err();
    assert!(err.to_string().contains("404"));
}

#[tokio::test]
async fn test_generate_image_saves_decoded_png() {
    let server = MockServer::start().await;
    let png = b"\x89PNG fake bytes".to_vec();
    Mock::given(method("POST"))
        .and(path("/images/generations"))
        .and(header("authorization", "Bearer sk-test"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{"b64_json": base64::engine::general_purpose::STANDARD.encode(&png)}]
        })))
        .expect(1)
        .mount(&server)
        .await;
    let dir = TempDir::new().unwrap();
    let handler = MediaHandler::new(MediaConfig {
        api_key: Some("sk-test".to_string()),
        base_url: server.uri(),
        output_dir: dir.path().to_path_buf(),
        ..MediaConfig::default()
    })
    .unwrap();

    let result = handler
        .execute("generate_image", &args(json!({"prompt": "a lighthouse"})))
        .await
        .unwrap();

    assert!(result.ok);
    let saved = result.data.unwrap()["path"].as_str().unwrap().to_string();
    assert!(saved.ends_with(".png"));
    assert_eq!(std::fs::read(saved).unwrap(), png);
}

#[tokio::test]
async fn test_transcribe_audio_returns_text() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/audio/transcriptions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"text": "hello there"})))
        .mount(&server)
        .await;
    let dir = TempDir::new().unwrap();
    let clip = dir.path().join("clip.wav");
    std::fs::write(&clip, b"RIFF").unwrap();
    let handler = MediaHandler::new(MediaConfig {
        api_key: Some("sk-test".to_string()),
        base_url: server.uri(),
        output_dir: dir.path().to_path_buf(),
        ..MediaConfig::default()
    })
    .unwrap();

    let result = handler
        .execute("transcribe_audio", &args(json!({"path": clip.to_str().unwrap()})))
        .await
        .unwrap();
    assert_eq!(result.message, "hello there");
}
