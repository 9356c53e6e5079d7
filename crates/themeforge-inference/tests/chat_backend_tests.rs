//! Chat backend tests against an in-process OpenAI-style server

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use themeforge_core::{Error, InferenceConfig};
use themeforge_inference::{GatewayConfig, InferenceGateway, ModelRunner, Prompt};

#[derive(Default)]
struct Seen {
    authorization: Option<String>,
    body: Option<Value>,
}

type Shared = Arc<Mutex<Seen>>;

async fn completions(
    State(seen): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Json<Value> {
    let mut seen = seen.lock().unwrap();
    seen.authorization = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    seen.body = Some(body);

    Json(json!({
        "id": "chatcmpl-test",
        "object": "chat.completion",
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": "[{\"title\":\"A\"}]"},
            "finish_reason": "stop"
        }]
    }))
}

async fn overloaded() -> (StatusCode, &'static str) {
    (StatusCode::SERVICE_UNAVAILABLE, "model is loading")
}

async fn spawn_server() -> (String, Shared) {
    let seen: Shared = Arc::default();
    let app = Router::new()
        .route("/v1/chat/completions", post(completions))
        .route("/busy/chat/completions", post(overloaded))
        .with_state(Arc::clone(&seen));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{}", addr), seen)
}

#[tokio::test]
async fn test_compatible_server_round_trip_without_credential() {
    let (base, seen) = spawn_server().await;
    let gw = InferenceGateway::new(GatewayConfig::default()).unwrap();
    let config = InferenceConfig {
        provider: Some("vllm".to_string()),
        base_address: Some(format!("{}/v1", base)),
        model: Some("qwen2.5-7b".to_string()),
        ..Default::default()
    };

    let prompt = Prompt::chat("Return JSON only.", "Give me one theme");
    let text = gw.run(&prompt, &config).await.unwrap();
    assert_eq!(text, "[{\"title\":\"A\"}]");

    let seen = seen.lock().unwrap();
    assert!(seen.authorization.is_none());
    let body = seen.body.as_ref().unwrap();
    assert_eq!(body["model"], "qwen2.5-7b");
    assert_eq!(body["messages"][0]["role"], "system");
    assert_eq!(body["messages"][1]["content"], "Give me one theme");
    assert_eq!(body["max_tokens"], 800);
}

#[tokio::test]
async fn test_remote_chat_sends_bearer_credential() {
    let (base, seen) = spawn_server().await;
    let gw = InferenceGateway::new(GatewayConfig::default()).unwrap();
    let config = InferenceConfig {
        provider: Some("api".to_string()),
        base_address: Some(format!("{}/v1", base)),
        credential: Some("sk-test".to_string()),
        ..Default::default()
    };

    gw.run(&Prompt::chat("", "hi"), &config).await.unwrap();

    let seen = seen.lock().unwrap();
    assert_eq!(seen.authorization.as_deref(), Some("Bearer sk-test"));
    let body = seen.body.as_ref().unwrap();
    assert_eq!(body["model"], "gpt-4.1-mini");
    // Blank system prompt is not sent
    assert_eq!(body["messages"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_error_status_is_backend_error() {
    let (base, _seen) = spawn_server().await;
    let gw = InferenceGateway::new(GatewayConfig::default()).unwrap();
    let config = InferenceConfig {
        provider: Some("compatible_server".to_string()),
        base_address: Some(format!("{}/busy", base)),
        ..Default::default()
    };

    match gw.run(&Prompt::completion("hi"), &config).await {
        Err(Error::Backend(msg)) => {
            assert!(msg.contains("503"));
            assert!(msg.contains("model is loading"));
        }
        other => panic!("Expected Backend error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_missing_base_address_is_config_error() {
    let gw = InferenceGateway::new(GatewayConfig::default()).unwrap();
    let config = InferenceConfig {
        provider: Some("compatible_server".to_string()),
        ..Default::default()
    };

    let err = gw.run(&Prompt::completion("hi"), &config).await.unwrap_err();
    assert!(matches!(err, Error::Config(_)));
}
