//! HTTP routes and handlers

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use serde_json::{json, Value};
use std::sync::Arc;
use themeforge_core::Error;
use themeforge_inference::discover_models;
use themeforge_pipeline::{AgentRequest, AgentResponse, RequestDispatcher, RequestKind};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::config::ServerConfig;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub dispatcher: Arc<RequestDispatcher>,
    /// Prometheus metrics handle for rendering
    pub metrics_handle: PrometheusHandle,
}

pub fn create_router(state: AppState) -> Router {
    let cors = cors_layer(&state.config.cors_origins);

    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics))
        .route("/api/llm/models", get(list_models))
        .route("/api/themes/generate", post(generate_themes))
        .route("/api/posts/generate", post(generate_posts))
        .fallback(fallback)
        .layer(cors)
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.iter().any(|o| o == "*") {
        return CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
    }

    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %o, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(Any)
        .allow_headers(Any)
}

async fn health_check() -> &'static str {
    "OK"
}

async fn metrics(State(state): State<AppState>) -> String {
    state.metrics_handle.render()
}

async fn list_models(State(state): State<AppState>) -> Response {
    let config = &state.config;
    match discover_models(&config.root_dir, &config.models_dir, &config.model_extensions) {
        Ok(models) => {
            info!(count = models.len(), "Listed local models");
            Json(json!({ "ok": true, "models": models })).into_response()
        }
        Err(e) => {
            warn!(error = %e, "Model listing failed");
            agent_response(AgentResponse::failure(e.to_string()), None)
        }
    }
}

async fn generate_themes(State(state): State<AppState>, body: Bytes) -> Response {
    dispatch(&state, RequestKind::GenerateTheme, body).await
}

async fn generate_posts(State(state): State<AppState>, body: Bytes) -> Response {
    dispatch(&state, RequestKind::WritePost, body).await
}

async fn dispatch(state: &AppState, kind: RequestKind, body: Bytes) -> Response {
    let request_id = Uuid::new_v4();
    let span = info_span!("request", %request_id, kind = kind.as_str());

    metrics::counter!("themeforge_http_requests_total", "kind" => kind.as_str()).increment(1);

    let response = async {
        match parse_body(&body) {
            Ok(payload) => {
                state
                    .dispatcher
                    .dispatch(AgentRequest { kind, payload })
                    .await
            }
            Err(e) => {
                warn!(error = %e, "Rejected request body");
                AgentResponse::failure(e.to_string())
            }
        }
    }
    .instrument(span)
    .await;

    agent_response(response, Some(request_id))
}

/// An empty body is an empty payload
fn parse_body(body: &[u8]) -> Result<Value, Error> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Null);
    }
    serde_json::from_slice(body).map_err(|e| Error::config(format!("invalid JSON body: {}", e)))
}

fn agent_response(response: AgentResponse, request_id: Option<Uuid>) -> Response {
    let status = if response.ok {
        StatusCode::OK
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };

    let mut http = (status, Json(response)).into_response();
    if let Some(id) = request_id {
        if let Ok(value) = HeaderValue::from_str(&id.to_string()) {
            http.headers_mut().insert("x-request-id", value);
        }
    }
    http
}

async fn fallback() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(AgentResponse::failure("not found")),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use metrics_exporter_prometheus::PrometheusBuilder;
    use themeforge_pipeline::{CoordinatorConfig, ThemeGenerationCoordinator};

    fn state(config: ServerConfig) -> AppState {
        let coordinator = ThemeGenerationCoordinator::new(CoordinatorConfig {
            output_dir: None,
            ..Default::default()
        })
        .unwrap();

        AppState {
            config: Arc::new(config),
            dispatcher: Arc::new(RequestDispatcher::new(Arc::new(coordinator))),
            metrics_handle: PrometheusBuilder::new().build_recorder().handle(),
        }
    }

    async fn body_json(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_generate_themes_rule_based() {
        let response = generate_themes(
            State(state(ServerConfig::default())),
            Bytes::from_static(br#"{"season": "summer", "focus": "frilled_bikini", "count": 2}"#),
        )
        .await;

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("x-request-id"));

        let body = body_json(response).await;
        assert_eq!(body["ok"], true);
        assert_eq!(body["data"]["themes"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_empty_body_uses_defaults() {
        let response =
            generate_themes(State(state(ServerConfig::default())), Bytes::new()).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["data"]["requested"], 3);
    }

    #[tokio::test]
    async fn test_invalid_body_is_failure() {
        let response =
            generate_themes(State(state(ServerConfig::default())), Bytes::from_static(b"{oops")).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = body_json(response).await;
        assert_eq!(body["ok"], false);
        assert!(body["error"].as_str().unwrap().contains("invalid JSON body"));
    }

    #[tokio::test]
    async fn test_posts_without_writer() {
        let response = generate_posts(
            State(state(ServerConfig::default())),
            Bytes::from_static(br#"{"languages": ["en"]}"#),
        )
        .await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body_json(response).await["error"]
            .as_str()
            .unwrap()
            .contains("caption writer not configured"));
    }

    #[tokio::test]
    async fn test_list_models() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("models")).unwrap();
        std::fs::write(dir.path().join("models/b-tagger.GGUF"), b"").unwrap();
        std::fs::write(dir.path().join("models/a-primary.gguf"), b"").unwrap();
        std::fs::write(dir.path().join("models/readme.txt"), b"").unwrap();

        let config = ServerConfig {
            root_dir: dir.path().to_path_buf(),
            ..Default::default()
        };
        let response = list_models(State(state(config))).await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        let names: Vec<&str> = body["models"]
            .as_array()
            .unwrap()
            .iter()
            .map(|m| m["filename"].as_str().unwrap())
            .collect();
        assert_eq!(names, ["a-primary.gguf", "b-tagger.GGUF"]);
    }
}
