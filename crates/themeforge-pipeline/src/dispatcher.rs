//! Request dispatch by kind
//!
//! Every entry point funnels through [`RequestDispatcher::dispatch`], which
//! never returns an error: failures become `{ok: false, error}` responses.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use themeforge_core::{Error, GenerationRequest, Result};
use tracing::{info, warn};

use crate::coordinator::ThemeGenerationCoordinator;

/// Kinds of agent requests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestKind {
    GenerateTheme,
    WritePost,
}

impl RequestKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GenerateTheme => "generate_theme",
            Self::WritePost => "write_post",
        }
    }
}

/// Incoming request envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRequest {
    #[serde(rename = "type", alias = "kind")]
    pub kind: RequestKind,
    #[serde(default)]
    pub payload: Value,
}

/// Uniform response envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentResponse {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AgentResponse {
    pub fn success(data: Value) -> Self {
        Self {
            ok: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            ok: false,
            data: None,
            error: Some(error.into()),
        }
    }
}

/// Artwork description handed to the caption writer
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtworkMeta {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub mood: String,
    #[serde(default)]
    pub characters: Vec<String>,
    #[serde(default)]
    pub special_note: String,
}

/// Caption request payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptionRequest {
    #[serde(default = "default_platform")]
    pub platform: String,
    #[serde(default = "default_languages")]
    pub languages: Vec<String>,
    #[serde(default)]
    pub artwork_meta: ArtworkMeta,
}

fn default_platform() -> String {
    "X".to_string()
}

fn default_languages() -> Vec<String> {
    vec!["ja".to_string()]
}

/// Caption writing capability
#[async_trait]
pub trait CaptionWriter: Send + Sync {
    /// Produce one caption per requested language
    async fn write(&self, request: &CaptionRequest) -> Result<BTreeMap<String, String>>;
}

/// Routes requests to the coordinator or the caption writer
pub struct RequestDispatcher {
    coordinator: Arc<ThemeGenerationCoordinator>,
    captions: Option<Arc<dyn CaptionWriter>>,
}

impl RequestDispatcher {
    pub fn new(coordinator: Arc<ThemeGenerationCoordinator>) -> Self {
        Self {
            coordinator,
            captions: None,
        }
    }

    pub fn with_caption_writer(mut self, writer: Arc<dyn CaptionWriter>) -> Self {
        self.captions = Some(writer);
        self
    }

    pub fn coordinator(&self) -> &ThemeGenerationCoordinator {
        &self.coordinator
    }

    /// Dispatch a raw JSON envelope
    pub async fn dispatch_value(&self, value: Value) -> AgentResponse {
        match serde_json::from_value::<AgentRequest>(value) {
            Ok(request) => self.dispatch(request).await,
            Err(e) => {
                let err = Error::config(format!("invalid request: {}", e));
                warn!(error = %err, "Rejected request");
                AgentResponse::failure(err.to_string())
            }
        }
    }

    /// Dispatch a typed request
    pub async fn dispatch(&self, request: AgentRequest) -> AgentResponse {
        let kind = request.kind;
        info!(kind = kind.as_str(), "Dispatching request");

        let result = match kind {
            RequestKind::GenerateTheme => self.generate_theme(request.payload).await,
            RequestKind::WritePost => self.write_post(request.payload).await,
        };

        match result {
            Ok(data) => AgentResponse::success(data),
            Err(e) => {
                warn!(kind = kind.as_str(), error = %e, "Request failed");
                AgentResponse::failure(e.to_string())
            }
        }
    }

    async fn generate_theme(&self, payload: Value) -> Result<Value> {
        let request: GenerationRequest = parse_payload(payload)?;
        let outcome = self.coordinator.generate(&request).await?;
        Ok(serde_json::to_value(outcome)?)
    }

    async fn write_post(&self, payload: Value) -> Result<Value> {
        let Some(writer) = &self.captions else {
            return Err(Error::config("caption writer not configured"));
        };
        let request: CaptionRequest = parse_payload(payload)?;
        let posts = writer.write(&request).await?;
        Ok(json!({ "posts": posts }))
    }
}

fn parse_payload<T: serde::de::DeserializeOwned>(payload: Value) -> Result<T> {
    // A missing payload means "all defaults"
    let payload = if payload.is_null() { json!({}) } else { payload };
    serde_json::from_value(payload).map_err(|e| Error::config(format!("invalid payload: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::CoordinatorConfig;

    fn dispatcher() -> RequestDispatcher {
        let coordinator = ThemeGenerationCoordinator::new(CoordinatorConfig {
            output_dir: None,
            ..Default::default()
        })
        .unwrap();
        RequestDispatcher::new(Arc::new(coordinator))
    }

    #[test]
    fn test_request_kind_accepts_type_or_kind() {
        let a: AgentRequest =
            serde_json::from_value(json!({"type": "generate_theme", "payload": {}})).unwrap();
        let b: AgentRequest = serde_json::from_value(json!({"kind": "write_post"})).unwrap();
        assert_eq!(a.kind, RequestKind::GenerateTheme);
        assert_eq!(b.kind, RequestKind::WritePost);
        assert!(b.payload.is_null());
    }

    #[test]
    fn test_caption_request_defaults() {
        let request: CaptionRequest = serde_json::from_value(json!({})).unwrap();
        assert_eq!(request.platform, "X");
        assert_eq!(request.languages, ["ja"]);
        assert!(request.artwork_meta.characters.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_kind_is_failure() {
        let response = dispatcher()
            .dispatch_value(json!({"type": "delete_everything"}))
            .await;
        assert!(!response.ok);
        assert!(response.error.unwrap().contains("invalid request"));
    }

    #[tokio::test]
    async fn test_write_post_without_writer() {
        let response = dispatcher()
            .dispatch_value(json!({"type": "write_post", "payload": {}}))
            .await;
        assert_eq!(
            response,
            AgentResponse::failure("configuration error: caption writer not configured")
        );
    }

    #[tokio::test]
    async fn test_generate_theme_without_payload() {
        let response = dispatcher()
            .dispatch_value(json!({"type": "generate_theme"}))
            .await;
        assert!(response.ok);
        let data = response.data.unwrap();
        assert_eq!(data["requested"], 3);
        assert_eq!(data["themes"].as_array().unwrap().len(), 3);
    }
}
