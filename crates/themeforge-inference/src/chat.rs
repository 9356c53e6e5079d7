//! Chat-completion backends
//!
//! Both the hosted and the self-hosted variants speak the OpenAI
//! chat-completions wire format:
//! ```text
//! POST {base}/chat/completions
//! {"model":"...","messages":[{"role":"system","content":"..."},{"role":"user","content":"..."}],...}
//! ```
//! They differ only in which field is mandatory.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use themeforge_core::{error::truncate_chars, Error, InferenceConfig, Result};
use tracing::{debug, warn};

use crate::config::{GatewayConfig, DEFAULT_REMOTE_BASE};
use crate::gateway::Backend;
use crate::provider::{Prompt, Provider};

/// Chat-completion backend
pub struct ChatBackend {
    provider: Provider,
    client: reqwest::Client,
    defaults: Arc<GatewayConfig>,
}

/// Resolved target of one chat call
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ChatTarget {
    pub url: String,
    pub model: String,
    pub credential: Option<String>,
}

impl ChatBackend {
    pub fn new(provider: Provider, client: reqwest::Client, defaults: Arc<GatewayConfig>) -> Self {
        debug_assert!(provider != Provider::LocalProcess);
        Self {
            provider,
            client,
            defaults,
        }
    }

    /// Resolve endpoint, model and credential, failing on missing required fields
    pub(crate) fn resolve(&self, config: &InferenceConfig) -> Result<ChatTarget> {
        let base = config
            .base_address
            .as_deref()
            .or(self.defaults.base_address.as_deref())
            .map(str::trim)
            .filter(|s| !s.is_empty());
        let credential = config
            .credential
            .as_deref()
            .or(self.defaults.credential.as_deref())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        let base = match self.provider {
            Provider::RemoteChat => {
                if credential.is_none() {
                    return Err(Error::config(
                        "provider 'remote_chat' requires a credential (llm.credential or gateway.credential)",
                    ));
                }
                base.unwrap_or(DEFAULT_REMOTE_BASE)
            }
            Provider::CompatibleServer => base.ok_or_else(|| {
                Error::config(
                    "provider 'compatible_server' requires a base address (e.g. http://localhost:8000/v1)",
                )
            })?,
            Provider::LocalProcess => {
                return Err(Error::internal("chat backend cannot serve local_process"))
            }
        };

        let model = config
            .model
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(&self.defaults.model)
            .to_string();

        Ok(ChatTarget {
            url: format!("{}/chat/completions", base.trim_end_matches('/')),
            model,
            credential,
        })
    }

    pub(crate) fn build_request<'a>(&'a self, target: &'a ChatTarget, prompt: &'a Prompt) -> ChatRequest<'a> {
        let mut messages = Vec::with_capacity(2);
        if !prompt.system.trim().is_empty() {
            messages.push(ChatMessage {
                role: "system",
                content: &prompt.system,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: &prompt.user,
        });

        ChatRequest {
            model: &target.model,
            messages,
            temperature: self.defaults.temperature,
            max_tokens: self.defaults.max_tokens,
            stop: &prompt.stop,
        }
    }
}

#[async_trait]
impl Backend for ChatBackend {
    async fn run(&self, prompt: &Prompt, config: &InferenceConfig) -> Result<String> {
        let target = self.resolve(config)?;
        let body = self.build_request(&target, prompt);

        debug!(provider = %self.provider, url = %target.url, model = %target.model, "Sending chat completion");

        let mut request = self
            .client
            .post(&target.url)
            .header("Content-Type", "application/json")
            .json(&body);
        if let Some(credential) = &target.credential {
            request = request.bearer_auth(credential);
        }

        let response = request.send().await.map_err(map_transport_error)?;
        let status = response.status();
        let text = response.text().await.map_err(map_transport_error)?;

        if !status.is_success() {
            warn!(provider = %self.provider, %status, "Chat backend returned an error status");
            return Err(Error::backend(format!(
                "{} returned {}: {}",
                self.provider,
                status,
                truncate_chars(&text, 200)
            )));
        }

        parse_chat_response(&text)
    }

    fn name(&self) -> &str {
        self.provider.as_str()
    }
}

fn map_transport_error(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::Timeout
    } else {
        Error::backend(format!("chat request failed: {}", e))
    }
}

/// Extract the first choice's message content; a missing content is empty text
pub(crate) fn parse_chat_response(body: &str) -> Result<String> {
    let response: ChatResponse = serde_json::from_str(body)?;
    Ok(response
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .unwrap_or_default())
}

// =============================================================================
// Chat Completions Wire Structures
// =============================================================================

#[derive(Debug, Serialize)]
pub(crate) struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
    #[serde(skip_serializing_if = "<[String]>::is_empty")]
    stop: &'a [String],
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize, Default)]
struct ChatResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend(provider: Provider, defaults: GatewayConfig) -> ChatBackend {
        ChatBackend::new(provider, reqwest::Client::new(), Arc::new(defaults))
    }

    #[test]
    fn test_remote_requires_credential() {
        let backend = backend(Provider::RemoteChat, GatewayConfig::default());
        let err = backend.resolve(&InferenceConfig::default()).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_remote_defaults_base_address() {
        let backend = backend(Provider::RemoteChat, GatewayConfig::default());
        let config = InferenceConfig {
            credential: Some("sk-test".to_string()),
            model: Some("gpt-4o-mini".to_string()),
            ..Default::default()
        };
        let target = backend.resolve(&config).unwrap();
        assert_eq!(target.url, "https://api.openai.com/v1/chat/completions");
        assert_eq!(target.model, "gpt-4o-mini");
        assert_eq!(target.credential.as_deref(), Some("sk-test"));
    }

    #[test]
    fn test_compatible_requires_base_but_not_credential() {
        let backend = backend(Provider::CompatibleServer, GatewayConfig::default());
        assert!(matches!(
            backend.resolve(&InferenceConfig::default()),
            Err(Error::Config(_))
        ));

        let config = InferenceConfig {
            base_address: Some("http://localhost:8000/v1/".to_string()),
            ..Default::default()
        };
        let target = backend.resolve(&config).unwrap();
        assert_eq!(target.url, "http://localhost:8000/v1/chat/completions");
        assert_eq!(target.model, "gpt-4.1-mini");
        assert!(target.credential.is_none());
    }

    #[test]
    fn test_request_body_shape() {
        let backend = backend(Provider::CompatibleServer, GatewayConfig::default());
        let target = ChatTarget {
            url: "http://localhost/chat/completions".to_string(),
            model: "qwen".to_string(),
            credential: None,
        };
        let prompt = Prompt::chat("system text", "user text");
        let body = serde_json::to_value(backend.build_request(&target, &prompt)).unwrap();

        assert_eq!(body["model"], "qwen");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "user text");
        assert_eq!(body["max_tokens"], 800);
        assert!(body.get("stop").is_none());
    }

    #[test]
    fn test_parse_chat_response() {
        let body = r#"{"id":"chatcmpl-1","choices":[{"index":0,"message":{"role":"assistant","content":"[]"},"finish_reason":"stop"}]}"#;
        assert_eq!(parse_chat_response(body).unwrap(), "[]");

        let body = r#"{"choices":[{"message":{"role":"assistant","content":null}}]}"#;
        assert_eq!(parse_chat_response(body).unwrap(), "");

        assert!(parse_chat_response("not json").is_err());
    }
}
