//! Provider selection and the prompt value passed to every backend

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use themeforge_core::Error;

/// Backend variant selected for a call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    /// Hosted chat-completion endpoint, credential required
    RemoteChat,
    /// Self-hosted chat-completion endpoint, base address required
    CompatibleServer,
    /// In-process model loaded from a file path
    LocalProcess,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RemoteChat => "remote_chat",
            Self::CompatibleServer => "compatible_server",
            Self::LocalProcess => "local_process",
        }
    }
}

impl FromStr for Provider {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "remote_chat" | "api" | "openai" => Ok(Self::RemoteChat),
            "compatible_server" | "vllm" | "openai_compatible" => Ok(Self::CompatibleServer),
            "local_process" | "llama_cpp" | "local" => Ok(Self::LocalProcess),
            _ => Err(Error::provider(s)),
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A prompt as seen by the gateway
///
/// Chat backends send `system` and `user` as two messages. The local backend
/// renders them into a single completion prompt.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Prompt {
    pub system: String,
    pub user: String,
    /// Sequences that end generation early
    pub stop: Vec<String>,
}

impl Prompt {
    /// Prompt with a system instruction and a user message
    pub fn chat(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
            stop: Vec::new(),
        }
    }

    /// Raw completion prompt without a system part
    pub fn completion(text: impl Into<String>) -> Self {
        Self {
            system: String::new(),
            user: text.into(),
            stop: Vec::new(),
        }
    }

    pub fn with_stop(mut self, stop: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.stop = stop.into_iter().map(Into::into).collect();
        self
    }

    /// Single-string rendering for text-completion backends
    pub fn render_completion(&self) -> String {
        if self.system.trim().is_empty() {
            self.user.clone()
        } else {
            format!("{}\n\n{}", self.system.trim_end(), self.user)
        }
    }
}

/// Sampling settings resolved for one call
#[derive(Debug, Clone, PartialEq)]
pub struct SamplingParams {
    pub temperature: f32,
    pub max_tokens: u32,
    pub stop: Vec<String>,
}

/// Cut `text` at the earliest stop sequence
pub fn truncate_at_stop<'a>(text: &'a str, stop: &[String]) -> &'a str {
    let cut = stop
        .iter()
        .filter(|s| !s.is_empty())
        .filter_map(|s| text.find(s.as_str()))
        .min();

    match cut {
        Some(idx) => &text[..idx],
        None => text,
    }
}
