//! Gateway configuration
//!
//! Fallback values used when a request's inference config leaves a field out.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Defaults applied by the gateway to every provider call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Provider used when the request does not name one
    #[serde(default = "default_provider")]
    pub provider: String,

    /// Model id for chat backends
    #[serde(default = "default_model")]
    pub model: String,

    /// Fallback base address for chat backends
    #[serde(default)]
    pub base_address: Option<String>,

    /// Fallback credential for chat backends
    #[serde(default)]
    pub credential: Option<String>,

    /// Fallback model file for the local-process backend
    #[serde(default)]
    pub local_path: Option<String>,

    /// Base for relative model and tokenizer paths; the working directory
    /// when unset
    #[serde(default)]
    pub root_dir: Option<PathBuf>,

    /// GPU layers hint; any non-zero value requests GPU placement
    #[serde(default)]
    pub gpu_layers: i32,

    /// Context window of local models, in tokens
    #[serde(default = "default_context_size")]
    pub context_size: usize,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Timeout for a single chat request
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Timeout for a single local generation
    #[serde(default = "default_local_timeout")]
    pub local_timeout_secs: u64,
}

impl GatewayConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn local_timeout(&self) -> Duration {
        Duration::from_secs(self.local_timeout_secs)
    }

    /// Resolve a model-side path against the root; absolute paths pass through
    pub fn resolve_path(&self, path: impl AsRef<Path>) -> PathBuf {
        match &self.root_dir {
            Some(root) => root.join(path),
            None => path.as_ref().to_path_buf(),
        }
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            base_address: None,
            credential: None,
            local_path: None,
            root_dir: None,
            gpu_layers: 0,
            context_size: default_context_size(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            request_timeout_secs: default_request_timeout(),
            local_timeout_secs: default_local_timeout(),
        }
    }
}

/// Hosted chat endpoint used when remote-chat has no base address
pub const DEFAULT_REMOTE_BASE: &str = "https://api.openai.com/v1";

fn default_provider() -> String {
    "remote_chat".to_string()
}

fn default_model() -> String {
    "gpt-4.1-mini".to_string()
}

fn default_context_size() -> usize {
    4096
}

fn default_temperature() -> f32 {
    0.6
}

fn default_max_tokens() -> u32 {
    800
}

fn default_request_timeout() -> u64 {
    120
}

fn default_local_timeout() -> u64 {
    300
}
