//! Server configuration

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use themeforge_inference::{GatewayConfig, DEFAULT_MODEL_EXTENSIONS};
use themeforge_pipeline::CoordinatorConfig;

/// Server configuration, loaded from YAML with CLI/env overrides
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Inference defaults
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Project root; relative paths below resolve against it
    #[serde(default = "default_root_dir")]
    pub root_dir: PathBuf,

    /// Directory scanned by the model listing
    #[serde(default = "default_models_dir")]
    pub models_dir: PathBuf,

    #[serde(default = "default_model_extensions")]
    pub model_extensions: Vec<String>,

    /// Report directory; `null` disables reports
    #[serde(default = "default_output_dir")]
    pub output_dir: Option<PathBuf>,

    #[serde(default = "default_max_themes")]
    pub max_themes: usize,

    #[serde(default = "default_trend_category")]
    pub trend_category: String,

    #[serde(default = "default_trend_limit")]
    pub trend_limit: usize,

    /// Allowed CORS origins; `*` allows any
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,
}

impl ServerConfig {
    /// Load configuration from file and CLI overrides
    pub fn load(config_path: &str, cli: &crate::Cli) -> anyhow::Result<Self> {
        let mut config = Self::from_file(config_path)?;
        config.apply_overrides(cli);
        Ok(config)
    }

    /// Parse a YAML file, or use defaults when it does not exist
    pub fn from_file(config_path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = config_path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&content)?)
    }

    fn apply_overrides(&mut self, cli: &crate::Cli) {
        if let Some(provider) = &cli.provider {
            self.gateway.provider = provider.clone();
        }
        if let Some(model) = &cli.model {
            self.gateway.model = model.clone();
        }
        if let Some(base) = &cli.base_address {
            self.gateway.base_address = Some(base.clone());
        }
        if let Some(credential) = &cli.credential {
            self.gateway.credential = Some(credential.clone());
        }
        if let Some(root) = &cli.root_dir {
            self.root_dir = root.clone();
        }
    }

    /// Coordinator settings with the report directory resolved against the root
    pub fn coordinator(&self) -> CoordinatorConfig {
        CoordinatorConfig {
            max_themes: self.max_themes,
            trend_category: self.trend_category.clone(),
            trend_limit: self.trend_limit,
            output_dir: self.output_dir.as_ref().map(|dir| self.root_dir.join(dir)),
            root_dir: Some(self.root_dir.clone()),
        }
    }

    /// Gateway settings with model paths resolving against the root unless the
    /// file names its own
    pub fn gateway(&self) -> GatewayConfig {
        let mut gateway = self.gateway.clone();
        if gateway.root_dir.is_none() {
            gateway.root_dir = Some(self.root_dir.clone());
        }
        gateway
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            gateway: GatewayConfig::default(),
            root_dir: default_root_dir(),
            models_dir: default_models_dir(),
            model_extensions: default_model_extensions(),
            output_dir: default_output_dir(),
            max_themes: default_max_themes(),
            trend_category: default_trend_category(),
            trend_limit: default_trend_limit(),
            cors_origins: default_cors_origins(),
        }
    }
}

fn default_root_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_models_dir() -> PathBuf {
    PathBuf::from("models")
}

fn default_model_extensions() -> Vec<String> {
    DEFAULT_MODEL_EXTENSIONS.iter().map(|e| e.to_string()).collect()
}

fn default_output_dir() -> Option<PathBuf> {
    Some(PathBuf::from("output"))
}

fn default_max_themes() -> usize {
    10
}

fn default_trend_category() -> String {
    "anime".to_string()
}

fn default_trend_limit() -> usize {
    30
}

fn default_cors_origins() -> Vec<String> {
    vec![
        "http://localhost:5173".to_string(),
        "http://127.0.0.1:5173".to_string(),
    ]
}
