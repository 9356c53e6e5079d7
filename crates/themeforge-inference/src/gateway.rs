//! Inference gateway
//!
//! One entry point, `run(prompt, config)`, over three backend variants. The
//! provider id in the request config (or the gateway default) selects the
//! variant; everything past parsing dispatches on [`Provider`].

use async_trait::async_trait;
use std::sync::Arc;
use themeforge_core::{Error, InferenceConfig, Result};
use tracing::{debug, info};

use crate::chat::ChatBackend;
use crate::config::GatewayConfig;
use crate::local::{LocalBackend, LocalModelLoader, LocalModelSlot};
use crate::provider::{Prompt, Provider};

/// A single backend variant
#[async_trait]
pub trait Backend: Send + Sync {
    /// Run one prompt and return the raw generated text
    async fn run(&self, prompt: &Prompt, config: &InferenceConfig) -> Result<String>;

    /// Backend identifier
    fn name(&self) -> &str;
}

/// Capability consumed by the generation pipeline
#[async_trait]
pub trait ModelRunner: Send + Sync {
    /// Run one prompt against the provider selected by `config`
    async fn run(&self, prompt: &Prompt, config: &InferenceConfig) -> Result<String>;

    /// Release the resident local model; returns whether one was resident
    async fn unload_local(&self) -> bool;

    /// Provider selected by `config`
    fn provider_for(&self, config: &InferenceConfig) -> Result<Provider> {
        config
            .provider
            .as_deref()
            .unwrap_or(Provider::RemoteChat.as_str())
            .parse()
    }
}

/// Provider-agnostic gateway over the chat and local backends
pub struct InferenceGateway {
    remote: ChatBackend,
    compatible: ChatBackend,
    local: LocalBackend,
    slot: Arc<LocalModelSlot>,
    defaults: Arc<GatewayConfig>,
}

impl InferenceGateway {
    /// Create a gateway using the built-in local model loader
    pub fn new(config: GatewayConfig) -> Result<Self> {
        Self::with_loader(config, default_loader())
    }

    /// Create a gateway with a custom local model loader
    pub fn with_loader(config: GatewayConfig, loader: Arc<dyn LocalModelLoader>) -> Result<Self> {
        // Fail early on a bad default rather than on the first request
        config.provider.parse::<Provider>()?;

        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| Error::backend(format!("failed to build HTTP client: {}", e)))?;

        let slot = Arc::new(LocalModelSlot::new(loader, config.local_timeout()));
        let defaults = Arc::new(config);

        info!(
            default_provider = %defaults.provider,
            model = %defaults.model,
            "Inference gateway ready"
        );

        Ok(Self {
            remote: ChatBackend::new(Provider::RemoteChat, client.clone(), Arc::clone(&defaults)),
            compatible: ChatBackend::new(Provider::CompatibleServer, client, Arc::clone(&defaults)),
            local: LocalBackend::new(Arc::clone(&slot), Arc::clone(&defaults)),
            slot,
            defaults,
        })
    }

    fn backend(&self, provider: Provider) -> &dyn Backend {
        match provider {
            Provider::RemoteChat => &self.remote,
            Provider::CompatibleServer => &self.compatible,
            Provider::LocalProcess => &self.local,
        }
    }

    /// Gateway defaults
    pub fn defaults(&self) -> &GatewayConfig {
        &self.defaults
    }

    /// Cancel the local generation in flight, if any
    pub fn cancel_local(&self) -> bool {
        self.slot.cancel()
    }

    /// Number of local model loads performed so far
    pub fn local_load_count(&self) -> usize {
        self.slot.load_count()
    }

    /// Number of local model unloads performed so far
    pub fn local_unload_count(&self) -> usize {
        self.slot.unload_count()
    }
}

#[async_trait]
impl ModelRunner for InferenceGateway {
    async fn run(&self, prompt: &Prompt, config: &InferenceConfig) -> Result<String> {
        let provider = self.provider_for(config)?;
        let backend = self.backend(provider);
        debug!(backend = backend.name(), "Dispatching prompt");
        backend.run(prompt, config).await
    }

    async fn unload_local(&self) -> bool {
        self.slot.unload().await
    }

    fn provider_for(&self, config: &InferenceConfig) -> Result<Provider> {
        config
            .provider
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(self.defaults.provider.as_str())
            .parse()
    }
}

#[cfg(feature = "local-models")]
fn default_loader() -> Arc<dyn LocalModelLoader> {
    Arc::new(crate::candle_engine::CandleLoader::default())
}

#[cfg(not(feature = "local-models"))]
fn default_loader() -> Arc<dyn LocalModelLoader> {
    Arc::new(UnavailableLoader)
}

#[cfg(not(feature = "local-models"))]
struct UnavailableLoader;

#[cfg(not(feature = "local-models"))]
impl LocalModelLoader for UnavailableLoader {
    fn load(
        &self,
        _key: &crate::local::ModelKey,
        _spec: &crate::local::LoadSpec,
    ) -> Result<Box<dyn crate::local::LocalModel>> {
        Err(Error::config(
            "local_process provider requires the `local-models` feature",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gateway(defaults: GatewayConfig) -> InferenceGateway {
        InferenceGateway::new(defaults).unwrap()
    }

    #[test]
    fn test_invalid_default_provider_rejected() {
        let config = GatewayConfig {
            provider: "mystery".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            InferenceGateway::new(config),
            Err(Error::Provider(_))
        ));
    }

    #[test]
    fn test_provider_falls_back_to_default() {
        let gw = gateway(GatewayConfig {
            provider: "vllm".to_string(),
            ..Default::default()
        });

        let provider = gw.provider_for(&InferenceConfig::default()).unwrap();
        assert_eq!(provider, Provider::CompatibleServer);

        let config = InferenceConfig {
            provider: Some("llama_cpp".to_string()),
            ..Default::default()
        };
        assert_eq!(gw.provider_for(&config).unwrap(), Provider::LocalProcess);
    }

    #[tokio::test]
    async fn test_unknown_provider_fails_before_any_call() {
        let gw = gateway(GatewayConfig::default());
        let config = InferenceConfig {
            provider: Some("carrier-pigeon".to_string()),
            ..Default::default()
        };

        let err = gw.run(&Prompt::completion("hi"), &config).await.unwrap_err();
        assert!(matches!(err, Error::Provider(_)));
        assert_eq!(gw.local_load_count(), 0);
    }

    #[tokio::test]
    async fn test_unload_without_resident_model() {
        let gw = gateway(GatewayConfig::default());
        assert!(!gw.unload_local().await);
        assert!(!gw.cancel_local());
    }
}
