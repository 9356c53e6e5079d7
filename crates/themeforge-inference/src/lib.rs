//! Themeforge Inference
//!
//! Provider-agnostic text generation for the theme pipeline.
//!
//! # Backends
//!
//! - `remote_chat`: hosted chat-completion endpoint (credential required)
//! - `compatible_server`: self-hosted chat-completion endpoint (base address required)
//! - `local_process`: in-process GGUF model with a single resident slot
//!
//! # Example
//!
//! ```ignore
//! use themeforge_inference::{GatewayConfig, InferenceGateway, ModelRunner, Prompt};
//! use themeforge_core::InferenceConfig;
//!
//! let gateway = InferenceGateway::new(GatewayConfig::default())?;
//! let config = InferenceConfig {
//!     provider: Some("compatible_server".into()),
//!     base_address: Some("http://localhost:8000/v1".into()),
//!     ..Default::default()
//! };
//! let text = gateway.run(&Prompt::chat("You are helpful.", "Hello"), &config).await?;
//! ```

pub mod chat;
pub mod config;
pub mod discovery;
pub mod gateway;
pub mod local;
pub mod provider;

#[cfg(feature = "local-models")]
pub mod candle_engine;

pub use config::GatewayConfig;
pub use discovery::{discover_models, ModelFileInfo, DEFAULT_MODEL_EXTENSIONS};
pub use gateway::{Backend, InferenceGateway, ModelRunner};
pub use local::{LoadSpec, LocalModel, LocalModelLoader, LocalModelSlot, ModelKey};
pub use provider::{Prompt, Provider, SamplingParams};

#[cfg(feature = "local-models")]
pub use candle_engine::CandleLoader;
