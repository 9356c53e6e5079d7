//! Resident local model management
//!
//! A [`LocalModelSlot`] owns at most one loaded model. The model is identified
//! by a [`ModelKey`] (file path + GPU flag); asking for a different key
//! releases the resident model before the new one is loaded. All access goes
//! through an async mutex, so at most one generation runs against the
//! resident model at a time.

use async_trait::async_trait;
use parking_lot::Mutex as SyncMutex;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use themeforge_core::{Error, InferenceConfig, Result};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::GatewayConfig;
use crate::gateway::Backend;
use crate::provider::{Prompt, SamplingParams};

/// Identity of a resident model
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ModelKey {
    pub path: PathBuf,
    pub gpu: bool,
}

/// Load-time settings that do not participate in the identity key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadSpec {
    pub tokenizer_path: Option<PathBuf>,
    pub context_size: usize,
}

/// A loaded text-completion model
pub trait LocalModel: Send {
    /// Generate a completion; implementations check `cancel` between tokens
    fn complete(
        &mut self,
        prompt: &str,
        params: &SamplingParams,
        cancel: &CancellationToken,
    ) -> Result<String>;
}

/// Loads models from disk
pub trait LocalModelLoader: Send + Sync + 'static {
    fn load(&self, key: &ModelKey, spec: &LoadSpec) -> Result<Box<dyn LocalModel>>;
}

#[derive(Default)]
struct SlotState {
    key: Option<ModelKey>,
    model: Option<Box<dyn LocalModel>>,
}

/// Owner of the single resident local model
pub struct LocalModelSlot {
    loader: Arc<dyn LocalModelLoader>,
    state: Mutex<SlotState>,
    in_flight: SyncMutex<Option<CancellationToken>>,
    timeout: Duration,
    loads: AtomicUsize,
    unloads: AtomicUsize,
}

impl LocalModelSlot {
    pub fn new(loader: Arc<dyn LocalModelLoader>, timeout: Duration) -> Self {
        Self {
            loader,
            state: Mutex::new(SlotState::default()),
            in_flight: SyncMutex::new(None),
            timeout,
            loads: AtomicUsize::new(0),
            unloads: AtomicUsize::new(0),
        }
    }

    /// Run one completion against the model identified by `key`, loading it
    /// first when it is not resident
    pub async fn generate(
        &self,
        key: ModelKey,
        spec: LoadSpec,
        prompt: String,
        params: SamplingParams,
    ) -> Result<String> {
        let mut state = self.state.lock().await;
        self.ensure_loaded(&mut state, key, spec).await?;

        let mut model = state
            .model
            .take()
            .ok_or_else(|| Error::internal("local model slot is empty after load"))?;

        let token = CancellationToken::new();
        *self.in_flight.lock() = Some(token.clone());

        let task_token = token.clone();
        let mut handle = tokio::task::spawn_blocking(move || {
            let result = model.complete(&prompt, &params, &task_token);
            (model, result)
        });

        let mut timed_out = false;
        let joined = match tokio::time::timeout(self.timeout, &mut handle).await {
            Ok(joined) => joined,
            Err(_) => {
                warn!(timeout_secs = self.timeout.as_secs(), "Local generation timed out, cancelling");
                timed_out = true;
                token.cancel();
                handle.await
            }
        };
        *self.in_flight.lock() = None;

        match joined {
            Ok((model, result)) => {
                state.model = Some(model);
                if timed_out {
                    Err(Error::Timeout)
                } else {
                    result
                }
            }
            Err(e) => {
                // The model went down with the task
                state.key = None;
                Err(Error::backend(format!("local generation task failed: {}", e)))
            }
        }
    }

    async fn ensure_loaded(
        &self,
        state: &mut SlotState,
        key: ModelKey,
        spec: LoadSpec,
    ) -> Result<()> {
        if state.model.is_some() && state.key.as_ref() == Some(&key) {
            debug!(path = %key.path.display(), "Reusing resident local model");
            return Ok(());
        }

        if state.model.is_some() {
            self.release(state);
        }

        info!(path = %key.path.display(), gpu = key.gpu, "Loading local model");
        let loader = Arc::clone(&self.loader);
        let load_key = key.clone();
        let model = tokio::task::spawn_blocking(move || loader.load(&load_key, &spec))
            .await
            .map_err(|e| Error::backend(format!("local model load task failed: {}", e)))??;

        self.loads.fetch_add(1, Ordering::SeqCst);
        state.key = Some(key);
        state.model = Some(model);
        Ok(())
    }

    fn release(&self, state: &mut SlotState) -> bool {
        let released = state.model.take().is_some();
        if released {
            if let Some(key) = &state.key {
                info!(path = %key.path.display(), "Unloading local model");
            }
            self.unloads.fetch_add(1, Ordering::SeqCst);
        }
        state.key = None;
        released
    }

    /// Release the resident model; returns whether one was resident
    pub async fn unload(&self) -> bool {
        let mut state = self.state.lock().await;
        self.release(&mut state)
    }

    /// Cancel the generation currently in flight, if any
    pub fn cancel(&self) -> bool {
        match self.in_flight.lock().as_ref() {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Key of the resident model
    pub async fn resident(&self) -> Option<ModelKey> {
        let state = self.state.lock().await;
        state.model.as_ref().and(state.key.clone())
    }

    /// Number of loads performed so far
    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    /// Number of unloads performed so far
    pub fn unload_count(&self) -> usize {
        self.unloads.load(Ordering::SeqCst)
    }
}

/// Backend serving the local-process provider from a shared slot
pub struct LocalBackend {
    slot: Arc<LocalModelSlot>,
    defaults: Arc<GatewayConfig>,
}

impl LocalBackend {
    pub fn new(slot: Arc<LocalModelSlot>, defaults: Arc<GatewayConfig>) -> Self {
        Self { slot, defaults }
    }

    /// Resolve identity key and load settings for a request
    pub fn resolve(&self, config: &InferenceConfig) -> Result<(ModelKey, LoadSpec)> {
        let path = config
            .local_path
            .as_deref()
            .or(self.defaults.local_path.as_deref())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                Error::config("provider 'local_process' requires a model path (llm.local_path)")
            })?;

        let gpu_layers = config.gpu_layers.unwrap_or(self.defaults.gpu_layers);
        let key = ModelKey {
            path: self.defaults.resolve_path(path),
            gpu: gpu_layers != 0,
        };
        let spec = LoadSpec {
            tokenizer_path: config
                .tokenizer_path
                .as_deref()
                .map(|p| self.defaults.resolve_path(p)),
            context_size: config.context_size.unwrap_or(self.defaults.context_size),
        };

        Ok((key, spec))
    }
}

#[async_trait]
impl Backend for LocalBackend {
    async fn run(&self, prompt: &Prompt, config: &InferenceConfig) -> Result<String> {
        let (key, spec) = self.resolve(config)?;
        let params = SamplingParams {
            temperature: self.defaults.temperature,
            max_tokens: self.defaults.max_tokens,
            stop: prompt.stop.clone(),
        };

        self.slot
            .generate(key, spec, prompt.render_completion(), params)
            .await
    }

    fn name(&self) -> &str {
        "local_process"
    }
}
