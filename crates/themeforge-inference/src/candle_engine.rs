//! In-process GGUF text completion on Candle
//!
//! Loads a quantized llama-family model and its `tokenizer.json`, then runs a
//! plain sampling loop. The prompt is truncated from the left so that prompt
//! plus `max_tokens` fits the configured context size.

use candle_core::quantized::gguf_file;
use candle_core::{Device, Tensor};
use candle_transformers::generation::LogitsProcessor;
use candle_transformers::models::quantized_llama::ModelWeights;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use themeforge_core::{Error, Result};
use tokenizers::Tokenizer;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::local::{LoadSpec, LocalModel, LocalModelLoader, ModelKey};
use crate::provider::{truncate_at_stop, SamplingParams};

/// Tokens treated as end-of-sequence when present in the vocabulary
const EOS_CANDIDATES: [&str; 4] = ["</s>", "<|endoftext|>", "<|eot_id|>", "<|im_end|>"];

/// Generated tokens between two stop-sequence checks
const STOP_CHECK_INTERVAL: usize = 8;

fn candle_err(context: &str) -> impl Fn(candle_core::Error) -> Error + '_ {
    move |e| Error::backend(format!("{}: {}", context, e))
}

/// Loader for quantized GGUF models
#[derive(Debug, Default, Clone)]
pub struct CandleLoader;

impl CandleLoader {
    fn select_device(gpu: bool) -> Result<Device> {
        if gpu {
            Device::cuda_if_available(0).map_err(candle_err("failed to select device"))
        } else {
            Ok(Device::Cpu)
        }
    }

    fn tokenizer_path(model_path: &Path, spec: &LoadSpec) -> PathBuf {
        spec.tokenizer_path.clone().unwrap_or_else(|| {
            model_path
                .parent()
                .unwrap_or_else(|| Path::new("."))
                .join("tokenizer.json")
        })
    }
}

impl LocalModelLoader for CandleLoader {
    fn load(&self, key: &ModelKey, spec: &LoadSpec) -> Result<Box<dyn LocalModel>> {
        if !key.path.is_file() {
            return Err(Error::config(format!(
                "model file not found: {}",
                key.path.display()
            )));
        }

        let device = Self::select_device(key.gpu)?;

        let mut file = std::fs::File::open(&key.path)?;
        let content = gguf_file::Content::read(&mut file)
            .map_err(|e| e.with_path(&key.path))
            .map_err(candle_err("failed to read GGUF header"))?;
        let weights = ModelWeights::from_gguf(content, &mut file, &device)
            .map_err(candle_err("failed to load GGUF weights"))?;

        let tokenizer_path = Self::tokenizer_path(&key.path, spec);
        let tokenizer = Tokenizer::from_file(&tokenizer_path).map_err(|e| {
            Error::config(format!(
                "failed to load tokenizer {}: {}",
                tokenizer_path.display(),
                e
            ))
        })?;

        let eos_token = EOS_CANDIDATES
            .iter()
            .find_map(|t| tokenizer.token_to_id(t));

        info!(
            path = %key.path.display(),
            device = ?device,
            context_size = spec.context_size,
            "Loaded GGUF model"
        );

        Ok(Box::new(CandleModel {
            weights,
            tokenizer,
            device,
            eos_token,
            context_size: spec.context_size,
        }))
    }
}

/// A resident quantized model
pub struct CandleModel {
    weights: ModelWeights,
    tokenizer: Tokenizer,
    device: Device,
    eos_token: Option<u32>,
    context_size: usize,
}

impl CandleModel {
    fn encode(&self, prompt: &str, max_tokens: usize) -> Result<Vec<u32>> {
        let encoding = self
            .tokenizer
            .encode(prompt, true)
            .map_err(|e| Error::backend(format!("tokenization failed: {}", e)))?;
        let ids = encoding.get_ids();

        let budget = self.context_size.saturating_sub(max_tokens).max(1);
        if ids.len() > budget {
            debug!(
                prompt_tokens = ids.len(),
                budget, "Truncating prompt from the left"
            );
            Ok(ids[ids.len() - budget..].to_vec())
        } else {
            Ok(ids.to_vec())
        }
    }

    fn decode(&self, ids: &[u32]) -> Result<String> {
        self.tokenizer
            .decode(ids, true)
            .map_err(|e| Error::backend(format!("detokenization failed: {}", e)))
    }

    fn step(&mut self, input: &[u32], index_pos: usize) -> Result<Tensor> {
        let input = Tensor::new(input, &self.device)
            .and_then(|t| t.unsqueeze(0))
            .map_err(candle_err("failed to build input tensor"))?;
        self.weights
            .forward(&input, index_pos)
            .and_then(|logits| logits.squeeze(0))
            .map_err(candle_err("forward pass failed"))
    }
}

impl LocalModel for CandleModel {
    fn complete(
        &mut self,
        prompt: &str,
        params: &SamplingParams,
        cancel: &CancellationToken,
    ) -> Result<String> {
        let max_tokens = params.max_tokens as usize;
        let prompt_ids = self.encode(prompt, max_tokens)?;

        let temperature = (params.temperature > 0.0).then_some(params.temperature as f64);
        let seed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or_default();
        let mut sampler = LogitsProcessor::new(seed, temperature, None);

        let mut generated: Vec<u32> = Vec::with_capacity(max_tokens);
        let mut logits = self.step(&prompt_ids, 0)?;

        for index in 0..max_tokens {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }

            let next = sampler
                .sample(&logits)
                .map_err(candle_err("sampling failed"))?;
            if Some(next) == self.eos_token {
                break;
            }
            generated.push(next);

            if !params.stop.is_empty() && generated.len() % STOP_CHECK_INTERVAL == 0 {
                let text = self.decode(&generated)?;
                if truncate_at_stop(&text, &params.stop).len() < text.len() {
                    break;
                }
            }

            logits = self.step(&[next], prompt_ids.len() + index)?;
        }

        let text = self.decode(&generated)?;
        Ok(truncate_at_stop(&text, &params.stop).to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenizer_defaults_to_model_directory() {
        let spec = LoadSpec {
            tokenizer_path: None,
            context_size: 4096,
        };
        let path = CandleLoader::tokenizer_path(Path::new("/models/qwen/q4.gguf"), &spec);
        assert_eq!(path, PathBuf::from("/models/qwen/tokenizer.json"));

        let spec = LoadSpec {
            tokenizer_path: Some(PathBuf::from("/tok/custom.json")),
            context_size: 4096,
        };
        let path = CandleLoader::tokenizer_path(Path::new("/models/qwen/q4.gguf"), &spec);
        assert_eq!(path, PathBuf::from("/tok/custom.json"));
    }

    #[test]
    fn test_missing_model_file_is_config_error() {
        let key = ModelKey {
            path: PathBuf::from("/nonexistent/model.gguf"),
            gpu: false,
        };
        let spec = LoadSpec {
            tokenizer_path: None,
            context_size: 4096,
        };
        match CandleLoader.load(&key, &spec) {
            Err(Error::Config(msg)) => assert!(msg.contains("model file not found")),
            Err(other) => panic!("Expected Config error, got {:?}", other),
            Ok(_) => panic!("Expected load failure"),
        }
    }
}
