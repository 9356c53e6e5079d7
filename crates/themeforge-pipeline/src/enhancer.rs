//! Secondary tagger pass
//!
//! A tag-completion model is prompted with the theme concept followed by the
//! `<|extended|>` marker and the current keywords, and continues the tag
//! list. New tags are appended after the originals. Failures never reach the
//! caller: the theme keeps its original keywords.

use regex::Regex;
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use themeforge_core::{Error, ExtractedThemeDraft, InferenceConfig, Result};
use themeforge_inference::{ModelRunner, Prompt, Provider};
use tracing::{debug, info, warn};

/// Non-content tags dropped from tagger output
pub const BAN_TAGS: [&str; 13] = [
    "background",
    "name",
    "text",
    "joke",
    "costume",
    "alternative",
    "speech",
    "stickers",
    "hat",
    "signature",
    "watermark",
    "username",
    "artist name",
];

/// Section tokens the tagger emits around tag groups
pub const SPECIAL_TOKENS: [&str; 10] = [
    "<|special|>",
    "<|characters|>",
    "<|copyrights|>",
    "<|artist|>",
    "<|general|>",
    "<|generated|>",
    "<|quality|>",
    "<|meta|>",
    "<|rating|>",
    "<|extended|>",
];

/// Tagger prompt: concept on one line, the extension marker, current tags
pub fn build_prompt(concept: &str, keywords: &[String]) -> String {
    let concept = concept.replace(['\r', '\n'], " ");
    let mut prompt = format!("{}\n<|extended|>\n", concept.trim());

    let tags: Vec<String> = keywords
        .iter()
        .map(|k| k.trim().to_lowercase())
        .filter(|k| !k.is_empty())
        .collect();
    if !tags.is_empty() {
        prompt.push_str(&tags.join(", "));
        prompt.push(',');
    }

    prompt
}

/// Originals first (lower-cased, deduplicated), then new tags not yet present
pub fn merge_tags(original: &[String], generated: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    original
        .iter()
        .chain(generated.iter())
        .map(|t| t.trim().to_lowercase())
        .filter(|t| !t.is_empty() && seen.insert(t.clone()))
        .collect()
}

/// Tag enhancer over a secondary local model
pub struct TagEnhancer {
    runner: Arc<dyn ModelRunner>,
    unescape: Regex,
}

impl TagEnhancer {
    pub fn new(runner: Arc<dyn ModelRunner>) -> Result<Self> {
        let unescape = Regex::new(r"\\([()\[\]])")
            .map_err(|e| Error::internal(format!("invalid unescape pattern: {}", e)))?;
        Ok(Self { runner, unescape })
    }

    /// Clean raw tagger output into a deduplicated tag list
    pub fn parse_output(&self, raw: &str) -> Vec<String> {
        let mut text = raw.to_string();
        for token in SPECIAL_TOKENS {
            text = text.replace(token, "");
        }
        let text = self.unescape.replace_all(&text, "$1");

        let mut seen = HashSet::new();
        text.split(',')
            .map(|t| t.trim().to_lowercase())
            .filter(|t| !t.is_empty() && !BAN_TAGS.contains(&t.as_str()))
            .filter(|t| seen.insert(t.clone()))
            .collect()
    }

    /// Enhance every draft's keywords with the tagger at `tagger_path`,
    /// returning which drafts were enhanced
    pub async fn enhance_all(
        &self,
        mut drafts: Vec<ExtractedThemeDraft>,
        tagger_path: &Path,
        config: &InferenceConfig,
    ) -> (Vec<ExtractedThemeDraft>, Vec<bool>) {
        if matches!(self.runner.provider_for(config), Ok(Provider::LocalProcess)) {
            debug!("Releasing primary local model before loading the tagger");
            self.runner.unload_local().await;
        }

        let tagger_config = InferenceConfig {
            provider: Some(Provider::LocalProcess.as_str().to_string()),
            local_path: Some(tagger_path.to_string_lossy().into_owned()),
            gpu_layers: config.gpu_layers,
            context_size: config.context_size,
            ..Default::default()
        };

        let mut enhanced = Vec::with_capacity(drafts.len());
        for draft in drafts.iter_mut() {
            match self.enhance_one(draft, &tagger_config).await {
                Ok(keywords) => {
                    draft.keywords = keywords;
                    enhanced.push(true);
                }
                Err(e) => {
                    warn!(title = %draft.title, error = %e, "Tag enhancement failed, keeping original keywords");
                    enhanced.push(false);
                }
            }
        }

        info!(
            enhanced = enhanced.iter().filter(|e| **e).count(),
            total = drafts.len(),
            "Tag enhancement complete"
        );
        (drafts, enhanced)
    }

    async fn enhance_one(
        &self,
        draft: &ExtractedThemeDraft,
        tagger_config: &InferenceConfig,
    ) -> Result<Vec<String>> {
        let prompt = Prompt::completion(build_prompt(&draft.short_concept, &draft.keywords));
        let raw = self
            .runner
            .run(&prompt, tagger_config)
            .await
            .map_err(|e| Error::enhancement(e.to_string()))?;

        let generated = self.parse_output(&raw);
        if generated.is_empty() {
            return Err(Error::enhancement("tagger produced no tags"));
        }

        Ok(merge_tags(&draft.keywords, &generated))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    /// Answers every tagger prompt with the same text
    struct FixedRunner(&'static str);

    #[async_trait::async_trait]
    impl ModelRunner for FixedRunner {
        async fn run(&self, _prompt: &Prompt, config: &InferenceConfig) -> Result<String> {
            assert_eq!(config.provider.as_deref(), Some("local_process"));
            Ok(self.0.to_string())
        }

        async fn unload_local(&self) -> bool {
            false
        }
    }

    fn enhancer() -> TagEnhancer {
        TagEnhancer::new(Arc::new(FixedRunner(""))).unwrap()
    }

    #[test]
    fn test_build_prompt() {
        let prompt = build_prompt(
            "A girl at the beach.\nSunset light.",
            &strings(&["Beach", " sunset ", ""]),
        );
        assert_eq!(prompt, "A girl at the beach. Sunset light.\n<|extended|>\nbeach, sunset,");

        assert_eq!(build_prompt("Quiet room", &[]), "Quiet room\n<|extended|>\n");
    }

    #[test]
    fn test_merge_tags() {
        let merged = merge_tags(&strings(&["sky", "Sky", "cloud"]), &strings(&["sky", "sunset"]));
        assert_eq!(merged, ["sky", "cloud", "sunset"]);
    }

    #[test]
    fn test_parse_output_drops_banned_terms() {
        let tags = enhancer().parse_output("watermark, sunset");
        assert_eq!(tags, ["sunset"]);
    }

    #[test]
    fn test_parse_output_cleans_tokens_and_escapes() {
        let raw = "<|general|>1girl, hatsune miku \\(vocaloid\\), Artist Name, <|quality|>masterpiece, 1girl,, \\[sic\\]";
        let tags = enhancer().parse_output(raw);
        assert_eq!(tags, ["1girl", "hatsune miku (vocaloid)", "masterpiece", "[sic]"]);
    }

    #[tokio::test]
    async fn test_empty_tagger_output_keeps_originals() {
        let drafts = vec![ExtractedThemeDraft {
            title: "A".to_string(),
            short_concept: "x".to_string(),
            keywords: strings(&["Beach"]),
            mood: vec![],
        }];

        let (out, enhanced) = enhancer()
            .enhance_all(drafts.clone(), Path::new("/models/tagger.gguf"), &InferenceConfig::default())
            .await;
        assert_eq!(out, drafts);
        assert_eq!(enhanced, [false]);

        let tagging = TagEnhancer::new(Arc::new(FixedRunner("sunset, beach"))).unwrap();
        let (out, enhanced) = tagging
            .enhance_all(drafts, Path::new("/models/tagger.gguf"), &InferenceConfig::default())
            .await;
        assert_eq!(out[0].keywords, ["beach", "sunset"]);
        assert_eq!(enhanced, [true]);
    }
}
