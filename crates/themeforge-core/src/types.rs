//! Core types for Themeforge

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;

/// Fixed category order used when flattening prompt tags for reporting
pub const CATEGORY_ORDER: [&str; 7] = [
    "clothing",
    "character",
    "setting",
    "mood",
    "action",
    "object",
    "artistic",
];

/// Categories every classified theme carries, even when empty
pub const CLASSIFIED_CATEGORIES: [&str; 7] = [
    "clothing",
    "mood",
    "setting",
    "expression",
    "action",
    "artistic",
    "object",
];

/// Content-sensitivity level of a theme
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum NsfwLevel {
    #[default]
    Sfw,
    Mild,
    Nsfw,
}

impl NsfwLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sfw => "sfw",
            Self::Mild => "mild",
            Self::Nsfw => "nsfw",
        }
    }
}

impl fmt::Display for NsfwLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Category name to ordered tag list
///
/// Lists keep insertion order. Duplicates are allowed while building and
/// removed by [`PromptTags::dedup`], which keeps the first occurrence.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PromptTags(BTreeMap<String, Vec<String>>);

impl PromptTags {
    /// Create an empty tag map
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a tag map with the given categories present and empty
    pub fn with_categories<'a>(categories: impl IntoIterator<Item = &'a str>) -> Self {
        Self(
            categories
                .into_iter()
                .map(|c| (c.to_string(), Vec::new()))
                .collect(),
        )
    }

    /// Append one tag to a category, creating it when missing
    pub fn push(&mut self, category: &str, tag: impl Into<String>) {
        self.0.entry(category.to_string()).or_default().push(tag.into());
    }

    /// Append several tags to a category
    pub fn extend<I, S>(&mut self, category: &str, tags: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let entry = self.0.entry(category.to_string()).or_default();
        entry.extend(tags.into_iter().map(Into::into));
    }

    /// Tags of a category (empty slice when the category is absent)
    pub fn get(&self, category: &str) -> &[String] {
        self.0.get(category).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Whether a category contains the given tag
    pub fn contains(&self, category: &str, tag: &str) -> bool {
        self.get(category).iter().any(|t| t == tag)
    }

    /// Remove duplicates inside each category, keeping first-seen order
    pub fn dedup(&mut self) {
        for tags in self.0.values_mut() {
            let mut seen = HashSet::new();
            tags.retain(|t| seen.insert(t.clone()));
        }
    }

    /// Drop every tag for which `keep` returns false
    pub fn retain(&mut self, mut keep: impl FnMut(&str) -> bool) {
        for tags in self.0.values_mut() {
            tags.retain(|t| keep(t));
        }
    }

    /// Non-empty categories in reporting order: the fixed order first, then the
    /// remaining categories alphabetically
    pub fn ordered(&self) -> Vec<(&str, &[String])> {
        let mut out: Vec<(&str, &[String])> = CATEGORY_ORDER
            .iter()
            .filter_map(|cat| {
                self.0
                    .get_key_value(*cat)
                    .filter(|(_, tags)| !tags.is_empty())
                    .map(|(k, v)| (k.as_str(), v.as_slice()))
            })
            .collect();

        out.extend(
            self.0
                .iter()
                .filter(|(k, v)| !CATEGORY_ORDER.contains(&k.as_str()) && !v.is_empty())
                .map(|(k, v)| (k.as_str(), v.as_slice())),
        );

        out
    }

    /// All tags concatenated in reporting order
    pub fn flatten(&self) -> Vec<String> {
        self.ordered()
            .into_iter()
            .flat_map(|(_, tags)| tags.iter().cloned())
            .collect()
    }

    /// Iterate over all categories
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Vec<String>)> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.values().all(Vec::is_empty)
    }
}

impl<const N: usize> From<[(&str, &[&str]); N]> for PromptTags {
    fn from(entries: [(&str, &[&str]); N]) -> Self {
        Self(
            entries
                .into_iter()
                .map(|(cat, tags)| {
                    (
                        cat.to_string(),
                        tags.iter().map(|t| t.to_string()).collect(),
                    )
                })
                .collect(),
        )
    }
}

/// Intermediate theme produced by the extraction stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedThemeDraft {
    pub title: String,
    pub short_concept: String,
    pub keywords: Vec<String>,
    pub mood: Vec<String>,
}

/// Provenance of a theme
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThemeSource {
    /// Produced by the language model pipeline
    Llm,
    /// Produced by season/focus combinatorics
    RuleBased,
}

/// Open metadata bag attached to a theme
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThemeMeta {
    pub season: String,
    pub platform: String,
    pub source: ThemeSource,
    #[serde(default)]
    pub raw_keywords: Vec<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// A structured, classified illustration concept proposal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThemeCandidate {
    pub title: String,
    pub short_concept: String,
    pub keywords: Vec<String>,
    pub mood: Vec<String>,
    pub prompt_tags: PromptTags,
    pub nsfw_level: NsfwLevel,
    pub meta: ThemeMeta,
}

/// Provider configuration carried by a generation request
///
/// Field aliases accept the names older clients send (`base_url`, `api_key`,
/// `model_path`, `n_gpu_layers`, `n_ctx`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InferenceConfig {
    /// Provider id, parsed by the gateway
    #[serde(default)]
    pub provider: Option<String>,

    /// Model id for chat backends
    #[serde(default)]
    pub model: Option<String>,

    #[serde(default, alias = "base_url")]
    pub base_address: Option<String>,

    #[serde(default, alias = "api_key")]
    pub credential: Option<String>,

    /// Model file for the local-process backend
    #[serde(default, alias = "model_path")]
    pub local_path: Option<String>,

    /// Explicit tokenizer file; defaults to `tokenizer.json` next to the model
    #[serde(default)]
    pub tokenizer_path: Option<String>,

    #[serde(default, alias = "n_gpu_layers")]
    pub gpu_layers: Option<i32>,

    #[serde(default, alias = "n_ctx")]
    pub context_size: Option<usize>,

    /// Secondary tagger model used for tag enhancement
    #[serde(default)]
    pub secondary_tagger_path: Option<String>,

    /// Release the local model once the generation completes
    #[serde(default)]
    pub unload_after_generate: bool,
}

impl InferenceConfig {
    /// Whether GPU offload was requested
    pub fn gpu_requested(&self) -> bool {
        self.gpu_layers.map_or(false, |n| n != 0)
    }
}

/// Raw theme generation request as received from callers
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenerationRequest {
    #[serde(default)]
    pub season: Option<String>,
    #[serde(default)]
    pub focus: Option<String>,
    #[serde(default)]
    pub platform: Option<String>,
    #[serde(default)]
    pub count: Option<i64>,
    #[serde(default)]
    pub nsfw_level: Option<NsfwLevel>,
    #[serde(default, alias = "inference")]
    pub llm: Option<InferenceConfig>,
}

/// Normalized generation options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationOptions {
    pub season: String,
    pub focus: String,
    pub platform: String,
    pub count: usize,
    pub nsfw_level: NsfwLevel,
}

impl GenerationOptions {
    pub const DEFAULT_SEASON: &'static str = "any";
    pub const DEFAULT_FOCUS: &'static str = "original_girl";
    pub const DEFAULT_PLATFORM: &'static str = "x";

    /// Apply defaults and clamp the count to `1..=max_count`
    pub fn from_request(request: &GenerationRequest, max_count: usize) -> Self {
        let count = request.count.unwrap_or(3).max(1) as usize;

        Self {
            season: non_blank(&request.season)
                .unwrap_or(Self::DEFAULT_SEASON)
                .to_lowercase(),
            focus: non_blank(&request.focus)
                .unwrap_or(Self::DEFAULT_FOCUS)
                .to_string(),
            platform: non_blank(&request.platform)
                .unwrap_or(Self::DEFAULT_PLATFORM)
                .to_lowercase(),
            count: count.min(max_count.max(1)),
            nsfw_level: request.nsfw_level.unwrap_or_default(),
        }
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dedup_keeps_first_seen_order() {
        let mut tags = PromptTags::new();
        tags.extend("setting", ["beach", "sky", "beach", "summer", "sky"]);
        tags.dedup();
        assert_eq!(tags.get("setting"), ["beach", "sky", "summer"]);
    }

    #[test]
    fn test_flatten_uses_fixed_order_then_rest() {
        let tags = PromptTags::from([
            ("artistic", &["masterpiece"][..]),
            ("expression", &["smile"][..]),
            ("clothing", &["bikini"][..]),
            ("setting", &["beach"][..]),
            ("object", &[][..]),
        ]);

        assert_eq!(tags.flatten(), ["bikini", "beach", "masterpiece", "smile"]);

        let names: Vec<&str> = tags.ordered().iter().map(|(c, _)| *c).collect();
        assert_eq!(names, ["clothing", "setting", "artistic", "expression"]);
    }

    #[test]
    fn test_options_defaults_and_clamp() {
        let request = GenerationRequest {
            count: Some(-4),
            platform: Some("  ".to_string()),
            ..Default::default()
        };
        let options = GenerationOptions::from_request(&request, 10);
        assert_eq!(options.count, 1);
        assert_eq!(options.season, "any");
        assert_eq!(options.focus, "original_girl");
        assert_eq!(options.platform, "x");
        assert_eq!(options.nsfw_level, NsfwLevel::Sfw);

        let request = GenerationRequest {
            count: Some(50),
            season: Some("Summer".to_string()),
            ..Default::default()
        };
        let options = GenerationOptions::from_request(&request, 10);
        assert_eq!(options.count, 10);
        assert_eq!(options.season, "summer");
    }

    #[test]
    fn test_inference_config_aliases() {
        let json = r#"{"provider":"llama_cpp","model_path":"models/a.gguf","n_gpu_layers":-1,"n_ctx":4096}"#;
        let config: InferenceConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.local_path.as_deref(), Some("models/a.gguf"));
        assert_eq!(config.context_size, Some(4096));
        assert!(config.gpu_requested());
        assert!(!config.unload_after_generate);
    }

    #[test]
    fn test_theme_meta_flattens_extra() {
        let mut extra = serde_json::Map::new();
        extra.insert("enhanced".to_string(), serde_json::Value::Bool(true));
        let meta = ThemeMeta {
            season: "summer".to_string(),
            platform: "x".to_string(),
            source: ThemeSource::Llm,
            raw_keywords: vec!["beach".to_string()],
            extra,
        };
        let value = serde_json::to_value(&meta).unwrap();
        assert_eq!(value["source"], "llm");
        assert_eq!(value["enhanced"], true);
    }
}
