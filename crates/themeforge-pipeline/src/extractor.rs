//! Two-stage ideate-then-extract protocol
//!
//! The first call lets the model brainstorm freely; the second converts that
//! text into a strict JSON array of theme objects.

use serde::Serialize;
use std::sync::Arc;
use themeforge_core::{Error, ExtractedThemeDraft, GenerationOptions, InferenceConfig, Result};
use themeforge_inference::{ModelRunner, Prompt};
use tracing::{debug, info, warn};

use crate::context::Preferences;
use crate::repair::{normalize_drafts, parse_array};

/// Stop sequences for text-completion backends on the extraction call
const EXTRACTION_STOP: [&str; 1] = ["</json>"];

/// Instruction and context for the ideation call
#[derive(Debug, Clone, Serialize)]
pub struct IdeationBrief {
    pub instruction: String,
    pub options: GenerationOptions,
    pub trend_tags: Vec<String>,
    pub preferences: Preferences,
}

impl IdeationBrief {
    /// Default creative instruction for anime illustration themes
    pub const DEFAULT_INSTRUCTION: &'static str = "You are a creative assistant for generating anime illustration themes. \
         Based on the provided options (season, focus, etc.) and trending tags, \
         generate distinct and interesting themes that fit the anime art style. \
         Ensure variety in composition and mood.";

    pub fn new(options: GenerationOptions, trend_tags: Vec<String>, preferences: Preferences) -> Self {
        Self {
            instruction: Self::DEFAULT_INSTRUCTION.to_string(),
            options,
            trend_tags,
            preferences,
        }
    }
}

/// Result of one extraction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extraction {
    pub drafts: Vec<ExtractedThemeDraft>,
    /// Number of themes asked for
    pub requested: usize,
    /// Whether the JSON needed the truncation repair
    pub repaired: bool,
}

impl Extraction {
    /// Themes missing relative to the request
    pub fn shortfall(&self) -> usize {
        self.requested.saturating_sub(self.drafts.len())
    }
}

/// Free-text brainstorming prompt
pub fn ideation_prompt(brief: &IdeationBrief, count: usize) -> Prompt {
    let options = &brief.options;
    let mut user = format!(
        "Propose {count} distinct illustration theme ideas.\n\n\
         Season: {}\nFocus: {}\nPlatform: {}\nContent level: {}\n",
        options.season, options.focus, options.platform, options.nsfw_level
    );

    if !brief.trend_tags.is_empty() {
        user.push_str(&format!("Trending tags: {}\n", brief.trend_tags.join(", ")));
    }
    if !brief.preferences.favorite_motifs.is_empty() {
        user.push_str(&format!(
            "Favorite motifs: {}\n",
            brief.preferences.favorite_motifs.join(", ")
        ));
    }
    if !brief.preferences.disallowed_tags.is_empty() {
        user.push_str(&format!(
            "Never use: {}\n",
            brief.preferences.disallowed_tags.join(", ")
        ));
    }

    user.push_str(
        "\nFor each idea give a title, a one-sentence concept, visual keywords \
         (short danbooru-style tags) and a few mood words. Write freely; no \
         particular format is required.",
    );

    Prompt::chat(brief.instruction.clone(), user)
}

/// Strict conversion prompt wrapping the ideation text verbatim
pub fn extraction_prompt(ideas: &str, count: usize) -> Prompt {
    let system = format!(
        "You convert illustration theme ideas into JSON.\n\
         Return ONLY a valid JSON array of exactly {count} objects. Do not include any extra text.\n\
         Each object must have these fields:\n\
         - \"title\": string\n\
         - \"short_concept\": string\n\
         - \"keywords\": array of short English-like tags\n\
         - \"mood\": array of mood words (e.g. \"soft\", \"bright\", \"nostalgic\")"
    );
    let user = format!("Theme ideas:\n{}\n\nOutput JSON array only:", ideas.trim());

    Prompt::chat(system, user).with_stop(EXTRACTION_STOP)
}

/// Parse and normalize extraction output for `count` requested themes
pub fn parse_extraction(raw: &str, count: usize) -> Result<Extraction> {
    let (values, repaired) = parse_array(raw)?;
    if repaired {
        warn!("Extraction output was truncated; recovered complete objects only");
    }

    let drafts = normalize_drafts(values, count);
    if drafts.is_empty() {
        return Err(Error::EmptyResult);
    }

    Ok(Extraction {
        drafts,
        requested: count,
        repaired,
    })
}

/// Runs the ideation and extraction calls through a model runner
pub struct ResponseExtractor {
    runner: Arc<dyn ModelRunner>,
}

impl ResponseExtractor {
    pub fn new(runner: Arc<dyn ModelRunner>) -> Self {
        Self { runner }
    }

    /// Brainstorm then extract up to `count` drafts
    pub async fn extract(
        &self,
        brief: &IdeationBrief,
        count: usize,
        config: &InferenceConfig,
    ) -> Result<Extraction> {
        let count = count.max(1);

        let ideas = self.runner.run(&ideation_prompt(brief, count), config).await?;
        debug!(chars = ideas.len(), "Ideation stage complete");

        let raw = self
            .runner
            .run(&extraction_prompt(&ideas, count), config)
            .await?;
        debug!(chars = raw.len(), "Extraction stage complete");

        let extraction = parse_extraction(&raw, count)?;
        if extraction.shortfall() > 0 {
            warn!(
                requested = extraction.requested,
                returned = extraction.drafts.len(),
                "Model returned fewer themes than requested"
            );
        }
        info!(themes = extraction.drafts.len(), "Extracted theme drafts");

        Ok(extraction)
    }
}
