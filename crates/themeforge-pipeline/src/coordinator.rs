//! Theme generation coordinator
//!
//! Decides between the model-backed and rule-based paths and runs the stages
//! in order: extraction, optional enhancement, classification, assembly.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use themeforge_core::{
    ExtractedThemeDraft, GenerationOptions, GenerationRequest, InferenceConfig, PromptTags,
    Result, ThemeCandidate, ThemeMeta, ThemeSource,
};
use themeforge_inference::ModelRunner;
use tracing::{debug, error, info, warn};

use crate::classifier::{ClassifierInput, TagClassifier};
use crate::context::{PreferenceSource, Preferences, TrendSource};
use crate::enhancer::TagEnhancer;
use crate::extractor::{IdeationBrief, ResponseExtractor};
use crate::report::ReportWriter;
use crate::rules::RuleBasedGenerator;
use crate::templates::TemplateLibrary;

/// Coordinator settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// Upper bound on themes per request
    #[serde(default = "default_max_themes")]
    pub max_themes: usize,

    /// Trend category queried for context
    #[serde(default = "default_trend_category")]
    pub trend_category: String,

    #[serde(default = "default_trend_limit")]
    pub trend_limit: usize,

    /// Report directory; `None` disables reports
    #[serde(default = "default_output_dir")]
    pub output_dir: Option<PathBuf>,

    /// Base for a relative tagger model path; the working directory when unset
    #[serde(default)]
    pub root_dir: Option<PathBuf>,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            max_themes: default_max_themes(),
            trend_category: default_trend_category(),
            trend_limit: default_trend_limit(),
            output_dir: default_output_dir(),
            root_dir: None,
        }
    }
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

fn default_output_dir() -> Option<PathBuf> {
    Some(PathBuf::from("output"))
}

/// Successful generation result
#[derive(Debug, Clone, Serialize)]
pub struct GenerationOutcome {
    pub themes: Vec<ThemeCandidate>,
    /// Report path, absent when no report was written
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    pub requested: usize,
    pub returned: usize,
    /// Whether truncated model output had to be repaired
    pub repaired: bool,
}

/// Orchestrates one theme generation request
pub struct ThemeGenerationCoordinator {
    config: CoordinatorConfig,
    runner: Option<Arc<dyn ModelRunner>>,
    extractor: Option<ResponseExtractor>,
    enhancer: Option<TagEnhancer>,
    classifier: TagClassifier,
    templates: TemplateLibrary,
    trends: Option<Arc<dyn TrendSource>>,
    preferences: Option<Arc<dyn PreferenceSource>>,
    reports: Option<ReportWriter>,
}

impl ThemeGenerationCoordinator {
    /// Create a rule-based coordinator
    pub fn new(config: CoordinatorConfig) -> Result<Self> {
        let reports = config.output_dir.clone().map(ReportWriter::new);
        Ok(Self {
            config,
            runner: None,
            extractor: None,
            enhancer: None,
            classifier: TagClassifier::with_default_rules()?,
            templates: TemplateLibrary::new(),
            trends: None,
            preferences: None,
            reports,
        })
    }

    /// Enable the model-backed path
    pub fn with_runner(mut self, runner: Arc<dyn ModelRunner>) -> Result<Self> {
        self.extractor = Some(ResponseExtractor::new(Arc::clone(&runner)));
        self.enhancer = Some(TagEnhancer::new(Arc::clone(&runner))?);
        self.runner = Some(runner);
        Ok(self)
    }

    pub fn with_trend_source(mut self, trends: Arc<dyn TrendSource>) -> Self {
        self.trends = Some(trends);
        self
    }

    pub fn with_preference_source(mut self, preferences: Arc<dyn PreferenceSource>) -> Self {
        self.preferences = Some(preferences);
        self
    }

    pub fn with_templates(mut self, templates: TemplateLibrary) -> Self {
        self.templates = templates;
        self
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// Generate themes for a request
    pub async fn generate(&self, request: &GenerationRequest) -> Result<GenerationOutcome> {
        let started = Instant::now();
        let options = GenerationOptions::from_request(request, self.config.max_themes);

        let model_path = match (&self.runner, &request.llm) {
            (Some(runner), Some(config)) => Some((runner, config)),
            _ => None,
        };
        let path_label = if model_path.is_some() { "llm" } else { "rule_based" };

        info!(
            path = path_label,
            season = %options.season,
            focus = %options.focus,
            count = options.count,
            "Generating themes"
        );

        let trend_tags = self.trend_tags().await;
        let preferences = self.load_preferences().await;

        let result = match model_path {
            Some((runner, config)) => {
                let result = self
                    .generate_with_model(&options, trend_tags, &preferences, config)
                    .await;
                if config.unload_after_generate && runner.unload_local().await {
                    debug!("Released local model after generation");
                }
                result
            }
            None => {
                let generator = RuleBasedGenerator::new(&self.classifier, &self.templates);
                Ok((generator.generate(&options, &preferences), false))
            }
        };

        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
        metrics::histogram!("themeforge_generation_latency_ms").record(elapsed_ms);

        let (mut themes, repaired) = match result {
            Ok(out) => out,
            Err(e) => {
                metrics::counter!("themeforge_generation_failures_total").increment(1);
                error!(path = path_label, error = %e, "Theme generation failed");
                return Err(e);
            }
        };

        for theme in &mut themes {
            filter_disallowed(theme, &preferences);
        }

        metrics::counter!("themeforge_generations_total", "path" => path_label).increment(1);

        let file_path = match &self.reports {
            Some(writer) => match writer.write(&themes, &options).await {
                Ok(path) => Some(path.display().to_string()),
                Err(e) => {
                    warn!(error = %e, "Failed to write generation report");
                    None
                }
            },
            None => None,
        };

        info!(
            themes = themes.len(),
            requested = options.count,
            elapsed_ms = elapsed_ms as u64,
            "Theme generation complete"
        );

        Ok(GenerationOutcome {
            returned: themes.len(),
            requested: options.count,
            themes,
            file_path,
            repaired,
        })
    }

    async fn generate_with_model(
        &self,
        options: &GenerationOptions,
        trend_tags: Vec<String>,
        preferences: &Preferences,
        config: &InferenceConfig,
    ) -> Result<(Vec<ThemeCandidate>, bool)> {
        let (Some(extractor), Some(enhancer)) = (&self.extractor, &self.enhancer) else {
            return Err(themeforge_core::Error::internal(
                "model path selected without an extractor",
            ));
        };

        let brief = IdeationBrief::new(options.clone(), trend_tags, preferences.clone());
        let extraction = extractor.extract(&brief, options.count, config).await?;
        let repaired = extraction.repaired;
        let raw_keywords: Vec<Vec<String>> = extraction
            .drafts
            .iter()
            .map(|d| d.keywords.clone())
            .collect();

        let (drafts, enhanced) = match self.tagger_path(config) {
            Some(tagger_path) => {
                enhancer
                    .enhance_all(extraction.drafts, &tagger_path, config)
                    .await
            }
            None => {
                let untouched = vec![false; extraction.drafts.len()];
                (extraction.drafts, untouched)
            }
        };

        let themes = drafts
            .into_iter()
            .zip(enhanced)
            .zip(raw_keywords)
            .map(|((draft, enhanced), raw)| self.assemble(draft, raw, enhanced, options))
            .collect();

        Ok((themes, repaired))
    }

    /// Tagger model path when configured and present on disk
    fn tagger_path(&self, config: &InferenceConfig) -> Option<PathBuf> {
        let configured = config
            .secondary_tagger_path
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())?;

        let path = match &self.config.root_dir {
            Some(root) => root.join(configured),
            None => Path::new(configured).to_path_buf(),
        };
        if path.is_file() {
            Some(path)
        } else {
            warn!(path = %path.display(), "Secondary tagger model not found, skipping enhancement");
            None
        }
    }

    fn assemble(
        &self,
        draft: ExtractedThemeDraft,
        raw_keywords: Vec<String>,
        enhanced: bool,
        options: &GenerationOptions,
    ) -> ThemeCandidate {
        let prompt_tags = self.classifier.classify(
            PromptTags::new(),
            ClassifierInput {
                keywords: &draft.keywords,
                mood: &draft.mood,
                focus: &options.focus,
                season: &options.season,
            },
        );

        let mut extra = Map::new();
        extra.insert("enhanced".to_string(), Value::Bool(enhanced));

        ThemeCandidate {
            title: draft.title,
            short_concept: draft.short_concept,
            keywords: draft.keywords,
            mood: draft.mood,
            prompt_tags,
            nsfw_level: options.nsfw_level,
            meta: ThemeMeta {
                season: options.season.clone(),
                platform: options.platform.clone(),
                source: ThemeSource::Llm,
                raw_keywords,
                extra,
            },
        }
    }

    async fn trend_tags(&self) -> Vec<String> {
        let Some(trends) = &self.trends else {
            return Vec::new();
        };

        match trends
            .trending_tags(&self.config.trend_category, self.config.trend_limit)
            .await
        {
            Ok(tags) => tags,
            Err(e) => {
                warn!(error = %e, "Trend source failed, continuing without trending tags");
                Vec::new()
            }
        }
    }

    async fn load_preferences(&self) -> Preferences {
        let Some(source) = &self.preferences else {
            return Preferences::default();
        };

        match source.theme_preferences().await {
            Ok(prefs) => prefs,
            Err(e) => {
                warn!(error = %e, "Preference source failed, using built-in preferences");
                Preferences::default()
            }
        }
    }
}

/// Remove disallowed tags from the prompt tags and keyword lists
fn filter_disallowed(theme: &mut ThemeCandidate, preferences: &Preferences) {
    if preferences.disallowed_tags.is_empty() {
        return;
    }
    theme.prompt_tags.retain(|tag| !preferences.is_disallowed(tag));
    theme.keywords.retain(|tag| !preferences.is_disallowed(tag));
    theme.mood.retain(|tag| !preferences.is_disallowed(tag));
}
