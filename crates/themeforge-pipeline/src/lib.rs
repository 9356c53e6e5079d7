//! Themeforge Pipeline
//!
//! Turns a generation request into classified illustration themes.
//!
//! Stages run in a fixed order:
//! 1. Context gathering (trending tags, stored preferences)
//! 2. Two-call extraction: free ideation, then strict JSON conversion
//! 3. Optional tag enhancement through a secondary tagger model
//! 4. Rule-based tag classification into prompt categories
//!
//! Without a model runner, or without an inference config in the request,
//! themes come from the deterministic rule-based generator instead.

pub mod classifier;
pub mod context;
pub mod coordinator;
pub mod dispatcher;
pub mod enhancer;
pub mod extractor;
pub mod repair;
pub mod report;
pub mod rules;
pub mod templates;

pub use classifier::{ClassifierInput, TagClassifier};
pub use context::{
    PreferenceSource, Preferences, StaticPreferenceSource, StaticTrendSource, TrendSource,
};
pub use coordinator::{CoordinatorConfig, GenerationOutcome, ThemeGenerationCoordinator};
pub use dispatcher::{
    AgentRequest, AgentResponse, ArtworkMeta, CaptionRequest, CaptionWriter, RequestDispatcher,
    RequestKind,
};
pub use enhancer::TagEnhancer;
pub use extractor::{Extraction, IdeationBrief, ResponseExtractor};
pub use report::ReportWriter;
pub use rules::RuleBasedGenerator;
pub use templates::TemplateLibrary;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::coordinator::{CoordinatorConfig, GenerationOutcome, ThemeGenerationCoordinator};
    pub use crate::dispatcher::{AgentRequest, AgentResponse, RequestDispatcher};
    pub use crate::context::{PreferenceSource, TrendSource};
}
