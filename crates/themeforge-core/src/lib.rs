//! Themeforge Core
//!
//! Types and errors shared across the Themeforge crates.
//!
//! This crate provides:
//! - The error taxonomy used by every pipeline stage
//! - Theme drafts, classified theme candidates and their prompt tags
//! - Generation requests, normalized options and provider configuration

pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use types::{
    ExtractedThemeDraft, GenerationOptions, GenerationRequest, InferenceConfig, NsfwLevel,
    PromptTags, ThemeCandidate, ThemeMeta, ThemeSource, CATEGORY_ORDER, CLASSIFIED_CATEGORIES,
};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::types::{
        ExtractedThemeDraft, GenerationOptions, InferenceConfig, PromptTags, ThemeCandidate,
    };
}
