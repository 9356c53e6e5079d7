//! Base prompt-tag templates
//!
//! Each template is a categorized starting point that focus, season and
//! keywords are layered onto. Lookups hand out owned copies.

use std::collections::HashMap;
use themeforge_core::PromptTags;

/// Name of the fallback template
pub const DEFAULT_TEMPLATE: &str = "default";

/// Library of named base templates
#[derive(Debug, Clone)]
pub struct TemplateLibrary {
    templates: HashMap<String, PromptTags>,
}

impl Default for TemplateLibrary {
    fn default() -> Self {
        let mut library = Self {
            templates: HashMap::new(),
        };
        library.register_builtin();
        library
    }
}

impl TemplateLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Owned copy of a template; unknown names fall back to `default`
    pub fn get(&self, name: &str) -> PromptTags {
        let name = name.trim().to_lowercase();
        self.templates
            .get(&name)
            .or_else(|| self.templates.get(DEFAULT_TEMPLATE))
            .cloned()
            .unwrap_or_default()
    }

    /// Add or replace a template
    pub fn register(&mut self, name: impl Into<String>, tags: PromptTags) {
        self.templates.insert(name.into().to_lowercase(), tags);
    }

    /// Registered template names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.templates.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    fn register_builtin(&mut self) {
        self.register(
            DEFAULT_TEMPLATE,
            PromptTags::from([
                ("clothing", &[][..]),
                ("mood", &["cute", "soft"][..]),
                ("setting", &[][..]),
                ("expression", &["smile", "blush"][..]),
                ("action", &["looking_at_viewer"][..]),
                (
                    "artistic",
                    &[
                        "masterpiece",
                        "best_quality",
                        "high_resolution",
                        "detailed_eyes",
                        "soft_lighting",
                    ][..],
                ),
                ("object", &[][..]),
            ]),
        );

        self.register(
            "swimsuit",
            PromptTags::from([
                ("clothing", &["swimsuit", "bikini"][..]),
                ("mood", &["bright", "relaxed", "summer"][..]),
                ("setting", &["beach", "sea", "blue_sky"][..]),
                ("expression", &["smile", "blush"][..]),
                ("action", &["standing", "looking_at_viewer"][..]),
                (
                    "artistic",
                    &[
                        "masterpiece",
                        "best_quality",
                        "high_resolution",
                        "detailed_water",
                        "sunlight",
                        "backlighting",
                    ][..],
                ),
                ("object", &["waves", "sand"][..]),
            ]),
        );

        self.register(
            "school_uniform",
            PromptTags::from([
                ("clothing", &["school_uniform", "pleated_skirt", "blazer"][..]),
                ("mood", &["daily_life", "youthful", "soft"][..]),
                ("setting", &["school_hallway", "classroom"][..]),
                ("expression", &["smile", "blush"][..]),
                ("action", &["walking", "looking_at_viewer"][..]),
                (
                    "artistic",
                    &["masterpiece", "best_quality", "high_resolution", "soft_lighting"][..],
                ),
                ("object", &["school_bag", "windows"][..]),
            ]),
        );

        self.register(
            "idol_stage",
            PromptTags::from([
                ("clothing", &["idol_costume", "frills", "ribbons"][..]),
                ("mood", &["energetic", "sparkling", "stage_performance"][..]),
                ("setting", &["stage", "spotlight", "audience_in_background"][..]),
                ("expression", &["smile", "winking"][..]),
                ("action", &["singing", "dancing", "holding_microphone"][..]),
                (
                    "artistic",
                    &[
                        "masterpiece",
                        "best_quality",
                        "high_resolution",
                        "dynamic_lighting",
                        "colorful_lights",
                    ][..],
                ),
                ("object", &["microphone", "stage_lights", "confetti"][..]),
            ]),
        );

        self.register(
            "room_morning",
            PromptTags::from([
                ("clothing", &["casual_outfit", "roomwear"][..]),
                ("mood", &["cozy", "relaxed", "morning"][..]),
                ("setting", &["bedroom", "sunlight_through_window"][..]),
                ("expression", &["sleepy_eyes", "small_smile"][..]),
                ("action", &["stretching", "sitting_on_bed"][..]),
                (
                    "artistic",
                    &["masterpiece", "best_quality", "soft_lighting", "warm_tones"][..],
                ),
                ("object", &["pillow", "blanket", "plush_toy"][..]),
            ]),
        );
    }
}
