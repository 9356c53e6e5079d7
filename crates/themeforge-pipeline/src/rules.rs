//! Deterministic rule-based theme generation
//!
//! Used when no model is available or the request carries no inference
//! config. Themes are combinations of a season's scenes and a fixed pose
//! list, classified onto the template matching the focus.

use serde_json::{Map, Value};
use themeforge_core::{GenerationOptions, PromptTags, ThemeCandidate, ThemeMeta, ThemeSource};

use crate::classifier::{ClassifierInput, TagClassifier};
use crate::context::Preferences;
use crate::templates::{TemplateLibrary, DEFAULT_TEMPLATE};

/// Poses cycled through by rule-based themes
pub const POSES: [&str; 5] = ["standing", "sitting", "looking_at_viewer", "running", "lying"];

/// Scenes and moods for one season
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeasonPreset {
    pub scenes: &'static [&'static str],
    pub moods: &'static [&'static str],
}

/// Preset for a season name; unknown seasons and `any` share the everyday preset
pub fn season_preset(season: &str) -> SeasonPreset {
    match season.trim().to_lowercase().as_str() {
        "summer" => SeasonPreset {
            scenes: &["beach", "seaside_promenade", "poolside", "summer_festival"],
            moods: &["sunny", "bright"],
        },
        "winter" => SeasonPreset {
            scenes: &["snowy_city", "winter_cafe", "illumination_street", "snowy_park"],
            moods: &["cozy", "quiet"],
        },
        "spring" => SeasonPreset {
            scenes: &["cherry_blossom_park", "school_rooftop", "flower_field", "riverside_path"],
            moods: &["fresh", "gentle"],
        },
        "autumn" | "fall" => SeasonPreset {
            scenes: &["autumn_street", "maple_park", "library_room", "harvest_festival"],
            moods: &["warm", "nostalgic"],
        },
        _ => SeasonPreset {
            scenes: &["room", "city_street", "cafe_interior", "classroom"],
            moods: &["daily"],
        },
    }
}

/// Base template for a focus: mapped template, else `swimsuit` in summer, else `default`
pub fn template_for(focus: &str, season: &str, preferences: &Preferences) -> String {
    if let Some(name) = preferences.template_for_focus(focus) {
        return name.to_string();
    }
    if season.eq_ignore_ascii_case("summer") {
        "swimsuit".to_string()
    } else {
        DEFAULT_TEMPLATE.to_string()
    }
}

fn humanize(tag: &str) -> String {
    tag.split(['_', ' '])
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Generates themes from season presets and poses
pub struct RuleBasedGenerator<'a> {
    classifier: &'a TagClassifier,
    templates: &'a TemplateLibrary,
}

impl<'a> RuleBasedGenerator<'a> {
    pub fn new(classifier: &'a TagClassifier, templates: &'a TemplateLibrary) -> Self {
        Self {
            classifier,
            templates,
        }
    }

    /// Generate `options.count` themes
    pub fn generate(
        &self,
        options: &GenerationOptions,
        preferences: &Preferences,
    ) -> Vec<ThemeCandidate> {
        let preset = season_preset(&options.season);
        let template = template_for(&options.focus, &options.season, preferences);
        let moods: Vec<String> = preset.moods.iter().map(|m| m.to_string()).collect();

        (0..options.count)
            .map(|i| {
                let scene = preset.scenes[i % preset.scenes.len()];
                let pose = POSES[(i + i / preset.scenes.len()) % POSES.len()];
                self.build_theme(options, &template, scene, pose, &moods)
            })
            .collect()
    }

    fn build_theme(
        &self,
        options: &GenerationOptions,
        template: &str,
        scene: &str,
        pose: &str,
        moods: &[String],
    ) -> ThemeCandidate {
        let keywords = vec![scene.to_string(), pose.to_string()];
        let prompt_tags: PromptTags = self.classifier.classify(
            self.templates.get(template),
            ClassifierInput {
                keywords: &keywords,
                mood: moods,
                focus: &options.focus,
                season: &options.season,
            },
        );

        let focus = humanize(&options.focus);
        let title = format!("{} - {}, {}", focus, humanize(scene), humanize(pose));
        let short_concept = format!(
            "{} {} at {}, {} mood.",
            focus,
            pose.replace('_', " "),
            scene.replace('_', " "),
            moods.join(" and ")
        );

        let mut extra = Map::new();
        extra.insert("template".to_string(), Value::String(template.to_string()));

        ThemeCandidate {
            title,
            short_concept,
            keywords: keywords.clone(),
            mood: moods.to_vec(),
            prompt_tags,
            nsfw_level: options.nsfw_level,
            meta: ThemeMeta {
                season: options.season.clone(),
                platform: options.platform.clone(),
                source: ThemeSource::RuleBased,
                raw_keywords: keywords,
                extra,
            },
        }
    }
}
