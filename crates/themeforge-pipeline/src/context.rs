//! Generation context sources: trending tags and user preferences
//!
//! Both are capabilities handed to the coordinator at construction. The
//! static implementations carry built-in pools and never touch the network.

use async_trait::async_trait;
use chrono::Datelike;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use themeforge_core::{NsfwLevel, Result};

/// Source of currently popular tags
#[async_trait]
pub trait TrendSource: Send + Sync {
    /// Up to `limit` distinct tags for a category
    async fn trending_tags(&self, category: &str, limit: usize) -> Result<Vec<String>>;
}

/// Source of theme preferences
#[async_trait]
pub trait PreferenceSource: Send + Sync {
    async fn theme_preferences(&self) -> Result<Preferences>;
}

/// Theme preferences
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preferences {
    #[serde(default)]
    pub default_style: String,

    #[serde(default)]
    pub allowed_nsfw_level: NsfwLevel,

    /// Motifs worth suggesting to the model
    #[serde(default)]
    pub favorite_motifs: Vec<String>,

    /// Tags removed from every generated theme
    #[serde(default, alias = "ng_tags")]
    pub disallowed_tags: Vec<String>,

    /// Focus value to base template name
    #[serde(default)]
    pub focus_template_map: BTreeMap<String, String>,
}

impl Default for Preferences {
    fn default() -> Self {
        let to_strings =
            |items: &[&str]| -> Vec<String> { items.iter().map(|s| s.to_string()).collect() };

        Self {
            default_style: "anime_girl".to_string(),
            allowed_nsfw_level: NsfwLevel::Sfw,
            favorite_motifs: to_strings(&[
                "frilled_bikini",
                "school_uniform",
                "thighhighs",
                "bare_legs",
                "side_ponytail",
                "twin_tails",
                "idol_costume",
            ]),
            disallowed_tags: to_strings(&["gore", "violence", "blood", "guts", "extreme_guro"]),
            focus_template_map: [
                ("bikini", "swimsuit"),
                ("swimsuit", "swimsuit"),
                ("frilled_bikini", "swimsuit"),
                ("school_uniform", "school_uniform"),
                ("idol", "idol_stage"),
                ("idol_costume", "idol_stage"),
                ("room_morning", "room_morning"),
            ]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
        }
    }
}

impl Preferences {
    /// Template mapped to a focus value, matched case-insensitively
    pub fn template_for_focus(&self, focus: &str) -> Option<&str> {
        let focus = focus.trim().to_lowercase();
        self.focus_template_map.get(&focus).map(String::as_str)
    }

    /// Whether a tag is on the disallowed list
    pub fn is_disallowed(&self, tag: &str) -> bool {
        self.disallowed_tags
            .iter()
            .any(|t| t.eq_ignore_ascii_case(tag.trim()))
    }
}

/// Preference source returning a fixed set of preferences
#[derive(Debug, Clone, Default)]
pub struct StaticPreferenceSource {
    preferences: Preferences,
}

impl StaticPreferenceSource {
    pub fn new(preferences: Preferences) -> Self {
        Self { preferences }
    }
}

#[async_trait]
impl PreferenceSource for StaticPreferenceSource {
    async fn theme_preferences(&self) -> Result<Preferences> {
        Ok(self.preferences.clone())
    }
}

/// Season name for a calendar month (1-12)
pub fn season_for_month(month: u32) -> &'static str {
    match month {
        12 | 1 | 2 => "winter",
        3..=5 => "spring",
        6..=8 => "summer",
        _ => "autumn",
    }
}

const ANIME_BASE: &[&str] = &[
    "twintails", "side_ponytail", "long_hair", "short_hair", "ahoge", "hair_ribbon",
    "hairband", "cat_ears", "animal_ears", "school_uniform", "sailor_uniform", "serafuku",
    "hoodie", "jacket", "idol_costume", "onepiece", "thighhighs", "knee_socks", "bare_legs",
    "smile", "blush", "sidelong_glance", "looking_at_viewer", "waving", "peace_sign",
    "winking", "street", "school_hallway", "classroom", "bedroom", "rooftop", "stage",
    "city_lights", "soft_lighting", "backlighting", "bokeh", "lens_flare", "sparkles",
];

const ANIME_SUMMER: &[&str] = &[
    "frilled_bikini", "bikini", "swimsuit", "school_swimsuit", "sarong", "sunhat",
    "sunglasses", "beach", "sea", "waves", "sand", "sunset", "blue_sky", "water_drops",
    "ice_cream", "ramune", "festival", "yukata", "fireworks",
];

const ANIME_SPRING: &[&str] = &[
    "sakura", "cherry_blossoms", "flower_petals", "park", "spring_dress", "cardigan",
    "light_scarf", "breeze", "soft_colors",
];

const ANIME_AUTUMN: &[&str] = &[
    "fallen_leaves", "autumn_leaves", "coat", "scarf", "beret", "coffee", "cafe",
    "sunset_street", "warm_colors",
];

const ANIME_WINTER: &[&str] = &[
    "coat", "scarf", "mittens", "boots", "turtleneck", "snow", "snowflakes", "winter_city",
    "breath_visible", "warm_drink",
];

/// Trend source backed by built-in tag pools
///
/// Combines the category's base pool with the pool of the current season
/// (inferred from the local month), removes duplicates and shuffles.
#[derive(Debug, Clone, Default)]
pub struct StaticTrendSource {
    /// Fixed month (1-12) instead of the clock
    month: Option<u32>,
}

impl StaticTrendSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pin the month used to pick the seasonal pool
    pub fn with_month(mut self, month: u32) -> Self {
        self.month = Some(month);
        self
    }

    fn pools(category: &str, season: &str) -> (&'static [&'static str], &'static [&'static str]) {
        match category {
            "anime" => {
                let seasonal = match season {
                    "summer" => ANIME_SUMMER,
                    "spring" => ANIME_SPRING,
                    "autumn" => ANIME_AUTUMN,
                    _ => ANIME_WINTER,
                };
                (ANIME_BASE, seasonal)
            }
            _ => (&[], &[]),
        }
    }

    /// Deduplicated, unshuffled candidate pool
    pub fn candidates(&self, category: &str) -> Vec<String> {
        let month = self.month.unwrap_or_else(|| chrono::Local::now().month());
        let (base, seasonal) = Self::pools(&category.to_lowercase(), season_for_month(month));

        let mut seen = HashSet::new();
        base.iter()
            .chain(seasonal.iter())
            .filter(|t| seen.insert(**t))
            .map(|t| t.to_string())
            .collect()
    }
}

#[async_trait]
impl TrendSource for StaticTrendSource {
    async fn trending_tags(&self, category: &str, limit: usize) -> Result<Vec<String>> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let mut tags = self.candidates(category);
        tags.shuffle(&mut rand::thread_rng());
        tags.truncate(limit);
        Ok(tags)
    }
}
