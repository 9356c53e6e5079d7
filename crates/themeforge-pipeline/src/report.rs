//! Plain-text generation reports
//!
//! One file per successful generation, named `themes_YYYYMMDD_HHMMSS.txt`,
//! listing each theme with its categorized tags and a copy-paste tag line.

use chrono::{DateTime, Local};
use std::path::{Path, PathBuf};
use themeforge_core::{GenerationOptions, Result, ThemeCandidate};
use tracing::info;

const RULE_WIDE: usize = 50;
const RULE_NARROW: usize = 20;

/// Writes generation reports into a directory
#[derive(Debug, Clone)]
pub struct ReportWriter {
    output_dir: PathBuf,
}

impl ReportWriter {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Render the report body
    pub fn render(
        themes: &[ThemeCandidate],
        options: &GenerationOptions,
        now: DateTime<Local>,
    ) -> String {
        let wide = "=".repeat(RULE_WIDE);
        let narrow = "-".repeat(RULE_NARROW);

        let mut lines = vec![
            "=== Theme Generation Report ===".to_string(),
            format!("Time: {}", now.format("%Y-%m-%d %H:%M:%S")),
            format!(
                "Request Options: season={}, focus={}, platform={}, count={}, nsfw_level={}",
                options.season, options.focus, options.platform, options.count, options.nsfw_level
            ),
            format!("{}\n", wide),
        ];

        for (i, theme) in themes.iter().enumerate() {
            lines.push(format!("Theme #{}: {}", i + 1, theme.title));
            lines.push(format!("Concept: {}", theme.short_concept));
            lines.push(narrow.clone());
            lines.push("[Calculated Tags]:".to_string());
            for (category, tags) in theme.prompt_tags.ordered() {
                lines.push(format!("  {}: {}", capitalize(category), tags.join(", ")));
            }
            lines.push(narrow.clone());
            lines.push("[Copy Paste String]:".to_string());
            lines.push(theme.prompt_tags.flatten().join(", "));
            lines.push(format!("\n{}\n", wide));
        }

        lines.join("\n")
    }

    /// Write a report for `themes`, returning the file path
    pub async fn write(
        &self,
        themes: &[ThemeCandidate],
        options: &GenerationOptions,
    ) -> Result<PathBuf> {
        tokio::fs::create_dir_all(&self.output_dir).await?;

        let now = Local::now();
        let stem = format!("themes_{}", now.format("%Y%m%d_%H%M%S"));
        let mut path = self.output_dir.join(format!("{}.txt", stem));
        let mut suffix = 1;
        while tokio::fs::try_exists(&path).await? {
            path = self.output_dir.join(format!("{}_{}.txt", stem, suffix));
            suffix += 1;
        }

        tokio::fs::write(&path, Self::render(themes, options, now)).await?;
        info!(path = %path.display(), themes = themes.len(), "Report written");
        Ok(path)
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
