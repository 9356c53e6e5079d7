//! Model file discovery for the model listing endpoint

use serde::{Deserialize, Serialize};
use std::path::Path;
use themeforge_core::{Error, Result};
use tracing::debug;

/// Default extensions considered model files
pub const DEFAULT_MODEL_EXTENSIONS: [&str; 1] = ["gguf"];

/// One selectable local model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelFileInfo {
    /// File stem
    pub id: String,
    pub filename: String,
    /// Path relative to the project root, usable as `llm.local_path`
    pub relative_path: String,
}

/// List model files directly inside `root/models_dir`
///
/// Only files whose extension (case-insensitive) is in `extensions` are
/// returned, sorted by filename case-insensitively. A missing directory
/// yields an empty list.
pub fn discover_models(
    root: impl AsRef<Path>,
    models_dir: impl AsRef<Path>,
    extensions: &[String],
) -> Result<Vec<ModelFileInfo>> {
    let root = root.as_ref();
    let dir = root.join(models_dir.as_ref());

    if !dir.is_dir() {
        debug!(dir = %dir.display(), "Models directory not found");
        return Ok(Vec::new());
    }

    let entries = std::fs::read_dir(&dir)
        .map_err(|e| Error::config(format!("Failed to read models directory: {}", e)))?;

    let mut models = Vec::new();
    for entry in entries {
        let entry = entry
            .map_err(|e| Error::config(format!("Failed to read directory entry: {}", e)))?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }

        let matches = path
            .extension()
            .and_then(|s| s.to_str())
            .map_or(false, |ext| {
                extensions.iter().any(|want| want.eq_ignore_ascii_case(ext))
            });
        if !matches {
            continue;
        }

        let (Some(stem), Some(filename)) = (
            path.file_stem().and_then(|s| s.to_str()),
            path.file_name().and_then(|s| s.to_str()),
        ) else {
            continue;
        };

        let relative = path.strip_prefix(root).unwrap_or(&path);
        models.push(ModelFileInfo {
            id: stem.to_string(),
            filename: filename.to_string(),
            relative_path: relative.to_string_lossy().replace('\\', "/"),
        });
    }

    models.sort_by_key(|m| m.filename.to_lowercase());
    Ok(models)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gguf() -> Vec<String> {
        DEFAULT_MODEL_EXTENSIONS.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_discover_sorts_case_insensitively() {
        let root = tempfile::tempdir().unwrap();
        let models = root.path().join("models");
        std::fs::create_dir(&models).unwrap();
        for name in ["beta.gguf", "Alpha.GGUF", "notes.txt", "gamma.gguf"] {
            std::fs::write(models.join(name), b"").unwrap();
        }
        std::fs::create_dir(models.join("nested.gguf")).unwrap();

        let found = discover_models(root.path(), "models", &gguf()).unwrap();
        let names: Vec<&str> = found.iter().map(|m| m.filename.as_str()).collect();
        assert_eq!(names, ["Alpha.GGUF", "beta.gguf", "gamma.gguf"]);
        assert_eq!(found[1].id, "beta");
        assert_eq!(found[1].relative_path, "models/beta.gguf");
    }

    #[test]
    fn test_missing_directory_is_empty() {
        let root = tempfile::tempdir().unwrap();
        let found = discover_models(root.path(), "does-not-exist", &gguf()).unwrap();
        assert!(found.is_empty());
    }
}
