//! Parsing and repair of model JSON output
//!
//! Extraction output is expected to be a JSON array of theme objects, but
//! models wrap it in code fences, prepend prose, or stop mid-object when they
//! run out of tokens. Parsing therefore:
//!
//! 1. strips a code fence that encloses the array,
//! 2. walks the top-level bracketed candidates and takes the first one that
//!    parses and holds at least one object,
//! 3. failing that, performs exactly one repair on the first candidate with
//!    complete objects: cut after the last one and close the array.

use serde_json::{Map, Value};
use themeforge_core::{Error, ExtractedThemeDraft, Result};

/// Title used when a theme object has no usable title
pub const UNTITLED: &str = "Untitled";

/// Remove a ```lang ... ``` fence around the array, if present
///
/// A fence appearing only after the first `[` does not enclose it and is left
/// for the array scan to ignore.
pub fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(open) = trimmed.find("```") else {
        return trimmed;
    };
    if trimmed.find('[').is_some_and(|bracket| bracket < open) {
        return trimmed;
    }

    let after = &trimmed[open + 3..];
    let body = match after.find('\n') {
        // Fence line carries a language tag such as `json`
        Some(nl) if !after[..nl].contains(['[', '{']) => &after[nl + 1..],
        _ => after,
    };

    match body.find("```") {
        Some(close) => body[..close].trim(),
        None => body.trim(),
    }
}

/// Outcome of bracket scanning over a fragment starting at `[`
#[derive(Debug, Default, PartialEq, Eq)]
struct Scan {
    /// Byte offset just past the matching `]`
    close: Option<usize>,
    /// Byte offset just past the last `}` closing a top-level element
    last_object_end: Option<usize>,
}

fn scan_array(fragment: &str) -> Scan {
    let mut scan = Scan::default();
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, b) in fragment.bytes().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }

        match b {
            b'"' => in_string = true,
            b'[' | b'{' => depth += 1,
            b']' | b'}' => {
                depth = depth.saturating_sub(1);
                if b == b'}' && depth == 1 {
                    scan.last_object_end = Some(i + 1);
                }
                if depth == 0 {
                    scan.close = Some(i + 1);
                    return scan;
                }
            }
            _ => {}
        }
    }

    scan
}

/// Parse the first JSON array of objects in `raw`, repairing a truncated tail
/// once
///
/// Bracketed prose such as `[draft]` or `[2]` ahead of the real array is
/// skipped. Returns the array elements and whether the repair was needed.
pub fn parse_array(raw: &str) -> Result<(Vec<Value>, bool)> {
    let body = strip_code_fences(raw);
    let mut offset = 0;
    let mut first_error: Option<String> = None;
    let mut repairable: Option<&str> = None;
    let mut without_objects: Option<Vec<Value>> = None;

    while let Some(pos) = body[offset..].find('[') {
        let fragment = &body[offset + pos..];
        let scan = scan_array(fragment);

        let Some(end) = scan.close else {
            // Runs to the end of the text, so it is the last candidate
            first_error.get_or_insert_with(|| "unterminated JSON array".to_string());
            if repairable.is_none() {
                repairable = scan.last_object_end.map(|cut| &fragment[..cut]);
            }
            break;
        };

        match serde_json::from_str::<Vec<Value>>(&fragment[..end]) {
            Ok(values) if values.iter().any(Value::is_object) => return Ok((values, false)),
            Ok(values) => {
                without_objects.get_or_insert(values);
            }
            Err(e) => {
                first_error.get_or_insert_with(|| e.to_string());
                if repairable.is_none() {
                    repairable = scan.last_object_end.map(|cut| &fragment[..cut]);
                }
            }
        }
        offset += pos + end;
    }

    if let Some(prefix) = repairable {
        let repaired = format!("{}]", prefix);
        match serde_json::from_str::<Vec<Value>>(&repaired) {
            Ok(values) => return Ok((values, true)),
            Err(e) => {
                let cause = first_error.unwrap_or_default();
                first_error = Some(format!("{}; repair failed: {}", cause, e));
            }
        }
    }

    if let Some(values) = without_objects {
        return Ok((values, false));
    }

    Err(Error::parse(
        first_error.unwrap_or_else(|| "no JSON array found in model output".to_string()),
        raw,
    ))
}

/// Turn raw array elements into drafts, keeping at most `count`
///
/// Non-object elements are skipped.
pub fn normalize_drafts(values: Vec<Value>, count: usize) -> Vec<ExtractedThemeDraft> {
    values
        .into_iter()
        .filter_map(|value| match value {
            Value::Object(obj) => Some(normalize_object(&obj)),
            _ => None,
        })
        .take(count)
        .collect()
}

fn normalize_object(obj: &Map<String, Value>) -> ExtractedThemeDraft {
    let title = match obj.get("title") {
        Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
        _ => UNTITLED.to_string(),
    };

    let short_concept = match obj.get("short_concept") {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        _ => String::new(),
    };

    ExtractedThemeDraft {
        title,
        short_concept,
        keywords: coerce_string_list(obj.get("keywords")),
        mood: coerce_string_list(obj.get("mood")),
    }
}

/// Coerce a JSON value into a list of strings
///
/// Arrays keep their elements (nulls and blanks dropped, non-strings
/// stringified); a bare string or other scalar becomes a one-element list;
/// null or absent becomes empty.
pub fn coerce_string_list(value: Option<&Value>) -> Vec<String> {
    match value {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items.iter().filter_map(scalar_to_string).collect(),
        Some(other) => scalar_to_string(other).into_iter().collect(),
    }
}

fn scalar_to_string(value: &Value) -> Option<String> {
    let text = match value {
        Value::Null => return None,
        Value::String(s) => s.trim().to_string(),
        other => other.to_string(),
    };
    (!text.is_empty()).then_some(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_strip_fences_with_language_tag() {
        let raw = "```json\n[{\"title\":\"A\"}]\n```";
        assert_eq!(strip_code_fences(raw), "[{\"title\":\"A\"}]");

        let raw = "Here you go:\n```\n[1]\n```\nEnjoy!";
        assert_eq!(strip_code_fences(raw), "[1]");

        assert_eq!(strip_code_fences("  [1]  "), "[1]");
    }

    #[test]
    fn test_array_located_after_prose() {
        let raw = "Sure! Here are the themes: [{\"title\":\"A\"}] Hope this helps [really]";
        let (values, repaired) = parse_array(raw).unwrap();
        assert_eq!(values.len(), 1);
        assert!(!repaired);
    }

    #[test]
    fn test_fence_after_the_array_is_ignored() {
        let raw = "[{\"title\":\"A\"}]\n```";
        assert_eq!(strip_code_fences(raw), raw);

        let (values, repaired) = parse_array(raw).unwrap();
        assert_eq!(values.len(), 1);
        assert!(!repaired);
    }

    #[test]
    fn test_malformed_bracketed_prose_is_skipped() {
        let raw = "Themes [draft]:\n[{\"title\":\"A\",\"keywords\":[\"beach\"]}]";
        let (values, repaired) = parse_array(raw).unwrap();
        assert!(!repaired);
        assert_eq!(values[0]["title"], "A");
    }

    #[test]
    fn test_leading_array_without_objects_is_skipped() {
        let raw = "Here are [2] themes: [{\"title\":\"A\"},{\"title\":\"B\"}]";
        let (values, _) = parse_array(raw).unwrap();
        let drafts = normalize_drafts(values, 5);
        assert_eq!(drafts.len(), 2);
        assert_eq!(drafts[1].title, "B");
    }

    #[test]
    fn test_truncation_repair_after_bracketed_prose() {
        let raw = r#"Themes [draft]: [{"title":"A","keywords":["x"]},{"title":"B""#;
        let (values, repaired) = parse_array(raw).unwrap();
        assert!(repaired);
        assert_eq!(values.len(), 1);
        assert_eq!(values[0]["keywords"][0], "x");
    }

    #[test]
    fn test_array_of_scalars_only_is_returned_as_is() {
        let (values, repaired) = parse_array("[1, 2]").unwrap();
        assert_eq!(values.len(), 2);
        assert!(!repaired);
        assert!(normalize_drafts(values, 5).is_empty());
    }

    #[test]
    fn test_brackets_inside_strings_are_ignored() {
        let raw = r#"[{"title":"A ] tricky \" title [","keywords":["x"]}]"#;
        let (values, _) = parse_array(raw).unwrap();
        assert_eq!(values[0]["title"], "A ] tricky \" title [");
    }

    #[test]
    fn test_truncated_tail_recovers_complete_objects() {
        let raw = r#"[{"title":"A","short_concept":"x","keywords":[],"mood":[]},{"title":"B""#;
        let (values, repaired) = parse_array(raw).unwrap();
        assert!(repaired);
        let drafts = normalize_drafts(values, 5);
        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].title, "A");
    }

    #[test]
    fn test_trailing_comma_repaired() {
        let raw = r#"[{"title":"A"},{"title":"B"},]"#;
        let (values, repaired) = parse_array(raw).unwrap();
        assert!(repaired);
        assert_eq!(values.len(), 2);
    }

    #[test]
    fn test_unrepairable_output_is_parse_error_with_raw() {
        let raw = r#"[{"title":"A""#;
        match parse_array(raw) {
            Err(Error::Parse { raw: kept, .. }) => assert_eq!(kept, raw),
            other => panic!("Expected Parse error, got {:?}", other),
        }

        assert!(matches!(
            parse_array("I could not think of anything."),
            Err(Error::Parse { .. })
        ));
    }

    #[test]
    fn test_normalization_rules() {
        let values = vec![
            json!("not an object"),
            json!({
                "title": "  ",
                "keywords": ["beach", null, 3, "  "],
                "mood": "calm"
            }),
            json!({"title": 42, "short_concept": "x", "keywords": null, "mood": 7}),
        ];

        let drafts = normalize_drafts(values, 10);
        assert_eq!(drafts.len(), 2);

        assert_eq!(drafts[0].title, UNTITLED);
        assert_eq!(drafts[0].short_concept, "");
        assert_eq!(drafts[0].keywords, ["beach", "3"]);
        assert_eq!(drafts[0].mood, ["calm"]);

        assert_eq!(drafts[1].title, UNTITLED);
        assert!(drafts[1].keywords.is_empty());
        assert_eq!(drafts[1].mood, ["7"]);
    }

    #[test]
    fn test_normalization_truncates_to_count() {
        let values = (0..5).map(|i| json!({"title": format!("T{}", i)})).collect();
        let drafts = normalize_drafts(values, 2);
        assert_eq!(drafts.len(), 2);
        assert_eq!(drafts[1].title, "T1");
    }
}
