//! Keyword to category classification
//!
//! Deterministic, priority-ordered substring rules. A keyword goes to the
//! first category with a matching substring (case-insensitive); keywords no
//! rule matches go to `object`.

use aho_corasick::AhoCorasick;
use themeforge_core::{Error, PromptTags, Result, CLASSIFIED_CATEGORIES};

/// Category for keywords no rule matches
pub const FALLBACK_CATEGORY: &str = "object";

/// Built-in rules in priority order
const DEFAULT_RULES: &[(&str, &[&str])] = &[
    ("clothing", &["bikini", "swimsuit", "uniform", "dress", "shirt", "skirt"]),
    (
        "setting",
        &["beach", "street", "room", "stage", "sky", "view", "indoor", "outdoor"],
    ),
    ("expression", &["smile", "blush", "sad", "angry", "look"]),
    ("action", &["sitting", "standing", "running", "lying"]),
    (
        "artistic",
        &["masterpiece", "best quality", "best_quality", "absurdres"],
    ),
];

/// One category with its substring matcher
struct CategoryRule {
    category: String,
    matcher: AhoCorasick,
}

/// Input to one classification
#[derive(Debug, Clone, Copy)]
pub struct ClassifierInput<'a> {
    pub keywords: &'a [String],
    pub mood: &'a [String],
    pub focus: &'a str,
    pub season: &'a str,
}

/// Rule-based tag classifier
pub struct TagClassifier {
    rules: Vec<CategoryRule>,
}

impl TagClassifier {
    /// Build a classifier from `(category, substrings)` rules in priority order
    pub fn new<C, P, S>(rules: impl IntoIterator<Item = (C, P)>) -> Result<Self>
    where
        C: Into<String>,
        P: IntoIterator<Item = S>,
        S: AsRef<[u8]>,
    {
        let rules = rules
            .into_iter()
            .map(|(category, patterns)| -> Result<CategoryRule> {
                let category = category.into();
                let matcher = AhoCorasick::builder()
                    .ascii_case_insensitive(true)
                    .build(patterns)
                    .map_err(|e| {
                        Error::internal(format!(
                            "Failed to build matcher for '{}': {}",
                            category, e
                        ))
                    })?;
                Ok(CategoryRule { category, matcher })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { rules })
    }

    /// Classifier with the built-in rule table
    pub fn with_default_rules() -> Result<Self> {
        Self::new(DEFAULT_RULES.iter().map(|(c, p)| (*c, p.iter().copied())))
    }

    /// Category a single keyword belongs to
    pub fn category_of(&self, keyword: &str) -> &str {
        self.rules
            .iter()
            .find(|rule| rule.matcher.is_match(keyword))
            .map(|rule| rule.category.as_str())
            .unwrap_or(FALLBACK_CATEGORY)
    }

    /// Classify onto `base`
    ///
    /// Order of insertion: focus into clothing, base tags, keywords by rule,
    /// mood list into mood, season into setting (unless `any` or empty).
    /// Every category is deduplicated keeping the first occurrence.
    pub fn classify(&self, base: PromptTags, input: ClassifierInput<'_>) -> PromptTags {
        let mut tags = PromptTags::with_categories(CLASSIFIED_CATEGORIES);

        let focus = input.focus.trim();
        if !focus.is_empty() {
            tags.push("clothing", focus);
        }

        for (category, base_tags) in base.iter() {
            tags.extend(category, base_tags.iter().cloned());
        }

        for keyword in input.keywords {
            let keyword = keyword.trim();
            if keyword.is_empty() {
                continue;
            }
            tags.push(self.category_of(keyword), keyword);
        }

        tags.extend(
            "mood",
            input.mood.iter().map(|m| m.trim()).filter(|m| !m.is_empty()),
        );

        let season = input.season.trim();
        if !season.is_empty() && !season.eq_ignore_ascii_case("any") {
            tags.push("setting", season);
        }

        tags.dedup();
        tags
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_reference_classification() {
        let classifier = TagClassifier::with_default_rules().unwrap();
        let keywords = strings(&["bikini", "beach", "smile", "masterpiece", "random_object"]);
        let tags = classifier.classify(
            PromptTags::new(),
            ClassifierInput {
                keywords: &keywords,
                mood: &[],
                focus: "",
                season: "any",
            },
        );

        assert_eq!(tags.get("clothing"), ["bikini"]);
        assert_eq!(tags.get("setting"), ["beach"]);
        assert_eq!(tags.get("expression"), ["smile"]);
        assert_eq!(tags.get("artistic"), ["masterpiece"]);
        assert_eq!(tags.get("object"), ["random_object"]);
        assert!(tags.get("action").is_empty());
    }

    #[test]
    fn test_priority_and_case_insensitivity() {
        let classifier = TagClassifier::with_default_rules().unwrap();
        assert_eq!(classifier.category_of("BEACH_dress"), "clothing");
        assert_eq!(classifier.category_of("Looking_Back"), "expression");
        assert_eq!(classifier.category_of("night sky view"), "setting");
        assert_eq!(classifier.category_of("Best Quality"), "artistic");
        assert_eq!(classifier.category_of("lantern"), "object");
    }

    #[test]
    fn test_focus_season_and_mood_seeding() {
        let classifier = TagClassifier::with_default_rules().unwrap();
        let keywords = strings(&["frilled_bikini", "beach", "beach"]);
        let mood = strings(&["bright", "sunny"]);
        let base = PromptTags::from([("mood", &["bright"][..])]);

        let tags = classifier.classify(
            base,
            ClassifierInput {
                keywords: &keywords,
                mood: &mood,
                focus: "frilled_bikini",
                season: "summer",
            },
        );

        assert_eq!(tags.get("clothing"), ["frilled_bikini"]);
        assert_eq!(tags.get("setting"), ["beach", "summer"]);
        assert_eq!(tags.get("mood"), ["bright", "sunny"]);
    }

    #[test]
    fn test_focus_precedes_template_clothing() {
        let classifier = TagClassifier::with_default_rules().unwrap();
        let base = PromptTags::from([("clothing", &["swimsuit", "bikini"][..])]);

        let tags = classifier.classify(
            base,
            ClassifierInput {
                keywords: &strings(&["frilled_bikini"]),
                mood: &[],
                focus: "frilled_bikini",
                season: "any",
            },
        );

        assert_eq!(tags.get("clothing"), ["frilled_bikini", "swimsuit", "bikini"]);
    }

    #[test]
    fn test_empty_focus_and_sentinel_season_skipped() {
        let classifier = TagClassifier::with_default_rules().unwrap();
        let tags = classifier.classify(
            PromptTags::new(),
            ClassifierInput {
                keywords: &[],
                mood: &[],
                focus: "  ",
                season: "ANY",
            },
        );

        assert!(tags.is_empty());
        for category in CLASSIFIED_CATEGORIES {
            assert!(tags.iter().any(|(c, _)| c == category));
        }
    }

    #[test]
    fn test_classification_is_stable() {
        let classifier = TagClassifier::with_default_rules().unwrap();
        let keywords = strings(&["twintails", "classroom", "sitting", "blush"]);
        let input = ClassifierInput {
            keywords: &keywords,
            mood: &[],
            focus: "school_uniform",
            season: "spring",
        };

        let first = classifier.classify(PromptTags::new(), input);
        let second = classifier.classify(PromptTags::new(), input);
        assert_eq!(first, second);
        assert_eq!(first.get("setting"), ["classroom", "spring"]);
    }

    #[test]
    fn test_custom_rules() {
        let classifier =
            TagClassifier::new([("character", vec!["girl", "boy"]), ("setting", vec!["park"])])
                .unwrap();
        assert_eq!(classifier.category_of("1girl"), "character");
        assert_eq!(classifier.category_of("beach"), FALLBACK_CATEGORY);
    }
}
