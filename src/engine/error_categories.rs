//! Error Aggregator.
//!
//! Groups free-text error explanations into labeled categories. Labeling is
//! delegated to an [`ErrorClassifier`] so that nondeterministic classifiers
//! stay outside the grouping logic; grouping, ordering and example capping
//! are deterministic.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::error::EngineError;
use super::session::{ExerciseAttempt, SessionRecord};

pub const FALLBACK_LABEL: &str = "other";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorCategory {
    pub label: String,
    pub count: usize,
    pub examples: Vec<String>,
}

/// Assigns one label per explanation, in input order.
pub trait ErrorClassifier {
    fn label(&self, explanations: &[String]) -> Result<Vec<String>, EngineError>;
}

/// Keyword rules checked in order; the first rule with a matching keyword wins.
/// A keyword matches only at the start of a word, so `conjugat` matches
/// "conjugation" but `stem` does not match "system".
#[derive(Debug, Clone)]
pub struct KeywordClassifier {
    rules: Vec<(String, Vec<String>)>,
}

impl KeywordClassifier {
    pub fn new(rules: Vec<(String, Vec<String>)>) -> Self {
        let rules = rules
            .into_iter()
            .map(|(label, keywords)| {
                let keywords = keywords.into_iter().map(|k| k.to_lowercase()).collect();
                (label, keywords)
            })
            .collect();
        Self { rules }
    }

    fn classify_one(&self, explanation: &str) -> String {
        let text = explanation.to_lowercase();
        self.rules
            .iter()
            .find(|(_, keywords)| keywords.iter().any(|k| starts_word(&text, k)))
            .map(|(label, _)| label.clone())
            .unwrap_or_else(|| FALLBACK_LABEL.to_string())
    }
}

fn starts_word(text: &str, keyword: &str) -> bool {
    text.match_indices(keyword).any(|(at, _)| {
        text[..at]
            .chars()
            .next_back()
            .map_or(true, |before| !before.is_alphanumeric())
    })
}

impl Default for KeywordClassifier {
    fn default() -> Self {
        let rule = |label: &str, keywords: &[&str]| {
            (
                label.to_string(),
                keywords.iter().map(|k| k.to_string()).collect::<Vec<_>>(),
            )
        };
        Self::new(vec![
            rule(
                "particles",
                &[
                    "particle",
                    "postposition",
                    "subject marker",
                    "object marker",
                    "topic marker",
                    "이/가",
                    "은/는",
                    "을/를",
                ],
            ),
            rule(
                "verb conjugation",
                &["conjugat", "tense", "verb ending", "ending", "irregular", "stem"],
            ),
            rule(
                "formality and politeness",
                &[
                    "formal",
                    "informal",
                    "polite",
                    "impolite",
                    "honorific",
                    "speech level",
                    "register",
                ],
            ),
            rule("word order", &["word order", "order of", "placement", "position"]),
            rule("spacing", &["spacing", "space between", "extra space", "missing space"]),
            rule("spelling", &["spelling", "misspell", "typo", "character"]),
            rule(
                "vocabulary choice",
                &["vocabulary", "word choice", "wrong word", "meaning", "synonym"],
            ),
        ])
    }
}

impl ErrorClassifier for KeywordClassifier {
    fn label(&self, explanations: &[String]) -> Result<Vec<String>, EngineError> {
        Ok(explanations.iter().map(|e| self.classify_one(e)).collect())
    }
}

/// Explanations an attempt contributes: its itemized analysis, or the summary
/// when no items were recorded.
pub fn explanations_of(attempt: &ExerciseAttempt) -> Vec<String> {
    let items: Vec<String> = attempt
        .error_analysis
        .iter()
        .map(|item| item.trim())
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect();
    if !items.is_empty() {
        return items;
    }
    attempt
        .error_explanation
        .as_deref()
        .map(str::trim)
        .filter(|summary| !summary.is_empty())
        .map(|summary| vec![summary.to_string()])
        .unwrap_or_default()
}

pub fn aggregate<'a, I>(
    attempts: I,
    classifier: &dyn ErrorClassifier,
    max_examples: usize,
) -> Result<Vec<ErrorCategory>, EngineError>
where
    I: IntoIterator<Item = &'a ExerciseAttempt>,
{
    let explanations: Vec<String> = attempts.into_iter().flat_map(explanations_of).collect();
    if explanations.is_empty() {
        return Ok(Vec::new());
    }

    let labels = classifier.label(&explanations)?;
    if labels.len() != explanations.len() {
        return Err(EngineError::CollaboratorUnavailable(format!(
            "classifier returned {} labels for {} explanations",
            labels.len(),
            explanations.len()
        )));
    }

    let mut categories: Vec<ErrorCategory> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    for (explanation, label) in explanations.into_iter().zip(labels) {
        let label = match label.trim() {
            "" => FALLBACK_LABEL.to_string(),
            trimmed => trimmed.to_string(),
        };
        let slot = *index.entry(label.clone()).or_insert_with(|| {
            categories.push(ErrorCategory {
                label,
                count: 0,
                examples: Vec::new(),
            });
            categories.len() - 1
        });
        let category = &mut categories[slot];
        category.count += 1;
        if category.examples.len() < max_examples && !category.examples.contains(&explanation) {
            category.examples.push(explanation);
        }
    }

    // stable sort keeps first-appearance order among equal counts
    categories.sort_by(|a, b| b.count.cmp(&a.count));
    Ok(categories)
}

/// Aggregates over whole sessions, oldest session first.
pub fn aggregate_sessions(
    sessions: &[SessionRecord],
    classifier: &dyn ErrorClassifier,
    max_examples: usize,
) -> Result<Vec<ErrorCategory>, EngineError> {
    let mut ordered: Vec<&SessionRecord> = sessions.iter().collect();
    ordered.sort_by(|a, b| {
        a.session
            .started_at
            .cmp(&b.session.started_at)
            .then_with(|| a.session.session_id.cmp(&b.session.session_id))
    });
    aggregate(
        ordered.into_iter().flat_map(|record| record.session.attempts.iter()),
        classifier,
        max_examples,
    )
}
