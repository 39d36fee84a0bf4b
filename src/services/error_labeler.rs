//! Labels error explanations before aggregation.
//!
//! Labeling may call the language model, so it runs ahead of the synchronous
//! aggregator; the result is a [`PreparedLabels`] lookup that the aggregator
//! consumes as its [`ErrorClassifier`].

use std::collections::HashMap;

use serde::Deserialize;

use super::llm_provider::{extract_json_object, LLMProvider};
use super::CollaboratorError;
use crate::engine::{EngineError, ErrorClassifier, KeywordClassifier};

#[derive(Debug, Clone)]
pub enum ErrorLabeler {
    Llm {
        provider: LLMProvider,
        target_language: String,
    },
    Keyword(KeywordClassifier),
}

#[derive(Debug, Deserialize)]
struct LabelReply {
    labels: Vec<String>,
}

impl ErrorLabeler {
    pub fn name(&self) -> &'static str {
        match self {
            ErrorLabeler::Llm { .. } => "llm",
            ErrorLabeler::Keyword(_) => "keyword",
        }
    }

    pub async fn prepare(&self, explanations: &[String]) -> Result<PreparedLabels, CollaboratorError> {
        let mut distinct: Vec<String> = Vec::new();
        for explanation in explanations {
            if !distinct.contains(explanation) {
                distinct.push(explanation.clone());
            }
        }

        let labels = match self {
            ErrorLabeler::Keyword(classifier) => classifier
                .label(&distinct)
                .map_err(|err| CollaboratorError::Malformed(err.to_string()))?,
            ErrorLabeler::Llm { .. } if distinct.is_empty() => Vec::new(),
            ErrorLabeler::Llm { provider, target_language } => {
                let reply = provider
                    .complete(
                        &format!("You analyze {target_language} learner errors."),
                        &label_prompt(&distinct),
                        0.2,
                    )
                    .await?;
                let parsed: LabelReply = serde_json::from_str(extract_json_object(&reply))
                    .map_err(|err| CollaboratorError::Malformed(format!("label reply: {err}")))?;
                if parsed.labels.len() != distinct.len() {
                    return Err(CollaboratorError::Malformed(format!(
                        "expected {} labels, got {}",
                        distinct.len(),
                        parsed.labels.len()
                    )));
                }
                parsed.labels
            }
        };

        tracing::debug!(labeler = self.name(), explanations = distinct.len(), "error labels prepared");
        Ok(PreparedLabels {
            labels: distinct.into_iter().zip(labels).collect(),
            fallback: KeywordClassifier::default(),
        })
    }
}

fn label_prompt(explanations: &[String]) -> String {
    let listed: Vec<String> = explanations
        .iter()
        .enumerate()
        .map(|(i, e)| format!("{}. {e}", i + 1))
        .collect();
    format!(
        "Give each learner error below a short, general category label in English \
         (for example \"particles\" or \"politeness mismatch\"). Reuse the same label for \
         similar errors.\n\n{}\n\nReturn only JSON: {{\"labels\": [\"one label per error, in order\"]}}",
        listed.join("\n")
    )
}

/// Explanation-to-label lookup; explanations it has not seen fall back to
/// keyword rules.
#[derive(Debug, Clone)]
pub struct PreparedLabels {
    labels: HashMap<String, String>,
    fallback: KeywordClassifier,
}

impl ErrorClassifier for PreparedLabels {
    fn label(&self, explanations: &[String]) -> Result<Vec<String>, EngineError> {
        let mut out = Vec::with_capacity(explanations.len());
        for explanation in explanations {
            match self.labels.get(explanation) {
                Some(label) => out.push(label.clone()),
                None => out.extend(self.fallback.label(std::slice::from_ref(explanation))?),
            }
        }
        Ok(out)
    }
}
