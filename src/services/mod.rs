pub mod curriculum;
pub mod error_labeler;
pub mod exercise;
pub mod judge;
pub mod llm_provider;
pub mod practice;
pub mod vocabulary;

use thiserror::Error;

use crate::config::Config;
use crate::engine::KeywordClassifier;

use self::error_labeler::ErrorLabeler;
use self::exercise::ExerciseGenerator;
use self::judge::AnswerJudge;
use self::llm_provider::{LLMError, LLMProvider};

/// Failure of an outside helper (generator, judge or labeler).
#[derive(Debug, Error)]
pub enum CollaboratorError {
    #[error("language model unavailable: {0}")]
    Llm(#[from] LLMError),
    #[error("malformed collaborator output: {0}")]
    Malformed(String),
}

/// The three replaceable helpers the practice service delegates to.
#[derive(Debug, Clone)]
pub struct Collaborators {
    pub generator: ExerciseGenerator,
    pub judge: AnswerJudge,
    pub labeler: ErrorLabeler,
}

impl Collaborators {
    /// Deterministic helpers that never leave the process.
    pub fn offline() -> Self {
        Self {
            generator: ExerciseGenerator::Template,
            judge: AnswerJudge::ExactMatch,
            labeler: ErrorLabeler::Keyword(KeywordClassifier::default()),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        let provider = LLMProvider::from_env();
        if config.llm_mock || !provider.is_available() {
            tracing::info!(llm_mock = config.llm_mock, "using offline collaborators");
            return Self::offline();
        }

        tracing::info!(model = provider.model(), "using language model collaborators");
        let target_language = config.target_language.clone();
        Self {
            generator: ExerciseGenerator::Llm {
                provider: provider.clone(),
                target_language: target_language.clone(),
            },
            judge: AnswerJudge::Llm {
                provider: provider.clone(),
                target_language: target_language.clone(),
            },
            labeler: ErrorLabeler::Llm { provider, target_language },
        }
    }
}
