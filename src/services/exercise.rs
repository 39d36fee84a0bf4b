//! Exercise model and generation.
//!
//! Exercises come from an [`ExerciseGenerator`]: either the language model,
//! whose JSON reply is validated before use, or deterministic templates built
//! from the curriculum description. Both are steered by the target words
//! picked from the vocabulary for each request.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::curriculum::{normalize_grammar_id, Curriculum, GrammarPoint};
use super::llm_provider::{extract_json_object, LLMProvider};
use super::vocabulary::VocabEntry;
use super::CollaboratorError;
use crate::engine::ExerciseType;

pub const BLANK: &str = "___";
const MAX_GENERATION_ATTEMPTS: usize = 2;
const RECENT_IN_PROMPT: usize = 5;
const CHOICE_KEYS: [&str; 4] = ["A", "B", "C", "D"];

/// Expected or submitted answer: one string, or one string per blank/piece.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Answer {
    Single(String),
    Many(Vec<String>),
}

impl Answer {
    pub fn parts(&self) -> Vec<&str> {
        match self {
            Answer::Single(value) => vec![value.as_str()],
            Answer::Many(values) => values.iter().map(String::as_str).collect(),
        }
    }

    pub fn joined(&self) -> String {
        self.parts().join(" ")
    }

    pub fn is_blank(&self) -> bool {
        self.parts().iter().all(|part| part.trim().is_empty())
    }
}

impl std::fmt::Display for Answer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Answer::Single(value) => f.write_str(value),
            Answer::Many(values) => f.write_str(&values.join(", ")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "exercise_type", rename_all = "snake_case")]
pub enum ExerciseBody {
    FillInBlank,
    FillMultipleBlanks,
    MultipleChoice {
        choices: BTreeMap<String, String>,
        correct_answer: String,
    },
    ErrorCorrection {
        sentences: BTreeMap<String, String>,
        correct_answer: String,
    },
    SentenceBuilding {
        word_pieces: Vec<String>,
    },
    Translation {
        source_sentence: String,
    },
}

impl ExerciseBody {
    pub fn exercise_type(&self) -> ExerciseType {
        match self {
            ExerciseBody::FillInBlank => ExerciseType::FillInBlank,
            ExerciseBody::FillMultipleBlanks => ExerciseType::FillMultipleBlanks,
            ExerciseBody::MultipleChoice { .. } => ExerciseType::MultipleChoice,
            ExerciseBody::ErrorCorrection { .. } => ExerciseType::ErrorCorrection,
            ExerciseBody::SentenceBuilding { .. } => ExerciseType::SentenceBuilding,
            ExerciseBody::Translation { .. } => ExerciseType::Translation,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Exercise {
    pub exercise_id: String,
    #[serde(flatten)]
    pub body: ExerciseBody,
    pub prompt: String,
    pub expected_answer: Answer,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub glossary: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub translated_sentence: Option<String>,
    pub grammar_focus: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub target_vocab: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl Exercise {
    pub fn exercise_type(&self) -> ExerciseType {
        self.body.exercise_type()
    }
}

/// Replaces `___` placeholders left to right with the answer parts.
pub fn build_filled_sentence(prompt: &str, answer: &Answer) -> String {
    let mut filled = prompt.to_string();
    for part in answer.parts() {
        match filled.find(BLANK) {
            Some(at) => filled.replace_range(at..at + BLANK.len(), part),
            None => break,
        }
    }
    filled
}

/// Loose shape of a generated exercise before validation.
#[derive(Debug, Default, Deserialize)]
pub struct RawExercise {
    #[serde(default)]
    pub exercise_type: Option<String>,
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default)]
    pub expected_answer: Option<Answer>,
    #[serde(default)]
    pub glossary: BTreeMap<String, String>,
    #[serde(default)]
    pub translated_sentence: Option<String>,
    #[serde(default)]
    pub grammar_focus: Vec<String>,
    #[serde(default)]
    pub choices: BTreeMap<String, String>,
    #[serde(default)]
    pub sentences: BTreeMap<String, String>,
    #[serde(default)]
    pub correct_answer: Option<String>,
    #[serde(default)]
    pub word_pieces: Vec<String>,
    #[serde(default)]
    pub source_sentence: Option<String>,
}

impl RawExercise {
    /// Checks the shape against the requested type and builds the exercise.
    /// Returns every problem found when the shape is unusable.
    pub fn validate(
        self,
        requested: ExerciseType,
        curriculum: &Curriculum,
        target: &GrammarPoint,
        now: DateTime<Utc>,
    ) -> Result<Exercise, Vec<String>> {
        let mut problems = Vec::new();

        if let Some(declared) = self.exercise_type.as_deref() {
            if declared.trim() != requested.as_str() {
                problems.push(format!(
                    "exercise_type {declared} does not match requested {requested}"
                ));
            }
        }

        let prompt = self.prompt.unwrap_or_default().trim().to_string();
        if prompt.is_empty() {
            problems.push("prompt is empty".to_string());
        }
        if self.grammar_focus.iter().all(|id| id.trim().is_empty()) {
            problems.push("grammar_focus is missing".to_string());
        }

        let blanks = prompt.matches(BLANK).count();
        let answer = self.expected_answer;
        let body = match requested {
            ExerciseType::FillInBlank => {
                if blanks != 1 {
                    problems.push(format!("expected exactly 1 blank, found {blanks}"));
                }
                if !matches!(answer, Some(Answer::Single(_))) {
                    problems.push("fill_in_blank needs a single expected_answer".to_string());
                }
                ExerciseBody::FillInBlank
            }
            ExerciseType::FillMultipleBlanks => {
                let answers = answer.as_ref().map(|a| a.parts().len()).unwrap_or(0);
                if blanks < 2 || blanks != answers {
                    problems.push(format!(
                        "blank count {blanks} does not match answer count {answers}"
                    ));
                }
                ExerciseBody::FillMultipleBlanks
            }
            ExerciseType::MultipleChoice | ExerciseType::ErrorCorrection => {
                let options = if requested == ExerciseType::MultipleChoice {
                    self.choices
                } else {
                    self.sentences
                };
                let correct = self
                    .correct_answer
                    .or_else(|| match &answer {
                        Some(Answer::Single(key)) => Some(key.clone()),
                        _ => None,
                    })
                    .unwrap_or_default()
                    .trim()
                    .to_string();
                if options.len() < 2 {
                    problems.push("at least two options are required".to_string());
                }
                if !options.contains_key(&correct) {
                    problems.push(format!("correct answer '{correct}' is not one of the options"));
                }
                if requested == ExerciseType::MultipleChoice {
                    ExerciseBody::MultipleChoice { choices: options, correct_answer: correct }
                } else {
                    ExerciseBody::ErrorCorrection { sentences: options, correct_answer: correct }
                }
            }
            ExerciseType::SentenceBuilding => {
                let expected = answer.as_ref().map(|a| a.parts()).unwrap_or_default();
                if self.word_pieces.is_empty() || !same_pieces(&self.word_pieces, &expected) {
                    problems.push("word_pieces must be a reordering of expected_answer".to_string());
                }
                ExerciseBody::SentenceBuilding { word_pieces: self.word_pieces }
            }
            ExerciseType::Translation => {
                if answer.as_ref().map_or(true, Answer::is_blank) {
                    problems.push("translation needs an expected_answer".to_string());
                }
                ExerciseBody::Translation {
                    source_sentence: self.source_sentence.unwrap_or_else(|| prompt.clone()),
                }
            }
        };

        if !problems.is_empty() {
            return Err(problems);
        }

        // choice exercises are answered with the option key
        let expected_answer = match &body {
            ExerciseBody::MultipleChoice { correct_answer, .. }
            | ExerciseBody::ErrorCorrection { correct_answer, .. } => {
                Answer::Single(correct_answer.clone())
            }
            _ => answer.unwrap_or(Answer::Single(String::new())),
        };

        Ok(Exercise {
            exercise_id: uuid::Uuid::new_v4().to_string(),
            body,
            prompt,
            expected_answer,
            glossary: self.glossary,
            translated_sentence: self.translated_sentence.filter(|s| !s.trim().is_empty()),
            grammar_focus: known_focus(&self.grammar_focus, curriculum, target),
            target_vocab: Vec::new(),
            created_at: now,
        })
    }
}

fn same_pieces(pieces: &[String], expected: &[&str]) -> bool {
    let mut left: Vec<&str> = pieces.iter().map(|p| p.trim()).collect();
    let mut right: Vec<&str> = expected.iter().map(|p| p.trim()).collect();
    left.sort_unstable();
    right.sort_unstable();
    left == right
}

/// Keeps the curriculum ids a generated exercise claims to practice, falling
/// back to the requested target.
fn known_focus(raw: &[String], curriculum: &Curriculum, target: &GrammarPoint) -> Vec<String> {
    let mut focus: Vec<String> = Vec::new();
    for id in raw.iter().map(|id| normalize_grammar_id(id)) {
        let known = curriculum.is_empty() || curriculum.get(&id).is_some();
        if !id.is_empty() && known && !focus.contains(&id) {
            focus.push(id);
        }
    }
    if focus.is_empty() {
        debug!(target = %target.id, ?raw, "generated grammar_focus unknown, using target");
        focus.push(target.id.clone());
    }
    focus
}

pub struct GenerationRequest<'a> {
    pub exercise_type: ExerciseType,
    pub target: &'a GrammarPoint,
    pub curriculum: &'a Curriculum,
    pub target_vocab: &'a [VocabEntry],
    pub recent: &'a [Exercise],
    pub now: DateTime<Utc>,
}

impl GenerationRequest<'_> {
    fn target_words(&self) -> Vec<String> {
        self.target_vocab.iter().map(|e| e.word.clone()).collect()
    }
}

#[derive(Debug, Clone)]
pub enum ExerciseGenerator {
    Llm {
        provider: LLMProvider,
        target_language: String,
    },
    Template,
}

impl ExerciseGenerator {
    pub fn name(&self) -> &'static str {
        match self {
            ExerciseGenerator::Llm { .. } => "llm",
            ExerciseGenerator::Template => "template",
        }
    }

    pub async fn generate(
        &self,
        request: &GenerationRequest<'_>,
    ) -> Result<Exercise, CollaboratorError> {
        match self {
            ExerciseGenerator::Template => Ok(template_exercise(request)),
            ExerciseGenerator::Llm { provider, target_language } => {
                let system = format!(
                    "You are a {target_language} language tutor assistant. Reply with one JSON object only."
                );
                let prompt = generation_prompt(request, target_language);
                let mut problems = Vec::new();

                for attempt in 1..=MAX_GENERATION_ATTEMPTS {
                    let reply = provider.complete(&system, &prompt, 0.7).await?;
                    let raw: RawExercise = match serde_json::from_str(extract_json_object(&reply)) {
                        Ok(raw) => raw,
                        Err(err) => {
                            warn!(attempt, error = %err, "generated exercise is not valid JSON");
                            problems = vec![format!("invalid JSON: {err}")];
                            continue;
                        }
                    };
                    match raw.validate(
                        request.exercise_type,
                        request.curriculum,
                        request.target,
                        request.now,
                    ) {
                        Ok(mut exercise) => {
                            exercise.target_vocab = request.target_words();
                            for entry in request.target_vocab {
                                if !entry.translation.is_empty() {
                                    exercise
                                        .glossary
                                        .entry(entry.word.clone())
                                        .or_insert_with(|| entry.translation.clone());
                                }
                            }
                            return Ok(exercise);
                        }
                        Err(found) => {
                            warn!(attempt, problems = ?found, "generated exercise rejected");
                            problems = found;
                        }
                    }
                }
                Err(CollaboratorError::Malformed(problems.join("; ")))
            }
        }
    }
}

fn generation_prompt(request: &GenerationRequest<'_>, target_language: &str) -> String {
    let exercise_type = request.exercise_type;
    let shape = match exercise_type {
        ExerciseType::FillInBlank => {
            r#""prompt": "sentence with exactly one ___", "expected_answer": "text for the blank""#
        }
        ExerciseType::FillMultipleBlanks => {
            r#""prompt": "sentence with two or more ___", "expected_answer": ["one entry per blank, in order"]"#
        }
        ExerciseType::MultipleChoice => {
            r#""prompt": "question", "choices": {"A": "...", "B": "...", "C": "...", "D": "..."}, "correct_answer": "A""#
        }
        ExerciseType::ErrorCorrection => {
            r#""prompt": "instruction", "sentences": {"A": "...", "B": "...", "C": "..."}, "correct_answer": "key of the only correct sentence""#
        }
        ExerciseType::SentenceBuilding => {
            r#""prompt": "instruction", "word_pieces": ["shuffled pieces"], "expected_answer": ["pieces in the correct order"]"#
        }
        ExerciseType::Translation => {
            r#""prompt": "sentence to translate", "source_sentence": "same sentence", "expected_answer": "translation in the target language""#
        }
    };

    let mut recent = String::new();
    let skip = request.recent.len().saturating_sub(RECENT_IN_PROMPT);
    for (idx, exercise) in request.recent.iter().skip(skip).enumerate() {
        recent.push_str(&format!(
            "- Exercise {}: {} | prompt: {} | answer: {}\n",
            idx + 1,
            exercise.exercise_type(),
            exercise.prompt,
            exercise.expected_answer
        ));
    }
    if recent.is_empty() {
        recent.push_str("None\n");
    }

    let mut vocab = String::new();
    for entry in request.target_vocab {
        if entry.translation.is_empty() {
            vocab.push_str(&format!("- {}\n", entry.word));
        } else {
            vocab.push_str(&format!("- {} ({})\n", entry.word, entry.translation));
        }
    }
    if vocab.is_empty() {
        vocab.push_str("None, use common words for the learner's level\n");
    }

    format!(
        "Create one \"{exercise_type}\" exercise for a {target_language} learner.\n\n\
         ## Grammar point\n- id: {id}\n- description: {description}\n\n\
         ## Vocabulary to use (at least one of these words)\n{vocab}\n\
         ## Recent exercises (avoid repeating them)\n{recent}\n\
         ## Response format\n\
         {{\"exercise_type\": \"{exercise_type}\", {shape}, \
         \"glossary\": {{\"term\": \"definition\"}}, \
         \"translated_sentence\": \"...\", \"grammar_focus\": [\"{id}\"]}}",
        id = request.target.id,
        description = request.target.description,
    )
}

/// Deterministic exercise built only from curriculum data.
fn template_exercise(request: &GenerationRequest<'_>) -> Exercise {
    let target = request.target;
    let cue = if target.description.is_empty() {
        target.id.clone()
    } else {
        target.description.clone()
    };

    let options = || {
        let mut values: Vec<String> = request
            .curriculum
            .points()
            .iter()
            .filter(|p| p.id != target.id)
            .take(CHOICE_KEYS.len() - 1)
            .map(|p| p.id.clone())
            .collect();
        if values.is_empty() {
            values.push(format!("not {}", target.id));
        }
        let slot = request.recent.len() % (values.len() + 1);
        values.insert(slot, target.id.clone());
        let options: BTreeMap<String, String> = CHOICE_KEYS
            .iter()
            .zip(values)
            .map(|(key, value)| (key.to_string(), value))
            .collect();
        (options, CHOICE_KEYS[slot].to_string())
    };

    let (body, prompt, expected_answer) = match request.exercise_type {
        ExerciseType::FillInBlank => (
            ExerciseBody::FillInBlank,
            format!("{cue}: {BLANK}"),
            Answer::Single(target.id.clone()),
        ),
        ExerciseType::FillMultipleBlanks => (
            ExerciseBody::FillMultipleBlanks,
            format!("{cue}: {BLANK} / {BLANK}"),
            Answer::Many(vec![target.id.clone(), target.id.clone()]),
        ),
        ExerciseType::MultipleChoice => {
            let (choices, correct) = options();
            (
                ExerciseBody::MultipleChoice { choices, correct_answer: correct.clone() },
                format!("Which grammar point matches: {cue}?"),
                Answer::Single(correct),
            )
        }
        ExerciseType::ErrorCorrection => {
            let (sentences, correct) = options();
            (
                ExerciseBody::ErrorCorrection { sentences, correct_answer: correct.clone() },
                format!("Only one option names the pattern for \"{cue}\". Pick it."),
                Answer::Single(correct),
            )
        }
        ExerciseType::SentenceBuilding => {
            let mut words: Vec<String> = cue.split_whitespace().map(str::to_string).collect();
            if words.len() < 2 {
                words.push(target.id.clone());
            }
            let mut pieces = words.clone();
            pieces.reverse();
            (
                ExerciseBody::SentenceBuilding { word_pieces: pieces },
                "Put the pieces in order.".to_string(),
                Answer::Many(words),
            )
        }
        ExerciseType::Translation => {
            let words = request.target_words();
            let prompt = if words.is_empty() {
                format!("Write this using {}: {cue}", target.id)
            } else {
                format!("Write this using {} and {}: {cue}", target.id, words.join(", "))
            };
            (
                ExerciseBody::Translation { source_sentence: cue.clone() },
                prompt,
                Answer::Single(cue.clone()),
            )
        }
    };

    let glossary: BTreeMap<String, String> = request
        .target_vocab
        .iter()
        .filter(|e| !e.translation.is_empty())
        .map(|e| (e.word.clone(), e.translation.clone()))
        .collect();

    Exercise {
        exercise_id: uuid::Uuid::new_v4().to_string(),
        body,
        prompt,
        expected_answer,
        glossary,
        translated_sentence: None,
        grammar_focus: vec![target.id.clone()],
        target_vocab: request.target_words(),
        created_at: request.now,
    }
}
