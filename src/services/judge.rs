use serde::{Deserialize, Serialize};

use super::exercise::{build_filled_sentence, Answer, Exercise, ExerciseBody};
use super::llm_provider::{extract_json_object, LLMProvider};
use super::CollaboratorError;

/// Verdict on one submitted answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub is_correct: bool,
    pub corrected_answer: String,
    #[serde(default)]
    pub error_analysis: Vec<String>,
    #[serde(default)]
    pub explanation_summary: String,
}

#[derive(Debug, Deserialize)]
struct RawEvaluation {
    is_correct: bool,
    #[serde(default)]
    corrected_answer: Option<String>,
    #[serde(default)]
    error_analysis: Vec<String>,
    #[serde(default)]
    explanation_summary: Option<String>,
}

#[derive(Debug, Clone)]
pub enum AnswerJudge {
    Llm {
        provider: LLMProvider,
        target_language: String,
    },
    ExactMatch,
}

impl AnswerJudge {
    pub fn name(&self) -> &'static str {
        match self {
            AnswerJudge::Llm { .. } => "llm",
            AnswerJudge::ExactMatch => "exact_match",
        }
    }

    pub async fn evaluate(
        &self,
        exercise: &Exercise,
        user_answer: &Answer,
    ) -> Result<Evaluation, CollaboratorError> {
        match self {
            AnswerJudge::ExactMatch => Ok(exact_match(exercise, user_answer)),
            AnswerJudge::Llm { provider, target_language } => {
                let system = format!("You are a helpful {target_language} tutor assistant.");
                let reply = provider
                    .complete(&system, &judge_prompt(exercise, user_answer, target_language), 0.2)
                    .await?;
                let raw: RawEvaluation = serde_json::from_str(extract_json_object(&reply))
                    .map_err(|err| {
                        tracing::warn!(exercise_id = %exercise.exercise_id, error = %err, "judge reply is not valid JSON");
                        CollaboratorError::Malformed(format!("judge reply: {err}"))
                    })?;

                let error_analysis: Vec<String> = raw
                    .error_analysis
                    .into_iter()
                    .map(|item| item.trim().to_string())
                    .filter(|item| !item.is_empty())
                    .collect();
                Ok(Evaluation {
                    is_correct: raw.is_correct,
                    corrected_answer: raw
                        .corrected_answer
                        .unwrap_or_else(|| exercise.expected_answer.to_string()),
                    error_analysis: if raw.is_correct { Vec::new() } else { error_analysis },
                    explanation_summary: raw.explanation_summary.unwrap_or_default(),
                })
            }
        }
    }
}

fn judge_prompt(exercise: &Exercise, user_answer: &Answer, target_language: &str) -> String {
    let shown_prompt = match &exercise.body {
        ExerciseBody::MultipleChoice { choices: options, .. }
        | ExerciseBody::ErrorCorrection { sentences: options, .. } => {
            let listed: Vec<String> = options.iter().map(|(k, v)| format!("{k}: {v}")).collect();
            format!("{}\n{}", exercise.prompt, listed.join("\n"))
        }
        ExerciseBody::SentenceBuilding { word_pieces } => {
            format!("{}\nPieces: {}", exercise.prompt, word_pieces.join(" / "))
        }
        _ => exercise.prompt.clone(),
    };

    format!(
        "Evaluate a {target_language} learner's answer and explain any mistakes.\n\n\
         ## Exercise ({exercise_type})\n\
         Prompt (a stray space next to ___ is a formatting issue, not a learner error): {shown_prompt}\n\
         Expected answer: {expected}\n\
         User answer: {user_answer}\n\
         Grammar focus: {focus}\n\n\
         Return only JSON:\n\
         {{\"is_correct\": true, \"corrected_answer\": \"...\", \
         \"error_analysis\": [\"one item per mistake\"], \"explanation_summary\": \"...\"}}",
        exercise_type = exercise.exercise_type(),
        expected = exercise.expected_answer,
        focus = exercise.grammar_focus.join(", "),
    )
}

/// Lowercases, collapses whitespace and drops trailing sentence punctuation.
fn normalize_answer(value: &str) -> String {
    value
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .trim_end_matches(['.', '!', '?', '。', '？', '！'])
        .trim_end()
        .to_lowercase()
}

fn exact_match(exercise: &Exercise, user_answer: &Answer) -> Evaluation {
    let expected = exercise.expected_answer.parts();
    let given = user_answer.parts();

    let mut error_analysis = Vec::new();
    let is_correct = if expected.len() == given.len() {
        for (index, (want, got)) in expected.iter().zip(given.iter()).enumerate() {
            if normalize_answer(want) != normalize_answer(got) {
                let position = if expected.len() > 1 {
                    format!("blank {}: ", index + 1)
                } else {
                    String::new()
                };
                error_analysis.push(format!("{position}expected '{want}' but got '{got}'"));
            }
        }
        error_analysis.is_empty()
    } else {
        // one string for a multi-part answer is compared as a whole
        let joined_ok = given.len() == 1
            && normalize_answer(&exercise.expected_answer.joined()) == normalize_answer(given[0]);
        if !joined_ok {
            error_analysis.push(format!(
                "expected {} answer part(s) but got {}",
                expected.len(),
                given.len()
            ));
        }
        joined_ok
    };

    let corrected_answer = match exercise.body {
        ExerciseBody::FillInBlank | ExerciseBody::FillMultipleBlanks => {
            build_filled_sentence(&exercise.prompt, &exercise.expected_answer)
        }
        _ => exercise.expected_answer.to_string(),
    };
    let explanation_summary = if is_correct {
        "Correct.".to_string()
    } else {
        format!("The expected answer was: {}", exercise.expected_answer)
    };

    Evaluation {
        is_correct,
        corrected_answer,
        error_analysis,
        explanation_summary,
    }
}
