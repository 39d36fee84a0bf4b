use axum::body::Bytes;
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::post;
use axum::Router;
use serde::Deserialize;

use crate::response::{ok, AppError};
use crate::services::exercise::Answer;
use crate::services::practice::ExerciseChoice;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/new", post(new_exercise))
        .route("/answer", post(answer_exercise))
}

#[derive(Debug, Default, Deserialize)]
struct NewExerciseRequest {
    #[serde(default)]
    exercise_type: Option<String>,
    #[serde(default)]
    difficulty: Option<String>,
    #[serde(default)]
    auto: bool,
}

#[derive(Debug, Deserialize)]
struct AnswerRequest {
    exercise_id: String,
    user_answer: Answer,
}

async fn new_exercise(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    // an empty body means auto mode
    let request: NewExerciseRequest = if body.iter().all(u8::is_ascii_whitespace) {
        NewExerciseRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|err| AppError::validation(format!("invalid request body: {err}")))?
    };

    let generated = state
        .practice()
        .new_exercise(ExerciseChoice {
            exercise_type: request.exercise_type.as_deref(),
            difficulty: request.difficulty.as_deref(),
            auto: request.auto,
        })
        .await?;
    Ok(ok(generated))
}

async fn answer_exercise(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    let request: AnswerRequest = serde_json::from_slice(&body)
        .map_err(|err| AppError::validation(format!("invalid request body: {err}")))?;
    if request.exercise_id.trim().is_empty() {
        return Err(AppError::validation("exercise_id must not be empty"));
    }

    let result = state
        .practice()
        .answer(request.exercise_id.trim(), request.user_answer)
        .await?;
    Ok(ok(result))
}
