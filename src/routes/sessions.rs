use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::Router;

use crate::response::{ok, AppError};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/start", post(start_session))
        .route("/end", post(end_session))
        .route("/current", get(current_session))
        .route("/summary", get(latest_summary))
        .route("/history", get(history))
}

async fn start_session(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let session = state.practice().start_session().await?;
    Ok(ok(session))
}

async fn end_session(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let summary = state.practice().end_session().await?;
    Ok(ok(summary))
}

async fn current_session(State(state): State<AppState>) -> impl IntoResponse {
    ok(state.practice().current_session())
}

async fn latest_summary(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    Ok(ok(state.practice().latest_summary()?))
}

async fn history(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    Ok(ok(state.practice().session_history()?))
}
