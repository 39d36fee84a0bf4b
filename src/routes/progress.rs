use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;

use crate::response::ok;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/progression", get(progression))
        .route("/api/recommendations", get(recommendations))
        .route("/api/recommendations/next", get(next_exercise))
}

async fn progression(State(state): State<AppState>) -> impl IntoResponse {
    ok(state.practice().progression())
}

async fn recommendations(State(state): State<AppState>) -> impl IntoResponse {
    ok(state.practice().recommendations())
}

async fn next_exercise(State(state): State<AppState>) -> impl IntoResponse {
    ok(state.practice().next_recommendation())
}
