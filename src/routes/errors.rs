use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::Router;

use crate::response::{ok, AppError};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/categories", get(categories))
        .route("/aggregate", post(aggregate))
}

/// Latest stored aggregation, or `null` before the first run.
async fn categories(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    Ok(ok(state.practice().error_categories()?))
}

async fn aggregate(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let report = state.practice().aggregate_errors().await?;
    Ok(ok(report))
}
