use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;

use crate::engine::EngineConfig;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(root))
        .route("/info", get(info))
        .route("/live", get(live))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthResponse {
    status: &'static str,
    timestamp: String,
    store_version: u64,
    session_active: bool,
    curriculum_points: usize,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LivenessResponse {
    status: &'static str,
    timestamp: String,
    uptime: u64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthInfoResponse {
    service: &'static str,
    version: &'static str,
    start_time: String,
    uptime: u64,
    curriculum_level: String,
    vocabulary_words: usize,
    mastery_rules: EngineConfig,
    llm_mock: bool,
    generator: &'static str,
    judge: &'static str,
    labeler: &'static str,
}

async fn root(State(state): State<AppState>) -> Response {
    let practice = state.practice();
    Json(HealthResponse {
        status: "ok",
        timestamp: now_iso(),
        store_version: practice.store_version(),
        session_active: practice.is_session_active(),
        curriculum_points: practice.curriculum().len(),
    })
    .into_response()
}

async fn live(State(state): State<AppState>) -> Response {
    Json(LivenessResponse {
        status: "healthy",
        timestamp: now_iso(),
        uptime: state.uptime_seconds(),
    })
    .into_response()
}

async fn info(State(state): State<AppState>) -> Response {
    let practice = state.practice();
    let collaborators = practice.collaborators();
    Json(HealthInfoResponse {
        service: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
        start_time: system_time_iso(state.started_at_system()),
        uptime: state.uptime_seconds(),
        curriculum_level: practice.curriculum().level().to_string(),
        vocabulary_words: practice.vocabulary().len(),
        mastery_rules: practice.engine_config().clone(),
        llm_mock: state.config().llm_mock,
        generator: collaborators.generator.name(),
        judge: collaborators.judge.name(),
        labeler: collaborators.labeler.name(),
    })
    .into_response()
}

fn system_time_iso(time: std::time::SystemTime) -> String {
    let datetime: chrono::DateTime<chrono::Utc> = time.into();
    datetime.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

fn now_iso() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}
