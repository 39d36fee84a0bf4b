use axum::http::StatusCode;
use serde_json::{json, Value};

mod common;

use common::{get, post};

async fn new_exercise(router: &axum::Router, exercise_type: &str) -> Value {
    let (status, body) = post(
        router,
        "/api/exercise/new",
        Some(json!({ "exercise_type": exercise_type })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    body["data"]["exercise"].clone()
}

async fn answer(router: &axum::Router, exercise: &Value, user_answer: Value) -> Value {
    let (status, body) = post(
        router,
        "/api/exercise/answer",
        Some(json!({
            "exercise_id": exercise["exercise_id"],
            "user_answer": user_answer,
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    body["data"].clone()
}

#[tokio::test]
async fn test_health_endpoints() {
    let app = common::create_test_app();

    let (status, body) = get(&app.router, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["curriculumPoints"], 3);

    let (status, _) = get(&app.router, "/health/live").await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = get(&app.router, "/health/info").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["generator"], "template");
    assert_eq!(body["judge"], "exact_match");
    assert_eq!(body["curriculumLevel"], "beginner");
    assert_eq!(body["vocabularyWords"], 3);
    assert_eq!(body["masteryRules"]["min_reps"], 5);
    assert_eq!(body["llmMock"], true);
    assert!(body["startTime"].as_str().unwrap().ends_with('Z'));
}

#[tokio::test]
async fn test_unknown_route_is_json_404() {
    let app = common::create_test_app();
    let (status, body) = get(&app.router, "/api/nope").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);
    assert_eq!(body["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_session_state_machine_errors() {
    let app = common::create_test_app();

    let (status, body) = post(&app.router, "/api/session/end", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "NO_ACTIVE_SESSION");

    let (status, body) = post(&app.router, "/api/exercise/new", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "NO_ACTIVE_SESSION");

    let (status, body) = post(&app.router, "/api/session/start", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "active");

    let (status, body) = post(&app.router, "/api/session/start", None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "ALREADY_ACTIVE");

    let (status, body) = get(&app.router, "/api/session/current").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["data"]["session_id"].as_str().unwrap().starts_with("session_"));
}

#[tokio::test]
async fn test_practice_flow_summary_and_history() {
    let app = common::create_test_app();
    post(&app.router, "/api/session/start", None).await;

    for _ in 0..5 {
        let exercise = new_exercise(&app.router, "multiple_choice").await;
        assert_eq!(exercise["exercise_type"], "multiple_choice");
        let result = answer(&app.router, &exercise, exercise["expected_answer"].clone()).await;
        assert_eq!(result["is_correct"], true);
        assert_eq!(result["tier"], "RECOGNITION");
    }

    let (status, body) = post(&app.router, "/api/session/end", None).await;
    assert_eq!(status, StatusCode::OK);
    let summary = &body["data"];
    assert_eq!(summary["total_exercises"], 5);
    assert_eq!(summary["correct_exercises"], 5);
    assert_eq!(summary["accuracy_rate"], 100.0);
    assert_eq!(summary["session_type"], "normal");

    let (_, latest) = get(&app.router, "/api/session/summary").await;
    assert_eq!(latest["data"]["session_id"], summary["session_id"]);

    let (_, history) = get(&app.router, "/api/session/history").await;
    assert_eq!(history["data"].as_array().unwrap().len(), 1);
    assert_eq!(history["data"][0]["total_exercises"], 5);

    let (_, progression) = get(&app.router, "/api/progression").await;
    assert_eq!(progression["data"]["store_version"], 5);
    let attempted: u64 = progression["data"]["grammar"]
        .as_object()
        .unwrap()
        .values()
        .map(|detail| detail["total_reps"].as_u64().unwrap())
        .sum();
    assert_eq!(attempted, 5);

    let (_, recommendations) = get(&app.router, "/api/recommendations").await;
    assert!(!recommendations["data"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_empty_session_summary() {
    let app = common::create_test_app();
    post(&app.router, "/api/session/start", None).await;
    let (status, body) = post(&app.router, "/api/session/end", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["session_type"], "empty");
    assert_eq!(body["data"]["accuracy_rate"], 0.0);
    assert_eq!(body["data"]["error_categories"], json!([]));
}

#[tokio::test]
async fn test_mastery_survives_restart() {
    let app = common::create_test_app();
    post(&app.router, "/api/session/start", None).await;
    let exercise = new_exercise(&app.router, "fill_in_blank").await;
    answer(&app.router, &exercise, exercise["expected_answer"].clone()).await;

    let restarted = common::build_router(&app.data_dir);
    let (_, progression) = get(&restarted, "/api/progression").await;
    assert_eq!(progression["data"]["store_version"], 1);
    assert_eq!(progression["data"]["attempted_pairs"], 1);

    let (_, current) = get(&restarted, "/api/session/current").await;
    assert!(current["data"].is_null());
}

#[tokio::test]
async fn test_invalid_requests() {
    let app = common::create_test_app();
    post(&app.router, "/api/session/start", None).await;

    let (status, body) = post(
        &app.router,
        "/api/exercise/new",
        Some(json!({ "exercise_type": "essay" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_ERROR");

    let (status, body) = post(
        &app.router,
        "/api/exercise/answer",
        Some(json!({ "exercise_id": "missing", "user_answer": "x" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);

    let (status, _) = post(&app.router, "/api/exercise/answer", Some(json!({ "user_answer": "x" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_auto_mode_with_empty_body() {
    let app = common::create_test_app();
    post(&app.router, "/api/session/start", None).await;

    let (status, body) = post(&app.router, "/api/exercise/new", None).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let selection = &body["data"]["selection"];
    assert_eq!(selection["reason"], "cold_start");
    assert_eq!(body["data"]["exercise"]["exercise_type"], selection["exercise_type"]);
}

#[tokio::test]
async fn test_difficulty_request_selects_tier() {
    let app = common::create_test_app();
    post(&app.router, "/api/session/start", None).await;

    let (status, body) = post(
        &app.router,
        "/api/exercise/new",
        Some(json!({ "difficulty": "STRUCTURED_PRODUCTION" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["exercise"]["exercise_type"], "fill_multiple_blanks");
    assert_eq!(body["data"]["selection"]["difficulty_level"], "STRUCTURED_PRODUCTION");

    let (status, body) = post(
        &app.router,
        "/api/exercise/new",
        Some(json!({ "difficulty": "EXPERT" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_exercises_target_level_vocabulary() {
    let app = common::create_test_app();
    post(&app.router, "/api/session/start", None).await;

    let exercise = new_exercise(&app.router, "translation").await;
    assert_eq!(exercise["target_vocab"], json!(["학교", "물", "경제"]));
    assert_eq!(exercise["glossary"]["학교"], "school");
}

#[tokio::test]
async fn test_error_categories_aggregated_from_log() {
    let app = common::create_test_app();

    let (_, before) = get(&app.router, "/api/errors/categories").await;
    assert!(before["data"].is_null());

    post(&app.router, "/api/session/start", None).await;
    for _ in 0..3 {
        let exercise = new_exercise(&app.router, "translation").await;
        let result = answer(&app.router, &exercise, json!("completely wrong")).await;
        assert_eq!(result["is_correct"], false);
        assert!(!result["error_analysis"].as_array().unwrap().is_empty());
    }
    let (_, ended) = post(&app.router, "/api/session/end", None).await;
    let session_total: u64 = ended["data"]["error_categories"]
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["count"].as_u64().unwrap())
        .sum();
    assert_eq!(session_total, 3);

    let (status, report) = post(&app.router, "/api/errors/aggregate", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["data"]["sessions_analyzed"], 1);
    assert_eq!(report["data"]["categories"], ended["data"]["error_categories"]);

    let (_, stored) = get(&app.router, "/api/errors/categories").await;
    assert_eq!(stored["data"], report["data"]);
}

#[tokio::test]
async fn test_empty_curriculum_falls_back_to_default() {
    let app = common::create_test_app_with_curriculum(None);
    let (status, body) = get(&app.router, "/api/recommendations/next").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["exercise_type"], "fill_in_blank");
    assert_eq!(body["data"]["reason"], "default");
    assert!(body["data"]["explanation"]
        .as_str()
        .unwrap()
        .contains("curriculum is empty"));
}
