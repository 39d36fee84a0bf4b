#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use grammar_practice::config::Config;
use grammar_practice::services::Collaborators;
use grammar_practice::storage::{JsonFileStorage, LearnerStorage};

pub const CURRICULUM: &str = r#"{
    "levels": {
        "beginner": {
            "grammar_points": [
                { "id": "topic_particle", "description": "topic marker 은/는" },
                { "id": "object_particle", "description": "object marker 을/를" },
                { "id": "polite_present", "description": "present polite ending" }
            ]
        }
    }
}"#;

pub const VOCABULARY: &str = r#"[
    { "vocab": "학교", "translation": "school", "frequency_rank": 3, "topik_level": "1" },
    { "vocab": "물", "translation": "water", "frequency_rank": 7, "topik_level": "1" },
    { "vocab": "경제", "translation": "economy", "frequency_rank": 1, "topik_level": "3" }
]"#;

pub struct TestApp {
    pub router: Router,
    pub data_dir: TempDir,
}

pub fn create_test_app() -> TestApp {
    create_test_app_with_curriculum(Some(CURRICULUM))
}

pub fn create_test_app_with_curriculum(curriculum: Option<&str>) -> TestApp {
    let data_dir = tempfile::tempdir().expect("tempdir");
    if let Some(curriculum) = curriculum {
        std::fs::write(data_dir.path().join("curriculum.json"), curriculum).expect("write curriculum");
        std::fs::write(data_dir.path().join("vocab_data.json"), VOCABULARY).expect("write vocabulary");
    }
    let router = build_router(&data_dir);
    TestApp { router, data_dir }
}

/// Rebuilds the app over an existing data directory, as a restart would.
pub fn build_router(data_dir: &TempDir) -> Router {
    let config = Config::for_data_dir(data_dir.path());
    let storage: Arc<dyn LearnerStorage> =
        Arc::new(JsonFileStorage::open(data_dir.path()).expect("open storage"));
    let state = grammar_practice::build_state_with(config, storage, Collaborators::offline())
        .expect("build state");
    grammar_practice::create_app(state)
}

pub async fn send(router: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

pub async fn get(router: &Router, uri: &str) -> (StatusCode, Value) {
    send(router, "GET", uri, None).await
}

pub async fn post(router: &Router, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    send(router, "POST", uri, body).await
}
