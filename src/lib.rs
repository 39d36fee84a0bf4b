pub mod config;
pub mod engine;
pub mod logging;
pub mod response;
pub mod routes;
pub mod services;
pub mod state;
pub mod storage;

use std::sync::Arc;

use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::config::Config;
use crate::services::curriculum::Curriculum;
use crate::services::practice::PracticeService;
use crate::services::vocabulary::Vocabulary;
use crate::services::Collaborators;
use crate::state::AppState;
use crate::storage::{JsonFileStorage, LearnerStorage, StorageError};

/// Builds the practice state over the JSON data directory.
pub fn build_state(config: Config) -> Result<AppState, StorageError> {
    let storage: Arc<dyn LearnerStorage> = Arc::new(JsonFileStorage::open(&config.data_dir)?);
    let collaborators = Collaborators::from_config(&config);
    build_state_with(config, storage, collaborators)
}

pub fn build_state_with(
    config: Config,
    storage: Arc<dyn LearnerStorage>,
    collaborators: Collaborators,
) -> Result<AppState, StorageError> {
    let curriculum = Curriculum::load(&config.curriculum_path, &config.curriculum_level);
    let vocabulary = Vocabulary::load(&config.vocab_path);
    let practice = PracticeService::new(config.engine.clone(), curriculum, storage, collaborators)?
        .with_vocabulary(vocabulary, config.vocab_per_exercise);
    Ok(AppState::new(config, practice))
}

pub fn create_app(state: AppState) -> axum::Router {
    routes::router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
