//! Adaptive Mastery & Recommendation Engine
//!
//! Deterministic core of the practice service:
//! - Mastery Store / Updater - per grammar point, per tier counters
//! - Progression Calculator - derived percentages and unlock eligibility
//! - Recommendation Engine - ranked list and auto-mode exercise choice
//! - Error Aggregator - labeled error categories with examples
//! - Session Accounting - active session lifecycle and summaries
//!
//! Nothing here performs I/O; callers pass the store and collaborators in.

pub mod config;
pub mod error;
pub mod error_categories;
pub mod progression;
pub mod recommendation;
pub mod session;
pub mod store;
pub mod tier;

pub use config::EngineConfig;
pub use error::EngineError;
pub use error_categories::{
    aggregate, aggregate_sessions, ErrorCategory, ErrorClassifier, KeywordClassifier,
};
pub use progression::{
    compute_progression, GrammarProgressionDetail, MasterySnapshot, ProgressionSnapshot,
    TierProgress,
};
pub use recommendation::{
    list_recommendations, recommend_next_exercise, NextExercise, Priority, RecommendationEntry,
    RecommendationReason, SelectionReason,
};
pub use session::{
    ExerciseAttempt, Session, SessionAccounting, SessionRecord, SessionStatus, SessionSummary,
    SessionType,
};
pub use store::{AttemptOutcome, GrammarCatalog, MasteryRecord, MasteryStore, MasteryUpdater};
pub use tier::{DifficultyTier, ExerciseType};
