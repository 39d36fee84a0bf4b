//! Practice orchestration.
//!
//! Owns the in-memory Mastery Store and the session accounting. Every write
//! goes through a clone: the attempt is applied to copies, the new store is
//! flushed to storage, and only then are the copies swapped in. Writers are
//! serialized by an async writer lock held across the flush, which runs on
//! the blocking pool. The in-memory locks are taken session first, then
//! store, and never held across an `.await`.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::curriculum::{Curriculum, GrammarPoint};
use super::exercise::{build_filled_sentence, Answer, Exercise, ExerciseBody, GenerationRequest};
use super::vocabulary::Vocabulary;
use super::{CollaboratorError, Collaborators};
use crate::engine::error_categories::explanations_of;
use crate::engine::recommendation::least_recently_used;
use crate::engine::{
    aggregate_sessions, compute_progression, list_recommendations, recommend_next_exercise,
    DifficultyTier, EngineConfig, EngineError, ExerciseAttempt, ExerciseType, MasteryStore,
    MasteryUpdater, NextExercise, ProgressionSnapshot, RecommendationEntry, Session,
    SessionAccounting, SessionSummary,
};
use crate::storage::{ErrorCategoryReport, LearnerStorage, SessionListing, StorageError};

/// Grammar id used when the curriculum offers nothing to target.
pub const GENERAL_GRAMMAR_ID: &str = "general";

/// How the caller wants the next exercise chosen.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExerciseChoice<'a> {
    pub exercise_type: Option<&'a str>,
    pub difficulty: Option<&'a str>,
    pub auto: bool,
}

impl<'a> ExerciseChoice<'a> {
    pub fn auto() -> Self {
        Self { auto: true, ..Self::default() }
    }

    pub fn of_type(exercise_type: &'a str) -> Self {
        Self { exercise_type: Some(exercise_type), ..Self::default() }
    }

    pub fn at_difficulty(difficulty: &'a str) -> Self {
        Self { difficulty: Some(difficulty), ..Self::default() }
    }
}

#[derive(Debug, Error)]
pub enum PracticeError {
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Collaborator(#[from] CollaboratorError),
    #[error("unknown or already answered exercise: {0}")]
    UnknownExercise(String),
    #[error("no session has ended yet")]
    NoSummary,
    #[error("{0}")]
    Invalid(String),
}

pub type PracticeResult<T> = Result<T, PracticeError>;

#[derive(Debug, Clone, Serialize)]
pub struct GeneratedExercise {
    pub exercise: Exercise,
    pub selection: NextExercise,
    pub generator: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnswerResult {
    pub exercise_id: String,
    pub exercise_type: ExerciseType,
    pub tier: DifficultyTier,
    pub is_correct: bool,
    pub user_answer: Answer,
    pub corrected_answer: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filled_sentence: Option<String>,
    pub error_analysis: Vec<String>,
    pub explanation_summary: String,
    pub grammar_focus: Vec<String>,
    pub newly_mastered: Vec<String>,
    pub session_total: usize,
    pub session_correct: usize,
}

pub struct PracticeService {
    config: EngineConfig,
    curriculum: Curriculum,
    storage: Arc<dyn LearnerStorage>,
    collaborators: Collaborators,
    vocabulary: Vocabulary,
    vocab_per_exercise: usize,
    writer: tokio::sync::Mutex<()>,
    store: RwLock<MasteryStore>,
    session: Mutex<SessionAccounting>,
    pending: Mutex<HashMap<String, Exercise>>,
    answered: Mutex<Vec<Exercise>>,
}

impl PracticeService {
    pub fn new(
        config: EngineConfig,
        curriculum: Curriculum,
        storage: Arc<dyn LearnerStorage>,
        collaborators: Collaborators,
    ) -> Result<Self, StorageError> {
        let store = storage.load_mastery()?;
        info!(
            grammar_points = store.grammar_ids().count(),
            curriculum = curriculum.len(),
            generator = collaborators.generator.name(),
            judge = collaborators.judge.name(),
            "practice service ready"
        );
        Ok(Self {
            config,
            curriculum,
            storage,
            collaborators,
            vocabulary: Vocabulary::empty(),
            vocab_per_exercise: 0,
            writer: tokio::sync::Mutex::new(()),
            store: RwLock::new(store),
            session: Mutex::new(SessionAccounting::new()),
            pending: Mutex::new(HashMap::new()),
            answered: Mutex::new(Vec::new()),
        })
    }

    pub fn with_vocabulary(mut self, vocabulary: Vocabulary, per_exercise: usize) -> Self {
        self.vocabulary = vocabulary;
        self.vocab_per_exercise = per_exercise;
        self
    }

    pub fn engine_config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn curriculum(&self) -> &Curriculum {
        &self.curriculum
    }

    pub fn collaborators(&self) -> &Collaborators {
        &self.collaborators
    }

    pub fn vocabulary(&self) -> &Vocabulary {
        &self.vocabulary
    }

    pub fn store_version(&self) -> u64 {
        self.store.read().version()
    }

    /// Runs a storage call on the blocking pool.
    async fn on_storage<T, F>(&self, task: F) -> Result<T, StorageError>
    where
        T: Send + 'static,
        F: FnOnce(&dyn LearnerStorage) -> Result<T, StorageError> + Send + 'static,
    {
        let storage = Arc::clone(&self.storage);
        tokio::task::spawn_blocking(move || task(storage.as_ref()))
            .await
            .map_err(|err| StorageError::Background(err.to_string()))?
    }

    fn updater(&self) -> MasteryUpdater<'_> {
        let updater = MasteryUpdater::new(&self.config);
        if self.curriculum.is_empty() {
            updater
        } else {
            updater.with_catalog(&self.curriculum)
        }
    }

    pub async fn start_session(&self) -> PracticeResult<Session> {
        let _writer = self.writer.lock().await;
        let mut session = self.session.lock();
        let started = session.start(Utc::now())?.clone();
        self.pending.lock().clear();
        self.answered.lock().clear();
        Ok(started)
    }

    pub fn current_session(&self) -> Option<Session> {
        self.session.lock().active().cloned()
    }

    pub fn is_session_active(&self) -> bool {
        self.session.lock().is_active()
    }

    /// Ends the active session and appends it to the session log. If error
    /// labeling or the log write fails the session stays active.
    pub async fn end_session(&self) -> PracticeResult<SessionSummary> {
        let _writer = self.writer.lock().await;
        let explanations: Vec<String> = {
            let session = self.session.lock();
            let active = session.active().ok_or(EngineError::NoActiveSession)?;
            active.attempts.iter().flat_map(explanations_of).collect()
        };

        let labels = self.collaborators.labeler.prepare(&explanations).await?;

        let (next, record) = {
            let mut next = self.session.lock().clone();
            let record = next.end(Utc::now(), &labels, &self.config)?;
            (next, record)
        };
        let record = self
            .on_storage(move |storage| storage.append_session(&record).map(|()| record))
            .await?;

        *self.session.lock() = next;
        info!(
            session_id = %record.summary.session_id,
            total = record.summary.total_exercises,
            "session logged"
        );
        self.pending.lock().clear();
        self.answered.lock().clear();
        Ok(record.summary)
    }

    pub fn latest_summary(&self) -> PracticeResult<SessionSummary> {
        self.storage
            .load_sessions()?
            .pop()
            .map(|record| record.summary)
            .ok_or(PracticeError::NoSummary)
    }

    pub fn session_history(&self) -> PracticeResult<Vec<SessionListing>> {
        Ok(self.storage.list_sessions()?)
    }

    pub fn progression(&self) -> ProgressionSnapshot {
        compute_progression(&self.store.read(), &self.config)
    }

    pub fn recommendations(&self) -> Vec<RecommendationEntry> {
        list_recommendations(&self.progression(), &self.config)
    }

    pub fn next_recommendation(&self) -> NextExercise {
        let history = self.active_attempts().unwrap_or_default();
        let snapshot = self.progression();
        recommend_next_exercise(&snapshot, &history, &self.curriculum.ids(), &self.config)
    }

    fn active_attempts(&self) -> Option<Vec<ExerciseAttempt>> {
        self.session.lock().active().map(|s| s.attempts.clone())
    }

    /// Generates an exercise for the active session. With `auto`, or with
    /// neither a type nor a difficulty, the recommendation engine picks type
    /// and grammar point. An explicit type or difficulty overrides only the
    /// type; the grammar point still comes from the recommendation.
    pub async fn new_exercise(&self, choice: ExerciseChoice<'_>) -> PracticeResult<GeneratedExercise> {
        let given = |raw: Option<&str>| {
            raw.map(str::trim)
                .filter(|value| !value.is_empty() && !choice.auto)
                .map(str::to_string)
        };
        let requested_type = match given(choice.exercise_type) {
            Some(raw) => Some(raw.parse::<ExerciseType>()?),
            None => None,
        };
        let requested_tier = match given(choice.difficulty) {
            Some(raw) => Some(raw.parse::<DifficultyTier>()?),
            None => None,
        };
        if let (Some(exercise_type), Some(tier)) = (requested_type, requested_tier) {
            if exercise_type.tier() != tier {
                return Err(PracticeError::Invalid(format!(
                    "{exercise_type} is a {} exercise, not {tier}",
                    exercise_type.tier()
                )));
            }
        }

        let (session_id, history) = {
            let session = self.session.lock();
            let active = session.active().ok_or(EngineError::NoActiveSession)?;
            (active.session_id.clone(), active.attempts.clone())
        };
        let recent = self.answered.lock().clone();

        let snapshot = self.progression();
        let mut selection =
            recommend_next_exercise(&snapshot, &history, &self.curriculum.ids(), &self.config);
        let overridden = match (requested_type, requested_tier) {
            (Some(exercise_type), _) => Some((exercise_type, exercise_type.to_string())),
            (None, Some(tier)) => Some((least_recently_used(tier, &history), tier.to_string())),
            (None, None) => None,
        };
        if let Some((exercise_type, requested)) = overridden {
            selection.explanation =
                format!("{requested} requested; grammar point: {}", selection.explanation);
            selection.exercise_type = exercise_type;
            selection.difficulty_level = exercise_type.tier();
        }

        let target = selection
            .grammar_id
            .as_deref()
            .and_then(|id| self.curriculum.get(id))
            .cloned()
            .unwrap_or_else(|| GrammarPoint {
                id: selection
                    .grammar_id
                    .clone()
                    .unwrap_or_else(|| GENERAL_GRAMMAR_ID.to_string()),
                description: String::new(),
            });

        let recent_words: Vec<String> = recent
            .iter()
            .flat_map(|exercise| exercise.target_vocab.iter().cloned())
            .collect();
        let target_vocab = self.vocabulary.select_targets(
            self.curriculum.level(),
            &recent_words,
            self.vocab_per_exercise,
        );

        let request = GenerationRequest {
            exercise_type: selection.exercise_type,
            target: &target,
            curriculum: &self.curriculum,
            target_vocab: &target_vocab,
            recent: &recent,
            now: Utc::now(),
        };
        let exercise = self
            .collaborators
            .generator
            .generate(&request)
            .await
            .map_err(|err| {
                warn!(exercise_type = %selection.exercise_type, error = %err, "exercise generation failed");
                err
            })?;

        {
            let session = self.session.lock();
            match session.active() {
                Some(active) if active.session_id == session_id => {
                    self.pending
                        .lock()
                        .insert(exercise.exercise_id.clone(), exercise.clone());
                }
                _ => return Err(EngineError::NoActiveSession.into()),
            }
        }

        debug!(
            exercise_id = %exercise.exercise_id,
            exercise_type = %selection.exercise_type,
            grammar_id = %target.id,
            target_vocab = ?exercise.target_vocab,
            reason = ?selection.reason,
            "exercise generated"
        );
        Ok(GeneratedExercise {
            exercise,
            selection,
            generator: self.collaborators.generator.name(),
        })
    }

    /// Judges an answer to a pending exercise, records the attempt and
    /// flushes the Mastery Store before the new state becomes visible.
    pub async fn answer(&self, exercise_id: &str, user_answer: Answer) -> PracticeResult<AnswerResult> {
        if user_answer.is_blank() {
            return Err(PracticeError::Invalid("user_answer must not be empty".to_string()));
        }

        let exercise = {
            let session = self.session.lock();
            if !session.is_active() {
                return Err(EngineError::NoActiveSession.into());
            }
            self.pending
                .lock()
                .get(exercise_id)
                .cloned()
                .ok_or_else(|| PracticeError::UnknownExercise(exercise_id.to_string()))?
        };

        let evaluation = self
            .collaborators
            .judge
            .evaluate(&exercise, &user_answer)
            .await?;

        let explanation = Some(evaluation.explanation_summary.trim().to_string())
            .filter(|s| !evaluation.is_correct && !s.is_empty());
        let attempt = ExerciseAttempt::new(
            exercise.exercise_id.clone(),
            exercise.exercise_type(),
            exercise.grammar_focus.clone(),
            evaluation.is_correct,
            Utc::now(),
        )
        .with_errors(explanation, evaluation.error_analysis.clone());

        let _writer = self.writer.lock().await;
        let (next_session, next_store, outcome) = {
            let session = self.session.lock();
            if !self.pending.lock().contains_key(exercise_id) {
                return Err(PracticeError::UnknownExercise(exercise_id.to_string()));
            }

            let mut next_session = session.clone();
            let mut next_store = self.store.read().clone();
            let outcome = next_session.record_attempt(attempt, &mut next_store, &self.updater())?;
            (next_session, next_store, outcome)
        };
        let next_store = self
            .on_storage(move |storage| storage.save_mastery(&next_store).map(|()| next_store))
            .await?;

        let (session_total, session_correct) = {
            let mut session = self.session.lock();
            *self.store.write() = next_store;
            *session = next_session;
            self.pending.lock().remove(exercise_id);
            self.answered.lock().push(exercise.clone());

            session
                .active()
                .map(|s| (s.attempts.len(), s.correct_count()))
                .unwrap_or_default()
        };

        let filled_sentence = match exercise.body {
            ExerciseBody::FillInBlank | ExerciseBody::FillMultipleBlanks => {
                Some(build_filled_sentence(&exercise.prompt, &user_answer))
            }
            _ => None,
        };

        Ok(AnswerResult {
            exercise_id: exercise.exercise_id.clone(),
            exercise_type: exercise.exercise_type(),
            tier: outcome.tier,
            is_correct: evaluation.is_correct,
            user_answer,
            corrected_answer: evaluation.corrected_answer,
            filled_sentence,
            error_analysis: evaluation.error_analysis,
            explanation_summary: evaluation.explanation_summary,
            grammar_focus: exercise.grammar_focus,
            newly_mastered: outcome.newly_mastered,
            session_total,
            session_correct,
        })
    }

    /// Re-runs error aggregation over the whole session log and replaces the
    /// stored error-category artifact.
    pub async fn aggregate_errors(&self) -> PracticeResult<ErrorCategoryReport> {
        let sessions = self.on_storage(|storage| storage.load_sessions()).await?;
        let explanations: Vec<String> = sessions
            .iter()
            .flat_map(|record| record.session.attempts.iter())
            .flat_map(explanations_of)
            .collect();

        let labels = self.collaborators.labeler.prepare(&explanations).await?;
        let categories =
            aggregate_sessions(&sessions, &labels, self.config.max_examples_per_category)?;
        let report = ErrorCategoryReport {
            generated_at: Utc::now(),
            sessions_analyzed: sessions.len(),
            categories,
        };
        let report = self
            .on_storage(move |storage| storage.save_error_categories(&report).map(|()| report))
            .await?;
        info!(
            sessions = report.sessions_analyzed,
            categories = report.categories.len(),
            "error categories aggregated"
        );
        Ok(report)
    }

    pub fn error_categories(&self) -> PracticeResult<Option<ErrorCategoryReport>> {
        Ok(self.storage.load_error_categories()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{SessionRecord, SessionType};
    use crate::storage::{InMemoryStorage, StorageResult};

    fn curriculum() -> Curriculum {
        Curriculum::from_json_str(
            r#"{"levels": {"beginner": {"grammar_points": [
                {"id": "topic_particle", "description": "topic marker"},
                {"id": "object_particle", "description": "object marker"}
            ]}}}"#,
            "beginner",
        )
        .unwrap()
    }

    fn service_over(storage: Arc<dyn LearnerStorage>) -> PracticeService {
        PracticeService::new(EngineConfig::default(), curriculum(), storage, Collaborators::offline())
            .unwrap()
    }

    fn service() -> PracticeService {
        service_over(Arc::new(InMemoryStorage::new()))
    }

    /// Reads work, every mastery write is refused.
    struct ReadOnlyMastery(InMemoryStorage);

    impl LearnerStorage for ReadOnlyMastery {
        fn load_mastery(&self) -> StorageResult<MasteryStore> {
            self.0.load_mastery()
        }
        fn save_mastery(&self, _store: &MasteryStore) -> StorageResult<()> {
            Err(std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only").into())
        }
        fn append_session(&self, record: &SessionRecord) -> StorageResult<()> {
            self.0.append_session(record)
        }
        fn load_sessions(&self) -> StorageResult<Vec<SessionRecord>> {
            self.0.load_sessions()
        }
        fn save_error_categories(&self, report: &ErrorCategoryReport) -> StorageResult<()> {
            self.0.save_error_categories(report)
        }
        fn load_error_categories(&self) -> StorageResult<Option<ErrorCategoryReport>> {
            self.0.load_error_categories()
        }
    }

    #[tokio::test]
    async fn test_exercise_requires_active_session() {
        let service = service();
        let err = service.new_exercise(ExerciseChoice::auto()).await.unwrap_err();
        assert!(matches!(err, PracticeError::Engine(EngineError::NoActiveSession)));
    }

    #[tokio::test]
    async fn test_answer_flow_updates_store_and_session() {
        let service = service();
        service.start_session().await.unwrap();

        let generated = service.new_exercise(ExerciseChoice::of_type("fill_in_blank")).await.unwrap();
        assert_eq!(generated.exercise.exercise_type(), ExerciseType::FillInBlank);
        let expected = generated.exercise.expected_answer.clone();
        let id = generated.exercise.exercise_id.clone();

        let result = service.answer(&id, expected).await.unwrap();
        assert!(result.is_correct);
        assert_eq!(result.tier, DifficultyTier::GuidedProduction);
        assert_eq!((result.session_total, result.session_correct), (1, 1));
        assert_eq!(service.store_version(), 1);

        let again = service.answer(&id, Answer::Single("x".into())).await.unwrap_err();
        assert!(matches!(again, PracticeError::UnknownExercise(_)));

        let summary = service.end_session().await.unwrap();
        assert_eq!(summary.total_exercises, 1);
        assert_eq!(summary.session_type, SessionType::Normal);
        assert_eq!(service.latest_summary().unwrap(), summary);
        assert_eq!(service.session_history().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_wrong_answers_feed_error_categories() {
        let service = service();
        service.start_session().await.unwrap();
        for _ in 0..2 {
            let generated = service.new_exercise(ExerciseChoice::of_type("translation")).await.unwrap();
            let result = service
                .answer(&generated.exercise.exercise_id, Answer::Single("nope".into()))
                .await
                .unwrap();
            assert!(!result.is_correct);
        }
        let summary = service.end_session().await.unwrap();
        assert_eq!(summary.error_categories[0].count, 2);

        let report = service.aggregate_errors().await.unwrap();
        assert_eq!(report.sessions_analyzed, 1);
        assert_eq!(report.categories, summary.error_categories);
        assert_eq!(service.error_categories().unwrap(), Some(report));
    }

    #[tokio::test]
    async fn test_invalid_type_and_blank_answer_rejected() {
        let service = service();
        service.start_session().await.unwrap();
        let err = service.new_exercise(ExerciseChoice::of_type("essay")).await.unwrap_err();
        assert!(matches!(err, PracticeError::Engine(EngineError::InvalidExerciseType(_))));

        let err = service.answer("missing", Answer::Single("  ".into())).await.unwrap_err();
        assert!(matches!(err, PracticeError::Invalid(_)));
    }

    #[tokio::test]
    async fn test_difficulty_picks_least_recently_used_type() {
        let service = service();
        service.start_session().await.unwrap();

        let first = service.new_exercise(ExerciseChoice::at_difficulty("RECOGNITION")).await.unwrap();
        assert_eq!(first.exercise.exercise_type(), ExerciseType::MultipleChoice);
        assert_eq!(first.selection.difficulty_level, DifficultyTier::Recognition);
        let expected = first.exercise.expected_answer.clone();
        service.answer(&first.exercise.exercise_id, expected).await.unwrap();

        let second = service.new_exercise(ExerciseChoice::at_difficulty("recognition")).await.unwrap();
        assert_eq!(second.exercise.exercise_type(), ExerciseType::ErrorCorrection);

        let err = service.new_exercise(ExerciseChoice::at_difficulty("EXPERT")).await.unwrap_err();
        assert!(matches!(err, PracticeError::Engine(EngineError::InvalidTier(_))));

        let mismatch = ExerciseChoice {
            exercise_type: Some("fill_in_blank"),
            difficulty: Some("RECOGNITION"),
            auto: false,
        };
        let err = service.new_exercise(mismatch).await.unwrap_err();
        assert!(matches!(err, PracticeError::Invalid(_)));
    }

    #[tokio::test]
    async fn test_target_vocab_rotates_across_exercises() {
        let vocabulary = Vocabulary::from_json_str(
            r#"{
                "학교": { "translation": "school", "frequency_rank": 1, "topik_level": "1" },
                "물": { "translation": "water", "frequency_rank": 2, "topik_level": "1" },
                "친구": { "translation": "friend", "frequency_rank": 3, "topik_level": "1" }
            }"#,
        )
        .unwrap();
        let service = service().with_vocabulary(vocabulary, 2);
        service.start_session().await.unwrap();

        let first = service.new_exercise(ExerciseChoice::of_type("translation")).await.unwrap();
        assert_eq!(first.exercise.target_vocab, vec!["학교", "물"]);
        assert_eq!(first.exercise.glossary["물"], "water");
        let expected = first.exercise.expected_answer.clone();
        service.answer(&first.exercise.exercise_id, expected).await.unwrap();

        let second = service.new_exercise(ExerciseChoice::of_type("translation")).await.unwrap();
        assert_eq!(second.exercise.target_vocab, vec!["친구", "학교"]);
    }

    #[tokio::test]
    async fn test_failed_flush_leaves_state_untouched() {
        let service = service_over(Arc::new(ReadOnlyMastery(InMemoryStorage::new())));
        service.start_session().await.unwrap();
        let generated = service.new_exercise(ExerciseChoice::of_type("fill_in_blank")).await.unwrap();
        let expected = generated.exercise.expected_answer.clone();

        let err = service.answer(&generated.exercise.exercise_id, expected).await.unwrap_err();
        assert!(matches!(err, PracticeError::Storage(StorageError::Io(_))));
        assert_eq!(service.store_version(), 0);
        assert!(service.current_session().unwrap().attempts.is_empty());
        assert!(service.progression().grammar.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_answers_are_serialized() {
        let service = service();
        service.start_session().await.unwrap();
        let a = service.new_exercise(ExerciseChoice::of_type("fill_in_blank")).await.unwrap();
        let b = service.new_exercise(ExerciseChoice::of_type("translation")).await.unwrap();

        let (first, second) = tokio::join!(
            service.answer(&a.exercise.exercise_id, a.exercise.expected_answer.clone()),
            service.answer(&b.exercise.exercise_id, Answer::Single("wrong".into())),
        );
        let mut totals = vec![first.unwrap().session_total, second.unwrap().session_total];
        totals.sort_unstable();
        assert_eq!(totals, vec![1, 2]);
        assert_eq!(service.store_version(), 2);
        assert_eq!(service.current_session().unwrap().attempts.len(), 2);
    }
}
