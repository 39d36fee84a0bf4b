//! Session Accounting: `NotStarted -> Active -> Ended`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::config::EngineConfig;
use super::error::EngineError;
use super::error_categories::{aggregate, ErrorCategory, ErrorClassifier};
use super::store::{AttemptOutcome, MasteryStore, MasteryUpdater};
use super::tier::{DifficultyTier, ExerciseType};

const MAIN_ERROR_COUNT: usize = 3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExerciseAttempt {
    pub exercise_id: String,
    pub exercise_type: ExerciseType,
    pub tier: DifficultyTier,
    pub grammar_focus: Vec<String>,
    pub is_correct: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_explanation: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub error_analysis: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

impl ExerciseAttempt {
    pub fn new(
        exercise_id: impl Into<String>,
        exercise_type: ExerciseType,
        grammar_focus: Vec<String>,
        is_correct: bool,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            exercise_id: exercise_id.into(),
            exercise_type,
            tier: exercise_type.tier(),
            grammar_focus,
            is_correct,
            error_explanation: None,
            error_analysis: Vec::new(),
            timestamp,
        }
    }

    pub fn with_errors(mut self, explanation: Option<String>, analysis: Vec<String>) -> Self {
        self.error_explanation = explanation;
        self.error_analysis = analysis;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Active,
    Ended,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionType {
    Empty,
    Normal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub session_id: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub status: SessionStatus,
    pub attempts: Vec<ExerciseAttempt>,
    /// Grammar/tier pairs that became mastered during this session
    #[serde(default)]
    pub promotions: u32,
}

impl Session {
    fn start(started_at: DateTime<Utc>) -> Self {
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        Self {
            session_id: format!(
                "session_{}_{}",
                started_at.format("%Y_%m_%d_%H%M%S"),
                &suffix[..8]
            ),
            started_at,
            ended_at: None,
            status: SessionStatus::Active,
            attempts: Vec::new(),
            promotions: 0,
        }
    }

    pub fn correct_count(&self) -> usize {
        self.attempts.iter().filter(|a| a.is_correct).count()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub duration_minutes: i64,
    pub total_exercises: usize,
    pub correct_exercises: usize,
    /// Percentage rounded to one decimal; 0 for empty sessions
    pub accuracy_rate: f64,
    pub session_type: SessionType,
    pub error_categories: Vec<ErrorCategory>,
    pub main_errors: Vec<String>,
    pub promotions: u32,
}

/// An ended session as written to the session log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub session: Session,
    pub summary: SessionSummary,
}

#[derive(Debug, Clone, Default)]
enum AccountingState {
    #[default]
    NotStarted,
    Active(Session),
    Ended(Session),
}

#[derive(Debug, Clone, Default)]
pub struct SessionAccounting {
    state: AccountingState,
}

impl SessionAccounting {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        matches!(self.state, AccountingState::Active(_))
    }

    pub fn active(&self) -> Option<&Session> {
        match &self.state {
            AccountingState::Active(session) => Some(session),
            _ => None,
        }
    }

    pub fn last_ended(&self) -> Option<&Session> {
        match &self.state {
            AccountingState::Ended(session) => Some(session),
            _ => None,
        }
    }

    pub fn start(&mut self, now: DateTime<Utc>) -> Result<&Session, EngineError> {
        if self.is_active() {
            return Err(EngineError::AlreadyActive);
        }
        let session = Session::start(now);
        tracing::info!(session_id = %session.session_id, "session started");
        self.state = AccountingState::Active(session);
        match &self.state {
            AccountingState::Active(session) => Ok(session),
            _ => Err(EngineError::NoActiveSession),
        }
    }

    /// Appends a judged attempt and forwards it to the Mastery Updater.
    ///
    /// Nothing is appended when the updater rejects the attempt.
    pub fn record_attempt(
        &mut self,
        attempt: ExerciseAttempt,
        store: &mut MasteryStore,
        updater: &MasteryUpdater<'_>,
    ) -> Result<AttemptOutcome, EngineError> {
        let AccountingState::Active(session) = &mut self.state else {
            return Err(EngineError::NoActiveSession);
        };

        let outcome = updater.record_attempt(
            store,
            &attempt.grammar_focus,
            attempt.tier,
            attempt.is_correct,
            attempt.timestamp,
        )?;
        session.promotions += outcome.newly_mastered.len() as u32;
        session.attempts.push(attempt);
        Ok(outcome)
    }

    /// Closes the active session.
    ///
    /// When error aggregation fails the session stays active.
    pub fn end(
        &mut self,
        now: DateTime<Utc>,
        classifier: &dyn ErrorClassifier,
        config: &EngineConfig,
    ) -> Result<SessionRecord, EngineError> {
        let AccountingState::Active(session) = &self.state else {
            return Err(EngineError::NoActiveSession);
        };

        let error_categories = aggregate(
            &session.attempts,
            classifier,
            config.max_examples_per_category,
        )?;

        let mut session = session.clone();
        let ended_at = now.max(session.started_at);
        session.ended_at = Some(ended_at);
        session.status = SessionStatus::Ended;

        let summary = summarize(&session, ended_at, error_categories);
        tracing::info!(
            session_id = %summary.session_id,
            total = summary.total_exercises,
            correct = summary.correct_exercises,
            accuracy_rate = summary.accuracy_rate,
            "session ended"
        );

        self.state = AccountingState::Ended(session.clone());
        Ok(SessionRecord { session, summary })
    }
}

fn summarize(
    session: &Session,
    ended_at: DateTime<Utc>,
    error_categories: Vec<ErrorCategory>,
) -> SessionSummary {
    let total = session.attempts.len();
    let correct = session.correct_count();
    let accuracy_rate = if total == 0 {
        0.0
    } else {
        (correct as f64 / total as f64 * 1000.0).round() / 10.0
    };
    let session_type = if total == 0 {
        SessionType::Empty
    } else {
        SessionType::Normal
    };
    let main_errors = error_categories
        .iter()
        .take(MAIN_ERROR_COUNT)
        .map(|c| c.label.clone())
        .collect();

    SessionSummary {
        session_id: session.session_id.clone(),
        started_at: session.started_at,
        ended_at,
        duration_minutes: (ended_at - session.started_at).num_minutes(),
        total_exercises: total,
        correct_exercises: correct,
        accuracy_rate,
        session_type,
        error_categories,
        main_errors,
        promotions: session.promotions,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::error_categories::KeywordClassifier;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()
    }

    fn attempt(ok: bool, minutes: i64) -> ExerciseAttempt {
        let attempt = ExerciseAttempt::new(
            format!("ex-{minutes}"),
            ExerciseType::FillInBlank,
            vec!["A1".to_string()],
            ok,
            t0() + Duration::minutes(minutes),
        );
        if ok {
            attempt
        } else {
            attempt.with_errors(
                Some("wrong".to_string()),
                vec!["Wrong verb ending".to_string()],
            )
        }
    }

    #[test]
    fn test_state_machine_misuse() {
        let config = EngineConfig::default();
        let classifier = KeywordClassifier::default();
        let mut store = MasteryStore::new();
        let updater = MasteryUpdater::new(&config);
        let mut accounting = SessionAccounting::new();

        assert_eq!(
            accounting.end(t0(), &classifier, &config).unwrap_err(),
            EngineError::NoActiveSession
        );
        assert_eq!(
            accounting
                .record_attempt(attempt(true, 1), &mut store, &updater)
                .unwrap_err(),
            EngineError::NoActiveSession
        );
        assert!(store.is_empty());

        accounting.start(t0()).unwrap();
        assert_eq!(accounting.start(t0()).unwrap_err(), EngineError::AlreadyActive);

        accounting.end(t0(), &classifier, &config).unwrap();
        assert_eq!(
            accounting.end(t0(), &classifier, &config).unwrap_err(),
            EngineError::NoActiveSession
        );
        assert!(accounting.last_ended().is_some());
        assert!(accounting.start(t0()).is_ok());
    }

    #[test]
    fn test_empty_session_summary() {
        let config = EngineConfig::default();
        let mut accounting = SessionAccounting::new();
        accounting.start(t0()).unwrap();

        let record = accounting
            .end(t0() + Duration::minutes(4), &KeywordClassifier::default(), &config)
            .unwrap();
        assert_eq!(record.summary.session_type, SessionType::Empty);
        assert_eq!(record.summary.accuracy_rate, 0.0);
        assert!(record.summary.error_categories.is_empty());
        assert_eq!(record.summary.duration_minutes, 4);
        assert_eq!(record.session.status, SessionStatus::Ended);
    }

    #[test]
    fn test_session_summary_counts_and_forwards_to_store() {
        let config = EngineConfig::default();
        let mut store = MasteryStore::new();
        let updater = MasteryUpdater::new(&config);
        let mut accounting = SessionAccounting::new();
        accounting.start(t0()).unwrap();

        for (i, ok) in [true, false, true, true, true].into_iter().enumerate() {
            accounting
                .record_attempt(attempt(ok, i as i64), &mut store, &updater)
                .unwrap();
        }
        assert_eq!(accounting.active().unwrap().attempts.len(), 5);

        let record = accounting
            .end(
                t0() + Duration::minutes(12) + Duration::seconds(59),
                &KeywordClassifier::default(),
                &config,
            )
            .unwrap();
        let summary = &record.summary;
        assert_eq!(summary.total_exercises, 5);
        assert_eq!(summary.correct_exercises, 4);
        assert_eq!(summary.accuracy_rate, 80.0);
        assert_eq!(summary.duration_minutes, 12);
        assert_eq!(summary.session_type, SessionType::Normal);
        assert_eq!(summary.promotions, 1);
        assert_eq!(summary.main_errors, vec!["verb conjugation".to_string()]);
        assert_eq!(summary.error_categories[0].count, 1);

        let stored = store.record("A1", DifficultyTier::GuidedProduction).unwrap();
        assert_eq!((stored.reps(), stored.correct()), (5, 4));
    }

    #[test]
    fn test_rejected_attempt_not_appended() {
        let config = EngineConfig::default();
        let mut store = MasteryStore::new();
        let updater = MasteryUpdater::new(&config);
        let mut accounting = SessionAccounting::new();
        accounting.start(t0()).unwrap();

        let mut bad = attempt(true, 0);
        bad.grammar_focus = vec![String::new()];
        assert_eq!(
            accounting.record_attempt(bad, &mut store, &updater).unwrap_err(),
            EngineError::EmptyGrammarId
        );
        assert!(accounting.active().unwrap().attempts.is_empty());
    }

    #[test]
    fn test_accuracy_rate_rounding() {
        let config = EngineConfig::default();
        let mut store = MasteryStore::new();
        let updater = MasteryUpdater::new(&config);
        let mut accounting = SessionAccounting::new();
        accounting.start(t0()).unwrap();
        for (i, ok) in [true, false, false].into_iter().enumerate() {
            accounting
                .record_attempt(attempt(ok, i as i64), &mut store, &updater)
                .unwrap();
        }
        let record = accounting
            .end(t0(), &KeywordClassifier::default(), &config)
            .unwrap();
        assert_eq!(record.summary.accuracy_rate, 33.3);
    }
}
