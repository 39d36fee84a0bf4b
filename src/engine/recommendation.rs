//! Recommendation Engine.
//!
//! Two views over a [`ProgressionSnapshot`]:
//! - a ranked list with one entry per practiced grammar point
//! - a single exercise choice for auto mode, which also considers the
//!   curriculum (never-practiced points) and the active session's history

use std::cmp::Ordering;
use std::collections::{BTreeSet, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::config::EngineConfig;
use super::progression::{GrammarProgressionDetail, ProgressionSnapshot};
use super::session::ExerciseAttempt;
use super::tier::{DifficultyTier, ExerciseType};

pub const DEFAULT_EXPLANATION: &str = "default starting exercise";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Medium,
    Low,
}

/// Why a grammar point got its priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationReason {
    ReadyToAdvance,
    Reinforce,
    Struggling,
    InsufficientData,
    TopTierMastered,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecommendationEntry {
    pub grammar_id: String,
    pub recommended_tier: DifficultyTier,
    pub priority: Priority,
    pub reason: RecommendationReason,
    pub recommendation: String,
    pub last_practiced: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionReason {
    Advancing,
    Reinforcing,
    ColdStart,
    Default,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NextExercise {
    pub exercise_type: ExerciseType,
    pub difficulty_level: DifficultyTier,
    pub explanation: String,
    pub grammar_id: Option<String>,
    pub reason: SelectionReason,
}

impl NextExercise {
    pub fn default_with(explanation: impl Into<String>) -> Self {
        Self {
            exercise_type: ExerciseType::FillInBlank,
            difficulty_level: DifficultyTier::GuidedProduction,
            explanation: explanation.into(),
            grammar_id: None,
            reason: SelectionReason::Default,
        }
    }
}

impl Default for NextExercise {
    fn default() -> Self {
        Self::default_with(DEFAULT_EXPLANATION)
    }
}

pub fn classify(
    detail: &GrammarProgressionDetail,
    config: &EngineConfig,
) -> (Priority, DifficultyTier, RecommendationReason) {
    let tier = detail.current_max_difficulty;
    let current = detail.current();

    if detail.can_unlock_next {
        let next = tier.next().unwrap_or(tier);
        return (Priority::High, next, RecommendationReason::ReadyToAdvance);
    }
    if current.is_mastered {
        return (Priority::Low, tier, RecommendationReason::TopTierMastered);
    }
    if current.reps < config.min_reps {
        return (Priority::Low, tier, RecommendationReason::InsufficientData);
    }
    if current.accuracy < config.struggling_floor {
        let easier = tier.previous().unwrap_or(tier);
        return (Priority::Medium, easier, RecommendationReason::Struggling);
    }
    (Priority::Medium, tier, RecommendationReason::Reinforce)
}

fn describe(
    detail: &GrammarProgressionDetail,
    recommended: DifficultyTier,
    reason: RecommendationReason,
    config: &EngineConfig,
) -> String {
    let current = detail.current();
    let tier = detail.current_max_difficulty;
    match reason {
        RecommendationReason::ReadyToAdvance => format!(
            "{tier} mastered ({:.0}% over {} attempts); move on to {recommended}",
            current.accuracy * 100.0,
            current.reps
        ),
        RecommendationReason::TopTierMastered => {
            format!("{tier} mastered; keep it fresh with occasional review")
        }
        RecommendationReason::InsufficientData => format!(
            "{} of {} attempts needed at {tier} before mastery can be judged",
            current.reps, config.min_reps
        ),
        RecommendationReason::Struggling => format!(
            "accuracy {:.0}% at {tier} is low; rebuild at {recommended}",
            current.accuracy * 100.0
        ),
        RecommendationReason::Reinforce => format!(
            "accuracy {:.0}% at {tier} is below the {:.0}% mastery threshold; keep practicing",
            current.accuracy * 100.0,
            config.mastery_threshold * 100.0
        ),
    }
}

/// Older (or missing) timestamps sort first.
fn staleness(a: Option<DateTime<Utc>>, b: Option<DateTime<Utc>>) -> Ordering {
    a.cmp(&b)
}

pub fn list_recommendations(
    snapshot: &ProgressionSnapshot,
    config: &EngineConfig,
) -> Vec<RecommendationEntry> {
    let mut entries: Vec<RecommendationEntry> = snapshot
        .grammar
        .values()
        .filter(|detail| detail.total_reps > 0)
        .map(|detail| {
            let (priority, recommended_tier, reason) = classify(detail, config);
            RecommendationEntry {
                grammar_id: detail.grammar_id.clone(),
                recommended_tier,
                priority,
                reason,
                recommendation: describe(detail, recommended_tier, reason, config),
                last_practiced: detail.last_practiced,
            }
        })
        .collect();

    entries.sort_by(|a, b| {
        a.priority
            .cmp(&b.priority)
            .then_with(|| staleness(a.last_practiced, b.last_practiced))
            .then_with(|| a.grammar_id.cmp(&b.grammar_id))
    });
    entries
}

struct Candidate<'a> {
    grammar_id: &'a str,
    detail: Option<&'a GrammarProgressionDetail>,
}

impl Candidate<'_> {
    fn last_practiced(&self) -> Option<DateTime<Utc>> {
        self.detail.and_then(|d| d.last_practiced)
    }

    fn total_reps(&self) -> u32 {
        self.detail.map(|d| d.total_reps).unwrap_or(0)
    }

    fn stalest_cmp(&self, other: &Self) -> Ordering {
        staleness(self.last_practiced(), other.last_practiced())
            .then_with(|| self.grammar_id.cmp(other.grammar_id))
    }
}

/// Picks one grammar point, tier and exercise type for auto mode.
///
/// `recent_history` is the active session's attempts in chronological order;
/// `curriculum` lists every grammar id the learner can be assigned.
pub fn recommend_next_exercise<S: AsRef<str>>(
    snapshot: &ProgressionSnapshot,
    recent_history: &[ExerciseAttempt],
    curriculum: &[S],
    config: &EngineConfig,
) -> NextExercise {
    let all_ids: BTreeSet<&str> = curriculum
        .iter()
        .map(|id| id.as_ref().trim())
        .filter(|id| !id.is_empty())
        .collect();
    if all_ids.is_empty() {
        return NextExercise::default_with(format!(
            "{DEFAULT_EXPLANATION} (curriculum is empty)"
        ));
    }

    let cooling: HashSet<&str> = recent_history
        .iter()
        .rev()
        .take(config.cooldown_attempts)
        .flat_map(|attempt| attempt.grammar_focus.iter().map(String::as_str))
        .collect();
    let mut pool: Vec<Candidate> = all_ids
        .iter()
        .filter(|id| !cooling.contains(**id))
        .map(|id| Candidate {
            grammar_id: id,
            detail: snapshot.detail(id),
        })
        .collect();
    if pool.is_empty() {
        pool = all_ids
            .iter()
            .map(|id| Candidate {
                grammar_id: id,
                detail: snapshot.detail(id),
            })
            .collect();
    }

    let advancing = pool
        .iter()
        .filter(|c| c.detail.is_some_and(|d| d.can_unlock_next))
        .min_by(|a, b| a.stalest_cmp(b));
    if let Some(candidate) = advancing {
        if let Some(detail) = candidate.detail {
            let (_, tier, _) = classify(detail, config);
            return build_choice(
                candidate.grammar_id,
                tier,
                SelectionReason::Advancing,
                format!(
                    "advancing '{}' to {tier}: {} is mastered",
                    candidate.grammar_id, detail.current_max_difficulty
                ),
                recent_history,
            );
        }
    }

    let reinforcing = pool
        .iter()
        .filter(|c| {
            c.detail
                .is_some_and(|d| classify(d, config).0 == Priority::Medium)
        })
        .min_by(|a, b| a.stalest_cmp(b));
    if let Some(candidate) = reinforcing {
        if let Some(detail) = candidate.detail {
            let (_, tier, _) = classify(detail, config);
            return build_choice(
                candidate.grammar_id,
                tier,
                SelectionReason::Reinforcing,
                format!(
                    "reinforcing '{}' at {tier}: accuracy {:.0}% is below {:.0}%",
                    candidate.grammar_id,
                    detail.current().accuracy * 100.0,
                    config.mastery_threshold * 100.0
                ),
                recent_history,
            );
        }
    }

    let least_practiced = pool.iter().min_by(|a, b| {
        a.total_reps()
            .cmp(&b.total_reps())
            .then_with(|| a.stalest_cmp(b))
    });
    match least_practiced {
        Some(candidate) => {
            let tier = candidate
                .detail
                .map(|d| classify(d, config).1)
                .unwrap_or(DifficultyTier::LOWEST);
            build_choice(
                candidate.grammar_id,
                tier,
                SelectionReason::ColdStart,
                format!(
                    "starting '{}' at {tier}: least practiced grammar point ({} attempts so far)",
                    candidate.grammar_id,
                    candidate.total_reps()
                ),
                recent_history,
            )
        }
        None => NextExercise::default(),
    }
}

fn build_choice(
    grammar_id: &str,
    tier: DifficultyTier,
    reason: SelectionReason,
    explanation: String,
    recent_history: &[ExerciseAttempt],
) -> NextExercise {
    let exercise_type = least_recently_used(tier, recent_history);
    tracing::debug!(
        grammar_id,
        tier = %tier,
        exercise_type = %exercise_type,
        ?reason,
        "next exercise selected"
    );
    NextExercise {
        exercise_type,
        difficulty_level: tier,
        explanation,
        grammar_id: Some(grammar_id.to_string()),
        reason,
    }
}

/// Unused types win in table order; otherwise the one used longest ago.
pub fn least_recently_used(tier: DifficultyTier, recent_history: &[ExerciseAttempt]) -> ExerciseType {
    let options = tier.exercise_types();
    let last_used = |kind: ExerciseType| {
        recent_history
            .iter()
            .rposition(|attempt| attempt.exercise_type == kind)
    };
    options
        .iter()
        .copied()
        .min_by_key(|kind| match last_used(*kind) {
            None => (0, 0),
            Some(index) => (1, index + 1),
        })
        .unwrap_or(ExerciseType::FillInBlank)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::progression::compute_progression;
    use crate::engine::store::{MasteryStore, MasteryUpdater};
    use chrono::TimeZone;

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, hour, 0, 0).unwrap()
    }

    fn record(store: &mut MasteryStore, id: &str, tier: DifficultyTier, results: &[bool], hour: u32) {
        let config = EngineConfig::default();
        let updater = MasteryUpdater::new(&config);
        for &ok in results {
            updater.record_attempt(store, [id], tier, ok, at(hour)).unwrap();
        }
    }

    fn attempt(kind: ExerciseType, grammar: &str) -> ExerciseAttempt {
        ExerciseAttempt::new("ex", kind, vec![grammar.to_string()], true, at(12))
    }

    #[test]
    fn test_insufficient_data_is_low_priority() {
        let mut store = MasteryStore::new();
        record(&mut store, "A2", DifficultyTier::Recognition, &[true, false, false], 9);

        let config = EngineConfig::default();
        let entries = list_recommendations(&compute_progression(&store, &config), &config);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].priority, Priority::Low);
        assert_eq!(entries[0].reason, RecommendationReason::InsufficientData);
        assert_eq!(entries[0].recommended_tier, DifficultyTier::Recognition);
    }

    #[test]
    fn test_ordering_priority_then_staleness_then_id() {
        let mut store = MasteryStore::new();
        // low (insufficient data), practiced earliest
        record(&mut store, "L", DifficultyTier::Recognition, &[true], 1);
        // high, practiced late
        record(&mut store, "H2", DifficultyTier::Recognition, &[true; 5], 8);
        // high, practiced early
        record(&mut store, "H1", DifficultyTier::Recognition, &[true; 5], 3);
        // medium
        record(&mut store, "M", DifficultyTier::Recognition, &[true, true, true, false, false], 2);
        // two lows with the same timestamp
        record(&mut store, "Z", DifficultyTier::Recognition, &[true], 5);
        record(&mut store, "Y", DifficultyTier::Recognition, &[true], 5);

        let config = EngineConfig::default();
        let entries = list_recommendations(&compute_progression(&store, &config), &config);
        let order: Vec<&str> = entries.iter().map(|e| e.grammar_id.as_str()).collect();
        assert_eq!(order, vec!["H1", "H2", "M", "L", "Y", "Z"]);
        assert_eq!(entries[0].recommended_tier, DifficultyTier::GuidedProduction);
    }

    #[test]
    fn test_struggling_steps_back_a_tier() {
        let mut store = MasteryStore::new();
        record(&mut store, "S", DifficultyTier::GuidedProduction, &[false, false, false, false, true], 1);

        let config = EngineConfig::default();
        let entries = list_recommendations(&compute_progression(&store, &config), &config);
        assert_eq!(entries[0].priority, Priority::Medium);
        assert_eq!(entries[0].reason, RecommendationReason::Struggling);
        assert_eq!(entries[0].recommended_tier, DifficultyTier::Recognition);
    }

    #[test]
    fn test_top_tier_mastery_is_low() {
        let mut store = MasteryStore::new();
        record(&mut store, "T", DifficultyTier::FreeProduction, &[true; 5], 1);

        let config = EngineConfig::default();
        let entries = list_recommendations(&compute_progression(&store, &config), &config);
        assert_eq!(entries[0].priority, Priority::Low);
        assert_eq!(entries[0].reason, RecommendationReason::TopTierMastered);
    }

    #[test]
    fn test_empty_curriculum_returns_default() {
        let config = EngineConfig::default();
        let snapshot = compute_progression(&MasteryStore::new(), &config);
        let empty: [&str; 0] = [];

        let next = recommend_next_exercise(&snapshot, &[], &empty, &config);
        assert_eq!(next.exercise_type, ExerciseType::FillInBlank);
        assert_eq!(next.difficulty_level, DifficultyTier::GuidedProduction);
        assert!(next.explanation.starts_with(DEFAULT_EXPLANATION));
        assert!(next.explanation.contains("curriculum is empty"));
        assert_eq!(next.reason, SelectionReason::Default);
    }

    #[test]
    fn test_prefers_advancing_over_reinforcing() {
        let mut store = MasteryStore::new();
        record(&mut store, "M", DifficultyTier::Recognition, &[true, true, true, false, false], 1);
        record(&mut store, "H", DifficultyTier::GuidedProduction, &[true; 5], 2);

        let config = EngineConfig::default();
        let snapshot = compute_progression(&store, &config);
        let next = recommend_next_exercise(&snapshot, &[], &["M", "H", "N"], &config);
        assert_eq!(next.grammar_id.as_deref(), Some("H"));
        assert_eq!(next.reason, SelectionReason::Advancing);
        assert_eq!(next.difficulty_level, DifficultyTier::StructuredProduction);
        assert_eq!(next.exercise_type, ExerciseType::FillMultipleBlanks);
        assert!(next.explanation.contains("'H'"));
    }

    #[test]
    fn test_cooldown_skips_recently_seen() {
        let mut store = MasteryStore::new();
        record(&mut store, "H", DifficultyTier::Recognition, &[true; 5], 1);
        record(&mut store, "M", DifficultyTier::Recognition, &[true, true, true, false, false], 1);

        let config = EngineConfig::default();
        let snapshot = compute_progression(&store, &config);
        let history = vec![attempt(ExerciseType::MultipleChoice, "H")];
        let next = recommend_next_exercise(&snapshot, &history, &["H", "M"], &config);
        assert_eq!(next.grammar_id.as_deref(), Some("M"));
        assert_eq!(next.reason, SelectionReason::Reinforcing);
        // multiple_choice was just used, so variety picks error_correction
        assert_eq!(next.exercise_type, ExerciseType::ErrorCorrection);
    }

    #[test]
    fn test_cooldown_covering_everything_is_ignored() {
        let config = EngineConfig::default();
        let snapshot = compute_progression(&MasteryStore::new(), &config);
        let history = vec![attempt(ExerciseType::FillInBlank, "only")];
        let next = recommend_next_exercise(&snapshot, &history, &["only"], &config);
        assert_eq!(next.grammar_id.as_deref(), Some("only"));
        assert_eq!(next.reason, SelectionReason::ColdStart);
        assert_eq!(next.difficulty_level, DifficultyTier::Recognition);
    }

    #[test]
    fn test_cold_start_picks_least_practiced() {
        let mut store = MasteryStore::new();
        record(&mut store, "A", DifficultyTier::Recognition, &[true, true], 1);
        record(&mut store, "B", DifficultyTier::Recognition, &[true], 2);

        let config = EngineConfig::default();
        let snapshot = compute_progression(&store, &config);
        let next = recommend_next_exercise(&snapshot, &[], &["A", "B", "C"], &config);
        assert_eq!(next.grammar_id.as_deref(), Some("C"));
        assert_eq!(next.reason, SelectionReason::ColdStart);

        let next = recommend_next_exercise(&snapshot, &[], &["A", "B"], &config);
        assert_eq!(next.grammar_id.as_deref(), Some("B"));
    }

    #[test]
    fn test_least_recently_used_rotation() {
        let history = vec![
            attempt(ExerciseType::ErrorCorrection, "x"),
            attempt(ExerciseType::MultipleChoice, "x"),
        ];
        assert_eq!(
            least_recently_used(DifficultyTier::Recognition, &history),
            ExerciseType::ErrorCorrection
        );
        assert_eq!(
            least_recently_used(DifficultyTier::StructuredProduction, &history),
            ExerciseType::FillMultipleBlanks
        );
    }
}
