//! Progression Calculator: a read-only view derived from the Mastery Store.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::config::EngineConfig;
use super::store::{MasteryRecord, MasteryStore};
use super::tier::DifficultyTier;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MasterySnapshot {
    pub reps: u32,
    pub correct: u32,
    pub accuracy: f64,
    pub is_mastered: bool,
    pub last_practiced: Option<DateTime<Utc>>,
}

impl MasterySnapshot {
    fn of(record: &MasteryRecord, config: &EngineConfig) -> Self {
        Self {
            reps: record.reps(),
            correct: record.correct(),
            accuracy: record.accuracy(),
            is_mastered: record.is_mastered(config),
            last_practiced: record.last_practiced(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GrammarProgressionDetail {
    pub grammar_id: String,
    pub current_max_difficulty: DifficultyTier,
    pub can_unlock_next: bool,
    /// Always holds all four tiers; unpractised tiers are zeroed.
    pub mastery_by_difficulty: BTreeMap<DifficultyTier, MasterySnapshot>,
    pub total_reps: u32,
    pub last_practiced: Option<DateTime<Utc>>,
}

impl GrammarProgressionDetail {
    pub fn current(&self) -> &MasterySnapshot {
        &self.mastery_by_difficulty[&self.current_max_difficulty]
    }

    pub fn mastered_tiers(&self) -> usize {
        self.mastery_by_difficulty
            .values()
            .filter(|snapshot| snapshot.is_mastered)
            .count()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TierProgress {
    pub tier: DifficultyTier,
    pub attempted: usize,
    pub mastered: usize,
    pub percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressionSnapshot {
    pub store_version: u64,
    pub total_grammar_points: usize,
    /// Mean over grammar points of mastered tiers / 4, as a percentage
    pub overall_percentage: f64,
    pub mastered_pairs: usize,
    pub attempted_pairs: usize,
    pub tiers: Vec<TierProgress>,
    pub grammar: BTreeMap<String, GrammarProgressionDetail>,
}

impl ProgressionSnapshot {
    pub fn detail(&self, grammar_id: &str) -> Option<&GrammarProgressionDetail> {
        self.grammar.get(grammar_id)
    }
}

pub fn compute_progression(store: &MasteryStore, config: &EngineConfig) -> ProgressionSnapshot {
    let grammar: BTreeMap<String, GrammarProgressionDetail> = store
        .iter()
        .map(|(id, records)| (id.to_string(), grammar_detail(id, records, config)))
        .collect();

    let tiers: Vec<TierProgress> = DifficultyTier::ALL
        .into_iter()
        .map(|tier| {
            let attempted = grammar
                .values()
                .filter(|detail| detail.mastery_by_difficulty[&tier].reps > 0)
                .count();
            let mastered = grammar
                .values()
                .filter(|detail| detail.mastery_by_difficulty[&tier].is_mastered)
                .count();
            TierProgress {
                tier,
                attempted,
                mastered,
                percentage: percentage(mastered, attempted),
            }
        })
        .collect();

    let attempted_pairs = tiers.iter().map(|t| t.attempted).sum();
    let mastered_pairs = tiers.iter().map(|t| t.mastered).sum();
    let overall_percentage = percentage(mastered_pairs, grammar.len() * DifficultyTier::ALL.len());

    ProgressionSnapshot {
        store_version: store.version(),
        total_grammar_points: grammar.len(),
        overall_percentage,
        mastered_pairs,
        attempted_pairs,
        tiers,
        grammar,
    }
}

fn grammar_detail(
    grammar_id: &str,
    records: &BTreeMap<DifficultyTier, MasteryRecord>,
    config: &EngineConfig,
) -> GrammarProgressionDetail {
    let empty = MasteryRecord::default();
    let mastery_by_difficulty: BTreeMap<DifficultyTier, MasterySnapshot> = DifficultyTier::ALL
        .into_iter()
        .map(|tier| {
            let record = records.get(&tier).unwrap_or(&empty);
            (tier, MasterySnapshot::of(record, config))
        })
        .collect();

    let current_max_difficulty = mastery_by_difficulty
        .iter()
        .rev()
        .find(|(_, snapshot)| snapshot.reps > 0)
        .map(|(tier, _)| *tier)
        .unwrap_or(DifficultyTier::LOWEST);

    let can_unlock_next = !current_max_difficulty.is_highest()
        && mastery_by_difficulty[&current_max_difficulty].is_mastered;

    let total_reps = mastery_by_difficulty.values().map(|s| s.reps).sum();
    let last_practiced = mastery_by_difficulty
        .values()
        .filter_map(|s| s.last_practiced)
        .max();

    GrammarProgressionDetail {
        grammar_id: grammar_id.to_string(),
        current_max_difficulty,
        can_unlock_next,
        mastery_by_difficulty,
        total_reps,
        last_practiced,
    }
}

fn percentage(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}
