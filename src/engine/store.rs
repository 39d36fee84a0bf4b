//! Mastery Store and Mastery Updater.
//!
//! The store keeps raw counters per (grammar point, tier). Accuracy and the
//! mastered flag are always derived from `correct`/`reps`, so they cannot
//! drift from the counters they describe.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::config::EngineConfig;
use super::error::EngineError;
use super::tier::DifficultyTier;

const MASTERY_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawMasteryRecord")]
pub struct MasteryRecord {
    reps: u32,
    correct: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_practiced: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
struct RawMasteryRecord {
    reps: u32,
    correct: u32,
    #[serde(default)]
    last_practiced: Option<DateTime<Utc>>,
}

impl TryFrom<RawMasteryRecord> for MasteryRecord {
    type Error = String;

    fn try_from(raw: RawMasteryRecord) -> Result<Self, Self::Error> {
        if raw.correct > raw.reps {
            return Err(format!(
                "mastery record has correct ({}) > reps ({})",
                raw.correct, raw.reps
            ));
        }
        Ok(Self {
            reps: raw.reps,
            correct: raw.correct,
            last_practiced: raw.last_practiced,
        })
    }
}

impl MasteryRecord {
    pub fn reps(&self) -> u32 {
        self.reps
    }

    pub fn correct(&self) -> u32 {
        self.correct
    }

    pub fn last_practiced(&self) -> Option<DateTime<Utc>> {
        self.last_practiced
    }

    pub fn accuracy(&self) -> f64 {
        if self.reps == 0 {
            0.0
        } else {
            self.correct as f64 / self.reps as f64
        }
    }

    pub fn is_mastered(&self, config: &EngineConfig) -> bool {
        self.reps >= config.min_reps
            && self.accuracy() + MASTERY_EPSILON >= config.mastery_threshold
    }

    fn apply(&mut self, is_correct: bool, at: DateTime<Utc>) {
        self.reps = self.reps.saturating_add(1);
        if is_correct {
            self.correct = self.correct.saturating_add(1);
        }
        self.last_practiced = Some(at);
    }
}

/// Per-grammar-point, per-tier counters plus a version bumped on every mutation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MasteryStore {
    #[serde(default)]
    version: u64,
    #[serde(default)]
    records: BTreeMap<String, BTreeMap<DifficultyTier, MasteryRecord>>,
}

impl MasteryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn record(&self, grammar_id: &str, tier: DifficultyTier) -> Option<&MasteryRecord> {
        self.records.get(grammar_id)?.get(&tier)
    }

    pub fn tiers(&self, grammar_id: &str) -> Option<&BTreeMap<DifficultyTier, MasteryRecord>> {
        self.records.get(grammar_id)
    }

    pub fn grammar_ids(&self) -> impl Iterator<Item = &str> {
        self.records.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &BTreeMap<DifficultyTier, MasteryRecord>)> {
        self.records.iter().map(|(id, tiers)| (id.as_str(), tiers))
    }
}

/// Lookup used to reject grammar ids that are not part of the curriculum.
pub trait GrammarCatalog {
    fn contains(&self, grammar_id: &str) -> bool;
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttemptOutcome {
    pub tier: DifficultyTier,
    pub updated: Vec<String>,
    /// Grammar points whose record at `tier` crossed into mastery on this attempt
    pub newly_mastered: Vec<String>,
}

pub struct MasteryUpdater<'a> {
    config: &'a EngineConfig,
    catalog: Option<&'a dyn GrammarCatalog>,
}

impl<'a> MasteryUpdater<'a> {
    pub fn new(config: &'a EngineConfig) -> Self {
        Self { config, catalog: None }
    }

    pub fn with_catalog(mut self, catalog: &'a dyn GrammarCatalog) -> Self {
        self.catalog = Some(catalog);
        self
    }

    /// Applies one judged attempt to every grammar point it targeted.
    ///
    /// All ids are validated before any record is touched, so a rejected call
    /// leaves the store unchanged.
    pub fn record_attempt<I, S>(
        &self,
        store: &mut MasteryStore,
        grammar_ids: I,
        tier: DifficultyTier,
        is_correct: bool,
        at: DateTime<Utc>,
    ) -> Result<AttemptOutcome, EngineError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut ids = BTreeSet::new();
        for raw in grammar_ids {
            let id = raw.as_ref().trim();
            if id.is_empty() {
                return Err(EngineError::EmptyGrammarId);
            }
            if let Some(catalog) = self.catalog {
                if !catalog.contains(id) {
                    return Err(EngineError::UnknownGrammarId(id.to_string()));
                }
            }
            ids.insert(id.to_string());
        }

        let mut outcome = AttemptOutcome {
            tier,
            updated: Vec::with_capacity(ids.len()),
            newly_mastered: Vec::new(),
        };
        if ids.is_empty() {
            return Ok(outcome);
        }

        for id in ids {
            let record = store
                .records
                .entry(id.clone())
                .or_default()
                .entry(tier)
                .or_default();
            let was_mastered = record.is_mastered(self.config);
            record.apply(is_correct, at);
            if !was_mastered && record.is_mastered(self.config) {
                outcome.newly_mastered.push(id.clone());
            }
            tracing::debug!(
                grammar_id = %id,
                tier = %tier,
                reps = record.reps,
                correct = record.correct,
                "mastery record updated"
            );
            outcome.updated.push(id);
        }
        store.version += 1;

        Ok(outcome)
    }
}
