//! Vocabulary list used to steer generated exercises.
//!
//! The word file is either a map keyed by word or a list of objects carrying
//! a `vocab` field. Entries are kept in frequency order (ranked words first,
//! most frequent first), so every selection below is deterministic.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VocabEntry {
    pub word: String,
    #[serde(default)]
    pub translation: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequency_rank: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topik_level: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct VocabFields {
    #[serde(default)]
    translation: String,
    #[serde(default)]
    frequency_rank: Option<u32>,
    #[serde(default)]
    topik_level: Option<String>,
    #[serde(default)]
    tags: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ListedWord {
    vocab: String,
    #[serde(flatten)]
    fields: VocabFields,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum VocabFile {
    Keyed(BTreeMap<String, VocabFields>),
    Listed(Vec<ListedWord>),
}

#[derive(Debug, Clone, Default)]
pub struct Vocabulary {
    entries: Vec<VocabEntry>,
}

impl Vocabulary {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Loads the word file. A missing or unreadable file is logged and yields
    /// an empty vocabulary; exercises are then generated without targets.
    pub fn load(path: &Path) -> Self {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "vocabulary not loaded");
                return Self::empty();
            }
        };
        match Self::from_json_str(&raw) {
            Ok(vocabulary) => {
                info!(words = vocabulary.len(), "vocabulary loaded");
                vocabulary
            }
            Err(err) => {
                warn!(path = %path.display(), error = %err, "vocabulary file is not valid JSON");
                Self::empty()
            }
        }
    }

    pub fn from_json_str(raw: &str) -> Result<Self, serde_json::Error> {
        let listed: Vec<(String, VocabFields)> = match serde_json::from_str::<VocabFile>(raw)? {
            VocabFile::Keyed(words) => words.into_iter().collect(),
            VocabFile::Listed(words) => words.into_iter().map(|w| (w.vocab, w.fields)).collect(),
        };

        let mut seen = HashSet::new();
        let mut entries: Vec<VocabEntry> = Vec::with_capacity(listed.len());
        for (word, fields) in listed {
            let word = word.trim().to_string();
            if word.is_empty() || !seen.insert(word.clone()) {
                continue;
            }
            entries.push(VocabEntry {
                word,
                translation: fields.translation.trim().to_string(),
                frequency_rank: fields.frequency_rank,
                topik_level: fields.topik_level.filter(|l| !l.trim().is_empty()),
                tags: fields.tags.filter(|t| !t.trim().is_empty()),
            });
        }
        entries.sort_by(|a, b| {
            frequency_key(a)
                .cmp(&frequency_key(b))
                .then_with(|| a.word.cmp(&b.word))
        });
        Ok(Self { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, word: &str) -> Option<&VocabEntry> {
        self.entries.iter().find(|e| e.word == word)
    }

    /// Ranked words only, most frequent first.
    pub fn by_frequency(&self, limit: usize) -> Vec<&VocabEntry> {
        self.entries
            .iter()
            .filter(|e| e.frequency_rank.is_some())
            .take(limit)
            .collect()
    }

    /// Words suited to a curriculum level, most frequent first. Unknown levels
    /// are treated as beginner.
    pub fn words_for_level<'a>(
        &'a self,
        level: &str,
        exclude: &HashSet<&str>,
        limit: usize,
    ) -> Vec<&'a VocabEntry> {
        let (topik_levels, tags) = level_filter(level);
        self.entries
            .iter()
            .filter(|e| !exclude.contains(e.word.as_str()))
            .filter(|e| {
                let topik = e.topik_level.as_deref().map(str::trim).unwrap_or_default();
                let tag = e.tags.as_deref().map(str::trim).unwrap_or_default();
                (!topik.is_empty() && topik_levels.iter().any(|l| topik.starts_with(l)))
                    || tags.contains(&tag)
            })
            .take(limit)
            .collect()
    }

    /// Most frequent words not in `exclude`.
    pub fn new_words<'a>(&'a self, exclude: &HashSet<&str>, limit: usize) -> Vec<&'a VocabEntry> {
        self.entries
            .iter()
            .filter(|e| !exclude.contains(e.word.as_str()))
            .take(limit)
            .collect()
    }

    /// Picks the target words for the next exercise: level words not used
    /// recently, then other unused words by frequency, then recently used
    /// level words once the pool is exhausted.
    pub fn select_targets(&self, level: &str, recently_used: &[String], limit: usize) -> Vec<VocabEntry> {
        let recent: HashSet<&str> = recently_used.iter().map(String::as_str).collect();
        let mut picked: Vec<&VocabEntry> = self.words_for_level(level, &recent, limit);

        if picked.len() < limit {
            let mut exclude = recent.clone();
            exclude.extend(picked.iter().copied().map(|e| e.word.as_str()));
            picked.extend(self.new_words(&exclude, limit - picked.len()));
        }
        if picked.len() < limit {
            let taken: HashSet<&str> = picked.iter().copied().map(|e| e.word.as_str()).collect();
            picked.extend(self.words_for_level(level, &taken, limit - picked.len()));
        }
        picked.into_iter().cloned().collect()
    }
}

fn frequency_key(entry: &VocabEntry) -> (bool, u32) {
    match entry.frequency_rank {
        Some(rank) => (false, rank),
        None => (true, 0),
    }
}

fn level_filter(level: &str) -> (&'static [&'static str], &'static [&'static str]) {
    match level.trim().to_ascii_lowercase().as_str() {
        "intermediate" => (&["1", "2"], &["Beginner", "Intermediate"]),
        "advanced" => (&["1", "2", "3"], &["Beginner", "Intermediate", "Advanced"]),
        _ => (&["1"], &["Beginner"]),
    }
}
