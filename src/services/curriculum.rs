use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::engine::GrammarCatalog;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrammarPoint {
    pub id: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Deserialize)]
struct CurriculumFile {
    #[serde(default)]
    levels: BTreeMap<String, CurriculumLevel>,
}

#[derive(Debug, Deserialize)]
struct CurriculumLevel {
    #[serde(default)]
    grammar_points: Vec<GrammarPoint>,
}

/// Grammar points of one curriculum level, in curriculum order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Curriculum {
    level: String,
    points: Vec<GrammarPoint>,
}

impl Curriculum {
    pub fn empty(level: impl Into<String>) -> Self {
        Self {
            level: level.into(),
            points: Vec::new(),
        }
    }

    /// Loads one level from a curriculum file. A missing file or level is
    /// logged and yields an empty curriculum.
    pub fn load(path: &Path, level: &str) -> Self {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "curriculum not loaded");
                return Self::empty(level);
            }
        };

        match Self::from_json_str(&raw, level) {
            Ok(curriculum) => {
                if curriculum.is_empty() {
                    warn!(path = %path.display(), level, "curriculum level missing or empty");
                } else {
                    tracing::info!(level, grammar_points = curriculum.len(), "curriculum loaded");
                }
                curriculum
            }
            Err(err) => {
                warn!(path = %path.display(), error = %err, "curriculum file is not valid JSON");
                Self::empty(level)
            }
        }
    }

    pub fn from_json_str(raw: &str, level: &str) -> Result<Self, serde_json::Error> {
        let file: CurriculumFile = serde_json::from_str(raw)?;
        let mut points: Vec<GrammarPoint> = Vec::new();
        if let Some(found) = file.levels.get(level) {
            for point in &found.grammar_points {
                let id = normalize_grammar_id(&point.id);
                if id.is_empty() || points.iter().any(|p| p.id == id) {
                    continue;
                }
                points.push(GrammarPoint {
                    id,
                    description: point.description.trim().to_string(),
                });
            }
        }
        Ok(Self {
            level: level.to_string(),
            points,
        })
    }

    pub fn level(&self) -> &str {
        &self.level
    }

    pub fn points(&self) -> &[GrammarPoint] {
        &self.points
    }

    pub fn ids(&self) -> Vec<String> {
        self.points.iter().map(|p| p.id.clone()).collect()
    }

    pub fn get(&self, grammar_id: &str) -> Option<&GrammarPoint> {
        self.points.iter().find(|p| p.id == grammar_id)
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

impl GrammarCatalog for Curriculum {
    fn contains(&self, grammar_id: &str) -> bool {
        self.get(grammar_id).is_some()
    }
}

/// Trims an id and joins inner whitespace runs with a single `_`.
pub fn normalize_grammar_id(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join("_")
}
