use serde::{Deserialize, Serialize};

const DEFAULT_MIN_REPS: u32 = 5;
const DEFAULT_MASTERY_THRESHOLD: f64 = 0.8;
const DEFAULT_STRUGGLING_FLOOR: f64 = 0.5;
const DEFAULT_COOLDOWN_ATTEMPTS: usize = 3;
const DEFAULT_EXAMPLES_PER_CATEGORY: usize = 2;

/// Tunables for mastery, recommendation and error aggregation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Attempts required at a tier before it can count as mastered
    pub min_reps: u32,
    /// Accuracy (0-1) required at a tier for mastery
    pub mastery_threshold: f64,
    /// Accuracy below which the learner is stepped back one tier
    pub struggling_floor: f64,
    /// Number of most recent session attempts whose grammar points are skipped in auto mode
    pub cooldown_attempts: usize,
    pub max_examples_per_category: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            min_reps: DEFAULT_MIN_REPS,
            mastery_threshold: DEFAULT_MASTERY_THRESHOLD,
            struggling_floor: DEFAULT_STRUGGLING_FLOOR,
            cooldown_attempts: DEFAULT_COOLDOWN_ATTEMPTS,
            max_examples_per_category: DEFAULT_EXAMPLES_PER_CATEGORY,
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            min_reps: env_parse("MASTERY_MIN_REPS").unwrap_or(defaults.min_reps),
            mastery_threshold: env_parse("MASTERY_THRESHOLD")
                .unwrap_or(defaults.mastery_threshold),
            struggling_floor: env_parse("STRUGGLING_FLOOR").unwrap_or(defaults.struggling_floor),
            cooldown_attempts: env_parse("RECOMMEND_COOLDOWN_ATTEMPTS")
                .unwrap_or(defaults.cooldown_attempts),
            max_examples_per_category: env_parse("ERROR_EXAMPLES_PER_CATEGORY")
                .unwrap_or(defaults.max_examples_per_category),
        }
        .sanitized()
    }

    pub fn sanitized(mut self) -> Self {
        self.min_reps = self.min_reps.max(1);
        self.mastery_threshold = self.mastery_threshold.clamp(0.0, 1.0);
        self.struggling_floor = self.struggling_floor.clamp(0.0, self.mastery_threshold);
        self
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok()?.trim().parse().ok()
}
