//! Difficulty tiers and the fixed exercise type table.
//!
//! Every exercise type belongs to exactly one tier. Tiers are ordered from
//! passive recognition up to free production.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::error::EngineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DifficultyTier {
    Recognition,
    GuidedProduction,
    StructuredProduction,
    FreeProduction,
}

impl DifficultyTier {
    pub const ALL: [DifficultyTier; 4] = [
        DifficultyTier::Recognition,
        DifficultyTier::GuidedProduction,
        DifficultyTier::StructuredProduction,
        DifficultyTier::FreeProduction,
    ];

    pub const LOWEST: DifficultyTier = DifficultyTier::Recognition;
    pub const HIGHEST: DifficultyTier = DifficultyTier::FreeProduction;

    pub fn as_str(&self) -> &'static str {
        match self {
            DifficultyTier::Recognition => "RECOGNITION",
            DifficultyTier::GuidedProduction => "GUIDED_PRODUCTION",
            DifficultyTier::StructuredProduction => "STRUCTURED_PRODUCTION",
            DifficultyTier::FreeProduction => "FREE_PRODUCTION",
        }
    }

    /// 1-based level, matching the order of `ALL`.
    pub fn level(&self) -> u8 {
        match self {
            DifficultyTier::Recognition => 1,
            DifficultyTier::GuidedProduction => 2,
            DifficultyTier::StructuredProduction => 3,
            DifficultyTier::FreeProduction => 4,
        }
    }

    pub fn is_highest(&self) -> bool {
        *self == Self::HIGHEST
    }

    pub fn next(&self) -> Option<DifficultyTier> {
        match self {
            DifficultyTier::Recognition => Some(DifficultyTier::GuidedProduction),
            DifficultyTier::GuidedProduction => Some(DifficultyTier::StructuredProduction),
            DifficultyTier::StructuredProduction => Some(DifficultyTier::FreeProduction),
            DifficultyTier::FreeProduction => None,
        }
    }

    pub fn previous(&self) -> Option<DifficultyTier> {
        match self {
            DifficultyTier::Recognition => None,
            DifficultyTier::GuidedProduction => Some(DifficultyTier::Recognition),
            DifficultyTier::StructuredProduction => Some(DifficultyTier::GuidedProduction),
            DifficultyTier::FreeProduction => Some(DifficultyTier::StructuredProduction),
        }
    }

    /// Exercise types practicing this tier, in preference order.
    pub fn exercise_types(&self) -> &'static [ExerciseType] {
        match self {
            DifficultyTier::Recognition => {
                &[ExerciseType::MultipleChoice, ExerciseType::ErrorCorrection]
            }
            DifficultyTier::GuidedProduction => &[ExerciseType::FillInBlank],
            DifficultyTier::StructuredProduction => {
                &[ExerciseType::FillMultipleBlanks, ExerciseType::SentenceBuilding]
            }
            DifficultyTier::FreeProduction => &[ExerciseType::Translation],
        }
    }
}

impl fmt::Display for DifficultyTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DifficultyTier {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_uppercase();
        DifficultyTier::ALL
            .into_iter()
            .find(|tier| tier.as_str() == normalized)
            .ok_or_else(|| EngineError::InvalidTier(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExerciseType {
    MultipleChoice,
    ErrorCorrection,
    FillInBlank,
    FillMultipleBlanks,
    SentenceBuilding,
    Translation,
}

impl ExerciseType {
    pub const ALL: [ExerciseType; 6] = [
        ExerciseType::MultipleChoice,
        ExerciseType::ErrorCorrection,
        ExerciseType::FillInBlank,
        ExerciseType::FillMultipleBlanks,
        ExerciseType::SentenceBuilding,
        ExerciseType::Translation,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ExerciseType::MultipleChoice => "multiple_choice",
            ExerciseType::ErrorCorrection => "error_correction",
            ExerciseType::FillInBlank => "fill_in_blank",
            ExerciseType::FillMultipleBlanks => "fill_multiple_blanks",
            ExerciseType::SentenceBuilding => "sentence_building",
            ExerciseType::Translation => "translation",
        }
    }

    pub fn tier(&self) -> DifficultyTier {
        match self {
            ExerciseType::MultipleChoice | ExerciseType::ErrorCorrection => {
                DifficultyTier::Recognition
            }
            ExerciseType::FillInBlank => DifficultyTier::GuidedProduction,
            ExerciseType::FillMultipleBlanks | ExerciseType::SentenceBuilding => {
                DifficultyTier::StructuredProduction
            }
            ExerciseType::Translation => DifficultyTier::FreeProduction,
        }
    }
}

impl fmt::Display for ExerciseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExerciseType {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        ExerciseType::ALL
            .into_iter()
            .find(|kind| kind.as_str() == normalized)
            .ok_or_else(|| EngineError::InvalidExerciseType(s.to_string()))
    }
}
