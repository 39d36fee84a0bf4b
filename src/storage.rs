//! Learner persistence: mastery store, session log and the error-category artifact.
//!
//! `JsonFileStorage` layout under the data directory:
//! - `mastery.json` - the Mastery Store, rewritten after every answered exercise
//! - `sessions/<session_id>.json` - one ended session per file, never rewritten
//! - `error_categories.json` - latest aggregation, replaced on each run

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::engine::{ErrorCategory, MasteryStore, SessionRecord, SessionType};

const MASTERY_FILE: &str = "mastery.json";
const SESSIONS_DIR: &str = "sessions";
const ERROR_CATEGORIES_FILE: &str = "error_categories.json";

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("storage io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("session already logged: {0}")]
    DuplicateSession(String),

    #[error("storage task failed: {0}")]
    Background(String),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// History-view row for one past session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionListing {
    pub session_id: String,
    pub date: String,
    pub started_at: DateTime<Utc>,
    pub total_exercises: usize,
    pub accuracy_rate: f64,
    pub session_type: SessionType,
}

impl From<&SessionRecord> for SessionListing {
    fn from(record: &SessionRecord) -> Self {
        Self {
            session_id: record.summary.session_id.clone(),
            date: record.summary.started_at.format("%Y-%m-%d").to_string(),
            started_at: record.summary.started_at,
            total_exercises: record.summary.total_exercises,
            accuracy_rate: record.summary.accuracy_rate,
            session_type: record.summary.session_type,
        }
    }
}

/// The error-category artifact, kept apart from the raw session logs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorCategoryReport {
    pub generated_at: DateTime<Utc>,
    pub sessions_analyzed: usize,
    pub categories: Vec<ErrorCategory>,
}

pub trait LearnerStorage: Send + Sync {
    fn load_mastery(&self) -> StorageResult<MasteryStore>;
    fn save_mastery(&self, store: &MasteryStore) -> StorageResult<()>;
    fn append_session(&self, record: &SessionRecord) -> StorageResult<()>;
    /// All logged sessions, oldest first.
    fn load_sessions(&self) -> StorageResult<Vec<SessionRecord>>;
    fn save_error_categories(&self, report: &ErrorCategoryReport) -> StorageResult<()>;
    fn load_error_categories(&self) -> StorageResult<Option<ErrorCategoryReport>>;

    /// Summaries of past sessions, newest first.
    fn list_sessions(&self) -> StorageResult<Vec<SessionListing>> {
        let mut listings: Vec<SessionListing> =
            self.load_sessions()?.iter().map(SessionListing::from).collect();
        listings.sort_by(|a, b| {
            b.started_at
                .cmp(&a.started_at)
                .then_with(|| b.session_id.cmp(&a.session_id))
        });
        Ok(listings)
    }
}

#[derive(Debug, Clone)]
pub struct JsonFileStorage {
    root: PathBuf,
}

impl JsonFileStorage {
    pub fn open(root: impl Into<PathBuf>) -> StorageResult<Self> {
        let root = root.into();
        fs::create_dir_all(root.join(SESSIONS_DIR))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn sessions_dir(&self) -> PathBuf {
        self.root.join(SESSIONS_DIR)
    }

    fn session_path(&self, session_id: &str) -> PathBuf {
        let file_name: String = session_id
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
            .collect();
        self.sessions_dir().join(format!("{file_name}.json"))
    }
}

/// Writes through a sibling temp file and renames it into place.
fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> StorageResult<()> {
    let bytes = serde_json::to_vec_pretty(value)?;
    let tmp = path.with_extension("json.tmp");
    {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(&bytes)?;
        file.sync_all()?;
    }
    fs::rename(&tmp, path)?;
    Ok(())
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> StorageResult<Option<T>> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err.into()),
    }
}

impl LearnerStorage for JsonFileStorage {
    fn load_mastery(&self) -> StorageResult<MasteryStore> {
        Ok(read_json(&self.root.join(MASTERY_FILE))?.unwrap_or_default())
    }

    fn save_mastery(&self, store: &MasteryStore) -> StorageResult<()> {
        write_json_atomic(&self.root.join(MASTERY_FILE), store)
    }

    fn append_session(&self, record: &SessionRecord) -> StorageResult<()> {
        let path = self.session_path(&record.session.session_id);
        if path.exists() {
            return Err(StorageError::DuplicateSession(record.session.session_id.clone()));
        }
        write_json_atomic(&path, record)
    }

    fn load_sessions(&self) -> StorageResult<Vec<SessionRecord>> {
        let dir = self.sessions_dir();
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut records = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            match read_json::<SessionRecord>(&path) {
                Ok(Some(record)) => records.push(record),
                Ok(None) => {}
                Err(err) => {
                    tracing::warn!(path = %path.display(), error = %err, "skipping unreadable session log");
                }
            }
        }
        records.sort_by(|a, b| {
            a.session
                .started_at
                .cmp(&b.session.started_at)
                .then_with(|| a.session.session_id.cmp(&b.session.session_id))
        });
        Ok(records)
    }

    fn save_error_categories(&self, report: &ErrorCategoryReport) -> StorageResult<()> {
        write_json_atomic(&self.root.join(ERROR_CATEGORIES_FILE), report)
    }

    fn load_error_categories(&self) -> StorageResult<Option<ErrorCategoryReport>> {
        read_json(&self.root.join(ERROR_CATEGORIES_FILE))
    }
}

/// Volatile storage for tests and dry runs.
#[derive(Debug, Default)]
pub struct InMemoryStorage {
    mastery: Mutex<Option<MasteryStore>>,
    sessions: Mutex<Vec<SessionRecord>>,
    error_categories: Mutex<Option<ErrorCategoryReport>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LearnerStorage for InMemoryStorage {
    fn load_mastery(&self) -> StorageResult<MasteryStore> {
        Ok(self.mastery.lock().clone().unwrap_or_default())
    }

    fn save_mastery(&self, store: &MasteryStore) -> StorageResult<()> {
        *self.mastery.lock() = Some(store.clone());
        Ok(())
    }

    fn append_session(&self, record: &SessionRecord) -> StorageResult<()> {
        let mut sessions = self.sessions.lock();
        if sessions
            .iter()
            .any(|s| s.session.session_id == record.session.session_id)
        {
            return Err(StorageError::DuplicateSession(record.session.session_id.clone()));
        }
        sessions.push(record.clone());
        Ok(())
    }

    fn load_sessions(&self) -> StorageResult<Vec<SessionRecord>> {
        let mut sessions = self.sessions.lock().clone();
        sessions.sort_by(|a, b| a.session.started_at.cmp(&b.session.started_at));
        Ok(sessions)
    }

    fn save_error_categories(&self, report: &ErrorCategoryReport) -> StorageResult<()> {
        *self.error_categories.lock() = Some(report.clone());
        Ok(())
    }

    fn load_error_categories(&self) -> StorageResult<Option<ErrorCategoryReport>> {
        Ok(self.error_categories.lock().clone())
    }
}
