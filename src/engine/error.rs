use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("a session is already active")]
    AlreadyActive,
    #[error("no active session")]
    NoActiveSession,
    #[error("invalid difficulty tier: {0}")]
    InvalidTier(String),
    #[error("invalid exercise type: {0}")]
    InvalidExerciseType(String),
    #[error("unknown grammar point: {0}")]
    UnknownGrammarId(String),
    #[error("grammar id must not be empty")]
    EmptyGrammarId,
    #[error("collaborator unavailable: {0}")]
    CollaboratorUnavailable(String),
}
