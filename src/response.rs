use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::engine::EngineError;
use crate::services::practice::PracticeError;
use crate::services::CollaboratorError;
use crate::storage::StorageError;

#[derive(Debug, Serialize)]
pub struct SuccessResponse<T> {
    pub success: bool,
    pub data: T,
}

pub fn ok<T: Serialize>(data: T) -> Json<SuccessResponse<T>> {
    Json(SuccessResponse { success: true, data })
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
    pub code: String,
}

#[derive(Debug, Clone)]
pub struct AppError {
    status: StatusCode,
    code: String,
    message: String,
    is_operational: bool,
}

impl AppError {
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::operational(StatusCode::NOT_FOUND, "NOT_FOUND", message)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::operational(StatusCode::BAD_REQUEST, "VALIDATION_ERROR", message)
    }

    pub fn collaborator_unavailable(message: impl Into<String>) -> Self {
        Self::operational(StatusCode::BAD_GATEWAY, "COLLABORATOR_UNAVAILABLE", message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            code: "INTERNAL_ERROR".to_string(),
            message: message.into(),
            is_operational: false,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    fn operational(
        status: StatusCode,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            status,
            code: code.into(),
            message: message.into(),
            is_operational: true,
        }
    }
}

impl From<EngineError> for AppError {
    fn from(err: EngineError) -> Self {
        let message = err.to_string();
        match err {
            EngineError::AlreadyActive => {
                json_error(StatusCode::CONFLICT, "ALREADY_ACTIVE", message)
            }
            EngineError::NoActiveSession => {
                json_error(StatusCode::BAD_REQUEST, "NO_ACTIVE_SESSION", message)
            }
            EngineError::InvalidTier(_)
            | EngineError::InvalidExerciseType(_)
            | EngineError::UnknownGrammarId(_)
            | EngineError::EmptyGrammarId => Self::validation(message),
            EngineError::CollaboratorUnavailable(_) => Self::collaborator_unavailable(message),
        }
    }
}

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        tracing::error!(error = %err, "storage failure");
        Self::internal(err.to_string())
    }
}

impl From<CollaboratorError> for AppError {
    fn from(err: CollaboratorError) -> Self {
        tracing::warn!(error = %err, "collaborator failure");
        Self::collaborator_unavailable(err.to_string())
    }
}

impl From<PracticeError> for AppError {
    fn from(err: PracticeError) -> Self {
        let message = err.to_string();
        match err {
            PracticeError::Engine(err) => err.into(),
            PracticeError::Storage(err) => err.into(),
            PracticeError::Collaborator(err) => err.into(),
            PracticeError::UnknownExercise(_) | PracticeError::NoSummary => {
                Self::not_found(message)
            }
            PracticeError::Invalid(_) => Self::validation(message),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let message = if self.is_operational {
            self.message
        } else {
            "internal server error".to_string()
        };

        let body = ErrorResponse {
            success: false,
            error: message,
            code: self.code,
        };

        (self.status, Json(body)).into_response()
    }
}

pub fn json_error(
    status: StatusCode,
    code: impl Into<String>,
    message: impl Into<String>,
) -> AppError {
    AppError {
        status,
        code: code.into(),
        message: message.into(),
        is_operational: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_errors_map_to_statuses() {
        let conflict = AppError::from(EngineError::AlreadyActive);
        assert_eq!(conflict.status(), StatusCode::CONFLICT);
        assert_eq!(conflict.code(), "ALREADY_ACTIVE");

        let no_session = AppError::from(EngineError::NoActiveSession);
        assert_eq!(no_session.status(), StatusCode::BAD_REQUEST);
        assert_eq!(no_session.code(), "NO_ACTIVE_SESSION");

        let invalid = AppError::from(EngineError::InvalidExerciseType("essay".into()));
        assert_eq!(invalid.code(), "VALIDATION_ERROR");
    }

    #[test]
    fn test_collaborator_errors_are_bad_gateway() {
        let err = AppError::from(CollaboratorError::Malformed("bad".into()));
        assert_eq!(err.status(), StatusCode::BAD_GATEWAY);
    }
}
