use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::services::generator::GenerationError;
use crate::services::store::StoreError;

/// Errors surfaced by quiz session operations. `kind()` is the stable code
/// clients match on; the message is for humans.
#[derive(Debug, Error)]
pub enum QuizError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Quiz session not found")]
    NotFound,

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Quiz session was modified concurrently, please retry")]
    Conflict,

    #[error("Question generation failed: {0}")]
    GenerationFailed(String),

    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),
}

impl QuizError {
    pub fn kind(&self) -> &'static str {
        match self {
            QuizError::InvalidRequest(_) => "invalid_request",
            QuizError::NotFound => "not_found",
            QuizError::InvalidState(_) => "invalid_state",
            QuizError::Conflict => "conflict",
            QuizError::GenerationFailed(_) => "generation_failed",
            QuizError::StorageUnavailable(_) => "storage_unavailable",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            QuizError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            QuizError::NotFound => StatusCode::NOT_FOUND,
            QuizError::InvalidState(_) | QuizError::Conflict => StatusCode::CONFLICT,
            QuizError::GenerationFailed(_) => StatusCode::BAD_GATEWAY,
            QuizError::StorageUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, QuizError::Conflict)
    }

    /// Message safe to return to clients. Upstream and storage details stay in the logs.
    fn public_message(&self) -> String {
        match self {
            QuizError::GenerationFailed(_) => {
                "Quiz questions could not be generated, please try again".to_string()
            }
            QuizError::StorageUnavailable(_) => {
                "Quiz storage is temporarily unavailable".to_string()
            }
            other => other.to_string(),
        }
    }
}

impl From<StoreError> for QuizError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => QuizError::NotFound,
            StoreError::Conflict { .. } => QuizError::Conflict,
            StoreError::Unavailable(msg) => QuizError::StorageUnavailable(msg),
        }
    }
}

impl From<GenerationError> for QuizError {
    fn from(err: GenerationError) -> Self {
        QuizError::GenerationFailed(err.to_string())
    }
}

impl From<validator::ValidationErrors> for QuizError {
    fn from(errors: validator::ValidationErrors) -> Self {
        QuizError::InvalidRequest(errors.to_string())
    }
}

impl IntoResponse for QuizError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(kind = self.kind(), "Quiz request failed: {}", self);
        } else {
            tracing::warn!(kind = self.kind(), "Quiz request rejected: {}", self);
        }

        let body = json!({
            "error": self.kind(),
            "message": self.public_message(),
        });

        (status, Json(body)).into_response()
    }
}
