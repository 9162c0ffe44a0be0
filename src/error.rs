use axum::{extract::multipart::MultipartError, http::StatusCode, Json};
use serde_json::{json, Value};
use thiserror::Error;

/// Request-level failure. Validation and not-found errors are produced
/// locally by the handlers; storage errors bubble up from the repositories.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("File storage error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid multipart body: {0}")]
    Multipart(#[from] MultipartError),
}

impl ApiError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Multipart(e) => e.status(),
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Storage(_) | Self::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Turn the error into the JSON error body sent to clients.
    /// Internal detail is only included when `expose` is set.
    pub fn reply(self, expose: bool) -> (StatusCode, Json<Value>) {
        let status = self.status();
        let message = match &self {
            Self::Storage(_) | Self::Io(_) => {
                tracing::error!("request failed: {self}");
                if expose {
                    self.to_string()
                } else {
                    "Internal server error".to_string()
                }
            }
            _ => self.to_string(),
        };
        (status, Json(json!({ "error": message })))
    }
}
