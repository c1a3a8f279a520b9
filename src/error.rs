use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// Application-level errors
#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("Storage error: {0}")]
    Storage(#[from] std::io::Error),

    #[error("Profile serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("Collaborator error: {0}")]
    Collaborator(String),

    #[error("Collaborator timed out after {0}s")]
    Timeout(u64),

    #[error("Malformed model reply: {0}")]
    Parse(String),

    #[error("Invalid input: {0}")]
    Validation(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Storage(_) | AppError::Serialization(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            AppError::Collaborator(_) | AppError::HttpClient(_) | AppError::Parse(_) => {
                StatusCode::BAD_GATEWAY
            }
            AppError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        };

        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        }

        let message = match self {
            AppError::Validation(msg) => msg,
            other => other.to_string(),
        };

        let body = Json(json!({
            "success": false,
            "message": message
        }));

        (status, body).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;
