use axum::{http::StatusCode, response::{IntoResponse, Response}, Json};
use serde_json::json;
use thiserror::Error;

pub type Result<T, E = TokenError> = std::result::Result<T, E>;

#[derive(Error, Debug)]
pub enum TokenError {
    /// Missing or malformed request field. Never retried.
    #[error("{0}")]
    Validation(String),
    /// The extraction cycle ran out of attempts.
    #[error("extraction failed: {message}")]
    Extraction { message: String, failures: u32, retry_after: u64 },
    /// Rejected before extraction because the stream is inside its backoff window.
    #[error("stream is backing off after {failures} failures")]
    Backoff { failures: u32, retry_after: u64 },
    #[error("internal error")]
    Internal(#[from] anyhow::Error),
}

impl TokenError {
    pub fn status(&self) -> StatusCode {
        match self {
            TokenError::Validation(_) => StatusCode::BAD_REQUEST,
            TokenError::Extraction { .. } | TokenError::Backoff { .. } => StatusCode::SERVICE_UNAVAILABLE,
            TokenError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for TokenError {
    fn into_response(self) -> Response {
        let body = match &self {
            TokenError::Validation(msg) => json!({ "success": false, "error": msg }),
            TokenError::Extraction { message, failures, retry_after } => json!({
                "success": false,
                "error": message,
                "failures": failures,
                "retryAfter": retry_after,
            }),
            TokenError::Backoff { failures, retry_after } => json!({
                "success": false,
                "error": self.to_string(),
                "failures": failures,
                "retryAfter": retry_after,
            }),
            TokenError::Internal(e) => {
                tracing::error!("internal error: {:#}", e);
                json!({ "success": false, "error": "internal error" })
            }
        };
        (self.status(), Json(body)).into_response()
    }
}
