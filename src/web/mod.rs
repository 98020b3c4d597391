//! HTTP surface: axum router, request extractors and the mapping from
//! `LedgerError` to status codes and JSON error bodies.

pub mod extract;
pub mod routes;

pub use routes::{AppState, build_router};

use crate::core::{ErrorKind, LedgerError};
use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::error;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_check_in_at: Option<DateTime<Utc>>,
}

#[derive(Debug)]
pub enum WebError {
    Ledger(LedgerError),
    Input(String),
    /// No session handle on a route that needs one
    NotLoggedIn,
}

impl From<LedgerError> for WebError {
    fn from(err: LedgerError) -> Self {
        WebError::Ledger(err)
    }
}

pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Validation => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Conflict => StatusCode::CONFLICT,
        ErrorKind::Unauthorized => StatusCode::UNAUTHORIZED,
        ErrorKind::Forbidden => StatusCode::FORBIDDEN,
        ErrorKind::Exhausted => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for WebError {
    fn into_response(self) -> Response {
        let (status, message, code, next_check_in_at) = match self {
            WebError::Ledger(err) => {
                let status = status_for(err.kind());
                let next = match &err {
                    LedgerError::CheckInCooldown { next_check_in_at } => Some(*next_check_in_at),
                    _ => None,
                };
                let message = if err.kind() == ErrorKind::Internal {
                    error!(error = %err, code = err.code(), "request failed");
                    "internal server error".to_string()
                } else {
                    err.to_string()
                };
                (status, message, err.code().to_string(), next)
            }
            WebError::Input(msg) => (StatusCode::BAD_REQUEST, msg, "input_error".to_string(), None),
            WebError::NotLoggedIn => (
                StatusCode::UNAUTHORIZED,
                "not logged in".to_string(),
                "not_logged_in".to_string(),
                None,
            ),
        };

        let body = Json(ErrorResponse {
            error: message,
            code,
            next_check_in_at,
        });

        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, WebError>;
