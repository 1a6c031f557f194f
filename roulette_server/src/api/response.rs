//! Response envelope and error-to-status mapping.
//!
//! Every JSON response carries the HTTP status code in its body:
//! `{"status": 200, "data": ...}` on success and
//! `{"status": 402, "error": "..."}` on failure.

use axum::{
    Json,
    extract::rejection::{JsonRejection, PathRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use roulette::{
    ledger::LedgerError,
    round::{ErrorKind, GameError},
};
use serde::Serialize;

use crate::metrics;

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub status: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

/// Successful response with `data`
pub fn success<T: Serialize>(status: StatusCode, data: T) -> (StatusCode, Json<ApiResponse<T>>) {
    (
        status,
        Json(ApiResponse {
            status: status.as_u16(),
            error: None,
            data: Some(data),
        }),
    )
}

/// Error response carrying a client-safe message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// HTTP status for a round error class
pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Validation => StatusCode::BAD_REQUEST,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::InsufficientFunds => StatusCode::PAYMENT_REQUIRED,
        ErrorKind::Persistence => StatusCode::INTERNAL_SERVER_ERROR,
        ErrorKind::Notification => StatusCode::SERVICE_UNAVAILABLE,
    }
}

fn kind_label(kind: ErrorKind) -> &'static str {
    match kind {
        ErrorKind::Validation => "validation",
        ErrorKind::NotFound => "not_found",
        ErrorKind::InsufficientFunds => "insufficient_funds",
        ErrorKind::Persistence => "persistence",
        ErrorKind::Notification => "notification",
    }
}

impl From<GameError> for ApiError {
    fn from(err: GameError) -> Self {
        let kind = err.kind();
        let status = status_for(kind);

        if status.is_server_error() {
            log::error!("Round operation failed: {}", err);
        } else {
            log::debug!("Round operation rejected: {}", err);
        }
        metrics::game_errors_total(kind_label(kind));

        Self::new(status, err.client_message())
    }
}

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        GameError::from(err).into()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::new(StatusCode::BAD_REQUEST, rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        Self::new(StatusCode::BAD_REQUEST, rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ApiResponse::<()> {
            status: self.status.as_u16(),
            error: Some(self.message),
            data: None,
        };
        (self.status, Json(body)).into_response()
    }
}
