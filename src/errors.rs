use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::models::{BookingStatus, BusyWindow};

/// Coarse classification used for HTTP mapping and retry decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Conflict,
    NotFound,
    Forbidden,
    AuthenticityFailure,
    UpstreamFailure,
    PersistenceFailure,
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("invalid interval: end ({end}) must be after start ({start})")]
    InvalidInterval { start: String, end: String },

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("vehicle not found: {0}")]
    VehicleNotFound(i64),

    #[error("customer not found: {0}")]
    CustomerNotFound(i64),

    #[error("booking not found: {0}")]
    BookingNotFound(String),

    #[error("vehicle {0} is under maintenance")]
    UnderMaintenance(i64),

    #[error("vehicle {vehicle_id} is already booked for the requested period")]
    Conflict {
        vehicle_id: i64,
        conflicting: Vec<BusyWindow>,
    },

    #[error("booking {0} is already paid")]
    AlreadyPaid(String),

    #[error("invalid status transition from {from} to {to}")]
    InvalidTransition {
        from: BookingStatus,
        to: BookingStatus,
    },

    #[error("not allowed: {0}")]
    Forbidden(String),

    #[error("invalid notification signature")]
    InvalidSignature,

    #[error("payment provider error: {0}")]
    Upstream(String),

    #[error("database error: {0}")]
    Persistence(#[from] rusqlite::Error),
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::InvalidInterval { .. } | EngineError::Validation(_) => {
                ErrorKind::Validation
            }
            EngineError::VehicleNotFound(_)
            | EngineError::CustomerNotFound(_)
            | EngineError::BookingNotFound(_) => ErrorKind::NotFound,
            EngineError::UnderMaintenance(_)
            | EngineError::Conflict { .. }
            | EngineError::AlreadyPaid(_)
            | EngineError::InvalidTransition { .. } => ErrorKind::Conflict,
            EngineError::Forbidden(_) => ErrorKind::Forbidden,
            EngineError::InvalidSignature => ErrorKind::AuthenticityFailure,
            EngineError::Upstream(_) => ErrorKind::UpstreamFailure,
            EngineError::Persistence(_) => ErrorKind::PersistenceFailure,
        }
    }

    /// Whether the caller may retry the same request unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::UpstreamFailure | ErrorKind::PersistenceFailure
        )
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("unauthorized")]
    Unauthorized,

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<rusqlite::Error> for AppError {
    fn from(e: rusqlite::Error) -> Self {
        AppError::Engine(EngineError::Persistence(e))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::Engine(e) => match e.kind() {
                ErrorKind::Validation => StatusCode::BAD_REQUEST,
                ErrorKind::Conflict => StatusCode::CONFLICT,
                ErrorKind::NotFound => StatusCode::NOT_FOUND,
                ErrorKind::Forbidden => StatusCode::FORBIDDEN,
                ErrorKind::AuthenticityFailure => StatusCode::FORBIDDEN,
                ErrorKind::UpstreamFailure => StatusCode::BAD_GATEWAY,
                ErrorKind::PersistenceFailure => StatusCode::INTERNAL_SERVER_ERROR,
            },
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }

        let body = match &self {
            AppError::Engine(EngineError::Conflict { conflicting, .. }) => serde_json::json!({
                "error": self.to_string(),
                "busy": conflicting,
            }),
            AppError::Engine(e) if e.is_retryable() => serde_json::json!({
                "error": self.to_string(),
                "retryable": true,
            }),
            // Signature failures never echo internals.
            AppError::Engine(EngineError::InvalidSignature) => {
                serde_json::json!({ "error": "invalid signature" })
            }
            _ => serde_json::json!({ "error": self.to_string() }),
        };
        (status, axum::Json(body)).into_response()
    }
}
