//! Race Controller error types.
//!
//! Errors are reported to the single requester (HTTP response or a
//! `race:error` event on the requesting connection) and never broadcast.
//! Internal details are logged server-side but not exposed to clients.

use crate::roster::RosterError;
use crate::store::StoreError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use common::types::RaceId;
use serde::Serialize;
use thiserror::Error;

/// Minimum number of drivers a race needs before it can start.
pub const MIN_DRIVERS_TO_START: usize = 2;

/// Race Controller error type.
///
/// Maps to HTTP status codes:
/// - `Validation`, `BadRequest`: 400 Bad Request
/// - `RaceNotFound`: 404 Not Found
/// - `RaceExists`, `NoRacesAvailable`, `InsufficientDrivers`: 409 Conflict
/// - `Storage`, `Internal`: 500 Internal Server Error
#[derive(Debug, Error)]
pub enum RcError {
    /// Roster operation rejected.
    #[error("Validation error: {0}")]
    Validation(#[from] RosterError),

    /// Request body could not be read.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// No pending race to start.
    #[error("No races available")]
    NoRacesAvailable,

    /// The next race does not have enough drivers to start.
    #[error("Race {race_id} has {count} driver(s)")]
    InsufficientDrivers { race_id: RaceId, count: usize },

    /// Race id is not pending.
    #[error("Race not found: {0}")]
    RaceNotFound(RaceId),

    /// Race id is already registered.
    #[error("Race already exists: {0}")]
    RaceExists(RaceId),

    /// Persistence call failed.
    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),

    /// Actor channel or other internal failure.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl RcError {
    /// Stable machine-readable code.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            RcError::Validation(e) => e.code(),
            RcError::BadRequest(_) => "bad_request",
            RcError::NoRacesAvailable => "no_races",
            RcError::InsufficientDrivers { .. } => "insufficient_drivers",
            RcError::RaceNotFound(_) => "race_not_found",
            RcError::RaceExists(_) => "race_exists",
            RcError::Storage(_) => "storage",
            RcError::Internal(_) => "internal",
        }
    }

    /// HTTP status for this error.
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            RcError::Validation(_) | RcError::BadRequest(_) => StatusCode::BAD_REQUEST,
            RcError::RaceNotFound(_) => StatusCode::NOT_FOUND,
            RcError::NoRacesAvailable
            | RcError::InsufficientDrivers { .. }
            | RcError::RaceExists(_) => StatusCode::CONFLICT,
            RcError::Storage(_) | RcError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns a client-safe error message (no internal details).
    #[must_use]
    pub fn client_message(&self) -> String {
        match self {
            RcError::Validation(e) => e.to_string(),
            RcError::BadRequest(msg) => msg.clone(),
            RcError::NoRacesAvailable => "No races available".to_string(),
            RcError::InsufficientDrivers { .. } => {
                format!("A race needs at least {MIN_DRIVERS_TO_START} drivers to start")
            }
            RcError::RaceNotFound(id) => format!("Race {id} not found"),
            RcError::RaceExists(id) => format!("Race {id} already exists"),
            RcError::Storage(_) | RcError::Internal(_) => "An internal error occurred".to_string(),
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: &'static str,
    message: String,
}

impl IntoResponse for RcError {
    fn into_response(self) -> Response {
        match &self {
            RcError::Storage(err) => {
                tracing::error!(target: "rc.storage", error = %err, "Storage operation failed");
            }
            RcError::Internal(err) => {
                tracing::error!(target: "rc.internal", error = %err, "Internal error");
            }
            _ => {}
        }

        let body = ErrorResponse {
            error: ErrorDetail {
                code: self.error_code(),
                message: self.client_message(),
            },
        };

        (self.status_code(), Json(body)).into_response()
    }
}
