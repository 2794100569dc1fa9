//! Error type returned by the HTTP handlers.
//!
//! [`ApiError`] wraps library errors and request validation failures. Its
//! [`IntoResponse`] impl is the single place errors become HTTP statuses:
//!
//! - `409 Conflict`: every optimistic update attempt lost; retry later.
//! - `400 Bad Request`: malformed ranges, ids, storage keys, or application
//!   ids.
//! - `503 Service Unavailable`: the ledger store refused the operation.
//! - `500 Internal Server Error`: a stored ledger is corrupt or could not be
//!   read or written.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use rangeid::StoreError;
use serde::Serialize;

pub type Result<T> = core::result::Result<T, ApiError>;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The request was well-formed JSON but violated a server limit.
    #[error("Invalid request: {reason}")]
    InvalidRequest { reason: String },

    #[error(transparent)]
    Ledger(#[from] rangeid::Error),
}

impl ApiError {
    pub fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidRequest {
            reason: reason.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::InvalidRequest { .. } => StatusCode::BAD_REQUEST,
            ApiError::Ledger(err) => match err {
                rangeid::Error::TooManyAttempts { .. } => StatusCode::CONFLICT,
                rangeid::Error::InvalidRange { .. }
                | rangeid::Error::InvalidId(_)
                | rangeid::Error::EmptyRanges
                | rangeid::Error::InvalidKey(_) => StatusCode::BAD_REQUEST,
                rangeid::Error::Store(err) => match err {
                    StoreError::FailedPrecondition(_) => StatusCode::CONFLICT,
                    StoreError::InvalidKey(_) => StatusCode::BAD_REQUEST,
                    StoreError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
                    _ => StatusCode::INTERNAL_SERVER_ERROR,
                },
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    retryable: bool,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let retryable = match &self {
            ApiError::InvalidRequest { .. } => false,
            ApiError::Ledger(err) => err.is_retryable(),
        };

        #[cfg(feature = "tracing")]
        if status.is_server_error() {
            tracing::error!("Request failed: {self}");
        } else if status == StatusCode::CONFLICT {
            tracing::warn!("Request failed: {self}");
        } else {
            tracing::debug!("Rejected request: {self}");
        }

        let body = ErrorBody {
            error: self.to_string(),
            retryable,
        };
        (status, Json(body)).into_response()
    }
}
