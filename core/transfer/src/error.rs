// sentinel/core/transfer/src/error.rs

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

/// Terminal outcomes of a transfer request.
///
/// Peers only ever see the category; operator logs carry the detail.
#[derive(Debug, Error)]
pub enum TransferError {
    #[error("peer not authorized")]
    Unauthorized,

    #[error("request timestamp outside replay window")]
    StaleRequest,

    #[error("request replay detected")]
    ReplayDetected,

    #[error("invalid signature")]
    InvalidSignature,

    #[error("log not found")]
    NotFound,

    #[error("log exceeds size limit of {limit} bytes")]
    SizeExceeded { limit: u64 },

    #[error("storage full")]
    StorageFull,

    #[error("daily bandwidth quota exceeded")]
    QuotaExceeded,

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl TransferError {
    pub fn status(&self) -> StatusCode {
        match self {
            TransferError::Unauthorized => StatusCode::FORBIDDEN,
            TransferError::StaleRequest => StatusCode::UNAUTHORIZED,
            TransferError::ReplayDetected => StatusCode::CONFLICT,
            TransferError::InvalidSignature => StatusCode::UNAUTHORIZED,
            TransferError::NotFound => StatusCode::NOT_FOUND,
            TransferError::SizeExceeded { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            TransferError::StorageFull => StatusCode::INSUFFICIENT_STORAGE,
            TransferError::QuotaExceeded => StatusCode::TOO_MANY_REQUESTS,
            TransferError::BadRequest(_) => StatusCode::BAD_REQUEST,
            TransferError::Io(_) | TransferError::Serialization(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Category string exposed to the requesting peer. Internal failures
    /// collapse to a generic label so the response reveals nothing about
    /// server state.
    pub fn category(&self) -> &'static str {
        match self {
            TransferError::Unauthorized => "unauthorized",
            TransferError::StaleRequest => "stale_request",
            TransferError::ReplayDetected => "replay_detected",
            TransferError::InvalidSignature => "invalid_signature",
            TransferError::NotFound => "not_found",
            TransferError::SizeExceeded { .. } => "size_exceeded",
            TransferError::StorageFull => "storage_full",
            TransferError::QuotaExceeded => "quota_exceeded",
            TransferError::BadRequest(_) => "bad_request",
            TransferError::Io(_) | TransferError::Serialization(_) => "internal_error",
        }
    }
}

impl IntoResponse for TransferError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = Json(serde_json::json!({ "error": self.category() }));
        (status, body).into_response()
    }
}
