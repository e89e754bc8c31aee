//! API error types and HTTP response conversion
//!
//! Every handler failure becomes a response with a stable error code and a
//! human hint; the HTTP layer never crashes on handler errors. Codes are
//! part of the wire contract and must not change.

use crate::db::DatabaseError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// API error response structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiErrorResponse {
    /// Human-readable explanation of what went wrong
    pub hint: String,
    /// Stable code for programmatic handling
    pub code: String,
}

/// API result type
pub type ApiResult<T> = Result<T, ApiError>;

/// Custom API error type
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid pattern; see the pattern grammar in the documentation")]
    InvalidPattern,

    #[error("invalid slot number; expected a non-negative integer")]
    InvalidSlotNo,

    #[error("invalid status flag; use 'spent' or 'unspent'")]
    InvalidStatusFlag,

    #[error("invalid match filter: {0}")]
    InvalidMatchFilter(String),

    #[error("invalid sort direction; use 'asc' or 'desc'")]
    InvalidSortDirection,

    #[error("malformed point; expected 'origin' or '<slot>.<hex header hash>'")]
    MalformedPoint,

    #[error("malformed datum hash; expected 64 hex digits")]
    MalformedDatumHash,

    #[error("malformed script hash; expected 56 hex digits")]
    MalformedScriptHash,

    #[error("point does not exist on the indexed chain")]
    NonExistingPoint,

    #[error("cannot delete matches of '{0}': it overlaps a registered pattern; \
             remove that pattern first")]
    StillActivePattern(String),

    #[error("rollback target lies beyond the safe zone; \
             pass limit 'any' to force an unsafe rollback")]
    UnsafeRollbackBeyondSafeZone,

    #[error("failed to rollback: {0}")]
    FailedToRollback(String),

    #[error("no known block at or before this slot")]
    NoAncestor,

    #[error("no route matches this path")]
    NotFound,

    #[error("method not allowed on this route")]
    MethodNotAllowed,

    #[error("unsupported content type requested")]
    UnsupportedContentType,

    /// Database error
    #[error("database error: {0}")]
    Database(#[from] DatabaseError),

    /// Internal server error
    #[error("internal server error: {0}")]
    Internal(String),
}

impl ApiError {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::InvalidPattern
            | ApiError::InvalidSlotNo
            | ApiError::InvalidStatusFlag
            | ApiError::InvalidMatchFilter(_)
            | ApiError::InvalidSortDirection
            | ApiError::MalformedPoint
            | ApiError::MalformedDatumHash
            | ApiError::MalformedScriptHash
            | ApiError::NonExistingPoint
            | ApiError::StillActivePattern(_)
            | ApiError::UnsafeRollbackBeyondSafeZone
            | ApiError::FailedToRollback(_) => StatusCode::BAD_REQUEST,
            ApiError::NoAncestor | ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            ApiError::UnsupportedContentType => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ApiError::Database(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the stable error code
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::InvalidPattern => "invalidPattern",
            ApiError::InvalidSlotNo => "invalidSlotNo",
            ApiError::InvalidStatusFlag => "invalidStatusFlag",
            ApiError::InvalidMatchFilter(_) => "invalidMatchFilter",
            ApiError::InvalidSortDirection => "invalidSortDirection",
            ApiError::MalformedPoint => "malformedPoint",
            ApiError::MalformedDatumHash => "malformedDatumHash",
            ApiError::MalformedScriptHash => "malformedScriptHash",
            ApiError::NonExistingPoint => "nonExistingPoint",
            ApiError::StillActivePattern(_) => "stillActivePattern",
            ApiError::UnsafeRollbackBeyondSafeZone => "unsafeRollbackBeyondSafeZone",
            ApiError::FailedToRollback(_) => "failedToRollback",
            ApiError::NoAncestor => "noAncestor",
            ApiError::NotFound => "notFound",
            ApiError::MethodNotAllowed => "methodNotAllowed",
            ApiError::UnsupportedContentType => "unsupportedContentType",
            ApiError::Database(_) | ApiError::Internal(_) => "internalError",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ApiErrorResponse {
            hint: self.to_string(),
            code: self.code().to_string(),
        };
        if status.is_server_error() {
            tracing::error!(target: "kupo::api", "request failed: {:?}", body);
        }
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bad_request_family() {
        for err in [
            ApiError::InvalidPattern,
            ApiError::InvalidSlotNo,
            ApiError::InvalidStatusFlag,
            ApiError::InvalidSortDirection,
            ApiError::MalformedPoint,
            ApiError::MalformedDatumHash,
            ApiError::MalformedScriptHash,
            ApiError::NonExistingPoint,
            ApiError::UnsafeRollbackBeyondSafeZone,
        ] {
            assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        }
    }

    #[test]
    fn test_still_active_pattern() {
        let err = ApiError::StillActivePattern("*".into());
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(err.code(), "stillActivePattern");
    }

    #[test]
    fn test_no_ancestor_is_404() {
        assert_eq!(ApiError::NoAncestor.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(ApiError::NoAncestor.code(), "noAncestor");
    }

    #[test]
    fn test_method_not_allowed_is_405() {
        assert_eq!(
            ApiError::MethodNotAllowed.status_code(),
            StatusCode::METHOD_NOT_ALLOWED
        );
    }

    #[test]
    fn test_unsupported_content_type_is_415() {
        assert_eq!(
            ApiError::UnsupportedContentType.status_code(),
            StatusCode::UNSUPPORTED_MEDIA_TYPE
        );
    }

    #[test]
    fn test_database_error_is_500() {
        let err = ApiError::Database(DatabaseError::Busy);
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.code(), "internalError");
    }
}
