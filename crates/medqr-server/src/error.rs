//! API error envelope.
//!
//! Every domain error maps to an HTTP status plus a stable machine-readable
//! kind. Scanning garbage (bad signature, malformed payload) is a client
//! error, never a 500.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use medqr_core::CoreError;
use medqr_ops::OpsError;
use medqr_session::SessionError;
use medqr_token::TokenError;
use serde_json::json;

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub kind: &'static str,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, kind: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            kind,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "bad_request", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "not_found", message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = json!({
            "error": {
                "kind": self.kind,
                "message": self.message,
            }
        });
        (self.status, Json(body)).into_response()
    }
}

impl From<TokenError> for ApiError {
    fn from(err: TokenError) -> Self {
        let status = match &err {
            TokenError::MissingSignature
            | TokenError::InvalidSignature
            | TokenError::MalformedPayload(_) => StatusCode::BAD_REQUEST,
            TokenError::NotFound | TokenError::Expired => StatusCode::NOT_FOUND,
            TokenError::Storage { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, err.kind(), err.to_string())
    }
}

impl From<SessionError> for ApiError {
    fn from(err: SessionError) -> Self {
        let status = match &err {
            SessionError::SessionNotFound => StatusCode::NOT_FOUND,
            SessionError::NoMatchedFlow => StatusCode::CONFLICT,
            SessionError::Storage { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, err.kind(), err.to_string())
    }
}

impl From<OpsError> for ApiError {
    fn from(err: OpsError) -> Self {
        let status = match &err {
            OpsError::NoMatchedOperation | OpsError::EntityNotFound { .. } => {
                StatusCode::NOT_FOUND
            }
            OpsError::ValidationFailed { .. } | OpsError::ExecutionFailed { .. } => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            OpsError::AlreadyProcessed => StatusCode::CONFLICT,
            OpsError::UnknownOperationCode { .. } | OpsError::Storage { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        Self::new(status, err.kind(), err.to_string())
    }
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        let status = if err.is_client_error() {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };
        Self::new(status, "invalid_request", err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_errors_are_client_errors() {
        let err: ApiError = TokenError::InvalidSignature.into();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert_eq!(err.kind, "invalid_signature");

        let err: ApiError = TokenError::NotFound.into();
        assert_eq!(err.status, StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_already_processed_is_conflict() {
        let err: ApiError = OpsError::AlreadyProcessed.into();
        assert_eq!(err.status, StatusCode::CONFLICT);
        assert_eq!(err.message, "Execution not found or already processed");
    }

    #[test]
    fn test_no_matched_flow_is_conflict() {
        let err: ApiError = SessionError::NoMatchedFlow.into();
        assert_eq!(err.status, StatusCode::CONFLICT);
    }
}
