//! Token error types.
//!
//! Signature and parse failures are values, never panics: scanning garbage
//! input must degrade to "invalid code", not a crash.

use thiserror::Error;

/// Errors that can occur during token issuance and resolution.
#[derive(Debug, Error)]
pub enum TokenError {
    /// The token text carries no trailing signature segment.
    #[error("Missing signature")]
    MissingSignature,

    /// The signature does not match the payload.
    #[error("Invalid signature")]
    InvalidSignature,

    /// The payload is structurally invalid.
    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    /// No stored record for the token's UUID (never issued, evicted, or
    /// expired).
    #[error("Token expired or not found")]
    NotFound,

    /// An ephemeral token outlived its validity window.
    #[error("Ephemeral token expired")]
    Expired,

    /// The backing store failed.
    #[error("Storage error: {message}")]
    Storage { message: String },
}

impl TokenError {
    /// Create a `MalformedPayload` error.
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedPayload(message.into())
    }

    /// Create a `Storage` error.
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// Stable machine-readable kind, used by the API error envelope.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MissingSignature => "missing_signature",
            Self::InvalidSignature => "invalid_signature",
            Self::MalformedPayload(_) => "malformed_payload",
            Self::NotFound => "not_found",
            Self::Expired => "expired",
            Self::Storage { .. } => "storage",
        }
    }

    /// Returns `true` when the error means "this code is not acceptable"
    /// rather than a server-side fault.
    pub fn is_rejection(&self) -> bool {
        !matches!(self, Self::Storage { .. })
    }
}

/// Convenience result type for token operations
pub type TokenResult<T> = std::result::Result<T, TokenError>;
