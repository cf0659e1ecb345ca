use thiserror::Error;

/// Errors that can occur during session and flow operations.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The session has expired or never existed.
    #[error("Session expired or not found")]
    SessionNotFound,

    /// `execute_flow` was called before any workflow matched.
    #[error("No matched flow to execute")]
    NoMatchedFlow,

    /// The backing store failed.
    #[error("Storage error: {message}")]
    Storage { message: String },
}

impl SessionError {
    /// Create a `Storage` error.
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// Stable machine-readable kind, used by the API error envelope.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SessionNotFound => "session_not_found",
            Self::NoMatchedFlow => "no_matched_flow",
            Self::Storage { .. } => "storage",
        }
    }
}

/// Convenience result type for session operations
pub type SessionResult<T> = std::result::Result<T, SessionError>;
