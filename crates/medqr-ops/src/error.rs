use thiserror::Error;
use uuid::Uuid;

/// Errors that can occur during operation matching and execution.
#[derive(Debug, Error)]
pub enum OpsError {
    /// No active operation definition matches the scanned sequence.
    #[error("No operation matches the scanned sequence")]
    NoMatchedOperation,

    /// A definition references a handler code the registry does not know.
    /// Raised at catalog construction, before anything executes.
    #[error("Unknown operation code: {code}")]
    UnknownOperationCode { code: String },

    /// An operation step's validation rule or allow-list rejected a scan,
    /// or a handler precondition failed.
    #[error("Validation failed: {message}")]
    ValidationFailed { message: String },

    /// The execution is not pending (already confirmed, cancelled, or never
    /// existed).
    #[error("Execution not found or already processed")]
    AlreadyProcessed,

    /// A handler raised inside the atomic unit; the unit was rolled back and
    /// the failure recorded on the execution row.
    #[error("Operation failed: {message}")]
    ExecutionFailed { execution_id: Uuid, message: String },

    /// A handler referenced a domain record that does not exist.
    #[error("Entity not found: {entity_type}/{id}")]
    EntityNotFound { entity_type: String, id: String },

    /// The backing store failed.
    #[error("Storage error: {message}")]
    Storage { message: String },
}

impl OpsError {
    /// Create an `UnknownOperationCode` error.
    pub fn unknown_code(code: impl Into<String>) -> Self {
        Self::UnknownOperationCode { code: code.into() }
    }

    /// Create a `ValidationFailed` error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::ValidationFailed {
            message: message.into(),
        }
    }

    /// Create an `ExecutionFailed` error.
    pub fn execution_failed(execution_id: Uuid, message: impl Into<String>) -> Self {
        Self::ExecutionFailed {
            execution_id,
            message: message.into(),
        }
    }

    /// Create an `EntityNotFound` error.
    pub fn entity_not_found(entity_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self::EntityNotFound {
            entity_type: entity_type.into(),
            id: id.into(),
        }
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
            Self::NoMatchedOperation => "no_matched_operation",
            Self::UnknownOperationCode { .. } => "unknown_operation_code",
            Self::ValidationFailed { .. } => "validation_failed",
            Self::AlreadyProcessed => "already_processed",
            Self::ExecutionFailed { .. } => "execution_failed",
            Self::EntityNotFound { .. } => "entity_not_found",
            Self::Storage { .. } => "storage",
        }
    }
}

/// Convenience result type for operation handling
pub type OpsResult<T> = std::result::Result<T, OpsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages() {
        assert_eq!(
            OpsError::AlreadyProcessed.to_string(),
            "Execution not found or already processed"
        );
        assert_eq!(
            OpsError::entity_not_found("device", "9").to_string(),
            "Entity not found: device/9"
        );
        let err = OpsError::execution_failed(Uuid::new_v4(), "boom");
        assert_eq!(err.to_string(), "Operation failed: boom");
    }

    #[test]
    fn test_kinds() {
        assert_eq!(OpsError::NoMatchedOperation.kind(), "no_matched_operation");
        assert_eq!(OpsError::unknown_code("X").kind(), "unknown_operation_code");
        assert_eq!(OpsError::validation("v").kind(), "validation_failed");
    }
}
