use thiserror::Error;

/// Core error types shared across the MedQR crates.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Invalid entity type: {0}")]
    InvalidEntityType(String),

    #[error("Invalid entity reference: {0}")]
    InvalidEntityRef(String),

    #[error("Entity not found: {entity_type}/{id}")]
    EntityNotFound { entity_type: String, id: String },

    #[error("JSON serialization error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("UUID error: {0}")]
    UuidError(#[from] uuid::Error),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl CoreError {
    /// Create a new InvalidEntityType error
    pub fn invalid_entity_type(name: impl Into<String>) -> Self {
        Self::InvalidEntityType(name.into())
    }

    /// Create a new InvalidEntityRef error
    pub fn invalid_entity_ref(message: impl Into<String>) -> Self {
        Self::InvalidEntityRef(message.into())
    }

    /// Create a new EntityNotFound error
    pub fn entity_not_found(entity_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self::EntityNotFound {
            entity_type: entity_type.into(),
            id: id.into(),
        }
    }

    /// Create a new Configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Check if this error is caused by bad caller input (as opposed to a
    /// server-side problem).
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidEntityType(_)
                | Self::InvalidEntityRef(_)
                | Self::EntityNotFound { .. }
                | Self::JsonError(_)
        )
    }
}

/// Convenience result type for core operations
pub type Result<T> = std::result::Result<T, CoreError>;
