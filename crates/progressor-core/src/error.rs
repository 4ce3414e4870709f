use thiserror::Error;

/// Top-level error type for Progressor.
#[derive(Debug, Error)]
pub enum ProgressorError {
    /// A field/column that the entity does not declare.
    #[error("invalid field '{field}' for {entity}")]
    InvalidField { entity: String, field: String },

    /// An entity tag that is not a storage-mapped type.
    #[error("invalid entity type: {0}")]
    InvalidType(String),

    /// Uniqueness, foreign-key, not-null or check violation in storage.
    #[error("constraint violation: {0}")]
    Constraint(String),

    /// User-supplied data failed shape or range checks.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Relational storage error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Key-value cache backend error.
    #[error("cache error: {0}")]
    Cache(String),

    /// Error from a messaging channel.
    #[error("channel error: {0}")]
    Channel(String),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// A single rejected input field.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}
