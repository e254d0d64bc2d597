//! Error types for keyspace-invalidator.

use std::fmt;

/// Result type alias for keyspace-invalidator operations.
pub type Result<T> = std::result::Result<T, InvalidatorError>;

/// Errors that can occur while configuring or running an invalidation listener.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvalidatorError {
    /// The initial connection or subscription could not be established.
    ///
    /// Covers unreachable hosts, rejected authentication, a refused
    /// `CONFIG SET`, a failed `PSUBSCRIBE`, and connect timeouts.
    #[error("Connection error: {0}")]
    Connection(String),

    /// The subscription failed after it was established (socket closed,
    /// stream ended, malformed reply).
    #[error("Transport error: {0}")]
    Transport(String),

    /// A handler invocation panicked.
    #[error("Handler error: {0}")]
    Handler(String),

    /// Failed to load configuration from a source.
    #[error("Failed to load configuration: {0}")]
    Config(String),

    /// Failed to deserialize configuration.
    #[error("Failed to deserialize configuration: {0}")]
    Deserialization(String),

    /// Configuration validation failed.
    #[error("Configuration validation failed: {0}")]
    Validation(String),

    /// The listener task was aborted before it could finish cooperatively.
    #[error("Listener task was cancelled")]
    Cancelled,
}

impl InvalidatorError {
    /// Whether the listener may recover from this error by resubscribing.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

/// Validation error for configuration validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Custom validation error with a message.
    Custom(String),

    /// A specific field has an invalid value.
    InvalidField {
        /// The field name/path
        field: String,
        /// The reason why it's invalid
        reason: String,
    },

    /// Multiple validation errors occurred.
    Multiple(Vec<ValidationError>),
}

impl ValidationError {
    /// Create a custom validation error.
    pub fn custom(msg: impl Into<String>) -> Self {
        Self::Custom(msg.into())
    }

    /// Create an invalid field error.
    pub fn invalid_field(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidField {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Collapse a list of errors: `Ok` when empty, the single error when
    /// there is one, `Multiple` otherwise.
    pub fn from_list(mut errors: Vec<ValidationError>) -> std::result::Result<(), Self> {
        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(Self::Multiple(errors)),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Custom(msg) => write!(f, "{}", msg),
            Self::InvalidField { field, reason } => {
                write!(f, "Field '{}' is invalid: {}", field, reason)
            }
            Self::Multiple(errors) => {
                writeln!(f, "Multiple validation errors:")?;
                for (i, err) in errors.iter().enumerate() {
                    writeln!(f, "  {}. {}", i + 1, err)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ValidationError {}

impl From<ValidationError> for InvalidatorError {
    fn from(err: ValidationError) -> Self {
        InvalidatorError::Validation(err.to_string())
    }
}
