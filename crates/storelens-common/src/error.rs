//! Error types for Storelens
//!
//! Every contract operation returns one of these as a discriminated value.
//! Nothing is retried internally: a failure surfaces on the first attempt.

use thiserror::Error;

/// Result type alias using Storelens's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for Storelens
#[derive(Error, Debug)]
pub enum Error {
    // Connection Errors
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    // Capability Errors
    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    #[error("Unsupported shape: {0}")]
    UnsupportedShape(String),

    // Invalid mutation input
    #[error("Invalid input: {0}")]
    Input(#[from] InputError),

    #[error("Failed to decode field '{field}': {message}")]
    DecodeFailure { field: String, message: String },

    // Backend rejected a well-formed request
    #[error("Backend error: {0}")]
    Backend(String),

    // Malformed data on the wire
    #[error("Protocol error: {0}")]
    Protocol(String),

    // Configuration Errors
    #[error("Configuration error: {0}")]
    Config(String),

    // IO Errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Serialization Errors
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Mutation input that cannot be applied to the unit's current shape
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InputError {
    #[error("no values provided")]
    NoValues,

    #[error("missing '{0}'")]
    MissingField(String),

    #[error("expected {expected} value(s), got {actual}")]
    WrongArity { expected: usize, actual: usize },

    #[error("bad index: {0}")]
    BadIndex(String),
}

impl Error {
    /// Shorthand for an `Unsupported` error naming the operation
    pub fn unsupported(operation: impl Into<String>) -> Self {
        Error::Unsupported(operation.into())
    }

    /// Shorthand for a `DecodeFailure` on a named field
    pub fn decode(field: impl Into<String>, message: impl ToString) -> Self {
        Error::DecodeFailure {
            field: field.into(),
            message: message.to_string(),
        }
    }

    /// True for `Unsupported` and `UnsupportedShape`
    #[must_use]
    pub fn is_unsupported(&self) -> bool {
        matches!(self, Error::Unsupported(_) | Error::UnsupportedShape(_))
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(e: toml::de::Error) -> Self {
        Error::Config(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_error_converts() {
        let err: Error = InputError::MissingField("field".into()).into();
        assert!(matches!(err, Error::Input(InputError::MissingField(ref f)) if f == "field"));
        assert_eq!(err.to_string(), "Invalid input: missing 'field'");
    }

    #[test]
    fn test_unsupported_helpers() {
        assert!(Error::unsupported("get_graph").is_unsupported());
        assert!(Error::UnsupportedShape("stream".into()).is_unsupported());
        assert!(!Error::Backend("WRONGTYPE".into()).is_unsupported());
    }

    #[test]
    fn test_decode_failure_message() {
        let err = Error::decode("hash", "expected value at line 1 column 1");
        assert_eq!(
            err.to_string(),
            "Failed to decode field 'hash': expected value at line 1 column 1"
        );
    }
}
