//! Error types for the storage layer

use thiserror::Error;

/// Result type for storage operations
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors that can occur in the storage layer
#[derive(Error, Debug)]
pub enum StorageError {
    /// A checkpoint field was absent where one was expected
    #[error("Missing field {field:?} at position {position}")]
    MissingField {
        /// Name of the expected field
        field: &'static str,
        /// 1-based field position in the record stream
        position: u64,
    },

    /// A checkpoint field failed to parse
    #[error("Field {field:?} at position {position}: cannot parse {token:?}")]
    ParseField {
        /// Name of the field being read
        field: &'static str,
        /// 1-based field position in the record stream
        position: u64,
        /// Token that failed to parse
        token: String,
    },

    /// A checkpoint field held a value outside its domain
    #[error("Field {field:?} at position {position}: invalid value {value}")]
    InvalidValue {
        /// Name of the field being read
        field: &'static str,
        /// 1-based field position in the record stream
        position: u64,
        /// The offending value
        value: String,
    },

    /// I/O error
    #[error("I/O error: {source}")]
    Io {
        #[from]
        /// Source I/O error
        source: std::io::Error,
    },
}

impl StorageError {
    /// Create a missing-field error
    pub fn missing_field(field: &'static str, position: u64) -> Self {
        Self::MissingField { field, position }
    }

    /// Create a parse-field error
    pub fn parse_field(field: &'static str, position: u64, token: impl Into<String>) -> Self {
        Self::ParseField {
            field,
            position,
            token: token.into(),
        }
    }

    /// Create an invalid-value error
    pub fn invalid_value(field: &'static str, position: u64, value: impl Into<String>) -> Self {
        Self::InvalidValue {
            field,
            position,
            value: value.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = StorageError::missing_field("tauneg", 8);
        assert!(matches!(err, StorageError::MissingField { position: 8, .. }));

        let err = StorageError::parse_field("Wex", 6, "abc");
        assert!(matches!(err, StorageError::ParseField { .. }));
    }

    #[test]
    fn test_error_display() {
        let err = StorageError::parse_field("Apos", 12, "1.0.1");
        let msg = format!("{}", err);
        assert!(msg.contains("Apos"));
        assert!(msg.contains("position 12"));
    }
}
