//! Domain-specific error types following panic-free policy.

use thiserror::Error;

/// Errors that can occur in domain operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Invalid field value
    #[error("Invalid {field}: {value} (expected {expected})")]
    InvalidFieldValue {
        field: String,
        value: String,
        expected: String,
    },

    /// Parse error for incoming data
    #[error("Failed to parse {field}: {reason}")]
    ParseError { field: String, reason: String },
}

/// Result type for domain operations.
pub type DomainResult<T> = Result<T, DomainError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_field_display() {
        let error = DomainError::InvalidFieldValue {
            field: "port_range".to_string(),
            value: "2000..1000".to_string(),
            expected: "start < end".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Invalid port_range: 2000..1000 (expected start < end)"
        );
    }

    #[test]
    fn test_parse_error_display() {
        let error = DomainError::ParseError {
            field: "processId".to_string(),
            reason: "invalid digit found in string".to_string(),
        };
        assert!(error.to_string().contains("Failed to parse processId"));
    }
}
