//! Error types for the picolink connection layer.
//!
//! Only two failures ever reach the connect callback: a spent retry budget and
//! a failed spawn. Everything else (socket timeouts, resets, process exits) is
//! handled inside the orchestrator and only logged.
//!
//! **Panic-Free Policy:** This module follows the project's panic-free guidelines.
//! No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, or `todo!()`.

use std::io;
use std::path::PathBuf;

use picolink_core::{DomainError, EXHAUSTED_MESSAGE};
use thiserror::Error;

// ============================================================================
// Link Error Type
// ============================================================================

/// Connection layer errors.
#[derive(Error, Debug)]
pub enum LinkError {
    /// Every connection attempt failed.
    ///
    /// Terminal: no further attempts are made until the link is
    /// initialized again.
    #[error("{message} (gave up after {attempts} attempts)", message = EXHAUSTED_MESSAGE)]
    RetriesExhausted {
        /// Number of connection attempts that were made.
        attempts: u32,
    },

    /// The bridge process could not be launched.
    ///
    /// Usually a wrong interpreter or script path in the configuration.
    /// Automatic restarts are suppressed after this error.
    #[error("Failed to start the bridge process: {0}")]
    SpawnFailed(String),

    /// The orchestrator task is gone (disconnected or shut down).
    #[error("Connection orchestrator is not running")]
    ChannelClosed,

    /// A required indicator is missing from the configured set.
    #[error("Missing required indicator: {0}")]
    MissingIndicator(String),

    /// Configuration file could not be read or parsed.
    #[error("Invalid configuration in {}: {reason}", .path.display())]
    Config {
        /// File that failed to load.
        path: PathBuf,
        /// Parser or I/O message.
        reason: String,
    },

    /// Domain validation failure.
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// Persisted state could not be encoded or decoded.
    #[error("Failed to parse persisted state: {0}")]
    State(#[from] serde_json::Error),

    /// I/O error passthrough.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl LinkError {
    /// Returns true for errors delivered through the connect callback that
    /// end the lifecycle.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::RetriesExhausted { .. } | Self::SpawnFailed(_))
    }
}

// ============================================================================
// Result Type Alias
// ============================================================================

/// Convenience Result type alias for link operations.
pub type Result<T> = std::result::Result<T, LinkError>;

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retries_exhausted_display() {
        let error = LinkError::RetriesExhausted { attempts: 20 };
        let display = format!("{error}");
        assert!(display.contains("Unable to start the terminal"));
        assert!(display.contains("20 attempts"));
        assert!(error.is_terminal());
    }

    #[test]
    fn test_spawn_failed_display() {
        let error = LinkError::SpawnFailed("No such file or directory".to_string());
        let display = format!("{error}");
        assert!(display.contains("Failed to start the bridge process"));
        assert!(display.contains("No such file"));
        assert!(error.is_terminal());
    }

    #[test]
    fn test_config_error_display() {
        let error = LinkError::Config {
            path: PathBuf::from("/etc/picolink.toml"),
            reason: "expected `=`".to_string(),
        };
        let display = format!("{error}");
        assert!(display.contains("/etc/picolink.toml"));
        assert!(display.contains("expected `=`"));
        assert!(!error.is_terminal());
    }

    #[test]
    fn test_io_error_from_conversion() {
        let io_error = io::Error::new(io::ErrorKind::ConnectionRefused, "refused");
        let link_error: LinkError = io_error.into();
        assert!(matches!(link_error, LinkError::Io(_)));
        assert!(format!("{link_error}").contains("IO error"));
    }

    #[test]
    fn test_domain_error_is_transparent() {
        let error: LinkError = DomainError::ParseError {
            field: "processId".to_string(),
            reason: "empty".to_string(),
        }
        .into();
        assert_eq!(format!("{error}"), "Failed to parse processId: empty");
    }

    #[test]
    fn test_state_error_from_conversion() {
        let parse_result: std::result::Result<serde_json::Value, _> =
            serde_json::from_str("{ nope }");
        let link_error: LinkError = parse_result.unwrap_err().into();
        assert!(matches!(link_error, LinkError::State(_)));
    }
}
