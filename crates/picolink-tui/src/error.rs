//! Error types for the picolink console.
//!
//! **Panic-Free Policy:** This module follows the project's panic-free guidelines.
//! No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, or `todo!()`.

use std::io;

use picolink_conn::LinkError;
use thiserror::Error;

/// Console errors.
#[derive(Error, Debug)]
pub enum TuiError {
    /// Raw mode or the alternate screen could not be set up.
    ///
    /// Usually means stdout is not a TTY.
    #[error("Failed to initialize terminal: {0}")]
    TerminalInit(String),

    /// The terminal could not be restored on exit; `reset` recovers it.
    #[error("Failed to restore terminal: {0}")]
    TerminalCleanup(String),

    /// No file was given for the run command.
    #[error("No file to run; start with --file <path>")]
    NoRunFile,

    #[error(transparent)]
    Link(#[from] LinkError),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Convenience Result type alias for console operations.
pub type Result<T> = std::result::Result<T, TuiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_init_display() {
        let error = TuiError::TerminalInit("not a tty".to_string());
        assert_eq!(format!("{error}"), "Failed to initialize terminal: not a tty");
    }

    #[test]
    fn test_link_error_is_transparent() {
        let error: TuiError = LinkError::ChannelClosed.into();
        assert_eq!(format!("{error}"), "Connection orchestrator is not running");
    }
}
