//! Identity and launch parameters of the bridge process.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// Name given to the bridge process; exit notifications are matched on it.
pub const DEFAULT_PROCESS_NAME: &str = "Pico Console";

/// OS-level identifier of a spawned process.
///
/// Persisted across restarts so an orphan left by an ungraceful shutdown can
/// be found and terminated before a new process is started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProcessId(u32);

impl ProcessId {
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn as_u32(&self) -> u32 {
        self.0
    }
}

impl From<u32> for ProcessId {
    fn from(raw: u32) -> Self {
        Self(raw)
    }
}

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ProcessId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<u32>()
            .map(Self)
            .map_err(|e| DomainError::ParseError {
                field: "processId".to_string(),
                reason: e.to_string(),
            })
    }
}

/// Everything needed to launch one bridge process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpawnSpec {
    /// Display name, also used to match exit notifications.
    pub name: String,
    /// Interpreter executable (e.g. `python3`).
    pub program: PathBuf,
    /// Bridge script passed as the first argument.
    pub script: PathBuf,
    /// Port the bridge must listen on.
    pub port: u16,
    /// Transient processes are killed when their handle is dropped.
    pub transient: bool,
}

impl SpawnSpec {
    /// Arguments passed to the interpreter: `[script, port]`.
    pub fn args(&self) -> Vec<String> {
        vec![
            self.script.to_string_lossy().into_owned(),
            self.port.to_string(),
        ]
    }
}
