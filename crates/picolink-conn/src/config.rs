//! Link configuration.
//!
//! Loaded from TOML. Every key is optional; a missing file yields the
//! defaults, which reproduce the classic behavior (20 attempts, 200ms apart,
//! ports drawn from 1337..2337 on loopback).
//!
//! # Example
//!
//! ```toml
//! interpreter = "/usr/bin/python3"
//! script_path = "/opt/picolink/terminalExec.py"
//! max_attempts = 10
//! statusbar_buttons = ["status", "run"]
//!
//! [port_range]
//! start = 1337
//! end = 2337
//! ```

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use picolink_core::indicator::{default_commands, default_indicators, default_visible_indicators};
use picolink_core::policy::{DEFAULT_MAX_ATTEMPTS, DEFAULT_RETRY_DELAY};
use picolink_core::{
    CommandSpec, DomainError, IndicatorSpec, PortRange, ReconnectPolicy, DEFAULT_HOST, DEFAULT_PROCESS_NAME,
};

use crate::error::{LinkError, Result};

/// Environment variable overriding the config file location.
pub const CONFIG_ENV: &str = "PICOLINK_CONFIG";

/// Default bridge script file name.
pub const DEFAULT_SCRIPT_NAME: &str = "terminalExec.py";

/// Default connect timeout per attempt.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

/// Configuration for the link, the bridge process and the status surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    /// Host the bridge listens on.
    pub host: String,

    /// Ports a bridge may be told to bind.
    pub port_range: PortRange,

    /// Connection attempts per lifecycle before giving up.
    pub max_attempts: u32,

    /// Fixed delay between attempts.
    pub retry_delay_ms: u64,

    /// How long a single connect may take before it counts as a timeout.
    pub connect_timeout_ms: u64,

    /// Interpreter that runs the bridge script.
    pub interpreter: PathBuf,

    /// Bridge script; receives the port as its only argument.
    pub script_path: PathBuf,

    /// Name of the bridge process, used to match exit notifications.
    pub process_name: String,

    /// Indicators shown at idle (`listcommands` is always added).
    pub statusbar_buttons: Vec<String>,

    /// Indicator descriptors in display order.
    pub indicators: Vec<IndicatorSpec>,

    /// Command menu entries.
    pub commands: Vec<CommandSpec>,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port_range: PortRange::default(),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_delay_ms: DEFAULT_RETRY_DELAY.as_millis() as u64,
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT.as_millis() as u64,
            interpreter: PathBuf::from("python3"),
            script_path: default_script_path(),
            process_name: DEFAULT_PROCESS_NAME.to_string(),
            statusbar_buttons: default_visible_indicators(),
            indicators: default_indicators(),
            commands: default_commands(),
        }
    }
}

impl LinkConfig {
    /// Loads configuration from `path`. A missing file yields defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).map_err(|e| LinkError::Config {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| LinkError::Config {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        debug!(path = %path.display(), "Loaded config");
        Ok(config)
    }

    /// Loads from `$PICOLINK_CONFIG`, then the platform config dir.
    pub fn load_default() -> Result<Self> {
        match Self::default_path() {
            Some(path) => Self::load(&path),
            None => Ok(Self::default()),
        }
    }

    /// Resolved location of the config file, if one can be determined.
    pub fn default_path() -> Option<PathBuf> {
        if let Ok(path) = env::var(CONFIG_ENV) {
            return Some(PathBuf::from(path));
        }
        dirs::config_dir().map(|dir| dir.join("picolink").join("config.toml"))
    }

    /// Rejects values that would make the link unusable.
    pub fn validate(&self) -> Result<()> {
        PortRange::new(self.port_range.start, self.port_range.end)?;
        require_positive("max_attempts", self.max_attempts.into())?;
        require_positive("connect_timeout_ms", self.connect_timeout_ms)?;
        Ok(())
    }

    pub fn policy(&self) -> ReconnectPolicy {
        ReconnectPolicy::new(self.max_attempts, Duration::from_millis(self.retry_delay_ms))
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

fn require_positive(field: &str, value: u64) -> Result<()> {
    if value == 0 {
        return Err(DomainError::InvalidFieldValue {
            field: field.to_string(),
            value: value.to_string(),
            expected: "a value greater than 0".to_string(),
        }
        .into());
    }
    Ok(())
}

/// `<data_dir>/picolink/terminalExec.py`, or a relative path as a fallback.
fn default_script_path() -> PathBuf {
    dirs::data_dir()
        .map(|dir| dir.join("picolink").join(DEFAULT_SCRIPT_NAME))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_SCRIPT_NAME))
}

#[cfg(test)]
mod tests {
    use super::*;
    use picolink_core::{LIST_COMMANDS_COMMAND, STOP};

    #[test]
    fn test_defaults_match_classic_behavior() {
        let config = LinkConfig::default();
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port_range, PortRange::default());
        assert_eq!(config.policy(), ReconnectPolicy::default());
        assert_eq!(config.connect_timeout(), Duration::from_secs(3));
        assert!(config.script_path.ends_with(DEFAULT_SCRIPT_NAME));
        assert!(!config.statusbar_buttons.iter().any(|k| k == STOP));
        assert!(config.commands.iter().any(|c| c.command == LIST_COMMANDS_COMMAND));
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let config = LinkConfig::load(Path::new("/nonexistent/picolink/config.toml")).unwrap();
        assert_eq!(config, LinkConfig::default());
    }

    #[test]
    fn test_partial_toml_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            r#"
interpreter = "/usr/bin/python3"
max_attempts = 5
retry_delay_ms = 50
statusbar_buttons = ["status"]

[port_range]
start = 4000
end = 4010
"#,
        )
        .unwrap();

        let config = LinkConfig::load(&path).unwrap();
        assert_eq!(config.interpreter, PathBuf::from("/usr/bin/python3"));
        assert_eq!(config.policy(), ReconnectPolicy::new(5, Duration::from_millis(50)));
        assert_eq!(config.port_range, PortRange { start: 4000, end: 4010 });
        assert_eq!(config.statusbar_buttons, vec!["status".to_string()]);
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.indicators, default_indicators());
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "max_attempts = = 3").unwrap();

        let result = LinkConfig::load(&path);
        assert!(matches!(result, Err(LinkError::Config { .. })));
    }

    #[test]
    fn test_inverted_port_range_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[port_range]\nstart = 3000\nend = 2000\n").unwrap();

        let result = LinkConfig::load(&path);
        assert!(matches!(result, Err(LinkError::Domain(_))));
    }

    #[test]
    fn test_zero_attempts_rejected() {
        let config = LinkConfig {
            max_attempts: 0,
            ..LinkConfig::default()
        };
        let error = config.validate().unwrap_err();
        assert!(format!("{error}").contains("max_attempts"));
    }

    #[test]
    fn test_zero_connect_timeout_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "connect_timeout_ms = 0\n").unwrap();

        match LinkConfig::load(&path) {
            Err(LinkError::Domain(e)) => assert!(e.to_string().contains("connect_timeout_ms")),
            other => panic!("expected domain error, got {other:?}"),
        }
    }
}
