//! Status indicator and command descriptors.
//!
//! These are the static, host-provided descriptions. Runtime visibility is
//! owned by the presenter in `picolink-conn`.

use serde::{Deserialize, Serialize};

/// Indicator that shows the connection title.
pub const STATUS: &str = "status";

/// Indicator that stops the running operation. Visible only during one.
pub const STOP: &str = "stop";

/// Indicator that opens the command menu. Always visible at idle.
pub const LIST_COMMANDS: &str = "listcommands";

/// Command behind [`LIST_COMMANDS`]; never listed in the menu itself.
pub const LIST_COMMANDS_COMMAND: &str = "picolink.listCommands";

/// Static description of one indicator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndicatorSpec {
    pub key: String,
    pub label: String,
    pub command: String,
    #[serde(default)]
    pub tooltip: String,
}

impl IndicatorSpec {
    pub fn new(key: &str, label: &str, command: &str, tooltip: &str) -> Self {
        Self {
            key: key.to_string(),
            label: label.to_string(),
            command: command.to_string(),
            tooltip: tooltip.to_string(),
        }
    }
}

/// A command offered through the command menu.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    pub command: String,
    pub title: String,
}

impl CommandSpec {
    pub fn new(command: &str, title: &str) -> Self {
        Self {
            command: command.to_string(),
            title: title.to_string(),
        }
    }
}

/// Icon and text for the status indicator.
pub fn connection_title(connected: bool) -> (&'static str, &'static str) {
    if connected {
        ("check", "Pico Connected")
    } else {
        ("chrome-close", "Pico Disconnected")
    }
}

/// Formats an icon/text pair the way indicator surfaces expect: `$(icon) text`.
pub fn icon_text(icon: &str, text: &str) -> String {
    format!("$({icon}) {text}")
}

/// Built-in indicator set, in display order.
pub fn default_indicators() -> Vec<IndicatorSpec> {
    vec![
        IndicatorSpec::new(STATUS, "Pico Disconnected", "picolink.connect", "Connect or reconnect"),
        IndicatorSpec::new(STOP, "$(primitive-square) Stop", "picolink.stop", "Stop the running operation"),
        IndicatorSpec::new("run", "$(triangle-right) Run", "picolink.run", "Run the selected file on the device"),
        IndicatorSpec::new("clear", "$(clear-all) Clear", "picolink.clear", "Clear the console"),
        IndicatorSpec::new("disconnect", "$(debug-disconnect) Disconnect", "picolink.disconnect", "Close the link"),
        IndicatorSpec::new(LIST_COMMANDS, "$(list-unordered) All commands", LIST_COMMANDS_COMMAND, "List all commands"),
    ]
}

/// Indicators visible at idle when nothing is configured.
pub fn default_visible_indicators() -> Vec<String> {
    [STATUS, "run", "clear", "disconnect"]
        .iter()
        .map(|key| key.to_string())
        .collect()
}

/// Built-in command menu entries.
pub fn default_commands() -> Vec<CommandSpec> {
    vec![
        CommandSpec::new("picolink.connect", "Connect"),
        CommandSpec::new("picolink.disconnect", "Disconnect"),
        CommandSpec::new("picolink.run", "Run current file"),
        CommandSpec::new("picolink.stop", "Stop"),
        CommandSpec::new("picolink.clear", "Clear console"),
        CommandSpec::new(LIST_COMMANDS_COMMAND, "List all commands"),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_titles() {
        assert_eq!(connection_title(true), ("check", "Pico Connected"));
        assert_eq!(connection_title(false), ("chrome-close", "Pico Disconnected"));
        assert_eq!(icon_text("check", "Pico Connected"), "$(check) Pico Connected");
    }

    #[test]
    fn test_default_indicators_include_required_keys() {
        let keys: Vec<String> = default_indicators().into_iter().map(|s| s.key).collect();
        for required in [STATUS, STOP, LIST_COMMANDS] {
            assert!(keys.iter().any(|k| k == required), "missing {required}");
        }
    }

    #[test]
    fn test_default_visible_never_contains_stop() {
        assert!(!default_visible_indicators().iter().any(|k| k == STOP));
    }

    #[test]
    fn test_indicator_spec_tooltip_defaults() {
        let spec: IndicatorSpec =
            serde_json::from_str(r#"{"key":"run","label":"Run","command":"picolink.run"}"#).unwrap();
        assert_eq!(spec.tooltip, "");
    }
}
