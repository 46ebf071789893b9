//! Shared styling for the picolink console.

use ratatui::style::{Color, Modifier, Style};

use crate::app::AppState;

/// Glyph for an icon name used in indicator texts (`$(name)`).
pub fn icon_glyph(name: &str) -> Option<&'static str> {
    let glyph = match name {
        "check" => "✓",
        "chrome-close" => "✗",
        "primitive-square" => "■",
        "triangle-right" => "▶",
        "clear-all" => "⌫",
        "debug-disconnect" => "⏏",
        "list-unordered" => "☰",
        "sync" | "loading" => "↻",
        _ => return None,
    };
    Some(glyph)
}

/// Replaces `$(name)` placeholders with glyphs. Unknown icons are dropped.
pub fn render_icons(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(start) = rest.find("$(") {
        out.push_str(rest.get(..start).unwrap_or_default());
        let after = rest.get(start + 2..).unwrap_or_default();
        match after.find(')') {
            Some(end) => {
                if let Some(glyph) = icon_glyph(after.get(..end).unwrap_or_default()) {
                    out.push_str(glyph);
                }
                rest = after.get(end + 1..).unwrap_or_default();
            }
            None => {
                out.push_str(rest.get(start..).unwrap_or_default());
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out.trim_start().to_string()
}

/// Color of the connection state.
pub fn state_color(state: &AppState) -> Color {
    match state {
        AppState::Connected => Color::Green,
        AppState::Connecting => Color::Yellow,
        AppState::Disconnected { .. } => Color::Red,
    }
}

pub fn key_style() -> Style {
    Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_icons() {
        assert_eq!(render_icons("$(check) Pico Connected"), "✓ Pico Connected");
        assert_eq!(render_icons("$(triangle-right) Run"), "▶ Run");
        assert_eq!(render_icons("plain"), "plain");
    }

    #[test]
    fn test_render_icons_unknown_and_unterminated() {
        assert_eq!(render_icons("$(nope) Stop"), "Stop");
        assert_eq!(render_icons("a $(b"), "a $(b");
    }

    #[test]
    fn test_state_color() {
        assert_eq!(state_color(&AppState::Connected), Color::Green);
        assert_eq!(state_color(&AppState::Connecting), Color::Yellow);
    }
}
