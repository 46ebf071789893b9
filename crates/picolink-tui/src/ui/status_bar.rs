//! Status bar and notice line.
//!
//! The status bar mirrors the visible indicators of the presenter, followed
//! by keybinding hints. The notice line above it shows the last error.

use ratatui::{
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::Paragraph,
    Frame,
};

use picolink_conn::IndicatorView;
use picolink_core::STATUS;

use crate::app::App;
use crate::ui::theme::{key_style, render_icons, state_color};

/// Renders the visible indicators and key hints.
///
/// The status indicator takes the color of the connection state; the others
/// show their command key in the menu's style.
pub fn render_status_bar(frame: &mut Frame, area: Rect, app: &App) {
    let mut spans = indicator_spans(&app.status_line.visible(), state_color(&app.state));

    let sep_style = Style::default().fg(Color::DarkGray);
    spans.push(Span::styled("  |  ", sep_style));
    spans.push(Span::styled("^P", key_style()));
    spans.push(Span::raw(" commands"));
    spans.push(Span::styled("  ", sep_style));
    spans.push(Span::styled("^Q", key_style()));
    spans.push(Span::raw(" quit"));

    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}

fn indicator_spans(views: &[IndicatorView], status_color: Color) -> Vec<Span<'static>> {
    let mut spans = Vec::new();
    for view in views {
        let style = if view.key == STATUS {
            Style::default()
                .fg(status_color)
                .add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(Color::White)
        };
        spans.push(Span::raw(" "));
        spans.push(Span::styled(format!("[{}]", render_icons(&view.text)), style));
    }
    spans
}

pub fn render_notice(frame: &mut Frame, area: Rect, app: &App) {
    let Some(notice) = &app.notice else {
        return;
    };
    let line = Line::from(Span::styled(
        format!(" {notice}"),
        Style::default().fg(Color::Yellow),
    ));
    frame.render_widget(Paragraph::new(line), area);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn view(key: &str, text: &str) -> IndicatorView {
        IndicatorView {
            key: key.to_string(),
            text: text.to_string(),
            command: String::new(),
            tooltip: String::new(),
            visible: true,
        }
    }

    #[test]
    fn test_indicator_spans_render_icons() {
        let spans = indicator_spans(
            &[view(STATUS, "$(check) Pico Connected"), view("run", "$(triangle-right) Run")],
            Color::Green,
        );
        let text: String = spans.iter().map(|s| s.content.as_ref()).collect();
        assert_eq!(text, " [✓ Pico Connected] [▶ Run]");
    }

    #[test]
    fn test_status_indicator_uses_state_color() {
        let spans = indicator_spans(&[view(STATUS, "Pico Disconnected")], Color::Red);
        assert_eq!(spans.get(1).and_then(|s| s.style.fg), Some(Color::Red));
    }
}
