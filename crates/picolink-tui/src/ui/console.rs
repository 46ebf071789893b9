//! Console widget: the device output, newest line at the bottom.

use ratatui::{
    layout::Rect,
    style::Style,
    text::Line,
    widgets::{Block, Borders, Paragraph},
    Frame,
};

use crate::app::App;
use crate::ui::theme::state_color;

pub fn render_console(frame: &mut Frame, area: Rect, app: &App) {
    let height = usize::from(area.height.saturating_sub(2));
    let lines: Vec<Line> = visible_lines(app, height)
        .into_iter()
        .map(|line| Line::raw(line.to_string()))
        .collect();

    let mut title = String::from(" picolink ");
    if app.scroll > 0 {
        title.push_str(&format!("[+{}] ", app.scroll));
    }

    let console = Paragraph::new(lines).block(
        Block::default()
            .borders(Borders::ALL)
            .title(title)
            .border_style(Style::default().fg(state_color(&app.state))),
    );

    frame.render_widget(console, area);
}

/// The `height` lines that fit, ending `app.scroll` lines above the tail.
fn visible_lines(app: &App, height: usize) -> Vec<&str> {
    let total = app.scrollback.line_count();
    let end = total.saturating_sub(app.scroll);
    let start = end.saturating_sub(height);
    app.scrollback
        .lines()
        .skip(start)
        .take(end - start)
        .collect()
}
