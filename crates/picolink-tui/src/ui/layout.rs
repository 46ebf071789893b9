//! Layout helpers for the picolink console.

use ratatui::layout::{Constraint, Direction, Flex, Layout, Rect};

/// Main screen areas, top to bottom.
///
/// - Console (fills remaining): device output
/// - Notice (1 line): last error or hint
/// - Status (1 line): indicators and key hints
#[derive(Debug, Clone, Copy)]
pub struct AppLayout {
    pub console: Rect,
    pub notice: Rect,
    pub status: Rect,
}

impl AppLayout {
    pub fn new(area: Rect) -> Self {
        let [console, notice, status] = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Min(3),
                Constraint::Length(1),
                Constraint::Length(1),
            ])
            .areas(area);

        Self {
            console,
            notice,
            status,
        }
    }
}

/// A `width` x `height` rectangle centered in `area`, clamped to fit.
pub fn centered_rect(width: u16, height: u16, area: Rect) -> Rect {
    let [row] = Layout::vertical([Constraint::Length(height.min(area.height))])
        .flex(Flex::Center)
        .areas(area);
    let [rect] = Layout::horizontal([Constraint::Length(width.min(area.width))])
        .flex(Flex::Center)
        .areas(row);
    rect
}
