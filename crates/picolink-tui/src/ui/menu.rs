//! Command menu overlay.

use ratatui::{
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, List, ListItem, ListState},
    Frame,
};

use crate::app::App;
use crate::ui::layout::centered_rect;

const MENU_WIDTH: u16 = 44;

/// Renders the command list centered over `area`, if the menu is open.
pub fn render_menu(frame: &mut Frame, area: Rect, app: &App) {
    if !app.menu_state.open {
        return;
    }

    let items = app.menu.items();
    let rows: Vec<ListItem> = items
        .iter()
        .map(|item| {
            ListItem::new(Line::from(vec![
                Span::raw(item.title.clone()),
                Span::styled(
                    format!("  {}", item.command),
                    Style::default().fg(Color::DarkGray),
                ),
            ]))
        })
        .collect();

    let height = u16::try_from(items.len()).unwrap_or(u16::MAX).saturating_add(2);
    let popup = centered_rect(MENU_WIDTH, height, area);

    let list = List::new(rows)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(" Commands ")
                .border_style(Style::default().fg(Color::Cyan)),
        )
        .highlight_style(
            Style::default()
                .bg(Color::DarkGray)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("> ");

    let mut state = ListState::default().with_selected(Some(app.menu_state.selected));

    frame.render_widget(Clear, popup);
    frame.render_stateful_widget(list, popup, &mut state);
}
