//! UI rendering for the picolink console.
//!
//! # Layout Structure
//!
//! ```text
//! +-- picolink ---------------------------------------+
//! | MicroPython v1.22.0 on 2024-01-01; Raspberry Pi   |
//! | >>> print(1)                                      |
//! | 1                                                 |  <- fills remaining
//! | >>>                                               |
//! +---------------------------------------------------+
//!  Connection failed after 5 attempts                    <- notice, 1 line
//!  [✓ Pico Connected] [▶ Run] ...  |  ^P commands        <- status, 1 line
//! ```
//!
//! The command menu is drawn centered on top when open.

pub mod console;
pub mod layout;
pub mod menu;
pub mod status_bar;
pub mod theme;

use ratatui::Frame;

use crate::app::App;
use layout::AppLayout;

pub use console::render_console;
pub use menu::render_menu;
pub use status_bar::{render_notice, render_status_bar};

/// Renders the whole screen.
///
/// ```ignore
/// terminal.draw(|frame| ui::render(frame, &app))?;
/// ```
pub fn render(frame: &mut Frame, app: &App) {
    let area = frame.area();
    let layout = AppLayout::new(area);

    render_console(frame, layout.console, app);
    render_notice(frame, layout.notice, app);
    render_status_bar(frame, layout.status, app);
    render_menu(frame, area, app);
}

#[cfg(test)]
mod tests {
    use super::*;
    use picolink_conn::LinkConfig;
    use ratatui::{backend::TestBackend, buffer::Buffer, Terminal};

    fn draw(app: &App) -> Buffer {
        let mut terminal = Terminal::new(TestBackend::new(80, 24)).unwrap();
        terminal.draw(|frame| render(frame, app)).unwrap();
        terminal.backend().buffer().clone()
    }

    fn screen(buffer: &Buffer) -> String {
        buffer
            .content()
            .iter()
            .map(|cell| cell.symbol())
            .collect::<Vec<_>>()
            .join("")
    }

    fn app() -> App {
        App::new(&LinkConfig::default()).unwrap()
    }

    #[test]
    fn test_render_connecting_state() {
        let screen = screen(&draw(&app()));
        assert!(screen.contains("picolink"));
        assert!(screen.contains("Pico Disconnected"));
    }

    #[test]
    fn test_render_output_and_connected_title() {
        let mut app = app();
        app.mark_connected();
        app.push_output(b"MicroPython v1.22.0\r\n>>> ");

        let screen = screen(&draw(&app));
        assert!(screen.contains("MicroPython v1.22.0"));
        assert!(screen.contains(">>>"));
        assert!(screen.contains("Pico Connected"));
    }

    #[test]
    fn test_render_disconnected_with_notice() {
        let mut app = app();
        app.mark_disconnected(Some("Connection failed".to_string()));

        let screen = screen(&draw(&app));
        assert!(screen.contains("Connection failed"));
    }

    #[test]
    fn test_render_menu_overlay() {
        let mut app = app();
        app.open_menu();

        let screen = screen(&draw(&app));
        assert!(screen.contains("Commands"));
        assert!(screen.contains("Run current file"));
        assert!(!screen.contains("List all commands"));
    }

    #[test]
    fn test_render_tiny_terminal() {
        let mut terminal = Terminal::new(TestBackend::new(10, 3)).unwrap();
        let mut app = app();
        app.open_menu();
        terminal.draw(|frame| render(frame, &app)).unwrap();
    }
}
