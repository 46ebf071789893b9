//! Keyboard input handling for the picolink console.
//!
//! Keys go straight to the device as bytes unless they belong to the console
//! itself (quit, menu, scrolling).
//!
//! All code follows the panic-free policy: no `.unwrap()`, `.expect()`,
//! `panic!()`, `unreachable!()`, `todo!()`, or direct indexing `[i]`.

use std::cell::RefCell;

use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use picolink_conn::CommandExecutor;

use crate::app::App;

/// Lines moved per PageUp/PageDown.
const PAGE: usize = 10;

// ============================================================================
// Event Types
// ============================================================================

/// Events processed by the main loop.
#[derive(Debug, Clone)]
pub enum Event {
    /// Keyboard input from the user.
    Key(KeyEvent),

    /// Terminal window resize event.
    Resize(u16, u16),

    /// Bytes received from the device.
    Output(Vec<u8>),

    /// The link came up.
    LinkUp,

    /// The link dropped and the connection is reconnecting.
    LinkDown,

    /// The link gave up for good; carries the reason.
    LinkFailed(String),

    /// The run with this id finished on its own or was stopped.
    OperationFinished(u64),
}

// ============================================================================
// Action Types
// ============================================================================

/// What the main loop should do in response to a key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    None,

    Quit,

    /// Forward these bytes to the device.
    Send(Vec<u8>),

    /// Run a command by name (e.g. `picolink.run`).
    Execute(String),
}

// ============================================================================
// Input Handler
// ============================================================================

/// Handles a keyboard event and updates application state accordingly.
///
/// # Key Bindings
///
/// | Key                | Action                          |
/// |--------------------|---------------------------------|
/// | `Ctrl+Q`           | Quit                            |
/// | `Ctrl+P`           | Open / close the command menu   |
/// | `Up`/`Down`, Enter | Navigate / run (menu open)      |
/// | `Esc`              | Close the menu (menu open)      |
/// | `PageUp`/`PageDown`| Scroll the console              |
/// | anything else      | Sent to the device              |
#[must_use]
pub fn handle_key_event(key: KeyEvent, app: &mut App) -> Action {
    if key.kind == KeyEventKind::Release {
        return Action::None;
    }

    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);

    if ctrl && matches!(key.code, KeyCode::Char('q') | KeyCode::Char('Q')) {
        app.quit();
        return Action::Quit;
    }

    if ctrl && matches!(key.code, KeyCode::Char('p') | KeyCode::Char('P')) {
        if app.menu_state.open {
            app.close_menu();
        } else {
            app.open_menu();
        }
        return Action::None;
    }

    if app.menu_state.open {
        return handle_menu_key(key, app);
    }

    match key.code {
        KeyCode::PageUp => {
            app.scroll_up(PAGE);
            Action::None
        }
        KeyCode::PageDown => {
            app.scroll_down(PAGE);
            Action::None
        }
        _ => match key_to_bytes(&key) {
            Some(bytes) => {
                app.scroll = 0;
                Action::Send(bytes)
            }
            None => Action::None,
        },
    }
}

fn handle_menu_key(key: KeyEvent, app: &mut App) -> Action {
    match key.code {
        KeyCode::Esc => {
            app.close_menu();
            Action::None
        }
        KeyCode::Up | KeyCode::Char('k') => {
            app.menu_previous();
            Action::None
        }
        KeyCode::Down | KeyCode::Char('j') => {
            app.menu_next();
            Action::None
        }
        KeyCode::Enter => {
            let Some(item) = app.selected_command() else {
                return Action::None;
            };
            app.close_menu();
            let picked = Picked::default();
            app.menu.select(&item, &picked);
            match picked.0.into_inner() {
                Some(command) => Action::Execute(command),
                None => Action::None,
            }
        }
        _ => Action::None,
    }
}

/// Records the command a menu selection dispatched.
#[derive(Default)]
struct Picked(RefCell<Option<String>>);

impl CommandExecutor for Picked {
    fn execute(&self, command: &str) {
        *self.0.borrow_mut() = Some(command.to_string());
    }
}

/// Bytes a key sends to the device, if any.
///
/// Printable characters are sent as UTF-8, `Ctrl+<letter>` as the matching
/// control byte, Enter as `\r\n`, and arrows as ANSI cursor sequences.
pub fn key_to_bytes(key: &KeyEvent) -> Option<Vec<u8>> {
    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);

    match key.code {
        KeyCode::Char(c) if ctrl => control_byte(c).map(|b| vec![b]),
        KeyCode::Char(c) => {
            let mut buf = [0u8; 4];
            Some(c.encode_utf8(&mut buf).as_bytes().to_vec())
        }
        KeyCode::Enter => Some(b"\r\n".to_vec()),
        KeyCode::Backspace => Some(vec![0x7f]),
        KeyCode::Tab => Some(vec![b'\t']),
        KeyCode::Esc => Some(vec![0x1b]),
        KeyCode::Up => Some(b"\x1b[A".to_vec()),
        KeyCode::Down => Some(b"\x1b[B".to_vec()),
        KeyCode::Right => Some(b"\x1b[C".to_vec()),
        KeyCode::Left => Some(b"\x1b[D".to_vec()),
        KeyCode::Home => Some(b"\x1b[H".to_vec()),
        KeyCode::End => Some(b"\x1b[F".to_vec()),
        KeyCode::Delete => Some(b"\x1b[3~".to_vec()),
        _ => None,
    }
}

/// `Ctrl+A` = 0x01 ... `Ctrl+Z` = 0x1a.
fn control_byte(c: char) -> Option<u8> {
    let lower = c.to_ascii_lowercase();
    if lower.is_ascii_lowercase() {
        Some(lower as u8 - b'a' + 1)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use picolink_conn::LinkConfig;

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn ctrl(c: char) -> KeyEvent {
        KeyEvent::new(KeyCode::Char(c), KeyModifiers::CONTROL)
    }

    fn app() -> App {
        App::new(&LinkConfig::default()).unwrap()
    }

    #[test]
    fn test_key_to_bytes() {
        assert_eq!(key_to_bytes(&key(KeyCode::Char('a'))), Some(b"a".to_vec()));
        assert_eq!(key_to_bytes(&key(KeyCode::Char('é'))), Some("é".as_bytes().to_vec()));
        assert_eq!(key_to_bytes(&key(KeyCode::Enter)), Some(b"\r\n".to_vec()));
        assert_eq!(key_to_bytes(&key(KeyCode::Backspace)), Some(vec![0x7f]));
        assert_eq!(key_to_bytes(&key(KeyCode::Tab)), Some(vec![b'\t']));
        assert_eq!(key_to_bytes(&key(KeyCode::Up)), Some(b"\x1b[A".to_vec()));
        assert_eq!(key_to_bytes(&key(KeyCode::Left)), Some(b"\x1b[D".to_vec()));
        assert_eq!(key_to_bytes(&key(KeyCode::F(5))), None);
    }

    #[test]
    fn test_ctrl_letters_become_control_bytes() {
        assert_eq!(key_to_bytes(&ctrl('c')), Some(vec![0x03]));
        assert_eq!(key_to_bytes(&ctrl('D')), Some(vec![0x04]));
        assert_eq!(key_to_bytes(&ctrl('a')), Some(vec![0x01]));
        assert_eq!(key_to_bytes(&ctrl('1')), None);
    }

    #[test]
    fn test_ctrl_q_quits() {
        let mut app = app();
        assert_eq!(handle_key_event(ctrl('q'), &mut app), Action::Quit);
        assert!(app.should_quit);
    }

    #[test]
    fn test_ctrl_c_is_forwarded_not_quit() {
        let mut app = app();
        assert_eq!(handle_key_event(ctrl('c'), &mut app), Action::Send(vec![0x03]));
        assert!(!app.should_quit);
    }

    #[test]
    fn test_menu_selection_executes_command() {
        let mut app = app();
        assert_eq!(handle_key_event(ctrl('p'), &mut app), Action::None);
        assert!(app.menu_state.open);

        // connect, disconnect, run
        let _ = handle_key_event(key(KeyCode::Down), &mut app);
        let _ = handle_key_event(key(KeyCode::Down), &mut app);
        let action = handle_key_event(key(KeyCode::Enter), &mut app);

        assert_eq!(action, Action::Execute("picolink.run".to_string()));
        assert!(!app.menu_state.open);
    }

    #[test]
    fn test_menu_swallows_typing_and_esc_closes() {
        let mut app = app();
        app.open_menu();
        assert_eq!(handle_key_event(key(KeyCode::Char('x')), &mut app), Action::None);
        assert_eq!(handle_key_event(key(KeyCode::Esc), &mut app), Action::None);
        assert!(!app.menu_state.open);
        assert_eq!(
            handle_key_event(key(KeyCode::Char('x')), &mut app),
            Action::Send(b"x".to_vec())
        );
    }

    #[test]
    fn test_page_keys_scroll() {
        let mut app = app();
        app.push_output(&b"line\n".repeat(30));
        assert_eq!(handle_key_event(key(KeyCode::PageUp), &mut app), Action::None);
        assert_eq!(app.scroll, PAGE);
        let _ = handle_key_event(key(KeyCode::Char('a')), &mut app);
        assert_eq!(app.scroll, 0);
    }
}
