//! Application state for the picolink console.
//!
//! All code follows the panic-free policy: no `.unwrap()`, `.expect()`,
//! `panic!()`, `unreachable!()`, `todo!()`, or direct indexing `[i]`.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use tracing::debug;

use picolink_conn::{CommandMenu, LinkConfig, StatusLine, StatusPresenter, StopAction};
use picolink_core::CommandSpec;

use crate::error::Result;

/// Lines kept in the scrollback before the oldest are dropped.
pub const MAX_SCROLLBACK_LINES: usize = 2000;

/// Spaces a tab expands to.
const TAB: &str = "    ";

// ============================================================================
// Connection State
// ============================================================================

/// What the console shows about the link.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum AppState {
    /// Spawning the bridge or dialing it.
    #[default]
    Connecting,

    Connected,

    /// No link, and none is being attempted.
    Disconnected {
        /// When the link went away.
        since: DateTime<Utc>,
        /// Why, if it was not the user's doing.
        reason: Option<String>,
    },
}

// ============================================================================
// Scrollback
// ============================================================================

/// Text received from the device, split into lines.
///
/// Bytes are decoded as UTF-8, keeping an incomplete trailing sequence until
/// the rest arrives. Carriage returns and other control characters are
/// dropped; backspace removes the previous character.
#[derive(Debug, Clone)]
pub struct Scrollback {
    lines: VecDeque<String>,
    current: String,
    pending: Vec<u8>,
    max_lines: usize,
}

impl Default for Scrollback {
    fn default() -> Self {
        Self::new(MAX_SCROLLBACK_LINES)
    }
}

impl Scrollback {
    pub fn new(max_lines: usize) -> Self {
        Self {
            lines: VecDeque::new(),
            current: String::new(),
            pending: Vec::new(),
            max_lines: max_lines.max(1),
        }
    }

    /// Appends raw bytes from the device.
    pub fn push_bytes(&mut self, bytes: &[u8]) {
        self.pending.extend_from_slice(bytes);
        let text = take_decoded(&mut self.pending);

        for ch in text.chars() {
            match ch {
                '\n' => self.commit_line(),
                '\r' => {}
                '\u{8}' => {
                    self.current.pop();
                }
                '\t' => self.current.push_str(TAB),
                c if c.is_control() => {}
                c => self.current.push(c),
            }
        }
    }

    /// Completed lines followed by the line being written.
    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.lines
            .iter()
            .map(String::as_str)
            .chain(std::iter::once(self.current.as_str()))
    }

    /// Number of lines including the one being written.
    pub fn line_count(&self) -> usize {
        self.lines.len() + 1
    }

    pub fn clear(&mut self) {
        self.lines.clear();
        self.current.clear();
        self.pending.clear();
    }

    fn commit_line(&mut self) {
        self.lines.push_back(std::mem::take(&mut self.current));
        while self.lines.len() >= self.max_lines {
            self.lines.pop_front();
        }
    }
}

/// Decodes the longest usable prefix of `pending` and removes it.
///
/// Invalid sequences become U+FFFD; an incomplete sequence at the end stays
/// in `pending`.
fn take_decoded(pending: &mut Vec<u8>) -> String {
    let mut out = String::new();
    let mut consumed = 0;

    loop {
        let rest = pending.get(consumed..).unwrap_or_default();
        match std::str::from_utf8(rest) {
            Ok(valid) => {
                out.push_str(valid);
                consumed = pending.len();
                break;
            }
            Err(e) => {
                let valid = e.valid_up_to();
                out.push_str(&String::from_utf8_lossy(rest.get(..valid).unwrap_or_default()));
                match e.error_len() {
                    Some(invalid) => {
                        out.push(char::REPLACEMENT_CHARACTER);
                        consumed += valid + invalid;
                    }
                    None => {
                        consumed += valid;
                        break;
                    }
                }
            }
        }
    }

    pending.drain(..consumed.min(pending.len()));
    out
}

// ============================================================================
// Command Menu State
// ============================================================================

/// Selection state of the command menu overlay.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MenuState {
    pub open: bool,
    pub selected: usize,
}

// ============================================================================
// Application
// ============================================================================

/// Core application state for the console.
pub struct App {
    pub state: AppState,

    pub scrollback: Scrollback,

    /// Lines scrolled up from the bottom; 0 follows new output.
    pub scroll: usize,

    pub menu: CommandMenu,

    pub menu_state: MenuState,

    /// Owns the indicators; `status_line` is the view of them.
    pub presenter: StatusPresenter,

    pub status_line: StatusLine,

    /// Id of the run in progress, if any.
    pub active_run: Option<u64>,

    last_run: u64,

    /// One-line message shown above the status line.
    pub notice: Option<String>,

    pub should_quit: bool,
}

impl App {
    /// Builds the console state from the configured indicators and commands.
    pub fn new(config: &LinkConfig) -> Result<Self> {
        let status_line = StatusLine::new();
        let presenter =
            StatusPresenter::new(&status_line, &config.indicators, &config.statusbar_buttons)?;

        Ok(Self {
            state: AppState::Connecting,
            scrollback: Scrollback::default(),
            scroll: 0,
            menu: CommandMenu::new(config.commands.clone()),
            menu_state: MenuState::default(),
            presenter,
            status_line,
            active_run: None,
            last_run: 0,
            notice: None,
            should_quit: false,
        })
    }

    pub fn mark_connecting(&mut self) {
        self.state = AppState::Connecting;
        self.presenter.set_connection_title(false);
    }

    pub fn mark_connected(&mut self) {
        self.state = AppState::Connected;
        self.notice = None;
        self.presenter.set_connection_title(true);
    }

    pub fn mark_disconnected(&mut self, reason: Option<String>) {
        if let Some(reason) = &reason {
            self.notice = Some(reason.clone());
        }
        self.state = AppState::Disconnected {
            since: Utc::now(),
            reason,
        };
        self.presenter.set_connection_title(false);
    }

    /// The link dropped and is being retried.
    pub fn mark_reconnecting(&mut self) {
        self.mark_connecting();
        self.notice = Some("Link lost, reconnecting".to_string());
    }

    pub fn is_connected(&self) -> bool {
        self.state == AppState::Connected
    }

    // ------------------------------------------------------------------------
    // Runs
    // ------------------------------------------------------------------------

    /// Starts a run under a fresh id and enters operation mode.
    ///
    /// `start` receives the id and returns the run's stop action.
    pub fn begin_run(&mut self, allow: &[&str], start: impl FnOnce(u64) -> StopAction) -> u64 {
        self.last_run += 1;
        let id = self.last_run;
        let stop = start(id);
        self.active_run = Some(id);
        self.presenter.start_operation(stop, allow);
        id
    }

    /// Leaves operation mode if `id` is the active run. Returns false for
    /// a run that was already stopped or replaced.
    pub fn finish_run(&mut self, id: u64) -> bool {
        if self.active_run != Some(id) {
            debug!(run_id = id, active = ?self.active_run, "Ignoring finish of stale run");
            return false;
        }
        self.active_run = None;
        self.presenter.stop_operation();
        true
    }

    /// Stops the active run, if any. Returns whether one was running.
    pub fn stop_run(&mut self) -> bool {
        let stopped = self.presenter.invoke_stop();
        self.presenter.stop_operation();
        self.active_run = None;
        stopped
    }

    /// Appends device output. Follows the tail unless scrolled up.
    pub fn push_output(&mut self, bytes: &[u8]) {
        let before = self.scrollback.line_count();
        self.scrollback.push_bytes(bytes);
        if self.scroll > 0 {
            let added = self.scrollback.line_count().saturating_sub(before);
            self.scroll = self.scroll.saturating_add(added);
        }
    }

    pub fn clear_console(&mut self) {
        self.scrollback.clear();
        self.scroll = 0;
    }

    pub fn scroll_up(&mut self, lines: usize) {
        let max = self.scrollback.line_count().saturating_sub(1);
        self.scroll = self.scroll.saturating_add(lines).min(max);
    }

    pub fn scroll_down(&mut self, lines: usize) {
        self.scroll = self.scroll.saturating_sub(lines);
    }

    pub fn set_notice(&mut self, notice: impl Into<String>) {
        self.notice = Some(notice.into());
    }

    // ------------------------------------------------------------------------
    // Menu
    // ------------------------------------------------------------------------

    pub fn open_menu(&mut self) {
        self.menu_state = MenuState {
            open: true,
            selected: 0,
        };
    }

    pub fn close_menu(&mut self) {
        self.menu_state.open = false;
    }

    pub fn menu_next(&mut self) {
        let count = self.menu.items().len();
        if count > 0 {
            self.menu_state.selected = (self.menu_state.selected + 1) % count;
        }
    }

    pub fn menu_previous(&mut self) {
        let count = self.menu.items().len();
        if count > 0 {
            self.menu_state.selected = self
                .menu_state
                .selected
                .checked_sub(1)
                .unwrap_or(count - 1);
        }
    }

    /// The highlighted menu entry.
    pub fn selected_command(&self) -> Option<CommandSpec> {
        self.menu
            .items()
            .get(self.menu_state.selected)
            .map(|spec| (*spec).clone())
    }

    pub fn quit(&mut self) {
        self.should_quit = true;
    }
}
