//! Status indicators.
//!
//! The presenter mirrors connection and operation state into a set of
//! indicators. It does not draw anything; indicators come from an
//! [`IndicatorSurface`]. [`StatusLine`] is the in-memory surface the console
//! renders from.

use std::sync::{Arc, Mutex, MutexGuard};

use tracing::debug;

use picolink_core::indicator::{connection_title, icon_text};
use picolink_core::{IndicatorSpec, LIST_COMMANDS, STATUS, STOP};

use crate::error::{LinkError, Result};

/// Action run when the user stops an operation.
pub type StopAction = Box<dyn FnOnce() + Send>;

/// One visible-or-hidden status element.
pub trait Indicator: Send {
    fn show(&mut self);
    fn hide(&mut self);
    fn set_text(&mut self, text: &str);
}

/// Creates indicators.
pub trait IndicatorSurface {
    fn create_indicator(&self, spec: &IndicatorSpec) -> Box<dyn Indicator>;
}

// ============================================================================
// Presenter
// ============================================================================

/// Keeps indicator visibility and the status title in sync.
///
/// At idle, exactly the default-visible set plus `listcommands` is shown and
/// `stop` is hidden. During an operation only the allow-list and `stop` are
/// shown.
pub struct StatusPresenter {
    indicators: Vec<(String, Box<dyn Indicator>)>,
    default_visible: Vec<String>,
    stop_action: Option<StopAction>,
    operation_active: bool,
    connected: bool,
}

impl StatusPresenter {
    /// Creates one indicator per spec and applies the idle layout.
    ///
    /// # Errors
    ///
    /// `LinkError::MissingIndicator` if `status` or `stop` is not among
    /// `specs`.
    pub fn new(
        surface: &dyn IndicatorSurface,
        specs: &[IndicatorSpec],
        default_visible: &[String],
    ) -> Result<Self> {
        for required in [STATUS, STOP] {
            if !specs.iter().any(|spec| spec.key == required) {
                return Err(LinkError::MissingIndicator(required.to_string()));
            }
        }

        let indicators = specs
            .iter()
            .map(|spec| (spec.key.clone(), surface.create_indicator(spec)))
            .collect();

        let mut default_visible: Vec<String> = default_visible
            .iter()
            .filter(|key| key.as_str() != STOP)
            .cloned()
            .collect();
        if !default_visible.iter().any(|key| key == LIST_COMMANDS) {
            default_visible.push(LIST_COMMANDS.to_string());
        }

        let mut presenter = Self {
            indicators,
            default_visible,
            stop_action: None,
            operation_active: false,
            connected: false,
        };
        presenter.show_defaults();
        presenter.set_connection_title(false);
        Ok(presenter)
    }

    /// Sets the `status` text to the connected or disconnected title.
    pub fn set_connection_title(&mut self, connected: bool) {
        self.connected = connected;
        let (icon, text) = connection_title(connected);
        let title = icon_text(icon, text);
        if let Some(status) = self.indicator_mut(STATUS) {
            status.set_text(&title);
        }
    }

    /// Enters operation mode: hides everything but `allow` and shows `stop`.
    pub fn start_operation(&mut self, stop_action: StopAction, allow: &[&str]) {
        debug!(allow = ?allow, "Operation started");
        self.stop_action = Some(stop_action);
        self.operation_active = true;
        for (key, indicator) in &mut self.indicators {
            if key.as_str() == STOP || allow.contains(&key.as_str()) {
                indicator.show();
            } else {
                indicator.hide();
            }
        }
    }

    /// Leaves operation mode and restores the idle layout.
    pub fn stop_operation(&mut self) {
        debug!("Operation stopped");
        self.stop_action = None;
        self.operation_active = false;
        self.show_defaults();
    }

    /// Replaces the recorded stop action.
    pub fn set_stop_action(&mut self, action: StopAction) {
        self.stop_action = Some(action);
    }

    /// Runs the recorded stop action, if any. Returns whether one ran.
    pub fn invoke_stop(&mut self) -> bool {
        match self.stop_action.take() {
            Some(action) => {
                action();
                true
            }
            None => false,
        }
    }

    pub fn is_operation_active(&self) -> bool {
        self.operation_active
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    fn show_defaults(&mut self) {
        for (key, indicator) in &mut self.indicators {
            if self.default_visible.iter().any(|k| k == key.as_str()) {
                indicator.show();
            } else {
                indicator.hide();
            }
        }
    }

    fn indicator_mut(&mut self, key: &str) -> Option<&mut Box<dyn Indicator>> {
        self.indicators
            .iter_mut()
            .find(|(k, _)| k == key)
            .map(|(_, indicator)| indicator)
    }
}

// ============================================================================
// In-memory surface
// ============================================================================

/// Render state of one indicator on a [`StatusLine`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndicatorView {
    pub key: String,
    pub text: String,
    pub command: String,
    pub tooltip: String,
    pub visible: bool,
}

/// Shared in-memory indicator surface.
///
/// Clones share the same indicators, so the presenter can own its
/// indicators while a renderer reads them.
#[derive(Debug, Clone, Default)]
pub struct StatusLine {
    views: Arc<Mutex<Vec<IndicatorView>>>,
}

impl StatusLine {
    pub fn new() -> Self {
        Self::default()
    }

    /// All indicators in creation order.
    pub fn views(&self) -> Vec<IndicatorView> {
        self.lock().clone()
    }

    /// Visible indicators in creation order.
    pub fn visible(&self) -> Vec<IndicatorView> {
        self.lock().iter().filter(|view| view.visible).cloned().collect()
    }

    pub fn is_visible(&self, key: &str) -> bool {
        self.lock().iter().any(|view| view.key == key && view.visible)
    }

    pub fn text(&self, key: &str) -> Option<String> {
        self.lock()
            .iter()
            .find(|view| view.key == key)
            .map(|view| view.text.clone())
    }

    fn lock(&self) -> MutexGuard<'_, Vec<IndicatorView>> {
        self.views.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl IndicatorSurface for StatusLine {
    fn create_indicator(&self, spec: &IndicatorSpec) -> Box<dyn Indicator> {
        let mut views = self.lock();
        let index = views.len();
        views.push(IndicatorView {
            key: spec.key.clone(),
            text: spec.label.clone(),
            command: spec.command.clone(),
            tooltip: spec.tooltip.clone(),
            visible: false,
        });
        Box::new(StatusLineIndicator {
            views: Arc::clone(&self.views),
            index,
        })
    }
}

struct StatusLineIndicator {
    views: Arc<Mutex<Vec<IndicatorView>>>,
    index: usize,
}

impl StatusLineIndicator {
    fn update(&self, apply: impl FnOnce(&mut IndicatorView)) {
        let mut views = self.views.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(view) = views.get_mut(self.index) {
            apply(view);
        }
    }
}

impl Indicator for StatusLineIndicator {
    fn show(&mut self) {
        self.update(|view| view.visible = true);
    }

    fn hide(&mut self) {
        self.update(|view| view.visible = false);
    }

    fn set_text(&mut self, text: &str) {
        self.update(|view| view.text = text.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use picolink_core::indicator::{default_indicators, default_visible_indicators};
    use std::sync::atomic::{AtomicBool, Ordering};

    fn presenter() -> (StatusPresenter, StatusLine) {
        let line = StatusLine::new();
        let presenter =
            StatusPresenter::new(&line, &default_indicators(), &default_visible_indicators()).unwrap();
        (presenter, line)
    }

    fn visible_keys(line: &StatusLine) -> Vec<String> {
        line.visible().into_iter().map(|view| view.key).collect()
    }

    #[test]
    fn test_initial_layout() {
        let (presenter, line) = presenter();
        assert_eq!(
            visible_keys(&line),
            vec!["status", "run", "clear", "disconnect", "listcommands"]
        );
        assert_eq!(line.text(STATUS).unwrap(), "$(chrome-close) Pico Disconnected");
        assert!(!presenter.is_operation_active());
    }

    #[test]
    fn test_connection_title() {
        let (mut presenter, line) = presenter();
        presenter.set_connection_title(true);
        assert_eq!(line.text(STATUS).unwrap(), "$(check) Pico Connected");
        assert!(presenter.is_connected());
        presenter.set_connection_title(false);
        assert_eq!(line.text(STATUS).unwrap(), "$(chrome-close) Pico Disconnected");
    }

    #[test]
    fn test_operation_shows_only_allow_list_and_stop() {
        let (mut presenter, line) = presenter();
        presenter.start_operation(Box::new(|| {}), &["status"]);

        assert_eq!(visible_keys(&line), vec!["status", "stop"]);
        assert!(presenter.is_operation_active());

        presenter.stop_operation();
        assert_eq!(
            visible_keys(&line),
            vec!["status", "run", "clear", "disconnect", "listcommands"]
        );
        assert!(!line.is_visible(STOP));
    }

    #[test]
    fn test_operation_with_empty_allow_list() {
        let (mut presenter, line) = presenter();
        presenter.start_operation(Box::new(|| {}), &[]);
        assert_eq!(visible_keys(&line), vec!["stop"]);
    }

    #[test]
    fn test_stop_never_visible_at_idle_even_if_configured() {
        let line = StatusLine::new();
        let configured = vec![STOP.to_string(), "run".to_string()];
        let _presenter = StatusPresenter::new(&line, &default_indicators(), &configured).unwrap();
        assert_eq!(visible_keys(&line), vec!["run", "listcommands"]);
    }

    #[test]
    fn test_invoke_stop_runs_action_once() {
        let (mut presenter, _line) = presenter();
        let fired = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&fired);

        presenter.start_operation(Box::new(|| {}), &[]);
        presenter.set_stop_action(Box::new(move || flag.store(true, Ordering::SeqCst)));

        assert!(presenter.invoke_stop());
        assert!(fired.load(Ordering::SeqCst));
        assert!(!presenter.invoke_stop());
    }

    #[test]
    fn test_stop_operation_clears_action() {
        let (mut presenter, _line) = presenter();
        presenter.start_operation(Box::new(|| {}), &[]);
        presenter.stop_operation();
        assert!(!presenter.invoke_stop());
    }

    #[test]
    fn test_missing_required_indicator() {
        let line = StatusLine::new();
        let specs: Vec<IndicatorSpec> = default_indicators()
            .into_iter()
            .filter(|spec| spec.key != STOP)
            .collect();
        let result = StatusPresenter::new(&line, &specs, &[]);
        assert!(matches!(result, Err(LinkError::MissingIndicator(key)) if key == STOP));
    }
}
