//! picolink - terminal console for a device REPL behind a loopback bridge
//!
//! Spawns the bridge script, keeps a TCP link to it alive and shows the
//! device output with a status line and a command menu.
//!
//! # Usage
//!
//! ```text
//! picolink                          # Connect with the configured bridge
//! picolink --file main.py           # Enable the run command for main.py
//! picolink --script bridge.py       # Override the bridge script
//! picolink --ephemeral              # Don't remember the bridge process id
//! ```

use std::fs::{self, OpenOptions};
use std::io::{self, Stdout};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use crossterm::{
    event::{self, Event as CrosstermEvent},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use picolink_conn::{JsonStateStore, LinkConfig, MemoryStateStore, StateStore, SystemProcessHost};
use picolink_core::LIST_COMMANDS_COMMAND;
use picolink_tui::app::App;
use picolink_tui::error::{Result as TuiResult, TuiError};
use picolink_tui::input::{handle_key_event, Action, Event};
use picolink_tui::session::{start_run, LinkSession, StoreFactory, RUN_ALLOW_LIST};
use picolink_tui::ui;

// ============================================================================
// CLI Arguments
// ============================================================================

/// picolink - console for a device REPL behind a loopback bridge
#[derive(Parser, Debug)]
#[command(name = "picolink")]
#[command(about = "Keep a console link to a device REPL alive")]
#[command(version)]
struct Args {
    /// Config file (defaults to $PICOLINK_CONFIG or the platform config dir)
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    /// Interpreter used to launch the bridge script
    #[arg(long)]
    interpreter: Option<PathBuf>,

    /// Bridge script to launch
    #[arg(long)]
    script: Option<PathBuf>,

    /// File sent to the device by the run command
    #[arg(long, short = 'f')]
    file: Option<PathBuf>,

    /// Keep state in memory only
    #[arg(long)]
    ephemeral: bool,
}

// ============================================================================
// Terminal Setup / Cleanup
// ============================================================================

fn setup_terminal() -> TuiResult<Terminal<CrosstermBackend<Stdout>>> {
    enable_raw_mode().map_err(|e| TuiError::TerminalInit(e.to_string()))?;

    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen).map_err(|e| TuiError::TerminalInit(e.to_string()))?;

    let backend = CrosstermBackend::new(stdout);
    Terminal::new(backend).map_err(|e| TuiError::TerminalInit(e.to_string()))
}

/// Restores the terminal. Call before exiting, even on error.
fn cleanup_terminal(terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> TuiResult<()> {
    disable_raw_mode().map_err(|e| TuiError::TerminalCleanup(e.to_string()))?;

    execute!(terminal.backend_mut(), LeaveAlternateScreen)
        .map_err(|e| TuiError::TerminalCleanup(e.to_string()))?;

    terminal
        .show_cursor()
        .map_err(|e| TuiError::TerminalCleanup(e.to_string()))?;

    Ok(())
}

// ============================================================================
// Keyboard Input Task
// ============================================================================

/// Polls crossterm on the blocking pool and forwards key and resize events.
fn spawn_keyboard_task(
    event_tx: mpsc::UnboundedSender<Event>,
    cancel_token: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            if cancel_token.is_cancelled() {
                debug!("Keyboard task shutting down");
                break;
            }

            let poll_result = tokio::task::spawn_blocking(|| {
                if event::poll(Duration::from_millis(50)).unwrap_or(false) {
                    event::read().ok()
                } else {
                    None
                }
            })
            .await;

            let forwarded = match poll_result {
                Ok(Some(CrosstermEvent::Key(key))) => event_tx.send(Event::Key(key)),
                Ok(Some(CrosstermEvent::Resize(width, height))) => {
                    event_tx.send(Event::Resize(width, height))
                }
                Ok(Some(_)) | Ok(None) => Ok(()),
                Err(e) => {
                    error!(error = %e, "Keyboard polling task panicked");
                    break;
                }
            };

            if forwarded.is_err() {
                debug!("Event channel closed, keyboard task exiting");
                break;
            }
        }
    })
}

// ============================================================================
// Commands
// ============================================================================

/// Everything a command can touch.
struct Console {
    app: App,
    session: LinkSession,
    run_file: Option<PathBuf>,
    event_tx: mpsc::UnboundedSender<Event>,
}

impl Console {
    /// Runs a `picolink.*` command from the menu.
    async fn execute(&mut self, command: &str) {
        debug!(command, "Executing command");
        match command {
            "picolink.connect" => self.connect().await,
            "picolink.disconnect" => {
                self.stop();
                self.session.disconnect().await;
                self.app.mark_disconnected(None);
            }
            "picolink.run" => {
                if let Err(e) = self.run() {
                    warn!(error = %e, "Run not started");
                    self.app.set_notice(e.to_string());
                }
            }
            "picolink.stop" => {
                if !self.stop() {
                    self.app.set_notice("Nothing is running");
                }
            }
            "picolink.clear" => {
                self.app.clear_console();
                if let Err(e) = self.session.clear().await {
                    debug!(error = %e, "Trailing window not cleared");
                }
            }
            LIST_COMMANDS_COMMAND => self.app.open_menu(),
            other => {
                warn!(command = other, "Unknown command");
                self.app.set_notice(format!("Unknown command: {other}"));
            }
        }
    }

    async fn connect(&mut self) {
        self.stop();
        self.app.mark_connecting();
        if let Err(e) = self.session.connect().await {
            error!(error = %e, "Failed to start link session");
            self.app.mark_disconnected(Some(e.to_string()));
        }
    }

    fn run(&mut self) -> TuiResult<()> {
        if self.app.presenter.is_operation_active() {
            self.app.set_notice("A file is already running");
            return Ok(());
        }
        let path = self.run_file.clone().ok_or(TuiError::NoRunFile)?;
        let handle = match self.session.handle() {
            Some(handle) if self.app.is_connected() => handle.clone(),
            _ => {
                self.app.set_notice("Not connected");
                return Ok(());
            }
        };

        let events = self.event_tx.clone();
        let run_id = self
            .app
            .begin_run(RUN_ALLOW_LIST, |run_id| start_run(handle, path.clone(), run_id, events));
        info!(path = %path.display(), run_id, "Running file");
        Ok(())
    }

    /// Stops the running operation, if any. Returns whether one was running.
    fn stop(&mut self) -> bool {
        self.app.stop_run()
    }
}

// ============================================================================
// Main Event Loop
// ============================================================================

async fn run_event_loop(
    terminal: &mut Terminal<CrosstermBackend<Stdout>>,
    console: &mut Console,
    event_rx: &mut mpsc::UnboundedReceiver<Event>,
    cancel_token: &CancellationToken,
) -> Result<()> {
    let tick_rate = Duration::from_millis(100);

    loop {
        terminal.draw(|frame| ui::render(frame, &console.app))?;

        let event = tokio::time::timeout(tick_rate, event_rx.recv()).await;

        match event {
            Ok(Some(Event::Key(key))) => match handle_key_event(key, &mut console.app) {
                Action::Quit => {
                    info!("User requested quit");
                    break;
                }
                Action::Send(bytes) => {
                    if let Err(e) = console.session.write(bytes).await {
                        warn!(error = %e, "Input not sent");
                    }
                }
                Action::Execute(command) => console.execute(&command).await,
                Action::None => {}
            },
            Ok(Some(Event::Resize(_width, _height))) => {
                debug!("Terminal resized");
            }
            Ok(Some(Event::Output(bytes))) => console.app.push_output(&bytes),
            Ok(Some(Event::LinkUp)) => {
                info!("Link up");
                console.app.mark_connected();
            }
            Ok(Some(Event::LinkDown)) => {
                // A LinkUp may already have overtaken this event.
                if !console.session.state().is_connected() {
                    warn!("Link lost, reconnecting");
                    console.stop();
                    console.app.mark_reconnecting();
                }
            }
            Ok(Some(Event::LinkFailed(reason))) => {
                warn!(reason = %reason, "Link failed");
                console.stop();
                console.app.mark_disconnected(Some(reason));
            }
            Ok(Some(Event::OperationFinished(run_id))) => {
                console.app.finish_run(run_id);
            }
            Ok(None) => {
                warn!("Event channel closed");
                break;
            }
            Err(_) => {
                // Tick: redraw
            }
        }

        if console.app.should_quit || cancel_token.is_cancelled() {
            break;
        }
    }

    Ok(())
}

// ============================================================================
// Logging Setup
// ============================================================================

/// `<state_dir>/picolink`, next to the state file.
fn get_log_dir() -> Option<PathBuf> {
    dirs::state_dir()
        .or_else(dirs::data_local_dir)
        .map(|dir| dir.join("picolink"))
}

/// Opens the log file in append mode. Returns `None` (logging disabled) on
/// failure, after warning on stderr while the terminal is still ours.
fn create_log_file() -> Option<fs::File> {
    let log_dir = get_log_dir()?;

    if let Err(e) = fs::create_dir_all(&log_dir) {
        eprintln!("Warning: Failed to create log directory {log_dir:?}: {e}");
        return None;
    }

    let log_path = log_dir.join("picolink.log");

    match OpenOptions::new().create(true).append(true).open(&log_path) {
        Ok(file) => Some(file),
        Err(e) => {
            eprintln!("Warning: Failed to open log file {log_path:?}: {e}");
            None
        }
    }
}

fn init_logging() {
    match create_log_file() {
        Some(file) => {
            let filter = EnvFilter::from_default_env().add_directive(
                "picolink=info"
                    .parse()
                    .unwrap_or_else(|_| tracing_subscriber::filter::Directive::from(tracing::Level::INFO)),
            );

            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(Mutex::new(file))
                .with_ansi(false)
                .init();
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(EnvFilter::new("off"))
                .init();
        }
    }
}

// ============================================================================
// Main Entry Point
// ============================================================================

fn load_config(args: &Args) -> Result<LinkConfig> {
    let mut config = match &args.config {
        Some(path) => LinkConfig::load(path),
        None => LinkConfig::load_default(),
    }
    .context("Failed to load configuration")?;

    if let Some(interpreter) = &args.interpreter {
        config.interpreter = interpreter.clone();
    }
    if let Some(script) = &args.script {
        config.script_path = script.clone();
    }
    Ok(config)
}

fn store_factory(ephemeral: bool) -> StoreFactory {
    let path = if ephemeral {
        None
    } else {
        JsonStateStore::default_path()
    };

    Box::new(move || -> Box<dyn StateStore> {
        let Some(path) = &path else {
            return Box::new(MemoryStateStore::new());
        };
        match JsonStateStore::open(path) {
            Ok(store) => Box::new(store),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "State file unavailable, using memory");
                Box::new(MemoryStateStore::new())
            }
        }
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // stderr would corrupt the alternate screen
    init_logging();

    let config = load_config(&args)?;
    info!(
        interpreter = %config.interpreter.display(),
        script = %config.script_path.display(),
        ports = %config.port_range,
        "picolink starting..."
    );

    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<Event>();
    let cancel_token = CancellationToken::new();

    let host = Arc::new(SystemProcessHost::new(
        config.process_name.clone(),
        config.script_path.clone(),
    ));
    let app = App::new(&config)?;
    let session = LinkSession::new(
        config,
        host,
        store_factory(args.ephemeral),
        event_tx.clone(),
        cancel_token.clone(),
    );
    let mut console = Console {
        app,
        session,
        run_file: args.file,
        event_tx: event_tx.clone(),
    };

    let mut terminal = match setup_terminal() {
        Ok(t) => t,
        Err(e) => {
            error!(error = %e, "Failed to initialize terminal");
            return Err(e.into());
        }
    };

    let keyboard_handle = spawn_keyboard_task(event_tx, cancel_token.clone());

    console.connect().await;
    let result = run_event_loop(&mut terminal, &mut console, &mut event_rx, &cancel_token).await;

    console.stop();
    console.session.disconnect().await;
    cancel_token.cancel();
    let _ = tokio::time::timeout(Duration::from_millis(100), keyboard_handle).await;

    if let Err(e) = cleanup_terminal(&mut terminal) {
        error!(error = %e, "Failed to cleanup terminal");
    }

    info!("picolink stopped");
    result
}
