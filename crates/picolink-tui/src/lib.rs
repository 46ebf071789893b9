//! picolink console - library modules
//!
//! Terminal front end for a device REPL reached through a loopback bridge.
//!
//! # Architecture
//!
//! The console uses an event-driven architecture with three main components:
//!
//! 1. **Keyboard Task**: Polls for keyboard input and sends events to the main loop
//! 2. **Link Session**: Runs the connection orchestrator and forwards device output
//! 3. **Main Event Loop**: Processes events, updates state, and renders the UI
//!
//! All tasks respect a shared `CancellationToken` for graceful shutdown.

pub mod app;
pub mod error;
pub mod input;
pub mod session;
pub mod ui;

// Re-export commonly used types
pub use app::App;
pub use error::{Result, TuiError};
pub use input::{Action, Event};
pub use session::LinkSession;
