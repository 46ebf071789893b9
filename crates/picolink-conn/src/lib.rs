//! picolink connection layer
//!
//! Keeps a byte stream to a locally spawned bridge process alive:
//!
//! - [`supervisor`] spawns the bridge script and restarts it when it dies
//! - [`stream`] owns the TCP socket to it
//! - [`orchestrator`] drives the retry loop and exposes a [`ConnectionHandle`]
//! - [`presenter`] and [`menu`] mirror state into status indicators and commands
//!
//! The OS and the filesystem are reached only through the [`host::ProcessHost`]
//! and [`store::StateStore`] traits.
//!
//! All code follows the panic-free policy: no `.unwrap()`, `.expect()`,
//! `panic!()`, `unreachable!()`, `todo!()` outside of tests.

pub mod config;
pub mod error;
pub mod host;
pub mod menu;
pub mod orchestrator;
pub mod presenter;
pub mod store;
pub mod stream;
pub mod supervisor;

pub use config::LinkConfig;
pub use error::{LinkError, Result};
pub use host::{ManagedProcess, ProcessExit, ProcessHost, SystemProcessHost};
pub use menu::{CommandExecutor, CommandMenu};
pub use orchestrator::{
    ConnectionHandle, ConnectionOrchestrator, ConnectionSnapshot, ConnectionState,
};
pub use presenter::{
    Indicator, IndicatorSurface, IndicatorView, StatusLine, StatusPresenter, StopAction,
};
pub use store::{JsonStateStore, MemoryStateStore, StateStore, PROCESS_ID_KEY};
pub use stream::{LinkEvent, LinkEventKind, StreamLink};
pub use supervisor::ProcessSupervisor;
