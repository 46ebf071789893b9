//! Connection orchestrator.
//!
//! Glues the process supervisor, the stream link and the retry machine
//! together. All connection state lives in one actor task; callers talk to
//! it through a [`ConnectionHandle`].
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────┐  commands   ┌─────────────────────────────┐
//! │ ConnectionHandle  │ ──────────► │ ConnectionActor             │
//! │ (clone per task)  │ ◄────────── │  RetryMachine (phase)       │
//! └───────────────────┘  oneshot    │  StreamLink   ◄── LinkEvent │
//!                                   │  Supervisor   ◄── exits     │
//!                                   │  retry timer                │
//!                                   └─────────────────────────────┘
//! ```
//!
//! State changes are published on a watch channel, so the console can see
//! the link drop and come back without polling snapshots.
//!
//! Disconnect and cancellation both end the actor loop, which is what
//! guarantees that no retry timer or late socket event can start another
//! connect afterwards.

mod actor;
mod commands;
mod handle;

use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

use picolink_core::ProcessId;

use crate::config::LinkConfig;
use crate::error::LinkError;
use crate::supervisor::ProcessSupervisor;

use actor::ConnectionActor;
pub use commands::{ConnectionCommand, MessageListener};
pub use handle::ConnectionHandle;

/// Capacity of the command channel.
pub const COMMAND_CHANNEL_CAPACITY: usize = 256;

/// Receives the outcome of each connect: `Ok` every time the link comes up,
/// `Err` when the lifecycle ends for good.
pub type ConnectCallback = Box<dyn FnMut(Result<(), LinkError>) + Send>;

/// Coarse state of the link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    /// Dialing, or waiting to dial again.
    Connecting,
    Connected,
    /// Teardown in progress.
    Closing,
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }
}

/// Read-only view of the link at one point in time.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct ConnectionSnapshot {
    pub state: ConnectionState,
    /// Current attempt number, starting at 1.
    pub attempt: u32,
    /// Port of the current bridge process.
    pub port: Option<u16>,
    pub process_id: Option<ProcessId>,
    /// Generation of the current socket.
    pub generation: u64,
    /// Up to the last 20 bytes written.
    pub last_written: Vec<u8>,
    /// True while a reattempt is scheduled.
    pub retry_scheduled: bool,
}

/// Builds and starts a connection.
pub struct ConnectionOrchestrator {
    config: LinkConfig,
    supervisor: ProcessSupervisor,
    cancel_token: CancellationToken,
}

impl ConnectionOrchestrator {
    pub fn new(
        config: LinkConfig,
        supervisor: ProcessSupervisor,
        cancel_token: CancellationToken,
    ) -> Self {
        Self {
            config,
            supervisor,
            cancel_token,
        }
    }

    /// Spawns the connection actor and returns a handle to it.
    ///
    /// The actor creates the bridge process once, then dials it and keeps
    /// reconnecting on its own. `on_connect` runs on the actor task; keep it
    /// short. Must be called from within a tokio runtime.
    pub fn initialize<F>(self, on_connect: F) -> ConnectionHandle
    where
        F: FnMut(Result<(), LinkError>) + Send + 'static,
    {
        let (sender, receiver) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let actor = ConnectionActor::new(
            &self.config,
            self.supervisor,
            receiver,
            Box::new(on_connect),
            state_tx,
            self.cancel_token,
        );
        tokio::spawn(actor.run());
        ConnectionHandle::new(sender, state_rx)
    }
}
