//! The console's link to the device and the operations run over it.
//!
//! `LinkSession` owns at most one connection at a time. Connecting again
//! disconnects the previous one first, so a fresh supervisor (and a fresh
//! retry budget) is used every time.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use picolink_conn::{
    ConnectionHandle, ConnectionOrchestrator, ConnectionState, LinkConfig, ProcessHost,
    ProcessSupervisor, StateStore, StopAction,
};
use picolink_core::STATUS;

use crate::error::Result;
use crate::input::Event;

/// Indicators left visible while a file runs.
pub const RUN_ALLOW_LIST: &[&str] = &[STATUS];

/// Enters the REPL's paste mode.
pub const PASTE_MODE: u8 = 0x05;

/// Leaves paste mode and executes what was pasted.
pub const END_PASTE: u8 = 0x04;

/// Interrupts whatever the REPL is running.
pub const INTERRUPT: u8 = 0x03;

/// Pause between lines so the device can keep up.
const LINE_PACING: Duration = Duration::from_millis(5);

/// Opens the state store for a new connection.
pub type StoreFactory = Box<dyn Fn() -> Box<dyn StateStore> + Send>;

// ============================================================================
// Link Session
// ============================================================================

pub struct LinkSession {
    config: LinkConfig,
    host: Arc<dyn ProcessHost>,
    stores: StoreFactory,
    events: mpsc::UnboundedSender<Event>,
    cancel_token: CancellationToken,
    handle: Option<ConnectionHandle>,
}

impl LinkSession {
    pub fn new(
        config: LinkConfig,
        host: Arc<dyn ProcessHost>,
        stores: StoreFactory,
        events: mpsc::UnboundedSender<Event>,
        cancel_token: CancellationToken,
    ) -> Self {
        Self {
            config,
            host,
            stores,
            events,
            cancel_token,
            handle: None,
        }
    }

    /// Starts a new connection, replacing the current one.
    ///
    /// Outcomes arrive as `Event::LinkUp` / `Event::LinkFailed`, a dropped
    /// link that is being retried as `Event::LinkDown`, device output as
    /// `Event::Output`.
    pub async fn connect(&mut self) -> Result<()> {
        self.disconnect().await;

        let supervisor = ProcessSupervisor::new(self.host.clone(), (self.stores)(), &self.config);
        let orchestrator = ConnectionOrchestrator::new(
            self.config.clone(),
            supervisor,
            self.cancel_token.child_token(),
        );

        let status_tx = self.events.clone();
        let handle = orchestrator.initialize(move |result| {
            let event = match result {
                Ok(()) => Event::LinkUp,
                Err(e) => Event::LinkFailed(e.to_string()),
            };
            let _ = status_tx.send(event);
        });

        let output_tx = self.events.clone();
        handle
            .set_on_message_listener(move |bytes| {
                let _ = output_tx.send(Event::Output(bytes));
            })
            .await?;

        tokio::spawn(forward_link_down(handle.subscribe_state(), self.events.clone()));

        info!(script = %self.config.script_path.display(), "Link session started");
        self.handle = Some(handle);
        Ok(())
    }

    /// Closes the current connection, if any.
    pub async fn disconnect(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.disconnect().await;
            debug!("Link session closed");
        }
    }

    pub fn handle(&self) -> Option<&ConnectionHandle> {
        self.handle.as_ref()
    }

    /// Last published state of the current connection.
    pub fn state(&self) -> ConnectionState {
        self.handle
            .as_ref()
            .map(ConnectionHandle::state)
            .unwrap_or_default()
    }

    pub fn is_active(&self) -> bool {
        self.handle.as_ref().map(|h| !h.is_closed()).unwrap_or(false)
    }

    /// Sends bytes to the device. Dropped when there is no connection.
    pub async fn write(&self, bytes: Vec<u8>) -> Result<()> {
        match &self.handle {
            Some(handle) => Ok(handle.write(bytes).await?),
            None => {
                debug!(len = bytes.len(), "No link, input dropped");
                Ok(())
            }
        }
    }

    pub async fn clear(&self) -> Result<()> {
        if let Some(handle) = &self.handle {
            handle.clear().await?;
        }
        Ok(())
    }
}

/// Sends `Event::LinkDown` each time an established link drops.
///
/// Ends when the connection's actor exits.
async fn forward_link_down(
    mut states: watch::Receiver<ConnectionState>,
    events: mpsc::UnboundedSender<Event>,
) {
    let mut previous = *states.borrow_and_update();
    while states.changed().await.is_ok() {
        let current = *states.borrow_and_update();
        if previous.is_connected() && current == ConnectionState::Connecting {
            debug!("Link dropped, reconnecting");
            if events.send(Event::LinkDown).is_err() {
                break;
            }
        }
        previous = current;
    }
}

// ============================================================================
// Run Operation
// ============================================================================

/// Streams `path` to the device in paste mode on a background task.
///
/// Sends `Event::OperationFinished(run_id)` when done. The returned action
/// stops the transfer and interrupts the device.
pub fn start_run(
    handle: ConnectionHandle,
    path: PathBuf,
    run_id: u64,
    events: mpsc::UnboundedSender<Event>,
) -> StopAction {
    let token = CancellationToken::new();
    let task_token = token.clone();
    let task_handle = handle.clone();

    tokio::spawn(async move {
        match stream_file(&task_handle, &path, &task_token).await {
            Ok(lines) => info!(path = %path.display(), run_id, lines, "Run finished"),
            Err(e) => warn!(path = %path.display(), run_id, error = %e, "Run failed"),
        }
        let _ = events.send(Event::OperationFinished(run_id));
    });

    Box::new(move || {
        token.cancel();
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move {
                    if let Err(e) = handle.write(vec![INTERRUPT]).await {
                        debug!(error = %e, "Interrupt not sent");
                    }
                });
            }
            Err(_) => warn!("No runtime, interrupt not sent"),
        }
    })
}

/// Returns the number of lines sent.
async fn stream_file(
    handle: &ConnectionHandle,
    path: &Path,
    token: &CancellationToken,
) -> Result<usize> {
    let source = tokio::fs::read_to_string(path).await?;

    handle.write(vec![PASTE_MODE]).await?;
    let mut sent = 0;
    for line in paste_lines(&source) {
        tokio::select! {
            _ = token.cancelled() => {
                debug!(sent, "Run stopped");
                return Ok(sent);
            }
            _ = sleep(LINE_PACING) => {}
        }
        handle.writeline(line).await?;
        sent += 1;
    }
    handle.write(vec![END_PASTE]).await?;
    Ok(sent)
}

/// Lines of `source` as sent to the device, without line terminators.
pub fn paste_lines(source: &str) -> impl Iterator<Item = &str> {
    source.lines().map(|line| line.trim_end_matches('\r'))
}
