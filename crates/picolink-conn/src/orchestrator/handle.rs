//! Client interface for the connection actor.
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Channel errors are mapped to `LinkError::ChannelClosed`

use tokio::sync::{mpsc, oneshot, watch};

use super::commands::ConnectionCommand;
use super::{ConnectionSnapshot, ConnectionState};
use crate::error::{LinkError, Result};

/// Handle for talking to a running connection.
///
/// Cheap to clone. Every method fails with `LinkError::ChannelClosed` once
/// the connection was disconnected or its cancellation token fired.
///
/// # Usage
///
/// ```ignore
/// let handle = orchestrator.initialize(|result| {
///     if let Err(e) = result {
///         eprintln!("{e}");
///     }
/// });
///
/// handle.set_on_message_listener(|bytes| print!("{}", String::from_utf8_lossy(&bytes))).await?;
/// handle.writeline("print('hello')").await?;
/// ```
#[derive(Clone, Debug)]
pub struct ConnectionHandle {
    sender: mpsc::Sender<ConnectionCommand>,
    state: watch::Receiver<ConnectionState>,
}

impl ConnectionHandle {
    pub(crate) fn new(
        sender: mpsc::Sender<ConnectionCommand>,
        state: watch::Receiver<ConnectionState>,
    ) -> Self {
        Self { sender, state }
    }

    /// Routes incoming bytes to `listener`, replacing any previous one.
    pub async fn set_on_message_listener<F>(&self, listener: F) -> Result<()>
    where
        F: FnMut(Vec<u8>) + Send + 'static,
    {
        self.send(ConnectionCommand::SetListener {
            listener: Box::new(listener),
        })
        .await
    }

    /// Sends raw bytes. Transport errors are handled by the reconnect loop,
    /// not reported here.
    pub async fn write(&self, data: impl Into<Vec<u8>>) -> Result<()> {
        self.send(ConnectionCommand::Write { data: data.into() }).await
    }

    /// Sends `text` followed by `\r\n`.
    pub async fn writeline(&self, text: impl Into<String>) -> Result<()> {
        self.send(ConnectionCommand::WriteLine { text: text.into() })
            .await
    }

    /// Empties the trailing-write window.
    pub async fn clear(&self) -> Result<()> {
        self.send(ConnectionCommand::Clear).await
    }

    /// Current state of the link.
    pub async fn snapshot(&self) -> Result<ConnectionSnapshot> {
        let (tx, rx) = oneshot::channel();
        self.send(ConnectionCommand::Snapshot { respond_to: tx })
            .await?;
        rx.await.map_err(|_| LinkError::ChannelClosed)
    }

    /// Last state published by the actor. Does not wait on the actor.
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Receiver that is notified on every state change.
    ///
    /// `changed()` fails once the actor has exited.
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// Tears the connection down and waits until it is gone.
    ///
    /// Calling this on an already disconnected handle is a no-op.
    pub async fn disconnect(&self) {
        let (tx, rx) = oneshot::channel();
        if self
            .send(ConnectionCommand::Disconnect { respond_to: tx })
            .await
            .is_ok()
        {
            let _ = rx.await;
        }
    }

    /// True once the actor has exited.
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    async fn send(&self, command: ConnectionCommand) -> Result<()> {
        self.sender
            .send(command)
            .await
            .map_err(|_| LinkError::ChannelClosed)
    }
}
