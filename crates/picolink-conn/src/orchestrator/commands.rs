//! Messages accepted by the connection actor.

use tokio::sync::oneshot;

use super::ConnectionSnapshot;

/// Consumer of incoming bytes.
pub type MessageListener = Box<dyn FnMut(Vec<u8>) + Send>;

/// Commands sent to the connection actor.
///
/// Commands are processed in arrival order, so writes reach the socket in the
/// order they were issued.
pub enum ConnectionCommand {
    /// Replace the incoming-data consumer. Applies to bytes received after
    /// the swap; nothing is buffered for a missing listener.
    SetListener { listener: MessageListener },

    /// Record and send raw bytes.
    Write { data: Vec<u8> },

    /// Record `text` and send it followed by `\r\n`.
    WriteLine { text: String },

    /// Empty the trailing-write window.
    Clear,

    /// Read-only view of the link.
    Snapshot {
        respond_to: oneshot::Sender<ConnectionSnapshot>,
    },

    /// Stop watching the process, close the socket, dispose the process.
    ///
    /// The actor exits after replying.
    Disconnect { respond_to: oneshot::Sender<()> },
}

impl std::fmt::Debug for ConnectionCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SetListener { .. } => f.write_str("SetListener"),
            Self::Write { data } => f.debug_struct("Write").field("len", &data.len()).finish(),
            Self::WriteLine { text } => f.debug_struct("WriteLine").field("text", text).finish(),
            Self::Clear => f.write_str("Clear"),
            Self::Snapshot { .. } => f.write_str("Snapshot"),
            Self::Disconnect { .. } => f.write_str("Disconnect"),
        }
    }
}
