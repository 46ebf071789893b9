//! Client socket to the bridge process.
//!
//! `StreamLink` owns at most one TCP socket at a time. Each call to
//! [`StreamLink::connect`] tears down the previous socket and starts a new one
//! on a background task tagged with a fresh generation number. The task
//! reports back over an mpsc channel:
//!
//! - exactly one of `Connected` or `Failed { reason }` for the connect itself
//! - `Data` for every chunk read, raw and unframed
//! - at most one `Failed` after a successful connect
//!
//! Writes go through a per-socket FIFO channel, so they reach the transport
//! in call order. Writes issued before the connect completes are flushed once
//! it does.
//!
//! **Panic-Free Policy:** This module follows the project's panic-free guidelines.
//! No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, or `todo!()`.

use std::io;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use picolink_core::{Endpoint, FailureReason, WriteWindow};

/// Size of the read buffer for incoming bytes.
pub const READ_BUFFER_SIZE: usize = 4096;

/// Terminator appended by [`StreamLink::writeline`].
pub const LINE_ENDING: &str = "\r\n";

// ============================================================================
// Events
// ============================================================================

/// What a socket task observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEventKind {
    /// The connect completed.
    Connected,
    /// Bytes received from the bridge.
    Data(Vec<u8>),
    /// The socket is unusable. No further events follow for this generation.
    Failed {
        reason: FailureReason,
        detail: Option<String>,
    },
}

/// A socket event tagged with the generation of the socket that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkEvent {
    pub generation: u64,
    pub kind: LinkEventKind,
}

// ============================================================================
// Stream Link
// ============================================================================

/// Handle on the live socket task.
struct Socket {
    generation: u64,
    cancel: CancellationToken,
    outgoing: mpsc::UnboundedSender<Vec<u8>>,
}

/// Owner of the single client socket.
pub struct StreamLink {
    events: mpsc::UnboundedSender<LinkEvent>,
    connect_timeout: Duration,
    generation: u64,
    socket: Option<Socket>,
    window: WriteWindow,
}

impl StreamLink {
    /// Creates a link that reports socket events on `events`.
    pub fn new(events: mpsc::UnboundedSender<LinkEvent>, connect_timeout: Duration) -> Self {
        Self {
            events,
            connect_timeout,
            generation: 0,
            socket: None,
            window: WriteWindow::default(),
        }
    }

    /// Tears down any existing socket and starts connecting to `endpoint`.
    ///
    /// Returns immediately with the generation of the new socket; the outcome
    /// arrives as a [`LinkEvent`]. Must be called from within a tokio runtime.
    pub fn connect(&mut self, endpoint: &Endpoint) -> u64 {
        self.disconnect();

        self.generation = self.generation.wrapping_add(1);
        let generation = self.generation;
        let cancel = CancellationToken::new();
        let (outgoing, outgoing_rx) = mpsc::unbounded_channel();

        let sink = EventSink {
            generation,
            events: self.events.clone(),
            cancel: cancel.clone(),
        };
        tokio::spawn(run_socket(
            endpoint.to_string(),
            self.connect_timeout,
            outgoing_rx,
            sink,
        ));

        debug!(generation, endpoint = %endpoint, "Connecting to term");
        self.socket = Some(Socket {
            generation,
            cancel,
            outgoing,
        });
        generation
    }

    /// Records `data` in the write window and queues it on the socket.
    ///
    /// Never fails: a broken transport is reported as a `Failed` event.
    pub fn write(&mut self, data: &[u8]) {
        self.window.record(data);
        self.send(data.to_vec());
    }

    /// Writes `text` followed by `\r\n`. Only `text` is recorded in the window.
    pub fn writeline(&mut self, text: &str) {
        self.window.record(text.as_bytes());
        let mut line = String::with_capacity(text.len() + LINE_ENDING.len());
        line.push_str(text);
        line.push_str(LINE_ENDING);
        self.send(line.into_bytes());
    }

    /// Stops the socket task and ends the socket. Safe to call repeatedly.
    ///
    /// No event from the torn-down socket is delivered afterwards.
    pub fn disconnect(&mut self) {
        if let Some(socket) = self.socket.take() {
            debug!(generation = socket.generation, "Destroying term stream");
            socket.cancel.cancel();
        }
    }

    /// Returns true if `generation` names the socket currently owned.
    pub fn is_current(&self, generation: u64) -> bool {
        self.socket
            .as_ref()
            .map(|socket| socket.generation == generation)
            .unwrap_or(false)
    }

    /// Returns true while a socket (connecting or connected) is owned.
    pub fn is_open(&self) -> bool {
        self.socket.is_some()
    }

    /// Generation of the most recently created socket.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn window(&self) -> &WriteWindow {
        &self.window
    }

    /// Empties the write window.
    pub fn clear(&mut self) {
        self.window.clear();
    }

    fn send(&self, bytes: Vec<u8>) {
        match &self.socket {
            Some(socket) => {
                if socket.outgoing.send(bytes).is_err() {
                    trace!(generation = socket.generation, "Socket task gone, write dropped");
                }
            }
            None => trace!("No socket, write dropped"),
        }
    }
}

impl Drop for StreamLink {
    fn drop(&mut self) {
        self.disconnect();
    }
}

// ============================================================================
// Socket Task
// ============================================================================

/// Sends events for one generation unless it was torn down.
struct EventSink {
    generation: u64,
    events: mpsc::UnboundedSender<LinkEvent>,
    cancel: CancellationToken,
}

impl EventSink {
    fn emit(&self, kind: LinkEventKind) {
        if self.cancel.is_cancelled() {
            return;
        }
        let _ = self.events.send(LinkEvent {
            generation: self.generation,
            kind,
        });
    }

    fn fail(&self, reason: FailureReason, detail: Option<String>) {
        self.emit(LinkEventKind::Failed { reason, detail });
    }
}

/// Maps an I/O error to the failure it represents.
pub fn classify_io_error(error: &io::Error) -> FailureReason {
    match error.kind() {
        io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionAborted
        | io::ErrorKind::BrokenPipe => FailureReason::Closed,
        io::ErrorKind::TimedOut => FailureReason::Timeout,
        _ => FailureReason::Error,
    }
}

async fn run_socket(
    address: String,
    connect_timeout: Duration,
    mut outgoing: mpsc::UnboundedReceiver<Vec<u8>>,
    sink: EventSink,
) {
    let stream = tokio::select! {
        _ = sink.cancel.cancelled() => return,
        result = timeout(connect_timeout, TcpStream::connect(&address)) => match result {
            Err(_) => {
                sink.fail(FailureReason::Timeout, None);
                return;
            }
            Ok(Err(e)) => {
                sink.fail(classify_io_error(&e), Some(e.to_string()));
                return;
            }
            Ok(Ok(stream)) => stream,
        },
    };

    if let Err(e) = stream.set_nodelay(true) {
        trace!(error = %e, "Failed to set TCP_NODELAY");
    }
    sink.emit(LinkEventKind::Connected);

    let (mut reader, mut writer) = stream.into_split();
    let mut buf = vec![0u8; READ_BUFFER_SIZE];

    loop {
        tokio::select! {
            _ = sink.cancel.cancelled() => {
                let _ = writer.shutdown().await;
                return;
            }

            read = reader.read(&mut buf) => match read {
                Ok(0) => {
                    sink.fail(FailureReason::Ended, None);
                    return;
                }
                Ok(n) => {
                    let chunk = buf.get(..n).map(<[u8]>::to_vec).unwrap_or_default();
                    sink.emit(LinkEventKind::Data(chunk));
                }
                Err(e) => {
                    sink.fail(classify_io_error(&e), Some(e.to_string()));
                    return;
                }
            },

            chunk = outgoing.recv() => match chunk {
                Some(bytes) => {
                    if let Err(e) = writer.write_all(&bytes).await {
                        sink.fail(classify_io_error(&e), Some(e.to_string()));
                        return;
                    }
                }
                None => {
                    // Link dropped without an explicit disconnect.
                    let _ = writer.shutdown().await;
                    return;
                }
            },
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
