//! Connection actor - single owner of the link, the process and the retry
//! state.
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Callback and listener invocations are the only user code run here

use std::future;

use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::{mpsc, watch};
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use picolink_core::{Endpoint, FailureReason, Phase, RetryMachine, Step};

use super::commands::{ConnectionCommand, MessageListener};
use super::{ConnectCallback, ConnectionSnapshot, ConnectionState};
use crate::config::LinkConfig;
use crate::error::LinkError;
use crate::host::ProcessExit;
use crate::stream::{LinkEvent, LinkEventKind, StreamLink};
use crate::supervisor::ProcessSupervisor;

pub(super) struct ConnectionActor {
    commands: mpsc::Receiver<ConnectionCommand>,
    events: mpsc::UnboundedReceiver<LinkEvent>,
    link: StreamLink,
    supervisor: ProcessSupervisor,
    machine: RetryMachine,
    host: String,
    state: ConnectionState,
    state_tx: watch::Sender<ConnectionState>,
    retry_at: Option<Instant>,
    on_connect: ConnectCallback,
    on_message: Option<MessageListener>,
    cancel_token: CancellationToken,
}

impl ConnectionActor {
    pub(super) fn new(
        config: &LinkConfig,
        supervisor: ProcessSupervisor,
        commands: mpsc::Receiver<ConnectionCommand>,
        on_connect: ConnectCallback,
        state_tx: watch::Sender<ConnectionState>,
        cancel_token: CancellationToken,
    ) -> Self {
        let (event_tx, events) = mpsc::unbounded_channel();
        Self {
            commands,
            events,
            link: StreamLink::new(event_tx, config.connect_timeout()),
            supervisor,
            machine: RetryMachine::new(config.policy()),
            host: config.host.clone(),
            state: ConnectionState::Disconnected,
            state_tx,
            retry_at: None,
            on_connect,
            on_message: None,
            cancel_token,
        }
    }

    /// Runs until disconnected, cancelled, or every handle is dropped.
    pub(super) async fn run(mut self) {
        info!("Connection orchestrator starting");
        if !self.start().await {
            info!("Connection orchestrator stopped before connecting");
            return;
        }

        loop {
            tokio::select! {
                biased;

                _ = self.cancel_token.cancelled() => {
                    info!("Connection orchestrator cancelled");
                    self.shutdown().await;
                    break;
                }

                command = self.commands.recv() => match command {
                    Some(ConnectionCommand::Disconnect { respond_to }) => {
                        self.shutdown().await;
                        let _ = respond_to.send(());
                        break;
                    }
                    Some(command) => self.handle_command(command),
                    None => {
                        debug!("All connection handles dropped");
                        self.shutdown().await;
                        break;
                    }
                },

                Some(event) = self.events.recv() => self.handle_link_event(event),

                _ = retry_timer(self.retry_at) => {
                    self.retry_at = None;
                    let step = self.machine.on_retry_elapsed();
                    self.execute(step);
                }

                exit = self.supervisor.next_exit() => {
                    if !self.handle_exit(exit).await {
                        break;
                    }
                }
            }
        }

        info!(attempt = self.machine.attempt(), "Connection orchestrator stopped");
    }

    /// Creates the process once, then dials it.
    ///
    /// Returns false when the actor was told to stop while the process was
    /// being created.
    async fn start(&mut self) -> bool {
        self.set_state(ConnectionState::Connecting);
        let created = self.supervisor.create().await;
        if self.interrupted().await {
            return false;
        }

        match created {
            Ok(port) => {
                debug!(port, "Bridge process created, connecting");
                let step = self.machine.begin();
                self.execute(step);
            }
            Err(e) => {
                self.machine.halt();
                self.set_state(ConnectionState::Disconnected);
                (self.on_connect)(Err(e));
            }
        }
        true
    }

    /// Handles commands that queued up during a long await.
    ///
    /// A pending disconnect, a cancelled token or dropped handles win over
    /// whatever the caller was about to do. Returns true if the actor shut
    /// down and must stop.
    async fn interrupted(&mut self) -> bool {
        if self.cancel_token.is_cancelled() {
            info!("Connection orchestrator cancelled");
            self.shutdown().await;
            return true;
        }
        loop {
            match self.commands.try_recv() {
                Ok(ConnectionCommand::Disconnect { respond_to }) => {
                    self.shutdown().await;
                    let _ = respond_to.send(());
                    return true;
                }
                Ok(command) => self.handle_command(command),
                Err(TryRecvError::Empty) => return false,
                Err(TryRecvError::Disconnected) => {
                    debug!("All connection handles dropped");
                    self.shutdown().await;
                    return true;
                }
            }
        }
    }

    fn handle_command(&mut self, command: ConnectionCommand) {
        match command {
            ConnectionCommand::SetListener { listener } => {
                self.on_message = Some(listener);
            }
            ConnectionCommand::Write { data } => self.link.write(&data),
            ConnectionCommand::WriteLine { text } => self.link.writeline(&text),
            ConnectionCommand::Clear => self.link.clear(),
            ConnectionCommand::Snapshot { respond_to } => {
                let _ = respond_to.send(self.snapshot());
            }
            // Handled by the run loop.
            ConnectionCommand::Disconnect { respond_to } => {
                let _ = respond_to.send(());
            }
        }
    }

    fn handle_link_event(&mut self, event: LinkEvent) {
        if !self.link.is_current(event.generation) {
            trace!(generation = event.generation, "Dropping event from stale socket");
            return;
        }

        match event.kind {
            LinkEventKind::Connected => {
                let step = self.machine.on_connected();
                self.execute(step);
            }
            LinkEventKind::Data(bytes) => match self.on_message.as_mut() {
                Some(listener) => listener(bytes),
                None => trace!(len = bytes.len(), "No listener, dropping incoming bytes"),
            },
            LinkEventKind::Failed { reason, detail } => {
                warn!(
                    reason = %reason,
                    attempt = self.machine.attempt(),
                    detail = detail.as_deref().unwrap_or(""),
                    "{}",
                    reason.describe()
                );
                let step = self.machine.on_failure(reason);
                self.execute(step);
            }
        }
    }

    /// Recreates the process after it died. Returns false when the actor
    /// shut down in the meantime.
    async fn handle_exit(&mut self, exit: ProcessExit) -> bool {
        if matches!(self.machine.phase(), Phase::Idle | Phase::Failed) {
            debug!(name = %exit.name, "Process exit after lifecycle ended, ignoring");
            return true;
        }
        if !self.supervisor.should_resurrect(&exit) {
            debug!(name = %exit.name, pid = ?exit.process_id, "Ignoring process exit");
            return true;
        }

        warn!(
            pid = ?exit.process_id,
            "{}, restarting",
            FailureReason::ProcessExited.describe()
        );
        self.link.disconnect();
        self.set_state(ConnectionState::Connecting);

        let created = self.supervisor.create().await;
        if self.interrupted().await {
            return false;
        }

        match created {
            Ok(port) => {
                debug!(port, "Bridge process recreated");
                let step = self.machine.on_failure(FailureReason::ProcessExited);
                self.execute(step);
            }
            Err(e) => {
                self.machine.halt();
                self.retry_at = None;
                self.set_state(ConnectionState::Disconnected);
                (self.on_connect)(Err(e));
            }
        }
        true
    }

    /// Carries out what the retry machine decided.
    fn execute(&mut self, step: Step) {
        match step {
            Step::Connect { attempt } => {
                let Some(port) = self.supervisor.port() else {
                    warn!(attempt, "No bridge process port, cannot connect");
                    return;
                };
                self.set_state(ConnectionState::Connecting);
                let endpoint = Endpoint::new(self.host.clone(), port);
                let generation = self.link.connect(&endpoint);
                debug!(attempt, port, generation, "Connecting");
            }
            Step::Retry { attempt, delay } => {
                self.link.disconnect();
                self.set_state(ConnectionState::Connecting);
                self.retry_at = Some(Instant::now() + delay);
                info!(attempt, delay_ms = delay.as_millis() as u64, "Reconnecting");
            }
            Step::Connected => {
                self.set_state(ConnectionState::Connected);
                info!(port = ?self.supervisor.port(), "Connected to term");
                (self.on_connect)(Ok(()));
            }
            Step::Exhausted { attempts } => {
                self.link.disconnect();
                self.set_state(ConnectionState::Disconnected);
                self.retry_at = None;
                error!(attempts, "Giving up on the term connection");
                (self.on_connect)(Err(LinkError::RetriesExhausted { attempts }));
            }
            Step::Ignore => {}
        }
    }

    /// Stop watching, close the socket, dispose the process.
    async fn shutdown(&mut self) {
        self.set_state(ConnectionState::Closing);
        self.supervisor.stop_watching();
        self.link.disconnect();
        self.retry_at = None;
        self.supervisor.dispose().await;
        self.machine.reset();
        self.set_state(ConnectionState::Disconnected);
        info!("Disconnected");
    }

    /// Records `state` and publishes it to handles when it changed.
    fn set_state(&mut self, state: ConnectionState) {
        self.state = state;
        self.state_tx.send_if_modified(|current| {
            if *current == state {
                return false;
            }
            trace!(from = ?*current, to = ?state, "Connection state changed");
            *current = state;
            true
        });
    }

    fn snapshot(&self) -> ConnectionSnapshot {
        let retry = self.machine.state();
        ConnectionSnapshot {
            state: self.state,
            attempt: retry.attempt,
            port: self.supervisor.port(),
            process_id: self.supervisor.process_id(),
            generation: self.link.generation(),
            last_written: self.link.window().to_vec(),
            retry_scheduled: retry.stopped,
        }
    }
}

/// Fires at `deadline`, or never when no retry is scheduled.
async fn retry_timer(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => future::pending().await,
    }
}
