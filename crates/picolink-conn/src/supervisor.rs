//! Bridge process lifecycle.
//!
//! The supervisor owns the one bridge process the link talks to. A create
//! cycle kills whatever the previous run left behind, picks a fresh port,
//! spawns `interpreter script port` and remembers the new process id.
//!
//! Exit notifications are delivered through [`ProcessSupervisor::next_exit`],
//! which the orchestrator polls next to its other event sources.
//!
//! **Panic-Free Policy:** This module follows the project's panic-free guidelines.
//! No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, or `todo!()`.

use std::future;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, error, info, warn};

use picolink_core::{PortRange, ProcessId, SpawnSpec};

use crate::config::LinkConfig;
use crate::error::{LinkError, Result};
use crate::host::{ManagedProcess, ProcessExit, ProcessHost};
use crate::store::{StateStore, PROCESS_ID_KEY};

/// Spawns, tracks and restarts the bridge process.
pub struct ProcessSupervisor {
    host: Arc<dyn ProcessHost>,
    store: Box<dyn StateStore>,
    name: String,
    interpreter: PathBuf,
    script: PathBuf,
    port_range: PortRange,
    port: Option<u16>,
    current: Option<Box<dyn ManagedProcess>>,
    current_id: Option<ProcessId>,
    exits: Option<broadcast::Receiver<ProcessExit>>,
    create_failed: bool,
}

impl ProcessSupervisor {
    pub fn new(host: Arc<dyn ProcessHost>, store: Box<dyn StateStore>, config: &LinkConfig) -> Self {
        Self {
            host,
            store,
            name: config.process_name.clone(),
            interpreter: config.interpreter.clone(),
            script: config.script_path.clone(),
            port_range: config.port_range,
            port: None,
            current: None,
            current_id: None,
            exits: None,
            create_failed: false,
        }
    }

    /// Port the current process was told to listen on.
    pub fn port(&self) -> Option<u16> {
        self.port
    }

    pub fn process_id(&self) -> Option<ProcessId> {
        self.current_id
    }

    /// True once a spawn has failed. Automatic restarts stop from then on.
    pub fn create_failed(&self) -> bool {
        self.create_failed
    }

    /// Starts listening for exit notifications.
    pub fn watch(&mut self) {
        self.exits = Some(self.host.subscribe_exits());
    }

    /// Stops listening for exit notifications. Pending ones are discarded.
    pub fn stop_watching(&mut self) {
        self.exits = None;
    }

    pub fn is_watching(&self) -> bool {
        self.exits.is_some()
    }

    /// Kills any instance left over under the remembered process id.
    ///
    /// Exit notifications are ignored while this runs so the kill is not
    /// mistaken for a crash.
    pub async fn ensure_fresh_process(&mut self) {
        self.stop_watching();

        let remembered = self
            .store
            .get(PROCESS_ID_KEY)
            .and_then(|raw| match raw.parse::<ProcessId>() {
                Ok(id) => Some(id),
                Err(e) => {
                    warn!(value = %raw, error = %e, "Ignoring unreadable remembered process id");
                    None
                }
            });

        if let Some(stale) = remembered {
            for instance in self.host.instances().await {
                if instance.process_id().await == Some(stale) {
                    info!(pid = %stale, name = instance.name(), "Terminating stale bridge process");
                    instance.dispose().await;
                }
            }
        }

        self.watch();
    }

    /// Runs a full create cycle: fresh-process check, port pick, spawn.
    ///
    /// Returns the port the new process listens on.
    ///
    /// # Errors
    ///
    /// `LinkError::SpawnFailed` if the host refuses to launch the process.
    /// Automatic restarts are disabled afterwards.
    pub async fn create(&mut self) -> Result<u16> {
        // Replace, don't stack, our own process.
        if let Some(previous) = self.current.take() {
            previous.dispose().await;
        }
        self.current_id = None;

        self.ensure_fresh_process().await;

        let port = self.port_range.pick();
        let spec = SpawnSpec {
            name: self.name.clone(),
            program: self.interpreter.clone(),
            script: self.script.clone(),
            port,
            transient: true,
        };

        let process = match self.host.spawn(&spec).await {
            Ok(process) => process,
            Err(e) => {
                self.create_failed = true;
                self.port = None;
                error!(
                    interpreter = %self.interpreter.display(),
                    script = %self.script.display(),
                    error = %e,
                    "Failed to spawn bridge process"
                );
                return Err(LinkError::SpawnFailed(e.to_string()));
            }
        };

        let process_id = process.process_id().await;
        if let Some(id) = process_id {
            if let Err(e) = self.store.update(PROCESS_ID_KEY, &id.to_string()) {
                warn!(pid = %id, error = %e, "Failed to remember bridge process id");
            }
        }

        debug!(pid = ?process_id, port, "Bridge process ready");
        self.create_failed = false;
        self.port = Some(port);
        self.current = Some(process);
        self.current_id = process_id;
        Ok(port)
    }

    /// Whether `exit` is an unexpected end of our process that warrants a
    /// new create cycle.
    pub fn should_resurrect(&self, exit: &ProcessExit) -> bool {
        if self.create_failed || self.current.is_none() || exit.name != self.name {
            return false;
        }
        match (exit.process_id, self.current_id) {
            (Some(exited), Some(current)) => exited == current,
            _ => true,
        }
    }

    /// Waits for the next exit notification.
    ///
    /// Never completes while not watching, so it can sit in a `select!`.
    pub async fn next_exit(&mut self) -> ProcessExit {
        loop {
            let Some(exits) = self.exits.as_mut() else {
                return future::pending().await;
            };
            match exits.recv().await {
                Ok(exit) => return exit,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Missed process exit notifications");
                }
                Err(RecvError::Closed) => {
                    self.exits = None;
                }
            }
        }
    }

    /// Terminates our process, if any. Best effort.
    pub async fn dispose(&mut self) {
        if let Some(process) = self.current.take() {
            debug!(pid = ?self.current_id, "Disposing bridge process");
            process.dispose().await;
        }
        self.current_id = None;
        self.port = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStateStore;
    use async_trait::async_trait;
    use std::io;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Host whose processes do nothing. `fail` makes every spawn fail.
    struct IdleHost {
        fail: bool,
        next_pid: AtomicU32,
        exits: broadcast::Sender<ProcessExit>,
    }

    impl IdleHost {
        fn new(fail: bool) -> Arc<Self> {
            let (exits, _) = broadcast::channel(4);
            Arc::new(Self {
                fail,
                next_pid: AtomicU32::new(10),
                exits,
            })
        }
    }

    struct IdleProcess(u32);

    #[async_trait]
    impl ManagedProcess for IdleProcess {
        fn name(&self) -> &str {
            "Pico Console"
        }

        async fn process_id(&self) -> Option<ProcessId> {
            Some(ProcessId::new(self.0))
        }

        async fn dispose(&self) {}
    }

    #[async_trait]
    impl ProcessHost for IdleHost {
        async fn spawn(&self, _spec: &SpawnSpec) -> io::Result<Box<dyn ManagedProcess>> {
            if self.fail {
                return Err(io::Error::new(io::ErrorKind::NotFound, "no interpreter"));
            }
            Ok(Box::new(IdleProcess(self.next_pid.fetch_add(1, Ordering::SeqCst))))
        }

        async fn instances(&self) -> Vec<Box<dyn ManagedProcess>> {
            Vec::new()
        }

        fn subscribe_exits(&self) -> broadcast::Receiver<ProcessExit> {
            self.exits.subscribe()
        }
    }

    fn supervisor(fail: bool) -> ProcessSupervisor {
        let config = LinkConfig {
            port_range: PortRange { start: 5000, end: 5001 },
            ..LinkConfig::default()
        };
        ProcessSupervisor::new(IdleHost::new(fail), Box::new(MemoryStateStore::new()), &config)
    }

    fn exit(name: &str, pid: Option<u32>) -> ProcessExit {
        ProcessExit {
            name: name.to_string(),
            process_id: pid.map(ProcessId::new),
        }
    }

    #[tokio::test]
    async fn test_create_picks_port_and_watches() {
        let mut supervisor = supervisor(false);
        assert!(!supervisor.is_watching());

        let port = supervisor.create().await.unwrap();
        assert_eq!(port, 5000);
        assert_eq!(supervisor.port(), Some(5000));
        assert_eq!(supervisor.process_id(), Some(ProcessId::new(10)));
        assert!(supervisor.is_watching());
    }

    #[tokio::test]
    async fn test_should_resurrect_matches_name_and_pid() {
        let mut supervisor = supervisor(false);
        supervisor.create().await.unwrap();

        assert!(supervisor.should_resurrect(&exit("Pico Console", Some(10))));
        assert!(supervisor.should_resurrect(&exit("Pico Console", None)));
        assert!(!supervisor.should_resurrect(&exit("Pico Console", Some(99))));
        assert!(!supervisor.should_resurrect(&exit("bash", Some(10))));
    }

    #[tokio::test]
    async fn test_spawn_failure_disables_resurrection() {
        let mut supervisor = supervisor(true);

        let result = supervisor.create().await;
        assert!(matches!(result, Err(LinkError::SpawnFailed(_))));
        assert!(supervisor.create_failed());
        assert_eq!(supervisor.port(), None);
        assert!(!supervisor.should_resurrect(&exit("Pico Console", None)));
    }

    #[tokio::test]
    async fn test_dispose_forgets_process() {
        let mut supervisor = supervisor(false);
        supervisor.create().await.unwrap();
        supervisor.dispose().await;

        assert_eq!(supervisor.process_id(), None);
        assert_eq!(supervisor.port(), None);
        assert!(!supervisor.should_resurrect(&exit("Pico Console", Some(10))));
    }

    #[tokio::test]
    async fn test_next_exit_delivers_while_watching() {
        let host = IdleHost::new(false);
        let config = LinkConfig::default();
        let mut supervisor =
            ProcessSupervisor::new(host.clone(), Box::new(MemoryStateStore::new()), &config);
        supervisor.watch();

        host.exits.send(exit("Pico Console", Some(3))).unwrap();
        let received = supervisor.next_exit().await;
        assert_eq!(received.process_id, Some(ProcessId::new(3)));

        supervisor.stop_watching();
        let _ = host.exits.send(exit("Pico Console", Some(4)));
        let pending =
            tokio::time::timeout(std::time::Duration::from_millis(50), supervisor.next_exit()).await;
        assert!(pending.is_err());
    }
}
