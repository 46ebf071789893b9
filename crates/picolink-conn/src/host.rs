//! Process host abstraction.
//!
//! The supervisor never touches the OS directly. It goes through a
//! [`ProcessHost`], which can spawn named processes, list the ones already
//! running, and broadcast exit notifications. [`SystemProcessHost`] is the
//! real implementation; tests supply their own.
//!
//! **Panic-Free Policy:** This module follows the project's panic-free guidelines.
//! No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, or `todo!()`.

use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use sysinfo::{Pid, System};
use tokio::process::Command;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use picolink_core::{ProcessId, SpawnSpec};

/// Capacity of the exit notification channel.
const EXIT_CHANNEL_CAPACITY: usize = 16;

/// Notification that a hosted process ended on its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessExit {
    pub name: String,
    pub process_id: Option<ProcessId>,
}

/// A process owned or discovered by a host.
#[async_trait]
pub trait ManagedProcess: Send + Sync {
    fn name(&self) -> &str;

    /// OS id, if the host still knows it.
    async fn process_id(&self) -> Option<ProcessId>;

    /// Terminates the process. Never fails; an already dead process is fine.
    async fn dispose(&self);
}

/// Spawns and enumerates bridge processes.
#[async_trait]
pub trait ProcessHost: Send + Sync {
    async fn spawn(&self, spec: &SpawnSpec) -> io::Result<Box<dyn ManagedProcess>>;

    /// Every bridge process currently running, including ones left over from
    /// an earlier run.
    async fn instances(&self) -> Vec<Box<dyn ManagedProcess>>;

    fn subscribe_exits(&self) -> broadcast::Receiver<ProcessExit>;
}

// ============================================================================
// System host
// ============================================================================

/// Host backed by real OS processes.
///
/// Running instances are found by scanning the process table for command
/// lines that mention the bridge script.
pub struct SystemProcessHost {
    name: String,
    script: PathBuf,
    exits: broadcast::Sender<ProcessExit>,
}

impl SystemProcessHost {
    pub fn new(name: impl Into<String>, script: impl Into<PathBuf>) -> Self {
        let (exits, _) = broadcast::channel(EXIT_CHANNEL_CAPACITY);
        Self {
            name: name.into(),
            script: script.into(),
            exits,
        }
    }
}

#[async_trait]
impl ProcessHost for SystemProcessHost {
    async fn spawn(&self, spec: &SpawnSpec) -> io::Result<Box<dyn ManagedProcess>> {
        let mut child = Command::new(&spec.program)
            .args(spec.args())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(spec.transient)
            .spawn()?;

        let process_id = child.id().map(ProcessId::new);
        let kill = CancellationToken::new();

        info!(
            name = %spec.name,
            pid = ?process_id,
            port = spec.port,
            "Spawned bridge process"
        );

        let watcher_kill = kill.clone();
        let exits = self.exits.clone();
        let name = spec.name.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = watcher_kill.cancelled() => {
                    if let Err(e) = child.kill().await {
                        debug!(error = %e, "Kill on dispose failed, process likely gone");
                    }
                }
                status = child.wait() => {
                    match status {
                        Ok(status) => info!(name = %name, pid = ?process_id, %status, "Bridge process exited"),
                        Err(e) => warn!(name = %name, error = %e, "Failed waiting on bridge process"),
                    }
                    // No receivers is fine.
                    let _ = exits.send(ProcessExit { name, process_id });
                }
            }
        });

        Ok(Box::new(SpawnedProcess {
            name: spec.name.clone(),
            process_id,
            kill,
        }))
    }

    async fn instances(&self) -> Vec<Box<dyn ManagedProcess>> {
        let script = self.script.clone();
        let pids = tokio::task::spawn_blocking(move || scan_for_script(&script))
            .await
            .unwrap_or_else(|e| {
                warn!(error = %e, "Process scan task failed");
                Vec::new()
            });

        pids.into_iter()
            .map(|process_id| {
                Box::new(ExternalProcess {
                    name: self.name.clone(),
                    process_id,
                }) as Box<dyn ManagedProcess>
            })
            .collect()
    }

    fn subscribe_exits(&self) -> broadcast::Receiver<ProcessExit> {
        self.exits.subscribe()
    }
}

/// Ids of running processes whose command line contains `script`.
///
/// Blocking; run via `spawn_blocking`.
fn scan_for_script(script: &Path) -> Vec<ProcessId> {
    let own_pid = std::process::id();
    let mut system = System::new();
    system.refresh_all();

    system
        .processes()
        .iter()
        .filter(|(pid, _)| pid.as_u32() != own_pid)
        .filter(|(_, process)| process.cmd().iter().any(|arg| Path::new(arg) == script))
        .map(|(pid, _)| ProcessId::new(pid.as_u32()))
        .collect()
}

// ============================================================================
// Process handles
// ============================================================================

/// A child this host spawned.
struct SpawnedProcess {
    name: String,
    process_id: Option<ProcessId>,
    kill: CancellationToken,
}

#[async_trait]
impl ManagedProcess for SpawnedProcess {
    fn name(&self) -> &str {
        &self.name
    }

    async fn process_id(&self) -> Option<ProcessId> {
        self.process_id
    }

    async fn dispose(&self) {
        debug!(name = %self.name, pid = ?self.process_id, "Disposing bridge process");
        self.kill.cancel();
    }
}

/// A process found in the process table.
struct ExternalProcess {
    name: String,
    process_id: ProcessId,
}

#[async_trait]
impl ManagedProcess for ExternalProcess {
    fn name(&self) -> &str {
        &self.name
    }

    async fn process_id(&self) -> Option<ProcessId> {
        Some(self.process_id)
    }

    async fn dispose(&self) {
        let raw = self.process_id.as_u32();
        let killed = tokio::task::spawn_blocking(move || {
            let mut system = System::new();
            system.refresh_all();
            system
                .process(Pid::from_u32(raw))
                .map(|process| process.kill())
                .unwrap_or(false)
        })
        .await
        .unwrap_or(false);

        debug!(pid = raw, killed, "Disposed stale bridge process");
    }
}
