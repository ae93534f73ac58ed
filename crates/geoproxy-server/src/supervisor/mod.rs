//! Worker pool supervision.
//!
//! The supervisor owns a fixed number of slots. At startup it launches one
//! worker per slot, one at a time, and waits for each worker's readiness
//! handshake before launching the next; any failed handshake aborts startup.
//! Once the pool is up, every worker exit is answered by launching exactly
//! one replacement in the same slot, immediately and without limit.
//!
//! ```text
//! Starting ──handshake ok──▶ Ready ──pool up──▶ Running ──exit──▶ Exited
//!                                                                    │
//!                                      fresh worker, same slot ◀─────┘
//! ```
//!
//! How a worker is executed is behind [`WorkerLauncher`]; the server binary
//! uses [`ProcessLauncher`], which re-executes itself in worker mode.

mod process;

pub use process::{ProcessHandle, ProcessLauncher};

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Environment variable carrying a worker's slot number.
pub const WORKER_SLOT_ENV: &str = "GEOPROXY_WORKER_SLOT";

// ============================================================================
// Types
// ============================================================================

/// Lifecycle state of the worker currently occupying a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Starting,
    Ready,
    Running,
    Exited(WorkerExit),
}

/// How a worker terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WorkerExit {
    pub code: Option<i32>,
    pub signal: Option<i32>,
}

impl fmt::Display for WorkerExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.code, self.signal) {
            (Some(code), _) => write!(f, "exit code {code}"),
            (None, Some(signal)) => write!(f, "signal {signal}"),
            (None, None) => write!(f, "unknown exit status"),
        }
    }
}

/// Readiness handshake written by a worker once it is serving.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadyMessage {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ReadyMessage {
    pub fn ready() -> Self {
        Self {
            ok: true,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            ok: false,
            error: Some(error.into()),
        }
    }
}

/// Snapshot of one slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotStatus {
    pub slot: usize,
    pub pid: Option<u32>,
    pub state: WorkerState,
    /// Replacement workers launched in this slot since startup.
    pub restarts: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    #[error("worker count must be > 0")]
    NoWorkers,

    #[error("supervisor already started")]
    AlreadyStarted,

    #[error("failed to launch worker in slot {slot}: {source}")]
    Launch {
        slot: usize,
        #[source]
        source: std::io::Error,
    },

    #[error("worker in slot {slot} failed to start: {reason}")]
    NotReady { slot: usize, reason: String },
}

// ============================================================================
// Launcher seam
// ============================================================================

/// A running worker.
#[async_trait]
pub trait WorkerHandle: Send + 'static {
    fn pid(&self) -> Option<u32>;

    /// Wait for the readiness handshake.
    ///
    /// Fails if the worker goes away before writing one.
    async fn ready(&mut self) -> std::io::Result<ReadyMessage>;

    /// Wait for the worker to terminate.
    async fn wait(&mut self) -> WorkerExit;

    /// Terminate the worker and wait for it to go away.
    async fn kill(&mut self);
}

/// Starts workers for slots.
#[async_trait]
pub trait WorkerLauncher: Send + Sync + 'static {
    type Handle: WorkerHandle;

    async fn launch(&self, slot: usize) -> std::io::Result<Self::Handle>;
}

// ============================================================================
// Supervisor
// ============================================================================

#[derive(Debug)]
struct SlotExit {
    slot: usize,
    pid: Option<u32>,
    exit: WorkerExit,
}

pub struct WorkerSupervisor<L: WorkerLauncher> {
    launcher: Arc<L>,
    slots: Arc<RwLock<Vec<SlotStatus>>>,
    exits_tx: mpsc::UnboundedSender<SlotExit>,
    exits_rx: mpsc::UnboundedReceiver<SlotExit>,
    cancel: CancellationToken,
    monitors: JoinSet<()>,
}

impl<L: WorkerLauncher> WorkerSupervisor<L> {
    pub fn new(launcher: L) -> Self {
        let (exits_tx, exits_rx) = mpsc::unbounded_channel();
        Self {
            launcher: Arc::new(launcher),
            slots: Arc::new(RwLock::new(Vec::new())),
            exits_tx,
            exits_rx,
            cancel: CancellationToken::new(),
            monitors: JoinSet::new(),
        }
    }

    /// Launch `count` workers one after another, each only after the previous
    /// one reported ready. On any failure every launched worker is stopped.
    pub async fn start(&mut self, count: usize) -> Result<(), SupervisorError> {
        if count == 0 {
            return Err(SupervisorError::NoWorkers);
        }
        if !self.slots.read().is_empty() {
            return Err(SupervisorError::AlreadyStarted);
        }

        for slot in 0..count {
            self.slots.write().push(SlotStatus {
                slot,
                pid: None,
                state: WorkerState::Starting,
                restarts: 0,
            });

            if let Err(e) = self.start_slot(slot).await {
                self.stop_workers().await;
                return Err(e);
            }
        }

        for status in self.slots.write().iter_mut() {
            if status.state == WorkerState::Ready {
                status.state = WorkerState::Running;
            }
        }
        Ok(())
    }

    async fn start_slot(&mut self, slot: usize) -> Result<(), SupervisorError> {
        let mut handle = self
            .launcher
            .launch(slot)
            .await
            .map_err(|source| SupervisorError::Launch { slot, source })?;
        let pid = handle.pid();
        set_pid(&self.slots, slot, pid);

        let reason = match handle.ready().await {
            Ok(message) if message.ok => {
                set_state(&self.slots, slot, WorkerState::Ready);
                info!(worker.slot = slot, pid, "worker ready");
                self.monitor(slot, handle, false);
                return Ok(());
            }
            Ok(message) => message
                .error
                .unwrap_or_else(|| "worker reported failure".to_string()),
            Err(e) => e.to_string(),
        };

        handle.kill().await;
        set_state(&self.slots, slot, WorkerState::Exited(WorkerExit::default()));
        Err(SupervisorError::NotReady { slot, reason })
    }

    /// Watch a worker until it exits or the supervisor shuts down.
    fn monitor(&mut self, slot: usize, mut handle: L::Handle, await_ready: bool) {
        let exits = self.exits_tx.clone();
        let cancel = self.cancel.clone();
        let slots = self.slots.clone();

        self.monitors.spawn(async move {
            let pid = handle.pid();
            let exit = tokio::select! {
                exit = watch(&mut handle, &slots, slot, await_ready) => Some(exit),
                _ = cancel.cancelled() => None,
            };
            match exit {
                Some(exit) => {
                    let _ = exits.send(SlotExit { slot, pid, exit });
                }
                None => handle.kill().await,
            }
        });
    }

    /// Replace exited workers until shutdown.
    ///
    /// Returns an error only if a replacement cannot be launched at all.
    pub async fn run(mut self) -> Result<(), SupervisorError> {
        let result = loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break Ok(()),
                Some(event) = self.exits_rx.recv() => {
                    if let Err(e) = self.replace(event).await {
                        break Err(e);
                    }
                }
                Some(_) = self.monitors.join_next(), if !self.monitors.is_empty() => {}
            }
        };

        self.stop_workers().await;
        info!("all workers stopped");
        result
    }

    async fn replace(&mut self, event: SlotExit) -> Result<(), SupervisorError> {
        let SlotExit { slot, pid, exit } = event;
        set_state(&self.slots, slot, WorkerState::Exited(exit));
        // Workers also see Ctrl+C and may exit before the cancel is observed.
        if self.cancel.is_cancelled() {
            info!(worker.slot = slot, pid, %exit, "worker exited during shutdown");
            return Ok(());
        }
        warn!(
            worker.slot = slot,
            pid,
            code = ?exit.code,
            signal = ?exit.signal,
            "worker exited, launching replacement"
        );

        let handle = self
            .launcher
            .launch(slot)
            .await
            .map_err(|source| SupervisorError::Launch { slot, source })?;

        {
            let mut slots = self.slots.write();
            if let Some(status) = slots.get_mut(slot) {
                status.pid = handle.pid();
                status.state = WorkerState::Starting;
                status.restarts += 1;
            }
        }

        self.monitor(slot, handle, true);
        Ok(())
    }

    async fn stop_workers(&mut self) {
        self.cancel.cancel();
        while self.monitors.join_next().await.is_some() {}
    }

    pub fn handle(&self) -> SupervisorHandle {
        SupervisorHandle {
            slots: self.slots.clone(),
            cancel: self.cancel.clone(),
        }
    }
}

async fn watch<H: WorkerHandle>(
    handle: &mut H,
    slots: &RwLock<Vec<SlotStatus>>,
    slot: usize,
    await_ready: bool,
) -> WorkerExit {
    if await_ready {
        match handle.ready().await {
            Ok(message) if message.ok => {
                set_state(slots, slot, WorkerState::Ready);
                let pid = handle.pid();
                info!(worker.slot = slot, pid, "replacement worker ready");
                set_state(slots, slot, WorkerState::Running);
            }
            Ok(message) => {
                warn!(worker.slot = slot, error = ?message.error, "replacement worker failed to start");
                handle.kill().await;
            }
            Err(e) => {
                warn!(worker.slot = slot, error = %e, "no handshake from replacement worker");
            }
        }
    }
    handle.wait().await
}

fn set_state(slots: &RwLock<Vec<SlotStatus>>, slot: usize, state: WorkerState) {
    if let Some(status) = slots.write().get_mut(slot) {
        status.state = state;
    }
}

fn set_pid(slots: &RwLock<Vec<SlotStatus>>, slot: usize, pid: Option<u32>) {
    if let Some(status) = slots.write().get_mut(slot) {
        status.pid = pid;
    }
}

/// Cloneable view of a running supervisor.
#[derive(Clone)]
pub struct SupervisorHandle {
    slots: Arc<RwLock<Vec<SlotStatus>>>,
    cancel: CancellationToken,
}

impl SupervisorHandle {
    pub fn slots(&self) -> Vec<SlotStatus> {
        self.slots.read().clone()
    }

    /// Slots whose worker has not exited.
    pub fn live_workers(&self) -> usize {
        self.slots
            .read()
            .iter()
            .filter(|s| !matches!(s.state, WorkerState::Exited(_)))
            .count()
    }

    /// Stop supervising and terminate all workers.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}
