//! Workers as child processes.

use std::ffi::OsString;
use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStdout, Command};
use tracing::{debug, warn};

use super::{ReadyMessage, WORKER_SLOT_ENV, WorkerExit, WorkerHandle, WorkerLauncher};

/// Launches workers by executing a program with fixed arguments.
///
/// The worker's stdout is reserved for the handshake line; stderr is
/// inherited so worker logs reach the supervisor's terminal.
#[derive(Debug, Clone)]
pub struct ProcessLauncher {
    program: PathBuf,
    args: Vec<OsString>,
}

impl ProcessLauncher {
    pub fn new(program: impl Into<PathBuf>, args: impl IntoIterator<Item = impl Into<OsString>>) -> Self {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Re-execute the running binary in worker mode with the same config file.
    pub fn current_exe(config_path: &str) -> std::io::Result<Self> {
        let program = std::env::current_exe()?;
        Ok(Self::new(program, ["--worker", "--config", config_path]))
    }
}

#[async_trait]
impl WorkerLauncher for ProcessLauncher {
    type Handle = ProcessHandle;

    async fn launch(&self, slot: usize) -> std::io::Result<ProcessHandle> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .env(WORKER_SLOT_ENV, slot.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()?;

        let stdout = child.stdout.take().map(BufReader::new);
        debug!(worker.slot = slot, pid = child.id(), "worker process spawned");
        Ok(ProcessHandle {
            slot,
            child,
            stdout,
        })
    }
}

#[derive(Debug)]
pub struct ProcessHandle {
    slot: usize,
    child: Child,
    stdout: Option<BufReader<ChildStdout>>,
}

#[async_trait]
impl WorkerHandle for ProcessHandle {
    fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    async fn ready(&mut self) -> std::io::Result<ReadyMessage> {
        let mut stdout = self.stdout.take().ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::BrokenPipe, "worker stdout not captured")
        })?;

        let mut line = String::new();
        if stdout.read_line(&mut line).await? == 0 {
            return Err(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "worker exited before handshake",
            ));
        }
        let message: ReadyMessage = serde_json::from_str(line.trim())
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

        // Keep draining so a chatty worker never blocks on a full pipe.
        let slot = self.slot;
        tokio::spawn(async move {
            let mut lines = stdout.lines();
            while let Ok(Some(line)) = lines.next_line().await {
                debug!(worker.slot = slot, %line, "worker stdout");
            }
        });

        Ok(message)
    }

    async fn wait(&mut self) -> WorkerExit {
        match self.child.wait().await {
            Ok(status) => exit_of(status),
            Err(e) => {
                warn!(worker.slot = self.slot, error = %e, "failed to wait for worker");
                WorkerExit::default()
            }
        }
    }

    async fn kill(&mut self) {
        if let Err(e) = self.child.kill().await {
            debug!(worker.slot = self.slot, error = %e, "worker already gone");
        }
    }
}

#[cfg(unix)]
fn exit_of(status: std::process::ExitStatus) -> WorkerExit {
    use std::os::unix::process::ExitStatusExt;
    WorkerExit {
        code: status.code(),
        signal: status.signal(),
    }
}

#[cfg(not(unix))]
fn exit_of(status: std::process::ExitStatus) -> WorkerExit {
    WorkerExit {
        code: status.code(),
        signal: None,
    }
}
