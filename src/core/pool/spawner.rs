// src/core/pool/spawner.rs

//! Starting worker processes and handing them their startup descriptor.

use super::identity::WorkerIdentity;
use crate::core::RoomGraphError;
use crate::core::worker;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// The environment marker that switches the binary into worker mode.
pub const SUBPROCESS_ENV: &str = "ROOMGRAPH_SUBPROCESS";

/// The routine a worker runs once connected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerEntry {
    /// Classify events against per-source rule tables.
    RoomGraph,
}

/// Everything a worker needs to know, delivered once at spawn time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartupDescriptor {
    /// The rendezvous socket to connect to.
    pub socket_path: PathBuf,
    /// The identity to present as the first bytes on the connection.
    pub identity: WorkerIdentity,
    pub entry: WorkerEntry,
    pub max_frame_size: usize,
}

/// A running worker, owned by the pool for as long as the run lasts.
#[derive(Debug)]
pub enum WorkerProcess {
    Child(Child),
    Task(JoinHandle<Result<(), RoomGraphError>>),
}

impl WorkerProcess {
    /// Stops the worker without waiting for it to finish its current message.
    pub async fn terminate(&mut self) {
        match self {
            WorkerProcess::Child(child) => {
                if let Err(e) = child.kill().await {
                    debug!("Worker process already gone: {}", e);
                }
            }
            WorkerProcess::Task(handle) => handle.abort(),
        }
    }
}

impl Drop for WorkerProcess {
    fn drop(&mut self) {
        // Children are spawned with `kill_on_drop`.
        if let WorkerProcess::Task(handle) = self {
            handle.abort();
        }
    }
}

/// Starts one worker for a descriptor.
#[async_trait]
pub trait WorkerSpawner: Send + Sync {
    async fn spawn(&self, descriptor: StartupDescriptor) -> Result<WorkerProcess, RoomGraphError>;
}

/// Re-executes a program (by default the running binary) in worker mode and
/// writes the descriptor to its stdin as one JSON line.
#[derive(Debug, Clone)]
pub struct ProcessSpawner {
    program: PathBuf,
    args: Vec<String>,
}

impl ProcessSpawner {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn current_exe() -> Result<Self, RoomGraphError> {
        Ok(Self::new(std::env::current_exe()?))
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }
}

#[async_trait]
impl WorkerSpawner for ProcessSpawner {
    async fn spawn(&self, descriptor: StartupDescriptor) -> Result<WorkerProcess, RoomGraphError> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .env(SUBPROCESS_ENV, "1")
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                RoomGraphError::Spawn(format!("{}: {}", self.program.display(), e))
            })?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| RoomGraphError::Spawn("worker stdin is not piped".to_string()))?;

        let mut line = serde_json::to_vec(&descriptor)
            .map_err(|e| RoomGraphError::Encode(e.to_string()))?;
        line.push(b'\n');
        if let Err(e) = stdin.write_all(&line).await {
            warn!("Failed to hand the startup descriptor to a worker: {}", e);
            return Err(e.into());
        }
        stdin.shutdown().await?;

        debug!(
            "Spawned worker process {:?} for identity {}",
            child.id(),
            descriptor.identity
        );
        Ok(WorkerProcess::Child(child))
    }
}

/// Runs workers as tasks on the current runtime, still connecting over the
/// rendezvous socket and speaking the full wire protocol.
#[derive(Debug, Clone, Copy, Default)]
pub struct InProcessSpawner;

#[async_trait]
impl WorkerSpawner for InProcessSpawner {
    async fn spawn(&self, descriptor: StartupDescriptor) -> Result<WorkerProcess, RoomGraphError> {
        Ok(WorkerProcess::Task(tokio::spawn(worker::run(descriptor))))
    }
}
