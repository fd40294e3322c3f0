// src/core/pool/mod.rs

//! The worker pool: spawns N workers and completes the rendezvous handshake
//! with each of them before routing may begin.
//!
//! Each worker is told a Unix socket path and a fresh identity. The pool
//! listens on that socket and accepts connections until every expected
//! identity has arrived. An identity outside the expected set aborts startup,
//! and so does a pool that is not complete within the startup timeout. There
//! is no degraded mode with fewer workers.

use crate::config::Config;
use crate::core::RoomGraphError;
use std::collections::HashSet;
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::{UnixListener, UnixStream};
use tokio::time;
use tracing::{debug, info, warn};

pub mod identity;
pub mod spawner;

pub use identity::{IDENTITY_LEN, WorkerIdentity, recv_identity, send_identity};
pub use spawner::{
    InProcessSpawner, ProcessSpawner, StartupDescriptor, SUBPROCESS_ENV, WorkerEntry,
    WorkerProcess, WorkerSpawner,
};

/// The name of the rendezvous socket inside the pool's temporary directory.
const SOCKET_NAME: &str = "socket";

/// Settings for bringing up the pool.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// The number of workers to start.
    pub concurrency: usize,
    /// The bound on the whole bring-up, from the first spawn to the last handshake.
    pub startup_timeout: Duration,
    /// The bound on reading one identity from an accepted connection.
    pub handshake_timeout: Duration,
    pub max_frame_size: usize,
}

impl From<&Config> for PoolConfig {
    fn from(config: &Config) -> Self {
        Self {
            concurrency: config.worker_concurrency,
            startup_timeout: config.startup_timeout,
            handshake_timeout: config.handshake_timeout,
            max_frame_size: config.max_frame_size,
        }
    }
}

/// An established connection to one worker.
#[derive(Debug)]
pub struct WorkerConnection {
    pub identity: WorkerIdentity,
    pub stream: UnixStream,
}

/// A fully started pool of workers.
#[derive(Debug)]
pub struct WorkerPool {
    connections: Vec<WorkerConnection>,
    processes: Vec<WorkerProcess>,
    // Removed (with the socket in it) when the pool is dropped.
    _rendezvous_dir: TempDir,
}

impl WorkerPool {
    /// Spawns `config.concurrency` workers and waits for all of them to connect.
    pub async fn start(config: &PoolConfig, spawner: &dyn WorkerSpawner) -> Result<Self, RoomGraphError> {
        if config.concurrency == 0 {
            return Err(RoomGraphError::Spawn(
                "worker concurrency must be at least 1".to_string(),
            ));
        }

        let rendezvous_dir = tempfile::Builder::new().prefix("roomgraph-").tempdir()?;
        let socket_path = rendezvous_dir.path().join(SOCKET_NAME);
        let listener = UnixListener::bind(&socket_path)?;
        debug!("Rendezvous socket bound at {}", socket_path.display());

        let identities = WorkerIdentity::generate_distinct(config.concurrency);
        let mut processes = Vec::with_capacity(identities.len());
        for identity in &identities {
            let descriptor = StartupDescriptor {
                socket_path: socket_path.clone(),
                identity: identity.clone(),
                entry: WorkerEntry::RoomGraph,
                max_frame_size: config.max_frame_size,
            };
            processes.push(spawner.spawn(descriptor).await?);
        }

        let mut waiting: HashSet<WorkerIdentity> = identities.into_iter().collect();
        let mut connections = Vec::with_capacity(config.concurrency);
        let handshake = accept_workers(
            &listener,
            &mut waiting,
            &mut connections,
            config.handshake_timeout,
        );

        let outcome = time::timeout(config.startup_timeout, handshake).await;
        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                terminate_all(&mut processes).await;
                return Err(e);
            }
            Err(_) => {
                warn!(
                    "Worker pool startup timed out with {} of {} workers connected.",
                    connections.len(),
                    config.concurrency
                );
                terminate_all(&mut processes).await;
                return Err(RoomGraphError::StartupTimeout {
                    expected: config.concurrency,
                    connected: connections.len(),
                });
            }
        }

        if config.concurrency == 1 {
            info!("Started 1 worker process");
        } else {
            info!("Started {} worker processes", config.concurrency);
        }

        Ok(Self {
            connections,
            processes,
            _rendezvous_dir: rendezvous_dir,
        })
    }

    /// The number of workers in the pool.
    pub fn size(&self) -> usize {
        self.processes.len()
    }

    /// Hands the worker connections over to the dispatcher. Subsequent calls return nothing.
    pub fn take_connections(&mut self) -> Vec<WorkerConnection> {
        std::mem::take(&mut self.connections)
    }

    /// Stops every worker.
    pub async fn shutdown(mut self) {
        self.connections.clear();
        terminate_all(&mut self.processes).await;
        info!("Worker pool shut down.");
    }
}

/// Accepts rendezvous connections until every identity in `waiting` has arrived.
async fn accept_workers(
    listener: &UnixListener,
    waiting: &mut HashSet<WorkerIdentity>,
    connections: &mut Vec<WorkerConnection>,
    handshake_timeout: Duration,
) -> Result<(), RoomGraphError> {
    while !waiting.is_empty() {
        let (mut stream, _) = listener.accept().await?;
        let identity = recv_identity(&mut stream, handshake_timeout).await?;
        if !waiting.remove(&identity) {
            return Err(RoomGraphError::UnknownWorker(identity.to_string()));
        }
        debug!(
            "Worker {} connected ({} still expected).",
            identity,
            waiting.len()
        );
        connections.push(WorkerConnection { identity, stream });
    }
    Ok(())
}

async fn terminate_all(processes: &mut [WorkerProcess]) {
    for process in processes.iter_mut() {
        process.terminate().await;
    }
}
