// tests/integration/pool_test.rs

use super::test_helpers::init_tracing;
use async_trait::async_trait;
use roomgraph::core::pool::{
    InProcessSpawner, PoolConfig, ProcessSpawner, StartupDescriptor, WorkerIdentity,
    WorkerPool, WorkerProcess, WorkerSpawner, send_identity,
};
use roomgraph::core::worker;
use roomgraph::core::RoomGraphError;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::net::UnixStream;

fn pool_config(concurrency: usize, startup_timeout: Duration) -> PoolConfig {
    PoolConfig {
        concurrency,
        startup_timeout,
        handshake_timeout: Duration::from_secs(1),
        max_frame_size: 1024 * 1024,
    }
}

/// Starts real workers for every descriptor except the last one requested.
struct MissingLastSpawner {
    expected: usize,
    spawned: AtomicUsize,
}

#[async_trait]
impl WorkerSpawner for MissingLastSpawner {
    async fn spawn(&self, descriptor: StartupDescriptor) -> Result<WorkerProcess, RoomGraphError> {
        if self.spawned.fetch_add(1, Ordering::SeqCst) + 1 == self.expected {
            return Ok(WorkerProcess::Task(tokio::spawn(async { Ok(()) })));
        }
        Ok(WorkerProcess::Task(tokio::spawn(worker::run(descriptor))))
    }
}

/// Starts workers that present an identity the pool never issued.
struct ImpostorSpawner;

#[async_trait]
impl WorkerSpawner for ImpostorSpawner {
    async fn spawn(&self, mut descriptor: StartupDescriptor) -> Result<WorkerProcess, RoomGraphError> {
        descriptor.identity = WorkerIdentity::generate();
        Ok(WorkerProcess::Task(tokio::spawn(worker::run(descriptor))))
    }
}

/// Connects, then disconnects before sending a full identity.
struct HangUpSpawner;

#[async_trait]
impl WorkerSpawner for HangUpSpawner {
    async fn spawn(&self, descriptor: StartupDescriptor) -> Result<WorkerProcess, RoomGraphError> {
        Ok(WorkerProcess::Task(tokio::spawn(async move {
            let stream = UnixStream::connect(&descriptor.socket_path).await?;
            drop(stream);
            Ok(())
        })))
    }
}

struct FailingSpawner;

#[async_trait]
impl WorkerSpawner for FailingSpawner {
    async fn spawn(&self, _descriptor: StartupDescriptor) -> Result<WorkerProcess, RoomGraphError> {
        Err(RoomGraphError::Spawn("no more processes".to_string()))
    }
}

#[tokio::test]
async fn test_pool_starts_every_worker() {
    init_tracing();
    let mut pool = WorkerPool::start(&pool_config(3, Duration::from_secs(5)), &InProcessSpawner)
        .await
        .unwrap();
    assert_eq!(pool.size(), 3);

    let connections = pool.take_connections();
    assert_eq!(connections.len(), 3);
    let identities: std::collections::HashSet<_> =
        connections.iter().map(|c| c.identity.clone()).collect();
    assert_eq!(identities.len(), 3);
    assert!(pool.take_connections().is_empty());

    drop(connections);
    pool.shutdown().await;
}

#[tokio::test]
async fn test_pool_times_out_when_a_worker_never_connects() {
    init_tracing();
    let spawner = MissingLastSpawner {
        expected: 3,
        spawned: AtomicUsize::new(0),
    };
    let err = WorkerPool::start(&pool_config(3, Duration::from_millis(300)), &spawner)
        .await
        .unwrap_err();
    assert_eq!(
        err,
        RoomGraphError::StartupTimeout {
            expected: 3,
            connected: 2
        }
    );
}

#[tokio::test]
async fn test_pool_rejects_unknown_identity() {
    init_tracing();
    let err = WorkerPool::start(&pool_config(2, Duration::from_secs(5)), &ImpostorSpawner)
        .await
        .unwrap_err();
    assert!(matches!(err, RoomGraphError::UnknownWorker(_)), "got {err:?}");
}

#[tokio::test]
async fn test_pool_fails_on_truncated_handshake() {
    init_tracing();
    let err = WorkerPool::start(&pool_config(1, Duration::from_secs(5)), &HangUpSpawner)
        .await
        .unwrap_err();
    assert_eq!(err, RoomGraphError::TruncatedStream);
}

#[tokio::test]
async fn test_pool_surfaces_spawn_failures() {
    init_tracing();
    let err = WorkerPool::start(&pool_config(2, Duration::from_secs(5)), &FailingSpawner)
        .await
        .unwrap_err();
    assert!(matches!(err, RoomGraphError::Spawn(_)));

    let missing = ProcessSpawner::new("/nonexistent/roomgraph-worker");
    let err = WorkerPool::start(&pool_config(1, Duration::from_secs(5)), &missing)
        .await
        .unwrap_err();
    assert!(matches!(err, RoomGraphError::Spawn(_)), "got {err:?}");
}

#[tokio::test]
async fn test_pool_rejects_zero_concurrency() {
    let err = WorkerPool::start(&pool_config(0, Duration::from_secs(1)), &InProcessSpawner)
        .await
        .unwrap_err();
    assert!(matches!(err, RoomGraphError::Spawn(_)));
}

#[tokio::test]
async fn test_identity_written_by_hand_is_accepted() {
    init_tracing();

    /// Performs the worker side of the handshake without the worker routine.
    struct ManualSpawner;

    #[async_trait]
    impl WorkerSpawner for ManualSpawner {
        async fn spawn(&self, descriptor: StartupDescriptor) -> Result<WorkerProcess, RoomGraphError> {
            Ok(WorkerProcess::Task(tokio::spawn(async move {
                let mut stream = UnixStream::connect(&descriptor.socket_path).await?;
                send_identity(&mut stream, &descriptor.identity).await?;
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(())
            })))
        }
    }

    let pool = WorkerPool::start(&pool_config(2, Duration::from_secs(5)), &ManualSpawner)
        .await
        .unwrap();
    assert_eq!(pool.size(), 2);
    pool.shutdown().await;
}

#[tokio::test]
async fn test_process_pool_starts_worker_binaries() {
    init_tracing();
    let spawner = ProcessSpawner::new(env!("CARGO_BIN_EXE_roomgraph"));
    let mut pool = WorkerPool::start(&pool_config(2, Duration::from_secs(10)), &spawner)
        .await
        .unwrap();
    assert_eq!(pool.size(), 2);

    let connections = pool.take_connections();
    let identities: std::collections::HashSet<_> =
        connections.iter().map(|c| c.identity.clone()).collect();
    assert_eq!(identities.len(), 2);

    drop(connections);
    pool.shutdown().await;
}
