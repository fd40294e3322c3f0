// src/core/router.rs

//! Wires the worker pool, the dispatcher, the result readers, the forwarder,
//! and the room registry into one running router.

use crate::config::Config;
use crate::core::RoomGraphError;
use crate::core::dispatch::{Dispatcher, Forwarder, TaskResult, spawn_readers};
use crate::core::pool::{PoolConfig, WorkerPool, WorkerSpawner};
use crate::core::protocol::FrameCodec;
use crate::core::session::{RoomRegistry, SessionManager, SourceCounter};
use crate::core::transport::{RoomTransport, StanzaAdapter};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{error, info};

/// A running router. Open sessions through [`RoomGraph::sessions`].
pub struct RoomGraph {
    pool: WorkerPool,
    tasks: JoinSet<TaskResult>,
    dispatcher: Dispatcher,
    rooms: RoomRegistry,
    sessions: SessionManager,
}

impl RoomGraph {
    /// Starts the worker pool and every routing task.
    ///
    /// Fails if the pool cannot be brought up completely.
    pub async fn start(
        config: &Config,
        spawner: &dyn WorkerSpawner,
        transport: Arc<dyn RoomTransport>,
        adapter: Arc<dyn StanzaAdapter>,
    ) -> Result<Self, RoomGraphError> {
        let mut pool = WorkerPool::start(&PoolConfig::from(config), spawner).await?;
        let codec = FrameCodec::new(config.max_frame_size);

        let (readers, writers): (Vec<_>, Vec<_>) = pool
            .take_connections()
            .into_iter()
            .map(|connection| connection.stream.into_split())
            .unzip();

        let mut tasks = JoinSet::new();
        let dispatcher = Dispatcher::start(writers, codec, config.worker_queue_capacity, &mut tasks);

        let (results_tx, results_rx) = mpsc::channel(config.worker_queue_capacity.max(1));
        spawn_readers(readers, codec, results_tx, &mut tasks);

        let sources = Arc::new(SourceCounter::default());
        let rooms = RoomRegistry::new(
            transport.clone(),
            adapter,
            dispatcher.clone(),
            sources.clone(),
            config.bot_name.clone(),
        );
        tasks.spawn(Forwarder::new(rooms.clone()).run(results_rx));

        let sessions = SessionManager::new(transport, rooms.clone(), dispatcher.clone(), sources);
        info!(
            "Router '{}' ready with {} workers.",
            config.bot_name,
            dispatcher.worker_count()
        );

        Ok(Self {
            pool,
            tasks,
            dispatcher,
            rooms,
            sessions,
        })
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    pub fn rooms(&self) -> &RoomRegistry {
        &self.rooms
    }

    pub fn worker_count(&self) -> usize {
        self.dispatcher.worker_count()
    }

    /// Waits until a routing task fails and returns its error. Returns `Ok`
    /// only if every task finished cleanly.
    pub async fn wait(&mut self) -> Result<(), RoomGraphError> {
        while let Some(joined) = self.tasks.join_next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    error!("Routing task failed: {}", e);
                    return Err(e);
                }
                Err(e) => {
                    error!("Routing task panicked: {e:?}");
                    return Err(e.into());
                }
            }
        }
        Ok(())
    }

    /// Stops routing, leaves every room, and stops every worker.
    pub async fn shutdown(mut self) {
        self.tasks.shutdown().await;
        self.rooms.leave_all();
        self.pool.shutdown().await;
        info!("Router stopped.");
    }
}
