// src/server/context.rs

use crate::core::RoomGraph;
use crate::core::session::SessionHandle;
use crate::core::transport::LocalRoomTransport;
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Holds all the initialized state required to run the coordinator's main loop.
pub struct ServerContext {
    pub router: RoomGraph,
    pub transport: Arc<LocalRoomTransport>,
    /// The member name router publications carry.
    pub bot_name: String,
    /// Sessions opened from the configured routes.
    pub sessions: Vec<SessionHandle>,
    pub shutdown: CancellationToken,
    pub background_tasks: JoinSet<Result<(), anyhow::Error>>,
}
