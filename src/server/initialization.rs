// src/server/initialization.rs

//! Brings up the coordinator: the room hub, the worker pool, the router, and
//! the statically configured routes.

use super::context::ServerContext;
use crate::config::Config;
use crate::core::RoomGraph;
use crate::core::pool::ProcessSpawner;
use crate::core::session::SessionHandle;
use crate::core::transport::{JsonStanzaAdapter, LocalRoomTransport};
use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Initializes all coordinator components before starting the main loop.
pub async fn setup(config: Config) -> Result<ServerContext> {
    log_startup_info(&config);
    let shutdown = CancellationToken::new();

    let adapter = Arc::new(JsonStanzaAdapter);
    let transport = Arc::new(LocalRoomTransport::new(adapter.clone()));
    let spawner = ProcessSpawner::current_exe().context("Cannot locate the running binary")?;

    let router = RoomGraph::start(&config, &spawner, transport.clone(), adapter)
        .await
        .context("Failed to start the router")?;

    let sessions = match open_routes(&config, &router, &shutdown).await {
        Ok(sessions) => sessions,
        Err(e) => {
            router.shutdown().await;
            return Err(e);
        }
    };

    Ok(ServerContext {
        router,
        transport,
        bot_name: config.bot_name,
        sessions,
        shutdown,
        background_tasks: JoinSet::new(),
    })
}

async fn open_routes(
    config: &Config,
    router: &RoomGraph,
    shutdown: &CancellationToken,
) -> Result<Vec<SessionHandle>> {
    let mut sessions = Vec::with_capacity(config.routes.len());
    for route in &config.routes {
        let rule = route.parse_rule()?;
        let session = router
            .sessions()
            .open_session(&route.src, &route.dst, rule, shutdown)
            .await
            .with_context(|| format!("Failed to open route '{}' -> '{}'", route.src, route.dst))?;
        sessions.push(session);
    }
    if sessions.is_empty() {
        warn!("No routes configured; events will not be routed anywhere.");
    } else {
        info!("Opened {} configured routes.", sessions.len());
    }
    Ok(sessions)
}

fn log_startup_info(config: &Config) {
    info!(
        "RoomGraph {} starting as '{}' (pid {}).",
        env!("CARGO_PKG_VERSION"),
        config.bot_name,
        std::process::id()
    );
    info!(
        "Workers: {}, startup timeout: {:?}, max frame: {} bytes.",
        config.worker_concurrency, config.startup_timeout, config.max_frame_size
    );
}
