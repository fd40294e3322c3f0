// src/server/mod.rs

use crate::config::Config;
use anyhow::Result;

pub mod console;
mod context;
mod initialization;
mod main_loop;
mod worker_process;

pub use context::ServerContext;

/// The coordinator startup function, orchestrating all setup phases.
pub async fn run(config: Config) -> Result<()> {
    // 1. Start the workers, the router, and the configured routes.
    let mut server_context = initialization::setup(config).await?;

    // 2. Attach the console front-end.
    console::spawn_all(&mut server_context);

    // 3. Run until a signal or a routing failure.
    main_loop::run(server_context).await
}

/// The entry point of worker mode.
pub async fn run_worker() -> Result<()> {
    worker_process::run().await
}
