// src/main.rs

//! The main entry point for the RoomGraph router.

use anyhow::Result;
use roomgraph::config::Config;
use roomgraph::core::pool::SUBPROCESS_ENV;
use roomgraph::server;
use std::env;
use tracing::{error, info};
use tracing_subscriber::{filter::EnvFilter, prelude::*};

#[tokio::main]
async fn main() -> Result<()> {
    run_app().await
}

async fn run_app() -> Result<()> {
    const VERSION: &str = env!("CARGO_PKG_VERSION");

    let args: Vec<String> = env::args().collect();

    if args.contains(&"--version".to_string()) {
        println!("RoomGraph version {VERSION}");
        return Ok(());
    }

    // --- Worker Mode ---
    // Set by the coordinator on the processes it spawns.
    if env::var_os(SUBPROCESS_ENV).is_some() {
        init_logging("info");
        if let Err(e) = server::run_worker().await {
            error!("Worker runtime error: {:#}", e);
            return Err(e);
        }
        return Ok(());
    }

    // --- Coordinator Mode ---
    let config_path = args
        .iter()
        .position(|arg| arg == "--config")
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str())
        .unwrap_or("config.toml");

    let mut config = match Config::from_file(config_path) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Failed to load configuration from \"{config_path}\": {e:#}");
            std::process::exit(1);
        }
    };

    if let Some(index) = args.iter().position(|arg| arg == "--concurrency") {
        match args.get(index + 1).map(|s| s.parse::<usize>()) {
            Some(Ok(concurrency)) if concurrency > 0 => config.worker_concurrency = concurrency,
            Some(_) => {
                eprintln!("--concurrency requires a positive integer");
                std::process::exit(1);
            }
            None => {
                eprintln!("--concurrency flag requires a value");
                std::process::exit(1);
            }
        }
    }

    init_logging(&config.log_level);
    info!("Starting RoomGraph coordinator...");

    if let Err(e) = server::run(config).await {
        error!("Router runtime error: {:#}", e);
        return Err(e);
    }

    Ok(())
}

/// Installs the global subscriber. `RUST_LOG` takes precedence over `default_level`.
/// Logs go to stderr; stdout carries console output.
fn init_logging(default_level: &str) {
    let level = env::var("RUST_LOG").unwrap_or_else(|_| default_level.to_string());
    tracing_subscriber::registry()
        .with(EnvFilter::new(level))
        .with(
            tracing_subscriber::fmt::layer()
                .compact()
                .with_ansi(true)
                .with_writer(std::io::stderr),
        )
        .init();
}
