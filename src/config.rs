// src/config.rs

//! Manages router configuration: loading, defaults, and validation.

use crate::core::room::RoomId;
use crate::core::rules::Rule;
use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::fs;
use std::time::Duration;
use tracing::warn;

/// A statically configured route, opened as a session at startup.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct RouteConfig {
    pub src: String,
    pub dst: String,
    /// The rule text; absent means every event is routed.
    #[serde(default)]
    pub rule: Option<String>,
}

impl RouteConfig {
    /// Parses the rule text, if any.
    pub fn parse_rule(&self) -> Result<Option<Rule>> {
        self.rule
            .as_deref()
            .map(Rule::parse)
            .transpose()
            .with_context(|| format!("invalid rule for route '{}' -> '{}'", self.src, self.dst))
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Config {
    /// The member name the router joins rooms under.
    #[serde(default = "default_bot_name")]
    pub bot_name: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_worker_concurrency")]
    pub worker_concurrency: usize,
    /// Bounds the whole pool bring-up, from the first spawn to the last handshake.
    #[serde(default = "default_startup_timeout", with = "humantime_serde")]
    pub startup_timeout: Duration,
    /// Bounds reading one worker identity from an accepted connection.
    #[serde(default = "default_handshake_timeout", with = "humantime_serde")]
    pub handshake_timeout: Duration,
    #[serde(default = "default_max_frame_size")]
    pub max_frame_size: usize,
    #[serde(default = "default_worker_queue_capacity")]
    pub worker_queue_capacity: usize,
    #[serde(default)]
    pub routes: Vec<RouteConfig>,
}

fn default_bot_name() -> String {
    "roomgraph".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_worker_concurrency() -> usize {
    1
}
fn default_startup_timeout() -> Duration {
    Duration::from_secs(30)
}
fn default_handshake_timeout() -> Duration {
    Duration::from_secs(10)
}
fn default_max_frame_size() -> usize {
    16 * 1024 * 1024 // 16 MiB
}
fn default_worker_queue_capacity() -> usize {
    64
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bot_name: default_bot_name(),
            log_level: default_log_level(),
            worker_concurrency: default_worker_concurrency(),
            startup_timeout: default_startup_timeout(),
            handshake_timeout: default_handshake_timeout(),
            max_frame_size: default_max_frame_size(),
            worker_queue_capacity: default_worker_queue_capacity(),
            routes: Vec::new(),
        }
    }
}

impl Config {
    /// Creates a new `Config` instance by reading and parsing a TOML file.
    pub fn from_file(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file at '{path}'"))?;
        Self::from_toml_str(&contents).with_context(|| format!("Invalid config file '{path}'"))
    }

    /// Parses and validates a configuration from TOML text.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents).context("Failed to parse TOML")?;
        config.validate()?;
        Ok(config)
    }

    /// Checks the configuration for values the router cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.bot_name.trim().is_empty() {
            return Err(anyhow!("bot_name cannot be empty"));
        }
        if self.worker_concurrency == 0 {
            return Err(anyhow!("worker_concurrency must be at least 1"));
        }
        if self.startup_timeout.is_zero() {
            return Err(anyhow!("startup_timeout cannot be 0"));
        }
        if self.handshake_timeout.is_zero() {
            return Err(anyhow!("handshake_timeout cannot be 0"));
        }
        if self.max_frame_size == 0 {
            return Err(anyhow!("max_frame_size cannot be 0"));
        }
        if self.worker_queue_capacity == 0 {
            return Err(anyhow!("worker_queue_capacity cannot be 0"));
        }
        if self.handshake_timeout > self.startup_timeout {
            warn!(
                "handshake_timeout ({:?}) exceeds startup_timeout ({:?}); the startup bound applies first.",
                self.handshake_timeout, self.startup_timeout
            );
        }

        for (i, route) in self.routes.iter().enumerate() {
            RoomId::parse(&route.src)
                .map_err(|e| anyhow!("invalid route #{}: src: {}", i + 1, e))?;
            RoomId::parse(&route.dst)
                .map_err(|e| anyhow!("invalid route #{}: dst: {}", i + 1, e))?;
            route
                .parse_rule()
                .with_context(|| format!("invalid route #{}", i + 1))?;
        }
        Ok(())
    }
}
