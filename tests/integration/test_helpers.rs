// tests/integration/test_helpers.rs

//! Test helpers and utilities for integration tests

use futures::StreamExt;
use roomgraph::RoomGraph;
use roomgraph::config::Config;
use roomgraph::core::events::Event;
use roomgraph::core::pool::{InProcessSpawner, WorkerSpawner};
use roomgraph::core::room::RoomId;
use roomgraph::core::transport::{
    JsonStanzaAdapter, LocalRoomTransport, RoomSubscription, RoomTransport, StanzaAdapter,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

/// How long a test waits for something that should happen.
pub const DELIVERY_TIMEOUT: Duration = Duration::from_secs(2);
/// How long a test waits to be confident something does not happen.
pub const QUIET_PERIOD: Duration = Duration::from_millis(150);

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("warn")
        .with_test_writer()
        .try_init();
}

pub fn room(name: &str) -> RoomId {
    RoomId::parse(name).unwrap()
}

pub fn test_config(concurrency: usize) -> Config {
    Config {
        worker_concurrency: concurrency,
        startup_timeout: Duration::from_secs(5),
        handshake_timeout: Duration::from_secs(1),
        ..Config::default()
    }
}

/// TestContext provides a running router on an in-process room hub, with
/// workers running as tasks that speak the real socket protocol.
pub struct TestContext {
    pub graph: RoomGraph,
    pub hub: Arc<LocalRoomTransport>,
}

impl TestContext {
    pub async fn new(concurrency: usize) -> Self {
        let hub = Arc::new(LocalRoomTransport::new(Arc::new(JsonStanzaAdapter)));
        Self::with_transport(concurrency, hub.clone(), hub).await
    }

    /// Starts the router on `transport`; `hub` is where the test injects and observes traffic.
    pub async fn with_transport(
        concurrency: usize,
        transport: Arc<dyn RoomTransport>,
        hub: Arc<LocalRoomTransport>,
    ) -> Self {
        Self::with_spawner(test_config(concurrency), &InProcessSpawner, transport, hub).await
    }

    pub async fn with_spawner(
        config: Config,
        spawner: &dyn WorkerSpawner,
        transport: Arc<dyn RoomTransport>,
        hub: Arc<LocalRoomTransport>,
    ) -> Self {
        init_tracing();
        let graph = RoomGraph::start(&config, spawner, transport, Arc::new(JsonStanzaAdapter))
            .await
            .expect("router failed to start");
        Self { graph, hub }
    }

    /// Joins `name` as an outside observer.
    pub async fn observe(&self, name: &str) -> RoomSubscription {
        self.hub.join(&room(name), "observer").await.unwrap()
    }

    /// Publishes `event` into `name` as an outside producer.
    pub fn publish(&self, name: &str, event: &Event) {
        self.hub.publish_event(&room(name), "producer", event).unwrap();
    }
}

/// The next event seen by `observer`, if one arrives within `wait`.
pub async fn next_event(observer: &mut RoomSubscription, wait: Duration) -> Option<Event> {
    let stanza = timeout(wait, observer.incoming.next()).await.ok()??;
    JsonStanzaAdapter.to_event(&stanza)
}

/// Waits until `check` holds, polling briefly. Panics after `DELIVERY_TIMEOUT`.
pub async fn eventually<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + DELIVERY_TIMEOUT;
    while !check().await {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not reached in time"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
