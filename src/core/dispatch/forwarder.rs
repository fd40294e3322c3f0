// src/core/dispatch/forwarder.rs

//! Publishes classified events to their destination rooms.

use super::{Classified, TaskResult};
use crate::core::room::RoomId;
use crate::core::session::RoomRegistry;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Keeps at most one publish in flight per destination room: a new publish to
/// a room waits for the previous one to that room to finish, so each room sees
/// events in the order they were classified for it.
pub struct Forwarder {
    rooms: RoomRegistry,
    in_flight: HashMap<RoomId, JoinHandle<()>>,
}

impl Forwarder {
    pub fn new(rooms: RoomRegistry) -> Self {
        Self {
            rooms,
            in_flight: HashMap::new(),
        }
    }

    /// Consumes results until every reader has stopped.
    pub async fn run(mut self, mut results: mpsc::Receiver<Classified>) -> TaskResult {
        while let Some(classified) = results.recv().await {
            self.forward(classified).await;
        }
        for (_, publish) in self.in_flight.drain() {
            let _ = publish.await;
        }
        info!("Result forwarder stopped.");
        Ok(())
    }

    async fn forward(&mut self, classified: Classified) {
        let Classified {
            event,
            destinations,
        } = classified;
        let event = Arc::new(event);

        for destination in destinations {
            if let Some(previous) = self.in_flight.remove(&destination) {
                if let Err(e) = previous.await {
                    warn!("Publish to '{}' did not complete: {}", destination, e);
                }
            }

            let Some(outbound) = self.rooms.outbound(&destination) else {
                debug!(
                    "Dropping event for '{}': room is no longer subscribed.",
                    destination
                );
                continue;
            };

            let event = event.clone();
            let room = destination.clone();
            let publish = tokio::spawn(async move {
                if let Err(e) = outbound.send(&event).await {
                    warn!("Failed to publish event to '{}': {}", room, e);
                }
            });
            self.in_flight.insert(destination, publish);
        }

        self.in_flight.retain(|_, publish| !publish.is_finished());
    }
}
