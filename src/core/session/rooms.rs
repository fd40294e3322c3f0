// src/core/session/rooms.rs

//! Reference-counted room subscriptions and the ingestion of room traffic.
//!
//! Each room has a slot. The map of slots and each slot's counters sit behind
//! short synchronous locks; only joining a room awaits, and it does so under
//! that room's own join lock, so a slow join never blocks lookups for other
//! rooms.

use super::SourceCounter;
use crate::core::RoomGraphError;
use crate::core::dispatch::Dispatcher;
use crate::core::events::Event;
use crate::core::protocol::WireMessage;
use crate::core::room::RoomId;
use crate::core::transport::{RoomHandle, RoomTransport, Stanza, StanzaAdapter};
use futures::StreamExt;
use futures::stream::BoxStream;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// A live membership and the task ingesting its traffic.
struct Joined {
    handle: RoomHandle,
    ingest: JoinHandle<()>,
}

#[derive(Default)]
struct SlotState {
    subscribers: usize,
    /// Subscribers still waiting for the join to finish.
    pending: usize,
    joined: Option<Joined>,
}

impl SlotState {
    fn is_unused(&self) -> bool {
        self.subscribers == 0 && self.pending == 0
    }
}

#[derive(Default)]
struct RoomSlot {
    join_lock: tokio::sync::Mutex<()>,
    state: Mutex<SlotState>,
}

struct RegistryInner {
    transport: Arc<dyn RoomTransport>,
    adapter: Arc<dyn StanzaAdapter>,
    dispatcher: Dispatcher,
    sources: Arc<SourceCounter>,
    identity: String,
    rooms: Mutex<HashMap<RoomId, Arc<RoomSlot>>>,
}

/// The live outbound pipe of a subscribed room.
#[derive(Clone)]
pub struct RoomOutbound {
    transport: Arc<dyn RoomTransport>,
    handle: RoomHandle,
}

impl RoomOutbound {
    pub async fn send(&self, event: &Event) -> Result<(), RoomGraphError> {
        self.transport.send(&self.handle, event).await
    }

    pub fn room(&self) -> &RoomId {
        &self.handle.room
    }
}

/// Joins a room on its first subscriber and leaves it after the last one.
///
/// While joined, the room's incoming traffic is converted to events and
/// handed to one worker for classification, unless no session currently uses
/// the room as a source.
#[derive(Clone)]
pub struct RoomRegistry {
    inner: Arc<RegistryInner>,
}

impl RoomRegistry {
    pub fn new(
        transport: Arc<dyn RoomTransport>,
        adapter: Arc<dyn StanzaAdapter>,
        dispatcher: Dispatcher,
        sources: Arc<SourceCounter>,
        identity: impl Into<String>,
    ) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                transport,
                adapter,
                dispatcher,
                sources,
                identity: identity.into(),
                rooms: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Adds one subscriber to `room`, joining it if this is the first.
    ///
    /// If the returned future is dropped before it completes, no subscriber is
    /// added, and a join that completed in the meantime is undone.
    pub async fn subscribe(&self, room: &RoomId) -> Result<(), RoomGraphError> {
        let slot = {
            let mut rooms = self.inner.rooms.lock();
            let slot = rooms.entry(room.clone()).or_default().clone();
            let mut state = slot.state.lock();
            if state.joined.is_some() {
                state.subscribers += 1;
                return Ok(());
            }
            state.pending += 1;
            drop(state);
            slot
        };

        let reservation = Reservation {
            registry: self,
            room,
            slot,
            attached: false,
        };
        self.join(room, &reservation.slot).await?;
        reservation.attach();
        Ok(())
    }

    async fn join(&self, room: &RoomId, slot: &RoomSlot) -> Result<(), RoomGraphError> {
        let _joining = slot.join_lock.lock().await;
        if slot.state.lock().joined.is_some() {
            return Ok(());
        }

        let subscription = self
            .inner
            .transport
            .join(room, &self.inner.identity)
            .await?;
        let ingest = tokio::spawn(ingest(
            room.clone(),
            subscription.incoming,
            self.inner.adapter.clone(),
            self.inner.dispatcher.clone(),
            self.inner.sources.clone(),
        ));
        slot.state.lock().joined = Some(Joined {
            handle: subscription.handle,
            ingest,
        });
        info!("Joined room '{}'.", room);
        Ok(())
    }

    /// Drops one subscriber from `room`, leaving it once none remain.
    ///
    /// Leaving does not wait for the transport.
    pub fn unsubscribe(&self, room: &RoomId) {
        let released = {
            let mut rooms = self.inner.rooms.lock();
            let Some(slot) = rooms.get(room).cloned() else {
                warn!("Unsubscribe from '{}' without a subscription.", room);
                return;
            };
            let mut state = slot.state.lock();
            if state.subscribers == 0 {
                warn!("Unsubscribe from '{}' without a subscription.", room);
                return;
            }
            state.subscribers -= 1;
            if !state.is_unused() {
                return;
            }
            let joined = state.joined.take();
            drop(state);
            rooms.remove(room);
            joined
        };
        if let Some(joined) = released {
            self.release(joined);
        }
    }

    /// The outbound pipe of `room`, if it is currently joined.
    pub fn outbound(&self, room: &RoomId) -> Option<RoomOutbound> {
        let slot = self.inner.rooms.lock().get(room).cloned()?;
        let state = slot.state.lock();
        state.joined.as_ref().map(|joined| RoomOutbound {
            transport: self.inner.transport.clone(),
            handle: joined.handle.clone(),
        })
    }

    /// The subscriber count of `room`; zero when not joined.
    pub fn subscribers(&self, room: &RoomId) -> usize {
        self.inner
            .rooms
            .lock()
            .get(room)
            .map_or(0, |slot| slot.state.lock().subscribers)
    }

    /// The number of rooms currently joined.
    pub fn len(&self) -> usize {
        self.inner
            .rooms
            .lock()
            .values()
            .filter(|slot| slot.state.lock().joined.is_some())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Leaves every room regardless of subscriber counts.
    pub fn leave_all(&self) {
        let slots: Vec<_> = self.inner.rooms.lock().drain().collect();
        for (_, slot) in slots {
            if let Some(joined) = slot.state.lock().joined.take() {
                self.release(joined);
            }
        }
    }

    fn release(&self, joined: Joined) {
        joined.ingest.abort();
        let room = joined.handle.room.clone();
        let transport = self.inner.transport.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move {
                    transport.leave(joined.handle).await;
                });
                info!("Left room '{}'.", room);
            }
            Err(_) => warn!("Cannot leave room '{}' outside a runtime.", room),
        }
    }
}

/// A subscriber waiting on a join. Dropped without [`Reservation::attach`],
/// it gives the slot back and leaves the room if nobody else holds it.
struct Reservation<'a> {
    registry: &'a RoomRegistry,
    room: &'a RoomId,
    slot: Arc<RoomSlot>,
    attached: bool,
}

impl Reservation<'_> {
    fn attach(mut self) {
        self.slot.state.lock().subscribers += 1;
        self.attached = true;
    }
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        let released = {
            let mut rooms = self.registry.inner.rooms.lock();
            let mut state = self.slot.state.lock();
            state.pending -= 1;
            if self.attached || !state.is_unused() {
                return;
            }
            let joined = state.joined.take();
            drop(state);
            if rooms
                .get(self.room)
                .is_some_and(|slot| Arc::ptr_eq(slot, &self.slot))
            {
                rooms.remove(self.room);
            }
            joined
        };
        if let Some(joined) = released {
            self.registry.release(joined);
        }
    }
}

/// Converts one room's traffic to events and submits them for classification.
async fn ingest(
    room: RoomId,
    mut incoming: BoxStream<'static, Stanza>,
    adapter: Arc<dyn StanzaAdapter>,
    dispatcher: Dispatcher,
    sources: Arc<SourceCounter>,
) {
    while let Some(stanza) = incoming.next().await {
        if !sources.is_active(&room) {
            continue;
        }
        let Some(event) = adapter.to_event(&stanza) else {
            continue;
        };

        let message = WireMessage::Event {
            source: room.clone(),
            event,
        };
        if let Err(e) = dispatcher.submit(&message).await {
            error!("Cannot hand events from '{}' to workers: {}", room, e);
            return;
        }
    }
}
