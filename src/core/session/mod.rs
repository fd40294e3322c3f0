// src/core/session/mod.rs

//! Routing sessions: the client-facing way to route one source room into one
//! destination room under one rule.
//!
//! A session holds one reference on each of: the source room subscription,
//! the destination room subscription, the source's "active" counter, and the
//! (rule, destination) entry in every worker's classifier for the source.
//! Closing (or dropping) the session gives back exactly what it holds.

use crate::core::RoomGraphError;
use crate::core::dispatch::Dispatcher;
use crate::core::protocol::WireMessage;
use crate::core::room::RoomId;
use crate::core::rules::Rule;
use crate::core::transport::RoomTransport;
use dashmap::DashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub mod rooms;

pub use rooms::{RoomOutbound, RoomRegistry};

/// Counts the sessions that use each room as their source.
///
/// Room ingestion consults it to skip the classification round-trip for rooms
/// that are only joined as destinations.
#[derive(Debug, Default)]
pub struct SourceCounter {
    counts: DashMap<RoomId, usize>,
}

impl SourceCounter {
    pub fn increment(&self, room: &RoomId) {
        *self.counts.entry(room.clone()).or_insert(0) += 1;
    }

    pub fn decrement(&self, room: &RoomId) {
        self.counts.remove_if_mut(room, |_, count| {
            *count = count.saturating_sub(1);
            *count == 0
        });
    }

    pub fn is_active(&self, room: &RoomId) -> bool {
        self.counts.contains_key(room)
    }

    pub fn count(&self, room: &RoomId) -> usize {
        self.counts.get(room).map_or(0, |count| *count)
    }
}

struct SessionInner {
    transport: Arc<dyn RoomTransport>,
    rooms: RoomRegistry,
    dispatcher: Dispatcher,
    sources: Arc<SourceCounter>,
    next_id: AtomicU64,
    active: AtomicUsize,
}

/// Opens and closes routing sessions. Cheap to clone.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<SessionInner>,
}

impl SessionManager {
    pub fn new(
        transport: Arc<dyn RoomTransport>,
        rooms: RoomRegistry,
        dispatcher: Dispatcher,
        sources: Arc<SourceCounter>,
    ) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                transport,
                rooms,
                dispatcher,
                sources,
                next_id: AtomicU64::new(1),
                active: AtomicUsize::new(0),
            }),
        }
    }

    /// Starts routing events from `source` to `destination` that match `rule`
    /// (every event when `rule` is `None`).
    ///
    /// Returns `Stopped` if `cancel` fires before the rooms are joined; nothing
    /// acquired up to that point is kept. The rule is registered on every
    /// worker before this returns.
    pub async fn open_session(
        &self,
        source: &str,
        destination: &str,
        rule: Option<Rule>,
        cancel: &CancellationToken,
    ) -> Result<SessionHandle, RoomGraphError> {
        let source = self.inner.transport.resolve(source).await?;
        let destination = self.inner.transport.resolve(destination).await?;
        let mut lease = SessionLease {
            inner: self.inner.clone(),
            id: self.inner.next_id.fetch_add(1, Ordering::Relaxed),
            source,
            destination,
            rule: Rule::or_anything(rule),
            held: Held::default(),
        };

        let joined = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(RoomGraphError::Stopped),
            result = lease.join_rooms() => result,
        };
        if let Err(e) = joined {
            lease.release().await;
            return Err(e);
        }

        // Not cancellable: every worker must see the registration or none may
        // be asked to undo it.
        if let Err(e) = lease.register_rule().await {
            lease.release().await;
            return Err(e);
        }

        self.inner.active.fetch_add(1, Ordering::Relaxed);
        lease.held.counted = true;
        info!(
            "Session {} opened: '{}' -> '{}' ({:?}).",
            lease.id, lease.source, lease.destination, lease.rule
        );
        Ok(SessionHandle { lease: Some(lease) })
    }

    /// Ends a session, giving back everything it holds.
    pub async fn close_session(&self, handle: SessionHandle) {
        handle.close().await;
    }

    /// The number of sessions currently open.
    pub fn active_sessions(&self) -> usize {
        self.inner.active.load(Ordering::Relaxed)
    }
}

/// What a session currently holds. Each flag is set only once the
/// corresponding acquisition has fully completed.
#[derive(Debug, Default)]
struct Held {
    source_room: bool,
    destination_room: bool,
    rule: bool,
    source_active: bool,
    counted: bool,
}

struct SessionLease {
    inner: Arc<SessionInner>,
    id: u64,
    source: RoomId,
    destination: RoomId,
    rule: Rule,
    held: Held,
}

impl SessionLease {
    async fn join_rooms(&mut self) -> Result<(), RoomGraphError> {
        self.inner.rooms.subscribe(&self.source).await?;
        self.held.source_room = true;
        self.inner.rooms.subscribe(&self.destination).await?;
        self.held.destination_room = true;
        Ok(())
    }

    async fn register_rule(&mut self) -> Result<(), RoomGraphError> {
        let message = WireMessage::RegisterRule {
            source: self.source.clone(),
            rule: self.rule.clone(),
            destination: self.destination.clone(),
        };
        self.inner.dispatcher.broadcast(&message).await?;
        self.held.rule = true;
        self.inner.sources.increment(&self.source);
        self.held.source_active = true;
        Ok(())
    }

    /// Gives back everything held. The deregistration broadcast is best-effort;
    /// the local counters are always decremented.
    async fn release(mut self) {
        if self.held.source_active {
            self.inner.sources.decrement(&self.source);
            self.held.source_active = false;
        }
        if self.held.rule {
            let message = self.unregister_message();
            if let Err(e) = self.inner.dispatcher.broadcast(&message).await {
                warn!(
                    "Session {}: failed to unregister its rule from workers: {}",
                    self.id, e
                );
            }
            self.held.rule = false;
        }
        self.release_rooms();
    }

    fn unregister_message(&self) -> WireMessage {
        WireMessage::UnregisterRule {
            source: self.source.clone(),
            rule: self.rule.clone(),
            destination: self.destination.clone(),
        }
    }

    fn release_rooms(&mut self) {
        if std::mem::take(&mut self.held.destination_room) {
            self.inner.rooms.unsubscribe(&self.destination);
        }
        if std::mem::take(&mut self.held.source_room) {
            self.inner.rooms.unsubscribe(&self.source);
        }
        if std::mem::take(&mut self.held.counted) {
            self.inner.active.fetch_sub(1, Ordering::Relaxed);
            info!("Session {} closed.", self.id);
        }
    }
}

/// A lease dropped before `release` ran (its `open_session` future was
/// dropped mid-way, or its handle was dropped outside a runtime) gives back
/// the local counters at once and unregisters its rule in the background.
impl Drop for SessionLease {
    fn drop(&mut self) {
        if std::mem::take(&mut self.held.source_active) {
            self.inner.sources.decrement(&self.source);
        }
        if std::mem::take(&mut self.held.rule) {
            let message = self.unregister_message();
            let dispatcher = self.inner.dispatcher.clone();
            let id = self.id;
            match tokio::runtime::Handle::try_current() {
                Ok(runtime) => {
                    runtime.spawn(async move {
                        if let Err(e) = dispatcher.broadcast(&message).await {
                            warn!("Session {}: failed to unregister its rule from workers: {}", id, e);
                        }
                    });
                }
                Err(_) => warn!(
                    "Session {} dropped outside a runtime; its rule stays registered on workers.",
                    id
                ),
            }
        }
        self.release_rooms();
    }
}

/// A live session. Close it with [`SessionHandle::close`]; a handle dropped
/// without closing is closed in the background.
pub struct SessionHandle {
    lease: Option<SessionLease>,
}

impl SessionHandle {
    pub fn id(&self) -> u64 {
        self.lease.as_ref().map_or(0, |lease| lease.id)
    }

    pub fn source(&self) -> Option<&RoomId> {
        self.lease.as_ref().map(|lease| &lease.source)
    }

    pub fn destination(&self) -> Option<&RoomId> {
        self.lease.as_ref().map(|lease| &lease.destination)
    }

    pub fn rule(&self) -> Option<&Rule> {
        self.lease.as_ref().map(|lease| &lease.rule)
    }

    pub async fn close(mut self) {
        if let Some(lease) = self.lease.take() {
            lease.release().await;
        }
    }
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("id", &self.id())
            .field("source", &self.source())
            .field("destination", &self.destination())
            .field("rule", &self.rule())
            .finish()
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        let Some(lease) = self.lease.take() else {
            return;
        };
        // Outside a runtime the lease's own drop gives back what it can.
        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            runtime.spawn(lease.release());
        }
    }
}
