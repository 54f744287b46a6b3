//! # Event Bus
//!
//! Typed progress events for the mirror, delivered over a
//! `tokio::sync::broadcast` channel.
//!
//! ## Overview
//!
//! The session publishes an event whenever it writes an entity to the local
//! store, gives up on a refresh, or finishes a reconciliation. Hosts subscribe
//! to drive UI state or metrics; nothing in the core depends on a subscriber
//! being present, so [`EventBus::emit`] failing with "no receivers" is normal.
//!
//! ```rust
//! use core_runtime::events::{CoreEvent, EventBus, ReconcileEvent};
//!
//! let bus = EventBus::new(16);
//! let mut rx = bus.subscribe();
//!
//! bus.emit(CoreEvent::Reconcile(ReconcileEvent::FavoritesReconciled {
//!     user_id: "u1".to_string(),
//!     added: 2,
//!     removed: 0,
//!     failed: 0,
//! }))
//! .ok();
//!
//! assert!(matches!(rx.try_recv(), Ok(CoreEvent::Reconcile(_))));
//! ```
//!
//! ## Lagging subscribers
//!
//! A subscriber that falls more than `capacity` events behind receives
//! `RecvError::Lagged(n)` and continues with newer events. `RecvError::Closed`
//! means the bus was dropped.

use core_async::sync::broadcast;
use serde::{Deserialize, Serialize};
use std::fmt;

pub use core_async::sync::broadcast::error::{RecvError, SendError};
pub use core_async::sync::broadcast::Receiver;

/// Default buffer size for the event bus channel.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

/// Top-level event published on the bus.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    /// A single entity changed state in the mirror
    Entity(EntityEvent),
    /// A collection-level pass finished
    Reconcile(ReconcileEvent),
}

impl CoreEvent {
    pub fn description(&self) -> &str {
        match self {
            CoreEvent::Entity(e) => e.description(),
            CoreEvent::Reconcile(e) => e.description(),
        }
    }

    pub fn severity(&self) -> EventSeverity {
        match self {
            CoreEvent::Entity(EntityEvent::RefreshFailed { degraded: false, .. }) => {
                EventSeverity::Error
            }
            CoreEvent::Entity(EntityEvent::RefreshFailed { .. }) => EventSeverity::Warning,
            CoreEvent::Reconcile(e) if e.failed_count() > 0 => EventSeverity::Warning,
            CoreEvent::Reconcile(_) => EventSeverity::Info,
            CoreEvent::Entity(EntityEvent::Cached { .. }) => EventSeverity::Debug,
        }
    }
}

/// Event severity levels for filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    Debug,
    Info,
    Warning,
    Error,
}

/// Per-entity events.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum EntityEvent {
    /// The entity was written to the local store.
    Cached {
        /// Entity kind, e.g. "track"
        kind: String,
        id: String,
        /// True when a local record existed and was merged
        merged: bool,
    },
    /// The remote fetch for the entity failed after retries.
    RefreshFailed {
        kind: String,
        id: String,
        message: String,
        /// True when a stale local record is still being served
        degraded: bool,
    },
}

impl EntityEvent {
    fn description(&self) -> &str {
        match self {
            EntityEvent::Cached { merged: true, .. } => "Entity refreshed",
            EntityEvent::Cached { .. } => "Entity cached",
            EntityEvent::RefreshFailed { .. } => "Entity refresh failed",
        }
    }
}

/// Collection reconciliation events.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum ReconcileEvent {
    FavoritesReconciled {
        user_id: String,
        added: u64,
        removed: u64,
        failed: u64,
    },
    PlaylistsReconciled {
        user_id: String,
        /// Playlists followed after the pass
        playlists: u64,
        added: u64,
        removed: u64,
        failed: u64,
    },
    /// A background sweep over stale or incomplete rows finished.
    SweepCompleted {
        kind: String,
        refreshed: u64,
        failed: u64,
    },
}

impl ReconcileEvent {
    fn description(&self) -> &str {
        match self {
            ReconcileEvent::FavoritesReconciled { .. } => "Favorites reconciled",
            ReconcileEvent::PlaylistsReconciled { .. } => "Playlists reconciled",
            ReconcileEvent::SweepCompleted { .. } => "Stale sweep completed",
        }
    }

    pub fn failed_count(&self) -> u64 {
        match self {
            ReconcileEvent::FavoritesReconciled { failed, .. }
            | ReconcileEvent::PlaylistsReconciled { failed, .. }
            | ReconcileEvent::SweepCompleted { failed, .. } => *failed,
        }
    }
}

/// Broadcast bus for [`CoreEvent`]s. Cloning shares the same channel.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    /// Creates a bus that buffers up to `capacity` events per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns the number of subscribers reached, or an error when there are none.
    pub fn emit(&self, event: CoreEvent) -> Result<usize, SendError<CoreEvent>> {
        self.sender.send(event)
    }

    /// New receiver for all future events. Past events are not replayed.
    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

type EventFilter = Box<dyn Fn(&CoreEvent) -> bool + Send + Sync>;

/// Receiver wrapper that skips events not matching a predicate.
pub struct EventStream {
    receiver: Receiver<CoreEvent>,
    filter: Option<EventFilter>,
}

impl EventStream {
    pub fn new(receiver: Receiver<CoreEvent>) -> Self {
        Self {
            receiver,
            filter: None,
        }
    }

    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&CoreEvent) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
    }

    fn accepts(&self, event: &CoreEvent) -> bool {
        self.filter.as_ref().map_or(true, |filter| filter(event))
    }

    /// Next event that passes the filter.
    pub async fn recv(&mut self) -> Result<CoreEvent, RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if self.accepts(&event) {
                return Ok(event);
            }
        }
    }

    /// Next buffered event that passes the filter, without waiting.
    pub fn try_recv(&mut self) -> Option<Result<CoreEvent, RecvError>> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) if self.accepts(&event) => return Some(Ok(event)),
                Ok(_) => continue,
                Err(broadcast::error::TryRecvError::Empty) => return None,
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    return Some(Err(RecvError::Lagged(n)))
                }
                Err(broadcast::error::TryRecvError::Closed) => {
                    return Some(Err(RecvError::Closed))
                }
            }
        }
    }
}
