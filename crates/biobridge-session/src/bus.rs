//! Event fan-out to subscribers.
//!
//! Every subscriber owns a bounded queue. [`EventBus::publish`] never waits:
//! a full queue drops the event for that subscriber only and counts the
//! drop, a closed queue removes the subscriber. Publishing is a plain
//! synchronous call so the capture worker's blocking thread can use it
//! directly.
//!
//! ```
//! use biobridge_session::{DomainEvent, EventBus};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let bus = EventBus::new(16);
//! let mut subscription = bus.subscribe();
//!
//! bus.publish(DomainEvent::capture_error("stream closed"));
//! let event = subscription.recv().await.unwrap();
//! assert_eq!(event.event_type(), "capture_error");
//! # }
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use serde::Serialize;
use tokio::sync::mpsc::{self, error::TryRecvError, error::TrySendError};
use tracing::{debug, trace, warn};
use uuid::Uuid;

use crate::events::DomainEvent;

/// Identifier of one subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct SubscriberId(Uuid);

impl SubscriberId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

struct SubscriberSlot {
    tx: mpsc::Sender<DomainEvent>,
    dropped: Arc<AtomicU64>,
}

struct BusInner {
    subscribers: RwLock<HashMap<SubscriberId, SubscriberSlot>>,
    capacity: usize,
    published: AtomicU64,
    dropped: AtomicU64,
}

/// Registry of subscriber queues.
///
/// Cloning yields another handle to the same registry.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

/// Receiving end of one subscriber queue.
///
/// Dropping the subscription closes the queue; the bus removes it on the
/// next publish.
pub struct Subscription {
    id: SubscriberId,
    rx: mpsc::Receiver<DomainEvent>,
    dropped: Arc<AtomicU64>,
}

/// Counters reported in the session status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BusStats {
    pub subscribers: usize,
    pub published: u64,
    pub dropped: u64,
}

impl EventBus {
    /// Create a bus whose subscribers buffer up to `capacity` events.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(BusInner {
                subscribers: RwLock::new(HashMap::new()),
                capacity: capacity.max(1),
                published: AtomicU64::new(0),
                dropped: AtomicU64::new(0),
            }),
        }
    }

    pub fn subscribe(&self) -> Subscription {
        let (tx, rx) = mpsc::channel(self.inner.capacity);
        let id = SubscriberId::new();
        let dropped = Arc::new(AtomicU64::new(0));

        let mut subscribers = self
            .inner
            .subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        subscribers.insert(
            id,
            SubscriberSlot {
                tx,
                dropped: Arc::clone(&dropped),
            },
        );
        debug!(subscriber = %id, total = subscribers.len(), "Subscriber registered");

        Subscription { id, rx, dropped }
    }

    /// Remove a subscriber. Returns `false` if it was already gone.
    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        let removed = self
            .inner
            .subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id)
            .is_some();

        if removed {
            debug!(subscriber = %id, "Subscriber removed");
        }
        removed
    }

    /// Deliver `event` to every live subscriber without waiting.
    pub fn publish(&self, event: DomainEvent) {
        self.inner.published.fetch_add(1, Ordering::Relaxed);
        let mut closed = Vec::new();

        {
            let subscribers = self
                .inner
                .subscribers
                .read()
                .unwrap_or_else(PoisonError::into_inner);

            if subscribers.is_empty() {
                debug!(event = event.event_type(), "No subscribers, event discarded");
                return;
            }

            for (id, slot) in subscribers.iter() {
                match slot.tx.try_send(event.clone()) {
                    Ok(()) => {}
                    Err(TrySendError::Full(_)) => {
                        let dropped = slot.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                        self.inner.dropped.fetch_add(1, Ordering::Relaxed);
                        warn!(
                            subscriber = %id,
                            event = event.event_type(),
                            dropped,
                            "Subscriber queue full, event dropped"
                        );
                    }
                    Err(TrySendError::Closed(_)) => closed.push(*id),
                }
            }
        }

        if !closed.is_empty() {
            let mut subscribers = self
                .inner
                .subscribers
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            for id in closed {
                subscribers.remove(&id);
                debug!(subscriber = %id, "Subscriber channel closed, removed");
            }
        }

        trace!(event = event.event_type(), "Event published");
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner
            .subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Events dropped across all subscribers because a queue was full.
    pub fn dropped_events(&self) -> u64 {
        self.inner.dropped.load(Ordering::Relaxed)
    }

    pub fn stats(&self) -> BusStats {
        BusStats {
            subscribers: self.subscriber_count(),
            published: self.inner.published.load(Ordering::Relaxed),
            dropped: self.dropped_events(),
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(biobridge_core::constants::DEFAULT_SUBSCRIBER_CAPACITY)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("stats", &self.stats())
            .finish()
    }
}

impl Subscription {
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Wait for the next event. Returns `None` once the bus dropped this
    /// subscriber.
    pub async fn recv(&mut self) -> Option<DomainEvent> {
        self.rx.recv().await
    }

    /// Take the next queued event without waiting.
    pub fn try_recv(&mut self) -> Option<DomainEvent> {
        match self.rx.try_recv() {
            Ok(event) => Some(event),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }

    /// Events this subscriber missed because its queue was full.
    pub fn dropped_events(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("dropped", &self.dropped_events())
            .finish()
    }
}
