use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::mpsc::{self, error::TrySendError};

use crate::models::StatusEvent;

pub const DEFAULT_EVENT_QUEUE_CAPACITY: usize = 64;
pub const DEFAULT_SUBSCRIBER_CAPACITY: usize = 32;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct SubscriberId(pub u64);

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct BroadcastConfig {
    pub queue_capacity: usize,
    pub subscriber_capacity: usize,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_EVENT_QUEUE_CAPACITY,
            subscriber_capacity: DEFAULT_SUBSCRIBER_CAPACITY,
        }
    }
}

/// One connected client's view of the event stream.
pub struct Subscriber {
    id: SubscriberId,
    receiver: mpsc::Receiver<StatusEvent>,
}

impl Subscriber {
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Next event, or `None` once the subscriber has been dropped from the
    /// active set or the broadcaster has shut down.
    pub async fn recv(&mut self) -> Option<StatusEvent> {
        self.receiver.recv().await
    }

    pub fn try_recv(&mut self) -> Option<StatusEvent> {
        self.receiver.try_recv().ok()
    }
}

struct QueuedEvent {
    sequence: u64,
    event: StatusEvent,
}

struct SubscriberSlot {
    joined_at: u64,
    sender: mpsc::Sender<StatusEvent>,
}

#[derive(Default)]
struct Registry {
    next_sequence: u64,
    next_subscriber: u64,
    subscribers: BTreeMap<SubscriberId, SubscriberSlot>,
}

/// Best-effort fan-out of status events.
///
/// `publish` never waits: events are dropped when the queue is full or when
/// nobody is listening. A single dispatcher task delivers queued events in
/// order; a subscriber whose channel is full or closed is removed.
pub struct EventBroadcaster {
    queue: mpsc::Sender<QueuedEvent>,
    registry: Arc<Mutex<Registry>>,
    subscriber_capacity: usize,
}

impl EventBroadcaster {
    /// Must be called from within a tokio runtime; the dispatcher runs until
    /// the broadcaster is dropped.
    pub fn spawn(config: BroadcastConfig) -> Self {
        let (queue, receiver) = mpsc::channel(config.queue_capacity.max(1));
        let registry = Arc::new(Mutex::new(Registry::default()));

        tokio::spawn(dispatch(receiver, registry.clone()));

        Self {
            queue,
            registry,
            subscriber_capacity: config.subscriber_capacity.max(1),
        }
    }

    /// Returns whether the event was queued for delivery.
    pub fn publish(&self, event: StatusEvent) -> bool {
        let mut registry = lock_registry(&self.registry);

        if registry.subscribers.is_empty() {
            return false;
        }

        let sequence = registry.next_sequence;
        match self.queue.try_send(QueuedEvent { sequence, event }) {
            Ok(()) => {
                registry.next_sequence += 1;
                true
            }
            Err(TrySendError::Full(dropped)) => {
                tracing::debug!(
                    package = %dropped.event.name,
                    status = ?dropped.event.status,
                    "event queue full, dropping event"
                );
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }

    pub fn subscribe(&self) -> Subscriber {
        let (sender, receiver) = mpsc::channel(self.subscriber_capacity);
        let mut registry = lock_registry(&self.registry);

        let id = SubscriberId(registry.next_subscriber);
        registry.next_subscriber += 1;
        let joined_at = registry.next_sequence;
        registry
            .subscribers
            .insert(id, SubscriberSlot { joined_at, sender });

        tracing::debug!(subscriber = id.0, "subscriber connected");
        Subscriber { id, receiver }
    }

    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        let removed = lock_registry(&self.registry)
            .subscribers
            .remove(&id)
            .is_some();
        if removed {
            tracing::debug!(subscriber = id.0, "subscriber disconnected");
        }
        removed
    }

    pub fn subscriber_count(&self) -> usize {
        lock_registry(&self.registry).subscribers.len()
    }
}

/// Every registry update is a single insert, remove or retain, so the map is
/// coherent even if a holder panicked.
fn lock_registry(registry: &Mutex<Registry>) -> MutexGuard<'_, Registry> {
    registry.lock().unwrap_or_else(|poisoned| {
        tracing::warn!("subscriber registry lock was poisoned, recovering");
        registry.clear_poison();
        poisoned.into_inner()
    })
}

async fn dispatch(mut receiver: mpsc::Receiver<QueuedEvent>, registry: Arc<Mutex<Registry>>) {
    while let Some(queued) = receiver.recv().await {
        let mut state = lock_registry(&registry);

        state.subscribers.retain(|id, slot| {
            if queued.sequence < slot.joined_at {
                return true;
            }

            match slot.sender.try_send(queued.event.clone()) {
                Ok(()) => true,
                Err(TrySendError::Full(_)) => {
                    tracing::warn!(subscriber = id.0, "subscriber is not keeping up, dropping it");
                    false
                }
                Err(TrySendError::Closed(_)) => {
                    tracing::debug!(subscriber = id.0, "subscriber channel closed");
                    false
                }
            }
        });
    }
}
