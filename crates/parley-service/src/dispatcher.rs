use std::sync::Arc;

use tokio::sync::broadcast;

use parley_types::events::MessagingEvent;

const EVENT_CAPACITY: usize = 1024;

/// Fans committed messaging events out to every subscriber.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<EventBusInner>,
}

struct EventBusInner {
    broadcast_tx: broadcast::Sender<MessagingEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (broadcast_tx, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(EventBusInner { broadcast_tx }),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MessagingEvent> {
        self.inner.broadcast_tx.subscribe()
    }

    /// Publish an event. Having no subscribers is not an error.
    pub fn publish(&self, event: MessagingEvent) {
        let _ = self.inner.broadcast_tx.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.broadcast_tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
