use tokio::sync::broadcast;

use tidings_types::NotificationEnvelope;
use tidings_types::events::FeedEvent;

/// Broadcasts every sealed envelope to live feed subscribers.
#[derive(Clone)]
pub struct EnvelopeFeed {
    tx: broadcast::Sender<FeedEvent>,
}

impl EnvelopeFeed {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<FeedEvent> {
        self.tx.subscribe()
    }

    /// Publish to all current subscribers. Nobody listening is not an error.
    pub fn publish(&self, envelope: &NotificationEnvelope) {
        let _ = self.tx.send(FeedEvent::Envelope(envelope.clone()));
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EnvelopeFeed {
    fn default() -> Self {
        Self::new(1024)
    }
}
