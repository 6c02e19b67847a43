use tokio::sync::broadcast;
use tracing::debug;

use crate::dto::sse::ServerEvent;

/// Prompts waiting for the chat-transport adapter, fanned out to every outbox subscriber.
///
/// Nothing is retained: a prompt published while no adapter is connected is dropped.
pub struct Outbox {
    sender: broadcast::Sender<ServerEvent>,
}

impl Outbox {
    /// Hub buffering up to `capacity` events per lagging subscriber.
    pub fn new(capacity: usize) -> Self {
        let (sender, _receiver) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Receiver for events published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.sender.subscribe()
    }

    /// Number of adapters currently connected.
    pub fn subscribers(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Publish to the connected adapters; returns how many received the event.
    pub fn publish(&self, event: ServerEvent) -> usize {
        match self.sender.send(event) {
            Ok(delivered) => delivered,
            Err(broadcast::error::SendError(event)) => {
                debug!(event = ?event.event, "outbox event dropped; no subscriber");
                0
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn events_reach_every_subscriber() {
        let outbox = Outbox::new(4);
        let mut first = outbox.subscribe();
        let mut second = outbox.subscribe();

        let delivered = outbox.publish(ServerEvent::new(Some("prompt".into()), "{}".into()));

        assert_eq!(delivered, 2);
        assert_eq!(first.recv().await.unwrap().data, "{}");
        assert_eq!(second.recv().await.unwrap().event.as_deref(), Some("prompt"));
    }

    #[test]
    fn publishing_without_subscribers_drops_the_event() {
        let outbox = Outbox::new(4);
        assert_eq!(outbox.subscribers(), 0);
        assert_eq!(outbox.publish(ServerEvent::new(None, "{}".into())), 0);
    }
}
