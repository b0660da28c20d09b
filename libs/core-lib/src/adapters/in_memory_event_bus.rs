use crate::{CoreError, EventPublisher};
use async_trait::async_trait;
use dashmap::DashMap;
use std::fmt::Debug;
use std::sync::Arc;
use tokio::sync::broadcast::{self, Sender};
use tracing::debug;

/// A message published on the in-memory bus.
#[derive(Clone, Debug)]
pub struct InMemoryMessage {
    pub topic: String,
    pub event_type: String,
    pub payload: Vec<u8>,
}

/// In-memory implementation of the EventPublisher port using Tokio broadcast channels.
/// Suitable for tests and single-instance mode.
///
/// A receiver that falls more than `channel_capacity` messages behind loses the
/// oldest ones. Unlike RabbitMQ nothing is persisted.
#[derive(Debug, Clone)]
pub struct InMemoryEventBus {
    // Topic name -> broadcast sender; receivers are created on subscribe.
    channels: Arc<DashMap<String, Sender<InMemoryMessage>>>,
    channel_capacity: usize,
}

impl InMemoryEventBus {
    pub fn new(channel_capacity: usize) -> Self {
        Self {
            channels: Arc::new(DashMap::new()),
            channel_capacity,
        }
    }

    fn get_or_create_sender(&self, topic: &str) -> Sender<InMemoryMessage> {
        self.channels
            .entry(topic.to_string())
            .or_insert_with(|| {
                let (sender, _) = broadcast::channel(self.channel_capacity);
                sender
            })
            .value()
            .clone()
    }

    /// Receives every message published to `topic` from now on.
    pub fn subscribe(&self, topic: &str) -> broadcast::Receiver<InMemoryMessage> {
        self.get_or_create_sender(topic).subscribe()
    }
}

impl Default for InMemoryEventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl EventPublisher for InMemoryEventBus {
    async fn publish(
        &self,
        topic: &str,
        event_type: &str,
        event_payload: &[u8],
    ) -> Result<(), CoreError> {
        let sender = self.get_or_create_sender(topic);
        let message = InMemoryMessage {
            topic: topic.to_string(),
            event_type: event_type.to_string(),
            payload: event_payload.to_vec(),
        };

        // send only fails when nobody is subscribed, which is not an error for a bus.
        if sender.send(message).is_err() {
            debug!(topic, event_type, "published with no active subscribers");
        }
        Ok(())
    }
}
