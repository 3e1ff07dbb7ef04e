use actix::Recipient;
use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::{ChannelError, EventChannel};
use crate::backend::ProcessEvent;
use crate::events::Event;

/// Queued in-process channel. `publish` returns once the event is enqueued;
/// whether the backend later accepts it is invisible to the publisher.
/// FIFO, so events for one key are consumed in publish order.
pub struct InMemoryChannel<K, T> {
    name: String,
    sender: mpsc::UnboundedSender<Event<K, T>>,
}

impl<K, T> InMemoryChannel<K, T> {
    pub fn new(name: impl Into<String>) -> (Self, mpsc::UnboundedReceiver<Event<K, T>>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let channel = Self {
            name: name.into(),
            sender,
        };
        (channel, receiver)
    }
}

#[async_trait]
impl<K, T> EventChannel<K, T> for InMemoryChannel<K, T>
where
    K: Send + Sync + 'static,
    T: Send + Sync + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn publish(&self, event: Event<K, T>) -> Result<(), ChannelError> {
        self.sender
            .send(event)
            .map_err(|_| ChannelError::Closed(self.name.clone()))
    }
}

/// Drain a queue into a backend event processor until either side closes.
pub fn spawn_forwarder<K, T>(
    channel: String,
    mut receiver: mpsc::UnboundedReceiver<Event<K, T>>,
    processor: Recipient<ProcessEvent<K, T>>,
) -> JoinHandle<()>
where
    K: Send + 'static,
    T: Send + 'static,
{
    tokio::spawn(async move {
        tracing::info!(channel = %channel, "Event forwarder started");

        while let Some(event) = receiver.recv().await {
            let kind = event.kind();
            match processor.send(ProcessEvent::new(event)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    // Processor already logged and counted it
                    tracing::debug!(channel = %channel, kind = %kind, error = %e, "Event rejected by consumer");
                }
                Err(e) => {
                    tracing::error!(channel = %channel, error = %e, "Event processor unreachable, stopping forwarder");
                    break;
                }
            }
        }

        tracing::info!(channel = %channel, "Event forwarder stopped");
    })
}
