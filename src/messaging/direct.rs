use actix::Recipient;
use async_trait::async_trait;

use super::{ChannelError, EventChannel};
use crate::backend::ProcessEvent;
use crate::events::Event;

/// Synchronous hand-off: `publish` resolves only after the backend processor
/// applied (or refused) the event. A refusal comes back as
/// `ChannelError::Rejected` carrying the backend's error.
pub struct DirectChannel<K, T>
where
    K: Send + 'static,
    T: Send + 'static,
{
    name: String,
    processor: Recipient<ProcessEvent<K, T>>,
}

impl<K, T> DirectChannel<K, T>
where
    K: Send + 'static,
    T: Send + 'static,
{
    pub fn new(name: impl Into<String>, processor: Recipient<ProcessEvent<K, T>>) -> Self {
        Self {
            name: name.into(),
            processor,
        }
    }
}

#[async_trait]
impl<K, T> EventChannel<K, T> for DirectChannel<K, T>
where
    K: Send + Sync + 'static,
    T: Send + Sync + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn publish(&self, event: Event<K, T>) -> Result<(), ChannelError> {
        self.processor
            .send(ProcessEvent::new(event))
            .await
            .map_err(|e| ChannelError::Closed(format!("{} ({})", self.name, e)))?
            .map_err(ChannelError::Rejected)
    }
}
