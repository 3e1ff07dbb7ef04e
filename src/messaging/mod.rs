// ============================================================================
// Messaging Module
// ============================================================================
//
// Outbound channels the composite service writes events to. The backend
// clients only see `EventChannel`; which transport sits behind it is decided
// at wiring time:
// - InMemoryChannel: queued, fire-and-forget, drained by a forwarder task
// - DirectChannel:   synchronous hand-off, consumer rejections come back
// - KafkaEventChannel: one topic per domain, keyed by the event key
//
// ============================================================================

mod direct;
mod in_memory;
mod kafka;

use async_trait::async_trait;

use crate::error::ServiceError;
use crate::events::Event;
use crate::utils::IsTransient;

pub use direct::DirectChannel;
pub use in_memory::{spawn_forwarder, InMemoryChannel};
pub use kafka::{spawn_kafka_consumer, KafkaEventChannel};

#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("channel {0} is closed")]
    Closed(String),

    #[error("publish to {channel} failed: {reason}")]
    Publish { channel: String, reason: String },

    #[error("failed to serialize event: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The consumer received the event and refused it.
    #[error(transparent)]
    Rejected(ServiceError),
}

impl IsTransient for ChannelError {
    fn is_transient(&self) -> bool {
        matches!(self, ChannelError::Publish { .. })
    }
}

impl From<ChannelError> for ServiceError {
    fn from(error: ChannelError) -> Self {
        match error {
            ChannelError::Rejected(inner) => inner,
            other => ServiceError::BackendUnavailable(other.to_string()),
        }
    }
}

/// Destination for the events of one backend domain.
#[async_trait]
pub trait EventChannel<K, T>: Send + Sync
where
    K: Send + 'static,
    T: Send + 'static,
{
    fn name(&self) -> &str;

    async fn publish(&self, event: Event<K, T>) -> Result<(), ChannelError>;
}
