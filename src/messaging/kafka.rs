use std::fmt::Display;
use std::marker::PhantomData;
use std::time::Duration;

use actix::Recipient;
use async_trait::async_trait;
use rdkafka::{
    config::ClientConfig,
    consumer::{Consumer, StreamConsumer},
    producer::{FutureProducer, FutureRecord},
    Message,
};
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::{ChannelError, EventChannel};
use crate::backend::ProcessEvent;
use crate::events::{decode_event, Event};
use crate::utils::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError, CircuitBreakerRegistry};

const SEND_TIMEOUT: Duration = Duration::from_secs(5);
const RECEIVE_BACKOFF: Duration = Duration::from_millis(500);

/// Kafka-backed channel: one topic per domain, record key = event key so the
/// broker keeps events for one organization in order.
pub struct KafkaEventChannel<K, T> {
    topic: String,
    producer: FutureProducer,
    circuit_breaker: CircuitBreaker,
    _marker: PhantomData<fn() -> (K, T)>,
}

impl<K, T> KafkaEventChannel<K, T> {
    /// The producer's breaker is registered in `breakers` as `kafka-<topic>`.
    pub fn new(
        brokers: &str,
        topic: &str,
        breakers: &CircuitBreakerRegistry,
    ) -> Result<Self, ChannelError> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("message.timeout.ms", "5000")
            .create()
            .map_err(|e| ChannelError::Publish {
                channel: topic.to_string(),
                reason: format!("failed to create producer: {}", e),
            })?;

        // Protects the request path from a broker that stopped answering
        let cb_config = CircuitBreakerConfig {
            failure_threshold: 5,
            rolling_window: Duration::from_secs(60),
            open_duration: Duration::from_secs(30),
            success_threshold: 3,
        };

        Ok(Self {
            topic: topic.to_string(),
            producer,
            circuit_breaker: breakers.get_or_create(&format!("kafka-{}", topic), cb_config),
            _marker: PhantomData,
        })
    }
}

#[async_trait]
impl<K, T> EventChannel<K, T> for KafkaEventChannel<K, T>
where
    K: Serialize + Display + Send + Sync + 'static,
    T: Serialize + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        &self.topic
    }

    async fn publish(&self, event: Event<K, T>) -> Result<(), ChannelError> {
        let key = event.key().to_string();
        let payload = serde_json::to_string(&event)?;

        let result = self
            .circuit_breaker
            .call(async {
                let record = FutureRecord::to(&self.topic).key(&key).payload(&payload);

                self.producer
                    .send(record, SEND_TIMEOUT)
                    .await
                    .map_err(|(e, _)| ChannelError::Publish {
                        channel: self.topic.clone(),
                        reason: e.to_string(),
                    })?;

                Ok::<(), ChannelError>(())
            })
            .await;

        match result {
            Ok(()) => {
                tracing::debug!(topic = %self.topic, key = %key, kind = %event.kind(), "Published event to Kafka");
                Ok(())
            }
            Err(CircuitBreakerError::CircuitOpen) => {
                tracing::error!(topic = %self.topic, "Circuit breaker open - Kafka unavailable");
                Err(ChannelError::Publish {
                    channel: self.topic.clone(),
                    reason: "circuit breaker open".to_string(),
                })
            }
            Err(CircuitBreakerError::OperationFailed(e)) => {
                tracing::error!(error = %e, topic = %self.topic, "Failed to publish to Kafka");
                Err(e)
            }
        }
    }
}

/// Subscribe to `topic` and feed every decoded event into `processor`.
/// Undecodable records are logged and skipped; they are never retried.
pub fn spawn_kafka_consumer<K, T>(
    brokers: &str,
    group_id: &str,
    topic: &str,
    processor: Recipient<ProcessEvent<K, T>>,
) -> Result<(), ChannelError>
where
    K: DeserializeOwned + Send + 'static,
    T: DeserializeOwned + Send + 'static,
{
    let consumer: StreamConsumer = ClientConfig::new()
        .set("bootstrap.servers", brokers)
        .set("group.id", group_id)
        .set("enable.auto.commit", "true")
        .set("auto.offset.reset", "earliest")
        .create()
        .map_err(|e| ChannelError::Publish {
            channel: topic.to_string(),
            reason: format!("failed to create consumer: {}", e),
        })?;

    consumer.subscribe(&[topic]).map_err(|e| ChannelError::Publish {
        channel: topic.to_string(),
        reason: format!("failed to subscribe: {}", e),
    })?;

    let topic = topic.to_string();
    actix::spawn(async move {
        tracing::info!(topic = %topic, "Kafka consumer started");

        loop {
            let message = match consumer.recv().await {
                Ok(message) => message.detach(),
                Err(e) => {
                    tracing::warn!(topic = %topic, error = %e, "Kafka receive failed");
                    tokio::time::sleep(RECEIVE_BACKOFF).await;
                    continue;
                }
            };

            let Some(payload) = message.payload() else {
                tracing::warn!(topic = %topic, offset = message.offset(), "Skipping record without payload");
                continue;
            };

            let event: Event<K, T> = match decode_event(payload) {
                Ok(event) => event,
                Err(e) => {
                    tracing::error!(topic = %topic, offset = message.offset(), error = %e, "Dropping undecodable event");
                    continue;
                }
            };

            if let Err(e) = processor.send(ProcessEvent::new(event)).await {
                tracing::error!(topic = %topic, error = %e, "Event processor unreachable, stopping consumer");
                break;
            }
        }
    });

    Ok(())
}
