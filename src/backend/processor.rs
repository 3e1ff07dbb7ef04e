use actix::prelude::*;
use std::fmt::Display;
use std::sync::Arc;

use super::service::{MemberService, OrganizationService};
use crate::error::ServiceError;
use crate::events::{Event, EventKind};
use crate::metrics::Metrics;
use crate::models::{Member, Organization};

// ============================================================================
// Event Processor Actor
// ============================================================================
//
// Applies create/delete envelopes to one backend domain. Whatever transport
// delivered the event (in-memory forwarder, direct channel, Kafka consumer)
// ends up sending `ProcessEvent` here; the mailbox handles one message at a
// time so events for a key are applied in the order they arrived.
//
// ============================================================================

/// Anything an envelope can be applied to.
pub trait EventSink<K, T>: Send + Sync + 'static {
    fn domain(&self) -> &'static str;

    /// Reject duplicates with `InvalidPayload`.
    fn apply_create(&self, key: K, payload: T) -> Result<(), ServiceError>;

    /// Remove everything under `key`; absent keys are not an error.
    fn apply_delete(&self, key: K) -> Result<(), ServiceError>;
}

pub struct EventProcessor<S> {
    sink: Arc<S>,
    metrics: Arc<Metrics>,
}

impl<S> EventProcessor<S> {
    pub fn new(sink: Arc<S>, metrics: Arc<Metrics>) -> Self {
        Self { sink, metrics }
    }
}

impl<S: Send + Sync + 'static> Actor for EventProcessor<S> {
    type Context = Context<Self>;

    fn started(&mut self, _ctx: &mut Self::Context) {
        tracing::info!("EventProcessor started");
    }
}

// ============================================================================
// Messages
// ============================================================================

pub struct ProcessEvent<K, T> {
    pub event: Event<K, T>,
}

impl<K, T> ProcessEvent<K, T> {
    pub fn new(event: Event<K, T>) -> Self {
        Self { event }
    }
}

impl<K: 'static, T: 'static> Message for ProcessEvent<K, T> {
    type Result = Result<(), ServiceError>;
}

// ============================================================================
// Handlers
// ============================================================================

impl<S, K, T> Handler<ProcessEvent<K, T>> for EventProcessor<S>
where
    S: EventSink<K, T>,
    K: Display + Send + 'static,
    T: Send + 'static,
{
    type Result = Result<(), ServiceError>;

    fn handle(&mut self, msg: ProcessEvent<K, T>, _: &mut Self::Context) -> Self::Result {
        let domain = self.sink.domain();
        let created_at = msg.event.created_at();
        let (kind, key, payload) = msg.event.into_parts();

        tracing::info!(
            domain,
            kind = %kind,
            key = %key,
            created_at = %created_at,
            "Processing event"
        );

        let result = match (kind, payload) {
            (EventKind::Create, Some(payload)) => self.sink.apply_create(key, payload),
            (EventKind::Create, None) => Err(ServiceError::EventProcessing(format!(
                "Invalid event! CREATE for key {} carries no payload",
                key
            ))),
            (EventKind::Delete, None) => self.sink.apply_delete(key),
            (EventKind::Delete, Some(_)) => Err(ServiceError::EventProcessing(format!(
                "Invalid event! DELETE for key {} carries a payload",
                key
            ))),
        };

        match &result {
            Ok(()) => {
                self.metrics.record_event_processed(domain, kind.as_str());
                tracing::debug!(domain, kind = %kind, "Event applied");
            }
            Err(e @ ServiceError::EventProcessing(_)) => {
                self.metrics.record_event_failed(domain, e.kind());
                tracing::error!(domain, kind = %kind, error = %e, "Unprocessable event dropped");
            }
            Err(e) => {
                self.metrics.record_event_failed(domain, e.kind());
                tracing::warn!(domain, kind = %kind, error = %e, "Event rejected");
            }
        }

        result
    }
}

// ============================================================================
// Sinks
// ============================================================================

impl EventSink<i32, Organization> for OrganizationService {
    fn domain(&self) -> &'static str {
        "organization"
    }

    fn apply_create(&self, _key: i32, payload: Organization) -> Result<(), ServiceError> {
        self.create(payload).map(|_| ())
    }

    fn apply_delete(&self, key: i32) -> Result<(), ServiceError> {
        self.delete(key)
    }
}

/// Member events are keyed by organization id.
impl EventSink<i32, Member> for MemberService {
    fn domain(&self) -> &'static str {
        "member"
    }

    fn apply_create(&self, _key: i32, payload: Member) -> Result<(), ServiceError> {
        self.create(payload).map(|_| ())
    }

    fn apply_delete(&self, key: i32) -> Result<(), ServiceError> {
        self.delete_all(key)
    }
}
