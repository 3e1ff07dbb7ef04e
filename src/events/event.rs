use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::ServiceError;

// ============================================================================
// Event Envelope
// ============================================================================
//
// One create/delete intent for a backend service. The envelope is built by
// the composite side, handed to an outbound channel and never mutated again.
//
// Invariant: `payload` is present iff `kind == Create`. The only way to
// build an envelope in-process is through `Event::create` / `Event::delete`,
// so the invariant can only be broken by a foreign producer on the wire;
// consumers reject those with `EventProcessing`.
//
// ============================================================================

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum EventKind {
    Create,
    Delete,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Create => "CREATE",
            EventKind::Delete => "DELETE",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Envelope carrying a change for the backend that owns key `K`.
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct Event<K, T> {
    kind: EventKind,
    key: K,
    payload: Option<T>,
    created_at: DateTime<Utc>,
}

impl<K, T> Event<K, T> {
    pub fn create(key: K, payload: T) -> Self {
        Self {
            kind: EventKind::Create,
            key,
            payload: Some(payload),
            created_at: Utc::now(),
        }
    }

    pub fn delete(key: K) -> Self {
        Self {
            kind: EventKind::Delete,
            key,
            payload: None,
            created_at: Utc::now(),
        }
    }

    pub fn kind(&self) -> EventKind {
        self.kind
    }

    pub fn key(&self) -> &K {
        &self.key
    }

    pub fn payload(&self) -> Option<&T> {
        self.payload.as_ref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn into_parts(self) -> (EventKind, K, Option<T>) {
        (self.kind, self.key, self.payload)
    }
}

// Creation time is deliberately left out: two envelopes describing the same
// change are equal no matter when they were built.
impl<K: PartialEq, T: PartialEq> PartialEq for Event<K, T> {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind && self.key == other.key && self.payload == other.payload
    }
}

/// Decode an envelope received from the wire.
pub fn decode_event<K, T>(bytes: &[u8]) -> Result<Event<K, T>, ServiceError>
where
    K: DeserializeOwned,
    T: DeserializeOwned,
{
    serde_json::from_slice(bytes)
        .map_err(|e| ServiceError::EventProcessing(format!("Invalid event! {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Organization;

    fn organization(id: i32) -> Organization {
        Organization::new(id, "name", "country")
    }

    #[test]
    fn test_create_carries_payload() {
        let event = Event::create(1, organization(1));

        assert_eq!(event.kind(), EventKind::Create);
        assert_eq!(*event.key(), 1);
        assert_eq!(event.payload(), Some(&organization(1)));
    }

    #[test]
    fn test_delete_has_no_payload() {
        let event: Event<i32, Organization> = Event::delete(7);

        assert_eq!(event.kind(), EventKind::Delete);
        assert_eq!(*event.key(), 7);
        assert!(event.payload().is_none());
    }

    #[test]
    fn test_equality_ignores_creation_time() {
        let first = Event::create(1, organization(1));
        std::thread::sleep(std::time::Duration::from_millis(5));
        let second = Event::create(1, organization(1));

        assert_ne!(first.created_at(), second.created_at());
        assert_eq!(first, second);
        assert_ne!(first, Event::create(2, organization(1)));
        assert_ne!(Event::<i32, Organization>::delete(1), first);
    }

    #[test]
    fn test_wire_format() {
        let event: Event<i32, Organization> = Event::delete(3);
        let json = serde_json::to_value(&event).unwrap();

        assert_eq!(json["kind"], "DELETE");
        assert_eq!(json["key"], 3);
        assert!(json["payload"].is_null());
        assert!(json["createdAt"].is_string());
    }

    #[test]
    fn test_decode_event_round_trips_create() {
        let event = Event::create(5, organization(5));
        let bytes = serde_json::to_vec(&event).unwrap();

        let decoded: Event<i32, Organization> = decode_event(&bytes).unwrap();
        assert_eq!(decoded, event);
    }

    #[test]
    fn test_decode_event_rejects_unknown_kind() {
        let bytes = br#"{"kind":"UPDATE","key":1,"payload":null,"createdAt":"2024-01-01T00:00:00Z"}"#;

        let result: Result<Event<i32, Organization>, _> = decode_event(bytes);
        match result {
            Err(ServiceError::EventProcessing(message)) => {
                assert!(message.starts_with("Invalid event!"))
            }
            other => panic!("expected EventProcessing, got {:?}", other),
        }
    }
}
