//! Event contract trait and the JSON wire codec.
//!
//! Events are plain immutable data records describing facts other services
//! react to. Every event type maps to exactly one exchange and one routing
//! key, declared on the type itself so publishing code never switches on a
//! runtime type name.
//!
//! # Wire Format
//!
//! Events are serialized as JSON. Field names are camelCase on the wire and
//! contract types accept PascalCase aliases on receipt, so payloads from
//! older publishers deserialize cleanly.
//!
//! # Example
//!
//! ```
//! use bazaar_core::event::Event;
//! use serde::{Serialize, Deserialize};
//!
//! #[derive(Clone, Debug, Serialize, Deserialize)]
//! #[serde(rename_all = "camelCase")]
//! struct StockDepleted {
//!     product_id: i64,
//! }
//!
//! impl Event for StockDepleted {
//!     fn event_type(&self) -> &'static str {
//!         "StockDepleted"
//!     }
//!
//!     fn exchange(&self) -> &'static str {
//!         "catalog.events"
//!     }
//!
//!     fn routing_key(&self) -> String {
//!         "catalog.stock.depleted".to_string()
//!     }
//! }
//! ```

use serde::{Serialize, de::DeserializeOwned};
use thiserror::Error;

/// Error types for event codec operations.
#[derive(Error, Debug)]
pub enum EventError {
    /// Failed to serialize an event to JSON bytes.
    #[error("Failed to serialize event: {0}")]
    Serialization(String),

    /// Failed to deserialize an event from JSON bytes.
    #[error("Failed to deserialize event: {0}")]
    Deserialization(String),
}

/// A domain event carried over the broker.
///
/// Implementors declare their identity on the wire (`event_type`), where they
/// are published (`exchange` + `routing_key`), and optionally an idempotency
/// key consumers use to suppress duplicate processing under at-least-once
/// delivery.
///
/// # Routing
///
/// The routing key may depend on the payload (e.g. a status-update event
/// publishes under `delivery.status.<status>`), which is why `routing_key`
/// takes `&self` and returns an owned `String`. The static registry of
/// (event type → exchange, routing-key pattern) lives with the contract
/// definitions and is checked for completeness in tests.
///
/// # Thread Safety
///
/// Events must be `Send + Sync + 'static` so they can cross task boundaries
/// inside consumer dispatch loops.
pub trait Event: Send + Sync + 'static {
    /// Stable type tag for this event (e.g. `"OrderCreated"`).
    fn event_type(&self) -> &'static str;

    /// Name of the exchange this event publishes to.
    ///
    /// The empty string selects the default exchange, which routes directly
    /// to the queue named by the routing key.
    fn exchange(&self) -> &'static str;

    /// Routing key for this particular instance.
    fn routing_key(&self) -> String;

    /// Key consumers use to detect duplicate deliveries.
    ///
    /// `None` (the default) opts the event out of deduplication. One-shot
    /// events return `"<aggregate id>:<event type>"`; events that legitimately
    /// repeat for one aggregate include a discriminator (e.g. the status).
    fn idempotency_key(&self) -> Option<String> {
        None
    }

    /// Serialize this event to JSON bytes.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::Serialization`] if the event cannot be encoded,
    /// which only happens for types with non-string map keys or similar
    /// JSON-incompatible shapes.
    fn to_bytes(&self) -> Result<Vec<u8>, EventError>
    where
        Self: Serialize + Sized,
    {
        serde_json::to_vec(self).map_err(|e| EventError::Serialization(e.to_string()))
    }

    /// Deserialize an event from JSON bytes.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::Deserialization`] when the bytes are not valid
    /// JSON or do not match this event's shape. Such messages can never
    /// succeed and are rejected without requeue by the dispatch loop.
    fn from_bytes(bytes: &[u8]) -> Result<Self, EventError>
    where
        Self: DeserializeOwned + Sized,
    {
        serde_json::from_slice(bytes).map_err(|e| EventError::Deserialization(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
    #[serde(rename_all = "camelCase")]
    struct TestEvent {
        #[serde(alias = "ItemId")]
        item_id: String,
        #[serde(alias = "Count")]
        count: u32,
    }

    impl Event for TestEvent {
        fn event_type(&self) -> &'static str {
            "TestEvent"
        }

        fn exchange(&self) -> &'static str {
            "test.events"
        }

        fn routing_key(&self) -> String {
            "test.created".to_string()
        }
    }

    #[test]
    #[allow(clippy::expect_used)] // Panics: test fails if the codec fails
    fn json_roundtrip_preserves_fields() {
        let event = TestEvent {
            item_id: "item-1".to_string(),
            count: 3,
        };

        let bytes = event.to_bytes().expect("serialization should succeed");
        let decoded = TestEvent::from_bytes(&bytes).expect("deserialization should succeed");

        assert_eq!(event, decoded);
    }

    #[test]
    #[allow(clippy::expect_used)] // Panics: test fails if the codec fails
    fn wire_names_are_camel_case() {
        let event = TestEvent {
            item_id: "item-1".to_string(),
            count: 3,
        };

        let bytes = event.to_bytes().expect("serialization should succeed");
        let json: serde_json::Value =
            serde_json::from_slice(&bytes).expect("payload should be JSON");

        assert!(json.get("itemId").is_some());
        assert!(json.get("item_id").is_none());
    }

    #[test]
    #[allow(clippy::expect_used)] // Panics: test fails if the codec fails
    fn pascal_case_payloads_are_accepted() {
        let bytes = br#"{"ItemId":"item-2","Count":7}"#;

        let decoded = TestEvent::from_bytes(bytes).expect("aliases should apply");

        assert_eq!(decoded.item_id, "item-2");
        assert_eq!(decoded.count, 7);
    }

    #[test]
    fn malformed_payload_is_reported() {
        let result = TestEvent::from_bytes(b"not json at all");
        assert!(matches!(result, Err(EventError::Deserialization(_))));
    }

    #[test]
    fn idempotency_key_defaults_to_none() {
        let event = TestEvent {
            item_id: "item-1".to_string(),
            count: 1,
        };
        assert!(event.idempotency_key().is_none());
    }
}
