//! Broker abstraction for cross-service choreography.
//!
//! The [`Broker`] trait is the only transport surface services see: declare
//! topology at startup, publish events, subscribe to queues. Implementations
//! include the in-process topic exchange in `bazaar-testing` and the
//! Kafka-compatible transport in `bazaar-redpanda`.
//!
//! # Key Principles
//!
//! - **No direct calls between services**: every cross-service effect flows
//!   through `publish`.
//! - **At-least-once delivery**: subscribers may receive duplicates and must
//!   tolerate them.
//! - **Per-consumer subscriptions**: each logical consumer owns its own
//!   delivery stream, so a slow handler never blocks another queue.
//! - **Publish failures surface to the caller**: there is no internal retry;
//!   callers decide.
//!
//! # Dyn Compatibility
//!
//! The trait uses explicit `Pin<Box<dyn Future>>` returns instead of
//! `async fn` so it can be used as `Arc<dyn Broker>`; services and handlers
//! capture the broker behind a shared handle.

use crate::envelope::Delivery;
use crate::event::Event;
use crate::topology::{Topology, TopologyError};
use futures::Stream;
use serde::Serialize;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Errors that can occur during broker operations.
#[derive(Error, Debug, Clone)]
pub enum BrokerError {
    /// Failed to connect to the broker.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Failed to publish a message.
    #[error("Publish failed on exchange '{exchange}' with routing key '{routing_key}': {reason}")]
    PublishFailed {
        /// The target exchange.
        exchange: String,
        /// The routing key used.
        routing_key: String,
        /// The reason for failure.
        reason: String,
    },

    /// Failed to subscribe to a queue.
    #[error("Subscription failed for queue '{queue}': {reason}")]
    SubscriptionFailed {
        /// The queue that failed.
        queue: String,
        /// The reason for failure.
        reason: String,
    },

    /// Published to an exchange nobody declared.
    #[error("Unknown exchange: {0}")]
    UnknownExchange(String),

    /// Subscribed to a queue nobody declared.
    #[error("Unknown queue: {0}")]
    UnknownQueue(String),

    /// Topology declaration conflicts with what already exists.
    ///
    /// Redeclaring identical topology is a no-op; a mismatch is a fatal
    /// configuration error at startup.
    #[error("Topology mismatch: {0}")]
    TopologyMismatch(String),

    /// The declared topology is internally inconsistent.
    #[error("Invalid topology: {0}")]
    InvalidTopology(#[from] TopologyError),

    /// Failed to serialize an outgoing event.
    #[error("Serialization failed: {0}")]
    Serialization(String),

    /// Network or transport error.
    #[error("Transport error: {0}")]
    Transport(String),
}

/// Stream of deliveries from one queue subscription.
///
/// Each item is a [`Delivery`] that must be acknowledged or rejected, or an
/// error the transport surfaced while receiving.
pub type DeliveryStream = Pin<Box<dyn Stream<Item = Result<Delivery, BrokerError>> + Send>>;

/// Trait for broker transports.
pub trait Broker: Send + Sync {
    /// Declare exchanges, queues and bindings.
    ///
    /// Idempotent for identical declarations. Services call this once at
    /// startup before publishing or subscribing.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::InvalidTopology`] for inconsistent topologies
    /// and [`BrokerError::TopologyMismatch`] when a name already exists with
    /// different properties.
    fn declare_topology(
        &self,
        topology: &Topology,
    ) -> Pin<Box<dyn Future<Output = Result<(), BrokerError>> + Send + '_>>;

    /// Publish a message, persisted, with no delivery confirmation required
    /// by the caller.
    ///
    /// The empty exchange name selects the default exchange, which routes
    /// directly to the queue named by the routing key.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::PublishFailed`] (or a connection/transport
    /// variant) when the message could not be handed to the broker. There is
    /// no internal retry.
    fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        body: Vec<u8>,
    ) -> Pin<Box<dyn Future<Output = Result<(), BrokerError>> + Send + '_>>;

    /// Subscribe to a declared queue.
    ///
    /// Deliveries arrive one at a time in order; the next message is not
    /// handed out until the previous delivery is acknowledged or rejected.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::UnknownQueue`] for undeclared queues and
    /// [`BrokerError::SubscriptionFailed`] for transport failures.
    fn subscribe(
        &self,
        queue: &str,
    ) -> Pin<Box<dyn Future<Output = Result<DeliveryStream, BrokerError>> + Send + '_>>;
}

/// Serialize an event and publish it on its declared route.
///
/// This is the one publish path services use, so the (event type → exchange,
/// routing key) mapping stays on the contract type instead of being switched
/// on at call sites.
///
/// # Errors
///
/// Returns [`BrokerError::Serialization`] if the event cannot be encoded,
/// otherwise whatever [`Broker::publish`] returns.
pub async fn publish_event<E>(broker: &dyn Broker, event: &E) -> Result<(), BrokerError>
where
    E: Event + Serialize,
{
    let body = event
        .to_bytes()
        .map_err(|e| BrokerError::Serialization(e.to_string()))?;
    let routing_key = event.routing_key();

    tracing::debug!(
        event_type = event.event_type(),
        exchange = event.exchange(),
        routing_key = %routing_key,
        "Publishing event"
    );

    broker.publish(event.exchange(), &routing_key, body).await
}
