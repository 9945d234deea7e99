//! # Bazaar Core
//!
//! Core abstractions for the Bazaar event-driven choreography layer.
//!
//! Independent services (order, payment, delivery, notification) never call
//! each other directly. They coordinate exclusively through events published
//! to a shared broker, and each service's state machine advances only when a
//! message from another service arrives. This crate provides the pieces every
//! participant shares:
//!
//! - [`broker::Broker`]: the publish/subscribe transport contract
//! - [`topology::Topology`]: declarative exchanges, queues and bindings
//! - [`topology::BindingPattern`]: `*`/`#` wildcard routing-key matching
//! - [`envelope::Envelope`] / [`envelope::Delivery`]: the wire envelope and
//!   the manual acknowledgment handle
//! - [`event::Event`]: the contract trait with the JSON wire codec
//! - [`environment::Clock`]: injected time for deterministic tests
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐                         ┌──────────────┐
//! │  Service A   │                         │  Service B   │
//! │              │  publish(exchange,      │              │
//! │              │          routing key)   │              │
//! └──────┬───────┘                         └──────▲───────┘
//!        │                                        │
//!        ▼                                        │
//! ┌─────────────────────────────────────────────────────────┐
//! │                     Topic Exchange                      │
//! │   fans out to every queue whose binding pattern         │
//! │   matches the routing key (`*` one segment, `#` many)   │
//! └─────────────────────────────────────────────────────────┘
//!                                                 │
//!                                      subscribe(queue) → ack/reject
//! ```
//!
//! # Delivery Semantics
//!
//! At-least-once: a rejected-with-requeue delivery comes back, so consumers
//! must tolerate duplicates. Messages that can never succeed are rejected
//! without requeue and routed to the queue's dead-letter queue when one is
//! configured.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod broker;
pub mod envelope;
pub mod environment;
pub mod event;
pub mod repository;
pub mod topology;

pub use broker::{Broker, BrokerError, DeliveryStream, publish_event};
pub use envelope::{Delivery, Disposition, Envelope};
pub use environment::{Clock, SystemClock};
pub use event::{Event, EventError};
pub use topology::{BindingPattern, ExchangeKind, ExchangeSpec, QueueSpec, Topology};

// Re-export commonly used types
pub use chrono::{DateTime, Utc};
