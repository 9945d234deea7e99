//! # Bazaar Runtime
//!
//! The consumer side of the choreography layer: a per-queue dispatch loop
//! that turns raw broker deliveries into typed handler invocations with
//! acknowledgment-based retry.
//!
//! For every delivery the [`consumer::Consumer`] loop:
//!
//! 1. selects the handler whose binding pattern matches the routing key;
//! 2. resolves a fresh, isolated scope for the handler's stateful
//!    collaborators (the callback runs outside any per-request context);
//! 3. deserializes the body into the contract type bound to the pattern;
//!    a payload that cannot deserialize is rejected without requeue, since
//!    redelivery can never help;
//! 4. runs the handler on a worker task and acknowledges only after it
//!    completes;
//! 5. on handler failure, requeues up to the [`redelivery::RedeliveryPolicy`]
//!    cap, after which the message is rejected without requeue and routed to
//!    the queue's dead-letter queue.
//!
//! Duplicate deliveries (at-least-once transport) are suppressed through the
//! [`idempotency::IdempotencyStore`]: events exposing an idempotency key are
//! skipped when the key was already processed on this queue, and the key is
//! recorded only after the handler succeeds.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod consumer;
pub mod idempotency;
pub mod redelivery;

pub use consumer::{Consumer, HandlerError, ScopeFactory};
pub use idempotency::{IdempotencyStore, InMemoryIdempotencyStore};
pub use redelivery::RedeliveryPolicy;
