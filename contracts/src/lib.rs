//! # Bazaar Contracts
//!
//! The single shared contract module for every Bazaar service.
//!
//! Each logical event is declared exactly once here, so there are no
//! competing per-service definitions of the same wire shape. A service
//! depends on this crate for the events it publishes *and* the events it
//! consumes; the broker only ever carries bytes produced by these types.
//!
//! The crate also hosts the static routing registry: every event type maps
//! to exactly one (exchange, routing-key pattern) pair, built at compile
//! time and checked for completeness in tests.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod events;
pub mod ids;
pub mod routing;

pub use events::{
    CartCheckout, CartItem, CheckoutFailed, DeliveryCompleted, DeliveryStarted,
    DeliveryStatusUpdated, OrderCreated, OrderStatusChanged, PaymentCompleted, PaymentFailed,
    PaymentRefunded,
};
pub use ids::{DeliveryId, Money, NotificationId, OrderId, PaymentId, ProductId, UserId};
