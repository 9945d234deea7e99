//! # Bazaar Delivery Service
//!
//! Owns the delivery aggregate. A delivery is created Pending when an
//! `OrderCreated` event arrives, advances to Preparing when the matching
//! `PaymentCompleted` lands, and moves along the rest of the chain through
//! explicit status-update commands:
//!
//! ```text
//! OrderCreated ──▶ Pending ──PaymentCompleted──▶ Preparing ──▶ Shipped ──▶ Delivered
//!                     │                              │            │
//!                     └──────────────────────────────┴────────────┴──▶ Canceled
//! ```
//!
//! Entering Shipped assigns a freshly generated tracking number. Every
//! transition publishes `DeliveryStatusUpdated`; Shipped additionally
//! publishes `DeliveryStarted` and Delivered publishes `DeliveryCompleted`.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod domain;
pub mod handlers;
pub mod repository;
pub mod service;

pub use domain::{Delivery, DeliveryStatus};
pub use repository::{DeliveryRepository, InMemoryDeliveryRepository};
pub use service::{DeliveryError, DeliveryService};
