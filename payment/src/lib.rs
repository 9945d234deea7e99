//! # Bazaar Payment Service
//!
//! Owns the payment aggregate. A payment is born from an `OrderCreated`
//! event (the service creates it Pending and immediately attempts a charge
//! through the gateway) and afterwards only moves along
//! `Pending → {Completed, Failed}` and `Completed → Refunded`:
//!
//! ```text
//! OrderCreated ──▶ Pending ──charge ok──▶ Completed ──refund──▶ Refunded
//!                     │
//!                     └─charge declined──▶ Failed
//! ```
//!
//! Completion publishes `PaymentCompleted`; failure publishes
//! `PaymentFailed` with the gateway's error message; refunds publish
//! `PaymentRefunded`. A second `OrderCreated` for an order that already has
//! a payment is tolerated as a warning no-op.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod domain;
pub mod gateway;
pub mod handlers;
pub mod repository;
pub mod service;

pub use domain::{Payment, PaymentStatus};
pub use gateway::{GatewayConfig, GatewayError, PaymentGateway, SimulatedGateway};
pub use repository::{InMemoryPaymentRepository, PaymentRepository};
pub use service::{PaymentError, PaymentService};
