//! # Bazaar Order Service
//!
//! Owns the order aggregate and its state machine. Orders are created either
//! directly (`OrderService::create_order`) or through the cart checkout
//! bridge, and from then on their status is mutated only by events arriving
//! from the payment and delivery services:
//!
//! ```text
//! Created → Pending ──PaymentCompleted──▶ Paid ──delivery.status.preparing──▶ PreparingForDelivery
//!              │                           │                                        │
//!              │ PaymentFailed             │ PaymentRefunded                        ▼
//!              ▼                           ▼                                     Shipped ──▶ Delivered
//!           Unpaid                      Refunded
//!
//! (Pending, Paid, PreparingForDelivery, Shipped) ──delivery.status.canceled──▶ Cancelled
//! ```
//!
//! Creation requires a synchronous catalog read: every line item's product
//! must exist with sufficient stock, and the order snapshots product name
//! and unit price so later catalog changes never alter the total.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod catalog;
pub mod checkout;
pub mod domain;
pub mod handlers;
pub mod repository;
pub mod service;

pub use catalog::{CatalogError, InMemoryCatalog, ProductCatalog, ProductInfo};
pub use domain::{Order, OrderItem, OrderStatus};
pub use repository::{InMemoryOrderRepository, OrderRepository};
pub use service::{OrderError, OrderItemRequest, OrderService};
