//! # Bazaar Notification Service
//!
//! Pure fan-in: subscribes to order, payment and delivery events and turns
//! each into one notification record for the owning user. Events that do
//! not carry the user id (payment events, delivery status updates) resolve
//! it through a synchronous lookup to the order service; when that lookup
//! fails or finds nothing, the notification is silently skipped: logged,
//! never retried.
//!
//! Notifications are immutable once created except for the read flag.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod domain;
pub mod handlers;
pub mod order_lookup;
pub mod repository;
pub mod service;

pub use domain::Notification;
pub use order_lookup::{InMemoryOrderLookup, LookupError, OrderInfo, OrderLookup};
pub use repository::{InMemoryNotificationRepository, NotificationRepository};
pub use service::{NotificationError, NotificationService};
