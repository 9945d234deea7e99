//! Order lookup collaborator.
//!
//! Payment and delivery-status events do not carry the owning user id; the
//! notification service resolves it through a plain request/response lookup
//! to the order service. This is an external synchronous read, not part of
//! the choreography.

use bazaar_contracts::{OrderId, UserId};
use futures::future::BoxFuture;
use std::collections::HashMap;
use std::sync::Mutex;
use thiserror::Error;

/// The slice of order state the notification service needs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OrderInfo {
    /// Order id.
    pub id: OrderId,
    /// Owning user.
    pub user_id: UserId,
    /// Current status name.
    pub status: String,
}

/// Errors from the order lookup.
#[derive(Error, Debug, Clone)]
pub enum LookupError {
    /// The order service could not be reached.
    #[error("order service unavailable: {0}")]
    Unavailable(String),
}

/// Read-only order lookup on the order service.
pub trait OrderLookup: Send + Sync {
    /// Fetch order info by id; `None` when the order does not exist.
    fn order_info(
        &self,
        order_id: OrderId,
    ) -> BoxFuture<'_, Result<Option<OrderInfo>, LookupError>>;
}

/// Map-backed lookup for tests and demos.
#[derive(Debug, Default)]
pub struct InMemoryOrderLookup {
    orders: Mutex<HashMap<OrderId, OrderInfo>>,
}

impl InMemoryOrderLookup {
    /// Create an empty lookup.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace an order info record.
    pub fn insert(&self, info: OrderInfo) {
        if let Ok(mut orders) = self.orders.lock() {
            orders.insert(info.id, info);
        }
    }
}

impl OrderLookup for InMemoryOrderLookup {
    fn order_info(
        &self,
        order_id: OrderId,
    ) -> BoxFuture<'_, Result<Option<OrderInfo>, LookupError>> {
        let result = self
            .orders
            .lock()
            .map(|orders| orders.get(&order_id).cloned())
            .map_err(|_| LookupError::Unavailable("order lookup lock poisoned".to_string()));
        Box::pin(async move { result })
    }
}
