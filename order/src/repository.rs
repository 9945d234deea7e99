//! Order persistence boundary.
//!
//! Relational storage is out of scope for the choreography layer; the
//! service only assumes this interface. The in-memory implementation backs
//! tests and the demo.

use crate::domain::Order;
use bazaar_contracts::{OrderId, UserId};
use bazaar_core::repository::RepositoryError;
use futures::future::BoxFuture;
use std::collections::HashMap;
use std::sync::Mutex;

/// Storage interface for orders.
pub trait OrderRepository: Send + Sync {
    /// Fetch an order by id.
    fn get(&self, id: OrderId) -> BoxFuture<'_, Result<Option<Order>, RepositoryError>>;

    /// Fetch all orders owned by a user.
    fn get_by_user(&self, user_id: UserId) -> BoxFuture<'_, Result<Vec<Order>, RepositoryError>>;

    /// Fetch every order.
    fn list(&self) -> BoxFuture<'_, Result<Vec<Order>, RepositoryError>>;

    /// Persist a new order.
    fn add(&self, order: Order) -> BoxFuture<'_, Result<(), RepositoryError>>;

    /// Persist changes to an existing order.
    fn update(&self, order: Order) -> BoxFuture<'_, Result<(), RepositoryError>>;
}

/// Map-backed repository for tests and demos.
#[derive(Debug, Default)]
pub struct InMemoryOrderRepository {
    orders: Mutex<HashMap<OrderId, Order>>,
}

impl InMemoryOrderRepository {
    /// Create an empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn with_orders<T>(
        &self,
        f: impl FnOnce(&mut HashMap<OrderId, Order>) -> T,
    ) -> Result<T, RepositoryError> {
        self.orders
            .lock()
            .map(|mut orders| f(&mut orders))
            .map_err(|_| RepositoryError::Backend("order store lock poisoned".to_string()))
    }
}

impl OrderRepository for InMemoryOrderRepository {
    fn get(&self, id: OrderId) -> BoxFuture<'_, Result<Option<Order>, RepositoryError>> {
        let result = self.with_orders(|orders| orders.get(&id).cloned());
        Box::pin(async move { result })
    }

    fn get_by_user(&self, user_id: UserId) -> BoxFuture<'_, Result<Vec<Order>, RepositoryError>> {
        let result = self.with_orders(|orders| {
            orders
                .values()
                .filter(|o| o.user_id == user_id)
                .cloned()
                .collect()
        });
        Box::pin(async move { result })
    }

    fn list(&self) -> BoxFuture<'_, Result<Vec<Order>, RepositoryError>> {
        let result = self.with_orders(|orders| orders.values().cloned().collect());
        Box::pin(async move { result })
    }

    fn add(&self, order: Order) -> BoxFuture<'_, Result<(), RepositoryError>> {
        let result = self.with_orders(|orders| {
            orders.insert(order.id, order);
        });
        Box::pin(async move { result })
    }

    fn update(&self, order: Order) -> BoxFuture<'_, Result<(), RepositoryError>> {
        let result = self.with_orders(|orders| {
            orders.insert(order.id, order);
        });
        Box::pin(async move { result })
    }
}
