//! Delivery persistence boundary.

use crate::domain::Delivery;
use bazaar_contracts::{DeliveryId, OrderId, UserId};
use bazaar_core::repository::RepositoryError;
use futures::future::BoxFuture;
use std::collections::HashMap;
use std::sync::Mutex;

/// Storage interface for deliveries.
pub trait DeliveryRepository: Send + Sync {
    /// Fetch a delivery by id.
    fn get(&self, id: DeliveryId) -> BoxFuture<'_, Result<Option<Delivery>, RepositoryError>>;

    /// Fetch the delivery for an order, if any.
    fn get_by_order(
        &self,
        order_id: OrderId,
    ) -> BoxFuture<'_, Result<Option<Delivery>, RepositoryError>>;

    /// Fetch every delivery owned by a user.
    fn get_by_user(
        &self,
        user_id: UserId,
    ) -> BoxFuture<'_, Result<Vec<Delivery>, RepositoryError>>;

    /// Persist a new delivery.
    fn add(&self, delivery: Delivery) -> BoxFuture<'_, Result<(), RepositoryError>>;

    /// Persist changes to an existing delivery.
    fn update(&self, delivery: Delivery) -> BoxFuture<'_, Result<(), RepositoryError>>;
}

/// Map-backed repository for tests and demos.
#[derive(Debug, Default)]
pub struct InMemoryDeliveryRepository {
    deliveries: Mutex<HashMap<DeliveryId, Delivery>>,
}

impl InMemoryDeliveryRepository {
    /// Create an empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn with_deliveries<T>(
        &self,
        f: impl FnOnce(&mut HashMap<DeliveryId, Delivery>) -> T,
    ) -> Result<T, RepositoryError> {
        self.deliveries
            .lock()
            .map(|mut deliveries| f(&mut deliveries))
            .map_err(|_| RepositoryError::Backend("delivery store lock poisoned".to_string()))
    }
}

impl DeliveryRepository for InMemoryDeliveryRepository {
    fn get(&self, id: DeliveryId) -> BoxFuture<'_, Result<Option<Delivery>, RepositoryError>> {
        let result = self.with_deliveries(|deliveries| deliveries.get(&id).cloned());
        Box::pin(async move { result })
    }

    fn get_by_order(
        &self,
        order_id: OrderId,
    ) -> BoxFuture<'_, Result<Option<Delivery>, RepositoryError>> {
        let result = self.with_deliveries(|deliveries| {
            deliveries.values().find(|d| d.order_id == order_id).cloned()
        });
        Box::pin(async move { result })
    }

    fn get_by_user(
        &self,
        user_id: UserId,
    ) -> BoxFuture<'_, Result<Vec<Delivery>, RepositoryError>> {
        let result = self.with_deliveries(|deliveries| {
            deliveries
                .values()
                .filter(|d| d.user_id == user_id)
                .cloned()
                .collect()
        });
        Box::pin(async move { result })
    }

    fn add(&self, delivery: Delivery) -> BoxFuture<'_, Result<(), RepositoryError>> {
        let result = self.with_deliveries(|deliveries| {
            deliveries.insert(delivery.id, delivery);
        });
        Box::pin(async move { result })
    }

    fn update(&self, delivery: Delivery) -> BoxFuture<'_, Result<(), RepositoryError>> {
        let result = self.with_deliveries(|deliveries| {
            deliveries.insert(delivery.id, delivery);
        });
        Box::pin(async move { result })
    }
}
