//! Payment persistence boundary.

use crate::domain::Payment;
use bazaar_contracts::{OrderId, PaymentId};
use bazaar_core::repository::RepositoryError;
use futures::future::BoxFuture;
use std::collections::HashMap;
use std::sync::Mutex;

/// Storage interface for payments.
pub trait PaymentRepository: Send + Sync {
    /// Fetch a payment by id.
    fn get(&self, id: PaymentId) -> BoxFuture<'_, Result<Option<Payment>, RepositoryError>>;

    /// Fetch the payment referencing an order, if any.
    fn get_by_order(
        &self,
        order_id: OrderId,
    ) -> BoxFuture<'_, Result<Option<Payment>, RepositoryError>>;

    /// Persist a new payment.
    fn add(&self, payment: Payment) -> BoxFuture<'_, Result<(), RepositoryError>>;

    /// Persist changes to an existing payment.
    fn update(&self, payment: Payment) -> BoxFuture<'_, Result<(), RepositoryError>>;
}

/// Map-backed repository for tests and demos.
#[derive(Debug, Default)]
pub struct InMemoryPaymentRepository {
    payments: Mutex<HashMap<PaymentId, Payment>>,
}

impl InMemoryPaymentRepository {
    /// Create an empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn with_payments<T>(
        &self,
        f: impl FnOnce(&mut HashMap<PaymentId, Payment>) -> T,
    ) -> Result<T, RepositoryError> {
        self.payments
            .lock()
            .map(|mut payments| f(&mut payments))
            .map_err(|_| RepositoryError::Backend("payment store lock poisoned".to_string()))
    }
}

impl PaymentRepository for InMemoryPaymentRepository {
    fn get(&self, id: PaymentId) -> BoxFuture<'_, Result<Option<Payment>, RepositoryError>> {
        let result = self.with_payments(|payments| payments.get(&id).cloned());
        Box::pin(async move { result })
    }

    fn get_by_order(
        &self,
        order_id: OrderId,
    ) -> BoxFuture<'_, Result<Option<Payment>, RepositoryError>> {
        let result = self.with_payments(|payments| {
            payments.values().find(|p| p.order_id == order_id).cloned()
        });
        Box::pin(async move { result })
    }

    fn add(&self, payment: Payment) -> BoxFuture<'_, Result<(), RepositoryError>> {
        let result = self.with_payments(|payments| {
            payments.insert(payment.id, payment);
        });
        Box::pin(async move { result })
    }

    fn update(&self, payment: Payment) -> BoxFuture<'_, Result<(), RepositoryError>> {
        let result = self.with_payments(|payments| {
            payments.insert(payment.id, payment);
        });
        Box::pin(async move { result })
    }
}
