//! Payment service: create, process, refund.

use crate::domain::{Payment, PaymentStatus};
use crate::gateway::PaymentGateway;
use crate::repository::PaymentRepository;
use bazaar_contracts::{Money, OrderId, PaymentCompleted, PaymentFailed, PaymentId, PaymentRefunded};
use bazaar_core::broker::{Broker, BrokerError, publish_event};
use bazaar_core::environment::Clock;
use bazaar_core::repository::RepositoryError;
use std::sync::Arc;
use thiserror::Error;

/// Errors surfaced by payment operations.
#[derive(Error, Debug)]
pub enum PaymentError {
    /// No payment with this id.
    #[error("payment {0} not found")]
    NotFound(PaymentId),

    /// The operation is invalid for the payment's current status.
    #[error("cannot {operation} payment {payment} with status {status}")]
    InvalidStatus {
        /// The attempted operation.
        operation: &'static str,
        /// The payment involved.
        payment: PaymentId,
        /// Its current status.
        status: PaymentStatus,
    },

    /// Storage failed.
    #[error(transparent)]
    Repository(#[from] RepositoryError),

    /// Event publication failed.
    #[error(transparent)]
    Broker(#[from] BrokerError),
}

/// The payment service object.
pub struct PaymentService {
    repository: Arc<dyn PaymentRepository>,
    gateway: Arc<dyn PaymentGateway>,
    broker: Arc<dyn Broker>,
    clock: Arc<dyn Clock>,
}

impl PaymentService {
    /// Wire the service with its collaborators.
    pub fn new(
        repository: Arc<dyn PaymentRepository>,
        gateway: Arc<dyn PaymentGateway>,
        broker: Arc<dyn Broker>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            repository,
            gateway,
            broker,
            clock,
        }
    }

    /// Create a Pending payment for an order.
    ///
    /// # Errors
    ///
    /// Storage errors only.
    pub async fn create_payment(
        &self,
        order_id: OrderId,
        amount: Money,
    ) -> Result<Payment, PaymentError> {
        let payment = Payment::new(order_id, amount, self.clock.now());
        self.repository.add(payment.clone()).await?;
        tracing::info!(payment = %payment.id, order = %order_id, amount = %amount, "Created payment");
        Ok(payment)
    }

    /// Fetch a payment by id.
    ///
    /// # Errors
    ///
    /// [`PaymentError::NotFound`] when the id is unknown, or a storage error.
    pub async fn payment(&self, id: PaymentId) -> Result<Payment, PaymentError> {
        self.repository
            .get(id)
            .await?
            .ok_or(PaymentError::NotFound(id))
    }

    /// Fetch the payment for an order, if one exists.
    ///
    /// # Errors
    ///
    /// Storage errors only.
    pub async fn payment_for_order(
        &self,
        order_id: OrderId,
    ) -> Result<Option<Payment>, PaymentError> {
        Ok(self.repository.get_by_order(order_id).await?)
    }

    /// Run a Pending payment through the gateway.
    ///
    /// Success moves it to Completed and publishes `PaymentCompleted`;
    /// decline moves it to Failed with the gateway message and publishes
    /// `PaymentFailed`. Processing a payment that is no longer Pending is a
    /// warning no-op returning the payment unchanged.
    ///
    /// # Errors
    ///
    /// [`PaymentError::NotFound`] for unknown ids, plus storage/broker
    /// failures.
    pub async fn process_payment(&self, id: PaymentId) -> Result<Payment, PaymentError> {
        let mut payment = self
            .repository
            .get(id)
            .await?
            .ok_or(PaymentError::NotFound(id))?;

        if payment.status != PaymentStatus::Pending {
            tracing::warn!(
                payment = %id,
                status = %payment.status,
                "Payment already processed, skipping"
            );
            return Ok(payment);
        }

        tracing::info!(payment = %id, order = %payment.order_id, "Processing payment");
        let charge = self
            .gateway
            .charge(payment.id, payment.order_id, payment.amount)
            .await;
        let now = self.clock.now();

        match charge {
            Ok(()) => {
                payment.status = PaymentStatus::Completed;
                payment.completed_at = Some(now);
                self.repository.update(payment.clone()).await?;

                publish_event(
                    self.broker.as_ref(),
                    &PaymentCompleted {
                        order_id: payment.order_id,
                        payment_id: payment.id,
                        amount: payment.amount,
                        completed_at: now,
                    },
                )
                .await?;
                tracing::info!(payment = %id, "Payment completed");
            },
            Err(err) => {
                payment.status = PaymentStatus::Failed;
                payment.failed_at = Some(now);
                payment.error_message = Some(err.message.clone());
                self.repository.update(payment.clone()).await?;

                publish_event(
                    self.broker.as_ref(),
                    &PaymentFailed {
                        order_id: payment.order_id,
                        payment_id: payment.id,
                        amount: payment.amount,
                        failed_at: now,
                        error_message: err.message,
                    },
                )
                .await?;
                tracing::warn!(payment = %id, "Payment failed");
            },
        }

        Ok(payment)
    }

    /// Refund a Completed payment and publish `PaymentRefunded`.
    ///
    /// # Errors
    ///
    /// [`PaymentError::InvalidStatus`] when the payment is not Completed,
    /// [`PaymentError::NotFound`] for unknown ids, plus storage/broker
    /// failures.
    pub async fn refund_payment(&self, id: PaymentId) -> Result<Payment, PaymentError> {
        let mut payment = self
            .repository
            .get(id)
            .await?
            .ok_or(PaymentError::NotFound(id))?;

        if payment.status != PaymentStatus::Completed {
            return Err(PaymentError::InvalidStatus {
                operation: "refund",
                payment: id,
                status: payment.status,
            });
        }

        payment.status = PaymentStatus::Refunded;
        self.repository.update(payment.clone()).await?;

        let refunded_at = self.clock.now();
        publish_event(
            self.broker.as_ref(),
            &PaymentRefunded {
                order_id: payment.order_id,
                payment_id: payment.id,
                amount: payment.amount,
                refunded_at,
            },
        )
        .await?;

        tracing::info!(payment = %id, order = %payment.order_id, "Payment refunded");
        Ok(payment)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)] // Panics: assertions in tests
mod tests {
    use super::*;
    use crate::gateway::SimulatedGateway;
    use crate::repository::InMemoryPaymentRepository;
    use bazaar_contracts::routing::exchanges;
    use bazaar_core::event::Event;
    use bazaar_core::topology::Topology;
    use bazaar_testing::{InMemoryBroker, test_clock};

    struct Fixture {
        broker: Arc<InMemoryBroker>,
        service: PaymentService,
    }

    async fn fixture(gateway: SimulatedGateway) -> Fixture {
        let broker = Arc::new(InMemoryBroker::new());
        broker
            .declare_topology(
                &Topology::new()
                    .exchange(exchanges::PAYMENT_EVENTS)
                    .queue("probe.payment.events")
                    .bind("probe.payment.events", exchanges::PAYMENT_EVENTS, "payment.*"),
            )
            .await
            .expect("topology should declare");

        let service = PaymentService::new(
            Arc::new(InMemoryPaymentRepository::new()),
            Arc::new(gateway),
            broker.clone(),
            Arc::new(test_clock()),
        );

        Fixture { broker, service }
    }

    #[tokio::test]
    async fn successful_charge_completes_and_publishes() {
        let f = fixture(SimulatedGateway::always_approve()).await;
        let payment = f
            .service
            .create_payment(OrderId::new(), Money::from_cents(100_00))
            .await
            .unwrap();

        let processed = f.service.process_payment(payment.id).await.unwrap();
        assert_eq!(processed.status, PaymentStatus::Completed);
        assert!(processed.completed_at.is_some());

        let published = f.broker.peek_queue("probe.payment.events");
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].routing_key, "payment.completed");
        let event = PaymentCompleted::from_bytes(&published[0].body).unwrap();
        assert_eq!(event.payment_id, payment.id);
        assert_eq!(event.amount, Money::from_cents(100_00));
    }

    #[tokio::test]
    async fn declined_charge_fails_with_error_message() {
        let f = fixture(SimulatedGateway::always_decline()).await;
        let payment = f
            .service
            .create_payment(OrderId::new(), Money::from_cents(100_00))
            .await
            .unwrap();

        let processed = f.service.process_payment(payment.id).await.unwrap();
        assert_eq!(processed.status, PaymentStatus::Failed);
        assert_eq!(
            processed.error_message.as_deref(),
            Some("Payment processing failed")
        );

        let published = f.broker.peek_queue("probe.payment.events");
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].routing_key, "payment.failed");
    }

    #[tokio::test]
    async fn processing_twice_is_a_warning_no_op() {
        let f = fixture(SimulatedGateway::always_approve()).await;
        let payment = f
            .service
            .create_payment(OrderId::new(), Money::from_cents(100_00))
            .await
            .unwrap();

        f.service.process_payment(payment.id).await.unwrap();
        let again = f.service.process_payment(payment.id).await.unwrap();

        assert_eq!(again.status, PaymentStatus::Completed);
        // No second PaymentCompleted event.
        assert_eq!(f.broker.peek_queue("probe.payment.events").len(), 1);
    }

    #[tokio::test]
    async fn refund_requires_a_completed_payment() {
        let f = fixture(SimulatedGateway::always_approve()).await;
        let payment = f
            .service
            .create_payment(OrderId::new(), Money::from_cents(100_00))
            .await
            .unwrap();

        let result = f.service.refund_payment(payment.id).await;
        assert!(matches!(
            result,
            Err(PaymentError::InvalidStatus {
                operation: "refund",
                ..
            })
        ));

        f.service.process_payment(payment.id).await.unwrap();
        let refunded = f.service.refund_payment(payment.id).await.unwrap();
        assert_eq!(refunded.status, PaymentStatus::Refunded);

        let published = f.broker.peek_queue("probe.payment.events");
        assert_eq!(published.len(), 2);
        assert_eq!(published[1].routing_key, "payment.refunded");
    }

    #[tokio::test]
    async fn unknown_payment_is_reported() {
        let f = fixture(SimulatedGateway::always_approve()).await;
        let result = f.service.process_payment(PaymentId::new()).await;
        assert!(matches!(result, Err(PaymentError::NotFound(_))));
    }
}
