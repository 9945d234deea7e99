//! Delivery service: creation, guarded status updates, tracking numbers.

use crate::domain::{Delivery, DeliveryStatus};
use crate::repository::DeliveryRepository;
use bazaar_contracts::{
    DeliveryCompleted, DeliveryId, DeliveryStarted, DeliveryStatusUpdated, OrderId, UserId,
};
use bazaar_core::broker::{Broker, BrokerError, publish_event};
use bazaar_core::environment::Clock;
use bazaar_core::repository::RepositoryError;
use std::sync::Arc;
use thiserror::Error;

/// Errors surfaced by delivery operations.
#[derive(Error, Debug)]
pub enum DeliveryError {
    /// No delivery with this id.
    #[error("delivery {0} not found")]
    NotFound(DeliveryId),

    /// The state machine forbids this status change.
    #[error("delivery {delivery} cannot move from {from} to {to}")]
    InvalidTransition {
        /// The delivery being mutated.
        delivery: DeliveryId,
        /// Current status.
        from: DeliveryStatus,
        /// Requested status.
        to: DeliveryStatus,
    },

    /// Storage failed.
    #[error(transparent)]
    Repository(#[from] RepositoryError),

    /// Event publication failed.
    #[error(transparent)]
    Broker(#[from] BrokerError),
}

/// The delivery service object.
pub struct DeliveryService {
    repository: Arc<dyn DeliveryRepository>,
    broker: Arc<dyn Broker>,
    clock: Arc<dyn Clock>,
}

impl DeliveryService {
    /// Wire the service with its collaborators.
    pub fn new(
        repository: Arc<dyn DeliveryRepository>,
        broker: Arc<dyn Broker>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            repository,
            broker,
            clock,
        }
    }

    /// Create a Pending delivery for an order.
    ///
    /// Creation is not a transition, so nothing is published.
    ///
    /// # Errors
    ///
    /// Storage errors only.
    pub async fn create_delivery(
        &self,
        order_id: OrderId,
        user_id: UserId,
        address: String,
    ) -> Result<Delivery, DeliveryError> {
        let delivery = Delivery::new(order_id, user_id, address, self.clock.now());
        self.repository.add(delivery.clone()).await?;
        tracing::info!(delivery = %delivery.id, order = %order_id, "Created delivery");
        Ok(delivery)
    }

    /// Fetch a delivery by id.
    ///
    /// # Errors
    ///
    /// [`DeliveryError::NotFound`] when the id is unknown, or a storage
    /// error.
    pub async fn delivery(&self, id: DeliveryId) -> Result<Delivery, DeliveryError> {
        self.repository
            .get(id)
            .await?
            .ok_or(DeliveryError::NotFound(id))
    }

    /// Fetch the delivery for an order, if one exists.
    ///
    /// # Errors
    ///
    /// Storage errors only.
    pub async fn delivery_for_order(
        &self,
        order_id: OrderId,
    ) -> Result<Option<Delivery>, DeliveryError> {
        Ok(self.repository.get_by_order(order_id).await?)
    }

    /// Fetch every delivery owned by a user.
    ///
    /// # Errors
    ///
    /// Storage errors only.
    pub async fn deliveries_for_user(
        &self,
        user_id: UserId,
    ) -> Result<Vec<Delivery>, DeliveryError> {
        Ok(self.repository.get_by_user(user_id).await?)
    }

    /// Apply a status transition.
    ///
    /// Entering Shipped assigns a generated tracking number. Every applied
    /// transition publishes `DeliveryStatusUpdated`; Shipped additionally
    /// publishes `DeliveryStarted` and Delivered publishes
    /// `DeliveryCompleted`.
    ///
    /// # Errors
    ///
    /// [`DeliveryError::NotFound`] for unknown deliveries,
    /// [`DeliveryError::InvalidTransition`] when the state machine forbids
    /// the move, plus storage/broker failures.
    pub async fn update_status(
        &self,
        id: DeliveryId,
        status: DeliveryStatus,
    ) -> Result<Delivery, DeliveryError> {
        let mut delivery = self
            .repository
            .get(id)
            .await?
            .ok_or(DeliveryError::NotFound(id))?;

        if !delivery.status.can_transition_to(status) {
            return Err(DeliveryError::InvalidTransition {
                delivery: id,
                from: delivery.status,
                to: status,
            });
        }

        let now = self.clock.now();
        let previous = delivery.status;
        delivery.status = status;
        delivery.updated_at = Some(now);

        if status == DeliveryStatus::Shipped {
            delivery.tracking_number = Some(self.generate_tracking_number());
        }

        self.repository.update(delivery.clone()).await?;

        publish_event(
            self.broker.as_ref(),
            &DeliveryStatusUpdated {
                delivery_id: delivery.id,
                order_id: delivery.order_id,
                status: status.as_str().to_string(),
                updated_at: now,
            },
        )
        .await?;

        let tracking_number = delivery.tracking_number.clone().unwrap_or_default();
        match status {
            DeliveryStatus::Shipped => {
                publish_event(
                    self.broker.as_ref(),
                    &DeliveryStarted {
                        delivery_id: delivery.id,
                        order_id: delivery.order_id,
                        user_id: delivery.user_id,
                        tracking_number,
                        started_at: now,
                    },
                )
                .await?;
            },
            DeliveryStatus::Delivered => {
                publish_event(
                    self.broker.as_ref(),
                    &DeliveryCompleted {
                        delivery_id: delivery.id,
                        order_id: delivery.order_id,
                        user_id: delivery.user_id,
                        tracking_number,
                        completed_at: now,
                    },
                )
                .await?;
            },
            _ => {},
        }

        tracing::info!(delivery = %id, from = %previous, to = %status, "Delivery status updated");
        Ok(delivery)
    }

    fn generate_tracking_number(&self) -> String {
        let date = self.clock.now().format("%Y%m%d");
        let suffix: String = uuid::Uuid::new_v4()
            .simple()
            .to_string()
            .chars()
            .take(8)
            .collect::<String>()
            .to_uppercase();
        format!("DEL-{date}-{suffix}")
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)] // Panics: assertions in tests
mod tests {
    use super::*;
    use crate::repository::InMemoryDeliveryRepository;
    use bazaar_contracts::routing::exchanges;
    use bazaar_core::event::Event;
    use bazaar_core::topology::Topology;
    use bazaar_testing::{InMemoryBroker, test_clock};

    struct Fixture {
        broker: Arc<InMemoryBroker>,
        service: DeliveryService,
    }

    async fn fixture() -> Fixture {
        let broker = Arc::new(InMemoryBroker::new());
        broker
            .declare_topology(
                &Topology::new()
                    .exchange(exchanges::DELIVERY_EVENTS)
                    .queue("probe.delivery.events")
                    .bind("probe.delivery.events", exchanges::DELIVERY_EVENTS, "delivery.#"),
            )
            .await
            .expect("topology should declare");

        let service = DeliveryService::new(
            Arc::new(InMemoryDeliveryRepository::new()),
            broker.clone(),
            Arc::new(test_clock()),
        );

        Fixture { broker, service }
    }

    async fn shipped_delivery(f: &Fixture) -> Delivery {
        let delivery = f
            .service
            .create_delivery(OrderId::new(), UserId::new(), "1 Market St".to_string())
            .await
            .unwrap();
        f.service
            .update_status(delivery.id, DeliveryStatus::Preparing)
            .await
            .unwrap();
        f.service
            .update_status(delivery.id, DeliveryStatus::Shipped)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn creation_publishes_nothing() {
        let f = fixture().await;
        let delivery = f
            .service
            .create_delivery(OrderId::new(), UserId::new(), "1 Market St".to_string())
            .await
            .unwrap();

        assert_eq!(delivery.status, DeliveryStatus::Pending);
        assert!(f.broker.peek_queue("probe.delivery.events").is_empty());
    }

    #[tokio::test]
    async fn every_transition_publishes_a_status_update() {
        let f = fixture().await;
        let delivery = f
            .service
            .create_delivery(OrderId::new(), UserId::new(), "1 Market St".to_string())
            .await
            .unwrap();

        f.service
            .update_status(delivery.id, DeliveryStatus::Preparing)
            .await
            .unwrap();

        let published = f.broker.peek_queue("probe.delivery.events");
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].routing_key, "delivery.status.preparing");
    }

    #[tokio::test]
    async fn shipping_assigns_tracking_number_and_publishes_started() {
        let f = fixture().await;
        let shipped = shipped_delivery(&f).await;

        let tracking = shipped.tracking_number.clone().unwrap();
        assert!(tracking.starts_with("DEL-20250101-"));
        assert_eq!(tracking.len(), "DEL-20250101-".len() + 8);

        let published = f.broker.peek_queue("probe.delivery.events");
        let keys: Vec<&str> = published.iter().map(|e| e.routing_key.as_str()).collect();
        assert_eq!(
            keys,
            vec![
                "delivery.status.preparing",
                "delivery.status.shipped",
                "delivery.started"
            ]
        );

        let started = DeliveryStarted::from_bytes(&published[2].body).unwrap();
        assert_eq!(started.tracking_number, tracking);
    }

    #[tokio::test]
    async fn delivering_publishes_completed_with_tracking_number() {
        let f = fixture().await;
        let shipped = shipped_delivery(&f).await;

        f.service
            .update_status(shipped.id, DeliveryStatus::Delivered)
            .await
            .unwrap();

        let published = f.broker.peek_queue("probe.delivery.events");
        let last = published.last().unwrap();
        assert_eq!(last.routing_key, "delivery.completed");
        let completed = DeliveryCompleted::from_bytes(&last.body).unwrap();
        assert_eq!(completed.tracking_number, shipped.tracking_number.unwrap());
    }

    #[tokio::test]
    async fn skipping_the_chain_is_rejected() {
        let f = fixture().await;
        let delivery = f
            .service
            .create_delivery(OrderId::new(), UserId::new(), "1 Market St".to_string())
            .await
            .unwrap();

        let result = f
            .service
            .update_status(delivery.id, DeliveryStatus::Delivered)
            .await;
        assert!(matches!(result, Err(DeliveryError::InvalidTransition { .. })));
        assert!(f.broker.peek_queue("probe.delivery.events").is_empty());
    }

    #[tokio::test]
    async fn cancel_works_from_any_non_terminal_state() {
        let f = fixture().await;
        let shipped = shipped_delivery(&f).await;

        let canceled = f
            .service
            .update_status(shipped.id, DeliveryStatus::Canceled)
            .await
            .unwrap();
        assert_eq!(canceled.status, DeliveryStatus::Canceled);

        let result = f
            .service
            .update_status(shipped.id, DeliveryStatus::Delivered)
            .await;
        assert!(matches!(result, Err(DeliveryError::InvalidTransition { .. })));
    }
}
