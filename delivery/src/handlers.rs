//! Event handlers and consumer wiring for the delivery service.

use crate::domain::DeliveryStatus;
use crate::service::{DeliveryError, DeliveryService};
use bazaar_contracts::routing::{exchanges, keys};
use bazaar_contracts::{OrderCreated, PaymentCompleted};
use bazaar_core::topology::{PatternError, Topology};
use bazaar_runtime::consumer::{Consumer, HandlerError, ScopeFactory};
use bazaar_runtime::idempotency::IdempotencyStore;
use std::sync::Arc;

/// Queue carrying order events into the delivery service.
pub const ORDER_EVENTS_QUEUE: &str = "delivery.order.events";

/// Dead-letter queue for [`ORDER_EVENTS_QUEUE`].
pub const ORDER_EVENTS_DLQ: &str = "delivery.order.events.dlq";

/// Queue carrying payment events into the delivery service.
pub const PAYMENT_EVENTS_QUEUE: &str = "delivery.payment.events";

/// Dead-letter queue for [`PAYMENT_EVENTS_QUEUE`].
pub const PAYMENT_EVENTS_DLQ: &str = "delivery.payment.events.dlq";

/// The topology the delivery service declares at startup.
#[must_use]
pub fn topology() -> Topology {
    Topology::new()
        .exchange(exchanges::ORDER_EVENTS)
        .exchange(exchanges::PAYMENT_EVENTS)
        .exchange(exchanges::DELIVERY_EVENTS)
        .queue_with_dead_letter(ORDER_EVENTS_QUEUE, ORDER_EVENTS_DLQ)
        .queue_with_dead_letter(PAYMENT_EVENTS_QUEUE, PAYMENT_EVENTS_DLQ)
        .bind(ORDER_EVENTS_QUEUE, exchanges::ORDER_EVENTS, keys::ORDER_CREATED)
        .bind(PAYMENT_EVENTS_QUEUE, exchanges::PAYMENT_EVENTS, keys::PAYMENT_COMPLETED)
}

/// Per-message scope for delivery handlers.
#[derive(Clone)]
pub struct DeliveryScope {
    /// The delivery service object.
    pub deliveries: Arc<DeliveryService>,
}

/// Builds a fresh [`DeliveryScope`] per message.
pub struct DeliveryScopeFactory {
    deliveries: Arc<DeliveryService>,
}

impl DeliveryScopeFactory {
    /// Capture the collaborators handlers resolve per message.
    pub fn new(deliveries: Arc<DeliveryService>) -> Self {
        Self { deliveries }
    }
}

impl ScopeFactory for DeliveryScopeFactory {
    type Scope = DeliveryScope;

    fn create_scope(&self) -> DeliveryScope {
        DeliveryScope {
            deliveries: Arc::clone(&self.deliveries),
        }
    }
}

/// `order.created` → create a Pending delivery for the order.
///
/// # Errors
///
/// Storage failures are returned as transient so the message requeues.
pub async fn handle_order_created(
    scope: DeliveryScope,
    event: OrderCreated,
) -> Result<(), HandlerError> {
    tracing::info!(order = %event.order_id, "Received order created event");

    scope
        .deliveries
        .create_delivery(event.order_id, event.user_id, event.delivery_address)
        .await
        .map_err(HandlerError::retry)?;
    Ok(())
}

/// `payment.completed` → advance the matching delivery to Preparing.
///
/// A missing delivery is a warning no-op: the order-created event may not
/// have been processed yet, and the payment event alone cannot conjure the
/// aggregate.
///
/// # Errors
///
/// Infrastructure failures are returned as transient so the message
/// requeues; disallowed transitions are logged and dropped.
pub async fn handle_payment_completed(
    scope: DeliveryScope,
    event: PaymentCompleted,
) -> Result<(), HandlerError> {
    tracing::info!(order = %event.order_id, "Received payment completed event");

    let Some(delivery) = scope
        .deliveries
        .delivery_for_order(event.order_id)
        .await
        .map_err(HandlerError::retry)?
    else {
        tracing::warn!(order = %event.order_id, "No delivery found for order, skipping");
        return Ok(());
    };

    match scope
        .deliveries
        .update_status(delivery.id, DeliveryStatus::Preparing)
        .await
    {
        Ok(_) => Ok(()),
        Err(err @ DeliveryError::InvalidTransition { .. }) => {
            tracing::warn!(error = %err, "Skipping disallowed delivery transition");
            Ok(())
        },
        Err(err) => Err(HandlerError::retry(err)),
    }
}

/// Build the delivery service's consumers, ready to spawn.
///
/// # Errors
///
/// Returns [`PatternError`] if a handler binding pattern fails to parse.
pub fn consumers(
    deliveries: Arc<DeliveryService>,
    idempotency: Arc<dyn IdempotencyStore>,
) -> Result<Vec<Consumer<DeliveryScopeFactory>>, PatternError> {
    let order_events = Consumer::new(
        ORDER_EVENTS_QUEUE,
        DeliveryScopeFactory::new(Arc::clone(&deliveries)),
    )
    .with_idempotency(Arc::clone(&idempotency))
    .on(keys::ORDER_CREATED, handle_order_created)?;

    let payment_events = Consumer::new(
        PAYMENT_EVENTS_QUEUE,
        DeliveryScopeFactory::new(deliveries),
    )
    .with_idempotency(idempotency)
    .on(keys::PAYMENT_COMPLETED, handle_payment_completed)?;

    Ok(vec![order_events, payment_events])
}
