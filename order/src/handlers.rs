//! Event handlers and consumer wiring for the order service.
//!
//! One handler per (service, event type) pair. Handlers mutate local state
//! through [`OrderService`] and never call another service; a missing order
//! or a disallowed transition is logged and the message dropped, while
//! infrastructure failures requeue within the redelivery cap.

use crate::catalog::ProductCatalog;
use crate::checkout;
use crate::domain::OrderStatus;
use crate::service::{OrderError, OrderService};
use bazaar_contracts::routing::{exchanges, keys};
use bazaar_contracts::{DeliveryStatusUpdated, PaymentCompleted, PaymentFailed, PaymentRefunded};
use bazaar_core::broker::Broker;
use bazaar_core::topology::{PatternError, Topology};
use bazaar_runtime::consumer::{Consumer, HandlerError, ScopeFactory};
use bazaar_runtime::idempotency::IdempotencyStore;
use std::sync::Arc;

/// Queue carrying payment lifecycle events into the order service.
pub const PAYMENT_EVENTS_QUEUE: &str = "order.payment.events";

/// Dead-letter queue for [`PAYMENT_EVENTS_QUEUE`].
pub const PAYMENT_EVENTS_DLQ: &str = "order.payment.events.dlq";

/// Queue carrying delivery status events into the order service.
pub const DELIVERY_EVENTS_QUEUE: &str = "order.delivery.events";

/// Dead-letter queue for [`DELIVERY_EVENTS_QUEUE`].
pub const DELIVERY_EVENTS_DLQ: &str = "order.delivery.events.dlq";

/// The topology the order service declares at startup.
///
/// Declares its own publish exchange alongside the exchanges it consumes
/// from, the checkout command queue, and the checkout error channel.
#[must_use]
pub fn topology() -> Topology {
    Topology::new()
        .exchange(exchanges::ORDER_EVENTS)
        .exchange(exchanges::PAYMENT_EVENTS)
        .exchange(exchanges::DELIVERY_EVENTS)
        .queue_with_dead_letter(PAYMENT_EVENTS_QUEUE, PAYMENT_EVENTS_DLQ)
        .queue_with_dead_letter(DELIVERY_EVENTS_QUEUE, DELIVERY_EVENTS_DLQ)
        .queue_with_dead_letter(checkout::CHECKOUT_QUEUE, checkout::CHECKOUT_DLQ)
        .queue(checkout::CHECKOUT_ERROR_QUEUE)
        .bind(PAYMENT_EVENTS_QUEUE, exchanges::PAYMENT_EVENTS, keys::PAYMENT_COMPLETED)
        .bind(PAYMENT_EVENTS_QUEUE, exchanges::PAYMENT_EVENTS, keys::PAYMENT_FAILED)
        .bind(PAYMENT_EVENTS_QUEUE, exchanges::PAYMENT_EVENTS, keys::PAYMENT_REFUNDED)
        .bind(DELIVERY_EVENTS_QUEUE, exchanges::DELIVERY_EVENTS, "delivery.status.*")
}

/// Per-message scope for order handlers.
#[derive(Clone)]
pub struct OrderScope {
    /// The order service object.
    pub orders: Arc<OrderService>,
    /// Catalog lookup for checkout validation.
    pub catalog: Arc<dyn ProductCatalog>,
    /// Broker handle for side-channel publishes.
    pub broker: Arc<dyn Broker>,
}

/// Builds a fresh [`OrderScope`] per message.
pub struct OrderScopeFactory {
    orders: Arc<OrderService>,
    catalog: Arc<dyn ProductCatalog>,
    broker: Arc<dyn Broker>,
}

impl OrderScopeFactory {
    /// Capture the collaborators handlers resolve per message.
    pub fn new(
        orders: Arc<OrderService>,
        catalog: Arc<dyn ProductCatalog>,
        broker: Arc<dyn Broker>,
    ) -> Self {
        Self {
            orders,
            catalog,
            broker,
        }
    }
}

impl ScopeFactory for OrderScopeFactory {
    type Scope = OrderScope;

    fn create_scope(&self) -> OrderScope {
        OrderScope {
            orders: Arc::clone(&self.orders),
            catalog: Arc::clone(&self.catalog),
            broker: Arc::clone(&self.broker),
        }
    }
}

fn apply_transition_outcome(result: Result<crate::domain::Order, OrderError>) -> Result<(), HandlerError> {
    match result {
        Ok(_) => Ok(()),
        Err(OrderError::NotFound(order)) => {
            tracing::warn!(order = %order, "Order not found, skipping status update");
            Ok(())
        },
        Err(err @ OrderError::InvalidTransition { .. }) => {
            tracing::warn!(error = %err, "Skipping disallowed order transition");
            Ok(())
        },
        Err(err) => Err(HandlerError::retry(err)),
    }
}

/// `payment.completed` → order becomes Paid.
///
/// # Errors
///
/// Only infrastructure failures are returned (and requeued); business-rule
/// violations are logged and dropped.
pub async fn handle_payment_completed(
    scope: OrderScope,
    event: PaymentCompleted,
) -> Result<(), HandlerError> {
    tracing::info!(
        order = %event.order_id,
        payment = %event.payment_id,
        "Received payment completed event"
    );
    apply_transition_outcome(scope.orders.update_status(event.order_id, OrderStatus::Paid).await)
}

/// `payment.failed` → order becomes Unpaid.
///
/// # Errors
///
/// Only infrastructure failures are returned (and requeued).
pub async fn handle_payment_failed(
    scope: OrderScope,
    event: PaymentFailed,
) -> Result<(), HandlerError> {
    tracing::info!(
        order = %event.order_id,
        payment = %event.payment_id,
        error = %event.error_message,
        "Received payment failed event"
    );
    apply_transition_outcome(scope.orders.update_status(event.order_id, OrderStatus::Unpaid).await)
}

/// `payment.refunded` → order becomes Refunded.
///
/// # Errors
///
/// Only infrastructure failures are returned (and requeued).
pub async fn handle_payment_refunded(
    scope: OrderScope,
    event: PaymentRefunded,
) -> Result<(), HandlerError> {
    tracing::info!(
        order = %event.order_id,
        payment = %event.payment_id,
        "Received payment refunded event"
    );
    apply_transition_outcome(scope.orders.update_status(event.order_id, OrderStatus::Refunded).await)
}

/// `delivery.status.*` → order follows the delivery state.
///
/// Unknown delivery statuses leave the order unchanged: an explicit
/// fallback, not an error.
///
/// # Errors
///
/// Only infrastructure failures are returned (and requeued).
pub async fn handle_delivery_status_updated(
    scope: OrderScope,
    event: DeliveryStatusUpdated,
) -> Result<(), HandlerError> {
    tracing::info!(
        order = %event.order_id,
        delivery = %event.delivery_id,
        status = %event.status,
        "Received delivery status event"
    );

    let Some(next) = OrderStatus::from_delivery_status(&event.status) else {
        tracing::info!(
            order = %event.order_id,
            status = %event.status,
            "Unknown delivery status, leaving order unchanged"
        );
        return Ok(());
    };

    apply_transition_outcome(scope.orders.update_status(event.order_id, next).await)
}

/// Build the order service's consumers, ready to spawn.
///
/// # Errors
///
/// Returns [`PatternError`] if a handler binding pattern fails to parse,
/// a wiring-time configuration error.
pub fn consumers(
    orders: Arc<OrderService>,
    catalog: Arc<dyn ProductCatalog>,
    broker: Arc<dyn Broker>,
    idempotency: Arc<dyn IdempotencyStore>,
) -> Result<Vec<Consumer<OrderScopeFactory>>, PatternError> {
    let factory = || {
        OrderScopeFactory::new(Arc::clone(&orders), Arc::clone(&catalog), Arc::clone(&broker))
    };

    let payment_events = Consumer::new(PAYMENT_EVENTS_QUEUE, factory())
        .with_idempotency(Arc::clone(&idempotency))
        .on(keys::PAYMENT_COMPLETED, handle_payment_completed)?
        .on(keys::PAYMENT_FAILED, handle_payment_failed)?
        .on(keys::PAYMENT_REFUNDED, handle_payment_refunded)?;

    let delivery_events = Consumer::new(DELIVERY_EVENTS_QUEUE, factory())
        .with_idempotency(idempotency)
        .on("delivery.status.*", handle_delivery_status_updated)?;

    let cart_checkout = Consumer::new(checkout::CHECKOUT_QUEUE, factory())
        .on(keys::CART_CHECKOUT, checkout::handle_cart_checkout)?;

    Ok(vec![payment_events, delivery_events, cart_checkout])
}
