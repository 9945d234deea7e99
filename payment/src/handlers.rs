//! Event handlers and consumer wiring for the payment service.

use crate::service::PaymentService;
use bazaar_contracts::OrderCreated;
use bazaar_contracts::routing::{exchanges, keys};
use bazaar_core::topology::{PatternError, Topology};
use bazaar_runtime::consumer::{Consumer, HandlerError, ScopeFactory};
use bazaar_runtime::idempotency::IdempotencyStore;
use std::sync::Arc;

/// Queue carrying order events into the payment service.
pub const ORDER_EVENTS_QUEUE: &str = "payment.order.events";

/// Dead-letter queue for [`ORDER_EVENTS_QUEUE`].
pub const ORDER_EVENTS_DLQ: &str = "payment.order.events.dlq";

/// The topology the payment service declares at startup.
#[must_use]
pub fn topology() -> Topology {
    Topology::new()
        .exchange(exchanges::ORDER_EVENTS)
        .exchange(exchanges::PAYMENT_EVENTS)
        .queue_with_dead_letter(ORDER_EVENTS_QUEUE, ORDER_EVENTS_DLQ)
        .bind(ORDER_EVENTS_QUEUE, exchanges::ORDER_EVENTS, keys::ORDER_CREATED)
}

/// Per-message scope for payment handlers.
#[derive(Clone)]
pub struct PaymentScope {
    /// The payment service object.
    pub payments: Arc<PaymentService>,
}

/// Builds a fresh [`PaymentScope`] per message.
pub struct PaymentScopeFactory {
    payments: Arc<PaymentService>,
}

impl PaymentScopeFactory {
    /// Capture the collaborators handlers resolve per message.
    pub fn new(payments: Arc<PaymentService>) -> Self {
        Self { payments }
    }
}

impl ScopeFactory for PaymentScopeFactory {
    type Scope = PaymentScope;

    fn create_scope(&self) -> PaymentScope {
        PaymentScope {
            payments: Arc::clone(&self.payments),
        }
    }
}

/// `order.created` → create a Pending payment and immediately process it.
///
/// A second `OrderCreated` for an order that already has a payment is a
/// warning no-op, the one tolerated duplicate.
///
/// # Errors
///
/// Storage and broker failures are returned as transient so the message
/// requeues within the redelivery cap.
pub async fn handle_order_created(
    scope: PaymentScope,
    event: OrderCreated,
) -> Result<(), HandlerError> {
    tracing::info!(
        order = %event.order_id,
        amount = %event.amount,
        "Received order created event"
    );

    let existing = scope
        .payments
        .payment_for_order(event.order_id)
        .await
        .map_err(HandlerError::retry)?;
    if let Some(payment) = existing {
        tracing::warn!(
            order = %event.order_id,
            payment = %payment.id,
            "Payment already exists for order, skipping"
        );
        return Ok(());
    }

    let payment = scope
        .payments
        .create_payment(event.order_id, event.amount)
        .await
        .map_err(HandlerError::retry)?;

    scope
        .payments
        .process_payment(payment.id)
        .await
        .map_err(HandlerError::retry)?;
    Ok(())
}

/// Build the payment service's consumers, ready to spawn.
///
/// # Errors
///
/// Returns [`PatternError`] if a handler binding pattern fails to parse.
pub fn consumers(
    payments: Arc<PaymentService>,
    idempotency: Arc<dyn IdempotencyStore>,
) -> Result<Vec<Consumer<PaymentScopeFactory>>, PatternError> {
    let order_events = Consumer::new(ORDER_EVENTS_QUEUE, PaymentScopeFactory::new(payments))
        .with_idempotency(idempotency)
        .on(keys::ORDER_CREATED, handle_order_created)?;

    Ok(vec![order_events])
}
