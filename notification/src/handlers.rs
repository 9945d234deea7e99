//! Event handlers and consumer wiring for the notification service.
//!
//! Pure fan-in: every handled event produces one notification record for
//! the owning user. Events without a user id on board resolve it through
//! the order lookup; a failed or empty lookup skips the notification
//! (logged, acknowledged, never retried).

use crate::order_lookup::OrderLookup;
use crate::service::NotificationService;
use bazaar_contracts::routing::{exchanges, keys};
use bazaar_contracts::{
    DeliveryCompleted, DeliveryStarted, DeliveryStatusUpdated, OrderCreated, OrderId,
    OrderStatusChanged, PaymentCompleted, PaymentFailed, PaymentRefunded, UserId,
};
use bazaar_core::topology::{PatternError, Topology};
use bazaar_runtime::consumer::{Consumer, HandlerError, ScopeFactory};
use bazaar_runtime::idempotency::IdempotencyStore;
use std::sync::Arc;

/// Queue carrying order events into the notification service.
pub const ORDER_EVENTS_QUEUE: &str = "notification.order.events";

/// Dead-letter queue for [`ORDER_EVENTS_QUEUE`].
pub const ORDER_EVENTS_DLQ: &str = "notification.order.events.dlq";

/// Queue carrying payment events into the notification service.
pub const PAYMENT_EVENTS_QUEUE: &str = "notification.payment.events";

/// Dead-letter queue for [`PAYMENT_EVENTS_QUEUE`].
pub const PAYMENT_EVENTS_DLQ: &str = "notification.payment.events.dlq";

/// Queue carrying delivery events into the notification service.
pub const DELIVERY_EVENTS_QUEUE: &str = "notification.delivery.events";

/// Dead-letter queue for [`DELIVERY_EVENTS_QUEUE`].
pub const DELIVERY_EVENTS_DLQ: &str = "notification.delivery.events.dlq";

/// The topology the notification service declares at startup.
#[must_use]
pub fn topology() -> Topology {
    Topology::new()
        .exchange(exchanges::ORDER_EVENTS)
        .exchange(exchanges::PAYMENT_EVENTS)
        .exchange(exchanges::DELIVERY_EVENTS)
        .queue_with_dead_letter(ORDER_EVENTS_QUEUE, ORDER_EVENTS_DLQ)
        .queue_with_dead_letter(PAYMENT_EVENTS_QUEUE, PAYMENT_EVENTS_DLQ)
        .queue_with_dead_letter(DELIVERY_EVENTS_QUEUE, DELIVERY_EVENTS_DLQ)
        .bind(ORDER_EVENTS_QUEUE, exchanges::ORDER_EVENTS, keys::ORDER_CREATED)
        .bind(ORDER_EVENTS_QUEUE, exchanges::ORDER_EVENTS, "order.status.*")
        .bind(PAYMENT_EVENTS_QUEUE, exchanges::PAYMENT_EVENTS, keys::PAYMENT_COMPLETED)
        .bind(PAYMENT_EVENTS_QUEUE, exchanges::PAYMENT_EVENTS, keys::PAYMENT_FAILED)
        .bind(PAYMENT_EVENTS_QUEUE, exchanges::PAYMENT_EVENTS, keys::PAYMENT_REFUNDED)
        .bind(DELIVERY_EVENTS_QUEUE, exchanges::DELIVERY_EVENTS, keys::DELIVERY_STARTED)
        .bind(DELIVERY_EVENTS_QUEUE, exchanges::DELIVERY_EVENTS, keys::DELIVERY_COMPLETED)
        .bind(DELIVERY_EVENTS_QUEUE, exchanges::DELIVERY_EVENTS, "delivery.status.*")
}

/// Per-message scope for notification handlers.
#[derive(Clone)]
pub struct NotificationScope {
    /// The notification service object.
    pub notifications: Arc<NotificationService>,
    /// Synchronous lookup to the order service.
    pub orders: Arc<dyn OrderLookup>,
}

/// Builds a fresh [`NotificationScope`] per message.
pub struct NotificationScopeFactory {
    notifications: Arc<NotificationService>,
    orders: Arc<dyn OrderLookup>,
}

impl NotificationScopeFactory {
    /// Capture the collaborators handlers resolve per message.
    pub fn new(notifications: Arc<NotificationService>, orders: Arc<dyn OrderLookup>) -> Self {
        Self {
            notifications,
            orders,
        }
    }
}

impl ScopeFactory for NotificationScopeFactory {
    type Scope = NotificationScope;

    fn create_scope(&self) -> NotificationScope {
        NotificationScope {
            notifications: Arc::clone(&self.notifications),
            orders: Arc::clone(&self.orders),
        }
    }
}

/// Resolve the owning user through the order service, skipping on failure.
async fn user_for_order(scope: &NotificationScope, order_id: OrderId) -> Option<UserId> {
    match scope.orders.order_info(order_id).await {
        Ok(Some(info)) => Some(info.user_id),
        Ok(None) => {
            tracing::warn!(order = %order_id, "Order info not found, skipping notification");
            None
        },
        Err(err) => {
            tracing::warn!(
                order = %order_id,
                error = %err,
                "Order lookup failed, skipping notification"
            );
            None
        },
    }
}

async fn create(
    scope: &NotificationScope,
    user_id: UserId,
    order_id: OrderId,
    title: &str,
    body: &str,
    kind: &str,
) -> Result<(), HandlerError> {
    scope
        .notifications
        .create_notification(user_id, order_id, title, body, kind)
        .await
        .map_err(HandlerError::retry)?;
    Ok(())
}

/// `order.created` → "Order created" notification.
///
/// # Errors
///
/// Storage failures are returned as transient so the message requeues.
pub async fn handle_order_created(
    scope: NotificationScope,
    event: OrderCreated,
) -> Result<(), HandlerError> {
    let body = format!(
        "Order {} has been created, total {}",
        event.order_id, event.total_price
    );
    create(
        &scope,
        event.user_id,
        event.order_id,
        "Order created",
        &body,
        "OrderCreated",
    )
    .await
}

/// `order.status.*` → "Order status updated" notification.
///
/// # Errors
///
/// Storage failures are returned as transient so the message requeues.
pub async fn handle_order_status_changed(
    scope: NotificationScope,
    event: OrderStatusChanged,
) -> Result<(), HandlerError> {
    let body = format!(
        "Order {} status changed to {}",
        event.order_id, event.status
    );
    create(
        &scope,
        event.user_id,
        event.order_id,
        "Order status updated",
        &body,
        "OrderStatusChanged",
    )
    .await
}

/// `payment.completed` → "Payment completed" notification for the order's
/// owner, resolved through the order lookup.
///
/// # Errors
///
/// Storage failures are returned as transient so the message requeues;
/// lookup failures skip the notification.
pub async fn handle_payment_completed(
    scope: NotificationScope,
    event: PaymentCompleted,
) -> Result<(), HandlerError> {
    let Some(user_id) = user_for_order(&scope, event.order_id).await else {
        return Ok(());
    };
    let body = format!(
        "Payment for order {} in the amount of {} completed successfully",
        event.order_id, event.amount
    );
    create(
        &scope,
        user_id,
        event.order_id,
        "Payment completed",
        &body,
        "PaymentCompleted",
    )
    .await
}

/// `payment.failed` → "Payment failed" notification.
///
/// # Errors
///
/// Storage failures are returned as transient so the message requeues;
/// lookup failures skip the notification.
pub async fn handle_payment_failed(
    scope: NotificationScope,
    event: PaymentFailed,
) -> Result<(), HandlerError> {
    let Some(user_id) = user_for_order(&scope, event.order_id).await else {
        return Ok(());
    };
    let body = format!(
        "Payment for order {} in the amount of {} failed: {}",
        event.order_id, event.amount, event.error_message
    );
    create(
        &scope,
        user_id,
        event.order_id,
        "Payment failed",
        &body,
        "PaymentFailed",
    )
    .await
}

/// `payment.refunded` → "Payment refunded" notification.
///
/// # Errors
///
/// Storage failures are returned as transient so the message requeues;
/// lookup failures skip the notification.
pub async fn handle_payment_refunded(
    scope: NotificationScope,
    event: PaymentRefunded,
) -> Result<(), HandlerError> {
    let Some(user_id) = user_for_order(&scope, event.order_id).await else {
        return Ok(());
    };
    let body = format!(
        "Funds for order {} in the amount of {} have been refunded",
        event.order_id, event.amount
    );
    create(
        &scope,
        user_id,
        event.order_id,
        "Payment refunded",
        &body,
        "PaymentRefunded",
    )
    .await
}

/// `delivery.started` → "Delivery started" notification (user id on the
/// event).
///
/// # Errors
///
/// Storage failures are returned as transient so the message requeues.
pub async fn handle_delivery_started(
    scope: NotificationScope,
    event: DeliveryStarted,
) -> Result<(), HandlerError> {
    let body = format!(
        "Order {} has shipped, tracking number {}",
        event.order_id, event.tracking_number
    );
    create(
        &scope,
        event.user_id,
        event.order_id,
        "Delivery started",
        &body,
        "DeliveryStarted",
    )
    .await
}

/// `delivery.completed` → "Delivery completed" notification.
///
/// # Errors
///
/// Storage failures are returned as transient so the message requeues.
pub async fn handle_delivery_completed(
    scope: NotificationScope,
    event: DeliveryCompleted,
) -> Result<(), HandlerError> {
    let body = format!("Order {} has been delivered", event.order_id);
    create(
        &scope,
        event.user_id,
        event.order_id,
        "Delivery completed",
        &body,
        "DeliveryCompleted",
    )
    .await
}

/// `delivery.status.*` → "Delivery status updated" notification, owner
/// resolved through the order lookup.
///
/// # Errors
///
/// Storage failures are returned as transient so the message requeues;
/// lookup failures skip the notification.
pub async fn handle_delivery_status_updated(
    scope: NotificationScope,
    event: DeliveryStatusUpdated,
) -> Result<(), HandlerError> {
    let Some(user_id) = user_for_order(&scope, event.order_id).await else {
        return Ok(());
    };
    let body = format!(
        "Delivery for order {} is now {}",
        event.order_id, event.status
    );
    create(
        &scope,
        user_id,
        event.order_id,
        "Delivery status updated",
        &body,
        "DeliveryStatusUpdated",
    )
    .await
}

/// Build the notification service's consumers, ready to spawn.
///
/// Literal patterns are registered before overlapping wildcards so
/// `delivery.started` does not fall through to the status handler.
///
/// # Errors
///
/// Returns [`PatternError`] if a handler binding pattern fails to parse.
pub fn consumers(
    notifications: Arc<NotificationService>,
    orders: Arc<dyn OrderLookup>,
    idempotency: Arc<dyn IdempotencyStore>,
) -> Result<Vec<Consumer<NotificationScopeFactory>>, PatternError> {
    let factory =
        || NotificationScopeFactory::new(Arc::clone(&notifications), Arc::clone(&orders));

    let order_events = Consumer::new(ORDER_EVENTS_QUEUE, factory())
        .with_idempotency(Arc::clone(&idempotency))
        .on(keys::ORDER_CREATED, handle_order_created)?
        .on("order.status.*", handle_order_status_changed)?;

    let payment_events = Consumer::new(PAYMENT_EVENTS_QUEUE, factory())
        .with_idempotency(Arc::clone(&idempotency))
        .on(keys::PAYMENT_COMPLETED, handle_payment_completed)?
        .on(keys::PAYMENT_FAILED, handle_payment_failed)?
        .on(keys::PAYMENT_REFUNDED, handle_payment_refunded)?;

    let delivery_events = Consumer::new(DELIVERY_EVENTS_QUEUE, factory())
        .with_idempotency(idempotency)
        .on(keys::DELIVERY_STARTED, handle_delivery_started)?
        .on(keys::DELIVERY_COMPLETED, handle_delivery_completed)?
        .on("delivery.status.*", handle_delivery_status_updated)?;

    Ok(vec![order_events, payment_events, delivery_events])
}
