//! Domain event contracts.
//!
//! These are plain immutable records with no behavior beyond their routing
//! declarations. Field names are camelCase on the wire; every field also
//! accepts its PascalCase alias so payloads from publishers using
//! upper-camel conventions deserialize without a translation layer.
//!
//! Statuses travel as free strings. Consumers map them to their own domain
//! enums and are required to leave state untouched when a status string is
//! unknown to them.

use crate::ids::{DeliveryId, Money, OrderId, PaymentId, ProductId, UserId};
use crate::routing::{exchanges, keys};
use bazaar_core::event::Event;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Published by the order service when an order has been created and stock
/// validated.
///
/// `amount` duplicates `total_price`; both fields are kept because existing
/// consumers read either.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderCreated {
    /// The created order.
    #[serde(alias = "OrderId")]
    pub order_id: OrderId,
    /// Owner of the order.
    #[serde(alias = "UserId")]
    pub user_id: UserId,
    /// Address the order ships to.
    #[serde(alias = "DeliveryAddress")]
    pub delivery_address: String,
    /// Total price computed at creation time.
    #[serde(alias = "TotalPrice")]
    pub total_price: Money,
    /// Amount to charge; equals `total_price`.
    #[serde(alias = "Amount")]
    pub amount: Money,
}

impl Event for OrderCreated {
    fn event_type(&self) -> &'static str {
        "OrderCreated"
    }

    fn exchange(&self) -> &'static str {
        exchanges::ORDER_EVENTS
    }

    fn routing_key(&self) -> String {
        keys::ORDER_CREATED.to_string()
    }

    fn idempotency_key(&self) -> Option<String> {
        Some(format!("{}:OrderCreated", self.order_id))
    }
}

/// Published by the order service on every applied status transition.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderStatusChanged {
    /// The order whose status changed.
    #[serde(alias = "OrderId")]
    pub order_id: OrderId,
    /// Owner of the order.
    #[serde(alias = "UserId")]
    pub user_id: UserId,
    /// The new status, as the order service names it.
    #[serde(alias = "Status")]
    pub status: String,
    /// When the transition was applied.
    #[serde(alias = "ChangedAt")]
    pub changed_at: DateTime<Utc>,
}

impl Event for OrderStatusChanged {
    fn event_type(&self) -> &'static str {
        "OrderStatusChanged"
    }

    fn exchange(&self) -> &'static str {
        exchanges::ORDER_EVENTS
    }

    fn routing_key(&self) -> String {
        format!("{}.{}", keys::ORDER_STATUS_PREFIX, self.status.to_lowercase())
    }

    fn idempotency_key(&self) -> Option<String> {
        // Transitions are one-way, so (order, status) identifies one event.
        Some(format!("{}:OrderStatusChanged:{}", self.order_id, self.status))
    }
}

/// Published by the payment service when a charge succeeds.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentCompleted {
    /// The paid order.
    #[serde(alias = "OrderId")]
    pub order_id: OrderId,
    /// The completed payment.
    #[serde(alias = "PaymentId")]
    pub payment_id: PaymentId,
    /// Charged amount.
    #[serde(alias = "Amount")]
    pub amount: Money,
    /// When the charge completed.
    #[serde(alias = "CompletedAt")]
    pub completed_at: DateTime<Utc>,
}

impl Event for PaymentCompleted {
    fn event_type(&self) -> &'static str {
        "PaymentCompleted"
    }

    fn exchange(&self) -> &'static str {
        exchanges::PAYMENT_EVENTS
    }

    fn routing_key(&self) -> String {
        keys::PAYMENT_COMPLETED.to_string()
    }

    fn idempotency_key(&self) -> Option<String> {
        Some(format!("{}:PaymentCompleted", self.order_id))
    }
}

/// Published by the payment service when a charge fails.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentFailed {
    /// The order whose payment failed.
    #[serde(alias = "OrderId")]
    pub order_id: OrderId,
    /// The failed payment.
    #[serde(alias = "PaymentId")]
    pub payment_id: PaymentId,
    /// Amount that was attempted.
    #[serde(alias = "Amount")]
    pub amount: Money,
    /// When the failure was recorded.
    #[serde(alias = "FailedAt")]
    pub failed_at: DateTime<Utc>,
    /// Gateway-reported failure message.
    #[serde(alias = "ErrorMessage")]
    pub error_message: String,
}

impl Event for PaymentFailed {
    fn event_type(&self) -> &'static str {
        "PaymentFailed"
    }

    fn exchange(&self) -> &'static str {
        exchanges::PAYMENT_EVENTS
    }

    fn routing_key(&self) -> String {
        keys::PAYMENT_FAILED.to_string()
    }

    fn idempotency_key(&self) -> Option<String> {
        Some(format!("{}:PaymentFailed", self.order_id))
    }
}

/// Published by the payment service when a completed payment is refunded.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRefunded {
    /// The refunded order.
    #[serde(alias = "OrderId")]
    pub order_id: OrderId,
    /// The refunded payment.
    #[serde(alias = "PaymentId")]
    pub payment_id: PaymentId,
    /// Refunded amount.
    #[serde(alias = "Amount")]
    pub amount: Money,
    /// When the refund was applied.
    #[serde(alias = "RefundedAt")]
    pub refunded_at: DateTime<Utc>,
}

impl Event for PaymentRefunded {
    fn event_type(&self) -> &'static str {
        "PaymentRefunded"
    }

    fn exchange(&self) -> &'static str {
        exchanges::PAYMENT_EVENTS
    }

    fn routing_key(&self) -> String {
        keys::PAYMENT_REFUNDED.to_string()
    }

    fn idempotency_key(&self) -> Option<String> {
        Some(format!("{}:PaymentRefunded", self.order_id))
    }
}

/// Published by the delivery service on every delivery status transition.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryStatusUpdated {
    /// The delivery that transitioned.
    #[serde(alias = "DeliveryId")]
    pub delivery_id: DeliveryId,
    /// The order being delivered.
    #[serde(alias = "OrderId")]
    pub order_id: OrderId,
    /// The new status, as the delivery service names it.
    #[serde(alias = "Status")]
    pub status: String,
    /// When the transition was applied.
    #[serde(alias = "UpdatedAt")]
    pub updated_at: DateTime<Utc>,
}

impl Event for DeliveryStatusUpdated {
    fn event_type(&self) -> &'static str {
        "DeliveryStatusUpdated"
    }

    fn exchange(&self) -> &'static str {
        exchanges::DELIVERY_EVENTS
    }

    fn routing_key(&self) -> String {
        format!(
            "{}.{}",
            keys::DELIVERY_STATUS_PREFIX,
            self.status.to_lowercase()
        )
    }

    fn idempotency_key(&self) -> Option<String> {
        // Same event type repeats legitimately per delivery; the status
        // discriminates the one-shot transitions from each other.
        Some(format!(
            "{}:DeliveryStatusUpdated:{}",
            self.delivery_id, self.status
        ))
    }
}

/// Published by the delivery service when a delivery ships.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryStarted {
    /// The shipped delivery.
    #[serde(alias = "DeliveryId")]
    pub delivery_id: DeliveryId,
    /// The order being delivered.
    #[serde(alias = "OrderId")]
    pub order_id: OrderId,
    /// Owner of the order.
    #[serde(alias = "UserId")]
    pub user_id: UserId,
    /// Tracking number assigned at shipping time.
    #[serde(alias = "TrackingNumber")]
    pub tracking_number: String,
    /// When the delivery shipped.
    #[serde(alias = "StartedAt")]
    pub started_at: DateTime<Utc>,
}

impl Event for DeliveryStarted {
    fn event_type(&self) -> &'static str {
        "DeliveryStarted"
    }

    fn exchange(&self) -> &'static str {
        exchanges::DELIVERY_EVENTS
    }

    fn routing_key(&self) -> String {
        keys::DELIVERY_STARTED.to_string()
    }

    fn idempotency_key(&self) -> Option<String> {
        Some(format!("{}:DeliveryStarted", self.delivery_id))
    }
}

/// Published by the delivery service when a delivery reaches the customer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryCompleted {
    /// The completed delivery.
    #[serde(alias = "DeliveryId")]
    pub delivery_id: DeliveryId,
    /// The delivered order.
    #[serde(alias = "OrderId")]
    pub order_id: OrderId,
    /// Owner of the order.
    #[serde(alias = "UserId")]
    pub user_id: UserId,
    /// Tracking number of the completed shipment.
    #[serde(alias = "TrackingNumber")]
    pub tracking_number: String,
    /// When the delivery completed.
    #[serde(alias = "CompletedAt")]
    pub completed_at: DateTime<Utc>,
}

impl Event for DeliveryCompleted {
    fn event_type(&self) -> &'static str {
        "DeliveryCompleted"
    }

    fn exchange(&self) -> &'static str {
        exchanges::DELIVERY_EVENTS
    }

    fn routing_key(&self) -> String {
        keys::DELIVERY_COMPLETED.to_string()
    }

    fn idempotency_key(&self) -> Option<String> {
        Some(format!("{}:DeliveryCompleted", self.delivery_id))
    }
}

/// One line of a cart checkout request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartItem {
    /// Requested product.
    #[serde(alias = "ProductId")]
    pub product_id: ProductId,
    /// Requested quantity.
    #[serde(alias = "Quantity")]
    pub quantity: u32,
}

/// Command-style message from the cart service asking the order service to
/// turn a cart into an order.
///
/// Carries no idempotency key: checking out the same cart twice is two
/// orders, exactly as two clicks would be.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartCheckout {
    /// The user checking out.
    #[serde(alias = "UserId")]
    pub user_id: UserId,
    /// Address the order should ship to.
    #[serde(alias = "DeliveryAddress")]
    pub delivery_address: String,
    /// Cart contents.
    #[serde(alias = "Items")]
    pub items: Vec<CartItem>,
}

impl Event for CartCheckout {
    fn event_type(&self) -> &'static str {
        "CartCheckout"
    }

    fn exchange(&self) -> &'static str {
        exchanges::DEFAULT
    }

    fn routing_key(&self) -> String {
        keys::CART_CHECKOUT.to_string()
    }
}

/// Error-channel payload for checkout requests that fail stock validation.
///
/// Published instead of raising a synchronous error to the original caller;
/// the cart service consumes these to inform the user.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutFailed {
    /// The user whose checkout failed.
    #[serde(alias = "UserId")]
    pub user_id: UserId,
    /// Human-readable summary.
    #[serde(alias = "Error")]
    pub error: String,
    /// Per-item detail string.
    #[serde(alias = "Details")]
    pub details: String,
}

impl Event for CheckoutFailed {
    fn event_type(&self) -> &'static str {
        "CheckoutFailed"
    }

    fn exchange(&self) -> &'static str {
        exchanges::DEFAULT
    }

    fn routing_key(&self) -> String {
        keys::CART_CHECKOUT_ERROR.to_string()
    }
}
