//! Order aggregate and its status state machine.

use bazaar_contracts::{Money, OrderId, ProductId, UserId};
use chrono::{DateTime, Utc};
use std::fmt;

/// Order lifecycle status.
///
/// Transitions are one-way and enumerated by
/// [`can_transition_to`](OrderStatus::can_transition_to); everything else is
/// a business-rule violation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OrderStatus {
    /// Initial placeholder before the order is accepted.
    Created,
    /// Accepted and awaiting payment.
    Pending,
    /// Payment completed.
    Paid,
    /// Payment failed; terminal.
    Unpaid,
    /// Delivery is being prepared.
    PreparingForDelivery,
    /// Delivery is underway.
    Shipped,
    /// Delivery reached the customer; terminal.
    Delivered,
    /// Cancelled before completion; terminal.
    Cancelled,
    /// Payment refunded after completion; terminal.
    Refunded,
}

impl OrderStatus {
    /// Stable name used on the wire and in logs.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "Created",
            Self::Pending => "Pending",
            Self::Paid => "Paid",
            Self::Unpaid => "Unpaid",
            Self::PreparingForDelivery => "PreparingForDelivery",
            Self::Shipped => "Shipped",
            Self::Delivered => "Delivered",
            Self::Cancelled => "Cancelled",
            Self::Refunded => "Refunded",
        }
    }

    /// Whether no further transition leaves this status.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Unpaid | Self::Delivered | Self::Cancelled | Self::Refunded
        )
    }

    /// Whether the state machine permits moving to `next`.
    #[must_use]
    pub const fn can_transition_to(&self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Created, Self::Pending)
                | (Self::Pending, Self::Paid | Self::Unpaid)
                | (Self::Paid, Self::PreparingForDelivery | Self::Refunded)
                | (Self::PreparingForDelivery, Self::Shipped)
                | (Self::Shipped, Self::Delivered)
                | (
                    Self::Pending | Self::Paid | Self::PreparingForDelivery | Self::Shipped,
                    Self::Cancelled
                )
        )
    }

    /// Map a delivery-service status string onto an order status.
    ///
    /// Unknown strings return `None`: the order is left unchanged, an
    /// explicit fallback rather than an error.
    #[must_use]
    pub fn from_delivery_status(status: &str) -> Option<Self> {
        match status {
            "Preparing" => Some(Self::PreparingForDelivery),
            "Shipped" => Some(Self::Shipped),
            "Delivered" => Some(Self::Delivered),
            "Canceled" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One ordered line with catalog snapshots taken at creation time.
///
/// Name and unit price are copies, not references: a later catalog price
/// change never alters an existing order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OrderItem {
    /// Catalog product key.
    pub product_id: ProductId,
    /// Product name snapshot.
    pub product_name: String,
    /// Unit price snapshot.
    pub unit_price: Money,
    /// Ordered quantity.
    pub quantity: u32,
}

impl OrderItem {
    /// Line extension: unit price times quantity.
    #[must_use]
    pub const fn extension(&self) -> Money {
        self.unit_price.times(self.quantity)
    }
}

/// The order aggregate.
#[derive(Clone, Debug, PartialEq)]
pub struct Order {
    /// Opaque id.
    pub id: OrderId,
    /// Owning user.
    pub user_id: UserId,
    /// Address the order ships to.
    pub delivery_address: String,
    /// Current lifecycle status.
    pub status: OrderStatus,
    /// Ordered lines with creation-time snapshots.
    pub items: Vec<OrderItem>,
    /// Sum of line extensions at creation time; never recomputed.
    pub total_price: Money,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last mutation timestamp.
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_transitions_are_permitted() {
        use OrderStatus as S;
        for (from, to) in [
            (S::Created, S::Pending),
            (S::Pending, S::Paid),
            (S::Paid, S::PreparingForDelivery),
            (S::PreparingForDelivery, S::Shipped),
            (S::Shipped, S::Delivered),
        ] {
            assert!(from.can_transition_to(to), "{from} -> {to}");
        }
    }

    #[test]
    fn failure_branches_are_permitted() {
        assert!(OrderStatus::Pending.can_transition_to(OrderStatus::Unpaid));
        assert!(OrderStatus::Paid.can_transition_to(OrderStatus::Refunded));
    }

    #[test]
    fn cancellation_is_reachable_from_active_states_only() {
        use OrderStatus as S;
        for from in [S::Pending, S::Paid, S::PreparingForDelivery, S::Shipped] {
            assert!(from.can_transition_to(S::Cancelled), "{from} -> Cancelled");
        }
        for from in [S::Unpaid, S::Delivered, S::Cancelled, S::Refunded, S::Created] {
            assert!(!from.can_transition_to(S::Cancelled), "{from} -> Cancelled");
        }
    }

    #[test]
    fn backwards_and_skipping_transitions_are_rejected() {
        assert!(!OrderStatus::Paid.can_transition_to(OrderStatus::Pending));
        assert!(!OrderStatus::Pending.can_transition_to(OrderStatus::Shipped));
        assert!(!OrderStatus::Delivered.can_transition_to(OrderStatus::Paid));
    }

    #[test]
    fn delivery_statuses_map_onto_order_statuses() {
        assert_eq!(
            OrderStatus::from_delivery_status("Preparing"),
            Some(OrderStatus::PreparingForDelivery)
        );
        assert_eq!(
            OrderStatus::from_delivery_status("Canceled"),
            Some(OrderStatus::Cancelled)
        );
        assert_eq!(OrderStatus::from_delivery_status("Teleported"), None);
    }

    #[test]
    fn line_extension_multiplies_price_by_quantity() {
        let item = OrderItem {
            product_id: ProductId::new(1),
            product_name: "Teapot".to_string(),
            unit_price: Money::from_cents(2_50),
            quantity: 4,
        };
        assert_eq!(item.extension(), Money::from_cents(10_00));
    }
}
