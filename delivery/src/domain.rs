//! Delivery aggregate and its status state machine.

use bazaar_contracts::{DeliveryId, OrderId, UserId};
use chrono::{DateTime, Utc};
use std::fmt;

/// Delivery lifecycle status.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DeliveryStatus {
    /// Created, waiting for payment.
    Pending,
    /// Payment landed; delivery is being prepared.
    Preparing,
    /// Handed to the carrier; tracking number assigned.
    Shipped,
    /// Reached the customer; terminal.
    Delivered,
    /// Canceled before completion; terminal.
    Canceled,
}

impl DeliveryStatus {
    /// Stable name used on the wire and in logs.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Preparing => "Preparing",
            Self::Shipped => "Shipped",
            Self::Delivered => "Delivered",
            Self::Canceled => "Canceled",
        }
    }

    /// Parse a status name as used on the wire.
    #[must_use]
    pub fn parse(status: &str) -> Option<Self> {
        match status {
            "Pending" => Some(Self::Pending),
            "Preparing" => Some(Self::Preparing),
            "Shipped" => Some(Self::Shipped),
            "Delivered" => Some(Self::Delivered),
            "Canceled" => Some(Self::Canceled),
            _ => None,
        }
    }

    /// Whether no further transition leaves this status.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Delivered | Self::Canceled)
    }

    /// Whether the state machine permits moving to `next`.
    ///
    /// The chain is `Pending → Preparing → Shipped → Delivered`, with
    /// Canceled reachable from any non-terminal state.
    #[must_use]
    pub const fn can_transition_to(&self, next: Self) -> bool {
        if matches!(next, Self::Canceled) {
            return !self.is_terminal();
        }
        matches!(
            (self, next),
            (Self::Pending, Self::Preparing)
                | (Self::Preparing, Self::Shipped)
                | (Self::Shipped, Self::Delivered)
        )
    }
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The delivery aggregate.
#[derive(Clone, Debug, PartialEq)]
pub struct Delivery {
    /// Opaque id.
    pub id: DeliveryId,
    /// The order being delivered.
    pub order_id: OrderId,
    /// Owner of the order.
    pub user_id: UserId,
    /// Destination address.
    pub address: String,
    /// Current lifecycle status.
    pub status: DeliveryStatus,
    /// Assigned on the transition into Shipped.
    pub tracking_number: Option<String>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last transition timestamp.
    pub updated_at: Option<DateTime<Utc>>,
}

impl Delivery {
    /// Create a Pending delivery for an order.
    #[must_use]
    pub fn new(
        order_id: OrderId,
        user_id: UserId,
        address: String,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: DeliveryId::new(),
            order_id,
            user_id,
            address,
            status: DeliveryStatus::Pending,
            tracking_number: None,
            created_at,
            updated_at: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chain_transitions_are_permitted() {
        use DeliveryStatus as S;
        assert!(S::Pending.can_transition_to(S::Preparing));
        assert!(S::Preparing.can_transition_to(S::Shipped));
        assert!(S::Shipped.can_transition_to(S::Delivered));
    }

    #[test]
    fn cancel_is_reachable_from_non_terminal_states_only() {
        use DeliveryStatus as S;
        for from in [S::Pending, S::Preparing, S::Shipped] {
            assert!(from.can_transition_to(S::Canceled), "{from} -> Canceled");
        }
        assert!(!S::Delivered.can_transition_to(S::Canceled));
        assert!(!S::Canceled.can_transition_to(S::Canceled));
    }

    #[test]
    fn skipping_and_backwards_transitions_are_rejected() {
        use DeliveryStatus as S;
        assert!(!S::Pending.can_transition_to(S::Shipped));
        assert!(!S::Shipped.can_transition_to(S::Preparing));
        assert!(!S::Delivered.can_transition_to(S::Pending));
    }

    #[test]
    fn wire_names_round_trip() {
        for status in [
            DeliveryStatus::Pending,
            DeliveryStatus::Preparing,
            DeliveryStatus::Shipped,
            DeliveryStatus::Delivered,
            DeliveryStatus::Canceled,
        ] {
            assert_eq!(DeliveryStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(DeliveryStatus::parse("Lost"), None);
    }
}
