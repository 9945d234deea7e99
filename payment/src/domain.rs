//! Payment aggregate.

use bazaar_contracts::{Money, OrderId, PaymentId};
use chrono::{DateTime, Utc};
use std::fmt;

/// Payment lifecycle status.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PaymentStatus {
    /// Created, charge not yet resolved.
    Pending,
    /// Charge succeeded; refundable.
    Completed,
    /// Charge declined; terminal.
    Failed,
    /// Refunded after completion; terminal.
    Refunded,
}

impl PaymentStatus {
    /// Stable name used in logs and errors.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Completed => "Completed",
            Self::Failed => "Failed",
            Self::Refunded => "Refunded",
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The payment aggregate.
///
/// References exactly one order. At most one payment is expected per order,
/// though nothing enforces it beyond the duplicate-event tolerance in the
/// order-created handler.
#[derive(Clone, Debug, PartialEq)]
pub struct Payment {
    /// Opaque id.
    pub id: PaymentId,
    /// The order being paid for.
    pub order_id: OrderId,
    /// Charged amount.
    pub amount: Money,
    /// Current lifecycle status.
    pub status: PaymentStatus,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Set when the charge succeeds.
    pub completed_at: Option<DateTime<Utc>>,
    /// Set when the charge is declined.
    pub failed_at: Option<DateTime<Utc>>,
    /// Gateway error message for failed charges.
    pub error_message: Option<String>,
}

impl Payment {
    /// Create a Pending payment for an order.
    #[must_use]
    pub fn new(order_id: OrderId, amount: Money, created_at: DateTime<Utc>) -> Self {
        Self {
            id: PaymentId::new(),
            order_id,
            amount,
            status: PaymentStatus::Pending,
            created_at,
            completed_at: None,
            failed_at: None,
            error_message: None,
        }
    }
}
