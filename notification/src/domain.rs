//! Notification record.

use bazaar_contracts::{NotificationId, OrderId, UserId};
use chrono::{DateTime, Utc};

/// One user-facing notification.
///
/// Created as a side effect of an event; only the read flag ever changes
/// afterwards.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Notification {
    /// Opaque id.
    pub id: NotificationId,
    /// Target user.
    pub user_id: UserId,
    /// Related order.
    pub order_id: OrderId,
    /// Short title.
    pub title: String,
    /// Body text.
    pub body: String,
    /// Free-text type tag (e.g. `"PaymentCompleted"`).
    pub kind: String,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Whether the user has read it.
    pub read: bool,
}

impl Notification {
    /// Create an unread notification.
    #[must_use]
    pub fn new(
        user_id: UserId,
        order_id: OrderId,
        title: impl Into<String>,
        body: impl Into<String>,
        kind: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: NotificationId::new(),
            user_id,
            order_id,
            title: title.into(),
            body: body.into(),
            kind: kind.into(),
            created_at,
            read: false,
        }
    }

    /// Set the read flag.
    pub fn mark_read(&mut self) {
        self.read = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notifications_start_unread() {
        let mut notification = Notification::new(
            UserId::new(),
            OrderId::new(),
            "Payment completed",
            "Payment for your order completed successfully",
            "PaymentCompleted",
            Utc::now(),
        );
        assert!(!notification.read);

        notification.mark_read();
        assert!(notification.read);
    }
}
