//! The static routing registry: event type → exchange + routing-key pattern.
//!
//! Publishing code never switches on a runtime type to pick a route; each
//! contract type carries its route, and this registry is the authoritative
//! table the tests check every contract against. Adding an event without a
//! registry row (or vice versa) fails the completeness test.

/// Exchange names shared by every service.
pub mod exchanges {
    /// Topic exchange for order lifecycle events.
    pub const ORDER_EVENTS: &str = "order.events";

    /// Topic exchange for payment lifecycle events.
    pub const PAYMENT_EVENTS: &str = "payment.events";

    /// Topic exchange for delivery lifecycle events.
    pub const DELIVERY_EVENTS: &str = "delivery.events";

    /// The default exchange: routes directly to the queue named by the
    /// routing key. Used for command-style queues and the error channel.
    pub const DEFAULT: &str = "";
}

/// Routing keys (literal ones) and prefixes for derived ones.
pub mod keys {
    /// `OrderCreated` routing key.
    pub const ORDER_CREATED: &str = "order.created";

    /// Prefix for `OrderStatusChanged`; the lowercased status is appended.
    pub const ORDER_STATUS_PREFIX: &str = "order.status";

    /// `PaymentCompleted` routing key.
    pub const PAYMENT_COMPLETED: &str = "payment.completed";

    /// `PaymentFailed` routing key.
    pub const PAYMENT_FAILED: &str = "payment.failed";

    /// `PaymentRefunded` routing key.
    pub const PAYMENT_REFUNDED: &str = "payment.refunded";

    /// Prefix for `DeliveryStatusUpdated`; the lowercased status is appended.
    pub const DELIVERY_STATUS_PREFIX: &str = "delivery.status";

    /// `DeliveryStarted` routing key.
    pub const DELIVERY_STARTED: &str = "delivery.started";

    /// `DeliveryCompleted` routing key.
    pub const DELIVERY_COMPLETED: &str = "delivery.completed";

    /// `CartCheckout` command queue (default exchange).
    pub const CART_CHECKOUT: &str = "cart.checkout";

    /// `CheckoutFailed` error channel queue (default exchange).
    pub const CART_CHECKOUT_ERROR: &str = "cart.checkout.error";
}

/// One registry row: an event type and the route its instances publish on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EventRoute {
    /// The contract's `event_type` tag.
    pub event_type: &'static str,
    /// Exchange the event publishes to.
    pub exchange: &'static str,
    /// Binding pattern every instance routing key matches.
    pub pattern: &'static str,
}

/// The complete registry, one row per contract event type.
pub const EVENT_ROUTES: &[EventRoute] = &[
    EventRoute {
        event_type: "OrderCreated",
        exchange: exchanges::ORDER_EVENTS,
        pattern: "order.created",
    },
    EventRoute {
        event_type: "OrderStatusChanged",
        exchange: exchanges::ORDER_EVENTS,
        pattern: "order.status.*",
    },
    EventRoute {
        event_type: "PaymentCompleted",
        exchange: exchanges::PAYMENT_EVENTS,
        pattern: "payment.completed",
    },
    EventRoute {
        event_type: "PaymentFailed",
        exchange: exchanges::PAYMENT_EVENTS,
        pattern: "payment.failed",
    },
    EventRoute {
        event_type: "PaymentRefunded",
        exchange: exchanges::PAYMENT_EVENTS,
        pattern: "payment.refunded",
    },
    EventRoute {
        event_type: "DeliveryStatusUpdated",
        exchange: exchanges::DELIVERY_EVENTS,
        pattern: "delivery.status.*",
    },
    EventRoute {
        event_type: "DeliveryStarted",
        exchange: exchanges::DELIVERY_EVENTS,
        pattern: "delivery.started",
    },
    EventRoute {
        event_type: "DeliveryCompleted",
        exchange: exchanges::DELIVERY_EVENTS,
        pattern: "delivery.completed",
    },
    EventRoute {
        event_type: "CartCheckout",
        exchange: exchanges::DEFAULT,
        pattern: "cart.checkout",
    },
    EventRoute {
        event_type: "CheckoutFailed",
        exchange: exchanges::DEFAULT,
        pattern: "cart.checkout.error",
    },
];

/// Look up the registry row for an event type.
#[must_use]
pub fn route_for(event_type: &str) -> Option<&'static EventRoute> {
    EVENT_ROUTES.iter().find(|r| r.event_type == event_type)
}
