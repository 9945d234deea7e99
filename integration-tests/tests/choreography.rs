//! End-to-end choreography scenarios over the in-memory broker.
//!
//! No service calls another directly: every cross-service effect in these
//! tests travels as an event through the shared broker.

#![allow(clippy::unwrap_used, clippy::expect_used)] // Panics: assertions in tests

use bazaar_contracts::routing::exchanges;
use bazaar_contracts::{
    CartCheckout, CartItem, CheckoutFailed, Money, OrderId, PaymentCompleted, PaymentFailed,
    PaymentId, ProductId, UserId,
};
use bazaar_core::broker::{Broker, publish_event};
use bazaar_core::event::Event;
use bazaar_core::topology::Topology;
use bazaar_delivery::domain::DeliveryStatus;
use bazaar_integration_tests::{Marketplace, eventually};
use bazaar_order::domain::OrderStatus;
use bazaar_payment::domain::PaymentStatus;
use bazaar_payment::gateway::SimulatedGateway;
use chrono::Utc;

fn checkout_message(user_id: UserId, quantity: u32) -> CartCheckout {
    CartCheckout {
        user_id,
        delivery_address: "1 Market St".to_string(),
        items: vec![CartItem {
            product_id: ProductId::new(1),
            quantity,
        }],
    }
}

async fn order_status_is(m: &Marketplace, order_id: OrderId, status: OrderStatus) -> bool {
    matches!(m.orders.order(order_id).await, Ok(order) if order.status == status)
}

#[tokio::test]
async fn checkout_runs_the_saga_through_to_delivery() {
    let m = Marketplace::start(SimulatedGateway::always_approve())
        .await
        .unwrap();
    m.seed_product(1, "Teapot", 12_00, 5);
    let user_id = UserId::new();

    publish_event(m.broker.as_ref(), &checkout_message(user_id, 2))
        .await
        .unwrap();

    // Checkout bridge created the order; payment completed; the order
    // follows the payment and delivery events without any direct call.
    assert!(
        eventually(|| async {
            m.orders
                .orders_for_user(user_id)
                .await
                .map(|orders| orders.len() == 1)
                .unwrap_or(false)
        })
        .await,
        "order should be created from checkout"
    );
    let order = m.orders.orders_for_user(user_id).await.unwrap().remove(0);
    assert_eq!(order.total_price, Money::from_cents(24_00));

    assert!(
        eventually(|| async {
            matches!(
                m.payments.payment_for_order(order.id).await,
                Ok(Some(payment)) if payment.status == PaymentStatus::Completed
            )
        })
        .await,
        "payment should complete"
    );

    // PaymentCompleted fans out: order goes Paid, delivery goes Preparing,
    // and delivery.status.preparing advances the order once more.
    assert!(
        eventually(|| async {
            order_status_is(&m, order.id, OrderStatus::PreparingForDelivery).await
        })
        .await,
        "order should reach PreparingForDelivery"
    );
    let delivery = m
        .deliveries
        .delivery_for_order(order.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(delivery.status, DeliveryStatus::Preparing);

    // The notification service looked the user up synchronously and
    // recorded the payment notification.
    assert!(
        eventually(|| async {
            m.notifications
                .notifications_for_user(user_id)
                .await
                .map(|list| list.iter().any(|n| n.title == "Payment completed"))
                .unwrap_or(false)
        })
        .await,
        "payment notification should exist"
    );

    // Drive the remaining chain through explicit delivery commands.
    let shipped = m
        .deliveries
        .update_status(delivery.id, DeliveryStatus::Shipped)
        .await
        .unwrap();
    let tracking = shipped.tracking_number.clone().unwrap();
    assert!(!tracking.is_empty());

    assert!(
        eventually(|| async { order_status_is(&m, order.id, OrderStatus::Shipped).await }).await,
        "order should follow the shipped delivery"
    );

    m.deliveries
        .update_status(delivery.id, DeliveryStatus::Delivered)
        .await
        .unwrap();

    assert!(
        eventually(|| async { order_status_is(&m, order.id, OrderStatus::Delivered).await }).await,
        "order should follow the delivered delivery"
    );

    let notifications = m.notifications.notifications_for_user(user_id).await.unwrap();
    let titles: Vec<&str> = notifications.iter().map(|n| n.title.as_str()).collect();
    assert!(titles.contains(&"Order created"));
    assert!(titles.contains(&"Delivery started"));
    assert!(titles.contains(&"Delivery completed"));
}

#[tokio::test]
async fn declined_payment_drives_the_order_unpaid() {
    let m = Marketplace::start(SimulatedGateway::always_decline())
        .await
        .unwrap();
    m.seed_product(1, "Teapot", 12_00, 5);
    let user_id = UserId::new();

    publish_event(m.broker.as_ref(), &checkout_message(user_id, 1))
        .await
        .unwrap();

    assert!(
        eventually(|| async {
            m.orders
                .orders_for_user(user_id)
                .await
                .map(|orders| orders.first().is_some_and(|o| o.status == OrderStatus::Unpaid))
                .unwrap_or(false)
        })
        .await,
        "order should end Unpaid after the gateway declines"
    );

    assert!(
        eventually(|| async {
            m.notifications
                .notifications_for_user(user_id)
                .await
                .map(|list| list.iter().any(|n| n.title == "Payment failed"))
                .unwrap_or(false)
        })
        .await,
        "payment failure notification should exist"
    );
}

#[tokio::test]
async fn over_stock_checkout_reports_on_the_error_channel() {
    let m = Marketplace::start(SimulatedGateway::always_approve())
        .await
        .unwrap();
    m.seed_product(1, "Teapot", 12_00, 1);
    let user_id = UserId::new();

    publish_event(m.broker.as_ref(), &checkout_message(user_id, 5))
        .await
        .unwrap();

    assert!(
        eventually(|| async { m.broker.queue_depth("cart.checkout.error") == 1 }).await,
        "error channel should receive the failure report"
    );

    let errors = m.broker.peek_queue("cart.checkout.error");
    let failed = CheckoutFailed::from_bytes(&errors[0].body).unwrap();
    assert_eq!(failed.user_id, user_id);
    assert!(failed.details.contains("requested 5, available 1"));

    // And no order was created.
    assert!(m.orders.orders_for_user(user_id).await.unwrap().is_empty());
}

#[tokio::test]
async fn duplicate_payment_completed_is_applied_once() {
    let m = Marketplace::start(SimulatedGateway::always_approve())
        .await
        .unwrap();
    m.seed_product(1, "Teapot", 12_00, 5);
    let user_id = UserId::new();

    // Observe the order service's own status events.
    m.broker
        .declare_topology(
            &Topology::new()
                .exchange(exchanges::ORDER_EVENTS)
                .queue("probe.order.status")
                .bind("probe.order.status", exchanges::ORDER_EVENTS, "order.status.*"),
        )
        .await
        .unwrap();

    let order = m
        .orders
        .create_order(
            user_id,
            "1 Market St".to_string(),
            vec![bazaar_order::service::OrderItemRequest {
                product_id: ProductId::new(1),
                quantity: 1,
            }],
        )
        .await
        .unwrap();

    // The real payment service also reacts to this order; wait for the
    // choreography to settle (Paid, then PreparingForDelivery, two status
    // events) before injecting duplicates.
    assert!(
        eventually(|| async { order_status_is(&m, order.id, OrderStatus::PreparingForDelivery).await })
            .await,
        "order should settle after the first payment"
    );
    assert!(
        eventually(|| async { m.broker.queue_depth("probe.order.status") == 2 }).await,
        "both status events should be observable"
    );
    let baseline = m.broker.queue_depth("probe.order.status");

    let duplicate = PaymentCompleted {
        order_id: order.id,
        payment_id: PaymentId::new(),
        amount: order.total_price,
        completed_at: Utc::now(),
    };
    publish_event(m.broker.as_ref(), &duplicate).await.unwrap();
    publish_event(m.broker.as_ref(), &duplicate).await.unwrap();

    // A later PaymentFailed for the same order must not drag it to Unpaid.
    publish_event(
        m.broker.as_ref(),
        &PaymentFailed {
            order_id: order.id,
            payment_id: PaymentId::new(),
            amount: order.total_price,
            failed_at: Utc::now(),
            error_message: "late duplicate".to_string(),
        },
    )
    .await
    .unwrap();

    // Queue drains without any further status event being published.
    assert!(
        eventually(|| async { m.broker.queue_depth("order.payment.events") == 0 }).await,
        "payment events queue should drain"
    );
    assert_eq!(m.broker.queue_depth("probe.order.status"), baseline);
    assert!(order_status_is(&m, order.id, OrderStatus::PreparingForDelivery).await);
}

#[tokio::test]
async fn malformed_payment_event_dead_letters_without_blocking_the_queue() {
    let m = Marketplace::start(SimulatedGateway::always_approve())
        .await
        .unwrap();
    m.seed_product(1, "Teapot", 12_00, 5);
    let user_id = UserId::new();

    m.broker
        .publish(
            exchanges::PAYMENT_EVENTS,
            "payment.completed",
            b"not an event".to_vec(),
        )
        .await
        .unwrap();

    assert!(
        eventually(|| async { m.broker.queue_depth("order.payment.events.dlq") == 1 }).await,
        "poison message should dead-letter"
    );

    // The consumer keeps serving the queue: a real checkout still works.
    publish_event(m.broker.as_ref(), &checkout_message(user_id, 1))
        .await
        .unwrap();
    assert!(
        eventually(|| async {
            m.orders
                .orders_for_user(user_id)
                .await
                .map(|orders| orders.first().is_some_and(|o| o.status != OrderStatus::Pending))
                .unwrap_or(false)
        })
        .await,
        "choreography should continue after the poison message"
    );
}

#[tokio::test]
async fn late_refund_notifies_but_leaves_the_advanced_order_alone() {
    let m = Marketplace::start(SimulatedGateway::always_approve())
        .await
        .unwrap();
    m.seed_product(1, "Teapot", 12_00, 5);
    let user_id = UserId::new();

    publish_event(m.broker.as_ref(), &checkout_message(user_id, 1))
        .await
        .unwrap();

    assert!(
        eventually(|| async {
            m.orders
                .orders_for_user(user_id)
                .await
                .map(|orders| {
                    orders
                        .first()
                        .is_some_and(|o| o.status == OrderStatus::PreparingForDelivery)
                })
                .unwrap_or(false)
        })
        .await,
        "order should settle before the refund"
    );
    let order = m.orders.orders_for_user(user_id).await.unwrap().remove(0);

    // Refund is only valid from a Completed payment; the earlier automatic
    // charge completed, so this succeeds and fans out.
    let payment = m
        .payments
        .payment_for_order(order.id)
        .await
        .unwrap()
        .unwrap();
    m.payments.refund_payment(payment.id).await.unwrap();

    assert!(
        eventually(|| async {
            m.notifications
                .notifications_for_user(user_id)
                .await
                .map(|list| list.iter().any(|n| n.title == "Payment refunded"))
                .unwrap_or(false)
        })
        .await,
        "refund notification should exist"
    );

    // The order state machine only accepts Refunded from Paid; delivery
    // already advanced the order, so the late refund event is dropped and
    // the status stands.
    assert!(
        eventually(|| async { m.broker.queue_depth("order.payment.events") == 0 }).await,
        "payment events queue should drain"
    );
    assert!(order_status_is(&m, order.id, OrderStatus::PreparingForDelivery).await);
}
