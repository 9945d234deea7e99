//! Runnable demo of the Bazaar choreography.
//!
//! Wires every service over the in-memory broker, seeds a catalog, publishes
//! one cart checkout and lets the saga play out: order creation, payment,
//! delivery and notifications, with no direct call between services.
//!
//! ```text
//! RUST_LOG=info cargo run -p bazaar-demo
//! ```

use bazaar_contracts::{CartCheckout, CartItem, Money, OrderId, ProductId, UserId};
use bazaar_core::broker::{Broker, publish_event};
use bazaar_core::environment::{Clock, SystemClock};
use bazaar_delivery::domain::DeliveryStatus;
use bazaar_delivery::repository::InMemoryDeliveryRepository;
use bazaar_delivery::service::DeliveryService;
use bazaar_notification::order_lookup::{LookupError, OrderInfo, OrderLookup};
use bazaar_notification::repository::InMemoryNotificationRepository;
use bazaar_notification::service::NotificationService;
use bazaar_order::catalog::{InMemoryCatalog, ProductInfo};
use bazaar_order::repository::{InMemoryOrderRepository, OrderRepository};
use bazaar_order::service::OrderService;
use bazaar_payment::gateway::{GatewayConfig, SimulatedGateway};
use bazaar_payment::repository::InMemoryPaymentRepository;
use bazaar_payment::service::PaymentService;
use bazaar_runtime::idempotency::InMemoryIdempotencyStore;
use bazaar_testing::InMemoryBroker;
use futures::future::BoxFuture;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// In-process stand-in for the notification service's order lookup.
struct DirectOrderLookup {
    repository: Arc<InMemoryOrderRepository>,
}

impl OrderLookup for DirectOrderLookup {
    fn order_info(
        &self,
        order_id: OrderId,
    ) -> BoxFuture<'_, Result<Option<OrderInfo>, LookupError>> {
        Box::pin(async move {
            let order = self
                .repository
                .get(order_id)
                .await
                .map_err(|e| LookupError::Unavailable(e.to_string()))?;
            Ok(order.map(|o| OrderInfo {
                id: o.id,
                user_id: o.user_id,
                status: o.status.as_str().to_string(),
            }))
        })
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let broker: Arc<InMemoryBroker> = Arc::new(InMemoryBroker::new());
    let dyn_broker: Arc<dyn Broker> = broker.clone();
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    // Each service declares its own view of the topology, exactly as the
    // deployed processes would.
    broker.declare_topology(&bazaar_order::handlers::topology()).await?;
    broker.declare_topology(&bazaar_payment::handlers::topology()).await?;
    broker.declare_topology(&bazaar_delivery::handlers::topology()).await?;
    broker
        .declare_topology(&bazaar_notification::handlers::topology())
        .await?;

    // Catalog with a couple of products.
    let catalog = Arc::new(InMemoryCatalog::new());
    catalog.insert(ProductInfo {
        id: ProductId::new(1),
        name: "Teapot".to_string(),
        price: Money::from_cents(12_00),
        stock_quantity: 5,
        attributes: None,
    });
    catalog.insert(ProductInfo {
        id: ProductId::new(2),
        name: "Kettle".to_string(),
        price: Money::from_cents(30_00),
        stock_quantity: 2,
        attributes: None,
    });

    // Services.
    let order_repository = Arc::new(InMemoryOrderRepository::new());
    let orders = Arc::new(OrderService::new(
        order_repository.clone(),
        catalog.clone(),
        dyn_broker.clone(),
        Arc::clone(&clock),
    ));

    let gateway = SimulatedGateway::new(
        GatewayConfig::default()
            .with_delay(Duration::from_millis(300), Duration::from_millis(600)),
    );
    let payments = Arc::new(PaymentService::new(
        Arc::new(InMemoryPaymentRepository::new()),
        Arc::new(gateway),
        dyn_broker.clone(),
        Arc::clone(&clock),
    ));

    let deliveries = Arc::new(DeliveryService::new(
        Arc::new(InMemoryDeliveryRepository::new()),
        dyn_broker.clone(),
        Arc::clone(&clock),
    ));

    let notifications = Arc::new(NotificationService::new(
        Arc::new(InMemoryNotificationRepository::new()),
        Arc::clone(&clock),
    ));

    // Consumers, one dispatch loop per queue.
    for consumer in bazaar_order::handlers::consumers(
        orders.clone(),
        catalog.clone(),
        dyn_broker.clone(),
        Arc::new(InMemoryIdempotencyStore::new()),
    )? {
        consumer.spawn(dyn_broker.clone());
    }
    for consumer in bazaar_payment::handlers::consumers(
        payments.clone(),
        Arc::new(InMemoryIdempotencyStore::new()),
    )? {
        consumer.spawn(dyn_broker.clone());
    }
    for consumer in bazaar_delivery::handlers::consumers(
        deliveries.clone(),
        Arc::new(InMemoryIdempotencyStore::new()),
    )? {
        consumer.spawn(dyn_broker.clone());
    }
    for consumer in bazaar_notification::handlers::consumers(
        notifications.clone(),
        Arc::new(DirectOrderLookup {
            repository: order_repository.clone(),
        }),
        Arc::new(InMemoryIdempotencyStore::new()),
    )? {
        consumer.spawn(dyn_broker.clone());
    }

    // One customer checks out a cart.
    let user_id = UserId::new();
    tracing::info!(user = %user_id, "Publishing cart checkout");
    publish_event(
        broker.as_ref(),
        &CartCheckout {
            user_id,
            delivery_address: "1 Market Street, Springfield".to_string(),
            items: vec![
                CartItem {
                    product_id: ProductId::new(1),
                    quantity: 2,
                },
                CartItem {
                    product_id: ProductId::new(2),
                    quantity: 1,
                },
            ],
        },
    )
    .await?;

    // Let the order → payment → delivery chain settle.
    tokio::time::sleep(Duration::from_secs(2)).await;

    let Some(order) = orders.orders_for_user(user_id).await?.into_iter().next() else {
        tracing::warn!("No order was created; checkout failed validation");
        return Ok(());
    };
    tracing::info!(order = %order.id, status = %order.status, total = %order.total_price, "Order after payment");

    // Drive the delivery chain to completion when the payment went through.
    if let Some(delivery) = deliveries.delivery_for_order(order.id).await? {
        if delivery.status == DeliveryStatus::Preparing {
            let shipped = deliveries
                .update_status(delivery.id, DeliveryStatus::Shipped)
                .await?;
            tracing::info!(
                tracking = shipped.tracking_number.as_deref().unwrap_or(""),
                "Delivery shipped"
            );
            deliveries
                .update_status(delivery.id, DeliveryStatus::Delivered)
                .await?;
            tokio::time::sleep(Duration::from_millis(500)).await;
        }
    }

    let order = orders.order(order.id).await?;
    tracing::info!(order = %order.id, status = %order.status, "Final order status");

    for notification in notifications.notifications_for_user(user_id).await? {
        tracing::info!(
            title = %notification.title,
            body = %notification.body,
            kind = %notification.kind,
            "Notification"
        );
    }

    Ok(())
}
