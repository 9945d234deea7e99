//! Test harness wiring every Bazaar service over the in-memory broker.
//!
//! [`Marketplace::start`] builds the whole mesh the way a deployment would:
//! each service declares its topology, gets its repositories and
//! collaborators, and spawns its consumers. Tests then publish events or
//! call service objects and observe the choreography ripple through.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use bazaar_contracts::{Money, OrderId, ProductId};
use bazaar_core::broker::{Broker, BrokerError};
use bazaar_core::environment::Clock;
use bazaar_delivery::repository::InMemoryDeliveryRepository;
use bazaar_delivery::service::DeliveryService;
use bazaar_notification::order_lookup::{LookupError, OrderInfo, OrderLookup};
use bazaar_notification::repository::InMemoryNotificationRepository;
use bazaar_notification::service::NotificationService;
use bazaar_order::catalog::{InMemoryCatalog, ProductInfo};
use bazaar_order::repository::{InMemoryOrderRepository, OrderRepository};
use bazaar_order::service::OrderService;
use bazaar_payment::gateway::SimulatedGateway;
use bazaar_payment::repository::InMemoryPaymentRepository;
use bazaar_payment::service::PaymentService;
use bazaar_runtime::idempotency::InMemoryIdempotencyStore;
use bazaar_testing::{InMemoryBroker, test_clock};
use futures::future::BoxFuture;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// In-process stand-in for the notification service's synchronous order
/// lookup, reading the order repository directly.
pub struct DirectOrderLookup {
    repository: Arc<InMemoryOrderRepository>,
}

impl DirectOrderLookup {
    /// Wrap an order repository.
    #[must_use]
    pub fn new(repository: Arc<InMemoryOrderRepository>) -> Self {
        Self { repository }
    }
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

/// Every service wired over one in-memory broker.
pub struct Marketplace {
    /// The shared broker.
    pub broker: Arc<InMemoryBroker>,
    /// Seeded product catalog.
    pub catalog: Arc<InMemoryCatalog>,
    /// The order service and its repository.
    pub orders: Arc<OrderService>,
    /// Order storage, for direct assertions.
    pub order_repository: Arc<InMemoryOrderRepository>,
    /// The payment service.
    pub payments: Arc<PaymentService>,
    /// The delivery service.
    pub deliveries: Arc<DeliveryService>,
    /// The notification service.
    pub notifications: Arc<NotificationService>,
}

impl Marketplace {
    /// Wire and start every service with the given payment gateway.
    ///
    /// # Errors
    ///
    /// Returns a [`BrokerError`] when topology declaration or consumer
    /// wiring fails.
    pub async fn start(gateway: SimulatedGateway) -> Result<Self, BrokerError> {
        let broker: Arc<InMemoryBroker> = Arc::new(InMemoryBroker::new());
        let clock: Arc<dyn Clock> = Arc::new(test_clock());

        broker.declare_topology(&bazaar_order::handlers::topology()).await?;
        broker.declare_topology(&bazaar_payment::handlers::topology()).await?;
        broker.declare_topology(&bazaar_delivery::handlers::topology()).await?;
        broker
            .declare_topology(&bazaar_notification::handlers::topology())
            .await?;

        let catalog = Arc::new(InMemoryCatalog::new());
        let order_repository = Arc::new(InMemoryOrderRepository::new());
        let orders = Arc::new(OrderService::new(
            order_repository.clone(),
            catalog.clone(),
            broker.clone(),
            Arc::clone(&clock),
        ));

        let payments = Arc::new(PaymentService::new(
            Arc::new(InMemoryPaymentRepository::new()),
            Arc::new(gateway),
            broker.clone(),
            Arc::clone(&clock),
        ));

        let deliveries = Arc::new(DeliveryService::new(
            Arc::new(InMemoryDeliveryRepository::new()),
            broker.clone(),
            Arc::clone(&clock),
        ));

        let notifications = Arc::new(NotificationService::new(
            Arc::new(InMemoryNotificationRepository::new()),
            Arc::clone(&clock),
        ));
        let order_lookup = Arc::new(DirectOrderLookup::new(order_repository.clone()));

        let dyn_broker: Arc<dyn Broker> = broker.clone();

        for consumer in bazaar_order::handlers::consumers(
            orders.clone(),
            catalog.clone(),
            dyn_broker.clone(),
            Arc::new(InMemoryIdempotencyStore::new()),
        )
        .map_err(|e| BrokerError::Transport(e.to_string()))?
        {
            consumer.spawn(dyn_broker.clone());
        }

        for consumer in bazaar_payment::handlers::consumers(
            payments.clone(),
            Arc::new(InMemoryIdempotencyStore::new()),
        )
        .map_err(|e| BrokerError::Transport(e.to_string()))?
        {
            consumer.spawn(dyn_broker.clone());
        }

        for consumer in bazaar_delivery::handlers::consumers(
            deliveries.clone(),
            Arc::new(InMemoryIdempotencyStore::new()),
        )
        .map_err(|e| BrokerError::Transport(e.to_string()))?
        {
            consumer.spawn(dyn_broker.clone());
        }

        for consumer in bazaar_notification::handlers::consumers(
            notifications.clone(),
            order_lookup,
            Arc::new(InMemoryIdempotencyStore::new()),
        )
        .map_err(|e| BrokerError::Transport(e.to_string()))?
        {
            consumer.spawn(dyn_broker.clone());
        }

        Ok(Self {
            broker,
            catalog,
            orders,
            order_repository,
            payments,
            deliveries,
            notifications,
        })
    }

    /// Seed the catalog with a product.
    pub fn seed_product(&self, id: i64, name: &str, price_cents: i64, stock: u32) {
        self.catalog.insert(ProductInfo {
            id: ProductId::new(id),
            name: name.to_string(),
            price: Money::from_cents(price_cents),
            stock_quantity: stock,
            attributes: None,
        });
    }
}

/// Poll an async condition until it holds or the timeout elapses.
///
/// Returns whether the condition ever held; choreography tests assert on
/// the result.
pub async fn eventually<F, Fut>(mut condition: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..400 {
        if condition().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    false
}
