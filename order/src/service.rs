//! Order service: creation with stock validation, guarded status updates,
//! reads.
//!
//! Every applied mutation publishes the corresponding event after the
//! repository write. Publish failures surface to the caller; the broker
//! performs no internal retry.

use crate::catalog::{CatalogError, ProductCatalog, ProductInfo};
use crate::domain::{Order, OrderItem, OrderStatus};
use crate::repository::OrderRepository;
use bazaar_contracts::{Money, OrderCreated, OrderId, OrderStatusChanged, ProductId, UserId};
use bazaar_core::broker::{Broker, BrokerError, publish_event};
use bazaar_core::environment::Clock;
use bazaar_core::repository::RepositoryError;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// Errors surfaced by order operations.
#[derive(Error, Debug)]
pub enum OrderError {
    /// No order with this id.
    #[error("order {0} not found")]
    NotFound(OrderId),

    /// None of the requested products exist in the catalog.
    #[error("products not found in catalog: {0:?}")]
    ProductsNotFound(Vec<ProductId>),

    /// One requested product is missing from the catalog.
    #[error("product {0} not found in catalog")]
    ProductNotFound(ProductId),

    /// Requested quantity exceeds the stock snapshot.
    #[error(
        "insufficient stock for product '{name}': requested {requested}, available {available}"
    )]
    InsufficientStock {
        /// Product name from the catalog snapshot.
        name: String,
        /// Requested quantity.
        requested: u32,
        /// Available stock at validation time.
        available: u32,
    },

    /// The state machine forbids this status change.
    #[error("order {order} cannot move from {from} to {to}")]
    InvalidTransition {
        /// The order being mutated.
        order: OrderId,
        /// Current status.
        from: OrderStatus,
        /// Requested status.
        to: OrderStatus,
    },

    /// Catalog lookup failed.
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    /// Storage failed.
    #[error(transparent)]
    Repository(#[from] RepositoryError),

    /// Event publication failed.
    #[error(transparent)]
    Broker(#[from] BrokerError),
}

/// One requested line of a new order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OrderItemRequest {
    /// Requested product.
    pub product_id: ProductId,
    /// Requested quantity.
    pub quantity: u32,
}

/// The order service object.
pub struct OrderService {
    repository: Arc<dyn OrderRepository>,
    catalog: Arc<dyn ProductCatalog>,
    broker: Arc<dyn Broker>,
    clock: Arc<dyn Clock>,
}

impl OrderService {
    /// Wire the service with its collaborators.
    pub fn new(
        repository: Arc<dyn OrderRepository>,
        catalog: Arc<dyn ProductCatalog>,
        broker: Arc<dyn Broker>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            repository,
            catalog,
            broker,
            clock,
        }
    }

    /// Create an order after validating every line against the catalog.
    ///
    /// On success the order is Pending, its total is the sum of line
    /// extensions (price snapshots taken now), and exactly one
    /// `OrderCreated` event is published. On any validation failure nothing
    /// is persisted and nothing is published.
    ///
    /// # Errors
    ///
    /// [`OrderError::ProductsNotFound`] / [`OrderError::ProductNotFound`]
    /// for catalog misses, [`OrderError::InsufficientStock`] when a line
    /// exceeds the stock snapshot, plus catalog/storage/broker failures.
    pub async fn create_order(
        &self,
        user_id: UserId,
        delivery_address: String,
        items: Vec<OrderItemRequest>,
    ) -> Result<Order, OrderError> {
        let product_ids: Vec<ProductId> = items.iter().map(|i| i.product_id).collect();
        let products = self.catalog.products_info(product_ids.clone()).await?;

        if products.is_empty() {
            tracing::warn!(products = ?product_ids, "Products not found in catalog");
            return Err(OrderError::ProductsNotFound(product_ids));
        }

        let by_id: HashMap<ProductId, &ProductInfo> =
            products.iter().map(|p| (p.id, p)).collect();

        for item in &items {
            let Some(product) = by_id.get(&item.product_id) else {
                tracing::warn!(product = %item.product_id, "Product not found in catalog");
                return Err(OrderError::ProductNotFound(item.product_id));
            };
            if item.quantity > product.stock_quantity {
                tracing::warn!(
                    product = %item.product_id,
                    requested = item.quantity,
                    available = product.stock_quantity,
                    "Insufficient stock"
                );
                return Err(OrderError::InsufficientStock {
                    name: product.name.clone(),
                    requested: item.quantity,
                    available: product.stock_quantity,
                });
            }
        }

        let now = self.clock.now();
        let order_items: Vec<OrderItem> = items
            .iter()
            .filter_map(|item| {
                by_id.get(&item.product_id).map(|product| OrderItem {
                    product_id: item.product_id,
                    product_name: product.name.clone(),
                    unit_price: product.price,
                    quantity: item.quantity,
                })
            })
            .collect();
        let total_price: Money = order_items.iter().map(OrderItem::extension).sum();

        let order = Order {
            id: OrderId::new(),
            user_id,
            delivery_address,
            status: OrderStatus::Pending,
            items: order_items,
            total_price,
            created_at: now,
            updated_at: now,
        };

        self.repository.add(order.clone()).await?;

        publish_event(
            self.broker.as_ref(),
            &OrderCreated {
                order_id: order.id,
                user_id: order.user_id,
                delivery_address: order.delivery_address.clone(),
                total_price: order.total_price,
                amount: order.total_price,
            },
        )
        .await?;

        tracing::info!(order = %order.id, user = %user_id, total = %total_price, "Order created");
        Ok(order)
    }

    /// Fetch an order by id.
    ///
    /// # Errors
    ///
    /// [`OrderError::NotFound`] when the id is unknown, or a storage error.
    pub async fn order(&self, id: OrderId) -> Result<Order, OrderError> {
        self.repository
            .get(id)
            .await?
            .ok_or(OrderError::NotFound(id))
    }

    /// Fetch all orders owned by a user.
    ///
    /// # Errors
    ///
    /// Storage errors only; an unknown user is an empty list.
    pub async fn orders_for_user(&self, user_id: UserId) -> Result<Vec<Order>, OrderError> {
        Ok(self.repository.get_by_user(user_id).await?)
    }

    /// Fetch every order.
    ///
    /// # Errors
    ///
    /// Storage errors only.
    pub async fn orders(&self) -> Result<Vec<Order>, OrderError> {
        Ok(self.repository.list().await?)
    }

    /// Apply a status transition and publish `OrderStatusChanged`.
    ///
    /// # Errors
    ///
    /// [`OrderError::NotFound`] for unknown orders,
    /// [`OrderError::InvalidTransition`] when the state machine forbids the
    /// move, plus storage/broker failures.
    pub async fn update_status(
        &self,
        id: OrderId,
        status: OrderStatus,
    ) -> Result<Order, OrderError> {
        let mut order = self
            .repository
            .get(id)
            .await?
            .ok_or(OrderError::NotFound(id))?;

        if !order.status.can_transition_to(status) {
            return Err(OrderError::InvalidTransition {
                order: id,
                from: order.status,
                to: status,
            });
        }

        let previous = order.status;
        order.status = status;
        order.updated_at = self.clock.now();
        self.repository.update(order.clone()).await?;

        publish_event(
            self.broker.as_ref(),
            &OrderStatusChanged {
                order_id: order.id,
                user_id: order.user_id,
                status: status.as_str().to_string(),
                changed_at: order.updated_at,
            },
        )
        .await?;

        tracing::info!(order = %id, from = %previous, to = %status, "Order status updated");
        Ok(order)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)] // Panics: assertions in tests
mod tests {
    use super::*;
    use crate::catalog::InMemoryCatalog;
    use crate::repository::InMemoryOrderRepository;
    use bazaar_contracts::routing::exchanges;
    use bazaar_core::topology::Topology;
    use bazaar_testing::{InMemoryBroker, test_clock};

    struct Fixture {
        broker: Arc<InMemoryBroker>,
        catalog: Arc<InMemoryCatalog>,
        repository: Arc<InMemoryOrderRepository>,
        service: OrderService,
    }

    async fn fixture() -> Fixture {
        let broker = Arc::new(InMemoryBroker::new());
        broker
            .declare_topology(
                &Topology::new()
                    .exchange(exchanges::ORDER_EVENTS)
                    .queue("probe.order.events")
                    .bind("probe.order.events", exchanges::ORDER_EVENTS, "order.#"),
            )
            .await
            .expect("topology should declare");

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
            stock_quantity: 1,
            attributes: None,
        });

        let repository = Arc::new(InMemoryOrderRepository::new());
        let service = OrderService::new(
            repository.clone(),
            catalog.clone(),
            broker.clone(),
            Arc::new(test_clock()),
        );

        Fixture {
            broker,
            catalog,
            repository,
            service,
        }
    }

    fn request(product: i64, quantity: u32) -> OrderItemRequest {
        OrderItemRequest {
            product_id: ProductId::new(product),
            quantity,
        }
    }

    #[tokio::test]
    async fn create_order_snapshots_prices_and_publishes_once() {
        let f = fixture().await;

        let order = f
            .service
            .create_order(
                UserId::new(),
                "1 Market St".to_string(),
                vec![request(1, 2), request(2, 1)],
            )
            .await
            .unwrap();

        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.total_price, Money::from_cents(54_00));

        let published = f.broker.peek_queue("probe.order.events");
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].routing_key, "order.created");

        // Catalog price changes must not affect the stored snapshot.
        f.catalog.insert(ProductInfo {
            id: ProductId::new(1),
            name: "Teapot".to_string(),
            price: Money::from_cents(99_00),
            stock_quantity: 5,
            attributes: None,
        });
        let stored = f.repository.get(order.id).await.unwrap().unwrap();
        assert_eq!(stored.total_price, Money::from_cents(54_00));
    }

    #[tokio::test]
    async fn insufficient_stock_aborts_creation_without_event() {
        let f = fixture().await;

        let result = f
            .service
            .create_order(
                UserId::new(),
                "1 Market St".to_string(),
                vec![request(2, 3)],
            )
            .await;

        assert!(matches!(
            result,
            Err(OrderError::InsufficientStock {
                requested: 3,
                available: 1,
                ..
            })
        ));
        assert!(f.repository.list().await.unwrap().is_empty());
        assert!(f.broker.peek_queue("probe.order.events").is_empty());
    }

    #[tokio::test]
    async fn unknown_product_aborts_creation() {
        let f = fixture().await;

        let result = f
            .service
            .create_order(
                UserId::new(),
                "1 Market St".to_string(),
                vec![request(1, 1), request(99, 1)],
            )
            .await;

        assert!(matches!(result, Err(OrderError::ProductNotFound(_))));
        assert!(f.repository.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn valid_status_update_publishes_status_changed() {
        let f = fixture().await;
        let order = f
            .service
            .create_order(UserId::new(), "1 Market St".to_string(), vec![request(1, 1)])
            .await
            .unwrap();

        let updated = f
            .service
            .update_status(order.id, OrderStatus::Paid)
            .await
            .unwrap();
        assert_eq!(updated.status, OrderStatus::Paid);

        let published = f.broker.peek_queue("probe.order.events");
        assert_eq!(published.len(), 2);
        assert_eq!(published[1].routing_key, "order.status.paid");
    }

    #[tokio::test]
    async fn disallowed_transition_is_rejected_without_event() {
        let f = fixture().await;
        let order = f
            .service
            .create_order(UserId::new(), "1 Market St".to_string(), vec![request(1, 1)])
            .await
            .unwrap();

        let result = f.service.update_status(order.id, OrderStatus::Shipped).await;
        assert!(matches!(result, Err(OrderError::InvalidTransition { .. })));

        // Still Pending, and only the creation event was published.
        let stored = f.repository.get(order.id).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Pending);
        assert_eq!(f.broker.peek_queue("probe.order.events").len(), 1);
    }

    #[tokio::test]
    async fn unknown_order_is_reported() {
        let f = fixture().await;
        let result = f.service.update_status(OrderId::new(), OrderStatus::Paid).await;
        assert!(matches!(result, Err(OrderError::NotFound(_))));
    }
}
