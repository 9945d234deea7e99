//! Cart checkout bridge.
//!
//! Turns a `CartCheckout` message from the cart service into local stock
//! validation plus an order-creation side effect. Validation failures do not
//! raise a synchronous error to the original caller (there is no caller on
//! this path); they publish a structured `CheckoutFailed` payload to a
//! dedicated error channel and acknowledge the message.

use crate::handlers::OrderScope;
use crate::service::{OrderError, OrderItemRequest};
use bazaar_contracts::{CartCheckout, CheckoutFailed, ProductId};
use bazaar_core::broker::publish_event;
use bazaar_runtime::consumer::HandlerError;
use std::collections::HashMap;

/// Queue the cart service publishes checkout requests to (default exchange).
pub const CHECKOUT_QUEUE: &str = "cart.checkout";

/// Dead-letter queue for [`CHECKOUT_QUEUE`].
pub const CHECKOUT_DLQ: &str = "cart.checkout.dlq";

/// Error channel for checkout requests that fail validation.
pub const CHECKOUT_ERROR_QUEUE: &str = "cart.checkout.error";

/// Handle one checkout request.
///
/// Every item is validated against a catalog snapshot fetched now. Unknown
/// products and over-stock quantities are collected into one
/// `CheckoutFailed` report; only a fully valid cart creates an order (which
/// publishes `OrderCreated`).
///
/// # Errors
///
/// Catalog and broker failures are returned as transient so the message
/// requeues; validation failures are reported on the error channel and the
/// message is acknowledged.
pub async fn handle_cart_checkout(
    scope: OrderScope,
    message: CartCheckout,
) -> Result<(), HandlerError> {
    tracing::info!(
        user = %message.user_id,
        items = message.items.len(),
        "Received cart checkout request"
    );

    let product_ids: Vec<ProductId> = message.items.iter().map(|i| i.product_id).collect();
    let products = scope
        .catalog
        .products_info(product_ids)
        .await
        .map_err(HandlerError::retry)?;
    let by_id: HashMap<ProductId, _> = products.into_iter().map(|p| (p.id, p)).collect();

    let mut failures: Vec<String> = Vec::new();
    for item in &message.items {
        match by_id.get(&item.product_id) {
            None => failures.push(format!("product {} not found in catalog", item.product_id)),
            Some(product) if item.quantity > product.stock_quantity => failures.push(format!(
                "'{}': requested {}, available {}",
                product.name, item.quantity, product.stock_quantity
            )),
            Some(_) => {},
        }
    }

    if !failures.is_empty() {
        return report_failure(&scope, &message, failures.join(", ")).await;
    }

    let items: Vec<OrderItemRequest> = message
        .items
        .iter()
        .map(|item| OrderItemRequest {
            product_id: item.product_id,
            quantity: item.quantity,
        })
        .collect();

    match scope
        .orders
        .create_order(message.user_id, message.delivery_address.clone(), items)
        .await
    {
        Ok(order) => {
            tracing::info!(order = %order.id, user = %message.user_id, "Created order from checkout");
            Ok(())
        },
        // Stock may have moved between validation and creation; report it
        // the same way instead of raising.
        Err(
            err @ (OrderError::InsufficientStock { .. }
            | OrderError::ProductNotFound(_)
            | OrderError::ProductsNotFound(_)),
        ) => report_failure(&scope, &message, err.to_string()).await,
        Err(err) => Err(HandlerError::retry(err)),
    }
}

async fn report_failure(
    scope: &OrderScope,
    message: &CartCheckout,
    details: String,
) -> Result<(), HandlerError> {
    tracing::warn!(
        user = %message.user_id,
        %details,
        "Checkout failed stock validation, reporting on error channel"
    );

    let failed = CheckoutFailed {
        user_id: message.user_id,
        error: "Some items are unavailable".to_string(),
        details,
    };
    publish_event(scope.broker.as_ref(), &failed)
        .await
        .map_err(HandlerError::retry)?;
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)] // Panics: assertions in tests
mod tests {
    use super::*;
    use crate::catalog::{InMemoryCatalog, ProductInfo};
    use crate::handlers::topology;
    use crate::repository::{InMemoryOrderRepository, OrderRepository};
    use crate::service::OrderService;
    use bazaar_contracts::{CartItem, Money, UserId};
    use bazaar_core::broker::Broker;
    use bazaar_core::event::Event;
    use bazaar_testing::{InMemoryBroker, test_clock};
    use std::sync::Arc;

    struct Fixture {
        broker: Arc<InMemoryBroker>,
        repository: Arc<InMemoryOrderRepository>,
        scope: OrderScope,
    }

    async fn fixture() -> Fixture {
        let broker = Arc::new(InMemoryBroker::new());
        broker.declare_topology(&topology()).await.unwrap();

        let catalog = Arc::new(InMemoryCatalog::new());
        catalog.insert(ProductInfo {
            id: ProductId::new(1),
            name: "Teapot".to_string(),
            price: Money::from_cents(12_00),
            stock_quantity: 2,
            attributes: None,
        });

        let repository = Arc::new(InMemoryOrderRepository::new());
        let orders = Arc::new(OrderService::new(
            repository.clone(),
            catalog.clone(),
            broker.clone(),
            Arc::new(test_clock()),
        ));

        Fixture {
            broker: broker.clone(),
            repository,
            scope: OrderScope {
                orders,
                catalog,
                broker,
            },
        }
    }

    fn checkout(quantity: u32) -> CartCheckout {
        CartCheckout {
            user_id: UserId::new(),
            delivery_address: "1 Market St".to_string(),
            items: vec![CartItem {
                product_id: ProductId::new(1),
                quantity,
            }],
        }
    }

    #[tokio::test]
    async fn valid_checkout_creates_an_order() {
        let f = fixture().await;

        handle_cart_checkout(f.scope.clone(), checkout(2)).await.unwrap();

        let orders = f.repository.list().await.unwrap();
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].total_price, Money::from_cents(24_00));
        assert!(f.broker.peek_queue(CHECKOUT_ERROR_QUEUE).is_empty());
    }

    #[tokio::test]
    async fn over_stock_checkout_reports_on_error_channel_without_order() {
        let f = fixture().await;

        handle_cart_checkout(f.scope.clone(), checkout(5)).await.unwrap();

        assert!(f.repository.list().await.unwrap().is_empty());

        let errors = f.broker.peek_queue(CHECKOUT_ERROR_QUEUE);
        assert_eq!(errors.len(), 1);
        let failed = CheckoutFailed::from_bytes(&errors[0].body).unwrap();
        assert!(failed.details.contains("requested 5, available 2"));
    }

    #[tokio::test]
    async fn unknown_product_joins_the_error_report() {
        let f = fixture().await;
        let mut message = checkout(1);
        message.items.push(CartItem {
            product_id: ProductId::new(99),
            quantity: 1,
        });

        handle_cart_checkout(f.scope.clone(), message).await.unwrap();

        assert!(f.repository.list().await.unwrap().is_empty());
        let errors = f.broker.peek_queue(CHECKOUT_ERROR_QUEUE);
        assert_eq!(errors.len(), 1);
        let failed = CheckoutFailed::from_bytes(&errors[0].body).unwrap();
        assert!(failed.details.contains("product 99 not found"));
    }
}
