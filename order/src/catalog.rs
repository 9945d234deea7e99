//! Catalog collaborator: synchronous product reads.
//!
//! Stock figures used during order creation and checkout validation are a
//! read-only snapshot fetched at validation time; the catalog is an
//! external service reached over a plain request/response lookup, not part
//! of the choreography.

use bazaar_contracts::{Money, ProductId};
use futures::future::BoxFuture;
use std::collections::HashMap;
use std::sync::Mutex;
use thiserror::Error;

/// Product snapshot returned by the catalog.
#[derive(Clone, Debug, PartialEq)]
pub struct ProductInfo {
    /// Catalog product key.
    pub id: ProductId,
    /// Display name.
    pub name: String,
    /// Current unit price.
    pub price: Money,
    /// Units currently in stock.
    pub stock_quantity: u32,
    /// Free-form product attributes.
    pub attributes: Option<serde_json::Value>,
}

/// Errors from the catalog lookup.
#[derive(Error, Debug, Clone)]
pub enum CatalogError {
    /// The catalog service could not be reached.
    #[error("catalog unavailable: {0}")]
    Unavailable(String),
}

/// Read-only product lookup on the catalog service.
pub trait ProductCatalog: Send + Sync {
    /// Fetch snapshots for the given product ids.
    ///
    /// Unknown ids are simply absent from the result; callers decide what a
    /// missing product means.
    fn products_info(
        &self,
        ids: Vec<ProductId>,
    ) -> BoxFuture<'_, Result<Vec<ProductInfo>, CatalogError>>;
}

/// Map-backed catalog for tests and demos.
#[derive(Debug, Default)]
pub struct InMemoryCatalog {
    products: Mutex<HashMap<ProductId, ProductInfo>>,
}

impl InMemoryCatalog {
    /// Create an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a product snapshot.
    pub fn insert(&self, product: ProductInfo) {
        if let Ok(mut products) = self.products.lock() {
            products.insert(product.id, product);
        }
    }

    /// Adjust the stock figure for a product, if present.
    pub fn set_stock(&self, id: ProductId, stock_quantity: u32) {
        if let Ok(mut products) = self.products.lock() {
            if let Some(product) = products.get_mut(&id) {
                product.stock_quantity = stock_quantity;
            }
        }
    }
}

impl ProductCatalog for InMemoryCatalog {
    fn products_info(
        &self,
        ids: Vec<ProductId>,
    ) -> BoxFuture<'_, Result<Vec<ProductInfo>, CatalogError>> {
        let result = self
            .products
            .lock()
            .map(|products| {
                ids.iter()
                    .filter_map(|id| products.get(id).cloned())
                    .collect()
            })
            .map_err(|_| CatalogError::Unavailable("catalog lock poisoned".to_string()));
        Box::pin(async move { result })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn teapot() -> ProductInfo {
        ProductInfo {
            id: ProductId::new(1),
            name: "Teapot".to_string(),
            price: Money::from_cents(12_00),
            stock_quantity: 3,
            attributes: None,
        }
    }

    #[tokio::test]
    async fn unknown_products_are_absent_from_the_result() {
        let catalog = InMemoryCatalog::new();
        catalog.insert(teapot());

        let found = catalog
            .products_info(vec![ProductId::new(1), ProductId::new(99)])
            .await
            .unwrap_or_default();

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "Teapot");
    }

    #[tokio::test]
    async fn set_stock_updates_the_snapshot() {
        let catalog = InMemoryCatalog::new();
        catalog.insert(teapot());
        catalog.set_stock(ProductId::new(1), 0);

        let found = catalog
            .products_info(vec![ProductId::new(1)])
            .await
            .unwrap_or_default();
        assert_eq!(found[0].stock_quantity, 0);
    }
}
