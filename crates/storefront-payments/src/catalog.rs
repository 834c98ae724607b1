//! Product Catalog
//!
//! Active products with their active prices attached.

use std::sync::Arc;

use serde::Serialize;

use crate::error::Result;
use crate::provider::{BillingProvider, Price, Product};

/// A product together with the prices that reference it
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CatalogProduct {
    #[serde(flatten)]
    pub product: Product,
    pub prices: Vec<Price>,
}

pub struct CatalogReader {
    provider: Arc<dyn BillingProvider>,
}

impl CatalogReader {
    pub fn new(provider: Arc<dyn BillingProvider>) -> Self {
        Self { provider }
    }

    /// Fetch one page each of active products and prices, then join them
    pub async fn list(&self) -> Result<Vec<CatalogProduct>> {
        let (products, prices) = tokio::try_join!(
            self.provider.list_active_products(),
            self.provider.list_active_prices(),
        )?;

        tracing::debug!(
            products = products.len(),
            prices = prices.len(),
            "Fetched catalog"
        );
        Ok(join_prices(products, &prices))
    }
}

/// Attach to each product the prices whose `product` matches its id.
///
/// Price order follows the price listing; products without prices keep an
/// empty list.
pub fn join_prices(products: Vec<Product>, prices: &[Price]) -> Vec<CatalogProduct> {
    products
        .into_iter()
        .map(|product| {
            let prices = prices
                .iter()
                .filter(|price| price.product == product.id)
                .cloned()
                .collect();
            CatalogProduct { product, prices }
        })
        .collect()
}
