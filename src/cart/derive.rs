//! Cart aggregate derivation.
//!
//! Joins the cart's quantity map against products from the cache. Only
//! products from entries that are resolved, not stale and not failed take
//! part; lines whose product is missing from that set are dropped rather than
//! priced from old data.

use std::collections::HashMap;

use agromart_api_types::{Product, ProductCategory};
use serde::Serialize;
use tracing::debug;

use super::state::CartState;
use crate::cache::{CacheEntry, CacheKey, QueryStatus, ResourceCacheStore, ResourceKind};

/// One priced cart line.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CartLine {
    pub product_id: String,
    pub name: String,
    pub category: ProductCategory,
    pub unit_price: f64,
    pub quantity: u32,
    pub stock_quantity: i64,
}

impl CartLine {
    pub fn line_total(&self) -> f64 {
        self.unit_price * f64::from(self.quantity)
    }

    /// More units requested than the product has in stock.
    pub fn exceeds_stock(&self) -> bool {
        i64::from(self.quantity) > self.stock_quantity
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CartSummary {
    /// Lines in product-id order.
    pub lines: Vec<CartLine>,
    /// Σ price × quantity over `lines`.
    pub total: f64,
    /// Σ quantity over `lines`.
    pub item_count: u32,
}

impl CartSummary {
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn line(&self, product_id: &str) -> Option<&CartLine> {
        self.lines.iter().find(|line| line.product_id == product_id)
    }

    pub fn has_stock_shortfall(&self) -> bool {
        self.lines.iter().any(CartLine::exceeds_stock)
    }
}

/// Products currently usable for pricing, by id.
#[derive(Debug, Clone, Default)]
pub struct ProductCatalog {
    products: HashMap<String, Product>,
}

impl ProductCatalog {
    pub fn from_products(products: impl IntoIterator<Item = Product>) -> Self {
        Self {
            products: products
                .into_iter()
                .map(|product| (product.id.clone(), product))
                .collect(),
        }
    }

    /// Collect products from every usable `Products` entry.
    pub fn from_entries<'a>(entries: impl IntoIterator<Item = &'a CacheEntry>) -> Self {
        let mut catalog = Self::default();
        for entry in entries {
            if entry.key().kind() != ResourceKind::Products
                || entry.is_stale()
                || entry.status() == QueryStatus::Error
            {
                continue;
            }
            match entry.decode::<Vec<Product>>() {
                Some(Ok(products)) => catalog.extend(products),
                Some(Err(error)) => {
                    debug!(key = %entry.key(), error = %error, "Product entry skipped: undecodable");
                }
                None => {}
            }
        }
        catalog
    }

    /// Products from the `key` entry of `store`, if it is usable.
    pub fn from_store(store: &ResourceCacheStore, key: &CacheKey) -> Self {
        Self::from_entries(store.get(key).as_ref())
    }

    pub fn get(&self, product_id: &str) -> Option<&Product> {
        self.products.get(product_id)
    }

    pub fn len(&self) -> usize {
        self.products.len()
    }

    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }

    fn extend(&mut self, products: Vec<Product>) {
        for product in products {
            self.products.insert(product.id.clone(), product);
        }
    }
}

/// Pure derivation of priced lines and totals.
pub fn derive_cart(cart: &CartState, catalog: &ProductCatalog) -> CartSummary {
    let mut summary = CartSummary::default();

    for (product_id, quantity) in cart.items() {
        let Some(product) = catalog.get(product_id) else {
            continue;
        };
        let line = CartLine {
            product_id: product_id.to_string(),
            name: product.name.clone(),
            category: product.category,
            unit_price: product.price,
            quantity,
            stock_quantity: product.stock_quantity,
        };
        summary.total += line.line_total();
        summary.item_count = summary.item_count.saturating_add(quantity);
        summary.lines.push(line);
    }

    summary
}
