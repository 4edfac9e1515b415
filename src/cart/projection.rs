//! Live cart projection.
//!
//! Recomputes the [`CartSummary`] whenever the cart or the product listing
//! entry it prices from changes. Nothing is memoized between the two sources.

use std::sync::Arc;

use crate::cache::{CacheKey, QueryClient, QueryOptions, QueryResult, Subscription};

use super::derive::{CartSummary, ProductCatalog, derive_cart};
use super::state::{Cart, CartSubscription};

#[derive(Clone)]
pub struct CartProjection {
    client: QueryClient,
    cart: Arc<Cart>,
    products_key: CacheKey,
}

impl CartProjection {
    /// Project `cart` against the unfiltered product listing.
    pub fn new(client: QueryClient, cart: Arc<Cart>) -> Self {
        Self::with_products_key(client, cart, CacheKey::products(None))
    }

    pub fn with_products_key(client: QueryClient, cart: Arc<Cart>, products_key: CacheKey) -> Self {
        Self {
            client,
            cart,
            products_key,
        }
    }

    pub fn cart(&self) -> &Arc<Cart> {
        &self.cart
    }

    pub fn products_key(&self) -> &CacheKey {
        &self.products_key
    }

    /// Derive from the current cart and the `products_key` entry.
    pub fn current(&self) -> CartSummary {
        let catalog = ProductCatalog::from_store(self.client.store(), &self.products_key);
        derive_cart(&self.cart.snapshot(), &catalog)
    }

    /// Resolve the product listing, then derive.
    pub async fn load(&self) -> (QueryResult, CartSummary) {
        let result = self
            .client
            .query_with(&self.products_key, QueryOptions::default())
            .await;
        (result, self.current())
    }

    /// Call `listener` with a fresh summary after every cart change and every
    /// product entry transition. Dropping the returned [`CartWatch`] stops it.
    ///
    /// Holding the watch keeps the products entry subscribed, so invalidating
    /// products refetches it eagerly.
    pub fn watch<F>(&self, listener: F) -> CartWatch
    where
        F: Fn(&CartSummary) + Send + Sync + 'static,
    {
        let listener = Arc::new(listener);

        let on_cart = {
            let projection = self.clone();
            let listener = listener.clone();
            move |_: &super::state::CartState| listener(&projection.current())
        };
        let on_products = {
            let projection = self.clone();
            move |_: &crate::cache::CacheEntry| listener(&projection.current())
        };

        CartWatch {
            _cart: self.cart.subscribe(on_cart),
            _products: self.client.subscribe(&self.products_key, on_products),
        }
    }
}

/// Active [`CartProjection::watch`]; unsubscribes from both sources on drop.
pub struct CartWatch {
    _cart: CartSubscription,
    _products: Subscription,
}
