//! Checkout: turns the priced cart into a `placeOrder` mutation.

use std::sync::Arc;

use agromart_api_types::{NewOrder, OrderItem};
use serde_json::Value;
use thiserror::Error;
use tracing::{info, instrument};

use crate::cache::{Mutation, MutationError, QueryClient};
use crate::cart::{CartProjection, CartSummary};
use crate::infra::session::Session;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CartError {
    #[error("cart has no purchasable items")]
    Empty,
}

#[derive(Debug, Error)]
pub enum CheckoutError {
    #[error("sign in before placing an order")]
    NotAuthenticated,
    #[error(transparent)]
    Cart(#[from] CartError),
    #[error(transparent)]
    Mutation(#[from] MutationError),
}

/// Result of a successful checkout.
#[derive(Debug, Clone)]
pub struct PlacedOrder {
    pub order: NewOrder,
    pub response: Value,
}

/// Order payload for the priced lines; each line carries its current price.
pub fn build_order(summary: &CartSummary) -> Result<NewOrder, CartError> {
    if summary.is_empty() {
        return Err(CartError::Empty);
    }

    let items = summary
        .lines
        .iter()
        .map(|line| OrderItem {
            product_id: line.product_id.clone(),
            quantity: line.quantity,
            price_at_purchase: line.unit_price,
        })
        .collect();

    Ok(NewOrder {
        items,
        total_amount: summary.total,
    })
}

#[derive(Clone)]
pub struct CheckoutService {
    client: QueryClient,
    projection: CartProjection,
    session: Arc<Session>,
}

impl CheckoutService {
    pub fn new(client: QueryClient, projection: CartProjection, session: Arc<Session>) -> Self {
        Self {
            client,
            projection,
            session,
        }
    }

    /// Resolve the product listing and price the cart.
    pub async fn summary(&self) -> CartSummary {
        let (_, summary) = self.projection.load().await;
        summary
    }

    /// Place the order for the priced cart. The cart is cleared only once the
    /// backend accepted the order.
    #[instrument(skip(self))]
    pub async fn place_order(&self) -> Result<PlacedOrder, CheckoutError> {
        if !self.session.is_authenticated() {
            return Err(CheckoutError::NotAuthenticated);
        }

        let summary = self.summary().await;
        let order = build_order(&summary)?;

        let response = self
            .client
            .mutate_value(&Mutation::PlaceOrder(order.clone()))
            .await?;

        self.projection.cart().clear();
        info!(
            lines = order.items.len(),
            total_amount = order.total_amount,
            "Order placed"
        );

        Ok(PlacedOrder { order, response })
    }
}

#[cfg(test)]
mod tests {
    use agromart_api_types::ProductCategory;

    use super::*;
    use crate::cart::CartLine;

    fn line(id: &str, price: f64, quantity: u32) -> CartLine {
        CartLine {
            product_id: id.to_string(),
            name: id.to_string(),
            category: ProductCategory::Organic,
            unit_price: price,
            quantity,
            stock_quantity: 10,
        }
    }

    #[test]
    fn empty_summary_cannot_be_ordered() {
        assert_eq!(build_order(&CartSummary::default()), Err(CartError::Empty));
    }

    #[test]
    fn order_carries_purchase_prices_and_total() {
        let summary = CartSummary {
            lines: vec![line("p1", 50.0, 2), line("p2", 30.0, 1)],
            total: 130.0,
            item_count: 3,
        };

        let order = build_order(&summary).expect("order");

        assert_eq!(order.total_amount, 130.0);
        assert_eq!(
            order.items,
            vec![
                OrderItem {
                    product_id: "p1".to_string(),
                    quantity: 2,
                    price_at_purchase: 50.0,
                },
                OrderItem {
                    product_id: "p2".to_string(),
                    quantity: 1,
                    price_at_purchase: 30.0,
                },
            ]
        );
    }
}
