//! Cart quantity map and its shared, observable holder.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use tracing::debug;

use crate::cache::lock::mutex_lock;

const SOURCE: &str = "cart::state";

/// productId → quantity. Every stored quantity is at least 1.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CartState {
    items: BTreeMap<String, u32>,
}

impl CartState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Increment by one, inserting at 1 when absent.
    pub fn add(&mut self, product_id: &str) {
        let quantity = self.items.entry(product_id.to_string()).or_insert(0);
        *quantity = quantity.saturating_add(1);
    }

    /// Decrement by one; the line disappears instead of reaching 0.
    pub fn remove(&mut self, product_id: &str) {
        match self.items.get_mut(product_id) {
            Some(quantity) if *quantity > 1 => *quantity -= 1,
            Some(_) => {
                self.items.remove(product_id);
            }
            None => {}
        }
    }

    /// Set an explicit quantity; zero or negative deletes the line.
    pub fn set_quantity(&mut self, product_id: &str, quantity: i64) {
        if quantity <= 0 {
            self.items.remove(product_id);
            return;
        }
        let quantity = u32::try_from(quantity).unwrap_or(u32::MAX);
        self.items.insert(product_id.to_string(), quantity);
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn quantity(&self, product_id: &str) -> u32 {
        self.items.get(product_id).copied().unwrap_or(0)
    }

    /// Lines in product-id order.
    pub fn items(&self) -> impl Iterator<Item = (&str, u32)> {
        self.items.iter().map(|(id, qty)| (id.as_str(), *qty))
    }

    /// Sum of quantities, as shown on the cart badge.
    pub fn total_items(&self) -> u32 {
        self.items.values().fold(0, |sum, qty| sum.saturating_add(*qty))
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

pub type CartListener = Arc<dyn Fn(&CartState) + Send + Sync>;

/// Session cart shared between the UI and derived projections.
///
/// Mutations go through this holder so every change notifies listeners.
/// Listeners run after the lock is released and receive a snapshot.
pub struct Cart {
    state: Mutex<CartState>,
    listeners: Mutex<Vec<(u64, CartListener)>>,
    next_listener: AtomicU64,
}

impl Cart {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(CartState::new()),
            listeners: Mutex::new(Vec::new()),
            next_listener: AtomicU64::new(0),
        })
    }

    pub fn snapshot(&self) -> CartState {
        mutex_lock(&self.state, SOURCE, "snapshot").clone()
    }

    pub fn add_item(&self, product_id: &str) {
        self.update("add_item", |state| state.add(product_id));
    }

    pub fn remove_item(&self, product_id: &str) {
        self.update("remove_item", |state| state.remove(product_id));
    }

    pub fn set_quantity(&self, product_id: &str, quantity: i64) {
        self.update("set_quantity", |state| {
            state.set_quantity(product_id, quantity)
        });
    }

    pub fn clear(&self) {
        self.update("clear", CartState::clear);
    }

    pub fn subscribe<F>(self: &Arc<Self>, listener: F) -> CartSubscription
    where
        F: Fn(&CartState) + Send + Sync + 'static,
    {
        let id = self.next_listener.fetch_add(1, Ordering::Relaxed);
        mutex_lock(&self.listeners, SOURCE, "subscribe").push((id, Arc::new(listener)));
        CartSubscription {
            cart: Arc::downgrade(self),
            id,
        }
    }

    fn update(&self, op: &'static str, change: impl FnOnce(&mut CartState)) {
        let snapshot = {
            let mut state = mutex_lock(&self.state, SOURCE, op);
            let before = state.clone();
            change(&mut *state);
            if *state == before {
                return;
            }
            state.clone()
        };

        debug!(op, lines = snapshot.len(), items = snapshot.total_items(), "Cart updated");
        let listeners: Vec<CartListener> = mutex_lock(&self.listeners, SOURCE, "notify")
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect();
        for listener in listeners {
            listener(&snapshot);
        }
    }

    fn unsubscribe(&self, id: u64) {
        mutex_lock(&self.listeners, SOURCE, "unsubscribe").retain(|(listener, _)| *listener != id);
    }
}

/// Listener registration on a [`Cart`]; removed on drop.
pub struct CartSubscription {
    cart: Weak<Cart>,
    id: u64,
}

impl Drop for CartSubscription {
    fn drop(&mut self) {
        if let Some(cart) = self.cart.upgrade() {
            cart.unsubscribe(self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;

    #[test]
    fn add_inserts_then_increments() {
        let mut cart = CartState::new();
        cart.add("p1");
        cart.add("p1");
        cart.add("p2");
        assert_eq!(cart.quantity("p1"), 2);
        assert_eq!(cart.quantity("p2"), 1);
        assert_eq!(cart.total_items(), 3);
        assert_eq!(cart.len(), 2);
    }

    #[test]
    fn remove_never_goes_below_one() {
        let mut cart = CartState::new();
        cart.add("p1");
        for _ in 0..3 {
            cart.remove("p1");
        }
        assert_eq!(cart.quantity("p1"), 0);
        assert!(cart.is_empty());
    }

    #[test]
    fn set_quantity_deletes_non_positive() {
        let mut cart = CartState::new();
        cart.set_quantity("p1", 5);
        assert_eq!(cart.quantity("p1"), 5);
        cart.set_quantity("p1", 0);
        assert!(cart.is_empty());

        cart.set_quantity("p2", 3);
        cart.set_quantity("p2", -4);
        assert!(cart.is_empty());
    }

    #[test]
    fn items_are_ordered_by_product_id() {
        let mut cart = CartState::new();
        cart.add("b");
        cart.add("a");
        let ids: Vec<&str> = cart.items().map(|(id, _)| id).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn cart_notifies_only_on_change() {
        let cart = Cart::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let subscription = cart.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        cart.add_item("p1");
        cart.remove_item("missing");
        cart.set_quantity("p1", 1);
        cart.clear();
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        drop(subscription);
        cart.add_item("p1");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
