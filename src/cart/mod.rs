//! Shopping cart: the local quantity map and its priced projection over the
//! product cache.

mod derive;
mod projection;
mod state;

pub use derive::{CartLine, CartSummary, ProductCatalog, derive_cart};
pub use projection::{CartProjection, CartWatch};
pub use state::{Cart, CartListener, CartState, CartSubscription};
