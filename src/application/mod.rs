//! Application services over the query cache and cart.

pub mod auth;
pub mod checkout;
pub mod error;
