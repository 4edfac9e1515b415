//! Client core of the Agromart land and pest-control marketplace.
//!
//! [`cache`] keeps REST resources in a deduplicating, tag-invalidated query
//! cache; [`cart`] derives priced cart lines from it; [`application`] layers
//! authentication and checkout on top; [`infra`] provides the HTTP transport,
//! session state and telemetry.

pub mod application;
pub mod cache;
pub mod cart;
pub mod config;
pub mod infra;
