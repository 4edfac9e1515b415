//! Agromart query cache.
//!
//! A client-side cache of REST resources with request deduplication,
//! tag-based invalidation and subscriber notification:
//!
//! - **Store**: owns every [`CacheEntry`] and notifies subscribers on change
//! - **Tag index**: maps invalidation tags to the keys that provide them
//! - **Query executor**: fresh hit, join in-flight, or exactly one fetch
//! - **Mutation executor**: one write, then invalidation through the
//!   event queue → planner → consumer pipeline
//!
//! ## Configuration
//!
//! ```toml
//! [cache]
//! max_idle_entries = 256
//! keep_unused_secs = 60
//! sweep_interval_secs = 30
//! consume_batch_limit = 100
//! ```

mod client;
mod config;
mod consumer;
pub mod endpoints;
mod entry;
mod events;
mod keys;
pub(crate) mod lock;
mod mutation;
mod planner;
mod query;
mod registry;
mod store;
mod transport;
mod trigger;

pub use client::QueryClient;
pub use config::CacheConfig;
pub use consumer::{InvalidationConsumer, InvalidationReport};
pub use entry::{CacheEntry, EntryPatch, FetchOutcome, Flight, QueryStatus, UpsertOutcome};
pub use events::{Epoch, InvalidationEvent, InvalidationQueue, InvalidationSource};
pub use keys::{CacheKey, QueryParams, ResourceKind, Tag, TagKind};
pub use mutation::{
    Mutation, MutationError, MutationExecutor, MutationKind, MutationOutcome, MutationRequest,
};
pub use planner::InvalidationPlan;
pub use query::{QueryExecutor, QueryOptions, QueryResult};
pub use registry::TagIndex;
pub use store::{Listener, ResourceCacheStore, Subscription};
pub use transport::{Transport, TransportError};
pub use trigger::InvalidationTrigger;

pub(crate) mod metric_names {
    pub(crate) use super::consumer::{METRIC_INVALIDATED_KEYS, METRIC_INVALIDATE_MS};
    pub(crate) use super::events::METRIC_QUEUE_LEN;
    pub(crate) use super::mutation::METRIC_MUTATION_TOTAL;
    pub(crate) use super::query::{METRIC_FETCH_MS, METRIC_QUERY_TOTAL};
    pub(crate) use super::store::{METRIC_CACHE_EVICTED, METRIC_CACHE_STALE_COMPLETION};
}
