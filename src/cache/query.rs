//! Query executor.
//!
//! Serves fresh cached data without touching the network, attaches concurrent
//! callers to the one in-flight request for a key, and otherwise starts exactly
//! one fetch whose completion is written back through the store.

use std::sync::Arc;
use std::time::Instant;

use futures::FutureExt;
use metrics::{counter, histogram};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::runtime::Handle;
use tracing::{debug, instrument, warn};

use super::endpoints;
use super::entry::{EntryPatch, Flight, QueryStatus, SharedFetch, UpsertOutcome};
use super::keys::CacheKey;
use super::store::ResourceCacheStore;
use super::transport::{Transport, TransportError};

pub(crate) const METRIC_QUERY_TOTAL: &str = "agromart_cache_query_total";
pub(crate) const METRIC_FETCH_MS: &str = "agromart_cache_fetch_ms";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueryOptions {
    /// Do not fetch or touch the cache; the caller observes `Uninitialized`.
    pub skip: bool,
    /// Start a new request even when cached data is fresh.
    pub force: bool,
}

impl QueryOptions {
    pub fn forced() -> Self {
        Self {
            force: true,
            ..Self::default()
        }
    }

    pub fn skipped() -> Self {
        Self {
            skip: true,
            ..Self::default()
        }
    }
}

/// What one `query` call observed.
#[derive(Debug, Clone)]
pub struct QueryResult {
    pub status: QueryStatus,
    pub data: Option<Arc<Value>>,
    pub error: Option<TransportError>,
    pub is_stale: bool,
    /// Served from cache without waiting on a request.
    pub from_cache: bool,
}

impl QueryResult {
    pub fn skipped() -> Self {
        Self {
            status: QueryStatus::Uninitialized,
            data: None,
            error: None,
            is_stale: false,
            from_cache: false,
        }
    }

    fn cached(data: Arc<Value>) -> Self {
        Self {
            status: QueryStatus::Success,
            data: Some(data),
            error: None,
            is_stale: false,
            from_cache: true,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == QueryStatus::Success
    }

    /// Decode the data into a typed value, if there is any.
    pub fn decode<T: DeserializeOwned>(&self) -> Option<Result<T, serde_json::Error>> {
        self.data.as_deref().map(T::deserialize)
    }
}

#[derive(Clone)]
pub struct QueryExecutor {
    store: Arc<ResourceCacheStore>,
    transport: Arc<dyn Transport>,
}

impl QueryExecutor {
    pub fn new(store: Arc<ResourceCacheStore>, transport: Arc<dyn Transport>) -> Self {
        Self { store, transport }
    }

    /// Resolve `key`, reusing fresh data or an in-flight request when allowed.
    ///
    /// Keys missing a required identifier behave as if `skip` were set.
    #[instrument(skip(self), fields(key = %key))]
    pub async fn query(&self, key: &CacheKey, options: QueryOptions) -> QueryResult {
        if options.skip || !key.is_complete() {
            counter!(METRIC_QUERY_TOTAL, "outcome" => "skip").increment(1);
            return QueryResult::skipped();
        }

        match self.begin(key, options.force) {
            UpsertOutcome::Fresh(data) => {
                counter!(METRIC_QUERY_TOTAL, "outcome" => "hit").increment(1);
                QueryResult::cached(data)
            }
            UpsertOutcome::Joined(flight) => {
                counter!(METRIC_QUERY_TOTAL, "outcome" => "join").increment(1);
                debug!(generation = flight.generation(), "Attached to in-flight request");
                self.await_flight(key, flight).await
            }
            UpsertOutcome::Started(flight) => {
                counter!(METRIC_QUERY_TOTAL, "outcome" => "fetch").increment(1);
                drive(&flight);
                self.await_flight(key, flight).await
            }
            UpsertOutcome::Applied | UpsertOutcome::Discarded => self.current(key),
        }
    }

    /// Start a background refetch of an invalidated key.
    ///
    /// Returns false when nothing was started: the key is incomplete, a
    /// post-invalidation request is already running, or there is no runtime to
    /// drive the request (the entry then stays stale until the next query).
    pub(crate) fn refetch(&self, key: &CacheKey) -> bool {
        if !key.is_complete() || Handle::try_current().is_err() {
            return false;
        }
        match self.begin(key, false) {
            UpsertOutcome::Started(flight) => {
                counter!(METRIC_QUERY_TOTAL, "outcome" => "refetch").increment(1);
                drive(&flight);
                true
            }
            _ => false,
        }
    }

    fn begin(&self, key: &CacheKey, force: bool) -> UpsertOutcome {
        let store = self.store.clone();
        let transport = self.transport.clone();
        let fetch_key = key.clone();

        self.store.upsert(
            key,
            EntryPatch::Begin {
                force,
                tags: endpoints::static_tags(key),
                start: Box::new(move |generation| fetch(store, transport, fetch_key, generation)),
            },
        )
    }

    async fn await_flight(&self, key: &CacheKey, flight: Flight) -> QueryResult {
        let outcome = flight.future().await;
        let entry = self.store.get(key);
        let is_stale = entry.as_ref().is_some_and(|e| e.is_stale());
        let latest = entry.and_then(|e| e.data().cloned());

        match outcome {
            Ok(data) => QueryResult {
                status: QueryStatus::Success,
                data: Some(latest.unwrap_or(data)),
                error: None,
                is_stale,
                from_cache: false,
            },
            Err(error) => QueryResult {
                status: QueryStatus::Error,
                data: latest,
                error: Some(error),
                is_stale,
                from_cache: false,
            },
        }
    }

    fn current(&self, key: &CacheKey) -> QueryResult {
        match self.store.get(key) {
            Some(entry) => QueryResult {
                status: entry.status(),
                data: entry.data().cloned(),
                error: entry.error().cloned(),
                is_stale: entry.is_stale(),
                from_cache: true,
            },
            None => QueryResult::skipped(),
        }
    }
}

/// Spawn the request so it completes even if every caller goes away.
fn drive(flight: &Flight) {
    match Handle::try_current() {
        Ok(handle) => {
            handle.spawn(flight.future());
        }
        Err(_) => warn!(
            generation = flight.generation(),
            "No async runtime; request only progresses while awaited"
        ),
    }
}

fn fetch(
    store: Arc<ResourceCacheStore>,
    transport: Arc<dyn Transport>,
    key: CacheKey,
    generation: u64,
) -> SharedFetch {
    async move {
        let started_at = Instant::now();
        let outcome = transport.fetch_resource(&key).await.map(Arc::new);

        histogram!(
            METRIC_FETCH_MS,
            "kind" => key.kind().as_str(),
            "result" => if outcome.is_ok() { "ok" } else { "error" }
        )
        .record(started_at.elapsed().as_secs_f64() * 1000.0);

        match &outcome {
            Ok(data) => {
                let tags = endpoints::provided_tags(&key, data);
                store.upsert(
                    &key,
                    EntryPatch::Fulfilled {
                        generation,
                        data: data.clone(),
                        tags,
                    },
                );
            }
            Err(error) => {
                warn!(
                    key = %key,
                    generation,
                    status = ?error.status_code(),
                    error = %error,
                    "Resource fetch failed"
                );
                store.upsert(
                    &key,
                    EntryPatch::Rejected {
                        generation,
                        error: error.clone(),
                    },
                );
            }
        }
        outcome
    }
    .boxed()
    .shared()
}
