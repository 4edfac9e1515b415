//! Invalidation consumer.
//!
//! Drains pending invalidation events, merges them into a plan, marks every
//! affected entry stale, and then starts a refetch for each affected entry
//! that still has subscribers.

use std::sync::Arc;
use std::time::Instant;

use metrics::{counter, histogram};
use tracing::{debug, info, instrument};
use uuid::Uuid;

use super::config::CacheConfig;
use super::entry::{EntryPatch, UpsertOutcome};
use super::events::InvalidationQueue;
use super::keys::CacheKey;
use super::planner::InvalidationPlan;
use super::query::QueryExecutor;
use super::registry::TagIndex;
use super::store::ResourceCacheStore;

pub(crate) const METRIC_INVALIDATE_MS: &str = "agromart_cache_invalidate_ms";
pub(crate) const METRIC_INVALIDATED_KEYS: &str = "agromart_cache_invalidated_keys_total";

/// What one consumption pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InvalidationReport {
    pub events: usize,
    /// Keys marked stale, in key order.
    pub invalidated: Vec<CacheKey>,
    /// Subscribed keys whose refetch was started.
    pub refetching: Vec<CacheKey>,
}

impl InvalidationReport {
    pub fn is_empty(&self) -> bool {
        self.events == 0
    }
}

pub struct InvalidationConsumer {
    config: CacheConfig,
    store: Arc<ResourceCacheStore>,
    tags: Arc<TagIndex>,
    queue: Arc<InvalidationQueue>,
    queries: QueryExecutor,
}

impl InvalidationConsumer {
    pub fn new(
        config: CacheConfig,
        store: Arc<ResourceCacheStore>,
        tags: Arc<TagIndex>,
        queue: Arc<InvalidationQueue>,
        queries: QueryExecutor,
    ) -> Self {
        Self {
            config,
            store,
            tags,
            queue,
            queries,
        }
    }

    /// Consume every pending event.
    ///
    /// Staleness is applied synchronously; refetches are spawned and finish
    /// after this returns.
    #[instrument(skip(self))]
    pub fn consume(&self) -> InvalidationReport {
        let started_at = Instant::now();
        let mut report = InvalidationReport::default();

        loop {
            let events = self.queue.drain(self.config.consume_batch_limit());
            if events.is_empty() {
                break;
            }

            let event_ids: Vec<Uuid> = events.iter().map(|e| e.id).collect();
            let plan = InvalidationPlan::from_events(events);
            info!(
                event_count = event_ids.len(),
                event_ids = ?event_ids,
                plan = %plan,
                "Invalidation consumption starting"
            );

            report.events += plan.event_count;
            self.apply(&plan, &mut report);
        }

        if report.is_empty() {
            return report;
        }

        info!(
            events = report.events,
            invalidated = report.invalidated.len(),
            refetching = report.refetching.len(),
            "Invalidation consumption complete"
        );
        counter!(METRIC_INVALIDATED_KEYS).increment(report.invalidated.len() as u64);
        histogram!(METRIC_INVALIDATE_MS).record(started_at.elapsed().as_secs_f64() * 1000.0);
        report
    }

    fn apply(&self, plan: &InvalidationPlan, report: &mut InvalidationReport) {
        let mut keys: Vec<CacheKey> = self.tags.keys_for_tags(&plan.tags).into_iter().collect();
        keys.sort_by_cached_key(ToString::to_string);

        // Every affected entry is stale before any refetch can resolve.
        for key in &keys {
            if matches!(
                self.store.upsert(key, EntryPatch::Invalidated),
                UpsertOutcome::Applied
            ) {
                report.invalidated.push(key.clone());
            }
        }

        for key in &keys {
            let subscribed = self
                .store
                .get(key)
                .is_some_and(|entry| entry.subscriber_count() > 0);
            if !subscribed {
                debug!(key = %key, "Stale entry left for the next query");
                continue;
            }
            if self.queries.refetch(key) {
                report.refetching.push(key.clone());
            }
        }
    }
}
