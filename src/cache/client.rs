//! Query client.
//!
//! The explicit cache context: one store, tag index, invalidation pipeline and
//! pair of executors wired together. Create one per session (or per test);
//! nothing in the cache is process-global.

use std::sync::Arc;

use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::config::CacheConfig;
use super::consumer::{InvalidationConsumer, InvalidationReport};
use super::entry::CacheEntry;
use super::events::InvalidationQueue;
use super::keys::{CacheKey, Tag};
use super::mutation::{Mutation, MutationError, MutationExecutor, MutationOutcome};
use super::query::{QueryExecutor, QueryOptions, QueryResult};
use super::registry::TagIndex;
use super::store::{ResourceCacheStore, Subscription};
use super::transport::Transport;
use super::trigger::InvalidationTrigger;

#[derive(Clone)]
pub struct QueryClient {
    config: CacheConfig,
    store: Arc<ResourceCacheStore>,
    tags: Arc<TagIndex>,
    trigger: Arc<InvalidationTrigger>,
    queries: QueryExecutor,
    mutations: MutationExecutor,
}

impl QueryClient {
    pub fn new(config: CacheConfig, transport: Arc<dyn Transport>) -> Self {
        let tags = Arc::new(TagIndex::new());
        let store = Arc::new(ResourceCacheStore::new(&config, tags.clone()));
        let queue = Arc::new(InvalidationQueue::new());
        let queries = QueryExecutor::new(store.clone(), transport.clone());
        let consumer = Arc::new(InvalidationConsumer::new(
            config.clone(),
            store.clone(),
            tags.clone(),
            queue.clone(),
            queries.clone(),
        ));
        let trigger = Arc::new(InvalidationTrigger::new(queue, consumer));
        let mutations = MutationExecutor::new(transport, trigger.clone());

        Self {
            config,
            store,
            tags,
            trigger,
            queries,
            mutations,
        }
    }

    pub async fn query(&self, key: &CacheKey) -> QueryResult {
        self.queries.query(key, QueryOptions::default()).await
    }

    pub async fn query_with(&self, key: &CacheKey, options: QueryOptions) -> QueryResult {
        self.queries.query(key, options).await
    }

    /// Fetch `key` again even if the cached data is fresh.
    pub async fn refetch(&self, key: &CacheKey) -> QueryResult {
        self.queries.query(key, QueryOptions::forced()).await
    }

    pub fn subscribe<F>(&self, key: &CacheKey, listener: F) -> Subscription
    where
        F: Fn(&CacheEntry) + Send + Sync + 'static,
    {
        self.store.subscribe(key, listener)
    }

    /// Subscribe to `key`, then resolve it.
    ///
    /// The subscription is taken first, so the listener sees the loading and
    /// resolved transitions of this very query as well as later refetches.
    pub async fn watch<F>(
        &self,
        key: &CacheKey,
        options: QueryOptions,
        listener: F,
    ) -> (Subscription, QueryResult)
    where
        F: Fn(&CacheEntry) + Send + Sync + 'static,
    {
        let subscription = self.store.subscribe(key, listener);
        let result = self.queries.query(key, options).await;
        (subscription, result)
    }

    pub async fn mutate(&self, mutation: &Mutation) -> Result<MutationOutcome, MutationError> {
        self.mutations.mutate(mutation).await
    }

    /// Like [`mutate`](Self::mutate), keeping only the server response.
    pub async fn mutate_value(&self, mutation: &Mutation) -> Result<Value, MutationError> {
        self.mutations
            .mutate(mutation)
            .await
            .map(|outcome| outcome.response)
    }

    /// Mark every entry reached by `tags` stale and refetch the subscribed ones.
    pub fn invalidate(&self, tags: impl IntoIterator<Item = Tag>) -> InvalidationReport {
        self.trigger
            .invalidate(tags.into_iter().collect())
            .unwrap_or_default()
    }

    pub fn get(&self, key: &CacheKey) -> Option<CacheEntry> {
        self.store.get(key)
    }

    /// Evict idle entries past the keep-unused window.
    pub fn sweep(&self) -> Vec<CacheKey> {
        self.store.sweep()
    }

    /// Run [`sweep`](Self::sweep) every `sweep_interval` until the store is
    /// dropped or the handle aborted.
    pub fn spawn_sweeper(&self) -> JoinHandle<()> {
        let store = Arc::downgrade(&self.store);
        let period = self.config.sweep_interval();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(store) = store.upgrade() else {
                    debug!("Cache sweeper stopping: store dropped");
                    break;
                };
                let evicted = store.sweep();
                if !evicted.is_empty() {
                    debug!(evicted = evicted.len(), "Cache sweep evicted idle entries");
                }
            }
        })
    }

    /// Drop every entry, tag registration and pending invalidation.
    pub fn reset(&self) {
        self.trigger.queue().clear();
        self.store.clear();
        info!("Query cache reset");
    }

    pub fn store(&self) -> &Arc<ResourceCacheStore> {
        &self.store
    }

    pub fn tag_index(&self) -> &Arc<TagIndex> {
        &self.tags
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }
}
