//! Invalidation trigger.
//!
//! Publishes invalidation events and, by default, consumes them immediately
//! so staleness is visible before the triggering call returns.

use std::sync::Arc;

use tracing::debug;

use super::consumer::{InvalidationConsumer, InvalidationReport};
use super::events::{InvalidationQueue, InvalidationSource};
use super::keys::Tag;
use super::mutation::MutationKind;

pub struct InvalidationTrigger {
    queue: Arc<InvalidationQueue>,
    consumer: Arc<InvalidationConsumer>,
}

impl InvalidationTrigger {
    pub fn new(queue: Arc<InvalidationQueue>, consumer: Arc<InvalidationConsumer>) -> Self {
        Self { queue, consumer }
    }

    /// Publish `tags` and optionally consume right away.
    ///
    /// Returns the consumption report when one ran. An empty tag list is not
    /// published.
    pub fn trigger(
        &self,
        source: InvalidationSource,
        tags: Vec<Tag>,
        consume_now: bool,
    ) -> Option<InvalidationReport> {
        if tags.is_empty() {
            debug!(source = %source, "Invalidation trigger skipped: no tags");
            return None;
        }

        self.queue.publish(source, tags);
        consume_now.then(|| self.consumer.consume())
    }

    pub fn mutation_succeeded(
        &self,
        kind: MutationKind,
        tags: Vec<Tag>,
    ) -> Option<InvalidationReport> {
        self.trigger(InvalidationSource::Mutation(kind), tags, true)
    }

    pub fn invalidate(&self, tags: Vec<Tag>) -> Option<InvalidationReport> {
        self.trigger(InvalidationSource::Manual, tags, true)
    }

    pub fn queue(&self) -> &Arc<InvalidationQueue> {
        &self.queue
    }

    pub fn consumer(&self) -> &Arc<InvalidationConsumer> {
        &self.consumer
    }
}
