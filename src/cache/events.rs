//! Invalidation events.
//!
//! Successful mutations (and explicit invalidation requests) publish an
//! [`InvalidationEvent`] onto an in-memory queue; the consumer drains and
//! merges them.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use metrics::gauge;
use time::OffsetDateTime;
use tracing::info;
use uuid::Uuid;

use super::keys::Tag;
use super::lock::mutex_lock;
use super::mutation::MutationKind;

const SOURCE: &str = "cache::events";

pub(crate) const METRIC_QUEUE_LEN: &str = "agromart_invalidation_queue_len";

/// Monotonic epoch for ordering events within this process.
pub type Epoch = u64;

/// What caused an invalidation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidationSource {
    Mutation(MutationKind),
    /// `QueryClient::invalidate` called directly.
    Manual,
}

impl fmt::Display for InvalidationSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mutation(kind) => write!(f, "mutation:{kind}"),
            Self::Manual => f.write_str("manual"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct InvalidationEvent {
    /// Unique identifier for idempotency (UUIDv4).
    pub id: Uuid,
    pub epoch: Epoch,
    pub source: InvalidationSource,
    pub tags: Vec<Tag>,
    pub timestamp: OffsetDateTime,
}

impl InvalidationEvent {
    pub fn new(source: InvalidationSource, tags: Vec<Tag>, epoch: Epoch) -> Self {
        Self {
            id: Uuid::new_v4(),
            epoch,
            source,
            tags,
            timestamp: OffsetDateTime::now_utc(),
        }
    }
}

/// FIFO of pending invalidations. Contention is low, so a mutex suffices.
pub struct InvalidationQueue {
    queue: Mutex<VecDeque<InvalidationEvent>>,
    epoch_counter: AtomicU64,
}

impl InvalidationQueue {
    pub fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            epoch_counter: AtomicU64::new(0),
        }
    }

    pub fn next_epoch(&self) -> Epoch {
        self.epoch_counter.fetch_add(1, Ordering::SeqCst)
    }

    /// Enqueue an event for `tags` and return its epoch.
    pub fn publish(&self, source: InvalidationSource, tags: Vec<Tag>) -> Epoch {
        let epoch = self.next_epoch();
        let event = InvalidationEvent::new(source, tags, epoch);

        info!(
            event_id = %event.id,
            event_epoch = event.epoch,
            source = %source,
            tags = ?event.tags.iter().map(ToString::to_string).collect::<Vec<_>>(),
            "Invalidation event enqueued"
        );

        let mut queue = mutex_lock(&self.queue, SOURCE, "publish");
        queue.push_back(event);
        gauge!(METRIC_QUEUE_LEN).set(queue.len() as f64);
        epoch
    }

    /// Drain up to `limit` events in FIFO order.
    pub fn drain(&self, limit: usize) -> Vec<InvalidationEvent> {
        let mut queue = mutex_lock(&self.queue, SOURCE, "drain");
        let count = limit.min(queue.len());
        let drained: Vec<_> = queue.drain(..count).collect();
        gauge!(METRIC_QUEUE_LEN).set(queue.len() as f64);
        drained
    }

    pub fn len(&self) -> usize {
        mutex_lock(&self.queue, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        mutex_lock(&self.queue, SOURCE, "clear").clear();
        gauge!(METRIC_QUEUE_LEN).set(0.0);
    }
}

impl Default for InvalidationQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::keys::TagKind;

    #[test]
    fn epochs_are_monotonic() {
        let queue = InvalidationQueue::new();
        let first = queue.publish(InvalidationSource::Manual, Vec::new());
        let second = queue.publish(
            InvalidationSource::Mutation(MutationKind::PlaceOrder),
            vec![Tag::coarse(TagKind::Orders)],
        );
        assert!(first < second);
    }

    #[test]
    fn publish_and_drain_fifo() {
        let queue = InvalidationQueue::new();
        queue.publish(
            InvalidationSource::Mutation(MutationKind::CreateLand),
            vec![Tag::coarse(TagKind::Lands)],
        );
        queue.publish(
            InvalidationSource::Mutation(MutationKind::DeleteProduct),
            vec![Tag::coarse(TagKind::Products)],
        );
        queue.publish(InvalidationSource::Manual, vec![Tag::coarse(TagKind::Orders)]);

        let events = queue.drain(2);
        assert_eq!(events.len(), 2);
        assert_eq!(queue.len(), 1);
        assert_eq!(
            events[0].source,
            InvalidationSource::Mutation(MutationKind::CreateLand)
        );
        assert_eq!(events[1].tags, vec![Tag::coarse(TagKind::Products)]);
        assert_ne!(events[0].id, events[1].id);

        queue.clear();
        assert!(queue.is_empty());
    }

    #[test]
    fn source_display() {
        assert_eq!(
            InvalidationSource::Mutation(MutationKind::UpdateLand).to_string(),
            "mutation:updateLand"
        );
        assert_eq!(InvalidationSource::Manual.to_string(), "manual");
    }
}
