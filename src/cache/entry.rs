//! Cache entry state and the patches that move it between states.
//!
//! Every transition goes through [`CacheEntry::apply`], which enforces the
//! request-generation rules: a completion only lands if it is newer than the
//! last applied one, and only the most recently started request may take the
//! entry out of `Loading`.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use futures::future::{BoxFuture, Shared};
use serde::de::DeserializeOwned;
use serde_json::Value;
use time::OffsetDateTime;
use tokio::time::Instant;

use super::keys::{CacheKey, Tag};
use super::transport::TransportError;

/// Result every caller attached to one request observes.
pub type FetchOutcome = Result<Arc<Value>, TransportError>;

/// Shareable handle to a single underlying fetch.
pub type SharedFetch = Shared<BoxFuture<'static, FetchOutcome>>;

/// Builds the fetch future for a freshly assigned request generation.
pub type StartFetch = Box<dyn FnOnce(u64) -> SharedFetch + Send>;

/// The one outstanding request for a key.
#[derive(Clone)]
pub struct Flight {
    generation: u64,
    future: SharedFetch,
}

impl Flight {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub(crate) fn future(&self) -> SharedFetch {
        self.future.clone()
    }
}

impl fmt::Debug for Flight {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Flight")
            .field("generation", &self.generation)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryStatus {
    Uninitialized,
    Loading,
    Success,
    Error,
}

impl QueryStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::Loading => "loading",
            Self::Success => "success",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for QueryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State transition merged into an entry by `ResourceCacheStore::upsert`.
pub enum EntryPatch {
    /// Start a fetch unless one can be joined or the cached data is fresh.
    /// With `force`, always start a new request.
    Begin {
        force: bool,
        tags: HashSet<Tag>,
        start: StartFetch,
    },
    /// A request resolved; `tags` is the full provided set for `data`.
    Fulfilled {
        generation: u64,
        data: Arc<Value>,
        tags: HashSet<Tag>,
    },
    Rejected {
        generation: u64,
        error: TransportError,
    },
    /// Mark the entry stale so the next query refetches.
    Invalidated,
}

impl EntryPatch {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Begin { .. } => "begin",
            Self::Fulfilled { .. } => "fulfilled",
            Self::Rejected { .. } => "rejected",
            Self::Invalidated => "invalidated",
        }
    }

    /// Only starting a request may bring an entry into existence.
    pub(crate) fn creates_entry(&self) -> bool {
        matches!(self, Self::Begin { .. })
    }
}

impl fmt::Debug for EntryPatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Begin { force, tags, .. } => f
                .debug_struct("Begin")
                .field("force", force)
                .field("tags", tags)
                .finish_non_exhaustive(),
            Self::Fulfilled {
                generation, tags, ..
            } => f
                .debug_struct("Fulfilled")
                .field("generation", generation)
                .field("tags", tags)
                .finish_non_exhaustive(),
            Self::Rejected { generation, error } => f
                .debug_struct("Rejected")
                .field("generation", generation)
                .field("error", error)
                .finish(),
            Self::Invalidated => f.write_str("Invalidated"),
        }
    }
}

/// What an upsert did.
#[derive(Debug, Clone)]
pub enum UpsertOutcome {
    /// A new request was started; the caller must drive it.
    Started(Flight),
    /// An in-flight request started after the last invalidation was reused.
    Joined(Flight),
    /// Cached data is fresh; nothing was started.
    Fresh(Arc<Value>),
    /// The patch changed the entry.
    Applied,
    /// The patch was superseded or targeted a missing entry.
    Discarded,
}

impl UpsertOutcome {
    pub(crate) fn notifies(&self) -> bool {
        matches!(self, Self::Started(_) | Self::Applied)
    }
}

#[derive(Debug, Clone)]
pub struct CacheEntry {
    key: CacheKey,
    status: QueryStatus,
    data: Option<Arc<Value>>,
    error: Option<TransportError>,
    tags: HashSet<Tag>,
    is_stale: bool,
    fulfilled_at: Option<OffsetDateTime>,
    pub(crate) subscriber_count: usize,
    pub(crate) released_at: Option<Instant>,
    in_flight: Option<Flight>,
    latest_started: u64,
    latest_applied: u64,
    invalidated_through: u64,
}

impl CacheEntry {
    /// New, empty entry. `floor` is the store's current generation, so
    /// completions of requests started for an earlier incarnation of the same
    /// key can never land here.
    pub(crate) fn new(key: CacheKey, floor: u64) -> Self {
        Self {
            key,
            status: QueryStatus::Uninitialized,
            data: None,
            error: None,
            tags: HashSet::new(),
            is_stale: false,
            fulfilled_at: None,
            subscriber_count: 0,
            released_at: None,
            in_flight: None,
            latest_started: floor,
            latest_applied: floor,
            invalidated_through: floor,
        }
    }

    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    pub fn status(&self) -> QueryStatus {
        self.status
    }

    pub fn data(&self) -> Option<&Arc<Value>> {
        self.data.as_ref()
    }

    /// Decode the cached JSON into a typed value.
    pub fn decode<T: DeserializeOwned>(&self) -> Option<Result<T, serde_json::Error>> {
        self.data.as_deref().map(T::deserialize)
    }

    pub fn error(&self) -> Option<&TransportError> {
        self.error.as_ref()
    }

    pub fn tags(&self) -> &HashSet<Tag> {
        &self.tags
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscriber_count
    }

    pub fn is_loading(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn in_flight_generation(&self) -> Option<u64> {
        self.in_flight.as_ref().map(Flight::generation)
    }

    /// Whether an invalidation reached this entry after its last resolution.
    pub fn is_stale(&self) -> bool {
        self.is_stale
    }

    /// Success, not stale, and carrying data.
    pub fn is_fresh(&self) -> bool {
        self.status == QueryStatus::Success && !self.is_stale && self.data.is_some()
    }

    pub fn fulfilled_at(&self) -> Option<OffsetDateTime> {
        self.fulfilled_at
    }

    pub(crate) fn apply(&mut self, patch: EntryPatch, generations: &mut u64) -> UpsertOutcome {
        match patch {
            EntryPatch::Begin { force, tags, start } => self.begin(force, tags, start, generations),
            EntryPatch::Fulfilled {
                generation,
                data,
                tags,
            } => {
                let applied = generation > self.latest_applied;
                if applied {
                    self.latest_applied = generation;
                    self.data = Some(data);
                    self.error = None;
                    self.tags = tags;
                    self.fulfilled_at = Some(OffsetDateTime::now_utc());
                    if generation > self.invalidated_through {
                        self.is_stale = false;
                    }
                }
                let settled = self.settle(generation, applied, QueryStatus::Success);
                if applied || settled {
                    UpsertOutcome::Applied
                } else {
                    UpsertOutcome::Discarded
                }
            }
            EntryPatch::Rejected { generation, error } => {
                let applied = generation > self.latest_applied;
                if applied {
                    self.latest_applied = generation;
                    self.error = Some(error);
                }
                let settled = self.settle(generation, applied, QueryStatus::Error);
                if applied || settled {
                    UpsertOutcome::Applied
                } else {
                    UpsertOutcome::Discarded
                }
            }
            EntryPatch::Invalidated => {
                self.is_stale = true;
                self.invalidated_through = self.latest_started;
                UpsertOutcome::Applied
            }
        }
    }

    fn begin(
        &mut self,
        force: bool,
        tags: HashSet<Tag>,
        start: StartFetch,
        generations: &mut u64,
    ) -> UpsertOutcome {
        if !force {
            if let Some(flight) = self
                .in_flight
                .as_ref()
                .filter(|flight| flight.generation > self.invalidated_through)
            {
                return UpsertOutcome::Joined(flight.clone());
            }
            if self.is_fresh()
                && let Some(data) = &self.data
            {
                return UpsertOutcome::Fresh(data.clone());
            }
        }

        *generations += 1;
        let generation = *generations;
        let flight = Flight {
            generation,
            future: start(generation),
        };

        self.tags.extend(tags);
        self.latest_started = generation;
        self.in_flight = Some(flight.clone());
        self.status = QueryStatus::Loading;
        self.error = None;
        UpsertOutcome::Started(flight)
    }

    /// Leaves `Loading` when `generation` is the latest started request.
    fn settle(&mut self, generation: u64, applied: bool, outcome: QueryStatus) -> bool {
        let is_latest = self
            .in_flight
            .as_ref()
            .is_some_and(|flight| flight.generation == generation);
        if !is_latest {
            return false;
        }

        self.in_flight = None;
        self.status = if applied {
            outcome
        } else if self.error.is_some() {
            QueryStatus::Error
        } else if self.data.is_some() {
            QueryStatus::Success
        } else {
            QueryStatus::Uninitialized
        };
        true
    }
}

#[cfg(test)]
mod tests {
    use futures::FutureExt;
    use serde_json::json;

    use super::*;

    fn start() -> StartFetch {
        Box::new(|_| async { Ok(Arc::new(Value::Null)) }.boxed().shared())
    }

    fn begin(entry: &mut CacheEntry, force: bool, generations: &mut u64) -> UpsertOutcome {
        entry.apply(
            EntryPatch::Begin {
                force,
                tags: HashSet::new(),
                start: start(),
            },
            generations,
        )
    }

    fn fulfil(entry: &mut CacheEntry, generation: u64, value: Value) -> UpsertOutcome {
        entry.apply(
            EntryPatch::Fulfilled {
                generation,
                data: Arc::new(value),
                tags: HashSet::new(),
            },
            &mut 0,
        )
    }

    fn started_generation(outcome: UpsertOutcome) -> u64 {
        match outcome {
            UpsertOutcome::Started(flight) => flight.generation(),
            other => panic!("expected a started request, got {other:?}"),
        }
    }

    #[test]
    fn loading_iff_in_flight() {
        let mut generations = 0;
        let mut entry = CacheEntry::new(CacheKey::lands(), 0);
        assert_eq!(entry.status(), QueryStatus::Uninitialized);
        assert!(!entry.is_loading());

        let generation = started_generation(begin(&mut entry, false, &mut generations));
        assert_eq!(entry.status(), QueryStatus::Loading);
        assert!(entry.is_loading());

        fulfil(&mut entry, generation, json!([1]));
        assert_eq!(entry.status(), QueryStatus::Success);
        assert!(!entry.is_loading());
        assert!(entry.is_fresh());
    }

    #[test]
    fn second_begin_joins_the_running_request() {
        let mut generations = 0;
        let mut entry = CacheEntry::new(CacheKey::lands(), 0);
        let first = started_generation(begin(&mut entry, false, &mut generations));

        match begin(&mut entry, false, &mut generations) {
            UpsertOutcome::Joined(flight) => assert_eq!(flight.generation(), first),
            other => panic!("expected join, got {other:?}"),
        }
        assert_eq!(generations, 1);
    }

    #[test]
    fn fresh_entries_short_circuit_until_invalidated() {
        let mut generations = 0;
        let mut entry = CacheEntry::new(CacheKey::lands(), 0);
        let generation = started_generation(begin(&mut entry, false, &mut generations));
        fulfil(&mut entry, generation, json!(["a"]));

        assert!(matches!(
            begin(&mut entry, false, &mut generations),
            UpsertOutcome::Fresh(_)
        ));

        entry.apply(EntryPatch::Invalidated, &mut generations);
        assert!(entry.is_stale());
        assert_eq!(entry.data().map(|d| d.as_ref()), Some(&json!(["a"])));
        assert!(matches!(
            begin(&mut entry, false, &mut generations),
            UpsertOutcome::Started(_)
        ));
    }

    #[test]
    fn invalidation_during_flight_is_not_cleared_by_that_flight() {
        let mut generations = 0;
        let mut entry = CacheEntry::new(CacheKey::lands(), 0);
        let generation = started_generation(begin(&mut entry, false, &mut generations));

        entry.apply(EntryPatch::Invalidated, &mut generations);
        fulfil(&mut entry, generation, json!(["old"]));

        assert_eq!(entry.status(), QueryStatus::Success);
        assert!(entry.is_stale());
        assert!(!entry.is_fresh());
    }

    #[test]
    fn older_completion_never_overwrites_newer_data() {
        let mut generations = 0;
        let mut entry = CacheEntry::new(CacheKey::lands(), 0);
        let a = started_generation(begin(&mut entry, true, &mut generations));
        let b = started_generation(begin(&mut entry, true, &mut generations));
        assert!(b > a);

        fulfil(&mut entry, b, json!("B"));
        assert_eq!(entry.status(), QueryStatus::Success);

        assert!(matches!(
            fulfil(&mut entry, a, json!("A")),
            UpsertOutcome::Discarded
        ));
        assert_eq!(entry.data().map(|d| d.as_ref()), Some(&json!("B")));
        assert_eq!(entry.status(), QueryStatus::Success);
    }

    #[test]
    fn older_completion_keeps_entry_loading_for_newer_request() {
        let mut generations = 0;
        let mut entry = CacheEntry::new(CacheKey::lands(), 0);
        let a = started_generation(begin(&mut entry, true, &mut generations));
        let b = started_generation(begin(&mut entry, true, &mut generations));

        fulfil(&mut entry, a, json!("A"));
        assert_eq!(entry.status(), QueryStatus::Loading);
        assert_eq!(entry.in_flight_generation(), Some(b));
    }

    #[test]
    fn rejection_keeps_previous_data() {
        let mut generations = 0;
        let mut entry = CacheEntry::new(CacheKey::lands(), 0);
        let first = started_generation(begin(&mut entry, false, &mut generations));
        fulfil(&mut entry, first, json!(["kept"]));

        let second = started_generation(begin(&mut entry, true, &mut generations));
        assert!(entry.error().is_none());
        entry.apply(
            EntryPatch::Rejected {
                generation: second,
                error: TransportError::status(500, "boom"),
            },
            &mut generations,
        );

        assert_eq!(entry.status(), QueryStatus::Error);
        assert_eq!(entry.error().map(|e| e.detail()), Some("boom"));
        assert_eq!(entry.data().map(|d| d.as_ref()), Some(&json!(["kept"])));
    }

    #[test]
    fn completions_below_the_floor_are_discarded() {
        let mut entry = CacheEntry::new(CacheKey::lands(), 7);
        assert!(matches!(
            fulfil(&mut entry, 3, json!("late")),
            UpsertOutcome::Discarded
        ));
        assert!(entry.data().is_none());
    }
}
