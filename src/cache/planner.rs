//! Invalidation plan generation.
//!
//! Merges a batch of invalidation events into one set of tags, so
//! overlapping mutations are applied with union semantics.

use std::collections::{BTreeSet, HashSet};
use std::fmt;

use super::events::{Epoch, InvalidationEvent, InvalidationSource};
use super::keys::Tag;

#[derive(Debug, Default)]
pub struct InvalidationPlan {
    /// Tags to invalidate. Scoped tags already covered by a coarse tag of the
    /// same kind are folded away.
    pub tags: BTreeSet<Tag>,
    pub sources: Vec<InvalidationSource>,
    pub event_count: usize,
    pub last_epoch: Option<Epoch>,
}

impl fmt::Display for InvalidationPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tags: Vec<String> = self.tags.iter().map(ToString::to_string).collect();
        write!(
            f,
            "InvalidationPlan {{ events: {}, tags: [{}], last_epoch: {:?} }}",
            self.event_count,
            tags.join(", "),
            self.last_epoch,
        )
    }
}

impl InvalidationPlan {
    /// Dedupe by event id and union every event's tags.
    pub fn from_events(events: Vec<InvalidationEvent>) -> Self {
        let mut plan = Self::default();
        let mut seen_ids = HashSet::new();

        for event in events.into_iter().filter(|e| seen_ids.insert(e.id)) {
            plan.event_count += 1;
            plan.last_epoch = plan.last_epoch.max(Some(event.epoch));
            if !plan.sources.contains(&event.source) {
                plan.sources.push(event.source);
            }
            plan.tags.extend(event.tags);
        }

        let coarse: Vec<Tag> = plan.tags.iter().filter(|t| t.is_coarse()).cloned().collect();
        plan.tags
            .retain(|tag| tag.is_coarse() || !coarse.iter().any(|c| c.covers(tag)));
        plan
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::keys::TagKind;
    use crate::cache::mutation::MutationKind;

    fn event(source: InvalidationSource, tags: Vec<Tag>, epoch: Epoch) -> InvalidationEvent {
        InvalidationEvent::new(source, tags, epoch)
    }

    #[test]
    fn overlapping_events_union_their_tags() {
        let plan = InvalidationPlan::from_events(vec![
            event(
                InvalidationSource::Mutation(MutationKind::CreateLand),
                vec![
                    Tag::coarse(TagKind::Lands),
                    Tag::scoped(TagKind::UserLands, "u1"),
                ],
                0,
            ),
            event(
                InvalidationSource::Mutation(MutationKind::UpdateProfile),
                vec![Tag::scoped(TagKind::Profile, "u1")],
                1,
            ),
            event(
                InvalidationSource::Mutation(MutationKind::CreateLand),
                vec![
                    Tag::coarse(TagKind::Lands),
                    Tag::scoped(TagKind::UserLands, "u2"),
                ],
                2,
            ),
        ]);

        assert_eq!(plan.event_count, 3);
        assert_eq!(plan.last_epoch, Some(2));
        assert_eq!(plan.sources.len(), 2);
        assert_eq!(plan.tags.len(), 4);
        assert!(plan.tags.contains(&Tag::scoped(TagKind::UserLands, "u2")));
    }

    #[test]
    fn duplicate_event_ids_are_counted_once() {
        let original = event(
            InvalidationSource::Manual,
            vec![Tag::coarse(TagKind::Orders)],
            5,
        );
        let plan = InvalidationPlan::from_events(vec![original.clone(), original]);
        assert_eq!(plan.event_count, 1);
    }

    #[test]
    fn coarse_tags_absorb_scoped_ones() {
        let plan = InvalidationPlan::from_events(vec![event(
            InvalidationSource::Mutation(MutationKind::UpdateProduct),
            vec![
                Tag::coarse(TagKind::Products),
                Tag::scoped(TagKind::Products, "p1"),
                Tag::scoped(TagKind::Lands, "l1"),
            ],
            0,
        )]);

        assert_eq!(
            plan.tags.into_iter().collect::<Vec<_>>(),
            vec![
                Tag::scoped(TagKind::Lands, "l1"),
                Tag::coarse(TagKind::Products)
            ]
        );
    }

    #[test]
    fn empty_batch_is_empty_plan() {
        let plan = InvalidationPlan::from_events(Vec::new());
        assert!(plan.is_empty());
        assert_eq!(plan.last_epoch, None);
    }
}
