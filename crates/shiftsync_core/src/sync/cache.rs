//! Client-side cache patching.
//!
//! # Responsibility
//! - Apply one mutation event to a cached collection ([`apply_event`]).
//! - Track delivery sequence and flag gaps for re-fetch ([`LiveCache`]).
//!
//! # Invariants
//! - Applying the same event twice leaves the cache as after one apply.
//! - Remove of an absent key and Update of an absent key are no-ops.
//! - Cached order is insertion order; new items append.

use std::error::Error;
use std::fmt::{Display, Formatter};

use log::{debug, warn};

use crate::sync::event::{BroadcastEvent, CollectionId, EventAction};
use crate::model::shared::SharedItem;

/// Effect of one event on a cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchOutcome {
    Applied,
    /// Event was a duplicate or targeted an absent item.
    Unchanged,
}

#[derive(Debug)]
pub enum PatchError {
    WrongCollection {
        expected: CollectionId,
        actual: CollectionId,
    },
    Payload(serde_json::Error),
}

impl Display for PatchError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::WrongCollection { expected, actual } => {
                write!(f, "event for {actual} applied to cache of {expected}")
            }
            Self::Payload(err) => write!(f, "event payload does not decode: {err}"),
        }
    }
}

impl Error for PatchError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Payload(err) => Some(err),
            Self::WrongCollection { .. } => None,
        }
    }
}

impl From<serde_json::Error> for PatchError {
    fn from(value: serde_json::Error) -> Self {
        Self::Payload(value)
    }
}

/// Applies one event to `cache` in place.
///
/// Add appends unless the key is already cached. Update merges into the
/// cached item with the same key. Remove deletes the item with that key.
pub fn apply_event<T: SharedItem>(
    cache: &mut Vec<T>,
    event: &BroadcastEvent,
) -> Result<PatchOutcome, PatchError> {
    let incoming: T = event.decode()?;
    let key = incoming.key();
    let position = cache.iter().position(|item| item.key() == key);

    let outcome = match (event.action, position) {
        (EventAction::Add, None) => {
            cache.push(incoming);
            PatchOutcome::Applied
        }
        (EventAction::Update, Some(index)) => {
            cache[index].merge_from(&incoming);
            PatchOutcome::Applied
        }
        (EventAction::Remove, Some(index)) => {
            cache.remove(index);
            PatchOutcome::Applied
        }
        (EventAction::Add, Some(_))
        | (EventAction::Update, None)
        | (EventAction::Remove, None) => PatchOutcome::Unchanged,
    };
    Ok(outcome)
}

/// Value-returning form of [`apply_event`].
pub fn patch<T: SharedItem>(mut cache: Vec<T>, event: &BroadcastEvent) -> Result<Vec<T>, PatchError> {
    apply_event(&mut cache, event)?;
    Ok(cache)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    Fresh,
    /// Events were missed; reload through a full read and [`LiveCache::reset`].
    NeedsRefetch,
}

/// Cached copy of one collection kept current by broadcast events.
#[derive(Debug, Clone)]
pub struct LiveCache<T: SharedItem> {
    collection: CollectionId,
    items: Vec<T>,
    last_seq: u64,
    status: CacheStatus,
}

impl<T: SharedItem> LiveCache<T> {
    /// Starts from a full read taken after the broadcaster reported `seq`.
    pub fn new(collection: CollectionId, items: Vec<T>, seq: u64) -> Self {
        Self {
            collection,
            items,
            last_seq: seq,
            status: CacheStatus::Fresh,
        }
    }

    pub fn collection(&self) -> CollectionId {
        self.collection
    }

    pub fn items(&self) -> &[T] {
        &self.items
    }

    pub fn last_seq(&self) -> u64 {
        self.last_seq
    }

    pub fn status(&self) -> CacheStatus {
        self.status
    }

    pub fn needs_refetch(&self) -> bool {
        self.status == CacheStatus::NeedsRefetch
    }

    /// Applies `event` if it is newer than the cache.
    ///
    /// A sequence jump marks the cache for re-fetch; the event is still
    /// applied so the view stays as close as possible until then.
    pub fn apply(&mut self, event: &BroadcastEvent) -> Result<PatchOutcome, PatchError> {
        if event.collection != self.collection {
            return Err(PatchError::WrongCollection {
                expected: self.collection,
                actual: event.collection,
            });
        }
        if event.seq != 0 && event.seq <= self.last_seq {
            debug!(
                "event=cache_patch module=cache status=stale collection={} seq={} last_seq={}",
                self.collection, event.seq, self.last_seq
            );
            return Ok(PatchOutcome::Unchanged);
        }
        if event.seq > self.last_seq.saturating_add(1) {
            warn!(
                "event=cache_gap module=cache collection={} expected_seq={} seq={}",
                self.collection,
                self.last_seq.saturating_add(1),
                event.seq
            );
            self.status = CacheStatus::NeedsRefetch;
        }

        let outcome = apply_event(&mut self.items, event)?;
        self.last_seq = self.last_seq.max(event.seq);
        Ok(outcome)
    }

    /// Flags the cache stale, e.g. after its subscription was dropped.
    pub fn mark_stale(&mut self) {
        self.status = CacheStatus::NeedsRefetch;
    }

    /// Replaces contents with a fresh full read.
    pub fn reset(&mut self, items: Vec<T>, seq: u64) {
        self.items = items;
        self.last_seq = seq;
        self.status = CacheStatus::Fresh;
    }
}

#[cfg(test)]
mod tests {
    use super::{apply_event, patch, CacheStatus, LiveCache, PatchError, PatchOutcome};
    use crate::model::shared::{RoleItem, ShiftVolunteerItem};
    use crate::sync::event::{BroadcastEvent, CollectionId, EventAction};

    fn role_event(action: EventAction, name: &str, display: bool, seq: u64) -> BroadcastEvent {
        let mut event = BroadcastEvent::for_item(
            None,
            action,
            &RoleItem {
                name: name.to_string(),
                display,
            },
        )
        .unwrap();
        event.seq = seq;
        event
    }

    fn names(items: &[RoleItem]) -> Vec<&str> {
        items.iter().map(|item| item.name.as_str()).collect()
    }

    #[test]
    fn add_toggle_remove_sequence() {
        let mut cache = vec![RoleItem::new("Lead")];

        apply_event(&mut cache, &role_event(EventAction::Add, "Support", true, 1)).unwrap();
        assert_eq!(names(&cache), vec!["Lead", "Support"]);

        apply_event(&mut cache, &role_event(EventAction::Update, "Lead", false, 2)).unwrap();
        assert!(!cache[0].display);

        apply_event(&mut cache, &role_event(EventAction::Remove, "Lead", false, 3)).unwrap();
        assert_eq!(names(&cache), vec!["Support"]);
        assert!(cache[0].display);
    }

    #[test]
    fn duplicate_add_is_idempotent() {
        let event = role_event(EventAction::Add, "Support", true, 1);
        let once = patch(vec![RoleItem::new("Lead")], &event).unwrap();
        let twice = patch(once.clone(), &event).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn add_matches_existing_key_case_insensitively() {
        let mut cache = vec![RoleItem::new("Lead")];
        let outcome =
            apply_event(&mut cache, &role_event(EventAction::Add, "lead", true, 1)).unwrap();
        assert_eq!(outcome, PatchOutcome::Unchanged);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn remove_and_update_of_absent_key_are_noops() {
        let mut cache = vec![RoleItem::new("Lead")];
        let removed =
            apply_event(&mut cache, &role_event(EventAction::Remove, "Ghost", true, 1)).unwrap();
        let updated =
            apply_event(&mut cache, &role_event(EventAction::Update, "Ghost", false, 2)).unwrap();
        assert_eq!(removed, PatchOutcome::Unchanged);
        assert_eq!(updated, PatchOutcome::Unchanged);
        assert_eq!(cache, vec![RoleItem::new("Lead")]);
    }

    #[test]
    fn key_only_remove_payload_drops_matching_role() {
        let mut cache = vec![RoleItem::new("Lead"), RoleItem::new("Support")];
        let event = BroadcastEvent::new(
            CollectionId::roles(),
            EventAction::Remove,
            serde_json::json!({ "name": "Lead" }),
        );
        let outcome = apply_event(&mut cache, &event).unwrap();
        assert_eq!(outcome, PatchOutcome::Applied);
        assert_eq!(names(&cache), vec!["Support"]);
    }

    #[test]
    fn undecodable_payload_is_rejected() {
        let mut cache: Vec<ShiftVolunteerItem> = Vec::new();
        let event = BroadcastEvent::new(
            CollectionId::shift_volunteers(1),
            EventAction::Add,
            serde_json::json!({ "displayName": "no ids" }),
        );
        assert!(matches!(
            apply_event(&mut cache, &event),
            Err(PatchError::Payload(_))
        ));
        assert!(cache.is_empty());
    }

    #[test]
    fn live_cache_skips_redelivered_events() {
        let mut cache = LiveCache::new(CollectionId::roles(), vec![RoleItem::new("Lead")], 4);
        let stale = role_event(EventAction::Remove, "Lead", true, 4);
        assert_eq!(cache.apply(&stale).unwrap(), PatchOutcome::Unchanged);
        assert_eq!(cache.items().len(), 1);

        let next = role_event(EventAction::Add, "Support", true, 5);
        assert_eq!(cache.apply(&next).unwrap(), PatchOutcome::Applied);
        assert_eq!(cache.last_seq(), 5);
        assert_eq!(cache.status(), CacheStatus::Fresh);
    }

    #[test]
    fn live_cache_flags_gap_then_resets() {
        let mut cache = LiveCache::new(CollectionId::roles(), Vec::new(), 0);
        cache
            .apply(&role_event(EventAction::Add, "Lead", true, 1))
            .unwrap();
        cache
            .apply(&role_event(EventAction::Add, "Support", true, 3))
            .unwrap();
        assert!(cache.needs_refetch());
        assert_eq!(names(cache.items()), vec!["Lead", "Support"]);

        cache.reset(vec![RoleItem::new("Lead")], 3);
        assert_eq!(cache.status(), CacheStatus::Fresh);
        assert_eq!(cache.last_seq(), 3);
    }

    #[test]
    fn live_cache_rejects_foreign_collection() {
        let mut cache: LiveCache<ShiftVolunteerItem> =
            LiveCache::new(CollectionId::shift_volunteers(1), Vec::new(), 0);
        let mut event = BroadcastEvent::new(
            CollectionId::shift_volunteers(2),
            EventAction::Add,
            serde_json::json!({ "volunteerId": "v1", "shiftTimeId": 2 }),
        );
        event.seq = 1;
        assert!(matches!(
            cache.apply(&event),
            Err(PatchError::WrongCollection { .. })
        ));
    }
}
