//! Identity differ.
//!
//! Partitions a desired collection against the persisted one by stable key.
//! Pure and synchronous; runs in `O(desired + current)` using a hash index.
//!
//! # Invariants
//! - `to_add` and `to_update` keep the relative order of `desired`.
//! - `to_remove` keeps the relative order of `current`.
//! - Matching keys always land in `to_update`; there is no field-level
//!   change detection.

use std::collections::{HashMap, HashSet};
use std::fmt::Debug;
use std::hash::Hash;

use crate::model::shift_type::{
    DesiredPosition, DesiredTime, PositionTypeId, ShiftPosition, ShiftTime, ShiftTimeId,
};

/// Stable identity used to match desired items with persisted rows.
pub trait Keyed {
    type Key: Eq + Hash + Clone + Debug;

    /// `None` means the item carries no identity yet (always an addition
    /// on the desired side, always a removal on the current side).
    fn diff_key(&self) -> Option<Self::Key>;
}

/// Output of [`diff`]. Borrowed from the inputs.
#[derive(Debug)]
pub struct DiffPlan<'a, D, C> {
    pub to_add: Vec<&'a D>,
    /// Desired item paired with the persisted row it rewrites.
    pub to_update: Vec<(&'a D, &'a C)>,
    pub to_remove: Vec<&'a C>,
}

impl<D, C> DiffPlan<'_, D, C> {
    pub fn is_noop(&self) -> bool {
        self.to_add.is_empty() && self.to_update.is_empty() && self.to_remove.is_empty()
    }
}

/// Partitions `desired` against `current`.
///
/// Duplicate desired keys are not rejected here; callers validate payloads
/// first. When `current` repeats a key, the first row wins the match and the
/// others are treated as not desired.
pub fn diff<'a, D, C, K>(desired: &'a [D], current: &'a [C]) -> DiffPlan<'a, D, C>
where
    D: Keyed<Key = K>,
    C: Keyed<Key = K>,
    K: Eq + Hash + Clone + Debug,
{
    let mut current_by_key: HashMap<K, usize> = HashMap::with_capacity(current.len());
    for (index, item) in current.iter().enumerate() {
        if let Some(key) = item.diff_key() {
            current_by_key.entry(key).or_insert(index);
        }
    }

    let mut to_add = Vec::new();
    let mut to_update = Vec::new();
    let mut matched: HashSet<usize> = HashSet::with_capacity(desired.len());

    for item in desired {
        match item
            .diff_key()
            .and_then(|key| current_by_key.get(&key).copied())
        {
            Some(index) => {
                matched.insert(index);
                to_update.push((item, &current[index]));
            }
            None => to_add.push(item),
        }
    }

    let to_remove = current
        .iter()
        .enumerate()
        .filter(|(index, _)| !matched.contains(index))
        .map(|(_, item)| item)
        .collect();

    DiffPlan {
        to_add,
        to_update,
        to_remove,
    }
}

impl Keyed for DesiredPosition {
    type Key = PositionTypeId;

    fn diff_key(&self) -> Option<PositionTypeId> {
        Some(self.position_type_id)
    }
}

impl Keyed for ShiftPosition {
    type Key = PositionTypeId;

    fn diff_key(&self) -> Option<PositionTypeId> {
        Some(self.position_type_id)
    }
}

impl Keyed for DesiredTime {
    type Key = ShiftTimeId;

    fn diff_key(&self) -> Option<ShiftTimeId> {
        self.id
    }
}

impl Keyed for ShiftTime {
    type Key = ShiftTimeId;

    fn diff_key(&self) -> Option<ShiftTimeId> {
        Some(self.id)
    }
}
