//! Items of collections shared by concurrently connected viewers.
//!
//! # Responsibility
//! - Define the natural key and merge rule of each shared item type.
//! - Normalize natural keys so every viewer derives the same key.
//!
//! # Invariants
//! - `key()` depends only on identity fields; `merge_from` never changes it.
//! - Non-key fields carry serde defaults so a key-only payload decodes.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt::{Debug, Display, Formatter};
use std::hash::Hash;

use crate::model::shift_type::{ShiftPositionId, ShiftTimeId};

static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid ws regex"));

/// Kind of shared collection an event or cache belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectionKind {
    /// Global role roster.
    Roles,
    /// Volunteer signup list of one shift time.
    ShiftVolunteers,
}

impl CollectionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Roles => "roles",
            Self::ShiftVolunteers => "shift_volunteers",
        }
    }
}

impl Display for CollectionKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Item type that can live in a patched cache.
pub trait SharedItem: Clone + Serialize + DeserializeOwned {
    type Key: Eq + Hash + Clone + Debug;

    /// Collection kind every event for this item type carries.
    const KIND: CollectionKind;

    fn key(&self) -> Self::Key;

    /// Overwrites mutable fields from `incoming`; identity stays untouched.
    fn merge_from(&mut self, incoming: &Self);
}

/// One role on the shared roster. Identified by its normalized name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleItem {
    pub name: String,
    #[serde(default = "default_display")]
    pub display: bool,
}

fn default_display() -> bool {
    true
}

impl RoleItem {
    pub fn new(name: &str) -> Self {
        Self {
            name: normalize_role_name(name),
            display: true,
        }
    }
}

impl SharedItem for RoleItem {
    type Key = String;

    const KIND: CollectionKind = CollectionKind::Roles;

    /// ASCII-only folding, matching SQLite `COLLATE NOCASE`.
    fn key(&self) -> String {
        normalize_role_name(&self.name).to_ascii_lowercase()
    }

    fn merge_from(&mut self, incoming: &Self) {
        self.display = incoming.display;
    }
}

/// One volunteer signed up on a shift time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShiftVolunteerItem {
    pub volunteer_id: String,
    pub shift_time_id: ShiftTimeId,
    #[serde(default)]
    pub shift_position_id: ShiftPositionId,
    #[serde(default)]
    pub display_name: String,
}

impl SharedItem for ShiftVolunteerItem {
    type Key = (ShiftTimeId, String);

    const KIND: CollectionKind = CollectionKind::ShiftVolunteers;

    fn key(&self) -> Self::Key {
        (self.shift_time_id, self.volunteer_id.clone())
    }

    fn merge_from(&mut self, incoming: &Self) {
        self.shift_position_id = incoming.shift_position_id;
        self.display_name = incoming.display_name.clone();
    }
}

/// Trims a role name and collapses inner whitespace runs to one space.
pub fn normalize_role_name(value: &str) -> String {
    WHITESPACE_RE.replace_all(value.trim(), " ").into_owned()
}
