//! Typed mutation events for shared collections.
//!
//! Events are plain serde values so the same shape can cross a duplex
//! transport (websocket, IPC) unchanged.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt::{Display, Formatter};

use crate::model::shared::{CollectionKind, SharedItem};

/// Broadcaster-assigned subscriber handle.
pub type SubscriberId = u64;

/// One live collection: a kind plus an optional scope such as a time id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CollectionId {
    pub kind: CollectionKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<i64>,
}

impl CollectionId {
    pub fn roles() -> Self {
        Self {
            kind: CollectionKind::Roles,
            scope: None,
        }
    }

    pub fn shift_volunteers(shift_time_id: i64) -> Self {
        Self {
            kind: CollectionKind::ShiftVolunteers,
            scope: Some(shift_time_id),
        }
    }
}

impl Display for CollectionId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.scope {
            Some(scope) => write!(f, "{}/{scope}", self.kind),
            None => write!(f, "{}", self.kind),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventAction {
    Add,
    Update,
    Remove,
}

impl EventAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Update => "update",
            Self::Remove => "remove",
        }
    }
}

/// Notification that one item of a shared collection changed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BroadcastEvent {
    pub collection: CollectionId,
    pub action: EventAction,
    pub payload: Value,
    /// Per-collection sequence stamped on publish; `0` before publishing.
    #[serde(default)]
    pub seq: u64,
    /// Publishing subscriber, excluded from fan-out.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<SubscriberId>,
}

impl BroadcastEvent {
    pub fn new(collection: CollectionId, action: EventAction, payload: Value) -> Self {
        Self {
            collection,
            action,
            payload,
            seq: 0,
            origin: None,
        }
    }

    /// Builds an event for an item; `scope` must match the collection the
    /// item lives in (`None` for unscoped collections).
    pub fn for_item<T: SharedItem>(
        scope: Option<i64>,
        action: EventAction,
        item: &T,
    ) -> Result<Self, serde_json::Error> {
        let collection = CollectionId {
            kind: T::KIND,
            scope,
        };
        Ok(Self::new(collection, action, serde_json::to_value(item)?))
    }

    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        T::deserialize(&self.payload)
    }
}
