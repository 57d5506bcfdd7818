//! Shift type aggregate with its position and time children.
//!
//! # Responsibility
//! - Describe persisted aggregate/child rows including dirty and tombstone flags.
//! - Describe the desired-state payload that drives reconciliation.
//!
//! # Invariants
//! - A child belongs to exactly one shift type; reconciliation never rewrites
//!   `shift_type_id` on an existing child.
//! - `removed` rows never appear in a live read.
//! - Flags are only ever set by reconciliation, never cleared.

use serde::{Deserialize, Serialize};

pub type ShiftTypeId = i64;
pub type ShiftPositionId = i64;
pub type ShiftTimeId = i64;
pub type PositionTypeId = i64;
pub type CategoryId = i64;

/// Scalar attributes of a shift type, rewritten as a whole on reconcile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShiftTypeInfo {
    pub name: String,
    #[serde(default)]
    pub details: String,
    #[serde(default)]
    pub category_id: Option<CategoryId>,
    #[serde(default)]
    pub is_core: bool,
    #[serde(default)]
    pub is_off_playa: bool,
}

/// Persisted aggregate row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShiftType {
    pub id: ShiftTypeId,
    #[serde(flatten)]
    pub info: ShiftTypeInfo,
    /// Optimistic concurrency token; bumped by every successful write.
    pub version: i64,
    /// Dirty marker.
    pub updated: bool,
    /// Tombstone.
    pub removed: bool,
}

/// Persisted slot row linking one position type to a shift type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShiftPosition {
    pub id: ShiftPositionId,
    pub shift_type_id: ShiftTypeId,
    pub position_type_id: PositionTypeId,
    /// Joined from `position_types.name`.
    pub position_name: String,
    /// Joined from `roles.name`; `None` when the position type has no role.
    pub role_name: Option<String>,
    pub total_slots: i64,
    pub wap_points: i64,
    pub added: bool,
    pub updated: bool,
    pub removed: bool,
}

/// Persisted time-slot row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShiftTime {
    pub id: ShiftTimeId,
    pub shift_type_id: ShiftTypeId,
    /// Local ISO-8601 timestamp, e.g. `2024-08-26T09:00:00`.
    pub start_time: String,
    pub end_time: String,
    pub instance: String,
    pub notes: String,
    pub added: bool,
    pub updated: bool,
    pub removed: bool,
}

/// Live read of one aggregate.
///
/// Positions are ordered by position name, times by start time; ties fall
/// back to surrogate id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShiftTypeSnapshot {
    pub shift_type: ShiftType,
    pub positions: Vec<ShiftPosition>,
    pub times: Vec<ShiftTime>,
}

/// Desired slot for one position type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DesiredPosition {
    pub position_type_id: PositionTypeId,
    #[serde(default)]
    pub total_slots: i64,
    #[serde(default)]
    pub wap_points: i64,
}

/// Desired time slot. `id = None` (or an id unknown to the aggregate) asks
/// for a new row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DesiredTime {
    #[serde(default)]
    pub id: Option<ShiftTimeId>,
    pub start_time: String,
    pub end_time: String,
    #[serde(default)]
    pub instance: String,
    #[serde(default)]
    pub notes: String,
}

/// Full target state submitted for one aggregate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DesiredShiftType {
    /// Version observed by the read the client edited from.
    pub expected_version: i64,
    pub information: ShiftTypeInfo,
    #[serde(default)]
    pub positions: Vec<DesiredPosition>,
    #[serde(default)]
    pub times: Vec<DesiredTime>,
}

impl DesiredShiftType {
    /// Builds a desired state that re-submits a live snapshot unchanged.
    pub fn from_snapshot(snapshot: &ShiftTypeSnapshot) -> Self {
        Self {
            expected_version: snapshot.shift_type.version,
            information: snapshot.shift_type.info.clone(),
            positions: snapshot
                .positions
                .iter()
                .map(|position| DesiredPosition {
                    position_type_id: position.position_type_id,
                    total_slots: position.total_slots,
                    wap_points: position.wap_points,
                })
                .collect(),
            times: snapshot
                .times
                .iter()
                .map(|time| DesiredTime {
                    id: Some(time.id),
                    start_time: time.start_time.clone(),
                    end_time: time.end_time.clone(),
                    instance: time.instance.clone(),
                    notes: time.notes.clone(),
                })
                .collect(),
        }
    }
}
