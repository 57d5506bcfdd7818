//! Shift type aggregate repository.
//!
//! # Responsibility
//! - Live reads of one shift type with its positions and times.
//! - Atomic reconciliation of a desired state against persisted rows.
//! - Aggregate tombstoning and reference-data provisioning.
//!
//! # Invariants
//! - A reconciliation is one `IMMEDIATE` transaction: version check, live
//!   read, diff, apply, commit. Any failure rolls the whole plan back.
//! - Every successful aggregate write bumps `version` by one.
//! - Tombstoning an aggregate does not cascade to its children.
//! - A time or position with live signups is never tombstoned by a
//!   reconciliation; the whole plan is rejected instead.

use crate::db::ensure_schema_ready;
use crate::model::shift_type::{
    CategoryId, DesiredPosition, DesiredShiftType, DesiredTime, PositionTypeId, ShiftPosition,
    ShiftTime, ShiftType, ShiftTypeId, ShiftTypeInfo, ShiftTypeSnapshot,
};
use crate::reconcile::applier::{
    apply, AggregateTable, ApplyError, ApplySummary, ChildPlan, ChildTable, PlanPhases,
};
use crate::reconcile::differ::diff;
use crate::reconcile::id_gen::{EntityClass, IdGenerator};
use crate::reconcile::{ensure_unique_keys, ReconcileError, ValidationIssue};
use crate::repo::{bool_to_int, parse_flag, RepoError, RepoResult};
use rusqlite::{params, Connection, Row, Transaction, TransactionBehavior};

const SHIFT_TYPE_SELECT_SQL: &str = "SELECT
    id,
    name,
    details,
    category_id,
    is_core,
    is_off_playa,
    version,
    updated,
    removed
FROM shift_types";

/// Repository interface for the shift type aggregate.
pub trait ShiftTypeRepository {
    /// Creates an aggregate with no children. Used by provisioning.
    fn create_shift_type(
        &self,
        info: &ShiftTypeInfo,
        ids: &mut dyn IdGenerator,
    ) -> Result<ShiftType, ReconcileError>;
    /// Live read; `None` when missing or tombstoned.
    fn read(&self, id: ShiftTypeId) -> RepoResult<Option<ShiftTypeSnapshot>>;
    /// Reconciles children and scalars to `desired` in one transaction.
    fn reconcile(
        &self,
        id: ShiftTypeId,
        desired: &DesiredShiftType,
        ids: &mut dyn IdGenerator,
    ) -> Result<ApplySummary, ReconcileError>;
    /// Sets the aggregate tombstone; children are left as they are.
    fn tombstone(&self, id: ShiftTypeId) -> Result<(), ReconcileError>;
    /// All position rows of an aggregate, tombstoned ones included.
    fn list_all_positions(&self, id: ShiftTypeId) -> RepoResult<Vec<ShiftPosition>>;
    /// All time rows of an aggregate, tombstoned ones included.
    fn list_all_times(&self, id: ShiftTypeId) -> RepoResult<Vec<ShiftTime>>;
}

/// SQLite-backed shift type repository.
pub struct SqliteShiftTypeRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteShiftTypeRepository<'conn> {
    /// Creates repository from a migrated connection.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_schema_ready(conn)?;
        Ok(Self { conn })
    }
}

impl ShiftTypeRepository for SqliteShiftTypeRepository<'_> {
    fn create_shift_type(
        &self,
        info: &ShiftTypeInfo,
        ids: &mut dyn IdGenerator,
    ) -> Result<ShiftType, ReconcileError> {
        validate_information(self.conn, info)?;

        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)
            .map_err(RepoError::from)?;
        let id = ids.generate(&tx, EntityClass::ShiftType)?;
        tx.execute(
            "INSERT INTO shift_types (
                id,
                name,
                details,
                category_id,
                is_core,
                is_off_playa
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6);",
            params![
                id,
                info.name.trim(),
                info.details.as_str(),
                info.category_id,
                bool_to_int(info.is_core),
                bool_to_int(info.is_off_playa),
            ],
        )
        .map_err(RepoError::from)?;
        let created = load_shift_type(&tx, id, false)?.ok_or(ReconcileError::NotFound(id))?;
        tx.commit().map_err(RepoError::from)?;
        Ok(created)
    }

    fn read(&self, id: ShiftTypeId) -> RepoResult<Option<ShiftTypeSnapshot>> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Deferred)?;
        let Some(shift_type) = load_shift_type(&tx, id, false)? else {
            return Ok(None);
        };
        let positions = load_positions(&tx, id, false)?;
        let times = load_times(&tx, id, false)?;
        tx.commit()?;

        Ok(Some(ShiftTypeSnapshot {
            shift_type,
            positions,
            times,
        }))
    }

    fn reconcile(
        &self,
        id: ShiftTypeId,
        desired: &DesiredShiftType,
        ids: &mut dyn IdGenerator,
    ) -> Result<ApplySummary, ReconcileError> {
        ensure_unique_keys("positions", &desired.positions)
            .and_then(|()| ensure_unique_keys("times", &desired.times))
            .map_err(ReconcileError::ValidationFailed)?;

        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)
            .map_err(RepoError::from)?;

        let current = load_shift_type(&tx, id, false)?.ok_or(ReconcileError::NotFound(id))?;
        if current.version != desired.expected_version {
            return Err(ReconcileError::VersionConflict {
                shift_type_id: id,
                expected: desired.expected_version,
                actual: current.version,
            });
        }

        validate_information(&tx, &desired.information)?;
        for position in &desired.positions {
            if !position_type_exists(&tx, position.position_type_id)? {
                return Err(ReconcileError::ValidationFailed(
                    ValidationIssue::UnknownPositionType(position.position_type_id),
                ));
            }
        }

        let live_positions = load_positions(&tx, id, false)?;
        let live_times = load_times(&tx, id, false)?;
        let position_diff = diff(&desired.positions, &live_positions);
        let time_diff = diff(&desired.times, &live_times);
        for position in &position_diff.to_remove {
            ensure_no_signups(&tx, "positions", "shift_position_id", position.id)?;
        }
        for time in &time_diff.to_remove {
            ensure_no_signups(&tx, "times", "shift_time_id", time.id)?;
        }

        let position_plan = ChildPlan::<PositionTable>::new(position_diff);
        let time_plan = ChildPlan::<TimeTable>::new(time_diff);
        let children: [&dyn PlanPhases; 2] = [&position_plan, &time_plan];

        let summary =
            apply(&tx, id, &desired.information, &children, ids).map_err(apply_error)?;
        tx.commit().map_err(RepoError::from)?;
        Ok(summary)
    }

    fn tombstone(&self, id: ShiftTypeId) -> Result<(), ReconcileError> {
        let changed = self
            .conn
            .execute(
                "UPDATE shift_types
                 SET removed = 1,
                     version = version + 1,
                     updated_at = (strftime('%s', 'now') * 1000)
                 WHERE id = ?1
                   AND removed = 0;",
                [id],
            )
            .map_err(RepoError::from)?;
        if changed == 0 {
            return Err(ReconcileError::NotFound(id));
        }
        Ok(())
    }

    fn list_all_positions(&self, id: ShiftTypeId) -> RepoResult<Vec<ShiftPosition>> {
        load_positions(self.conn, id, true)
    }

    fn list_all_times(&self, id: ShiftTypeId) -> RepoResult<Vec<ShiftTime>> {
        load_times(self.conn, id, true)
    }
}

impl AggregateTable for ShiftTypeInfo {
    const TABLE: &'static str = "shift_types";

    fn rewrite(&self, conn: &Connection, aggregate_id: i64) -> rusqlite::Result<()> {
        conn.execute(
            "UPDATE shift_types
             SET name = ?2,
                 details = ?3,
                 category_id = ?4,
                 is_core = ?5,
                 is_off_playa = ?6,
                 updated = 1,
                 version = version + 1,
                 updated_at = (strftime('%s', 'now') * 1000)
             WHERE id = ?1;",
            params![
                aggregate_id,
                self.name.trim(),
                self.details.as_str(),
                self.category_id,
                bool_to_int(self.is_core),
                bool_to_int(self.is_off_playa),
            ],
        )?;
        Ok(())
    }
}

struct PositionTable;

impl ChildTable for PositionTable {
    type Desired = DesiredPosition;
    type Current = ShiftPosition;

    const CLASS: EntityClass = EntityClass::ShiftPosition;

    fn insert(
        conn: &Connection,
        id: i64,
        aggregate_id: i64,
        desired: &DesiredPosition,
    ) -> rusqlite::Result<()> {
        conn.execute(
            "INSERT INTO shift_positions (
                id,
                shift_type_id,
                position_type_id,
                total_slots,
                wap_points,
                added
            ) VALUES (?1, ?2, ?3, ?4, ?5, 1);",
            params![
                id,
                aggregate_id,
                desired.position_type_id,
                desired.total_slots,
                desired.wap_points,
            ],
        )?;
        Ok(())
    }

    fn rewrite(
        conn: &Connection,
        current: &ShiftPosition,
        desired: &DesiredPosition,
    ) -> rusqlite::Result<()> {
        conn.execute(
            "UPDATE shift_positions
             SET total_slots = ?2,
                 wap_points = ?3,
                 updated = 1
             WHERE id = ?1;",
            params![current.id, desired.total_slots, desired.wap_points],
        )?;
        Ok(())
    }

    fn tombstone(conn: &Connection, current: &ShiftPosition) -> rusqlite::Result<()> {
        conn.execute(
            "UPDATE shift_positions SET removed = 1 WHERE id = ?1;",
            [current.id],
        )?;
        Ok(())
    }
}

struct TimeTable;

impl ChildTable for TimeTable {
    type Desired = DesiredTime;
    type Current = ShiftTime;

    const CLASS: EntityClass = EntityClass::ShiftTime;

    fn insert(
        conn: &Connection,
        id: i64,
        aggregate_id: i64,
        desired: &DesiredTime,
    ) -> rusqlite::Result<()> {
        conn.execute(
            "INSERT INTO shift_times (
                id,
                shift_type_id,
                start_time,
                end_time,
                instance,
                notes,
                added
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, 1);",
            params![
                id,
                aggregate_id,
                desired.start_time.as_str(),
                desired.end_time.as_str(),
                desired.instance.as_str(),
                desired.notes.as_str(),
            ],
        )?;
        Ok(())
    }

    fn rewrite(conn: &Connection, current: &ShiftTime, desired: &DesiredTime) -> rusqlite::Result<()> {
        conn.execute(
            "UPDATE shift_times
             SET start_time = ?2,
                 end_time = ?3,
                 instance = ?4,
                 notes = ?5,
                 updated = 1
             WHERE id = ?1;",
            params![
                current.id,
                desired.start_time.as_str(),
                desired.end_time.as_str(),
                desired.instance.as_str(),
                desired.notes.as_str(),
            ],
        )?;
        Ok(())
    }

    fn tombstone(conn: &Connection, current: &ShiftTime) -> rusqlite::Result<()> {
        conn.execute("UPDATE shift_times SET removed = 1 WHERE id = ?1;", [current.id])?;
        Ok(())
    }
}

/// Inserts or replaces one shift category. Reference-data provisioning.
pub fn upsert_category(conn: &Connection, id: CategoryId, name: &str) -> RepoResult<()> {
    conn.execute(
        "INSERT INTO shift_categories (id, name) VALUES (?1, ?2)
         ON CONFLICT(id) DO UPDATE SET name = excluded.name;",
        params![id, name],
    )?;
    Ok(())
}

/// Inserts or replaces one position type. Reference-data provisioning.
pub fn upsert_position_type(
    conn: &Connection,
    id: PositionTypeId,
    name: &str,
    role_id: Option<i64>,
) -> RepoResult<()> {
    conn.execute(
        "INSERT INTO position_types (id, name, role_id) VALUES (?1, ?2, ?3)
         ON CONFLICT(id) DO UPDATE SET name = excluded.name, role_id = excluded.role_id;",
        params![id, name, role_id],
    )?;
    Ok(())
}

fn apply_error(err: ApplyError) -> ReconcileError {
    match err {
        ApplyError::Generation(err) => err.into(),
        ApplyError::Write {
            phase,
            table,
            source,
        } => ReconcileError::ApplyFailed(RepoError::WriteFailed {
            phase,
            table,
            source,
        }),
    }
}

fn validate_information(conn: &Connection, info: &ShiftTypeInfo) -> Result<(), ReconcileError> {
    if info.name.trim().is_empty() {
        return Err(ReconcileError::ValidationFailed(ValidationIssue::BlankName));
    }
    if let Some(category_id) = info.category_id {
        if !reference_exists(conn, "shift_categories", category_id)? {
            return Err(ReconcileError::ValidationFailed(
                ValidationIssue::UnknownCategory(category_id),
            ));
        }
    }
    Ok(())
}

/// Rejects removal of a time or position that volunteers are still on.
fn ensure_no_signups(
    conn: &Connection,
    collection: &'static str,
    column: &'static str,
    id: i64,
) -> Result<(), ReconcileError> {
    let occupied: i64 = conn
        .query_row(
            &format!(
                "SELECT EXISTS(SELECT 1 FROM shift_volunteers WHERE {column} = ?1 AND removed = 0);"
            ),
            [id],
            |row| row.get(0),
        )
        .map_err(RepoError::from)?;
    if occupied == 1 {
        return Err(ReconcileError::ValidationFailed(
            ValidationIssue::ChildHasSignups { collection, id },
        ));
    }
    Ok(())
}

fn position_type_exists(conn: &Connection, id: PositionTypeId) -> RepoResult<bool> {
    reference_exists(conn, "position_types", id)
}

fn reference_exists(conn: &Connection, table: &'static str, id: i64) -> RepoResult<bool> {
    let exists: i64 = conn.query_row(
        &format!("SELECT EXISTS(SELECT 1 FROM {table} WHERE id = ?1 AND removed = 0);"),
        [id],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

fn load_shift_type(
    conn: &Connection,
    id: ShiftTypeId,
    include_removed: bool,
) -> RepoResult<Option<ShiftType>> {
    let mut stmt = conn.prepare(&format!(
        "{SHIFT_TYPE_SELECT_SQL}
         WHERE id = ?1
           AND (?2 = 1 OR removed = 0);"
    ))?;
    let mut rows = stmt.query(params![id, bool_to_int(include_removed)])?;
    match rows.next()? {
        Some(row) => Ok(Some(parse_shift_type_row(row)?)),
        None => Ok(None),
    }
}

fn load_positions(
    conn: &Connection,
    shift_type_id: ShiftTypeId,
    include_removed: bool,
) -> RepoResult<Vec<ShiftPosition>> {
    let mut stmt = conn.prepare(
        "SELECT
            sp.id AS id,
            sp.shift_type_id AS shift_type_id,
            sp.position_type_id AS position_type_id,
            pt.name AS position_name,
            r.name AS role_name,
            sp.total_slots AS total_slots,
            sp.wap_points AS wap_points,
            sp.added AS added,
            sp.updated AS updated,
            sp.removed AS removed
         FROM shift_positions sp
         INNER JOIN position_types pt ON pt.id = sp.position_type_id
         LEFT JOIN roles r ON r.id = pt.role_id
         WHERE sp.shift_type_id = ?1
           AND (?2 = 1 OR sp.removed = 0)
         ORDER BY pt.name ASC, sp.id ASC;",
    )?;
    let mut rows = stmt.query(params![shift_type_id, bool_to_int(include_removed)])?;
    let mut positions = Vec::new();
    while let Some(row) = rows.next()? {
        positions.push(ShiftPosition {
            id: row.get("id")?,
            shift_type_id: row.get("shift_type_id")?,
            position_type_id: row.get("position_type_id")?,
            position_name: row.get("position_name")?,
            role_name: row.get("role_name")?,
            total_slots: row.get("total_slots")?,
            wap_points: row.get("wap_points")?,
            added: parse_flag(row, "added", "shift_positions")?,
            updated: parse_flag(row, "updated", "shift_positions")?,
            removed: parse_flag(row, "removed", "shift_positions")?,
        });
    }
    Ok(positions)
}

fn load_times(
    conn: &Connection,
    shift_type_id: ShiftTypeId,
    include_removed: bool,
) -> RepoResult<Vec<ShiftTime>> {
    let mut stmt = conn.prepare(
        "SELECT
            id,
            shift_type_id,
            start_time,
            end_time,
            instance,
            notes,
            added,
            updated,
            removed
         FROM shift_times
         WHERE shift_type_id = ?1
           AND (?2 = 1 OR removed = 0)
         ORDER BY start_time ASC, id ASC;",
    )?;
    let mut rows = stmt.query(params![shift_type_id, bool_to_int(include_removed)])?;
    let mut times = Vec::new();
    while let Some(row) = rows.next()? {
        times.push(ShiftTime {
            id: row.get("id")?,
            shift_type_id: row.get("shift_type_id")?,
            start_time: row.get("start_time")?,
            end_time: row.get("end_time")?,
            instance: row.get("instance")?,
            notes: row.get("notes")?,
            added: parse_flag(row, "added", "shift_times")?,
            updated: parse_flag(row, "updated", "shift_times")?,
            removed: parse_flag(row, "removed", "shift_times")?,
        });
    }
    Ok(times)
}

fn parse_shift_type_row(row: &Row<'_>) -> RepoResult<ShiftType> {
    Ok(ShiftType {
        id: row.get("id")?,
        info: ShiftTypeInfo {
            name: row.get("name")?,
            details: row.get("details")?,
            category_id: row.get("category_id")?,
            is_core: parse_flag(row, "is_core", "shift_types")?,
            is_off_playa: parse_flag(row, "is_off_playa", "shift_types")?,
        },
        version: row.get("version")?,
        updated: parse_flag(row, "updated", "shift_types")?,
        removed: parse_flag(row, "removed", "shift_types")?,
    })
}
