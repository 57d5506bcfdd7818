//! Volunteer signup repository for shift times.

use crate::db::ensure_schema_ready;
use crate::model::shared::ShiftVolunteerItem;
use crate::model::shift_type::{ShiftPositionId, ShiftTimeId};
use crate::repo::RepoResult;
use rusqlite::{params, Connection};

/// Repository interface for per-time signup lists.
pub trait SignupRepository {
    /// Live signups of one time, ordered by display name then volunteer id.
    fn list_signups(&self, shift_time_id: ShiftTimeId) -> RepoResult<Vec<ShiftVolunteerItem>>;
    /// Returns `false` when the volunteer already holds a live signup there.
    fn add_signup(&self, item: &ShiftVolunteerItem) -> RepoResult<bool>;
    /// Returns `false` when there was no live signup to remove.
    fn remove_signup(&self, shift_time_id: ShiftTimeId, volunteer_id: &str) -> RepoResult<bool>;
    /// Whether the time and position are live and belong to the same shift type.
    fn slot_is_open(
        &self,
        shift_time_id: ShiftTimeId,
        shift_position_id: ShiftPositionId,
    ) -> RepoResult<bool>;
}

/// SQLite-backed signup repository.
pub struct SqliteSignupRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteSignupRepository<'conn> {
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_schema_ready(conn)?;
        Ok(Self { conn })
    }
}

impl SignupRepository for SqliteSignupRepository<'_> {
    fn list_signups(&self, shift_time_id: ShiftTimeId) -> RepoResult<Vec<ShiftVolunteerItem>> {
        let mut stmt = self.conn.prepare(
            "SELECT volunteer_id, shift_time_id, shift_position_id, display_name
             FROM shift_volunteers
             WHERE shift_time_id = ?1
               AND removed = 0
             ORDER BY display_name ASC, volunteer_id ASC;",
        )?;
        let mut rows = stmt.query([shift_time_id])?;
        let mut items = Vec::new();
        while let Some(row) = rows.next()? {
            items.push(ShiftVolunteerItem {
                volunteer_id: row.get("volunteer_id")?,
                shift_time_id: row.get("shift_time_id")?,
                shift_position_id: row.get("shift_position_id")?,
                display_name: row.get("display_name")?,
            });
        }
        Ok(items)
    }

    fn add_signup(&self, item: &ShiftVolunteerItem) -> RepoResult<bool> {
        let inserted = self.conn.execute(
            "INSERT INTO shift_volunteers (
                shift_time_id,
                volunteer_id,
                shift_position_id,
                display_name
            ) VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT DO NOTHING;",
            params![
                item.shift_time_id,
                item.volunteer_id.as_str(),
                item.shift_position_id,
                item.display_name.as_str(),
            ],
        )?;
        Ok(inserted > 0)
    }

    fn remove_signup(&self, shift_time_id: ShiftTimeId, volunteer_id: &str) -> RepoResult<bool> {
        let changed = self.conn.execute(
            "UPDATE shift_volunteers
             SET removed = 1,
                 updated_at = (strftime('%s', 'now') * 1000)
             WHERE shift_time_id = ?1
               AND volunteer_id = ?2
               AND removed = 0;",
            params![shift_time_id, volunteer_id],
        )?;
        Ok(changed > 0)
    }

    fn slot_is_open(
        &self,
        shift_time_id: ShiftTimeId,
        shift_position_id: ShiftPositionId,
    ) -> RepoResult<bool> {
        let open: i64 = self.conn.query_row(
            "SELECT EXISTS(
                SELECT 1
                FROM shift_times st
                INNER JOIN shift_positions sp ON sp.shift_type_id = st.shift_type_id
                INNER JOIN shift_types t ON t.id = st.shift_type_id
                WHERE st.id = ?1
                  AND sp.id = ?2
                  AND st.removed = 0
                  AND sp.removed = 0
                  AND t.removed = 0
            );",
            params![shift_time_id, shift_position_id],
            |row| row.get(0),
        )?;
        Ok(open == 1)
    }
}
