//! Role roster repository.
//!
//! # Responsibility
//! - Persist the shared role roster keyed by normalized name.
//!
//! # Invariants
//! - At most one live role per case-insensitive name.
//! - Removal is a tombstone; a removed name may be created again.

use crate::db::ensure_schema_ready;
use crate::model::shared::RoleItem;
use crate::repo::{bool_to_int, parse_flag, RepoResult};
use rusqlite::{params, Connection, Row};

/// Repository interface for the role roster.
pub trait RoleRepository {
    /// Live roles ordered by name (case-insensitive).
    fn list_roles(&self) -> RepoResult<Vec<RoleItem>>;
    fn find_role(&self, name: &str) -> RepoResult<Option<RoleItem>>;
    /// Inserts a live role. Callers check for a live duplicate first.
    fn create_role(&self, role: &RoleItem) -> RepoResult<()>;
    /// Returns `false` when no live role has that name.
    fn set_display(&self, name: &str, display: bool) -> RepoResult<bool>;
    /// Renames a live role in place. Returns `false` when no live role has
    /// that name.
    fn rename_role(&self, name: &str, new_name: &str) -> RepoResult<bool>;
    /// Returns `false` when no live role has that name.
    fn remove_role(&self, name: &str) -> RepoResult<bool>;
}

/// SQLite-backed role repository.
pub struct SqliteRoleRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteRoleRepository<'conn> {
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_schema_ready(conn)?;
        Ok(Self { conn })
    }
}

impl RoleRepository for SqliteRoleRepository<'_> {
    fn list_roles(&self) -> RepoResult<Vec<RoleItem>> {
        let mut stmt = self.conn.prepare(
            "SELECT name, display
             FROM roles
             WHERE removed = 0
             ORDER BY name COLLATE NOCASE ASC, id ASC;",
        )?;
        let mut rows = stmt.query([])?;
        let mut roles = Vec::new();
        while let Some(row) = rows.next()? {
            roles.push(parse_role_row(row)?);
        }
        Ok(roles)
    }

    fn find_role(&self, name: &str) -> RepoResult<Option<RoleItem>> {
        let mut stmt = self.conn.prepare(
            "SELECT name, display
             FROM roles
             WHERE name = ?1 COLLATE NOCASE
               AND removed = 0;",
        )?;
        let mut rows = stmt.query([name])?;
        match rows.next()? {
            Some(row) => Ok(Some(parse_role_row(row)?)),
            None => Ok(None),
        }
    }

    fn create_role(&self, role: &RoleItem) -> RepoResult<()> {
        self.conn.execute(
            "INSERT INTO roles (name, display) VALUES (?1, ?2);",
            params![role.name.as_str(), bool_to_int(role.display)],
        )?;
        Ok(())
    }

    fn set_display(&self, name: &str, display: bool) -> RepoResult<bool> {
        let changed = self.conn.execute(
            "UPDATE roles
             SET display = ?2,
                 updated_at = (strftime('%s', 'now') * 1000)
             WHERE name = ?1 COLLATE NOCASE
               AND removed = 0;",
            params![name, bool_to_int(display)],
        )?;
        Ok(changed > 0)
    }

    fn rename_role(&self, name: &str, new_name: &str) -> RepoResult<bool> {
        let changed = self.conn.execute(
            "UPDATE roles
             SET name = ?2,
                 updated_at = (strftime('%s', 'now') * 1000)
             WHERE name = ?1 COLLATE NOCASE
               AND removed = 0;",
            params![name, new_name],
        )?;
        Ok(changed > 0)
    }

    fn remove_role(&self, name: &str) -> RepoResult<bool> {
        let changed = self.conn.execute(
            "UPDATE roles
             SET removed = 1,
                 updated_at = (strftime('%s', 'now') * 1000)
             WHERE name = ?1 COLLATE NOCASE
               AND removed = 0;",
            [name],
        )?;
        Ok(changed > 0)
    }
}

fn parse_role_row(row: &Row<'_>) -> RepoResult<RoleItem> {
    Ok(RoleItem {
        name: row.get("name")?,
        display: parse_flag(row, "display", "roles")?,
    })
}
