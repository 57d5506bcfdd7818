//! Repository layer contracts and SQLite implementations.
//!
//! # Responsibility
//! - Own every SQL statement of the engine.
//! - Isolate query details from service orchestration.
//!
//! # Invariants
//! - Live reads filter `removed = 0`.
//! - Rows are never physically deleted.
//! - Read paths reject invalid persisted flags instead of masking them.

use crate::db::DbError;
use crate::reconcile::applier::ApplyPhase;
use rusqlite::Row;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod role_repo;
pub mod shift_type_repo;
pub mod signup_repo;

pub type RepoResult<T> = Result<T, RepoError>;

/// Repository error shared by every table family.
#[derive(Debug)]
pub enum RepoError {
    Db(DbError),
    /// One write of a multi-step operation failed.
    WriteFailed {
        phase: ApplyPhase,
        table: &'static str,
        source: DbError,
    },
    InvalidData(String),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::WriteFailed {
                phase,
                table,
                source,
            } => write!(f, "{} write on {table} failed: {source}", phase.as_str()),
            Self::InvalidData(message) => write!(f, "invalid persisted data: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::WriteFailed { source, .. } => Some(source),
            Self::InvalidData(_) => None,
        }
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

pub(crate) fn parse_flag(row: &Row<'_>, column: &str, table: &str) -> RepoResult<bool> {
    match row.get::<_, i64>(column)? {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(RepoError::InvalidData(format!(
            "invalid flag value `{other}` in {table}.{column}"
        ))),
    }
}

pub(crate) fn bool_to_int(value: bool) -> i64 {
    if value {
        1
    } else {
        0
    }
}
