//! Reconciliation applier.
//!
//! Executes diff plans for one aggregate against persistence in a fixed
//! phase order: aggregate rewrite, additions, updates, tombstones. Additions
//! of every collection run before any update, and updates before any
//! tombstone.
//!
//! # Invariants
//! - New rows are written with `added = 1` and a generated id.
//! - Rewritten rows get `updated = 1`; id and foreign key are never touched.
//! - Removed rows only get `removed = 1`.
//! - The applier never opens, commits or rolls back a transaction; the
//!   caller decides atomicity.

use crate::db::DbError;
use crate::reconcile::differ::DiffPlan;
use crate::reconcile::id_gen::{EntityClass, IdGenError, IdGenerator};
use log::debug;
use rusqlite::Connection;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Phase of an apply run, carried by errors for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyPhase {
    Aggregate,
    Add,
    Update,
    Remove,
}

impl ApplyPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Aggregate => "aggregate",
            Self::Add => "add",
            Self::Update => "update",
            Self::Remove => "remove",
        }
    }
}

#[derive(Debug)]
pub enum ApplyError {
    Generation(IdGenError),
    Write {
        phase: ApplyPhase,
        table: &'static str,
        source: DbError,
    },
}

impl Display for ApplyError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Generation(err) => write!(f, "{err}"),
            Self::Write {
                phase,
                table,
                source,
            } => write!(f, "{} write on {table} failed: {source}", phase.as_str()),
        }
    }
}

impl Error for ApplyError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Generation(err) => Some(err),
            Self::Write { source, .. } => Some(source),
        }
    }
}

/// Row counts written by one apply run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplySummary {
    pub added: usize,
    pub updated: usize,
    pub removed: usize,
}

/// Persistence seam for the aggregate's own scalar row.
pub trait AggregateTable {
    const TABLE: &'static str;

    /// Rewrites scalar fields and sets the dirty marker.
    fn rewrite(&self, conn: &Connection, aggregate_id: i64) -> rusqlite::Result<()>;
}

/// Persistence seam for one child collection.
pub trait ChildTable {
    type Desired;
    type Current;

    const CLASS: EntityClass;

    fn insert(
        conn: &Connection,
        id: i64,
        aggregate_id: i64,
        desired: &Self::Desired,
    ) -> rusqlite::Result<()>;

    fn rewrite(
        conn: &Connection,
        current: &Self::Current,
        desired: &Self::Desired,
    ) -> rusqlite::Result<()>;

    fn tombstone(conn: &Connection, current: &Self::Current) -> rusqlite::Result<()>;
}

/// Diff plan bound to the table it is applied to.
pub struct ChildPlan<'a, T: ChildTable> {
    plan: DiffPlan<'a, T::Desired, T::Current>,
}

impl<'a, T: ChildTable> ChildPlan<'a, T> {
    pub fn new(plan: DiffPlan<'a, T::Desired, T::Current>) -> Self {
        Self { plan }
    }
}

/// Object-safe view of a [`ChildPlan`] so plans of different tables can be
/// interleaved phase by phase.
pub trait PlanPhases {
    fn table(&self) -> &'static str;
    fn add(
        &self,
        conn: &Connection,
        aggregate_id: i64,
        ids: &mut dyn IdGenerator,
    ) -> Result<usize, ApplyError>;
    fn update(&self, conn: &Connection) -> Result<usize, ApplyError>;
    fn remove(&self, conn: &Connection) -> Result<usize, ApplyError>;
}

impl<T: ChildTable> PlanPhases for ChildPlan<'_, T> {
    fn table(&self) -> &'static str {
        T::CLASS.table()
    }

    fn add(
        &self,
        conn: &Connection,
        aggregate_id: i64,
        ids: &mut dyn IdGenerator,
    ) -> Result<usize, ApplyError> {
        for desired in &self.plan.to_add {
            let id = ids
                .generate(conn, T::CLASS)
                .map_err(ApplyError::Generation)?;
            T::insert(conn, id, aggregate_id, desired)
                .map_err(|err| write_error(ApplyPhase::Add, T::CLASS.table(), err))?;
        }
        Ok(self.plan.to_add.len())
    }

    fn update(&self, conn: &Connection) -> Result<usize, ApplyError> {
        for (desired, current) in &self.plan.to_update {
            T::rewrite(conn, current, desired)
                .map_err(|err| write_error(ApplyPhase::Update, T::CLASS.table(), err))?;
        }
        Ok(self.plan.to_update.len())
    }

    fn remove(&self, conn: &Connection) -> Result<usize, ApplyError> {
        for current in &self.plan.to_remove {
            T::tombstone(conn, current)
                .map_err(|err| write_error(ApplyPhase::Remove, T::CLASS.table(), err))?;
        }
        Ok(self.plan.to_remove.len())
    }
}

/// Applies the aggregate rewrite and every child plan in phase order.
pub fn apply<A: AggregateTable>(
    conn: &Connection,
    aggregate_id: i64,
    aggregate: &A,
    children: &[&dyn PlanPhases],
    ids: &mut dyn IdGenerator,
) -> Result<ApplySummary, ApplyError> {
    aggregate
        .rewrite(conn, aggregate_id)
        .map_err(|err| write_error(ApplyPhase::Aggregate, A::TABLE, err))?;

    let mut summary = ApplySummary::default();
    for child in children {
        let added = child.add(conn, aggregate_id, ids)?;
        debug!(
            "event=reconcile_phase module=reconcile phase=add table={} aggregate_id={aggregate_id} rows={added}",
            child.table()
        );
        summary.added += added;
    }
    for child in children {
        let updated = child.update(conn)?;
        debug!(
            "event=reconcile_phase module=reconcile phase=update table={} aggregate_id={aggregate_id} rows={updated}",
            child.table()
        );
        summary.updated += updated;
    }
    for child in children {
        let removed = child.remove(conn)?;
        debug!(
            "event=reconcile_phase module=reconcile phase=remove table={} aggregate_id={aggregate_id} rows={removed}",
            child.table()
        );
        summary.removed += removed;
    }

    Ok(summary)
}

fn write_error(phase: ApplyPhase, table: &'static str, err: rusqlite::Error) -> ApplyError {
    ApplyError::Write {
        phase,
        table,
        source: DbError::Sqlite(err),
    }
}
