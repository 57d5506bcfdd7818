//! Declarative list reconciliation.
//!
//! # Responsibility
//! - Diff a desired child collection against persisted state ([`differ`]).
//! - Generate collision-free surrogate ids ([`id_gen`]).
//! - Apply the resulting plan in a fixed phase order ([`applier`]).
//! - Define the error taxonomy surfaced to reconcile callers.
//!
//! # Invariants
//! - Validation failures are raised before any write.
//! - Diffing and payload validation are pure; only the applier writes.

use std::collections::HashSet;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::hash::Hash;

use crate::model::shift_type::ShiftTypeId;
use crate::reconcile::differ::Keyed;
use crate::reconcile::id_gen::{EntityClass, IdGenError};
use crate::repo::RepoError;

pub mod applier;
pub mod differ;
pub mod id_gen;

/// Reason a desired-state payload was rejected before reconciliation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationIssue {
    BlankName,
    UnknownCategory(i64),
    UnknownPositionType(i64),
    DuplicateKey {
        collection: &'static str,
        key: String,
    },
    /// A child the payload drops still has live volunteer signups.
    ChildHasSignups {
        collection: &'static str,
        id: i64,
    },
}

impl Display for ValidationIssue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BlankName => write!(f, "name must not be blank"),
            Self::UnknownCategory(id) => write!(f, "category {id} cannot be resolved"),
            Self::UnknownPositionType(id) => write!(f, "position type {id} cannot be resolved"),
            Self::DuplicateKey { collection, key } => {
                write!(f, "{collection} lists key {key} more than once")
            }
            Self::ChildHasSignups { collection, id } => {
                write!(f, "volunteers must be removed from {collection} entry {id} first")
            }
        }
    }
}

/// Errors surfaced by read/reconcile/tombstone on an aggregate.
#[derive(Debug)]
pub enum ReconcileError {
    /// Payload rejected; nothing was persisted.
    ValidationFailed(ValidationIssue),
    /// Aggregate does not exist or is tombstoned.
    NotFound(ShiftTypeId),
    /// Aggregate changed since the desired state was read; nothing was
    /// persisted.
    VersionConflict {
        shift_type_id: ShiftTypeId,
        expected: i64,
        actual: i64,
    },
    /// Id space exhausted for one addition; the reconciliation was rolled back.
    GenerationExhausted { class: EntityClass, attempts: u32 },
    /// A persistence write failed; the reconciliation was rolled back.
    ApplyFailed(RepoError),
}

impl ReconcileError {
    /// Stable code for log lines.
    pub fn code(&self) -> &'static str {
        match self {
            Self::ValidationFailed(_) => "validation_failed",
            Self::NotFound(_) => "not_found",
            Self::VersionConflict { .. } => "version_conflict",
            Self::GenerationExhausted { .. } => "generation_exhausted",
            Self::ApplyFailed(_) => "apply_failed",
        }
    }
}

impl Display for ReconcileError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ValidationFailed(issue) => write!(f, "validation failed: {issue}"),
            Self::NotFound(id) => write!(f, "shift type not found: {id}"),
            Self::VersionConflict {
                shift_type_id,
                expected,
                actual,
            } => write!(
                f,
                "shift type {shift_type_id} changed concurrently: expected version {expected}, found {actual}"
            ),
            Self::GenerationExhausted { class, attempts } => {
                write!(f, "no free id for {class} after {attempts} attempts")
            }
            Self::ApplyFailed(err) => write!(f, "apply failed: {err}"),
        }
    }
}

impl Error for ReconcileError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::ApplyFailed(err) => Some(err),
            _ => None,
        }
    }
}

impl From<IdGenError> for ReconcileError {
    fn from(value: IdGenError) -> Self {
        match value {
            IdGenError::Exhausted { class, attempts } => {
                Self::GenerationExhausted { class, attempts }
            }
            IdGenError::Db(err) => Self::ApplyFailed(RepoError::Db(err)),
        }
    }
}

impl From<RepoError> for ReconcileError {
    fn from(value: RepoError) -> Self {
        Self::ApplyFailed(value)
    }
}

/// Rejects desired collections that list the same key twice.
pub fn ensure_unique_keys<T>(collection: &'static str, items: &[T]) -> Result<(), ValidationIssue>
where
    T: Keyed,
    T::Key: Hash,
{
    let mut seen = HashSet::with_capacity(items.len());
    for key in items.iter().filter_map(Keyed::diff_key) {
        if !seen.insert(key.clone()) {
            return Err(ValidationIssue::DuplicateKey {
                collection,
                key: format!("{key:?}"),
            });
        }
    }
    Ok(())
}
