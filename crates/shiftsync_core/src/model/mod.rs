//! Domain model for reconciled aggregates and live shared collections.
//!
//! # Responsibility
//! - Define the persisted shapes of shift types and their child rows.
//! - Define desired-state payloads submitted by clients.
//! - Define items of collections watched by several live viewers.
//!
//! # Invariants
//! - Surrogate ids are stable for the lifetime of a row, tombstoned or not.
//! - Deletion is represented by a `removed` tombstone, never a hard delete.

pub mod shared;
pub mod shift_type;
