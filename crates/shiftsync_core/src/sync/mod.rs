//! Live propagation of shared-collection mutations.
//!
//! # Responsibility
//! - Describe mutation events ([`event`]).
//! - Fan events out to connected viewers ([`broadcast`]).
//! - Patch viewer-side caches from received events ([`cache`]).
//!
//! # Invariants
//! - Delivery is best-effort and in-process; nothing is persisted or
//!   replayed. Viewers recover from gaps with a full read.

pub mod broadcast;
pub mod cache;
pub mod event;
