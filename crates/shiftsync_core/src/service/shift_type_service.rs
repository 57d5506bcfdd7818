//! Shift type use-case service.
//!
//! # Responsibility
//! - Expose read / reconcile / tombstone of one shift type aggregate.
//! - Pick the id generation strategy from engine configuration.
//! - Emit one metadata-only log line per operation.
//!
//! # Invariants
//! - Reconcile returns nothing on success; callers re-read for the new state.
//! - Payload contents (names, notes) never reach the log.

use std::time::Instant;

use log::{error, info, warn};

use crate::config::EngineConfig;
use crate::model::shift_type::{DesiredShiftType, ShiftType, ShiftTypeId, ShiftTypeInfo, ShiftTypeSnapshot};
use crate::reconcile::id_gen::generator_for;
use crate::reconcile::ReconcileError;
use crate::repo::shift_type_repo::ShiftTypeRepository;
use crate::repo::RepoResult;

/// Use-case service wrapper for the shift type aggregate.
pub struct ShiftTypeService<R: ShiftTypeRepository> {
    repo: R,
    config: EngineConfig,
}

impl<R: ShiftTypeRepository> ShiftTypeService<R> {
    pub fn new(repo: R, config: EngineConfig) -> Self {
        Self { repo, config }
    }

    /// Creates an empty aggregate (no positions, no times).
    pub fn create(&self, info: &ShiftTypeInfo) -> Result<ShiftType, ReconcileError> {
        let mut ids = generator_for(self.config.id_strategy, self.config.probe);
        let created = self.repo.create_shift_type(info, ids.as_mut())?;
        info!(
            "event=shift_type_create module=service status=ok shift_type_id={}",
            created.id
        );
        Ok(created)
    }

    /// Live aggregate with its live positions and times; `None` when the
    /// aggregate is missing or tombstoned.
    pub fn read(&self, id: ShiftTypeId) -> RepoResult<Option<ShiftTypeSnapshot>> {
        self.repo.read(id)
    }

    /// Makes the persisted aggregate match `desired`.
    ///
    /// # Contract
    /// - `desired.expected_version` must equal the persisted version.
    /// - On any error nothing is persisted.
    pub fn reconcile(
        &self,
        id: ShiftTypeId,
        desired: &DesiredShiftType,
    ) -> Result<(), ReconcileError> {
        let started_at = Instant::now();
        let mut ids = generator_for(self.config.id_strategy, self.config.probe);
        match self.repo.reconcile(id, desired, ids.as_mut()) {
            Ok(summary) => {
                info!(
                    "event=reconcile module=service status=ok shift_type_id={id} added={} updated={} removed={} duration_ms={}",
                    summary.added,
                    summary.updated,
                    summary.removed,
                    started_at.elapsed().as_millis()
                );
                Ok(())
            }
            Err(err) => {
                log_failure("reconcile", id, &err, started_at);
                Err(err)
            }
        }
    }

    /// Tombstones the aggregate; children are left untouched.
    pub fn tombstone(&self, id: ShiftTypeId) -> Result<(), ReconcileError> {
        let started_at = Instant::now();
        match self.repo.tombstone(id) {
            Ok(()) => {
                info!(
                    "event=shift_type_tombstone module=service status=ok shift_type_id={id} duration_ms={}",
                    started_at.elapsed().as_millis()
                );
                Ok(())
            }
            Err(err) => {
                log_failure("shift_type_tombstone", id, &err, started_at);
                Err(err)
            }
        }
    }
}

fn log_failure(event: &str, id: ShiftTypeId, err: &ReconcileError, started_at: Instant) {
    let duration_ms = started_at.elapsed().as_millis();
    match err {
        ReconcileError::ApplyFailed(_) | ReconcileError::GenerationExhausted { .. } => error!(
            "event={event} module=service status=error shift_type_id={id} duration_ms={duration_ms} error_code={} error={err}",
            err.code()
        ),
        _ => warn!(
            "event={event} module=service status=error shift_type_id={id} duration_ms={duration_ms} error_code={}",
            err.code()
        ),
    }
}
