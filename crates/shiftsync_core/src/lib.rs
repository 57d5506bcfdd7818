//! Core engine for shift scheduling data.
//! This crate is the single source of truth for reconciliation and
//! shared-collection invariants.

pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod reconcile;
pub mod repo;
pub mod service;
pub mod sync;

pub use config::{ConfigError, EngineConfig, IdStrategy};
pub use db::{open_db, open_db_in_memory, DbError};
pub use logging::{default_log_level, init_from_config, init_logging, logging_status};
pub use model::shared::{CollectionKind, RoleItem, SharedItem, ShiftVolunteerItem};
pub use model::shift_type::{
    DesiredPosition, DesiredShiftType, DesiredTime, ShiftPosition, ShiftTime, ShiftType,
    ShiftTypeId, ShiftTypeInfo, ShiftTypeSnapshot,
};
pub use reconcile::{ReconcileError, ValidationIssue};
pub use repo::role_repo::SqliteRoleRepository;
pub use repo::shift_type_repo::{ShiftTypeRepository, SqliteShiftTypeRepository};
pub use repo::signup_repo::SqliteSignupRepository;
pub use repo::{RepoError, RepoResult};
pub use service::role_service::{RoleService, RoleServiceError};
pub use service::shift_type_service::ShiftTypeService;
pub use service::signup_service::{SignupService, SignupServiceError};
pub use sync::broadcast::{BroadcastError, EventBroadcaster, Subscription, SubscriptionFilter};
pub use sync::cache::{apply_event, CacheStatus, LiveCache, PatchOutcome};
pub use sync::event::{BroadcastEvent, CollectionId, EventAction, SubscriberId};

/// Minimal health-check API for early integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
