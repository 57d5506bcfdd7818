//! Role roster use-case service.
//!
//! # Responsibility
//! - List, create, rename, toggle and remove roles on the shared roster.
//! - Publish one roster event per successful write.
//!
//! # Invariants
//! - Role names are normalized before any lookup or write.
//! - At most one live role per case-insensitive name.
//! - A rename changes the natural key, so it is announced as `Remove` of the
//!   old item followed by `Add` of the new one.

use std::error::Error;
use std::fmt::{Display, Formatter};

use log::info;
use rusqlite::ErrorCode;

use crate::db::DbError;
use crate::model::shared::{normalize_role_name, RoleItem, SharedItem};
use crate::repo::role_repo::RoleRepository;
use crate::repo::RepoError;
use crate::service::publish_item;
use crate::sync::broadcast::EventBroadcaster;
use crate::sync::event::{EventAction, SubscriberId};

#[derive(Debug)]
pub enum RoleServiceError {
    /// Name is blank after normalization.
    InvalidName,
    /// A live role already uses this name.
    Duplicate(String),
    NotFound(String),
    Repo(RepoError),
}

impl Display for RoleServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidName => write!(f, "role name must not be blank"),
            Self::Duplicate(name) => write!(f, "role already exists: `{name}`"),
            Self::NotFound(name) => write!(f, "role not found: `{name}`"),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for RoleServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Repo(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for RoleServiceError {
    fn from(value: RepoError) -> Self {
        Self::Repo(value)
    }
}

/// Use-case service for the shared role roster.
pub struct RoleService<R: RoleRepository> {
    repo: R,
    broadcaster: EventBroadcaster,
}

impl<R: RoleRepository> RoleService<R> {
    pub fn new(repo: R, broadcaster: EventBroadcaster) -> Self {
        Self { repo, broadcaster }
    }

    pub fn list_roles(&self) -> Result<Vec<RoleItem>, RoleServiceError> {
        Ok(self.repo.list_roles()?)
    }

    /// Creates a displayed role and announces it to other viewers.
    pub fn create_role(
        &self,
        name: &str,
        origin: Option<SubscriberId>,
    ) -> Result<RoleItem, RoleServiceError> {
        let role = RoleItem::new(name);
        if role.name.is_empty() {
            return Err(RoleServiceError::InvalidName);
        }
        if self.repo.find_role(&role.name)?.is_some() {
            return Err(RoleServiceError::Duplicate(role.name));
        }
        self.repo.create_role(&role).map_err(|err| {
            if is_unique_violation(&err) {
                RoleServiceError::Duplicate(role.name.clone())
            } else {
                RoleServiceError::Repo(err)
            }
        })?;

        info!("event=role_create module=service status=ok");
        publish_item(&self.broadcaster, None, EventAction::Add, &role, origin);
        Ok(role)
    }

    /// Sets the display flag; returns the stored role.
    pub fn set_display(
        &self,
        name: &str,
        display: bool,
        origin: Option<SubscriberId>,
    ) -> Result<RoleItem, RoleServiceError> {
        let name = normalize_role_name(name);
        if !self.repo.set_display(&name, display)? {
            return Err(RoleServiceError::NotFound(name));
        }
        let role = self
            .repo
            .find_role(&name)?
            .ok_or_else(|| RoleServiceError::NotFound(name.clone()))?;

        info!("event=role_display module=service status=ok display={display}");
        publish_item(&self.broadcaster, None, EventAction::Update, &role, origin);
        Ok(role)
    }

    /// Flips the display flag of a live role.
    pub fn toggle_display(
        &self,
        name: &str,
        origin: Option<SubscriberId>,
    ) -> Result<RoleItem, RoleServiceError> {
        let name = normalize_role_name(name);
        let current = self
            .repo
            .find_role(&name)?
            .ok_or_else(|| RoleServiceError::NotFound(name.clone()))?;
        self.set_display(&current.name, !current.display, origin)
    }

    /// Renames a live role, keeping its display flag.
    pub fn rename_role(
        &self,
        name: &str,
        new_name: &str,
        origin: Option<SubscriberId>,
    ) -> Result<RoleItem, RoleServiceError> {
        let renamed_name = normalize_role_name(new_name);
        if renamed_name.is_empty() {
            return Err(RoleServiceError::InvalidName);
        }
        let name = normalize_role_name(name);
        let current = self
            .repo
            .find_role(&name)?
            .ok_or_else(|| RoleServiceError::NotFound(name.clone()))?;
        let renamed = RoleItem {
            name: renamed_name,
            display: current.display,
        };
        if renamed == current {
            return Ok(current);
        }
        if let Some(existing) = self.repo.find_role(&renamed.name)? {
            if existing.key() != current.key() {
                return Err(RoleServiceError::Duplicate(renamed.name));
            }
        }
        let changed = self
            .repo
            .rename_role(&current.name, &renamed.name)
            .map_err(|err| {
                if is_unique_violation(&err) {
                    RoleServiceError::Duplicate(renamed.name.clone())
                } else {
                    RoleServiceError::Repo(err)
                }
            })?;
        if !changed {
            return Err(RoleServiceError::NotFound(name));
        }

        info!("event=role_rename module=service status=ok");
        publish_item(&self.broadcaster, None, EventAction::Remove, &current, origin);
        publish_item(&self.broadcaster, None, EventAction::Add, &renamed, origin);
        Ok(renamed)
    }

    /// Tombstones a live role; the name becomes available again.
    pub fn remove_role(
        &self,
        name: &str,
        origin: Option<SubscriberId>,
    ) -> Result<(), RoleServiceError> {
        let name = normalize_role_name(name);
        let current = self
            .repo
            .find_role(&name)?
            .ok_or_else(|| RoleServiceError::NotFound(name.clone()))?;
        if !self.repo.remove_role(&current.name)? {
            return Err(RoleServiceError::NotFound(name));
        }

        info!("event=role_remove module=service status=ok");
        publish_item(&self.broadcaster, None, EventAction::Remove, &current, origin);
        Ok(())
    }
}

fn is_unique_violation(err: &RepoError) -> bool {
    matches!(
        err,
        RepoError::Db(DbError::Sqlite(rusqlite::Error::SqliteFailure(failure, _)))
            if failure.code == ErrorCode::ConstraintViolation
    )
}

#[cfg(test)]
mod tests {
    use super::{RoleService, RoleServiceError};
    use crate::config::BroadcastConfig;
    use crate::db::open_db_in_memory;
    use crate::repo::role_repo::SqliteRoleRepository;
    use crate::sync::broadcast::{EventBroadcaster, SubscriptionFilter};
    use crate::sync::event::EventAction;

    #[test]
    fn create_normalizes_and_rejects_case_duplicates() {
        let conn = open_db_in_memory().unwrap();
        let service = RoleService::new(
            SqliteRoleRepository::try_new(&conn).unwrap(),
            EventBroadcaster::new(BroadcastConfig::default()),
        );

        let created = service.create_role("  Shift   Lead ", None).unwrap();
        assert_eq!(created.name, "Shift Lead");
        assert!(matches!(
            service.create_role("shift lead", None),
            Err(RoleServiceError::Duplicate(_))
        ));
        assert!(matches!(
            service.create_role("   ", None),
            Err(RoleServiceError::InvalidName)
        ));
    }

    #[test]
    fn toggle_publishes_update_to_other_viewers() {
        let conn = open_db_in_memory().unwrap();
        let broadcaster = EventBroadcaster::new(BroadcastConfig::default());
        let me = broadcaster.subscribe(SubscriptionFilter::All).unwrap();
        let other = broadcaster.subscribe(SubscriptionFilter::All).unwrap();
        let service = RoleService::new(
            SqliteRoleRepository::try_new(&conn).unwrap(),
            broadcaster.clone(),
        );

        service.create_role("Lead", Some(me.id())).unwrap();
        let toggled = service.toggle_display("lead", Some(me.id())).unwrap();
        assert!(!toggled.display);

        assert!(me.try_recv().is_err());
        assert_eq!(other.try_recv().unwrap().action, EventAction::Add);
        let update = other.try_recv().unwrap();
        assert_eq!(update.action, EventAction::Update);
        assert_eq!(update.seq, 2);
    }

    #[test]
    fn rename_moves_the_key_and_keeps_display() {
        let conn = open_db_in_memory().unwrap();
        let broadcaster = EventBroadcaster::new(BroadcastConfig::default());
        let viewer = broadcaster.subscribe(SubscriptionFilter::All).unwrap();
        let service = RoleService::new(
            SqliteRoleRepository::try_new(&conn).unwrap(),
            broadcaster.clone(),
        );
        service.create_role("Lead", None).unwrap();
        service.create_role("Support", None).unwrap();
        service.toggle_display("Lead", None).unwrap();
        while viewer.try_recv().is_ok() {}

        let renamed = service.rename_role("lead", " Gate  Lead ", None).unwrap();
        assert_eq!(renamed.name, "Gate Lead");
        assert!(!renamed.display);

        let removed = viewer.try_recv().unwrap();
        assert_eq!(removed.action, EventAction::Remove);
        assert_eq!(removed.payload["name"], "Lead");
        let added = viewer.try_recv().unwrap();
        assert_eq!(added.action, EventAction::Add);
        assert_eq!(added.payload["name"], "Gate Lead");

        let names: Vec<String> = service
            .list_roles()
            .unwrap()
            .into_iter()
            .map(|role| role.name)
            .collect();
        assert_eq!(names, vec!["Gate Lead".to_string(), "Support".to_string()]);
    }

    #[test]
    fn rename_rejects_taken_blank_and_missing_names() {
        let conn = open_db_in_memory().unwrap();
        let service = RoleService::new(
            SqliteRoleRepository::try_new(&conn).unwrap(),
            EventBroadcaster::new(BroadcastConfig::default()),
        );
        service.create_role("Lead", None).unwrap();
        service.create_role("Support", None).unwrap();

        assert!(matches!(
            service.rename_role("Lead", "SUPPORT", None),
            Err(RoleServiceError::Duplicate(_))
        ));
        assert!(matches!(
            service.rename_role("Lead", "  ", None),
            Err(RoleServiceError::InvalidName)
        ));
        assert!(matches!(
            service.rename_role("Runner", "Courier", None),
            Err(RoleServiceError::NotFound(_))
        ));
        assert_eq!(service.rename_role("Lead", "LEAD", None).unwrap().name, "LEAD");
    }

    #[test]
    fn removed_name_can_be_created_again() {
        let conn = open_db_in_memory().unwrap();
        let service = RoleService::new(
            SqliteRoleRepository::try_new(&conn).unwrap(),
            EventBroadcaster::new(BroadcastConfig::default()),
        );

        service.create_role("Lead", None).unwrap();
        service.remove_role("LEAD", None).unwrap();
        assert!(service.list_roles().unwrap().is_empty());
        assert!(matches!(
            service.remove_role("Lead", None),
            Err(RoleServiceError::NotFound(_))
        ));
        service.create_role("Lead", None).unwrap();
        assert_eq!(service.list_roles().unwrap().len(), 1);
    }
}
