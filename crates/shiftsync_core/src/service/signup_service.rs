//! Volunteer signup use-case service.
//!
//! Each shift time owns one shared signup list; events are scoped to that
//! time's collection.

use std::error::Error;
use std::fmt::{Display, Formatter};

use log::info;

use crate::model::shared::ShiftVolunteerItem;
use crate::model::shift_type::{ShiftPositionId, ShiftTimeId};
use crate::repo::signup_repo::SignupRepository;
use crate::repo::RepoError;
use crate::service::publish_item;
use crate::sync::broadcast::EventBroadcaster;
use crate::sync::event::{EventAction, SubscriberId};

#[derive(Debug)]
pub enum SignupServiceError {
    InvalidVolunteer,
    /// Time or position is missing, tombstoned, or from another shift type.
    SlotUnavailable {
        shift_time_id: ShiftTimeId,
        shift_position_id: ShiftPositionId,
    },
    AlreadySignedUp(ShiftTimeId),
    NotSignedUp(ShiftTimeId),
    Repo(RepoError),
}

impl Display for SignupServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidVolunteer => write!(f, "volunteer id must not be blank"),
            Self::SlotUnavailable {
                shift_time_id,
                shift_position_id,
            } => write!(
                f,
                "position {shift_position_id} on time {shift_time_id} is not open"
            ),
            Self::AlreadySignedUp(id) => write!(f, "volunteer already signed up on time {id}"),
            Self::NotSignedUp(id) => write!(f, "volunteer is not signed up on time {id}"),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for SignupServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Repo(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for SignupServiceError {
    fn from(value: RepoError) -> Self {
        Self::Repo(value)
    }
}

pub struct SignupService<R: SignupRepository> {
    repo: R,
    broadcaster: EventBroadcaster,
}

impl<R: SignupRepository> SignupService<R> {
    pub fn new(repo: R, broadcaster: EventBroadcaster) -> Self {
        Self { repo, broadcaster }
    }

    pub fn list(
        &self,
        shift_time_id: ShiftTimeId,
    ) -> Result<Vec<ShiftVolunteerItem>, SignupServiceError> {
        Ok(self.repo.list_signups(shift_time_id)?)
    }

    pub fn add(
        &self,
        item: &ShiftVolunteerItem,
        origin: Option<SubscriberId>,
    ) -> Result<(), SignupServiceError> {
        if item.volunteer_id.trim().is_empty() {
            return Err(SignupServiceError::InvalidVolunteer);
        }
        if !self
            .repo
            .slot_is_open(item.shift_time_id, item.shift_position_id)?
        {
            return Err(SignupServiceError::SlotUnavailable {
                shift_time_id: item.shift_time_id,
                shift_position_id: item.shift_position_id,
            });
        }
        if !self.repo.add_signup(item)? {
            return Err(SignupServiceError::AlreadySignedUp(item.shift_time_id));
        }

        info!(
            "event=signup_add module=service status=ok shift_time_id={}",
            item.shift_time_id
        );
        publish_item(
            &self.broadcaster,
            Some(item.shift_time_id),
            EventAction::Add,
            item,
            origin,
        );
        Ok(())
    }

    pub fn remove(
        &self,
        shift_time_id: ShiftTimeId,
        volunteer_id: &str,
        origin: Option<SubscriberId>,
    ) -> Result<(), SignupServiceError> {
        if !self.repo.remove_signup(shift_time_id, volunteer_id)? {
            return Err(SignupServiceError::NotSignedUp(shift_time_id));
        }

        info!("event=signup_remove module=service status=ok shift_time_id={shift_time_id}");
        // Key-only payload; receivers match on (time, volunteer).
        let key = ShiftVolunteerItem {
            volunteer_id: volunteer_id.to_string(),
            shift_time_id,
            shift_position_id: 0,
            display_name: String::new(),
        };
        publish_item(
            &self.broadcaster,
            Some(shift_time_id),
            EventAction::Remove,
            &key,
            origin,
        );
        Ok(())
    }
}
