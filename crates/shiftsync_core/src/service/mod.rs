//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate repository calls into use-case level APIs.
//! - Publish shared-collection events after successful writes.
//!
//! # Invariants
//! - Events are published only after the write they describe succeeded.
//! - A failed publish never fails the write; it is logged and dropped.

use log::{debug, error};

use crate::model::shared::SharedItem;
use crate::sync::broadcast::{BroadcastError, EventBroadcaster, PublishReceipt};
use crate::sync::event::{BroadcastEvent, EventAction, SubscriberId};

pub mod role_service;
pub mod shift_type_service;
pub mod signup_service;

/// Publishes `item` to its collection; returns the receipt when at least one
/// subscriber received it.
pub(crate) fn publish_item<T: SharedItem>(
    broadcaster: &EventBroadcaster,
    scope: Option<i64>,
    action: EventAction,
    item: &T,
    origin: Option<SubscriberId>,
) -> Option<PublishReceipt> {
    let event = match BroadcastEvent::for_item(scope, action, item) {
        Ok(event) => event,
        Err(err) => {
            error!(
                "event=publish module=service status=error kind={} error_code=encode_failed error={err}",
                T::KIND
            );
            return None;
        }
    };

    match broadcaster.publish(event, origin) {
        Ok(receipt) => Some(receipt),
        Err(BroadcastError::PublishDropped {
            collection, seq, ..
        }) => {
            debug!(
                "event=publish module=service status=dropped collection={collection} seq={seq} action={}",
                action.as_str()
            );
            None
        }
        Err(err) => {
            error!(
                "event=publish module=service status=error kind={} error_code=broadcast_failed error={err}",
                T::KIND
            );
            None
        }
    }
}
