//! In-process fan-out of collection mutation events.
//!
//! # Responsibility
//! - Stamp each published event with the next per-collection sequence.
//! - Deliver to every subscriber whose filter matches, except the origin.
//! - Drop subscribers that disconnect or fall behind instead of blocking.
//!
//! # Invariants
//! - Publishing never blocks on a slow subscriber.
//! - A subscriber receives one collection's events in sequence order.
//! - A dropped subscriber's channel is closed after its queued events.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crossbeam::channel::{Receiver, RecvError, RecvTimeoutError, Sender, TryRecvError, TrySendError};
use log::{debug, warn};

use crate::config::BroadcastConfig;
use crate::sync::event::{BroadcastEvent, CollectionId, SubscriberId};

/// Why a subscriber stopped receiving events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// Its queue was full when an event was published.
    SubscriberLagged,
    /// It was removed through [`EventBroadcaster::unsubscribe`].
    Unsubscribed,
}

/// Why a published event reached nobody.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UndeliveredReason {
    /// No live subscriber other than the origin watches the collection.
    NoSubscribers,
    /// Every matching subscriber was dropped during this publish.
    AllSubscribersDropped,
}

#[derive(Debug)]
pub enum BroadcastError {
    SubscriberLimitReached { max_subscribers: usize },
    /// Event was sequenced but delivered to zero subscribers.
    PublishDropped {
        collection: CollectionId,
        seq: u64,
        reason: UndeliveredReason,
    },
    LockPoisoned,
}

impl Display for BroadcastError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SubscriberLimitReached { max_subscribers } => {
                write!(f, "subscriber limit reached: {max_subscribers}")
            }
            Self::PublishDropped {
                collection,
                seq,
                reason,
            } => write!(
                f,
                "event {collection}#{seq} was not delivered: {}",
                match reason {
                    UndeliveredReason::NoSubscribers => "no subscribers",
                    UndeliveredReason::AllSubscribersDropped => "all subscribers dropped",
                }
            ),
            Self::LockPoisoned => write!(f, "broadcaster lock poisoned"),
        }
    }
}

impl Error for BroadcastError {}

/// Collections a subscriber wants to hear about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionFilter {
    All,
    Collections(BTreeSet<CollectionId>),
}

impl SubscriptionFilter {
    pub fn only(collection: CollectionId) -> Self {
        Self::Collections(BTreeSet::from([collection]))
    }

    pub fn matches(&self, collection: &CollectionId) -> bool {
        match self {
            Self::All => true,
            Self::Collections(set) => set.contains(collection),
        }
    }
}

/// Delivery report of one successful publish.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublishReceipt {
    pub seq: u64,
    pub delivered: usize,
    pub dropped: usize,
}

pub struct Subscription {
    id: SubscriberId,
    receiver: Receiver<BroadcastEvent>,
    drop_reason: Arc<Mutex<Option<DropReason>>>,
}

impl Subscription {
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    pub fn recv(&self) -> Result<BroadcastEvent, RecvError> {
        self.receiver.recv()
    }

    pub fn try_recv(&self) -> Result<BroadcastEvent, TryRecvError> {
        self.receiver.try_recv()
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Result<BroadcastEvent, RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }

    /// Set once the broadcaster stops delivering to this subscription.
    pub fn drop_reason(&self) -> Option<DropReason> {
        self.drop_reason.lock().ok().and_then(|guard| *guard)
    }
}

#[derive(Clone)]
pub struct EventBroadcaster {
    inner: Arc<Mutex<BroadcasterState>>,
}

impl EventBroadcaster {
    pub fn new(config: BroadcastConfig) -> Self {
        Self {
            inner: Arc::new(Mutex::new(BroadcasterState::new(config))),
        }
    }

    pub fn subscribe(&self, filter: SubscriptionFilter) -> Result<Subscription, BroadcastError> {
        let mut state = self.lock_state()?;
        if state.subscribers.len() >= state.config.max_subscribers {
            return Err(BroadcastError::SubscriberLimitReached {
                max_subscribers: state.config.max_subscribers,
            });
        }

        let (sender, receiver) = crossbeam::channel::bounded(state.config.queue_depth);
        let drop_reason = Arc::new(Mutex::new(None));
        let id = state.next_subscriber_id;
        state.next_subscriber_id = state.next_subscriber_id.saturating_add(1);
        state.subscribers.insert(
            id,
            SubscriberState {
                sender,
                filter,
                drop_reason: Arc::clone(&drop_reason),
            },
        );
        debug!("event=subscribe module=broadcast status=ok subscriber_id={id}");

        Ok(Subscription {
            id,
            receiver,
            drop_reason,
        })
    }

    /// Removes a subscriber; returns whether it was still registered.
    pub fn unsubscribe(&self, id: SubscriberId) -> Result<bool, BroadcastError> {
        let mut state = self.lock_state()?;
        match state.subscribers.remove(&id) {
            Some(subscriber) => {
                subscriber.set_drop_reason(DropReason::Unsubscribed);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Sequences `event` in its collection and fans it out to every matching
    /// subscriber except `origin`.
    ///
    /// The sequence number is consumed even when nobody receives the event.
    pub fn publish(
        &self,
        mut event: BroadcastEvent,
        origin: Option<SubscriberId>,
    ) -> Result<PublishReceipt, BroadcastError> {
        let mut state = self.lock_state()?;
        let seq = state.next_seq(event.collection);
        event.seq = seq;
        event.origin = origin;

        let mut delivered = 0usize;
        let mut dropped = Vec::new();
        for (id, subscriber) in &state.subscribers {
            if Some(*id) == origin || !subscriber.filter.matches(&event.collection) {
                continue;
            }
            match subscriber.sender.try_send(event.clone()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    subscriber.set_drop_reason(DropReason::SubscriberLagged);
                    dropped.push(*id);
                }
                Err(TrySendError::Disconnected(_)) => dropped.push(*id),
            }
        }
        for id in &dropped {
            state.subscribers.remove(id);
            warn!(
                "event=subscriber_dropped module=broadcast subscriber_id={id} collection={}",
                event.collection
            );
        }

        debug!(
            "event=publish module=broadcast collection={} seq={seq} action={} delivered={delivered} dropped={}",
            event.collection,
            event.action.as_str(),
            dropped.len()
        );

        if delivered == 0 {
            let reason = if dropped.is_empty() {
                UndeliveredReason::NoSubscribers
            } else {
                UndeliveredReason::AllSubscribersDropped
            };
            return Err(BroadcastError::PublishDropped {
                collection: event.collection,
                seq,
                reason,
            });
        }

        Ok(PublishReceipt {
            seq,
            delivered,
            dropped: dropped.len(),
        })
    }

    /// Last sequence issued for `collection`, `0` when none.
    ///
    /// Read this before loading a snapshot; events with a higher sequence
    /// then apply on top of it.
    pub fn current_seq(&self, collection: CollectionId) -> Result<u64, BroadcastError> {
        let state = self.lock_state()?;
        Ok(state.sequences.get(&collection).copied().unwrap_or(0))
    }

    pub fn subscriber_count(&self) -> Result<usize, BroadcastError> {
        let state = self.lock_state()?;
        Ok(state.subscribers.len())
    }

    fn lock_state(&self) -> Result<MutexGuard<'_, BroadcasterState>, BroadcastError> {
        self.inner.lock().map_err(|_| BroadcastError::LockPoisoned)
    }
}

struct BroadcasterState {
    config: BroadcastConfig,
    next_subscriber_id: SubscriberId,
    subscribers: BTreeMap<SubscriberId, SubscriberState>,
    sequences: HashMap<CollectionId, u64>,
}

impl BroadcasterState {
    fn new(config: BroadcastConfig) -> Self {
        Self {
            config,
            next_subscriber_id: 1,
            subscribers: BTreeMap::new(),
            sequences: HashMap::new(),
        }
    }

    fn next_seq(&mut self, collection: CollectionId) -> u64 {
        let seq = self.sequences.entry(collection).or_insert(0);
        *seq = seq.saturating_add(1);
        *seq
    }
}

struct SubscriberState {
    sender: Sender<BroadcastEvent>,
    filter: SubscriptionFilter,
    drop_reason: Arc<Mutex<Option<DropReason>>>,
}

impl SubscriberState {
    fn set_drop_reason(&self, reason: DropReason) {
        if let Ok(mut guard) = self.drop_reason.lock() {
            *guard = Some(reason);
        }
    }
}
