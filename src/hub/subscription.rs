//! Sliding-buffer subscriptions and broadcast group membership.
//!
//! Each subscriber owns a bounded ring (a single-receiver
//! `tokio::sync::broadcast` channel): when the subscriber falls behind,
//! the oldest queued records are discarded and delivery continues from
//! the newest retained record. Publishing never blocks, so one slow
//! subscriber cannot stall the demux task or starve the other
//! subscribers.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use tokio::sync::broadcast;

use crate::constants::MIN_SUBSCRIBER_CAPACITY;

/// Opaque handle identifying a subscriber within one broadcast group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(pub(crate) u64);

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Receiving side of a sliding-buffer subscription.
///
/// Dropping the subscription removes the subscriber from its group on
/// the next delivery attempt; [`FanoutHub`](crate::hub::FanoutHub) also
/// offers explicit unsubscribe by [`SubscriberId`].
pub struct Subscription<T> {
    id: SubscriberId,
    rx: broadcast::Receiver<T>,
}

impl<T> fmt::Debug for Subscription<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

impl<T: Clone> Subscription<T> {
    /// The subscriber's id within its group.
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Receive the next record, skipping over any the sliding buffer
    /// discarded while this subscriber lagged.
    ///
    /// Returns `None` once the group is closed (hub shutdown or explicit
    /// unsubscribe) and the buffer is drained.
    pub async fn recv(&mut self) -> Option<T> {
        loop {
            match self.rx.recv().await {
                Ok(value) => return Some(value),
                Err(broadcast::error::RecvError::Lagged(dropped)) => {
                    tracing::debug!(subscriber = %self.id, dropped, "subscriber lagged, oldest records dropped");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Non-blocking variant of [`recv`](Self::recv); `None` when no
    /// record is currently buffered or the group is closed.
    pub fn try_recv(&mut self) -> Option<T> {
        loop {
            match self.rx.try_recv() {
                Ok(value) => return Some(value),
                Err(broadcast::error::TryRecvError::Lagged(dropped)) => {
                    tracing::debug!(subscriber = %self.id, dropped, "subscriber lagged, oldest records dropped");
                }
                Err(_) => return None,
            }
        }
    }
}

/// One topic's set of subscribers.
///
/// Membership is a concurrent map so subscribes and unsubscribes never
/// contend with the demux task's publishes beyond individual entries.
pub(crate) struct BroadcastGroup<T> {
    senders: DashMap<u64, broadcast::Sender<T>>,
    next_id: AtomicU64,
}

impl<T: Clone> BroadcastGroup<T> {
    pub(crate) fn new() -> Self {
        Self {
            senders: DashMap::new(),
            next_id: AtomicU64::new(0),
        }
    }

    /// Add a subscriber with its own sliding ring of `capacity` records.
    pub(crate) fn subscribe(&self, capacity: usize) -> Subscription<T> {
        let capacity = capacity.max(MIN_SUBSCRIBER_CAPACITY);
        let (tx, rx) = broadcast::channel(capacity);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.senders.insert(id, tx);
        Subscription {
            id: SubscriberId(id),
            rx,
        }
    }

    /// Deliver `value` to every healthy subscriber without blocking.
    ///
    /// Subscribers whose receiving side has been dropped are pruned on
    /// the failed delivery.
    pub(crate) fn publish(&self, value: T) {
        let mut dead = Vec::new();
        for entry in self.senders.iter() {
            if entry.value().send(value.clone()).is_err() {
                dead.push(*entry.key());
            }
        }
        for id in dead {
            self.senders.remove(&id);
            tracing::debug!(subscriber = %SubscriberId(id), "removed dropped subscriber");
        }
    }

    /// Remove a subscriber; returns whether it was present.
    pub(crate) fn unsubscribe(&self, id: SubscriberId) -> bool {
        self.senders.remove(&id.0).is_some()
    }

    /// Sever every subscriber. Pending buffered records remain readable;
    /// subsequent receives return `None`.
    pub(crate) fn close(&self) {
        self.senders.clear();
    }

    pub(crate) fn len(&self) -> usize {
        self.senders.len()
    }
}
