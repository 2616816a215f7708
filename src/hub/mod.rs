//! The fan-out hub: demultiplexing, broadcast and event correlation.
//!
//! A single demux task owns the consumer delivery channel. Each incoming
//! record is classified by topic:
//!
//! - commands-topic records are copied to the command broadcast group;
//! - events-topic records first complete any correlation waiter
//!   registered under the record's parent reference, then are copied to
//!   the event broadcast group. Both happen in the same demux step, so a
//!   matching waiter is never completed later than the broadcast
//!   delivery of the same record.
//!
//! Subscribers receive through sliding buffers and can join and leave
//! dynamically; waiters are one-shot and keyed by parent id. Shutdown is
//! terminal: every broadcast sink closes, every pending waiter resolves
//! as timed out, and further subscribes or registrations are rejected.
//!
//! # Failure semantics
//!
//! Closure of the consumer channel (the upstream adapter died) drives
//! the same path as [`FanoutHub::shutdown`]. Delivery loss on a slow
//! subscriber is local to that subscriber and never surfaces.

mod subscription;

pub use subscription::{SubscriberId, Subscription};

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::types::{Event, LogRecord, RecordValue};

use self::subscription::BroadcastGroup;

/// Outcome of a correlation wait.
#[derive(Debug)]
pub enum WaitOutcome {
    /// The first event whose parent matched the registration.
    Completed(Event),
    /// The deadline expired, or the hub shut down mid-wait.
    TimedOut,
}

impl WaitOutcome {
    /// True when a completion event arrived in time.
    pub fn is_completed(&self) -> bool {
        matches!(self, WaitOutcome::Completed(_))
    }
}

/// A registered one-shot correlation waiter.
///
/// Created by [`FanoutHub::register_waiter`] *before* the command is
/// appended, so a completion event observed while the append is still in
/// flight is not lost. Dropping the waiter (caller cancellation) or
/// finishing [`wait`](Waiter::wait) unregisters it; no reference remains
/// in the hub afterwards.
pub struct Waiter {
    hub: FanoutHub,
    parent: Uuid,
    rx: oneshot::Receiver<Event>,
}

impl Waiter {
    /// The parent id this waiter is correlated on.
    pub fn parent(&self) -> Uuid {
        self.parent
    }

    /// Wait until the correlated event arrives or `deadline` expires.
    ///
    /// The completion channel is polled before the timer, so a zero
    /// deadline still observes an event that was delivered between
    /// registration and this call; otherwise it times out
    /// deterministically. Hub shutdown mid-wait resolves as
    /// [`WaitOutcome::TimedOut`].
    pub async fn wait(mut self, deadline: Duration) -> WaitOutcome {
        match tokio::time::timeout(deadline, &mut self.rx).await {
            Ok(Ok(event)) => WaitOutcome::Completed(event),
            // The sending half was dropped without an event: shutdown.
            Ok(Err(_)) => WaitOutcome::TimedOut,
            Err(_) => WaitOutcome::TimedOut,
        }
    }
}

impl Drop for Waiter {
    fn drop(&mut self) {
        // No-op when the demux task already completed and removed us.
        self.hub.inner.waiters.remove(&self.parent);
    }
}

struct HubInner {
    commands_topic: String,
    events_topic: String,
    commands: BroadcastGroup<LogRecord>,
    events: BroadcastGroup<LogRecord>,
    /// Pending correlation waiters keyed by parent id.
    waiters: DashMap<Uuid, oneshot::Sender<Event>>,
    closed: AtomicBool,
    started: AtomicBool,
    shutdown_tx: broadcast::Sender<()>,
}

/// The concurrency nucleus: consumes two ordered logs and fans records
/// out to broadcast subscribers and correlation waiters.
///
/// Cheap to clone; clones share the same hub state.
#[derive(Clone)]
pub struct FanoutHub {
    inner: Arc<HubInner>,
}

impl FanoutHub {
    /// Create a hub routing between the two given topics.
    pub fn new(commands_topic: impl Into<String>, events_topic: impl Into<String>) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            inner: Arc::new(HubInner {
                commands_topic: commands_topic.into(),
                events_topic: events_topic.into(),
                commands: BroadcastGroup::new(),
                events: BroadcastGroup::new(),
                waiters: DashMap::new(),
                closed: AtomicBool::new(false),
                started: AtomicBool::new(false),
                shutdown_tx,
            }),
        }
    }

    /// Spawn the demux task over the consumer delivery channel.
    ///
    /// Call once; a second call is a no-op returning a finished handle.
    /// The task runs until `sink` closes (upstream consumer death) or
    /// [`shutdown`](Self::shutdown) is invoked; both leave the hub
    /// terminal.
    pub fn start(&self, mut sink: mpsc::Receiver<LogRecord>) -> JoinHandle<()> {
        if self.inner.started.swap(true, Ordering::SeqCst) {
            tracing::warn!("fan-out hub already started, ignoring start");
            return tokio::spawn(async {});
        }

        let hub = self.clone();
        let mut shutdown_rx = self.inner.shutdown_tx.subscribe();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    maybe = sink.recv() => match maybe {
                        Some(record) => hub.route(record),
                        None => {
                            tracing::warn!("consumer delivery channel closed, shutting down fan-out hub");
                            break;
                        }
                    },
                    _ = shutdown_rx.recv() => break,
                }
            }
            hub.shutdown();
        })
    }

    /// One demux step.
    fn route(&self, record: LogRecord) {
        if record.topic == self.inner.commands_topic {
            self.inner.commands.publish(record);
        } else if record.topic == self.inner.events_topic {
            // Waiter completion first: the correlation guarantee is
            // "no later than the broadcast delivery of the same record".
            self.complete_waiter(&record);
            self.inner.events.publish(record);
        } else {
            tracing::trace!(topic = %record.topic, "ignoring record from unrouted topic");
        }
    }

    fn complete_waiter(&self, record: &LogRecord) {
        let value = match RecordValue::decode(&record.value) {
            Ok(value) => value,
            Err(err) => {
                tracing::warn!(%err, topic = %record.topic, offset = record.offset,
                    "undecodable event record, skipping correlation");
                return;
            }
        };
        let Some(parent) = value.parent else {
            return;
        };
        // First match wins; duplicates find no entry and flow through
        // broadcast as ordinary events.
        if let Some((_, tx)) = self.inner.waiters.remove(&parent) {
            let event = Event {
                id: record.key,
                parent,
                action: value.action,
                data: value.data,
                timestamp: record.timestamp,
                topic: record.topic.clone(),
                partition: record.partition,
                offset: record.offset,
            };
            if tx.send(event).is_err() {
                tracing::debug!(%parent, "waiter cancelled before completion delivery");
            }
        }
    }

    /// Subscribe to command records from this call onward.
    pub fn subscribe_commands(&self, capacity: usize) -> Result<Subscription<LogRecord>> {
        self.ensure_open()?;
        Ok(self.inner.commands.subscribe(capacity))
    }

    /// Subscribe to event records from this call onward.
    pub fn subscribe_events(&self, capacity: usize) -> Result<Subscription<LogRecord>> {
        self.ensure_open()?;
        Ok(self.inner.events.subscribe(capacity))
    }

    /// Remove a command subscriber; returns whether it was present.
    pub fn unsubscribe_commands(&self, id: SubscriberId) -> bool {
        self.inner.commands.unsubscribe(id)
    }

    /// Remove an event subscriber; returns whether it was present.
    pub fn unsubscribe_events(&self, id: SubscriberId) -> bool {
        self.inner.events.unsubscribe(id)
    }

    /// Register a one-shot waiter for the first event whose parent is
    /// `parent`, observed after this call.
    ///
    /// Registration happens before the corresponding command is
    /// appended; see [`Waiter`].
    pub fn register_waiter(&self, parent: Uuid) -> Result<Waiter> {
        self.ensure_open()?;
        let (tx, rx) = oneshot::channel();
        self.inner.waiters.insert(parent, tx);
        // Shutdown may have drained the index between the check and the
        // insert; re-check so no waiter outlives a terminal hub.
        if self.inner.closed.load(Ordering::SeqCst) {
            self.inner.waiters.remove(&parent);
            return Err(Error::HubClosed);
        }
        Ok(Waiter {
            hub: self.clone(),
            parent,
            rx,
        })
    }

    /// Register and wait in one step: the first event with
    /// `parent == parent` observed after registration, or
    /// [`WaitOutcome::TimedOut`] when `deadline` expires first.
    pub async fn await_event_by_parent(
        &self,
        parent: Uuid,
        deadline: Duration,
    ) -> Result<WaitOutcome> {
        Ok(self.register_waiter(parent)?.wait(deadline).await)
    }

    /// Terminal shutdown: sever all subscribers, resolve all waiters as
    /// timed out, reject future subscribes and registrations.
    ///
    /// Idempotent.
    pub fn shutdown(&self) {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let _ = self.inner.shutdown_tx.send(());
        self.inner.commands.close();
        self.inner.events.close();
        // Dropping the senders resolves every pending wait as timed out.
        let pending = self.inner.waiters.len();
        self.inner.waiters.clear();
        tracing::info!(pending_waiters = pending, "fan-out hub shut down");
    }

    /// Whether the hub has reached its terminal state.
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Number of pending correlation waiters.
    pub fn waiter_count(&self) -> usize {
        self.inner.waiters.len()
    }

    /// Number of live command subscribers.
    pub fn command_subscriber_count(&self) -> usize {
        self.inner.commands.len()
    }

    /// Number of live event subscribers.
    pub fn event_subscriber_count(&self) -> usize {
        self.inner.events.len()
    }

    fn ensure_open(&self) -> Result<()> {
        if self.inner.closed.load(Ordering::SeqCst) {
            return Err(Error::HubClosed);
        }
        Ok(())
    }
}
