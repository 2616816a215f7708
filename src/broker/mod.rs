//! Adapter contracts for the log broker and the read-side index.
//!
//! These traits abstract the external collaborators, allowing for:
//! - Different backend implementations (Kafka-style broker, in-memory for testing)
//! - Easier testing with the in-memory adapters
//! - Clear separation of concerns
//!
//! # Available Implementations
//!
//! - [`MemoryBroker`]: In-memory producer/consumer pair for tests and
//!   local development
//! - [`MemoryIndex`]: In-memory read-side index
//!
//! Production adapters wrap real broker and database clients; the core
//! only ever sees these traits. Producer and consumer clients are
//! shared, so implementations must be thread-safe.
//!
//! # Trait Hierarchy
//!
//! - [`LogProducer`]: appends keyed records, yields append acks
//! - [`LogConsumer`]: delivers subscribed topics onto a sink, in broker
//!   order per partition, at-least-once
//! - [`IndexReader`]: paginated listing and point lookup of commands and
//!   events, populated out-of-band by a separate indexer process

mod memory;

pub use memory::{MemoryBroker, MemoryIndex};

use async_trait::async_trait;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::error::Result;
use crate::types::{AppendAck, AppendRequest, Command, Event, LogRecord, Page};

/// Appends keyed records to the broker.
#[async_trait]
pub trait LogProducer: Send + Sync {
    /// Append a record and await the broker acknowledgement.
    ///
    /// Resolves exactly once: either the ack or an error. Failure modes
    /// an adapter must propagate: transport error, broker rejection,
    /// local queue overflow. An ack channel that closes before resolving
    /// maps to [`Error::AckChannelClosed`](crate::error::Error).
    async fn append(&self, record: AppendRequest) -> Result<AppendAck>;
}

/// Delivers records from a fixed set of subscribed topics.
#[async_trait]
pub trait LogConsumer: Send + Sync {
    /// Start delivering records onto `sink`, from time of call onward.
    ///
    /// Delivery is at-least-once and preserves broker order per
    /// partition. Duplicates are tolerated downstream: stream
    /// subscribers are idempotent consumers, and correlation waiters are
    /// satisfied by the first matching record only.
    ///
    /// Returns once delivery is wired up; records flow in the
    /// background until `sink` is closed.
    async fn drain(&self, sink: mpsc::Sender<LogRecord>) -> Result<()>;
}

/// Random-access read side over the commands and events tables.
///
/// The index is populated out-of-band by a separate indexer process; a
/// freshly appended record becomes visible here only after that process
/// catches up.
#[async_trait]
pub trait IndexReader: Send + Sync {
    /// List commands ascending by log offset. `limit == 0` means all
    /// rows from `offset`.
    async fn list_commands(&self, offset: usize, limit: usize) -> Result<Page<Command>>;

    /// Point lookup; `None` when the row does not exist.
    async fn get_command(&self, id: Uuid) -> Result<Option<Command>>;

    /// List events ascending by log offset. `limit == 0` means all rows
    /// from `offset`.
    async fn list_events(&self, offset: usize, limit: usize) -> Result<Page<Event>>;

    /// Point lookup; `None` when the row does not exist.
    async fn get_event(&self, id: Uuid) -> Result<Option<Event>>;
}
