//! In-memory broker and index adapters.
//!
//! These provide full-featured in-process implementations of the adapter
//! traits for testing and local development without external
//! dependencies. [`MemoryBroker`] implements both [`LogProducer`] and
//! [`LogConsumer`] over shared topic logs; [`MemoryIndex`] implements
//! [`IndexReader`] with insert helpers standing in for the out-of-band
//! indexer process.
//!
//! Cloning either adapter yields a handle onto the same shared state, so
//! a test can hold one clone as the producer seam and another as the
//! consumer seam.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::{RwLock, mpsc};
use uuid::Uuid;

use super::{IndexReader, LogConsumer, LogProducer};
use crate::error::{Error, Result};
use crate::types::{AppendAck, AppendRequest, Command, Event, LogRecord, Page, epoch_millis};

#[derive(Default)]
struct BrokerState {
    /// Per-topic logs in append order.
    logs: HashMap<String, Vec<LogRecord>>,
    /// Next offset per (topic, partition).
    next_offsets: HashMap<(String, i32), i64>,
    /// Registered drain sinks; records appended after registration are
    /// forwarded to every sink.
    sinks: Vec<mpsc::Sender<LogRecord>>,
}

/// In-memory broker: producer and consumer over shared topic logs.
///
/// Records are partitioned by key hash across `partitions` partitions
/// (one by default) and receive per-partition offsets and a broker
/// timestamp, like a real broker would assign them. Appends can be
/// failed on demand for fault-injection tests.
#[derive(Clone)]
pub struct MemoryBroker {
    state: Arc<RwLock<BrokerState>>,
    fail_appends: Arc<AtomicBool>,
    partitions: i32,
}

impl MemoryBroker {
    /// A broker with a single partition per topic.
    pub fn new() -> Self {
        Self::with_partitions(1)
    }

    /// A broker spreading keys across `partitions` partitions per topic.
    pub fn with_partitions(partitions: i32) -> Self {
        Self {
            state: Arc::new(RwLock::new(BrokerState::default())),
            fail_appends: Arc::new(AtomicBool::new(false)),
            partitions: partitions.max(1),
        }
    }

    /// Make every subsequent append fail with a broker rejection.
    pub fn fail_appends(&self, fail: bool) {
        self.fail_appends.store(fail, Ordering::SeqCst);
    }

    /// Number of records appended to `topic` so far.
    pub async fn topic_len(&self, topic: &str) -> usize {
        let state = self.state.read().await;
        state.logs.get(topic).map(Vec::len).unwrap_or(0)
    }

    fn partition_for(&self, key: &Uuid) -> i32 {
        let bytes = key.as_bytes();
        let mut hash = 0u64;
        for b in bytes {
            hash = hash.wrapping_mul(31).wrapping_add(*b as u64);
        }
        (hash % self.partitions as u64) as i32
    }
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LogProducer for MemoryBroker {
    async fn append(&self, record: AppendRequest) -> Result<AppendAck> {
        if self.fail_appends.load(Ordering::SeqCst) {
            return Err(Error::Append("broker rejected append".to_string()));
        }

        let partition = self.partition_for(&record.key);

        // Offset assignment and sink delivery happen under one write
        // guard so consumers observe broker order per partition.
        let mut state = self.state.write().await;
        let offset_slot = state
            .next_offsets
            .entry((record.topic.clone(), partition))
            .or_insert(0);
        let offset = *offset_slot;
        *offset_slot += 1;

        let stored = LogRecord {
            topic: record.topic.clone(),
            partition,
            offset,
            timestamp: epoch_millis(),
            key: record.key,
            value: record.value,
        };

        state
            .logs
            .entry(record.topic.clone())
            .or_default()
            .push(stored.clone());

        state.sinks.retain(|sink| !sink.is_closed());
        for sink in &state.sinks {
            if sink.send(stored.clone()).await.is_err() {
                tracing::debug!(topic = %stored.topic, "drain sink closed during delivery");
            }
        }

        Ok(AppendAck {
            topic: stored.topic,
            partition,
            offset,
            timestamp: stored.timestamp,
        })
    }
}

#[async_trait]
impl LogConsumer for MemoryBroker {
    async fn drain(&self, sink: mpsc::Sender<LogRecord>) -> Result<()> {
        let mut state = self.state.write().await;
        state.sinks.push(sink);
        Ok(())
    }
}

#[derive(Default)]
struct IndexState {
    commands: Vec<Command>,
    events: Vec<Event>,
}

/// In-memory read-side index.
///
/// Rows are returned in insertion order; insert in log order and the
/// listing contract (ascending by offset) holds. The `insert_*` helpers
/// play the role of the external indexer process.
#[derive(Clone, Default)]
pub struct MemoryIndex {
    state: Arc<RwLock<IndexState>>,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index a command row, as the out-of-band indexer would.
    pub async fn insert_command(&self, command: Command) {
        self.state.write().await.commands.push(command);
    }

    /// Index an event row, as the out-of-band indexer would.
    pub async fn insert_event(&self, event: Event) {
        self.state.write().await.events.push(event);
    }
}

fn paginate<T: Clone>(rows: &[T], offset: usize, limit: usize) -> Page<T> {
    let total = rows.len();
    let start = offset.min(total);
    let end = if limit == 0 {
        total
    } else {
        (start + limit).min(total)
    };
    Page {
        items: rows[start..end].to_vec(),
        offset,
        limit,
        total,
    }
}

#[async_trait]
impl IndexReader for MemoryIndex {
    async fn list_commands(&self, offset: usize, limit: usize) -> Result<Page<Command>> {
        let state = self.state.read().await;
        Ok(paginate(&state.commands, offset, limit))
    }

    async fn get_command(&self, id: Uuid) -> Result<Option<Command>> {
        let state = self.state.read().await;
        Ok(state.commands.iter().find(|c| c.id == id).cloned())
    }

    async fn list_events(&self, offset: usize, limit: usize) -> Result<Page<Event>> {
        let state = self.state.read().await;
        Ok(paginate(&state.events, offset, limit))
    }

    async fn get_event(&self, id: Uuid) -> Result<Option<Event>> {
        let state = self.state.read().await;
        Ok(state.events.iter().find(|e| e.id == id).cloned())
    }
}
