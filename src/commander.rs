//! The commander: public command/event API over the hub and adapters.
//!
//! [`Commander`] composes a [`LogProducer`], a [`LogConsumer`], an
//! [`IndexReader`] and a [`FanoutHub`] into the capability traits
//! [`CommandService`] and [`EventService`]. Command submission is either
//! fire-and-forget (return on append ack) or synchronous: the call
//! registers a correlation waiter, appends, and blocks until the
//! completion event arrives or the configured timeout expires.
//!
//! # Synchronous create sequence
//!
//! ```text
//! new → registered → appended → {completed | timed out} → returned
//!           │                     ▲        ▲
//!           └──── append-fail ────┴────────┘   (always unregistered)
//! ```
//!
//! The waiter is registered **before** the append: commands and events
//! travel independent topics consumed concurrently, so a completion
//! event can be observed before the append call returns. Registering
//! after the append would risk losing the notification.
//!
//! A timed-out wait is a business outcome, not an error: the command was
//! durably appended, and it is returned with its `error` field set.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::Instrument;
use uuid::Uuid;

use crate::broker::{IndexReader, LogConsumer, LogProducer};
use crate::config::CommanderConfig;
use crate::constants::SYNC_TIMEOUT_ERROR;
use crate::error::{Error, Result, ValidationErrors};
use crate::hub::{FanoutHub, SubscriberId, Subscription, WaitOutcome};
use crate::telemetry;
use crate::types::{
    AppendAck, AppendRequest, Command, CommandParams, Event, LogRecord, Page, RecordValue,
    new_entity_id,
};

/// Command-side capability: submission, listing, streaming.
#[async_trait]
pub trait CommandService: Send + Sync {
    /// Fire-and-forget submission: returns once the broker acknowledges
    /// the append.
    async fn create_command(&self, params: CommandParams) -> Result<Command>;

    /// Synchronous submission: additionally waits for a completion event
    /// correlated to the command, or the configured timeout.
    async fn create_command_sync(&self, params: CommandParams) -> Result<Command>;

    /// Paginated listing from the read-side index.
    async fn list_commands(&self, offset: usize, limit: usize) -> Result<Page<Command>>;

    /// Point lookup from the read-side index.
    async fn get_command(&self, id: Uuid) -> Result<Option<Command>>;

    /// Live stream of commands from this call onward.
    fn stream_commands(&self) -> Result<CommandStream>;
}

/// Event-side capability: listing and streaming.
#[async_trait]
pub trait EventService: Send + Sync {
    /// Paginated listing from the read-side index.
    async fn list_events(&self, offset: usize, limit: usize) -> Result<Page<Event>>;

    /// Point lookup from the read-side index.
    async fn get_event(&self, id: Uuid) -> Result<Option<Event>>;

    /// Live stream of events from this call onward.
    fn stream_events(&self) -> Result<EventStream>;
}

/// Pre-append validation hook.
///
/// The deploying adapter supplies concrete rules; the default
/// [`AcceptAll`] passes everything through.
pub trait CommandValidator: Send + Sync {
    fn validate(&self, params: &CommandParams) -> std::result::Result<(), ValidationErrors>;
}

/// The default validator: accepts all params.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

impl CommandValidator for AcceptAll {
    fn validate(&self, _params: &CommandParams) -> std::result::Result<(), ValidationErrors> {
        Ok(())
    }
}

/// Live command stream: hub subscription plus the record-to-command
/// projection.
pub struct CommandStream {
    inner: Subscription<LogRecord>,
}

impl CommandStream {
    /// Subscriber id, usable with
    /// [`FanoutHub::unsubscribe_commands`].
    pub fn id(&self) -> SubscriberId {
        self.inner.id()
    }

    /// Next command, or `None` once the hub has shut down.
    ///
    /// Undecodable records are skipped with a warning.
    pub async fn recv(&mut self) -> Option<Command> {
        loop {
            let record = self.inner.recv().await?;
            match Command::from_record(&record) {
                Ok(command) => return Some(command),
                Err(err) => {
                    tracing::warn!(%err, offset = record.offset, "skipping undecodable command record");
                }
            }
        }
    }
}

/// Live event stream: hub subscription plus the record-to-event
/// projection.
pub struct EventStream {
    inner: Subscription<LogRecord>,
}

impl EventStream {
    /// Subscriber id, usable with [`FanoutHub::unsubscribe_events`].
    pub fn id(&self) -> SubscriberId {
        self.inner.id()
    }

    /// Next event, or `None` once the hub has shut down.
    ///
    /// Records without a decodable parent are skipped with a warning.
    pub async fn recv(&mut self) -> Option<Event> {
        loop {
            let record = self.inner.recv().await?;
            match Event::from_record(&record) {
                Ok(event) => return Some(event),
                Err(err) => {
                    tracing::warn!(%err, offset = record.offset, "skipping undecodable event record");
                }
            }
        }
    }
}

/// The public API core: composes producer, consumer, index and hub.
pub struct Commander {
    producer: Arc<dyn LogProducer>,
    consumer: Arc<dyn LogConsumer>,
    index: Arc<dyn IndexReader>,
    validator: Arc<dyn CommandValidator>,
    hub: FanoutHub,
    config: CommanderConfig,
    started: AtomicBool,
}

impl Commander {
    /// Build a commander over the given adapters.
    ///
    /// Validates `config`; the hub is created alongside but idle until
    /// [`start`](Self::start).
    pub fn new(
        producer: Arc<dyn LogProducer>,
        consumer: Arc<dyn LogConsumer>,
        index: Arc<dyn IndexReader>,
        config: CommanderConfig,
    ) -> Result<Self> {
        config.validate()?;
        let hub = FanoutHub::new(config.commands_topic.clone(), config.events_topic.clone());
        Ok(Self {
            producer,
            consumer,
            index,
            validator: Arc::new(AcceptAll),
            hub,
            config,
            started: AtomicBool::new(false),
        })
    }

    /// Replace the accept-all validator.
    pub fn with_validator(mut self, validator: Arc<dyn CommandValidator>) -> Self {
        self.validator = validator;
        self
    }

    /// The underlying fan-out hub.
    pub fn hub(&self) -> &FanoutHub {
        &self.hub
    }

    pub fn config(&self) -> &CommanderConfig {
        &self.config
    }

    /// Wire the consumer into the hub and start the demux task.
    ///
    /// Idempotent: repeated calls, including against a stopped
    /// instance, are no-ops.
    pub async fn start(&self) -> Result<()> {
        if self.started.swap(true, Ordering::SeqCst) {
            tracing::debug!("commander already started");
            return Ok(());
        }
        let (tx, rx) = mpsc::channel(self.config.demux_buffer);
        self.consumer.drain(tx).await?;
        self.hub.start(rx);
        tracing::info!(
            commands_topic = %self.config.commands_topic,
            events_topic = %self.config.events_topic,
            "commander started"
        );
        Ok(())
    }

    /// Shut the hub down: streams close, pending synchronous creates
    /// resolve with timeout semantics.
    ///
    /// Idempotent.
    pub fn stop(&self) {
        self.hub.shutdown();
    }

    fn check_params(&self, params: &CommandParams) -> Result<()> {
        self.validator.validate(params).map_err(Error::Validation)
    }

    async fn append_command(&self, id: Uuid, params: &CommandParams) -> Result<AppendAck> {
        let value = RecordValue::command(params.action.clone(), params.data.clone()).encode()?;
        self.producer
            .append(AppendRequest {
                topic: self.config.commands_topic.clone(),
                key: id,
                value,
            })
            .await
    }

    fn command_from_ack(id: Uuid, params: CommandParams, ack: AppendAck) -> Command {
        Command {
            id,
            action: params.action,
            data: params.data,
            timestamp: ack.timestamp,
            topic: ack.topic,
            partition: ack.partition,
            offset: ack.offset,
            children: None,
            error: None,
        }
    }
}

#[async_trait]
impl CommandService for Commander {
    async fn create_command(&self, params: CommandParams) -> Result<Command> {
        self.check_params(&params)?;
        let id = new_entity_id();
        let span = telemetry::command_span(id, &params.action);
        async {
            let ack = self.append_command(id, &params).await?;
            tracing::debug!(offset = ack.offset, "command appended");
            Ok(Self::command_from_ack(id, params, ack))
        }
        .instrument(span)
        .await
    }

    async fn create_command_sync(&self, params: CommandParams) -> Result<Command> {
        self.check_params(&params)?;
        let id = new_entity_id();
        let span = telemetry::command_span(id, &params.action);
        async {
            // Register before append; the waiter unregisters itself on
            // every exit path, including cancellation of this future.
            let waiter = self.hub.register_waiter(id)?;
            let ack = match self.append_command(id, &params).await {
                Ok(ack) => ack,
                Err(err) => {
                    drop(waiter);
                    return Err(err);
                }
            };

            let mut command = Self::command_from_ack(id, params, ack);
            let timeout_ms = self.config.sync_timeout.as_millis() as u64;
            let wait = waiter
                .wait(self.config.sync_timeout)
                .instrument(telemetry::completion_wait_span(id, timeout_ms));
            match wait.await {
                WaitOutcome::Completed(event) => {
                    tracing::debug!(event = %event.id, "synchronous command completed");
                    command.children = Some(vec![event.id]);
                }
                WaitOutcome::TimedOut => {
                    tracing::debug!(timeout_ms, "synchronous command timed out waiting for completion");
                    command.error = Some(SYNC_TIMEOUT_ERROR.to_string());
                }
            }
            Ok(command)
        }
        .instrument(span)
        .await
    }

    async fn list_commands(&self, offset: usize, limit: usize) -> Result<Page<Command>> {
        self.index.list_commands(offset, limit).await
    }

    async fn get_command(&self, id: Uuid) -> Result<Option<Command>> {
        self.index.get_command(id).await
    }

    fn stream_commands(&self) -> Result<CommandStream> {
        self.stream_commands_with_capacity(self.config.stream_capacity)
    }
}

impl Commander {
    /// [`stream_commands`](CommandService::stream_commands) with an
    /// explicit sliding-buffer capacity.
    pub fn stream_commands_with_capacity(&self, capacity: usize) -> Result<CommandStream> {
        Ok(CommandStream {
            inner: self.hub.subscribe_commands(capacity)?,
        })
    }

    /// [`stream_events`](EventService::stream_events) with an explicit
    /// sliding-buffer capacity.
    pub fn stream_events_with_capacity(&self, capacity: usize) -> Result<EventStream> {
        Ok(EventStream {
            inner: self.hub.subscribe_events(capacity)?,
        })
    }
}

#[async_trait]
impl EventService for Commander {
    async fn list_events(&self, offset: usize, limit: usize) -> Result<Page<Event>> {
        self.index.list_events(offset, limit).await
    }

    async fn get_event(&self, id: Uuid) -> Result<Option<Event>> {
        self.index.get_event(id).await
    }

    fn stream_events(&self) -> Result<EventStream> {
        self.stream_events_with_capacity(self.config.stream_capacity)
    }
}
