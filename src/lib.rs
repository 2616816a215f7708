//! # Commandeer
//! CQRS-style command/event broker core in Rust.
//!
//! Commandeer accepts *commands* (requests to perform an action),
//! durably appends them to an ordered log through a broker adapter, and
//! observes *events* (outcomes produced by downstream executors) on a
//! second log. Submission either returns on the append acknowledgement
//! (fire-and-forget) or blocks until a completion event correlated to
//! the command arrives, with a per-call timeout.
//!
//! The heart of the crate is the [`FanoutHub`](hub::FanoutHub): a single
//! demux task consumes both logs, copies records to dynamic broadcast
//! subscribers through sliding buffers, and correlates outcome events to
//! pending synchronous commands by parent reference, without ever
//! blocking on a slow subscriber.
//!
//! # Goals
//! - A small, sharp concurrency core over [Tokio](https://tokio.rs/)
//! - Broker- and database-agnostic: adapters are traits, with in-memory
//!   implementations included for tests and local development
//! - Business outcomes in values, operational failures in errors
//!
//! ## Getting started
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use commandeer::prelude::*;
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     commandeer::telemetry::init();
//!
//!     let broker = MemoryBroker::new();
//!     let commander = Commander::new(
//!         Arc::new(broker.clone()),
//!         Arc::new(broker),
//!         Arc::new(MemoryIndex::new()),
//!         CommanderConfig::default(),
//!     )?;
//!     commander.start().await?;
//!
//!     // Fire-and-forget: returns on the append ack.
//!     let command = commander
//!         .create_command(CommandParams::new("ship", json!({"sku": "x"})))
//!         .await?;
//!     println!("appended at offset {}", command.offset);
//!
//!     // Synchronous: waits for a correlated completion event.
//!     let command = commander
//!         .create_command_sync(CommandParams::new("ship", json!({"sku": "y"})))
//!         .await?;
//!     match command.children {
//!         Some(children) => println!("completed by {:?}", children),
//!         None => println!("timed out: {:?}", command.error),
//!     }
//!
//!     commander.stop();
//!     Ok(())
//! }
//! ```
//!
//! Production deployments swap [`MemoryBroker`](broker::MemoryBroker)
//! and [`MemoryIndex`](broker::MemoryIndex) for adapters over a real
//! broker client and read-side store; the core only ever sees the
//! [`broker`] traits.

#![forbid(unsafe_code)]

pub mod broker;
pub mod commander;
pub mod config;
pub mod constants;
pub mod error;
pub mod hub;
pub mod telemetry;
pub mod types;

pub mod prelude {
    //! Main exports for working with the commander.
    //!
    //! Brings in the [`Commander`](crate::commander::Commander), its
    //! capability traits, the configuration, the in-memory adapters and
    //! the core data model.
    pub use crate::broker::{IndexReader, LogConsumer, LogProducer, MemoryBroker, MemoryIndex};
    pub use crate::commander::{
        AcceptAll, CommandService, CommandStream, CommandValidator, Commander, EventService,
        EventStream,
    };
    pub use crate::config::CommanderConfig;
    pub use crate::error::{Error, Result, ValidationErrors};
    pub use crate::hub::{FanoutHub, SubscriberId, Subscription, WaitOutcome, Waiter};
    pub use crate::types::{
        AppendAck, AppendRequest, Command, CommandParams, Event, LogRecord, Page, RecordValue,
    };

    pub use bytes;
}
