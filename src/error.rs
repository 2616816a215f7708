//! Crate-level errors.
//!
//! This module provides the error types for the commandeer broker core.
//!
//! # Error Taxonomy
//!
//! The crate distinguishes two kinds of failure:
//!
//! - **Operational errors**, returned out of band as [`Error`]: append
//!   failures, a shut-down hub, adapter faults, bad configuration.
//! - **Business outcomes**, encoded in the returned
//!   [`Command`](crate::types::Command): a synchronous wait that timed
//!   out sets the command's `error` field, and a missing row on point
//!   lookup is `None`; neither is an [`Error`].
//!
//! Delivery loss on a slow subscriber is recovered locally by the
//! sliding-buffer policy and never surfaces through either channel.

use std::collections::BTreeMap;
use std::{io, result};

use thiserror::Error as ThisError;

pub type Result<T> = result::Result<T, Error>;

/// Field-keyed validation failures reported by a
/// [`CommandValidator`](crate::commander::CommandValidator).
///
/// Keys are field names (`"action"`, `"data"`, ...), values are
/// human-readable reasons. A `BTreeMap` keeps the report order stable.
pub type ValidationErrors = BTreeMap<String, String>;

/// Operational errors surfaced by the broker core.
#[derive(Clone, Debug, ThisError, PartialEq, Eq)]
pub enum Error {
    /// The broker rejected the append or the transport failed.
    #[error("append failed: {0}")]
    Append(String),

    /// The producer's acknowledgement channel closed before resolving.
    #[error("send response channel closed")]
    AckChannelClosed,

    /// The fan-out hub is terminal; no further subscribes or waiter
    /// registrations are accepted.
    #[error("fan-out hub is shut down")]
    HubClosed,

    /// Command params were rejected before any append.
    #[error("invalid command params: {0:?}")]
    Validation(ValidationErrors),

    /// The read-side index failed to answer.
    #[error("index read failed: {0}")]
    Index(String),

    /// A record value could not be encoded or decoded.
    #[error("record codec error: {0}")]
    Codec(String),

    /// An error in the network or filesystem.
    #[error("IO error: {0:?}")]
    Io(io::ErrorKind),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(e.kind())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Codec(e.to_string())
    }
}
