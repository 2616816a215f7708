//! Centralized configuration constants.
//!
//! This module consolidates the magic numbers and canonical strings used
//! throughout the commandeer broker core. Having them in one place makes
//! it easier to:
//!
//! - Understand the default topology and timing
//! - Update values consistently
//! - Document the rationale for each constant

// =============================================================================
// Topics
// =============================================================================

/// Default broker topic for command records.
pub const DEFAULT_COMMANDS_TOPIC: &str = "commands";

/// Default broker topic for event records.
pub const DEFAULT_EVENTS_TOPIC: &str = "events";

// =============================================================================
// Timing
// =============================================================================

/// Default deadline for a synchronous create, in milliseconds.
///
/// A synchronous `create_command` waits this long for a completion event
/// correlated to the submitted command before returning the command with
/// its `error` field set.
pub const DEFAULT_SYNC_TIMEOUT_MS: u64 = 5_000;

// =============================================================================
// Channels
// =============================================================================

/// Default sliding-buffer capacity handed to stream subscribers when the
/// caller does not choose one.
pub const DEFAULT_STREAM_CAPACITY: usize = 10;

/// Minimum sliding-buffer capacity for any subscriber.
///
/// A zero-capacity ring cannot hold the record being delivered, so
/// subscriber capacities are clamped to at least this value.
pub const MIN_SUBSCRIBER_CAPACITY: usize = 1;

/// Capacity of the bounded channel between the log consumer and the
/// hub's demux task.
///
/// This channel is the only place the consumer may be back-pressured;
/// everything downstream of the demux task is non-blocking.
pub const DEFAULT_DEMUX_BUFFER: usize = 256;

// =============================================================================
// Messages
// =============================================================================

/// Error text recorded on a command whose synchronous wait expired.
///
/// The command was durably appended; only the completion wait timed out.
/// Callers match on this exact string, so it must not drift.
pub const SYNC_TIMEOUT_ERROR: &str = "Timed out waiting for completion event.";

// =============================================================================
// Environment variables
// =============================================================================

/// Environment variable overriding the commands topic.
pub const ENV_COMMANDS_TOPIC: &str = "COMMANDEER_COMMANDS_TOPIC";

/// Environment variable overriding the events topic.
pub const ENV_EVENTS_TOPIC: &str = "COMMANDEER_EVENTS_TOPIC";

/// Environment variable overriding the synchronous-create timeout (ms).
pub const ENV_SYNC_TIMEOUT_MS: &str = "COMMANDEER_SYNC_TIMEOUT_MS";
