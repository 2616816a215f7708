//! Logging setup and span helpers for the broker core.
//!
//! The crate emits structured `tracing` events from the commander, the
//! fan-out hub and the in-memory adapters. Binaries and tests call
//! [`init`] once to install a subscriber; embedders that already run
//! their own subscriber skip it and the crate's events flow there
//! instead.
//!
//! Command submissions are wrapped in the spans built here, so every
//! append, completion and timeout carries the command id and action as
//! structured fields:
//!
//! ```text
//! create_command{id=1b4e28ba-... action=ship}: command appended offset=42
//! create_command{id=1b4e28ba-...}:completion_wait{parent=1b4e28ba-...}: timed out
//! ```

use tracing::Span;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

/// Install the process-wide log subscriber.
///
/// Levels come from `RUST_LOG`, defaulting to `info`. Returns `false`
/// when a subscriber is already installed, by an embedder or an earlier
/// call; events then flow to whoever got there first.
pub fn init() -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .is_ok()
}

/// Span covering one command submission, fire-and-forget or
/// synchronous, from validation through the returned command.
pub fn command_span(id: Uuid, action: &str) -> Span {
    tracing::info_span!("create_command", %id, action)
}

/// Span covering the correlation wait of a synchronous submission.
///
/// `parent` is the command id the completion event must reference.
pub fn completion_wait_span(parent: Uuid, timeout_ms: u64) -> Span {
    tracing::debug_span!("completion_wait", %parent, timeout_ms)
}
