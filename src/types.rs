//! Core data model for the command/event logs.
//!
//! Commands request an action; events report an outcome and carry a
//! `parent` reference to the command (or prior event) that triggered
//! them. Both travel the broker as keyed records whose value is an
//! opaque JSON payload. [`RecordValue`] is the typed view, encoded and
//! decoded at the broker seam.
//!
//! Identifiers are time-ordered UUIDs (version 1) generated by this API,
//! never by the caller: listing by id approximates ingestion order even
//! without the broker offset.

use bytes::Bytes;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::Result;

/// Caller-supplied submission payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandParams {
    /// The action requested, e.g. `"ship"`.
    pub action: String,
    /// Opaque action payload.
    pub data: Value,
}

impl CommandParams {
    pub fn new(action: impl Into<String>, data: Value) -> Self {
        Self {
            action: action.into(),
            data,
        }
    }
}

/// A durably appended command, as returned to API callers.
///
/// The broker-assigned fields (`timestamp`, `partition`, `offset`) come
/// from the append acknowledgement. `children` is populated by a
/// synchronous create when the completion event arrives; `error` records
/// a business outcome such as the completion wait timing out; the
/// command itself was appended successfully either way.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    pub id: Uuid,
    pub action: String,
    pub data: Value,
    /// Broker-assigned timestamp, epoch milliseconds.
    pub timestamp: i64,
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    /// Ids of completion events correlated to this command.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<Uuid>>,
    /// Business outcome recorded on the command, never an exception.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Command {
    /// Project a commands-topic record into the `Command` shape.
    ///
    /// The record key becomes the id; the value supplies `action` and
    /// `data`; broker coordinates carry over unchanged.
    pub fn from_record(record: &LogRecord) -> Result<Self> {
        let value = RecordValue::decode(&record.value)?;
        Ok(Self {
            id: record.key,
            action: value.action,
            data: value.data,
            timestamp: record.timestamp,
            topic: record.topic.clone(),
            partition: record.partition,
            offset: record.offset,
            children: None,
            error: None,
        })
    }
}

/// A durably appended outcome event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    /// The command (or prior event) this outcome responds to.
    pub parent: Uuid,
    pub action: String,
    pub data: Value,
    /// Broker-assigned timestamp, epoch milliseconds.
    pub timestamp: i64,
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
}

impl Event {
    /// Project an events-topic record into the `Event` shape.
    ///
    /// Fails with a codec error if the record value does not decode or
    /// carries no parent reference.
    pub fn from_record(record: &LogRecord) -> Result<Self> {
        let value = RecordValue::decode(&record.value)?;
        let parent = value.parent.ok_or_else(|| {
            crate::error::Error::Codec("event record has no parent reference".to_string())
        })?;
        Ok(Self {
            id: record.key,
            parent,
            action: value.action,
            data: value.data,
            timestamp: record.timestamp,
            topic: record.topic.clone(),
            partition: record.partition,
            offset: record.offset,
        })
    }
}

/// Typed view of a record value.
///
/// Command values are `{action, data}`; event values additionally carry
/// `parent`. The broker itself sees only the encoded bytes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordValue {
    pub action: String,
    pub data: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<Uuid>,
}

impl RecordValue {
    /// A command value: no parent reference.
    pub fn command(action: impl Into<String>, data: Value) -> Self {
        Self {
            action: action.into(),
            data,
            parent: None,
        }
    }

    /// An event value responding to `parent`.
    pub fn event(action: impl Into<String>, data: Value, parent: Uuid) -> Self {
        Self {
            action: action.into(),
            data,
            parent: Some(parent),
        }
    }

    /// Encode to the opaque wire payload.
    pub fn encode(&self) -> Result<Bytes> {
        Ok(Bytes::from(serde_json::to_vec(self)?))
    }

    /// Decode from the opaque wire payload.
    pub fn decode(bytes: &Bytes) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// A broker-shaped record as delivered by a log consumer.
#[derive(Debug, Clone, PartialEq)]
pub struct LogRecord {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    /// Broker-assigned timestamp, epoch milliseconds.
    pub timestamp: i64,
    /// The entity's id.
    pub key: Uuid,
    /// Encoded [`RecordValue`].
    pub value: Bytes,
}

/// A keyed record handed to a log producer for appending.
#[derive(Debug, Clone, PartialEq)]
pub struct AppendRequest {
    pub topic: String,
    pub key: Uuid,
    /// Encoded [`RecordValue`].
    pub value: Bytes,
}

/// Broker acknowledgement of a successful append.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppendAck {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    /// Broker-assigned timestamp, epoch milliseconds.
    pub timestamp: i64,
}

/// One page of a read-side listing.
///
/// `limit == 0` means the page is unbounded: all items from `offset`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub offset: usize,
    pub limit: usize,
    pub total: usize,
}

// Stable per-process node id for UUIDv1 generation. Real MAC addresses
// are irrelevant here; the multicast bit marks the id as synthetic per
// RFC 4122 §4.5.
static NODE_ID: Lazy<[u8; 6]> = Lazy::new(|| {
    let pid = std::process::id();
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);
    [
        0x01 | (pid >> 24) as u8,
        (pid >> 16) as u8,
        (pid >> 8) as u8,
        pid as u8,
        (nanos >> 8) as u8,
        nanos as u8,
    ]
});

/// Generate a new time-ordered command/event id.
///
/// UUIDv1 with a shared monotonic clock context: ids generated by one
/// process sort by generation time, so listing by id approximates
/// ingestion order.
pub fn new_entity_id() -> Uuid {
    Uuid::now_v1(&NODE_ID)
}

/// Current wall-clock time as epoch milliseconds.
pub fn epoch_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(topic: &str, value: RecordValue) -> LogRecord {
        LogRecord {
            topic: topic.to_string(),
            partition: 0,
            offset: 7,
            timestamp: 1_700_000_000_000,
            key: new_entity_id(),
            value: value.encode().unwrap(),
        }
    }

    #[test]
    fn test_entity_ids_are_unique() {
        let mut seen = std::collections::HashSet::new();
        for _ in 0..1000 {
            assert!(seen.insert(new_entity_id()));
        }
    }

    #[test]
    fn test_entity_ids_are_time_ordered() {
        // UUIDv1 timestamps are monotonic under the shared context; the
        // raw byte order is not sorted, so compare the embedded ticks.
        let a = new_entity_id();
        let b = new_entity_id();
        let ticks = |u: &Uuid| u.get_timestamp().map(|t| t.to_gregorian()).unwrap();
        assert!(ticks(&a) <= ticks(&b));
    }

    #[test]
    fn test_record_value_round_trip() {
        let value = RecordValue::event("shipped", json!({"sku": "x"}), new_entity_id());
        let decoded = RecordValue::decode(&value.encode().unwrap()).unwrap();
        assert_eq!(decoded, value);
    }

    #[test]
    fn test_command_value_omits_parent() {
        let bytes = RecordValue::command("ship", json!({})).encode().unwrap();
        let text = std::str::from_utf8(&bytes).unwrap();
        assert!(!text.contains("parent"));
    }

    #[test]
    fn test_command_projection() {
        let rec = record("commands", RecordValue::command("ship", json!({"sku": "x"})));
        let cmd = Command::from_record(&rec).unwrap();
        assert_eq!(cmd.id, rec.key);
        assert_eq!(cmd.action, "ship");
        assert_eq!(cmd.data, json!({"sku": "x"}));
        assert_eq!(cmd.offset, 7);
        assert!(cmd.children.is_none());
        assert!(cmd.error.is_none());
    }

    #[test]
    fn test_event_projection_requires_parent() {
        let rec = record("events", RecordValue::command("shipped", json!({})));
        assert!(Event::from_record(&rec).is_err());

        let parent = new_entity_id();
        let rec = record("events", RecordValue::event("shipped", json!({}), parent));
        let event = Event::from_record(&rec).unwrap();
        assert_eq!(event.parent, parent);
        assert_eq!(event.id, rec.key);
    }

    #[test]
    fn test_command_serialization_skips_empty_optionals() {
        let rec = record("commands", RecordValue::command("ship", json!({})));
        let cmd = Command::from_record(&rec).unwrap();
        let text = serde_json::to_string(&cmd).unwrap();
        assert!(!text.contains("children"));
        assert!(!text.contains("error"));
    }

    #[test]
    fn test_epoch_millis_is_recent() {
        // Anything after 2023-01-01 counts as a working clock.
        assert!(epoch_millis() > 1_672_531_200_000);
    }
}
