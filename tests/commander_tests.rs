//! End-to-end tests for the commander API.
//!
//! The commander runs over the in-memory broker and index; a stub
//! executor task plays the role of the downstream command processor,
//! observing the command stream and producing correlated completion
//! events.
//!
//! To run:
//! ```bash
//! cargo test --test commander_tests
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::time::timeout;
use uuid::Uuid;

use commandeer::broker::{LogProducer, MemoryBroker, MemoryIndex};
use commandeer::commander::{CommandService, Commander, EventService};
use commandeer::config::CommanderConfig;
use commandeer::constants::SYNC_TIMEOUT_ERROR;
use commandeer::types::{AppendRequest, Command, CommandParams, Event, RecordValue, new_entity_id};

// ============================================================================
// Fixtures
// ============================================================================

fn build(broker: &MemoryBroker, index: &MemoryIndex, config: CommanderConfig) -> Commander {
    let _ = commandeer::telemetry::init();
    Commander::new(
        Arc::new(broker.clone()),
        Arc::new(broker.clone()),
        Arc::new(index.clone()),
        config,
    )
    .unwrap()
}

async fn started(broker: &MemoryBroker, config: CommanderConfig) -> Commander {
    let commander = build(broker, &MemoryIndex::new(), config);
    commander.start().await.unwrap();
    commander
}

/// Append a completion event for `parent`, as a downstream executor
/// would, and return the event id.
async fn complete(broker: &MemoryBroker, parent: Uuid) -> Uuid {
    let key = new_entity_id();
    broker
        .append(AppendRequest {
            topic: "events".to_string(),
            key,
            value: RecordValue::event("shipped", json!({"ok": true}), parent)
                .encode()
                .unwrap(),
        })
        .await
        .unwrap();
    key
}

// ============================================================================
// Async create
// ============================================================================

#[tokio::test]
async fn test_async_create_happy_path() {
    let broker = MemoryBroker::new();
    let commander = started(&broker, CommanderConfig::default()).await;

    // Subscribe before the append so the record is observed.
    let mut stream = commander.stream_commands().unwrap();

    let command = commander
        .create_command(CommandParams::new("ship", json!({"sku": "x"})))
        .await
        .unwrap();

    assert_eq!(command.action, "ship");
    assert_eq!(command.data, json!({"sku": "x"}));
    assert!(!command.id.is_nil());
    assert!(command.offset >= 0);
    assert_eq!(command.topic, "commands");
    assert!(command.children.is_none());
    assert!(command.error.is_none());

    let observed = timeout(Duration::from_secs(2), stream.recv())
        .await
        .expect("stream delivery stalled")
        .expect("stream closed");
    assert_eq!(observed.id, command.id);
    assert_eq!(observed.action, "ship");
}

#[tokio::test]
async fn test_command_ids_are_unique_and_time_ordered() {
    let broker = MemoryBroker::new();
    let commander = started(&broker, CommanderConfig::default()).await;

    let mut ids = Vec::new();
    for _ in 0..50 {
        let command = commander
            .create_command(CommandParams::new("ship", json!({})))
            .await
            .unwrap();
        ids.push(command.id);
    }

    let unique: std::collections::HashSet<_> = ids.iter().collect();
    assert_eq!(unique.len(), ids.len());

    let ticks = |u: &Uuid| u.get_timestamp().map(|t| t.to_gregorian()).unwrap();
    for pair in ids.windows(2) {
        assert!(ticks(&pair[0]) <= ticks(&pair[1]));
    }
}

// ============================================================================
// Sync create
// ============================================================================

#[tokio::test]
async fn test_sync_create_completes_on_event() {
    let broker = MemoryBroker::new();
    let config = CommanderConfig {
        sync_timeout: Duration::from_secs(5),
        ..CommanderConfig::default()
    };
    let commander = Arc::new(started(&broker, config).await);

    // Stub executor: complete every observed command.
    let mut commands = commander.stream_commands().unwrap();
    let executor_broker = broker.clone();
    tokio::spawn(async move {
        while let Some(command) = commands.recv().await {
            complete(&executor_broker, command.id).await;
        }
    });

    let command = commander
        .create_command_sync(CommandParams::new("ship", json!({"sku": "x"})))
        .await
        .unwrap();

    let children = command.children.expect("completion event should be linked");
    assert_eq!(children.len(), 1);
    assert!(command.error.is_none());
    assert_eq!(commander.hub().waiter_count(), 0);
}

#[tokio::test]
async fn test_sync_create_times_out_without_event() {
    let broker = MemoryBroker::new();
    let config = CommanderConfig {
        sync_timeout: Duration::from_millis(50),
        ..CommanderConfig::default()
    };
    let commander = started(&broker, config).await;

    let command = commander
        .create_command_sync(CommandParams::new("ship", json!({})))
        .await
        .unwrap();

    assert_eq!(command.error.as_deref(), Some(SYNC_TIMEOUT_ERROR));
    assert!(command.children.is_none());
    // The command itself was durably appended.
    assert_eq!(broker.topic_len("commands").await, 1);
    assert_eq!(commander.hub().waiter_count(), 0);
}

#[tokio::test]
async fn test_sync_create_zero_timeout_is_deterministic() {
    let broker = MemoryBroker::new();
    let config = CommanderConfig {
        sync_timeout: Duration::ZERO,
        ..CommanderConfig::default()
    };
    let commander = started(&broker, config).await;

    let command = commander
        .create_command_sync(CommandParams::new("ship", json!({})))
        .await
        .unwrap();
    assert_eq!(command.error.as_deref(), Some(SYNC_TIMEOUT_ERROR));
    assert_eq!(commander.hub().waiter_count(), 0);
}

#[tokio::test]
async fn test_parallel_sync_creates_all_complete() {
    const N: usize = 100;

    let broker = MemoryBroker::new();
    let config = CommanderConfig {
        sync_timeout: Duration::from_secs(10),
        ..CommanderConfig::default()
    };
    let commander = Arc::new(started(&broker, config).await);

    // Executor that collects all N commands first, then completes them
    // in reverse submission order.
    let mut commands = commander.stream_commands_with_capacity(2 * N).unwrap();
    let executor_broker = broker.clone();
    let executor = tokio::spawn(async move {
        let mut observed = Vec::with_capacity(N);
        while observed.len() < N {
            observed.push(commands.recv().await.expect("command stream closed"));
        }
        let mut completions = HashMap::with_capacity(N);
        for command in observed.iter().rev() {
            completions.insert(command.id, complete(&executor_broker, command.id).await);
        }
        completions
    });

    let mut calls = Vec::with_capacity(N);
    for i in 0..N {
        let commander = Arc::clone(&commander);
        calls.push(tokio::spawn(async move {
            commander
                .create_command_sync(CommandParams::new("ship", json!({"i": i})))
                .await
                .unwrap()
        }));
    }

    let completions = executor.await.unwrap();
    for call in calls {
        let command = call.await.unwrap();
        assert!(command.error.is_none(), "no call may time out");
        let children = command.children.expect("every call completes");
        assert_eq!(children, vec![completions[&command.id]]);
    }
    assert_eq!(commander.hub().waiter_count(), 0);
}

#[tokio::test]
async fn test_shutdown_mid_wait_returns_promptly() {
    let broker = MemoryBroker::new();
    let config = CommanderConfig {
        sync_timeout: Duration::from_secs(60),
        ..CommanderConfig::default()
    };
    let commander = Arc::new(started(&broker, config).await);

    let caller = Arc::clone(&commander);
    let call = tokio::spawn(async move {
        caller
            .create_command_sync(CommandParams::new("ship", json!({})))
            .await
    });

    // Let the call register and append, then pull the plug.
    tokio::time::sleep(Duration::from_millis(50)).await;
    commander.stop();

    let command = timeout(Duration::from_secs(2), call)
        .await
        .expect("call must return within bounded delay after shutdown")
        .unwrap()
        .unwrap();
    // Shutdown mid-wait reports timeout semantics.
    assert_eq!(command.error.as_deref(), Some(SYNC_TIMEOUT_ERROR));
    assert_eq!(commander.hub().waiter_count(), 0);
}

// ============================================================================
// Listing and point lookup
// ============================================================================

fn indexed_command(offset: i64) -> Command {
    Command {
        id: new_entity_id(),
        action: "ship".to_string(),
        data: json!({}),
        timestamp: commandeer::types::epoch_millis(),
        topic: "commands".to_string(),
        partition: 0,
        offset,
        children: None,
        error: None,
    }
}

#[tokio::test]
async fn test_list_commands_pagination_and_prefix() {
    let broker = MemoryBroker::new();
    let index = MemoryIndex::new();
    let commander = build(&broker, &index, CommanderConfig::default());

    for i in 0..7 {
        index.insert_command(indexed_command(i)).await;
    }

    let all = commander.list_commands(0, 0).await.unwrap();
    assert_eq!(all.items.len(), 7);
    assert_eq!(all.total, 7);

    let page = commander.list_commands(0, 3).await.unwrap();
    assert_eq!(page.items.len(), 3);
    assert_eq!(page.items[..], all.items[..3], "bounded page is a prefix");
}

#[tokio::test]
async fn test_get_command_round_trip() {
    let broker = MemoryBroker::new();
    let index = MemoryIndex::new();
    let commander = started_with_index(&broker, &index).await;

    let command = commander
        .create_command(CommandParams::new("ship", json!({"sku": "x"})))
        .await
        .unwrap();

    // The external indexer runs out-of-band; simulate it catching up.
    index.insert_command(command.clone()).await;

    let fetched = commander.get_command(command.id).await.unwrap();
    assert_eq!(fetched, Some(command));

    let missing = commander.get_command(new_entity_id()).await.unwrap();
    assert_eq!(missing, None);
}

async fn started_with_index(broker: &MemoryBroker, index: &MemoryIndex) -> Commander {
    let commander = build(broker, index, CommanderConfig::default());
    commander.start().await.unwrap();
    commander
}

// ============================================================================
// Event streaming
// ============================================================================

#[tokio::test]
async fn test_stream_events_carries_parent() {
    let broker = MemoryBroker::new();
    let commander = started(&broker, CommanderConfig::default()).await;

    let mut events = commander.stream_events().unwrap();
    let parent = new_entity_id();
    let event_id = complete(&broker, parent).await;

    let observed: Event = timeout(Duration::from_secs(2), events.recv())
        .await
        .expect("event delivery stalled")
        .expect("event stream closed");
    assert_eq!(observed.id, event_id);
    assert_eq!(observed.parent, parent);
    assert_eq!(observed.action, "shipped");
    assert!(observed.offset >= 0);
}

#[tokio::test]
async fn test_list_events_limit_boundary() {
    let broker = MemoryBroker::new();
    let index = MemoryIndex::new();
    let commander = build(&broker, &index, CommanderConfig::default());

    for i in 0..4 {
        index
            .insert_event(Event {
                id: new_entity_id(),
                parent: new_entity_id(),
                action: "shipped".to_string(),
                data: json!({}),
                timestamp: commandeer::types::epoch_millis(),
                topic: "events".to_string(),
                partition: 0,
                offset: i,
            })
            .await;
    }

    let unbounded = commander.list_events(1, 0).await.unwrap();
    assert_eq!(unbounded.items.len(), 3);

    let bounded = commander.list_events(1, 2).await.unwrap();
    assert_eq!(bounded.items.len(), 2);
    assert_eq!(bounded.total, 4);

    let event = commander.get_event(unbounded.items[0].id).await.unwrap();
    assert_eq!(event, Some(unbounded.items[0].clone()));
}
