//! Integration tests for conversation memory
//!
//! These tests exercise the store through its public API against a real
//! temporary directory: eviction, reply lookup, on-disk format, corruption
//! handling and concurrent appends.

use std::sync::Arc;

use raiden_engine::diagnostics::{DiagnosticBus, DiagnosticEvent, EventType};
use raiden_engine::memory::{ConversationStore, MessageRecord, ReplyResolver};
use raiden_engine::mode::{Mode, ModeController};

fn record(id: i64) -> MessageRecord {
    MessageRecord::new("alice", format!("message {}", id), id)
}

#[tokio::test]
async fn test_thirty_first_record_evicts_the_oldest() {
    let dir = tempfile::tempdir().unwrap();
    let store = ConversationStore::new(dir.path(), 30).unwrap();

    for id in 1..=29 {
        store.append("g1", record(id)).await;
    }
    assert_eq!(store.read("g1", None).await.len(), 29);

    assert_eq!(store.append("g1", record(30)).await, 30);
    let log = store.read("g1", None).await;
    assert_eq!(log.len(), 30);
    assert_eq!(log[0].message_id, 1);

    assert_eq!(store.append("g1", record(31)).await, 30);
    let log = store.read("g1", None).await;
    assert_eq!(log.len(), 30);
    assert_eq!(log.first().unwrap().message_id, 2);
    assert_eq!(log.last().unwrap().message_id, 31);
    assert!(log.iter().all(|r| r.message_id != 1));
}

#[tokio::test]
async fn test_reply_to_evicted_message_has_no_context() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(ConversationStore::new(dir.path(), 30).unwrap());
    let resolver = ReplyResolver::new(Arc::clone(&store));

    for id in 1..=31 {
        store.append("g1", record(id)).await;
    }

    assert!(store.find_by_id("g1", 1).await.is_none());
    assert!(resolver.resolve("g1", 1).await.is_none());
    assert_eq!(
        resolver.resolve("g1", 2).await.as_deref(),
        Some("[User is replying to a message from alice that said: \"message 2\"]")
    );
}

#[tokio::test]
async fn test_log_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    {
        let store = ConversationStore::new(dir.path(), 30).unwrap();
        store.append("-1001", record(1)).await;
        store.append("-1001", record(2)).await;
    }

    let reopened = ConversationStore::new(dir.path(), 30).unwrap();
    let log = reopened.read("-1001", None).await;
    assert_eq!(log.len(), 2);
    assert_eq!(log[1].text, "message 2");
}

#[tokio::test]
async fn test_document_format_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let store = ConversationStore::new(dir.path(), 30).unwrap();
    store.append("g1", record(1)).await;
    store
        .append(
            "g1",
            MessageRecord::new("bob", "雷電将軍", 2)
                .with_target(Some("alice".to_string()))
                .replying_to(Some(1)),
        )
        .await;

    let raw = std::fs::read_to_string(store.path_for("g1")).unwrap();
    assert!(raw.contains("雷電将軍"));

    let doc: serde_json::Value = serde_json::from_str(&raw).unwrap();
    let first = &doc[0];
    assert_eq!(first["username"], "alice");
    assert_eq!(first["message"], "message 1");
    assert!(first["target"].is_null());
    assert!(first.get("reply_to_message_id").is_none());

    let second = &doc[1];
    assert_eq!(second["target"], "alice");
    assert_eq!(second["reply_to_message_id"], 1);
}

#[tokio::test]
async fn test_existing_document_is_read() {
    let dir = tempfile::tempdir().unwrap();
    let store = ConversationStore::new(dir.path(), 30).unwrap();
    std::fs::write(
        store.path_for("g1"),
        r#"[
  {
    "username": "Raiden",
    "target": "alice",
    "message": "Speak.",
    "message_id": 9,
    "timestamp": "2025-07-18T17:00:00+00:00"
  }
]"#,
    )
    .unwrap();

    let found = store.find_by_id("g1", 9).await.unwrap();
    assert_eq!(found.author, "Raiden");
    assert_eq!(found.target.as_deref(), Some("alice"));
    assert_eq!(found.reply_to, None);
}

#[tokio::test]
async fn test_corrupt_document_reads_empty_and_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let bus = DiagnosticBus::new();
    let mut events = bus.subscribe(EventType::StorageReadFailed).await;
    let store = ConversationStore::new(dir.path(), 30)
        .unwrap()
        .with_diagnostics(bus);

    std::fs::write(store.path_for("g1"), "{ not json").unwrap();

    assert!(store.read("g1", None).await.is_empty());
    match events.recv().await {
        Some(DiagnosticEvent::StorageReadFailed { conversation, .. }) => {
            assert_eq!(conversation, "g1")
        }
        other => panic!("Expected StorageReadFailed, got {:?}", other),
    }

    // The next append starts a fresh log
    store.append("g1", record(1)).await;
    assert_eq!(store.read("g1", None).await.len(), 1);
}

#[tokio::test]
async fn test_concurrent_appends_lose_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(ConversationStore::new(dir.path(), 100).unwrap());

    let handles: Vec<_> = (1..=40)
        .map(|id| {
            let store = Arc::clone(&store);
            tokio::spawn(async move { store.append("g1", record(id)).await })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap();
    }

    let mut ids: Vec<i64> = store
        .read("g1", None)
        .await
        .iter()
        .map(|r| r.message_id)
        .collect();
    ids.sort_unstable();
    assert_eq!(ids, (1..=40).collect::<Vec<_>>());
}

#[tokio::test]
async fn test_conversations_are_isolated() {
    let dir = tempfile::tempdir().unwrap();
    let store = ConversationStore::new(dir.path(), 30).unwrap();
    store.append("-1001", record(1)).await;
    store.append("-1002", record(2)).await;
    store.clear("-1001").await;

    assert!(store.read("-1001", None).await.is_empty());
    assert_eq!(store.read("-1002", None).await.len(), 1);
}

#[tokio::test]
async fn test_mode_switch_empties_log_and_invalid_mode_does_not() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(ConversationStore::new(dir.path(), 30).unwrap());
    let modes = ModeController::new(Arc::clone(&store));

    for id in 1..=5 {
        store.append("g1", record(id)).await;
    }

    assert!(modes.set_mode("g1", "robot").await.is_err());
    assert_eq!(store.read("g1", None).await.len(), 5);
    assert_eq!(modes.get_mode("g1").await, Mode::Persona);

    let switch = modes.set_mode("g1", "assistant").await.unwrap();
    assert_eq!(switch.previous, Mode::Persona);
    assert!(store.read("g1", None).await.is_empty());
    assert_eq!(store.stats("g1").await.total_messages, 0);
}
