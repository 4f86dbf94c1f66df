//! Tests for the Memory Gateway through its trait object.

use std::sync::Arc;

use chrono::{Duration, Utc};
use pretty_assertions::assert_eq;
use serde_json::json;

use orca::error::OrcaError;
use orca::memory::{DateRange, InMemoryGateway, MemoryGateway, RecallConfig, StoredMessage};
use orca::types::*;

fn gateway() -> Arc<dyn MemoryGateway> {
    Arc::new(InMemoryGateway::new())
}

fn text(memory: &dyn MemoryGateway, thread: &str, role: Role, body: &str, minutes_ago: i64) -> StoredMessage {
    StoredMessage {
        id: memory.generate_id(),
        thread_id: thread.to_string(),
        role,
        content: vec![ContentPart::text(body)],
        kind: MessageType::Text,
        created_at: Utc::now() - Duration::minutes(minutes_ago),
        tool_call_ids: None,
        tool_call_args: None,
        tool_names: None,
    }
}

fn bodies(messages: &[StoredMessage]) -> Vec<String> {
    messages
        .iter()
        .map(|m| m.to_model_message().text())
        .collect()
}

#[tokio::test]
async fn threads_are_listed_per_resource() {
    let memory = gateway();
    memory.create_thread("alice", "First", None).await.unwrap();
    memory.create_thread("alice", "Second", Some("t-2")).await.unwrap();
    memory.create_thread("bob", "Other", None).await.unwrap();

    let mut titles: Vec<String> = memory
        .threads_for_resource("alice")
        .await
        .unwrap()
        .into_iter()
        .map(|t| t.title)
        .collect();
    titles.sort();
    assert_eq!(titles, vec!["First", "Second"]);
}

#[tokio::test]
async fn explicit_ids_are_create_if_absent() {
    let memory = gateway();
    let first = memory.create_thread("alice", "Original", Some("t-1")).await.unwrap();
    let again = memory.create_thread("alice", "Ignored", Some("t-1")).await.unwrap();

    assert_eq!(again, first);
    assert_eq!(again.title, "Original");
}

#[tokio::test]
async fn update_keeps_the_owner_and_delete_cascades() {
    let memory = gateway();
    let mut thread = memory.create_thread("alice", "Draft", None).await.unwrap();
    memory
        .save_messages(
            vec![text(memory.as_ref(), &thread.id, Role::User, "hello", 0)],
            None,
        )
        .await
        .unwrap();

    thread.title = "Final".into();
    thread.metadata.insert("pinned".into(), json!(true));
    let updated = memory.update_thread(thread.clone()).await.unwrap();
    assert_eq!(updated.title, "Final");
    assert_eq!(updated.metadata["pinned"], json!(true));

    let mut stolen = thread.clone();
    stolen.resource_id = "mallory".into();
    assert!(matches!(
        memory.update_thread(stolen).await,
        Err(OrcaError::InvalidArgument(_))
    ));

    memory.delete_thread(&thread.id).await.unwrap();
    assert_eq!(memory.get_thread_by_id(&thread.id).await.unwrap(), None);
    let recalled = memory
        .recall_messages(&thread.id, None, "", None)
        .await
        .unwrap();
    assert!(recalled.messages.is_empty());
}

#[tokio::test]
async fn saving_to_an_unknown_thread_fails() {
    let memory = gateway();
    let err = memory
        .save_messages(vec![text(memory.as_ref(), "ghost", Role::User, "boo", 0)], None)
        .await
        .unwrap_err();
    assert!(matches!(err, OrcaError::ThreadNotFound(_)));
}

#[tokio::test]
async fn recall_respects_date_ranges_and_last_messages() {
    let memory = gateway();
    let thread = memory.create_thread("alice", "Log", None).await.unwrap();
    let batch = vec![
        text(memory.as_ref(), &thread.id, Role::User, "two days ago", 60 * 48),
        text(memory.as_ref(), &thread.id, Role::User, "an hour ago", 60),
        text(memory.as_ref(), &thread.id, Role::Assistant, "a minute ago", 1),
    ];
    memory.save_messages(batch, None).await.unwrap();

    let range = DateRange {
        start: Utc::now() - Duration::hours(3),
        end: Utc::now(),
    };
    let recent = memory
        .recall_messages(&thread.id, None, "", Some(range))
        .await
        .unwrap();
    assert_eq!(bodies(&recent.messages), vec!["an hour ago", "a minute ago"]);

    let last_one = RecallConfig::builder().last_messages(1).build();
    let tail = memory
        .recall_messages(&thread.id, Some(&last_one), "", None)
        .await
        .unwrap();
    assert_eq!(bodies(&tail.messages), vec!["a minute ago"]);
}

#[tokio::test]
async fn keyword_matches_pull_in_older_relevant_messages() {
    let memory = gateway();
    let thread = memory.create_thread("alice", "Trips", None).await.unwrap();
    let batch = vec![
        text(memory.as_ref(), &thread.id, Role::User, "I loved the museums in Lisbon", 50),
        text(memory.as_ref(), &thread.id, Role::User, "Groceries for the week", 40),
        text(memory.as_ref(), &thread.id, Role::User, "Weather looks fine", 1),
    ];
    memory.save_messages(batch, None).await.unwrap();

    let config = RecallConfig::builder()
        .last_messages(1)
        .keyword_matches(2)
        .build();
    let recalled = memory
        .recall_messages(&thread.id, Some(&config), "What about Lisbon again?", None)
        .await
        .unwrap();

    assert_eq!(
        bodies(&recalled.messages),
        vec!["I loved the museums in Lisbon", "Weather looks fine"]
    );
}
