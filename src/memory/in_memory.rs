//! Process-local [`MemoryGateway`] for tests and local development.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use tracing::debug;

use super::{DateRange, MemoryGateway, RecallConfig, RecallResult, StoredMessage, Thread};
use crate::error::OrcaError;
use crate::types::Role;

#[derive(Default)]
struct Entries {
    threads: HashMap<String, Thread>,
    /// Per-thread messages in insertion order.
    messages: HashMap<String, Vec<StoredMessage>>,
}

/// In-memory storage for testing and local development.
#[derive(Default)]
pub struct InMemoryGateway {
    entries: RwLock<Entries>,
}

impl InMemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every message stored for a thread, oldest first.
    pub async fn messages(&self, thread_id: &str) -> Vec<StoredMessage> {
        let entries = self.entries.read().await;
        entries
            .messages
            .get(thread_id)
            .map(|m| ordered(m.clone()))
            .unwrap_or_default()
    }

    pub async fn thread_count(&self) -> usize {
        self.entries.read().await.threads.len()
    }
}

/// Stable sort by timestamp so ties keep insertion order.
fn ordered(mut messages: Vec<StoredMessage>) -> Vec<StoredMessage> {
    messages.sort_by_key(|m| m.created_at);
    messages
}

fn keywords(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.chars().count() > 2)
        .map(str::to_lowercase)
        .collect()
}

/// Drop tool results whose call is not part of the selection.
fn drop_unanswerable(messages: Vec<StoredMessage>) -> Vec<StoredMessage> {
    let mut issued: HashSet<String> = HashSet::new();
    messages
        .into_iter()
        .filter(|m| {
            if m.role == Role::Tool {
                return m.answered_call_ids().iter().all(|id| issued.contains(*id));
            }
            issued.extend(m.issued_call_ids().into_iter().map(str::to_string));
            true
        })
        .collect()
}

#[async_trait]
impl MemoryGateway for InMemoryGateway {
    async fn create_thread(
        &self,
        resource_id: &str,
        title: &str,
        thread_id: Option<&str>,
    ) -> Result<Thread, OrcaError> {
        let mut entries = self.entries.write().await;
        if let Some(existing) = thread_id.and_then(|id| entries.threads.get(id)) {
            debug!(thread_id = %existing.id, "thread already exists, returning it");
            return Ok(existing.clone());
        }

        let now = Utc::now();
        let thread = Thread {
            id: thread_id.map_or_else(|| self.generate_id(), str::to_string),
            resource_id: resource_id.to_string(),
            title: title.to_string(),
            metadata: HashMap::new(),
            created_at: now,
            updated_at: now,
        };
        entries.threads.insert(thread.id.clone(), thread.clone());
        Ok(thread)
    }

    async fn get_thread_by_id(&self, thread_id: &str) -> Result<Option<Thread>, OrcaError> {
        Ok(self.entries.read().await.threads.get(thread_id).cloned())
    }

    async fn save_messages(
        &self,
        messages: Vec<StoredMessage>,
        _config: Option<&RecallConfig>,
    ) -> Result<Vec<StoredMessage>, OrcaError> {
        if messages.is_empty() {
            return Ok(messages);
        }
        let mut entries = self.entries.write().await;

        // Validate the whole batch before writing any of it.
        let mut issued: HashMap<&str, HashSet<&str>> = HashMap::new();
        for message in &messages {
            if !entries.threads.contains_key(&message.thread_id) {
                return Err(OrcaError::ThreadNotFound(message.thread_id.clone()));
            }
            let known = issued.entry(message.thread_id.as_str()).or_insert_with(|| {
                entries
                    .messages
                    .get(&message.thread_id)
                    .into_iter()
                    .flatten()
                    .flat_map(StoredMessage::issued_call_ids)
                    .collect()
            });
            if let Some(orphan) = message
                .answered_call_ids()
                .into_iter()
                .find(|id| !known.contains(id))
            {
                return Err(OrcaError::InvalidState(format!(
                    "tool result '{orphan}' has no preceding tool call in thread '{}'",
                    message.thread_id
                )));
            }
            known.extend(message.issued_call_ids());
        }

        let now = Utc::now();
        for message in &messages {
            if let Some(thread) = entries.threads.get_mut(&message.thread_id) {
                thread.updated_at = now;
            }
            entries
                .messages
                .entry(message.thread_id.clone())
                .or_default()
                .push(message.clone());
        }
        Ok(messages)
    }

    async fn recall_messages(
        &self,
        thread_id: &str,
        config: Option<&RecallConfig>,
        query: &str,
        range: Option<DateRange>,
    ) -> Result<RecallResult, OrcaError> {
        let defaults = RecallConfig::default();
        let config = config.unwrap_or(&defaults);
        let entries = self.entries.read().await;
        let Some(stored) = entries.messages.get(thread_id) else {
            return Ok(RecallResult::default());
        };

        let candidates: Vec<StoredMessage> = ordered(stored.clone())
            .into_iter()
            .filter(|m| range.map_or(true, |r| r.contains(&m.created_at)))
            .collect();
        let split = candidates.len().saturating_sub(config.last_messages);
        let (older, recent) = candidates.split_at(split);

        let mut selected: Vec<StoredMessage> = Vec::new();
        if let Some(limit) = config.keyword_matches.filter(|n| *n > 0) {
            let wanted = keywords(query);
            if !wanted.is_empty() {
                let mut scored: Vec<(usize, &StoredMessage)> = older
                    .iter()
                    .map(|m| {
                        let text = m.to_model_message().content_text();
                        (keywords(&text).intersection(&wanted).count(), m)
                    })
                    .filter(|(score, _)| *score > 0)
                    .collect();
                scored.sort_by(|a, b| b.0.cmp(&a.0));
                selected.extend(scored.into_iter().take(limit).map(|(_, m)| m.clone()));
            }
        }
        selected.extend(recent.iter().cloned());

        Ok(RecallResult {
            messages: drop_unanswerable(ordered(selected)),
        })
    }

    fn generate_id(&self) -> String {
        uuid::Uuid::new_v4().to_string()
    }

    async fn threads_for_resource(&self, resource_id: &str) -> Result<Vec<Thread>, OrcaError> {
        let entries = self.entries.read().await;
        let mut threads: Vec<Thread> = entries
            .threads
            .values()
            .filter(|t| t.resource_id == resource_id)
            .cloned()
            .collect();
        threads.sort_by_key(|t| t.created_at);
        Ok(threads)
    }

    async fn update_thread(&self, thread: Thread) -> Result<Thread, OrcaError> {
        let mut entries = self.entries.write().await;
        let existing = entries
            .threads
            .get_mut(&thread.id)
            .ok_or_else(|| OrcaError::ThreadNotFound(thread.id.clone()))?;
        if existing.resource_id != thread.resource_id {
            return Err(OrcaError::InvalidArgument(format!(
                "thread '{}' belongs to resource '{}'",
                thread.id, existing.resource_id
            )));
        }
        existing.title = thread.title;
        existing.metadata = thread.metadata;
        existing.updated_at = Utc::now();
        Ok(existing.clone())
    }

    async fn delete_thread(&self, thread_id: &str) -> Result<(), OrcaError> {
        let mut entries = self.entries.write().await;
        entries.threads.remove(thread_id);
        entries.messages.remove(thread_id);
        Ok(())
    }
}
