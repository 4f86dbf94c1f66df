//! Memory Gateway: thread and message persistence plus recall.
//!
//! The orchestrator consumes a [`MemoryGateway`]; storage engines implement it.
//! [`InMemoryGateway`] is the process-local reference implementation.

#[cfg(feature = "in-memory")]
pub mod in_memory;

#[cfg(feature = "in-memory")]
pub use in_memory::InMemoryGateway;

use std::collections::HashMap;

use async_trait::async_trait;
use bon::Builder;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::OrcaError;
use crate::types::{ContentPart, MessageType, ModelMessage, Role};

/// A conversation container owned by a resource (user or entity).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Thread {
    pub id: String,
    pub resource_id: String,
    pub title: String,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A persisted message.
///
/// `tool_call_ids`, `tool_call_args` and `tool_names` are parallel sequences,
/// present only on tool messages and assistant messages with tool calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredMessage {
    pub id: String,
    pub thread_id: String,
    pub role: Role,
    pub content: Vec<ContentPart>,
    #[serde(rename = "type")]
    pub kind: MessageType,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_ids: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_args: Option<Vec<serde_json::Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_names: Option<Vec<String>>,
}

impl StoredMessage {
    /// The message as the model sees it.
    pub fn to_model_message(&self) -> ModelMessage {
        ModelMessage {
            role: self.role,
            content: self.content.clone(),
            name: None,
            timestamp: Some(self.created_at),
        }
    }

    /// Ids of the tool calls this message answers (tool role only).
    pub fn answered_call_ids(&self) -> Vec<&str> {
        self.content
            .iter()
            .filter_map(|part| match part {
                ContentPart::ToolResult(result) => Some(result.tool_call_id.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Ids of the tool calls this message issues (assistant role only).
    pub fn issued_call_ids(&self) -> Vec<&str> {
        self.content
            .iter()
            .filter_map(|part| match part {
                ContentPart::ToolCall(call) => Some(call.id.as_str()),
                _ => None,
            })
            .collect()
    }
}

/// How much history a recall returns.
#[derive(Debug, Clone, PartialEq, Builder, Serialize, Deserialize)]
pub struct RecallConfig {
    /// Most recent messages always included.
    #[builder(default = 40)]
    pub last_messages: usize,
    /// Older messages matched against the relevance query, if enabled.
    pub keyword_matches: Option<usize>,
}

impl Default for RecallConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Half-open time window `[start, end)` for recall.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl DateRange {
    pub fn contains(&self, at: &DateTime<Utc>) -> bool {
        *at >= self.start && *at < self.end
    }
}

/// Messages returned by a recall.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecallResult {
    pub messages: Vec<StoredMessage>,
}

/// Thread and message persistence consumed by the orchestrator.
///
/// Implementations must be safe to share across concurrent turns. All calls are
/// safe to retry except `create_thread` without an explicit id.
#[async_trait]
pub trait MemoryGateway: Send + Sync {
    /// Create a thread. With an explicit id, an existing thread is returned as is.
    async fn create_thread(
        &self,
        resource_id: &str,
        title: &str,
        thread_id: Option<&str>,
    ) -> Result<Thread, OrcaError>;

    async fn get_thread_by_id(&self, thread_id: &str) -> Result<Option<Thread>, OrcaError>;

    /// Persist messages in order; returns what was stored.
    async fn save_messages(
        &self,
        messages: Vec<StoredMessage>,
        config: Option<&RecallConfig>,
    ) -> Result<Vec<StoredMessage>, OrcaError>;

    /// Prior messages of a thread, oldest first.
    async fn recall_messages(
        &self,
        thread_id: &str,
        config: Option<&RecallConfig>,
        query: &str,
        range: Option<DateRange>,
    ) -> Result<RecallResult, OrcaError>;

    /// A fresh unique message or thread id.
    fn generate_id(&self) -> String;

    async fn threads_for_resource(&self, resource_id: &str) -> Result<Vec<Thread>, OrcaError>;

    /// Replace a thread's title and metadata. The resource id cannot change.
    async fn update_thread(&self, thread: Thread) -> Result<Thread, OrcaError>;

    /// Delete a thread and every message in it.
    async fn delete_thread(&self, thread_id: &str) -> Result<(), OrcaError>;
}
