//! Optional tool result cache keyed by (thread, tool, argument digest).

use std::collections::HashMap;

use sha2::{Digest, Sha256};
use tokio::sync::RwLock;

/// Cache key for a tool invocation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ToolCacheKey {
    pub thread_id: String,
    pub tool_name: String,
    pub args_digest: String,
}

impl ToolCacheKey {
    pub fn new(thread_id: &str, tool_name: &str, args: &serde_json::Value) -> Self {
        Self {
            thread_id: thread_id.to_string(),
            tool_name: tool_name.to_string(),
            args_digest: argument_digest(args),
        }
    }
}

/// SHA-256 over the canonical JSON encoding of the arguments.
///
/// `serde_json` maps keep keys sorted, so equal argument objects hash equally
/// regardless of the order the model emitted them in.
pub fn argument_digest(args: &serde_json::Value) -> String {
    let canonical = serde_json::to_vec(args).unwrap_or_default();
    format!("{:x}", Sha256::digest(&canonical))
}

/// In-process store of successful tool results.
#[derive(Debug, Default)]
pub struct ToolResultCache {
    entries: RwLock<HashMap<ToolCacheKey, serde_json::Value>>,
}

impl ToolResultCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, key: &ToolCacheKey) -> Option<serde_json::Value> {
        self.entries.read().await.get(key).cloned()
    }

    pub async fn insert(&self, key: ToolCacheKey, value: serde_json::Value) {
        self.entries.write().await.insert(key, value);
    }

    /// Drop every entry recorded for a thread.
    pub async fn evict_thread(&self, thread_id: &str) {
        self.entries
            .write()
            .await
            .retain(|key, _| key.thread_id != thread_id);
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn digest_ignores_key_order() {
        let a: serde_json::Value = serde_json::from_str(r#"{"city":"Paris","unit":"c"}"#).unwrap();
        let b: serde_json::Value = serde_json::from_str(r#"{"unit":"c","city":"Paris"}"#).unwrap();
        assert_eq!(argument_digest(&a), argument_digest(&b));
        assert_ne!(argument_digest(&a), argument_digest(&json!({"city": "Rome"})));
    }

    #[tokio::test]
    async fn evicts_only_the_given_thread() {
        let cache = ToolResultCache::new();
        cache
            .insert(ToolCacheKey::new("t1", "weather", &json!({})), json!(1))
            .await;
        cache
            .insert(ToolCacheKey::new("t2", "weather", &json!({})), json!(2))
            .await;

        cache.evict_thread("t1").await;

        assert_eq!(cache.len().await, 1);
        assert_eq!(
            cache.get(&ToolCacheKey::new("t2", "weather", &json!({}))).await,
            Some(json!(2))
        );
    }
}
