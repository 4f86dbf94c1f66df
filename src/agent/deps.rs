//! Shared collaborators attached to an agent.

use std::sync::Arc;

use crate::memory::MemoryGateway;
use crate::tools::ToolResultCache;

/// Dependency bundle handed to the orchestrator and, through the tool
/// context, to every tool call.
#[derive(Clone, Default)]
pub struct Dependencies {
    pub memory: Option<Arc<dyn MemoryGateway>>,
    pub tool_cache: Option<Arc<ToolResultCache>>,
}

impl Dependencies {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_memory(mut self, memory: Arc<dyn MemoryGateway>) -> Self {
        self.memory = Some(memory);
        self
    }

    pub fn with_tool_cache(mut self, cache: Arc<ToolResultCache>) -> Self {
        self.tool_cache = Some(cache);
        self
    }
}

impl std::fmt::Debug for Dependencies {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dependencies")
            .field("memory", &self.memory.as_ref().map(|_| ".."))
            .field("tool_cache", &self.tool_cache)
            .finish()
    }
}
