//! Turn-scoped tool bindings and the conversion that builds them.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::debug;

use super::arguments::ToolArguments;
use super::cache::ToolCacheKey;
use super::registry::{ToolRegistry, Toolset};
use super::tool::{Tool, ToolExecutionContext};
use super::validation::validate_arguments;
use crate::error::OrcaError;
use crate::provider::ToolDefinition;
use crate::types::AgentToolCall;

/// A tool bound to one turn's context.
#[derive(Clone)]
pub struct ToolBinding {
    tool: Arc<dyn Tool>,
    context: ToolExecutionContext,
}

impl ToolBinding {
    pub fn new(tool: Arc<dyn Tool>, context: ToolExecutionContext) -> Self {
        Self { tool, context }
    }

    pub fn name(&self) -> &str {
        self.tool.name()
    }

    pub fn description(&self) -> &str {
        self.tool.description()
    }

    pub fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.tool.name().to_string(),
            description: self.tool.description().to_string(),
            parameters: self.tool.parameters().schema.clone(),
        }
    }

    /// Validate the call's arguments and run the tool.
    ///
    /// Cacheable tools consult the dependency bundle's result cache first when
    /// the turn has a thread. Execution races the turn's cancellation token.
    pub async fn execute(&self, call: &AgentToolCall) -> Result<serde_json::Value, OrcaError> {
        let name = self.tool.name();
        let args: serde_json::Value = ToolArguments::new(call.arguments.clone())
            .deserialize()
            .map_err(|e| OrcaError::tool(name, e.to_string()))?;
        validate_arguments(&args, &self.tool.parameters().schema)
            .map_err(|e| OrcaError::tool(name, format!("invalid arguments: {e}")))?;

        let ctx = self.context.for_call(&call.id, name);
        let cache = ctx
            .dependencies
            .as_ref()
            .and_then(|deps| deps.tool_cache.clone())
            .filter(|_| self.tool.cacheable());
        let cache_key = match (&cache, &ctx.thread_id) {
            (Some(_), Some(thread_id)) => Some(ToolCacheKey::new(thread_id, name, &args)),
            _ => None,
        };

        if let (Some(cache), Some(key)) = (&cache, &cache_key) {
            if let Some(hit) = cache.get(key).await {
                debug!(run_id = %ctx.run_id, tool = name, "tool result served from cache");
                return Ok(hit);
            }
        }

        let arguments = ToolArguments::new(args);
        let result = tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => return Err(OrcaError::Canceled),
            result = self.tool.execute(&arguments, &ctx) => result,
        };
        // A tool's own timeout is a tool failure; only the turn's token cancels.
        let value = result.map_err(|e| match e {
            OrcaError::ToolExecution { .. } => e,
            _ if ctx.cancel.is_cancelled() => OrcaError::Canceled,
            other => OrcaError::tool(name, other.to_string()),
        })?;

        if let (Some(cache), Some(key)) = (cache, cache_key) {
            cache.insert(key, value.clone()).await;
        }
        Ok(value)
    }
}

impl std::fmt::Debug for ToolBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolBinding")
            .field("name", &self.tool.name())
            .finish()
    }
}

/// The flat name → binding map exposed to the engine for one turn.
#[derive(Debug, Clone, Default)]
pub struct ToolSet {
    bindings: BTreeMap<String, ToolBinding>,
}

impl ToolSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a binding, replacing any binding with the same name.
    pub fn insert(&mut self, binding: ToolBinding) -> Option<ToolBinding> {
        self.bindings.insert(binding.name().to_string(), binding)
    }

    pub fn get(&self, name: &str) -> Option<&ToolBinding> {
        self.bindings.get(name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.bindings.keys().map(String::as_str).collect()
    }

    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.bindings.values().map(ToolBinding::definition).collect()
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

/// Bind the registry and the per-call tool sets to a turn.
///
/// Registry tools go in first, then each tool set in declaration order, so the
/// last declaration of a name wins.
pub fn convert_tools(
    registry: &ToolRegistry,
    toolsets: &[Toolset],
    context: &ToolExecutionContext,
) -> ToolSet {
    let mut set = ToolSet::new();
    for (_, tool) in registry.iter() {
        set.insert(ToolBinding::new(Arc::clone(tool), context.clone()));
    }

    if !toolsets.is_empty() {
        let names: Vec<&str> = toolsets.iter().map(|t| t.name.as_str()).collect();
        debug!(run_id = %context.run_id, toolsets = ?names, "adding tools from toolsets");
    }
    for toolset in toolsets {
        for (name, tool) in toolset.tools.iter() {
            if set.insert(ToolBinding::new(Arc::clone(tool), context.clone())).is_some() {
                debug!(run_id = %context.run_id, tool = name, toolset = %toolset.name, "tool shadowed");
            }
        }
    }
    set
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::{AgentTool, AgentToolParameters};
    use serde_json::json;

    fn tagged(name: &str, tag: &'static str) -> Arc<dyn Tool> {
        Arc::new(AgentTool::new(
            name,
            tag,
            AgentToolParameters::object().string("q", "query", true).build(),
            move |_args, _ctx| async move { Ok(json!(tag)) },
        ))
    }

    fn call(name: &str, args: serde_json::Value) -> AgentToolCall {
        AgentToolCall {
            id: "call-1".into(),
            name: name.into(),
            arguments: args,
        }
    }

    #[tokio::test]
    async fn later_toolsets_shadow_registry_and_earlier_sets() {
        let registry = ToolRegistry::from_tools([tagged("search", "registry")]).unwrap();
        let toolsets = vec![
            Toolset::new("first", ToolRegistry::from_tools([tagged("search", "first")]).unwrap()),
            Toolset::new("second", ToolRegistry::from_tools([tagged("search", "second")]).unwrap()),
        ];

        let set = convert_tools(&registry, &toolsets, &ToolExecutionContext::default());

        assert_eq!(set.len(), 1);
        let result = set
            .get("search")
            .unwrap()
            .execute(&call("search", json!({"q": "x"})))
            .await
            .unwrap();
        assert_eq!(result, json!("second"));
    }

    #[tokio::test]
    async fn rejects_arguments_that_fail_the_schema() {
        let registry = ToolRegistry::from_tools([tagged("search", "registry")]).unwrap();
        let set = convert_tools(&registry, &[], &ToolExecutionContext::default());

        let err = set
            .get("search")
            .unwrap()
            .execute(&call("search", json!({})))
            .await
            .unwrap_err();

        assert!(matches!(err, OrcaError::ToolExecution { .. }));
        assert!(err.to_string().contains("missing required field 'q'"));
    }

    #[tokio::test]
    async fn accepts_string_encoded_arguments() {
        let registry = ToolRegistry::from_tools([tagged("search", "registry")]).unwrap();
        let set = convert_tools(&registry, &[], &ToolExecutionContext::default());

        let result = set
            .get("search")
            .unwrap()
            .execute(&call("search", json!("{\"q\": \"rust\"}")))
            .await
            .unwrap();

        assert_eq!(result, json!("registry"));
    }

    #[tokio::test]
    async fn canceled_turn_stops_tool_execution() {
        let slow: Arc<dyn Tool> = Arc::new(AgentTool::new(
            "slow",
            "never finishes",
            AgentToolParameters::empty(),
            |_args, _ctx| async {
                futures::future::pending::<()>().await;
                Ok(json!(null))
            },
        ));
        let registry = ToolRegistry::from_tools([slow]).unwrap();
        let ctx = ToolExecutionContext::default();
        ctx.cancel.cancel();
        let set = convert_tools(&registry, &[], &ctx);

        let err = set
            .get("slow")
            .unwrap()
            .execute(&call("slow", json!({})))
            .await
            .unwrap_err();

        assert!(matches!(err, OrcaError::Canceled));
    }

    #[tokio::test]
    async fn tool_timeouts_are_tool_failures() {
        let flaky: Arc<dyn Tool> = Arc::new(AgentTool::new(
            "flaky",
            "upstream times out",
            AgentToolParameters::empty(),
            |_args, _ctx| async { Err(OrcaError::Timeout(1_000)) },
        ));
        let registry = ToolRegistry::from_tools([flaky]).unwrap();
        let set = convert_tools(&registry, &[], &ToolExecutionContext::default());

        let err = set
            .get("flaky")
            .unwrap()
            .execute(&call("flaky", json!({})))
            .await
            .unwrap_err();

        assert!(matches!(err, OrcaError::ToolExecution { ref tool_name, .. } if tool_name == "flaky"));
    }
}
