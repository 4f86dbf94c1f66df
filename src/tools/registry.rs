//! Typed tool registry: tools are checked once when registered and looked up
//! by name at dispatch time.

use std::collections::BTreeMap;
use std::sync::Arc;

use super::tool::Tool;
use super::validation::validate_schema;
use crate::error::OrcaError;

const MAX_TOOL_NAME_LEN: usize = 64;

/// Named tools available to an agent (or supplied per call as a tool set).
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool, rejecting bad names, malformed schemas and duplicates.
    pub fn register(&mut self, tool: Arc<dyn Tool>) -> Result<(), OrcaError> {
        let name = tool.name();
        check_name(name)?;
        validate_schema(&tool.parameters().schema)
            .map_err(|e| OrcaError::ToolRegistration(format!("tool '{name}': {e}")))?;
        if self.tools.contains_key(name) {
            return Err(OrcaError::ToolRegistration(format!(
                "tool '{name}' is already registered"
            )));
        }
        self.tools.insert(name.to_string(), tool);
        Ok(())
    }

    /// Builder-style [`register`](Self::register).
    pub fn with_tool(mut self, tool: Arc<dyn Tool>) -> Result<Self, OrcaError> {
        self.register(tool)?;
        Ok(self)
    }

    /// Build a registry from a list of tools.
    pub fn from_tools(tools: impl IntoIterator<Item = Arc<dyn Tool>>) -> Result<Self, OrcaError> {
        tools.into_iter().try_fold(Self::new(), Self::with_tool)
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.get(name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(String::as_str).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Arc<dyn Tool>)> {
        self.tools.iter().map(|(name, tool)| (name.as_str(), tool))
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.names())
            .finish()
    }
}

/// A named group of tools supplied for a single call.
///
/// Tool sets are applied in declaration order, so a later set shadows an
/// earlier one (and the agent's registry) on name collision.
#[derive(Debug, Clone)]
pub struct Toolset {
    pub name: String,
    pub tools: ToolRegistry,
}

impl Toolset {
    pub fn new(name: impl Into<String>, tools: ToolRegistry) -> Self {
        Self {
            name: name.into(),
            tools,
        }
    }
}

fn check_name(name: &str) -> Result<(), OrcaError> {
    if name.is_empty() {
        return Err(OrcaError::ToolRegistration("tool name is empty".into()));
    }
    if name.len() > MAX_TOOL_NAME_LEN {
        return Err(OrcaError::ToolRegistration(format!(
            "tool name '{name}' exceeds {MAX_TOOL_NAME_LEN} characters"
        )));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(OrcaError::ToolRegistration(format!(
            "tool name '{name}' may only contain ASCII letters, digits, '_' and '-'"
        )));
    }
    Ok(())
}
