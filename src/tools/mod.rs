//! Tool system: definitions, registry, and turn-scoped bindings.

pub mod arguments;
pub mod binding;
pub mod cache;
pub mod registry;
pub mod tool;
pub mod types;
pub mod validation;

pub use arguments::ToolArguments;
pub use binding::{convert_tools, ToolBinding, ToolSet};
pub use cache::{ToolCacheKey, ToolResultCache};
pub use registry::{ToolRegistry, Toolset};
pub use tool::{AgentTool, Tool, ToolExecutionContext};
pub use types::AgentToolParameters;
