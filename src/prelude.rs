//! Convenience re-exports for common use.

pub use crate::agent::{
    Agent, AgentConfig, AgentInput, Dependencies, GenerateOptions, StreamOptions, TurnStream,
};
pub use crate::config::OrcaConfig;
#[cfg(feature = "step-loop")]
pub use crate::engine::{StepLoopEngine, ToolErrorPolicy};
pub use crate::engine::{EngineRequest, GenerationEngine, TurnMode};
pub use crate::error::{OrcaError, Result};
#[cfg(feature = "in-memory")]
pub use crate::memory::InMemoryGateway;
pub use crate::memory::{MemoryGateway, RecallConfig, StoredMessage, Thread};
pub use crate::metrics::{Metric, MetricEvaluation, MetricScore};
pub use crate::provider::ModelProvider;
pub use crate::tools::{AgentTool, AgentToolParameters, Tool, ToolArguments, ToolRegistry, Toolset};
pub use crate::types::{
    ContentPart, FinishReason, GenerationSettings, ModelMessage, OutputMode, Role, TurnEvent,
    TurnResult, TurnState, Usage,
};
