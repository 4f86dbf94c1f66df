//! Single-call model provider seam.
//!
//! Concrete provider adapters live outside this crate; a [`ModelProvider`]
//! answers one model call, and [`StepLoopEngine`](crate::engine::StepLoopEngine)
//! turns it into a multi-step generation engine.

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::error::OrcaError;
use crate::types::{
    AgentToolCall, FinishReason, GenerationSettings, ModelMessage, ResponseFormat,
    TextStreamDelta, Usage,
};

/// A request sent to a model provider.
#[derive(Debug, Clone)]
pub struct ProviderRequest {
    pub messages: Vec<ModelMessage>,
    pub settings: GenerationSettings,
    pub tools: Option<Vec<ToolDefinition>>,
    pub response_format: Option<ResponseFormat>,
}

impl ProviderRequest {
    /// Name of the requested JSON schema, if this is a structured-output call.
    pub fn schema_name(&self) -> Option<&str> {
        match &self.response_format {
            Some(ResponseFormat::JsonSchema { name, .. }) => Some(name.as_str()),
            _ => None,
        }
    }
}

/// Tool definition sent to the provider API.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// Response from a provider.
#[derive(Debug, Clone, Default)]
pub struct ProviderResponse {
    pub text: String,
    pub usage: Usage,
    pub tool_calls: Vec<AgentToolCall>,
    pub finish_reason: Option<FinishReason>,
}

impl ProviderResponse {
    /// Terminal text response.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            finish_reason: Some(FinishReason::Stop),
            ..Default::default()
        }
    }

    /// Response that requests tool calls.
    pub fn tool_calls(calls: Vec<AgentToolCall>) -> Self {
        Self {
            tool_calls: calls,
            finish_reason: Some(FinishReason::ToolCalls),
            ..Default::default()
        }
    }
}

/// Core trait implemented by model providers.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// Provider name (e.g., "openai", "google").
    fn provider_name(&self) -> &str;

    /// The model ID this provider instance serves.
    fn model_id(&self) -> &str;

    /// Generate one response (non-streaming).
    async fn generate_text(&self, request: &ProviderRequest)
        -> Result<ProviderResponse, OrcaError>;

    /// Generate one response as a stream of deltas.
    ///
    /// Tool calls arrive as `ToolCallDelta` events carrying the completed call.
    async fn stream_text(
        &self,
        request: &ProviderRequest,
    ) -> Result<BoxStream<'static, Result<TextStreamDelta, OrcaError>>, OrcaError>;
}
