//! Turn input and per-call options.

use std::time::Duration;

use bon::Builder;
use tokio_util::sync::CancellationToken;

use crate::engine::{FinishCallback, StepCallback};
use crate::memory::RecallConfig;
use crate::tools::Toolset;
use crate::types::{ModelMessage, OutputMode};

/// Raw turn input: a string, several strings, or structured messages.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentInput {
    Text(String),
    Texts(Vec<String>),
    Messages(Vec<ModelMessage>),
}

impl AgentInput {
    /// Normalize to messages; plain strings become user messages.
    pub fn into_messages(self) -> Vec<ModelMessage> {
        match self {
            Self::Text(text) => vec![ModelMessage::user(text)],
            Self::Texts(texts) => texts.into_iter().map(ModelMessage::user).collect(),
            Self::Messages(messages) => messages,
        }
    }
}

impl From<&str> for AgentInput {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<String> for AgentInput {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<Vec<String>> for AgentInput {
    fn from(texts: Vec<String>) -> Self {
        Self::Texts(texts)
    }
}

impl From<Vec<&str>> for AgentInput {
    fn from(texts: Vec<&str>) -> Self {
        Self::Texts(texts.into_iter().map(str::to_string).collect())
    }
}

impl From<ModelMessage> for AgentInput {
    fn from(message: ModelMessage) -> Self {
        Self::Messages(vec![message])
    }
}

impl From<Vec<ModelMessage>> for AgentInput {
    fn from(messages: Vec<ModelMessage>) -> Self {
        Self::Messages(messages)
    }
}

/// Options for one `generate` or `stream` call.
#[derive(Clone, Default, Builder)]
pub struct GenerateOptions {
    #[builder(into)]
    pub thread_id: Option<String>,
    /// Owner of the thread; memory is only used when set.
    #[builder(into)]
    pub resource_id: Option<String>,
    /// Per-call tool sets, applied over the agent's tools in order.
    #[builder(default)]
    pub toolsets: Vec<Toolset>,
    /// Falls back to the agent config (5 unless configured).
    pub step_budget: Option<usize>,
    #[builder(default)]
    pub output: OutputMode,
    pub temperature: Option<f64>,
    pub on_step_finish: Option<StepCallback>,
    /// Defaults to a fresh UUID.
    #[builder(into)]
    pub run_id: Option<String>,
    /// Extra system/context messages placed after the instructions.
    #[builder(default)]
    pub context: Vec<ModelMessage>,
    pub recall: Option<RecallConfig>,
    pub cancel: Option<CancellationToken>,
    /// Wall-clock limit for the turn; falls back to the agent config.
    pub timeout: Option<Duration>,
}

impl std::fmt::Debug for GenerateOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenerateOptions")
            .field("thread_id", &self.thread_id)
            .field("resource_id", &self.resource_id)
            .field(
                "toolsets",
                &self.toolsets.iter().map(|t| t.name.as_str()).collect::<Vec<_>>(),
            )
            .field("step_budget", &self.step_budget)
            .field("output", &self.output)
            .field("temperature", &self.temperature)
            .field("run_id", &self.run_id)
            .field("context", &self.context.len())
            .field("recall", &self.recall)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Options for a streaming call.
#[derive(Clone, Default)]
pub struct StreamOptions {
    pub options: GenerateOptions,
    /// Receives the materialized result once the stream has completed and the
    /// turn's messages were persisted.
    pub on_finish: Option<FinishCallback>,
}

impl StreamOptions {
    pub fn new(options: GenerateOptions) -> Self {
        Self {
            options,
            on_finish: None,
        }
    }

    pub fn on_finish(mut self, callback: FinishCallback) -> Self {
        self.on_finish = Some(callback);
        self
    }
}

impl From<GenerateOptions> for StreamOptions {
    fn from(options: GenerateOptions) -> Self {
        Self::new(options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Role;

    #[test]
    fn plain_strings_become_user_messages() {
        let messages = AgentInput::from(vec!["a", "b"]).into_messages();
        assert_eq!(messages.len(), 2);
        assert!(messages.iter().all(|m| m.role == Role::User));
        assert_eq!(messages[1].text(), "b");
    }

    #[test]
    fn structured_messages_pass_through() {
        let input = AgentInput::from(vec![ModelMessage::system("s"), ModelMessage::user("u")]);
        let messages = input.into_messages();
        assert_eq!(messages[0].role, Role::System);
    }

    #[test]
    fn builder_defaults() {
        let options = GenerateOptions::builder().resource_id("user-1").build();
        assert_eq!(options.resource_id.as_deref(), Some("user-1"));
        assert!(options.output.is_text());
        assert!(options.toolsets.is_empty());
        assert!(options.step_budget.is_none());
    }
}
