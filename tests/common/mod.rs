//! Shared test helpers and a scripted provider.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde_json::json;

use orca::agent::{Agent, AgentConfig, Dependencies};
use orca::config::OrcaConfig;
use orca::engine::StepLoopEngine;
use orca::error::OrcaError;
use orca::memory::{
    DateRange, InMemoryGateway, MemoryGateway, RecallConfig, RecallResult, StoredMessage, Thread,
};
use orca::provider::{ModelProvider, ProviderRequest, ProviderResponse};
use orca::tools::{AgentTool, AgentToolParameters, Tool, ToolRegistry};
use orca::types::*;

/// A provider that replays queued responses for the main turn and answers the
/// title and context-window inference calls on its own.
pub struct ScriptedProvider {
    responses: Mutex<VecDeque<ProviderResponse>>,
    requests: Mutex<Vec<ProviderRequest>>,
    /// `None` makes title inference fail.
    title: Mutex<Option<String>>,
    /// `None` makes date-range inference fail.
    context_window: Mutex<Option<serde_json::Value>>,
    delay: Option<Duration>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
            title: Mutex::new(Some("Scripted title".to_string())),
            context_window: Mutex::new(Some(json!({ "usesContext": false }))),
            delay: None,
        }
    }

    /// Sleep this long before answering the main turn.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn set_title(&self, title: &str) {
        *self.title.lock().unwrap() = Some(title.to_string());
    }

    pub fn fail_titles(&self) {
        *self.title.lock().unwrap() = None;
    }

    /// Answer date-range inference with `window`.
    pub fn set_context_window(&self, window: serde_json::Value) {
        *self.context_window.lock().unwrap() = Some(window);
    }

    pub fn fail_context_windows(&self) {
        *self.context_window.lock().unwrap() = None;
    }

    pub fn queue(&self, response: ProviderResponse) {
        self.responses.lock().unwrap().push_back(response);
    }

    /// Queue a text response.
    pub fn queue_text(&self, text: &str) {
        self.queue(ProviderResponse {
            usage: usage(10, 20),
            ..ProviderResponse::text(text)
        });
    }

    /// Queue a response requesting one tool call.
    pub fn queue_tool_call(&self, id: &str, name: &str, args: serde_json::Value) {
        self.queue(ProviderResponse {
            usage: usage(10, 5),
            ..ProviderResponse::tool_calls(vec![call(id, name, args)])
        });
    }

    /// Every request seen so far, inference calls included.
    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Requests that belong to the main turn (not title or context inference).
    pub fn turn_requests(&self) -> Vec<ProviderRequest> {
        self.requests()
            .into_iter()
            .filter(|r| !matches!(r.schema_name(), Some("thread_title" | "context_window")))
            .collect()
    }

    pub fn schema_calls(&self, name: &str) -> usize {
        self.requests()
            .iter()
            .filter(|r| r.schema_name() == Some(name))
            .count()
    }

    fn answer(&self, request: &ProviderRequest) -> Result<Option<ProviderResponse>, OrcaError> {
        self.requests.lock().unwrap().push(request.clone());
        match request.schema_name() {
            Some("thread_title") => match self.title.lock().unwrap().clone() {
                Some(title) => Ok(Some(ProviderResponse::text(
                    json!({ "title": title }).to_string(),
                ))),
                None => Err(OrcaError::Provider {
                    provider: "scripted".into(),
                    message: "title model unavailable".into(),
                }),
            },
            Some("context_window") => match self.context_window.lock().unwrap().clone() {
                Some(window) => Ok(Some(ProviderResponse::text(window.to_string()))),
                None => Err(OrcaError::Provider {
                    provider: "scripted".into(),
                    message: "context model unavailable".into(),
                }),
            },
            _ => Ok(None),
        }
    }

    fn next_response(&self) -> ProviderResponse {
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| ProviderResponse::text("Mock response"))
    }
}

#[async_trait]
impl ModelProvider for ScriptedProvider {
    fn provider_name(&self) -> &str {
        "scripted"
    }

    fn model_id(&self) -> &str {
        "scripted-model"
    }

    async fn generate_text(
        &self,
        request: &ProviderRequest,
    ) -> Result<ProviderResponse, OrcaError> {
        if let Some(response) = self.answer(request)? {
            return Ok(response);
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self.next_response())
    }

    async fn stream_text(
        &self,
        request: &ProviderRequest,
    ) -> Result<BoxStream<'static, Result<TextStreamDelta, OrcaError>>, OrcaError> {
        let response = match self.answer(request)? {
            Some(response) => response,
            None => self.next_response(),
        };
        let delay = self.delay;

        let stream = async_stream::stream! {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            for chunk in response.text.chars().collect::<Vec<_>>().chunks(5) {
                yield Ok(TextStreamDelta::text(chunk.iter().collect::<String>()));
            }
            for call in response.tool_calls {
                yield Ok(TextStreamDelta::tool_call(call));
            }
            yield Ok(TextStreamDelta::done(response.finish_reason, Some(response.usage)));
        };
        Ok(Box::pin(stream))
    }
}

/// An [`InMemoryGateway`] that records recall date ranges and can fail saves.
#[derive(Default)]
pub struct RecordingGateway {
    pub inner: InMemoryGateway,
    ranges: Mutex<Vec<Option<DateRange>>>,
    fail_saves: AtomicBool,
}

impl RecordingGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every `save_messages` call time out.
    pub fn fail_saves(&self) {
        self.fail_saves.store(true, Ordering::SeqCst);
    }

    /// The `range` argument of every recall so far.
    pub fn recall_ranges(&self) -> Vec<Option<DateRange>> {
        self.ranges.lock().unwrap().clone()
    }
}

#[async_trait]
impl MemoryGateway for RecordingGateway {
    async fn create_thread(
        &self,
        resource_id: &str,
        title: &str,
        thread_id: Option<&str>,
    ) -> Result<Thread, OrcaError> {
        self.inner.create_thread(resource_id, title, thread_id).await
    }

    async fn get_thread_by_id(&self, thread_id: &str) -> Result<Option<Thread>, OrcaError> {
        self.inner.get_thread_by_id(thread_id).await
    }

    async fn save_messages(
        &self,
        messages: Vec<StoredMessage>,
        config: Option<&RecallConfig>,
    ) -> Result<Vec<StoredMessage>, OrcaError> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(OrcaError::Timeout(5_000));
        }
        self.inner.save_messages(messages, config).await
    }

    async fn recall_messages(
        &self,
        thread_id: &str,
        config: Option<&RecallConfig>,
        query: &str,
        range: Option<DateRange>,
    ) -> Result<RecallResult, OrcaError> {
        self.ranges.lock().unwrap().push(range);
        self.inner.recall_messages(thread_id, config, query, range).await
    }

    fn generate_id(&self) -> String {
        self.inner.generate_id()
    }

    async fn threads_for_resource(&self, resource_id: &str) -> Result<Vec<Thread>, OrcaError> {
        self.inner.threads_for_resource(resource_id).await
    }

    async fn update_thread(&self, thread: Thread) -> Result<Thread, OrcaError> {
        self.inner.update_thread(thread).await
    }

    async fn delete_thread(&self, thread_id: &str) -> Result<(), OrcaError> {
        self.inner.delete_thread(thread_id).await
    }
}

pub fn usage(input: u32, output: u32) -> Usage {
    Usage {
        input_tokens: input,
        output_tokens: output,
        total_tokens: input + output,
    }
}

pub fn call(id: &str, name: &str, args: serde_json::Value) -> AgentToolCall {
    AgentToolCall {
        id: id.to_string(),
        name: name.to_string(),
        arguments: args,
    }
}

/// A `weather` tool answering `"<city>: sunny"`.
pub fn weather_tool() -> Arc<dyn Tool> {
    labelled_weather_tool("sunny")
}

pub fn labelled_weather_tool(label: &'static str) -> Arc<dyn Tool> {
    Arc::new(AgentTool::new(
        "weather",
        "Current weather for a city",
        AgentToolParameters::object()
            .string("city", "City name", true)
            .build(),
        move |args, _ctx| async move {
            let city = args.get_str("city")?;
            Ok(json!(format!("{city}: {label}")))
        },
    ))
}

pub fn agent_config(provider: &Arc<ScriptedProvider>) -> AgentConfig {
    AgentConfig::builder()
        .name("test-agent")
        .instructions("You are a helpful assistant.")
        .engine(Arc::new(StepLoopEngine::new(provider.clone())))
        .config(OrcaConfig::default())
        .build()
}

/// An agent without memory.
pub fn agent(provider: &Arc<ScriptedProvider>) -> Agent {
    Agent::new(agent_config(provider))
}

/// An agent with the given tools and a memory gateway.
pub fn agent_with_memory<M: MemoryGateway + 'static>(
    provider: &Arc<ScriptedProvider>,
    memory: &Arc<M>,
    tools: ToolRegistry,
) -> Agent {
    let config = AgentConfig::builder()
        .name("test-agent")
        .instructions("You are a helpful assistant.")
        .engine(Arc::new(StepLoopEngine::new(provider.clone())))
        .tools(tools)
        .config(OrcaConfig::default())
        .build();
    Agent::new(config).with_dependencies(Dependencies::new().with_memory(memory.clone()))
}
