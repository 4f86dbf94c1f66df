//! Reference engine: drives a single-call [`ModelProvider`] through a bounded
//! generate/tool-call loop.

use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::json;
use tracing::{debug, warn};

use super::object::parse_object;
use super::{EngineRequest, EngineStream, FinishCallback, GenerationEngine};
use crate::error::OrcaError;
use crate::provider::{ModelProvider, ProviderRequest, ProviderResponse, ToolDefinition};
use crate::types::*;

/// What happens when a tool call fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ToolErrorPolicy {
    /// Feed the error back to the model as an error tool result.
    #[default]
    Report,
    /// Fail the turn with the tool's error.
    Abort,
}

/// Bounded step machine.
///
/// The budget is a hard upper bound on model calls. The loop exits as
/// [`LoopExit::Terminal`] when a recorded step issued no tool calls, or as
/// [`LoopExit::BudgetExhausted`] when a step is requested past the budget.
#[derive(Debug, Clone)]
pub struct StepLoop {
    budget: usize,
    taken: usize,
    exit: Option<LoopExit>,
}

impl StepLoop {
    pub fn new(budget: usize) -> Self {
        Self {
            budget: budget.max(1),
            taken: 0,
            exit: None,
        }
    }

    /// Index of the next step to run, or `None` once the loop has exited.
    pub fn next_step(&mut self) -> Option<usize> {
        if self.exit.is_some() {
            return None;
        }
        if self.taken >= self.budget {
            self.exit = Some(LoopExit::BudgetExhausted);
            return None;
        }
        let index = self.taken;
        self.taken += 1;
        Some(index)
    }

    /// Record a finished step (after its tools ran).
    pub fn record(&mut self, step: &GenerationStep) {
        if step.is_terminal() {
            self.exit = Some(LoopExit::Terminal);
        }
    }

    pub fn taken(&self) -> usize {
        self.taken
    }

    pub fn exit(&self) -> Option<LoopExit> {
        self.exit
    }
}

/// [`GenerationEngine`] over any [`ModelProvider`].
pub struct StepLoopEngine {
    provider: Arc<dyn ModelProvider>,
    tool_errors: ToolErrorPolicy,
}

impl StepLoopEngine {
    pub fn new(provider: Arc<dyn ModelProvider>) -> Self {
        Self {
            provider,
            tool_errors: ToolErrorPolicy::default(),
        }
    }

    pub fn with_tool_error_policy(mut self, policy: ToolErrorPolicy) -> Self {
        self.tool_errors = policy;
        self
    }

    pub fn provider(&self) -> &Arc<dyn ModelProvider> {
        &self.provider
    }

    async fn run_blocking(
        &self,
        request: EngineRequest,
        format: Option<ResponseFormat>,
    ) -> Result<TurnResult, OrcaError> {
        let mut run = Run::new(request, format, self.tool_errors);
        while let Some(index) = run.step_loop.next_step() {
            run.check_cancel()?;
            let provider_request = run.provider_request();
            debug!(
                run_id = %run.request.run_id,
                step = index,
                provider = self.provider.provider_name(),
                model = self.provider.model_id(),
                "calling provider"
            );
            let response = tokio::select! {
                biased;
                _ = run.request.cancel.cancelled() => Err(OrcaError::Canceled),
                response = self.provider.generate_text(&provider_request) => response,
            };
            run.complete_step(index, response?).await?;
        }
        run.finish()
    }

    fn run_streaming(
        &self,
        request: EngineRequest,
        format: Option<ResponseFormat>,
        on_finish: Option<FinishCallback>,
    ) -> EngineStream {
        let provider = Arc::clone(&self.provider);
        let policy = self.tool_errors;
        let stream = async_stream::try_stream! {
            let mut run = Run::new(request, format, policy);
            let cancel = run.request.cancel.clone();
            while let Some(index) = run.step_loop.next_step() {
                run.check_cancel()?;
                let provider_request = run.provider_request();
                debug!(run_id = %run.request.run_id, step = index, "streaming from provider");
                let opened = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => Err(OrcaError::Canceled),
                    deltas = provider.stream_text(&provider_request) => deltas,
                };
                let mut deltas = opened?;

                let mut response = ProviderResponse::default();
                loop {
                    let next = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => Err(OrcaError::Canceled),
                        next = deltas.next() => Ok(next),
                    };
                    let Some(delta) = next? else { break };
                    let delta = delta?;
                    match delta.event_type {
                        StreamEventType::TextDelta => {
                            if !delta.text.is_empty() {
                                response.text.push_str(&delta.text);
                                yield TurnEvent::TextDelta { step: index, text: delta.text };
                            }
                        }
                        StreamEventType::ToolCallDelta => {
                            if let Some(call) = delta.tool_call {
                                response.tool_calls.push(call.clone());
                                yield TurnEvent::ToolCall { step: index, call };
                            }
                        }
                        StreamEventType::Done => {
                            if let Some(usage) = delta.usage {
                                response.usage = usage;
                            }
                            response.finish_reason = delta.finish_reason;
                            break;
                        }
                        StreamEventType::Error => {
                            Err::<(), _>(OrcaError::Stream(delta.text))?;
                        }
                        StreamEventType::Start => {}
                    }
                }

                let step = run.complete_step(index, response).await?;
                for result in step.tool_results {
                    yield TurnEvent::ToolResult { step: index, result };
                }
                yield TurnEvent::StepFinished { step: index, finish_reason: step.finish_reason };
            }

            let result = run.finish()?;
            let finish_reason = result.finish_reason;
            let usage = result.usage.clone();
            if let Some(on_finish) = on_finish {
                on_finish(result).await;
            }
            yield TurnEvent::Finished { finish_reason, usage };
        };
        Box::pin(stream)
    }
}

#[async_trait]
impl GenerationEngine for StepLoopEngine {
    async fn generate_text(&self, request: EngineRequest) -> Result<TurnResult, OrcaError> {
        self.run_blocking(request, None).await
    }

    async fn generate_object(
        &self,
        request: EngineRequest,
        schema: &ObjectSchema,
    ) -> Result<TurnResult, OrcaError> {
        self.run_blocking(request, Some(schema.response_format()))
            .await
    }

    async fn stream_text(
        &self,
        request: EngineRequest,
        on_finish: Option<FinishCallback>,
    ) -> Result<EngineStream, OrcaError> {
        Ok(self.run_streaming(request, None, on_finish))
    }

    async fn stream_object(
        &self,
        request: EngineRequest,
        schema: &ObjectSchema,
        on_finish: Option<FinishCallback>,
    ) -> Result<EngineStream, OrcaError> {
        Ok(self.run_streaming(request, Some(schema.response_format()), on_finish))
    }
}

/// State of one engine run.
struct Run {
    request: EngineRequest,
    format: Option<ResponseFormat>,
    policy: ToolErrorPolicy,
    messages: Vec<ModelMessage>,
    tool_defs: Option<Vec<ToolDefinition>>,
    step_loop: StepLoop,
    steps: Vec<GenerationStep>,
    response_messages: Vec<ModelMessage>,
    usage: Usage,
}

impl Run {
    fn new(request: EngineRequest, format: Option<ResponseFormat>, policy: ToolErrorPolicy) -> Self {
        let tool_defs = (!request.tools.is_empty()).then(|| request.tools.definitions());
        Self {
            messages: request.messages.clone(),
            step_loop: StepLoop::new(request.step_budget),
            request,
            format,
            policy,
            tool_defs,
            steps: Vec::new(),
            response_messages: Vec::new(),
            usage: Usage::default(),
        }
    }

    fn check_cancel(&self) -> Result<(), OrcaError> {
        if self.request.cancel.is_cancelled() {
            return Err(OrcaError::Canceled);
        }
        Ok(())
    }

    fn provider_request(&self) -> ProviderRequest {
        let mut settings = self.request.settings.clone();
        if self.format.is_some() {
            settings.response_format = self.format.clone();
        }
        ProviderRequest {
            messages: self.messages.clone(),
            response_format: settings.response_format.clone(),
            settings,
            tools: self.tool_defs.clone(),
        }
    }

    fn push(&mut self, message: ModelMessage) {
        self.messages.push(message.clone());
        self.response_messages.push(message);
    }

    /// Run each call through its binding, in order.
    async fn resolve_tools(
        &self,
        calls: &[AgentToolCall],
    ) -> Result<Vec<AgentToolResult>, OrcaError> {
        let mut results = Vec::with_capacity(calls.len());
        for call in calls {
            self.check_cancel()?;
            let outcome = match self.request.tools.get(&call.name) {
                Some(binding) => binding.execute(call).await,
                None => Err(OrcaError::tool(
                    &call.name,
                    format!("Tool '{}' not found", call.name),
                )),
            };
            let result = match outcome {
                Ok(value) => AgentToolResult {
                    tool_call_id: call.id.clone(),
                    tool_name: call.name.clone(),
                    result: value,
                    is_error: false,
                },
                Err(_) if self.request.cancel.is_cancelled() => return Err(OrcaError::Canceled),
                Err(e) if self.policy == ToolErrorPolicy::Abort => return Err(e),
                Err(e) => {
                    warn!(run_id = %self.request.run_id, tool = %call.name, error = %e, "tool execution failed");
                    AgentToolResult {
                        tool_call_id: call.id.clone(),
                        tool_name: call.name.clone(),
                        result: json!({ "error": e.to_string() }),
                        is_error: true,
                    }
                }
            };
            results.push(result);
        }
        Ok(results)
    }

    /// Fold one provider response (and its tool round) into the run.
    async fn complete_step(
        &mut self,
        index: usize,
        response: ProviderResponse,
    ) -> Result<GenerationStep, OrcaError> {
        self.usage.merge(&response.usage);
        let mut step = GenerationStep {
            index,
            text: response.text,
            tool_calls: response.tool_calls,
            tool_results: Vec::new(),
            usage: response.usage,
            finish_reason: response.finish_reason,
        };

        let mut parts: Vec<ContentPart> = Vec::new();
        if !step.text.is_empty() {
            parts.push(ContentPart::text(step.text.clone()));
        }
        parts.extend(step.tool_calls.iter().cloned().map(ContentPart::ToolCall));
        if !parts.is_empty() {
            self.push(ModelMessage::assistant_parts(parts));
        }

        if !step.tool_calls.is_empty() {
            step.tool_results = self.resolve_tools(&step.tool_calls).await?;
            for result in &step.tool_results {
                self.push(ModelMessage::tool_result(
                    result.tool_call_id.clone(),
                    result.tool_name.clone(),
                    result.result.clone(),
                    result.is_error,
                ));
            }
        }

        self.step_loop.record(&step);
        debug!(
            run_id = %self.request.run_id,
            step = index,
            tool_calls = step.tool_calls.len(),
            terminal = step.is_terminal(),
            "step finished"
        );
        self.request.notify_step(&step);
        self.steps.push(step.clone());
        Ok(step)
    }

    fn finish(self) -> Result<TurnResult, OrcaError> {
        let exit = self.step_loop.exit().unwrap_or(LoopExit::BudgetExhausted);
        if exit == LoopExit::BudgetExhausted {
            debug!(
                run_id = %self.request.run_id,
                steps = self.step_loop.taken(),
                "step budget exhausted without terminal output"
            );
        }
        let last = self.steps.last();
        let text = last.map(|s| s.text.clone()).unwrap_or_default();
        let finish_reason = last.and_then(|s| s.finish_reason);
        let object = match (&self.format, exit) {
            (Some(ResponseFormat::JsonSchema { .. }), LoopExit::Terminal) => {
                Some(parse_object(&text)?)
            }
            _ => None,
        };

        Ok(TurnResult {
            text,
            object,
            tool_calls: self.steps.iter().flat_map(|s| s.tool_calls.clone()).collect(),
            tool_results: self
                .steps
                .iter()
                .flat_map(|s| s.tool_results.clone())
                .collect(),
            usage: self.usage,
            response_messages: self.response_messages,
            finish_reason,
            exit,
            run_id: self.request.run_id,
            steps: self.steps,
            ..Default::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(tool_calls: usize) -> GenerationStep {
        GenerationStep {
            tool_calls: (0..tool_calls)
                .map(|i| AgentToolCall {
                    id: format!("c{i}"),
                    name: "t".into(),
                    arguments: serde_json::json!({}),
                })
                .collect(),
            ..Default::default()
        }
    }

    #[test]
    fn terminal_step_ends_the_loop() {
        let mut lp = StepLoop::new(5);
        assert_eq!(lp.next_step(), Some(0));
        lp.record(&step(1));
        assert_eq!(lp.next_step(), Some(1));
        lp.record(&step(0));
        assert_eq!(lp.next_step(), None);
        assert_eq!(lp.exit(), Some(LoopExit::Terminal));
        assert_eq!(lp.taken(), 2);
    }

    #[test]
    fn budget_is_a_hard_upper_bound() {
        let mut lp = StepLoop::new(2);
        while let Some(_) = lp.next_step() {
            lp.record(&step(1));
        }
        assert_eq!(lp.taken(), 2);
        assert_eq!(lp.exit(), Some(LoopExit::BudgetExhausted));
    }

    #[test]
    fn zero_budget_still_allows_one_step() {
        let mut lp = StepLoop::new(0);
        assert_eq!(lp.next_step(), Some(0));
        assert_eq!(lp.next_step(), None);
    }
}
