//! The conversation orchestrator.

use std::sync::Arc;

use bon::Builder;
use futures::{FutureExt, StreamExt};
use tracing::{error, info};

use super::deps::Dependencies;
use super::locks::ThreadLocks;
use super::options::{AgentInput, GenerateOptions, StreamOptions};
use super::persist::Persister;
use super::prepare::Prepared;
use super::state::TurnTracker;
use super::stream::TurnStream;
use crate::config::OrcaConfig;
use crate::engine::{
    dispatch, EngineRequest, FinishCallback, GenerationEngine, TurnMode, TurnOutput,
};
use crate::error::OrcaError;
use crate::metrics::Metric;
use crate::tools::{convert_tools, ToolExecutionContext, ToolRegistry};
use crate::types::{GenerationSettings, ModelMessage, TurnResult, TurnState};
use crate::util::TurnGuard;

/// Static configuration of an [`Agent`].
#[derive(Builder)]
pub struct AgentConfig {
    #[builder(into)]
    pub name: String,
    #[builder(into, default)]
    pub instructions: String,
    pub engine: Arc<dyn GenerationEngine>,
    #[builder(default)]
    pub tools: ToolRegistry,
    #[builder(default)]
    pub metrics: Vec<Arc<dyn Metric>>,
    #[builder(default = OrcaConfig::global().clone())]
    pub config: OrcaConfig,
}

/// How a turn's output is delivered.
enum Delivery {
    Blocking,
    Streaming(Option<FinishCallback>),
}

/// Either a finished turn or a live stream.
enum TurnOutcome {
    Complete(TurnResult),
    Stream(TurnStream),
}

/// Persist the streamed result, then hand it to the caller's callback.
fn persisting_callback(persister: Persister, on_finish: Option<FinishCallback>) -> FinishCallback {
    Arc::new(move |result: TurnResult| {
        let persister = persister.clone();
        let on_finish = on_finish.clone();
        async move {
            let result = persister.complete(result).await;
            if let Some(on_finish) = on_finish {
                on_finish(result).await;
            }
        }
        .boxed()
    })
}

/// Runs turns: prepare, generate (possibly multi-step), persist, notify metrics.
///
/// The tool registry, metric list and config are read-only after construction;
/// turns may run concurrently against one agent.
pub struct Agent {
    pub(super) name: String,
    pub(super) instructions: String,
    pub(super) engine: Arc<dyn GenerationEngine>,
    pub(super) tools: ToolRegistry,
    pub(super) metrics: Arc<Vec<Arc<dyn Metric>>>,
    pub(super) config: OrcaConfig,
    pub(super) deps: Arc<Dependencies>,
    pub(super) locks: Arc<ThreadLocks>,
}

impl Agent {
    /// Create an agent without collaborators; memory is off until [`attach`](Self::attach).
    pub fn new(config: AgentConfig) -> Self {
        Self {
            name: config.name,
            instructions: config.instructions,
            engine: config.engine,
            tools: config.tools,
            metrics: Arc::new(config.metrics),
            config: config.config,
            deps: Arc::new(Dependencies::default()),
            locks: Arc::new(ThreadLocks::new()),
        }
    }

    /// Bind the shared dependency bundle.
    pub fn attach(&mut self, deps: Dependencies) {
        info!(agent = %self.name, memory = deps.memory.is_some(), "dependencies attached");
        self.deps = Arc::new(deps);
    }

    pub fn with_dependencies(mut self, deps: Dependencies) -> Self {
        self.attach(deps);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn instructions(&self) -> &str {
        &self.instructions
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    pub fn dependencies(&self) -> &Dependencies {
        &self.deps
    }

    pub fn config(&self) -> &OrcaConfig {
        &self.config
    }

    /// Run a turn to completion.
    pub async fn generate(
        &self,
        input: impl Into<AgentInput>,
        options: GenerateOptions,
    ) -> Result<TurnResult, OrcaError> {
        match self.run_turn(input.into(), options, Delivery::Blocking).await? {
            TurnOutcome::Complete(result) => Ok(result),
            TurnOutcome::Stream(_) => Err(OrcaError::InvalidState(
                "blocking turn produced a stream".into(),
            )),
        }
    }

    /// Run a turn as a stream of events.
    pub async fn stream(
        &self,
        input: impl Into<AgentInput>,
        options: impl Into<StreamOptions>,
    ) -> Result<TurnStream, OrcaError> {
        let StreamOptions { options, on_finish } = options.into();
        match self
            .run_turn(input.into(), options, Delivery::Streaming(on_finish))
            .await?
        {
            TurnOutcome::Stream(stream) => Ok(stream),
            TurnOutcome::Complete(_) => Err(OrcaError::InvalidState(
                "streaming turn completed without a stream".into(),
            )),
        }
    }

    async fn run_turn(
        &self,
        input: AgentInput,
        options: GenerateOptions,
        delivery: Delivery,
    ) -> Result<TurnOutcome, OrcaError> {
        let run_id = options
            .run_id
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let guard = TurnGuard::new(
            options.cancel.clone().unwrap_or_default(),
            options.timeout.or_else(|| self.config.turn_timeout()),
        );
        let mut tracker = TurnTracker::new(&self.name, &run_id);
        let input = input.into_messages();
        let input_text = input
            .iter()
            .map(ModelMessage::content_text)
            .collect::<Vec<_>>()
            .join("\n");

        tracker.enter(TurnState::Preparing);
        let prepared = match guard.check() {
            Ok(()) => self.prepare(input, &options, &run_id, &guard, &mut tracker).await,
            Err(e) => Err(e),
        };
        let prepared = prepared.map_err(|e| self.interrupted(&mut tracker, &guard, e))?;

        let request = self.engine_request(&prepared, &options, &run_id, &guard);
        tracker.enter(TurnState::Generating);
        let persister = Persister {
            agent: self.name.clone(),
            run_id: run_id.clone(),
            thread_id: prepared.thread_id.clone(),
            scope: prepared.scope.clone(),
            recall: prepared.recall.clone(),
            metrics: Arc::clone(&self.metrics),
            input_text,
            locks: Arc::clone(&self.locks),
            guard: guard.clone(),
            clock: prepared.clock.clone(),
            report: tracker.report().clone(),
        };

        let output = options.output.clone();
        let mode = match delivery {
            Delivery::Blocking => TurnMode::blocking(output),
            Delivery::Streaming(on_finish) => TurnMode::streaming(
                output,
                Some(persisting_callback(persister.clone(), on_finish)),
            ),
        };
        info!(
            agent = %self.name,
            run_id = %run_id,
            thread_id = %prepared.thread_id,
            mode = mode.label(),
            step_budget = request.step_budget,
            tools = request.tools.len(),
            "generating"
        );

        let output = guard
            .run(dispatch(self.engine.as_ref(), request, mode))
            .await
            .map_err(|e| self.interrupted(&mut tracker, &guard, e))?;

        match output {
            TurnOutput::Complete(result) => Ok(TurnOutcome::Complete(persister.complete(result).await)),
            TurnOutput::Streaming(events) => {
                let deadline = guard.watch_deadline();
                let classify = guard.clone();
                let events = events
                    .map(move |event| event.map_err(|e| classify.classify(e)))
                    .boxed();
                Ok(TurnOutcome::Stream(TurnStream::new(
                    prepared.thread_id,
                    run_id,
                    events,
                    deadline,
                )))
            }
        }
    }

    /// Assemble the engine request: system prompt, context, history, then input.
    fn engine_request(
        &self,
        prepared: &Prepared,
        options: &GenerateOptions,
        run_id: &str,
        guard: &TurnGuard,
    ) -> EngineRequest {
        let mut messages = Vec::with_capacity(
            1 + options.context.len() + prepared.history.len() + prepared.input.len(),
        );
        messages.push(self.system_prompt());
        messages.extend(options.context.iter().cloned());
        messages.extend(prepared.history.iter().cloned());
        messages.extend(prepared.input.iter().cloned());

        let context = ToolExecutionContext {
            run_id: run_id.to_string(),
            thread_id: (!prepared.thread_id.is_empty()).then(|| prepared.thread_id.clone()),
            resource_id: options.resource_id.clone(),
            dependencies: Some(Arc::clone(&self.deps)),
            cancel: guard.token().clone(),
            ..Default::default()
        };
        let tools = convert_tools(&self.tools, &options.toolsets, &context);

        let settings = GenerationSettings {
            temperature: options.temperature,
            ..Default::default()
        };

        EngineRequest::new(messages)
            .with_run_id(run_id)
            .with_tools(tools)
            .with_step_budget(options.step_budget.unwrap_or(self.config.step_budget))
            .with_settings(settings)
            .with_step_callback(options.on_step_finish.clone())
            .with_cancel(guard.token().clone())
    }

    /// Log a failed turn; a fired guard moves it to `Cancelled`.
    fn interrupted(&self, tracker: &mut TurnTracker, guard: &TurnGuard, e: OrcaError) -> OrcaError {
        if guard.interrupted() {
            tracker.enter(TurnState::Cancelled);
        }
        error!(agent = %self.name, state = %tracker.state(), error = %e, "turn failed");
        e
    }
}
