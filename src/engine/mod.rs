//! Generation Engine seam.
//!
//! An engine runs the multi-step generate/tool-call loop for one turn. The
//! orchestrator picks exactly one entry point per turn through [`TurnMode`] and
//! [`dispatch`].

pub mod object;
#[cfg(feature = "step-loop")]
pub mod step_loop;

pub use object::{object_from_result, parse_object};
#[cfg(feature = "step-loop")]
pub use step_loop::{StepLoop, StepLoopEngine, ToolErrorPolicy};

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::stream::BoxStream;
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;

use crate::error::OrcaError;
use crate::tools::ToolSet;
use crate::types::{
    GenerationSettings, GenerationStep, ModelMessage, ObjectSchema, OutputMode, TurnEvent,
    TurnResult,
};

/// Called after every finished step.
pub type StepCallback = Arc<dyn Fn(&GenerationStep) + Send + Sync>;

/// Called once with the materialized result after a stream completes.
pub type FinishCallback = Arc<dyn Fn(TurnResult) -> BoxFuture<'static, ()> + Send + Sync>;

/// Events of a streaming turn.
pub type EngineStream = BoxStream<'static, Result<TurnEvent, OrcaError>>;

/// Everything an engine needs to run one turn.
#[derive(Clone)]
pub struct EngineRequest {
    pub run_id: String,
    pub messages: Vec<ModelMessage>,
    pub tools: ToolSet,
    /// Hard upper bound on model calls; at least 1.
    pub step_budget: usize,
    pub settings: GenerationSettings,
    pub on_step_finish: Option<StepCallback>,
    pub cancel: CancellationToken,
}

impl EngineRequest {
    /// Single-step request without tools.
    pub fn new(messages: Vec<ModelMessage>) -> Self {
        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            messages,
            tools: ToolSet::new(),
            step_budget: 1,
            settings: GenerationSettings::default(),
            on_step_finish: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = run_id.into();
        self
    }

    pub fn with_tools(mut self, tools: ToolSet) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_step_budget(mut self, step_budget: usize) -> Self {
        self.step_budget = step_budget.max(1);
        self
    }

    pub fn with_settings(mut self, settings: GenerationSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_step_callback(mut self, callback: Option<StepCallback>) -> Self {
        self.on_step_finish = callback;
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub(crate) fn notify_step(&self, step: &GenerationStep) {
        if let Some(callback) = &self.on_step_finish {
            callback(step);
        }
    }
}

impl std::fmt::Debug for EngineRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineRequest")
            .field("run_id", &self.run_id)
            .field("messages", &self.messages.len())
            .field("tools", &self.tools.names())
            .field("step_budget", &self.step_budget)
            .field("settings", &self.settings)
            .finish()
    }
}

/// Multi-step generation consumed by the orchestrator.
#[async_trait]
pub trait GenerationEngine: Send + Sync {
    async fn generate_text(&self, request: EngineRequest) -> Result<TurnResult, OrcaError>;

    async fn generate_object(
        &self,
        request: EngineRequest,
        schema: &ObjectSchema,
    ) -> Result<TurnResult, OrcaError>;

    /// Stream a text turn. `on_finish` runs before the final `Finished` event.
    async fn stream_text(
        &self,
        request: EngineRequest,
        on_finish: Option<FinishCallback>,
    ) -> Result<EngineStream, OrcaError>;

    /// Stream a structured-output turn. `on_finish` runs before the final `Finished` event.
    async fn stream_object(
        &self,
        request: EngineRequest,
        schema: &ObjectSchema,
        on_finish: Option<FinishCallback>,
    ) -> Result<EngineStream, OrcaError>;
}

/// Output kind × delivery mode of one turn.
#[derive(Clone)]
pub enum TurnMode {
    GenerateText,
    GenerateObject(ObjectSchema),
    StreamText {
        on_finish: Option<FinishCallback>,
    },
    StreamObject {
        schema: ObjectSchema,
        on_finish: Option<FinishCallback>,
    },
}

impl TurnMode {
    pub fn blocking(output: OutputMode) -> Self {
        match output {
            OutputMode::Text => Self::GenerateText,
            OutputMode::Object(schema) => Self::GenerateObject(schema),
        }
    }

    pub fn streaming(output: OutputMode, on_finish: Option<FinishCallback>) -> Self {
        match output {
            OutputMode::Text => Self::StreamText { on_finish },
            OutputMode::Object(schema) => Self::StreamObject { schema, on_finish },
        }
    }

    pub fn is_streaming(&self) -> bool {
        matches!(self, Self::StreamText { .. } | Self::StreamObject { .. })
    }

    /// Short label used in logs.
    pub fn label(&self) -> &'static str {
        match self {
            Self::GenerateText => "generate_text",
            Self::GenerateObject(_) => "generate_object",
            Self::StreamText { .. } => "stream_text",
            Self::StreamObject { .. } => "stream_object",
        }
    }
}

impl std::fmt::Debug for TurnMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// What a dispatched turn produced.
pub enum TurnOutput {
    Complete(TurnResult),
    Streaming(EngineStream),
}

/// Invoke the one engine entry point matching `mode`.
pub async fn dispatch(
    engine: &dyn GenerationEngine,
    request: EngineRequest,
    mode: TurnMode,
) -> Result<TurnOutput, OrcaError> {
    match mode {
        TurnMode::GenerateText => engine.generate_text(request).await.map(TurnOutput::Complete),
        TurnMode::GenerateObject(schema) => engine
            .generate_object(request, &schema)
            .await
            .map(TurnOutput::Complete),
        TurnMode::StreamText { on_finish } => engine
            .stream_text(request, on_finish)
            .await
            .map(TurnOutput::Streaming),
        TurnMode::StreamObject { schema, on_finish } => engine
            .stream_object(request, &schema, on_finish)
            .await
            .map(TurnOutput::Streaming),
    }
}

/// One structured-output call deserialized into `T`.
pub async fn infer_object<T: DeserializeOwned>(
    engine: &dyn GenerationEngine,
    request: EngineRequest,
    schema: &ObjectSchema,
) -> Result<T, OrcaError> {
    let result = engine.generate_object(request, schema).await?;
    object_from_result(&result)
}
