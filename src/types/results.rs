//! Turn result types.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use super::generation::FinishReason;
use super::message::{AgentToolCall, AgentToolResult, ModelMessage};
use super::usage::Usage;

/// Result of one turn: the engine's raw output plus the orchestrator's bookkeeping.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TurnResult {
    /// Final text (or the last step's text when the step budget ran out).
    pub text: String,
    /// Parsed object for structured-output turns.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object: Option<serde_json::Value>,
    /// Every tool call issued across all steps.
    pub tool_calls: Vec<AgentToolCall>,
    /// Every tool result produced across all steps.
    pub tool_results: Vec<AgentToolResult>,
    /// Aggregated usage across all steps.
    pub usage: Usage,
    /// Per-step snapshots.
    pub steps: Vec<GenerationStep>,
    /// Messages produced by the model and tools during this turn, in order.
    pub response_messages: Vec<ModelMessage>,
    /// Why the final step finished.
    pub finish_reason: Option<FinishReason>,
    /// How the step loop ended.
    pub exit: LoopExit,
    /// Thread the turn ran against (empty when memory is not configured).
    pub thread_id: String,
    /// Run identifier shared with tools and metrics.
    pub run_id: String,
    /// States visited and degradations taken.
    pub report: TurnReport,
}

impl TurnResult {
    /// Text handed to metrics: the final text, or the JSON-encoded object.
    pub fn output_text(&self) -> String {
        match &self.object {
            Some(object) => serde_json::to_string(object).unwrap_or_default(),
            None => self.text.clone(),
        }
    }

    /// Whether the step budget ran out before terminal output.
    pub fn budget_exhausted(&self) -> bool {
        self.exit == LoopExit::BudgetExhausted
    }
}

/// A single generation step (one model call plus its tool round).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenerationStep {
    /// Zero-based position within the turn.
    pub index: usize,
    /// Text generated in this step.
    pub text: String,
    /// Tool calls made in this step, if any.
    pub tool_calls: Vec<AgentToolCall>,
    /// Tool results returned in this step, if any.
    pub tool_results: Vec<AgentToolResult>,
    /// Token usage for this step.
    pub usage: Usage,
    /// Finish reason for this step.
    pub finish_reason: Option<FinishReason>,
}

impl GenerationStep {
    /// A step is terminal when it issued no tool calls.
    pub fn is_terminal(&self) -> bool {
        self.tool_calls.is_empty()
    }
}

/// How a step loop ended.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopExit {
    /// A step produced terminal output.
    #[default]
    Terminal,
    /// The step budget was consumed while tool calls were still pending.
    BudgetExhausted,
}

/// Lifecycle state of a turn.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TurnState {
    #[default]
    Idle,
    Preparing,
    Generating,
    Persisting,
    Completed,
    Cancelled,
}

/// A best-effort step that fell back to its default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Degradation {
    /// Title inference failed; the default title was used.
    Title { reason: String },
    /// Date-range inference failed; recall ran undated.
    DateRange { reason: String },
    /// Thread lookup or creation failed; the turn ran without memory.
    Thread { reason: String },
    /// Recall failed; the turn ran without history.
    Recall { reason: String },
    /// Persisting input or response messages failed.
    Save { reason: String },
}

/// Record of the states a turn visited and the degraded paths it took.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TurnReport {
    pub states: Vec<TurnState>,
    pub degradations: Vec<Degradation>,
}

impl TurnReport {
    pub fn is_degraded(&self) -> bool {
        !self.degradations.is_empty()
    }

    /// The most recent state, `Idle` before the turn starts.
    pub fn current(&self) -> TurnState {
        self.states.last().copied().unwrap_or_default()
    }
}
