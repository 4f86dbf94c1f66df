//! Persist phase: sanitize, store, and notify metrics.

use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use tracing::{debug, error, info};

use super::locks::ThreadLocks;
use super::sanitize::sanitize_response_messages;
use super::state::TurnTracker;
use crate::memory::{MemoryGateway, RecallConfig, StoredMessage};
use crate::metrics::{self, Metric};
use crate::types::{
    ContentPart, Degradation, MessageType, ModelMessage, Role, TurnReport, TurnResult, TurnState,
};
use crate::util::TurnGuard;

/// Strictly increasing timestamps for one turn's writes.
#[derive(Debug, Clone, Default)]
pub struct BatchClock {
    last: Option<DateTime<Utc>>,
}

impl BatchClock {
    pub fn tick(&mut self) -> DateTime<Utc> {
        let now = Utc::now();
        let next = match self.last {
            Some(last) if now <= last => last + TimeDelta::microseconds(1),
            _ => now,
        };
        self.last = Some(next);
        next
    }
}

/// A stored thread a turn reads from and writes to.
#[derive(Clone)]
pub(super) struct ThreadScope {
    pub memory: Arc<dyn MemoryGateway>,
    pub thread_id: String,
}

/// Build the stored form of a message with its derived tool fields.
pub(super) fn to_stored(
    message: &ModelMessage,
    thread_id: &str,
    id: String,
    created_at: DateTime<Utc>,
) -> StoredMessage {
    let mut stored = StoredMessage {
        id,
        thread_id: thread_id.to_string(),
        role: message.role,
        content: message.content.clone(),
        kind: message
            .content
            .first()
            .map(ContentPart::kind)
            .unwrap_or_default(),
        created_at,
        tool_call_ids: None,
        tool_call_args: None,
        tool_names: None,
    };

    match message.role {
        Role::Tool => {
            stored.kind = MessageType::ToolResult;
            stored.tool_call_ids = Some(
                message
                    .tool_results()
                    .iter()
                    .map(|r| r.tool_call_id.clone())
                    .collect(),
            );
        }
        Role::Assistant => {
            let calls = message.tool_calls();
            if !calls.is_empty() {
                stored.tool_call_ids = Some(calls.iter().map(|c| c.id.clone()).collect());
                stored.tool_call_args = Some(calls.iter().map(|c| c.arguments.clone()).collect());
                stored.tool_names = Some(calls.iter().map(|c| c.name.clone()).collect());
            }
        }
        _ => {}
    }
    stored
}

/// Everything the persist phase needs, owned so it can run from a stream's
/// finish callback.
#[derive(Clone)]
pub(super) struct Persister {
    pub agent: String,
    pub run_id: String,
    pub thread_id: String,
    pub scope: Option<ThreadScope>,
    pub recall: RecallConfig,
    pub metrics: Arc<Vec<Arc<dyn Metric>>>,
    /// Newline-joined content of the turn's input.
    pub input_text: String,
    pub locks: Arc<ThreadLocks>,
    pub guard: TurnGuard,
    pub clock: BatchClock,
    /// Report accumulated by the prepare and generate phases.
    pub report: TurnReport,
}

impl Persister {
    /// Persist the turn's response and fire metrics; never fails the turn.
    pub async fn complete(mut self, mut result: TurnResult) -> TurnResult {
        let mut tracker = TurnTracker::resume(&self.agent, &self.run_id, self.report.clone());
        tracker.enter(TurnState::Persisting);

        if let Some(scope) = self.scope.clone() {
            self.save_response(&scope, &result, &mut tracker).await;
        }

        if !self.metrics.is_empty() {
            metrics::dispatch(
                &self.metrics,
                &self.agent,
                &self.run_id,
                &self.input_text,
                &result.output_text(),
            );
        }

        tracker.enter(TurnState::Completed);
        info!(
            agent = %self.agent,
            run_id = %self.run_id,
            thread_id = %self.thread_id,
            steps = result.steps.len(),
            budget_exhausted = result.budget_exhausted(),
            "turn completed"
        );
        result.thread_id = self.thread_id;
        result.run_id = self.run_id;
        result.report = tracker.into_report();
        result
    }

    async fn save_response(
        &mut self,
        scope: &ThreadScope,
        result: &TurnResult,
        tracker: &mut TurnTracker,
    ) {
        let sanitized = sanitize_response_messages(&result.response_messages);
        let mut stored = Vec::with_capacity(sanitized.len());
        for message in &sanitized {
            stored.push(to_stored(
                message,
                &scope.thread_id,
                scope.memory.generate_id(),
                self.clock.tick(),
            ));
        }
        let count = stored.len();

        let saved = self
            .guard
            .run(async {
                let _lock = self.locks.lock(&scope.thread_id).await;
                scope.memory.save_messages(stored, Some(&self.recall)).await
            })
            .await;
        match saved {
            Ok(_) => debug!(
                agent = %self.agent,
                run_id = %self.run_id,
                thread_id = %scope.thread_id,
                messages = count,
                "saved response messages"
            ),
            Err(e) => {
                error!(
                    agent = %self.agent,
                    run_id = %self.run_id,
                    thread_id = %scope.thread_id,
                    error = %e,
                    "failed to save response messages"
                );
                tracker.degrade(Degradation::Save {
                    reason: e.to_string(),
                });
            }
        }
    }
}
