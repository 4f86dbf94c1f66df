//! Prepare phase: thread resolution, input persistence and recall.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

use super::agent::Agent;
use super::inference::Inference;
use super::options::GenerateOptions;
use super::persist::{to_stored, BatchClock, ThreadScope};
use super::state::TurnTracker;
use crate::engine::{infer_object, EngineRequest};
use crate::error::OrcaError;
use crate::memory::{DateRange, MemoryGateway, RecallConfig, Thread};
use crate::types::{Degradation, ModelMessage, ObjectSchema, Role};
use crate::util::TurnGuard;

const TITLE_INSTRUCTIONS: &str = "\
- you will generate a short title based on the first message a user begins a conversation with
- ensure it is not more than 80 characters long
- the title should be a summary of the user's message
- do not use quotes or colons";

const CONTEXT_INSTRUCTIONS: &str = "\
Analyze this message to determine if the user is referring to a previous conversation with the LLM.
Identify whether the user wants to reference specific information from that chat or use the previous chat messages as context for the current conversation.
Extract any date ranges mentioned in the user message that could help identify the previous chat. Return dates in ISO format.
If no specific dates are mentioned but time periods are (like \"last week\" or \"past month\"), calculate the appropriate date range.
For the end date, return the date 1 day after the end of the time period.";

/// Output of the prepare phase.
pub(super) struct Prepared {
    /// Resolved thread id; the caller's value (or empty) without memory.
    pub thread_id: String,
    /// Set when the turn runs against a stored thread.
    pub scope: Option<ThreadScope>,
    pub history: Vec<ModelMessage>,
    pub input: Vec<ModelMessage>,
    pub recall: RecallConfig,
    pub clock: BatchClock,
}

impl Prepared {
    fn without_memory(options: &GenerateOptions, input: Vec<ModelMessage>, recall: RecallConfig) -> Self {
        Self {
            thread_id: options.thread_id.clone().unwrap_or_default(),
            scope: None,
            history: Vec::new(),
            input,
            recall,
            clock: BatchClock::default(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct TitleObject {
    title: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ContextWindow {
    uses_context: bool,
    #[serde(default)]
    start_date: Option<String>,
    #[serde(default)]
    end_date: Option<String>,
}

pub(super) fn title_schema(max_chars: usize) -> ObjectSchema {
    ObjectSchema::new(
        "thread_title",
        json!({
            "type": "object",
            "properties": { "title": { "type": "string", "maxLength": max_chars } },
            "required": ["title"]
        }),
    )
}

pub(super) fn context_schema() -> ObjectSchema {
    ObjectSchema::new(
        "context_window",
        json!({
            "type": "object",
            "properties": {
                "usesContext": { "type": "boolean" },
                "startDate": { "type": "string", "format": "date-time" },
                "endDate": { "type": "string", "format": "date-time" }
            },
            "required": ["usesContext"]
        }),
    )
}

/// The last user message, if any.
pub(super) fn most_recent_user_message(messages: &[ModelMessage]) -> Option<&ModelMessage> {
    messages.iter().rev().find(|m| m.role == Role::User)
}

/// Trim quotes and whitespace and cap the length on a char boundary.
pub(super) fn normalize_title(raw: &str, max_chars: usize) -> Option<String> {
    let title: String = raw
        .trim()
        .trim_matches(|c| c == '"' || c == '\'')
        .trim()
        .chars()
        .take(max_chars)
        .collect();
    let title = title.trim_end().to_string();
    (!title.is_empty()).then_some(title)
}

fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(at) = DateTime::parse_from_rfc3339(raw) {
        return Some(at.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|d| d.and_utc())
}

fn date_range(window: ContextWindow) -> Result<Option<DateRange>, OrcaError> {
    if !window.uses_context {
        return Ok(None);
    }
    let (Some(start), Some(end)) = (window.start_date, window.end_date) else {
        return Ok(None);
    };
    match (parse_date(&start), parse_date(&end)) {
        (Some(start), Some(end)) if start < end => Ok(Some(DateRange { start, end })),
        _ => Err(OrcaError::Engine(format!(
            "unusable date range {start:?}..{end:?}"
        ))),
    }
}

/// Run a gateway call under the guard.
///
/// The outer error is the turn's interrupt; the inner result is the gateway's
/// own outcome. A backend's `Timeout` or `Canceled` on a live turn becomes a
/// `Memory` error so the caller degrades instead of aborting.
async fn gateway<T>(
    guard: &TurnGuard,
    call: impl std::future::Future<Output = Result<T, OrcaError>>,
) -> Result<Result<T, OrcaError>, OrcaError> {
    match guard.run(call).await {
        Err(_) if guard.interrupted() => Err(guard.interrupt_error()),
        Err(e) if e.is_interrupt() => Ok(Err(OrcaError::memory(e.to_string()))),
        other => Ok(other),
    }
}

impl Agent {
    /// Resolve the thread, persist the new input and recall history.
    pub(super) async fn prepare(
        &self,
        input: Vec<ModelMessage>,
        options: &GenerateOptions,
        run_id: &str,
        guard: &TurnGuard,
        tracker: &mut TurnTracker,
    ) -> Result<Prepared, OrcaError> {
        let recall = options
            .recall
            .clone()
            .unwrap_or_else(|| self.config.recall_config());
        let (Some(memory), Some(resource_id)) =
            (self.deps.memory.clone(), options.resource_id.as_deref())
        else {
            debug!(agent = %self.name, run_id, "memory not configured, skipping recall");
            return Ok(Prepared::without_memory(options, input, recall));
        };

        let _lock = match options.thread_id.as_deref() {
            Some(id) => Some(guard.run(async { Ok(self.locks.lock(id).await) }).await?),
            None => None,
        };

        let existing = match options.thread_id.as_deref() {
            Some(id) => match gateway(guard, memory.get_thread_by_id(id)).await? {
                Ok(thread) => thread,
                Err(e) => {
                    warn!(agent = %self.name, run_id, thread_id = id, error = %e, "thread lookup failed, creating it");
                    None
                }
            },
            None => None,
        };
        let continuing = existing.is_some();

        let thread = match existing {
            Some(thread) => thread,
            None => {
                debug!(agent = %self.name, run_id, "creating new thread");
                let title = self.infer_title(&input, run_id, guard).await?;
                if let Some(reason) = title.reason() {
                    tracker.degrade(Degradation::Title {
                        reason: reason.to_string(),
                    });
                }
                let created = gateway(
                    guard,
                    memory.create_thread(resource_id, title.value(), options.thread_id.as_deref()),
                )
                .await?;
                match created {
                    Ok(thread) => thread,
                    Err(e) => {
                        tracker.degrade(Degradation::Thread {
                            reason: e.to_string(),
                        });
                        return Ok(Prepared::without_memory(options, input, recall));
                    }
                }
            }
        };

        let mut clock = BatchClock::default();
        let saved_ids = self
            .save_input(&memory, &thread, &input, &recall, &mut clock, guard, tracker)
            .await?;

        let history = if continuing {
            self.recall_history(&memory, &thread, &input, &recall, &saved_ids, run_id, guard, tracker)
                .await?
        } else {
            Vec::new()
        };

        Ok(Prepared {
            thread_id: thread.id.clone(),
            scope: Some(ThreadScope {
                memory,
                thread_id: thread.id,
            }),
            history,
            input,
            recall,
            clock,
        })
    }

    /// Ask the engine for a short thread title.
    async fn infer_title(
        &self,
        input: &[ModelMessage],
        run_id: &str,
        guard: &TurnGuard,
    ) -> Result<Inference<String>, OrcaError> {
        let source: Vec<&ModelMessage> = match most_recent_user_message(input) {
            Some(message) => vec![message],
            None => input.iter().collect(),
        };
        let text = source
            .iter()
            .map(|m| m.content_text())
            .collect::<Vec<_>>()
            .join("\n");
        let default = || self.config.default_title.clone();
        if text.trim().is_empty() {
            return Ok(Inference::Defaulted {
                value: default(),
                reason: "no message to summarize".into(),
            });
        }

        let max_chars = self.config.title_max_chars;
        let request = EngineRequest::new(vec![
            ModelMessage::system(TITLE_INSTRUCTIONS),
            ModelMessage::user(text),
        ])
        .with_run_id(run_id)
        .with_cancel(guard.token().clone());
        let schema = title_schema(max_chars);
        let result = guard
            .run(infer_object::<TitleObject>(self.engine.as_ref(), request, &schema))
            .await
            .and_then(|t| {
                normalize_title(&t.title, max_chars)
                    .ok_or_else(|| OrcaError::Engine("empty title".into()))
            });
        Inference::resolve(result, guard, default)
    }

    /// Ask the engine whether the input refers to an earlier time window.
    async fn infer_date_range(
        &self,
        input: &[ModelMessage],
        run_id: &str,
        guard: &TurnGuard,
    ) -> Result<Inference<Option<DateRange>>, OrcaError> {
        let mut messages = vec![ModelMessage::system(format!(
            "{CONTEXT_INSTRUCTIONS}\nToday's date is {}",
            Utc::now().to_rfc3339()
        ))];
        messages.extend(input.iter().cloned());
        let request = EngineRequest::new(messages)
            .with_run_id(run_id)
            .with_cancel(guard.token().clone());
        let schema = context_schema();
        let result = guard
            .run(infer_object::<ContextWindow>(self.engine.as_ref(), request, &schema))
            .await
            .and_then(date_range);
        Inference::resolve(result, guard, || None)
    }

    #[allow(clippy::too_many_arguments)]
    async fn save_input(
        &self,
        memory: &Arc<dyn MemoryGateway>,
        thread: &Thread,
        input: &[ModelMessage],
        recall: &RecallConfig,
        clock: &mut BatchClock,
        guard: &TurnGuard,
        tracker: &mut TurnTracker,
    ) -> Result<HashSet<String>, OrcaError> {
        let stored: Vec<_> = input
            .iter()
            .map(|m| to_stored(m, &thread.id, memory.generate_id(), clock.tick()))
            .collect();
        let ids: HashSet<String> = stored.iter().map(|m| m.id.clone()).collect();
        match gateway(guard, memory.save_messages(stored, Some(recall))).await? {
            Ok(saved) => {
                debug!(agent = %self.name, thread_id = %thread.id, messages = saved.len(), "saved input messages");
                Ok(ids)
            }
            Err(e) => {
                tracker.degrade(Degradation::Save {
                    reason: e.to_string(),
                });
                Ok(HashSet::new())
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn recall_history(
        &self,
        memory: &Arc<dyn MemoryGateway>,
        thread: &Thread,
        input: &[ModelMessage],
        recall: &RecallConfig,
        saved_ids: &HashSet<String>,
        run_id: &str,
        guard: &TurnGuard,
        tracker: &mut TurnTracker,
    ) -> Result<Vec<ModelMessage>, OrcaError> {
        let range = self.infer_date_range(input, run_id, guard).await?;
        if let Some(reason) = range.reason() {
            tracker.degrade(Degradation::DateRange {
                reason: reason.to_string(),
            });
        }
        let query = most_recent_user_message(input)
            .or_else(|| input.last())
            .map(ModelMessage::content_text)
            .unwrap_or_default();

        let recalled = gateway(
            guard,
            memory.recall_messages(&thread.id, Some(recall), &query, range.into_value()),
        )
        .await?;
        match recalled {
            Ok(result) => Ok(result
                .messages
                .iter()
                .filter(|m| !saved_ids.contains(&m.id))
                .map(|m| m.to_model_message())
                .collect()),
            Err(e) => {
                tracker.degrade(Degradation::Recall {
                    reason: e.to_string(),
                });
                Ok(Vec::new())
            }
        }
    }

    /// Instructions plus today's date.
    pub(super) fn system_prompt(&self) -> ModelMessage {
        let today = Utc::now().format("%Y-%m-%d");
        if self.instructions.trim().is_empty() {
            return ModelMessage::system(format!("Today's date is {today}."));
        }
        ModelMessage::system(format!("{}\n\nToday's date is {today}.", self.instructions))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn titles_are_trimmed_and_capped() {
        assert_eq!(normalize_title("  \"Paris weather\" ", 80).as_deref(), Some("Paris weather"));
        let long = "é".repeat(100);
        assert_eq!(normalize_title(&long, 80).unwrap().chars().count(), 80);
        assert_eq!(normalize_title("  \"\" ", 80), None);
    }

    #[test]
    fn date_ranges_parse_dates_and_timestamps() {
        let window = ContextWindow {
            uses_context: true,
            start_date: Some("2024-03-01".into()),
            end_date: Some("2024-03-08T00:00:00Z".into()),
        };
        let range = date_range(window).unwrap().unwrap();
        assert!(range.start < range.end);

        let unused = ContextWindow {
            uses_context: false,
            start_date: Some("garbage".into()),
            end_date: None,
        };
        assert_eq!(date_range(unused).unwrap(), None);

        let backwards = ContextWindow {
            uses_context: true,
            start_date: Some("2024-03-08".into()),
            end_date: Some("2024-03-01".into()),
        };
        assert!(date_range(backwards).is_err());
    }

    #[test]
    fn most_recent_user_message_skips_other_roles() {
        let messages = vec![
            ModelMessage::user("first"),
            ModelMessage::user("second"),
            ModelMessage::assistant("reply"),
        ];
        assert_eq!(most_recent_user_message(&messages).unwrap().text(), "second");
        assert!(most_recent_user_message(&[ModelMessage::system("s")]).is_none());
    }
}
