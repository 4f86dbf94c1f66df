//! Handle returned by a streaming turn.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::{Stream, StreamExt};
use tokio::task::JoinHandle;

use crate::engine::EngineStream;
use crate::error::OrcaError;
use crate::types::TurnEvent;

/// Events of a streaming turn, tagged with the turn's identifiers.
///
/// The turn's messages are persisted (and the finish callback invoked) before
/// the final [`TurnEvent::Finished`] is yielded.
pub struct TurnStream {
    thread_id: String,
    run_id: String,
    events: EngineStream,
    deadline: Option<JoinHandle<()>>,
}

impl TurnStream {
    pub(super) fn new(
        thread_id: String,
        run_id: String,
        events: EngineStream,
        deadline: Option<JoinHandle<()>>,
    ) -> Self {
        Self {
            thread_id,
            run_id,
            events,
            deadline,
        }
    }

    pub fn thread_id(&self) -> &str {
        &self.thread_id
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Drain the stream, returning every event or the first error.
    pub async fn collect_events(mut self) -> Result<Vec<TurnEvent>, OrcaError> {
        let mut events = Vec::new();
        while let Some(event) = self.next().await {
            events.push(event?);
        }
        Ok(events)
    }

    /// Concatenated text deltas of the whole turn.
    pub async fn text(self) -> Result<String, OrcaError> {
        let events = self.collect_events().await?;
        Ok(events
            .into_iter()
            .filter_map(|e| match e {
                TurnEvent::TextDelta { text, .. } => Some(text),
                _ => None,
            })
            .collect())
    }
}

impl Stream for TurnStream {
    type Item = Result<TurnEvent, OrcaError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.events.poll_next_unpin(cx)
    }
}

impl Drop for TurnStream {
    fn drop(&mut self) {
        if let Some(deadline) = self.deadline.take() {
            deadline.abort();
        }
    }
}

impl std::fmt::Debug for TurnStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TurnStream")
            .field("thread_id", &self.thread_id)
            .field("run_id", &self.run_id)
            .finish()
    }
}
