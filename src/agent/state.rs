//! Turn lifecycle tracking.

use tracing::{debug, warn};

use crate::types::{Degradation, TurnReport, TurnState};

/// Whether `to` may follow `from` in a turn's lifecycle.
pub fn can_transition(from: TurnState, to: TurnState) -> bool {
    use TurnState::*;
    matches!(
        (from, to),
        (Idle, Preparing)
            | (Preparing, Generating)
            | (Generating, Persisting)
            | (Persisting, Completed)
            | (Preparing | Generating, Cancelled)
    )
}

/// Records the states a turn visits and the degradations it takes.
#[derive(Debug)]
pub struct TurnTracker {
    agent: String,
    run_id: String,
    report: TurnReport,
}

impl TurnTracker {
    pub fn new(agent: &str, run_id: &str) -> Self {
        Self {
            agent: agent.to_string(),
            run_id: run_id.to_string(),
            report: TurnReport::default(),
        }
    }

    /// Continue tracking a turn from an earlier phase's report.
    pub fn resume(agent: &str, run_id: &str, report: TurnReport) -> Self {
        Self {
            agent: agent.to_string(),
            run_id: run_id.to_string(),
            report,
        }
    }

    pub fn state(&self) -> TurnState {
        self.report.current()
    }

    pub fn enter(&mut self, next: TurnState) {
        let current = self.state();
        if !can_transition(current, next) {
            warn!(agent = %self.agent, run_id = %self.run_id, from = %current, to = %next, "unexpected turn transition");
        }
        debug!(agent = %self.agent, run_id = %self.run_id, state = %next, "turn state");
        self.report.states.push(next);
    }

    /// Record a degraded sub-path of the current state.
    pub fn degrade(&mut self, degradation: Degradation) {
        warn!(
            agent = %self.agent,
            run_id = %self.run_id,
            state = %self.state(),
            degradation = ?degradation,
            "turn degraded"
        );
        self.report.degradations.push(degradation);
    }

    pub fn report(&self) -> &TurnReport {
        &self.report
    }

    pub fn into_report(self) -> TurnReport {
        self.report
    }
}
