//! Metric hooks evaluated after a turn completes.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::OrcaError;

/// What a metric is asked to score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricEvaluation {
    /// Newline-joined content of the turn's input messages.
    pub input: String,
    /// Final text, or the JSON-encoded object for structured turns.
    pub output: String,
    pub run_id: String,
    pub agent_name: String,
    pub metric_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricScore {
    pub score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub info: Option<serde_json::Value>,
}

impl MetricScore {
    pub fn new(score: f64) -> Self {
        Self { score, info: None }
    }
}

/// An evaluator invoked once per completed turn.
#[async_trait]
pub trait Metric: Send + Sync {
    fn name(&self) -> &str;

    async fn evaluate(&self, evaluation: &MetricEvaluation) -> Result<MetricScore, OrcaError>;
}

/// Spawn one evaluation per metric and return without waiting on them.
///
/// Failures are logged; they never reach the turn's caller.
pub fn dispatch(
    metrics: &[Arc<dyn Metric>],
    agent_name: &str,
    run_id: &str,
    input: &str,
    output: &str,
) -> Vec<JoinHandle<()>> {
    metrics
        .iter()
        .map(|metric| {
            let metric = Arc::clone(metric);
            let evaluation = MetricEvaluation {
                input: input.to_string(),
                output: output.to_string(),
                run_id: run_id.to_string(),
                agent_name: agent_name.to_string(),
                metric_name: metric.name().to_string(),
            };
            tokio::spawn(async move {
                match metric.evaluate(&evaluation).await {
                    Ok(score) => debug!(
                        agent = %evaluation.agent_name,
                        run_id = %evaluation.run_id,
                        metric = %evaluation.metric_name,
                        score = score.score,
                        "metric evaluated"
                    ),
                    Err(e) => warn!(
                        agent = %evaluation.agent_name,
                        run_id = %evaluation.run_id,
                        metric = %evaluation.metric_name,
                        error = %e,
                        "metric evaluation failed"
                    ),
                }
            })
        })
        .collect()
}
