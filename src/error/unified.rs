//! Error classification.

use serde::{Deserialize, Serialize};

/// Broad error category, used to pick between failing a turn and degrading it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Configuration,
    Engine,
    Persistence,
    Serialization,
    ToolExecution,
    Interrupted,
    Unknown,
}
