//! Conversation orchestrator: prepare, generate, persist, notify metrics.

#[allow(clippy::module_inception)]
pub mod agent;
pub mod deps;
pub mod inference;
pub mod locks;
pub mod options;
pub mod persist;
mod prepare;
pub mod sanitize;
pub mod state;
pub mod stream;

pub use agent::{Agent, AgentConfig};
pub use deps::Dependencies;
pub use inference::Inference;
pub use locks::ThreadLocks;
pub use options::{AgentInput, GenerateOptions, StreamOptions};
pub use persist::BatchClock;
pub use sanitize::sanitize_response_messages;
pub use state::{can_transition, TurnTracker};
pub use stream::TurnStream;
