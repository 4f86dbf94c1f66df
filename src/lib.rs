//! Orca: a conversational-agent orchestrator.
//!
//! An [`Agent`](agent::Agent) runs turns: it resolves a thread and recalls its
//! history through a [`MemoryGateway`](memory::MemoryGateway), binds tools for
//! the turn, drives a [`GenerationEngine`](engine::GenerationEngine) through a
//! bounded generate/tool-call loop, then sanitizes and persists the exchange and
//! notifies metric hooks. Memory is optional; without it turns run unpersisted.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use orca::prelude::*;
//!
//! # async fn example(provider: Arc<dyn ModelProvider>) -> orca::error::Result<()> {
//! let agent = Agent::new(
//!     AgentConfig::builder()
//!         .name("assistant")
//!         .instructions("You are a helpful assistant.")
//!         .engine(Arc::new(StepLoopEngine::new(provider)))
//!         .build(),
//! )
//! .with_dependencies(Dependencies::new().with_memory(Arc::new(InMemoryGateway::new())));
//!
//! let options = GenerateOptions::builder().resource_id("user-1").build();
//! let result = agent.generate("What's the weather in Paris?", options).await?;
//! println!("{} (thread {})", result.text, result.thread_id);
//! # Ok(())
//! # }
//! ```

pub mod agent;
pub mod config;
pub mod engine;
pub mod error;
pub mod memory;
pub mod metrics;
pub mod prelude;
pub mod provider;
pub mod tools;
pub mod types;
pub mod util;
