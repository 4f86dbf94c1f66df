//! Error types for Orca.

pub mod unified;

pub use unified::ErrorCategory;

use thiserror::Error;

/// Primary error type for all Orca operations.
#[derive(Error, Debug)]
pub enum OrcaError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Engine error: {0}")]
    Engine(String),

    #[error("Provider error: {provider} — {message}")]
    Provider { provider: String, message: String },

    #[error("Memory error: {0}")]
    Memory(String),

    #[error("Thread not found: {0}")]
    ThreadNotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Tool execution error: {tool_name} — {message}")]
    ToolExecution { tool_name: String, message: String },

    #[error("Tool registration error: {0}")]
    ToolRegistration(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error("Stream error: {0}")]
    Stream(String),

    #[error("Timeout after {0}ms")]
    Timeout(u64),

    #[error("Turn canceled")]
    Canceled,

    #[error("Invalid state: {0}")]
    InvalidState(String),
}

impl OrcaError {
    /// Create a tool execution error.
    pub fn tool(tool_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ToolExecution {
            tool_name: tool_name.into(),
            message: message.into(),
        }
    }

    /// Create a memory (persistence) error.
    pub fn memory(message: impl Into<String>) -> Self {
        Self::Memory(message.into())
    }

    /// Classify this error into a category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Configuration(_) => ErrorCategory::Configuration,
            Self::Engine(_) | Self::Provider { .. } | Self::Stream(_) => ErrorCategory::Engine,
            Self::Memory(_) | Self::ThreadNotFound(_) | Self::Io(_) => ErrorCategory::Persistence,
            Self::Serialization(_) => ErrorCategory::Serialization,
            Self::ToolExecution { .. } | Self::ToolRegistration(_) => ErrorCategory::ToolExecution,
            Self::Timeout(_) | Self::Canceled => ErrorCategory::Interrupted,
            _ => ErrorCategory::Unknown,
        }
    }

    /// Whether this is a cancellation or deadline variant.
    ///
    /// Whether it interrupts a turn depends on who raised it; see
    /// [`TurnGuard::interrupted`](crate::util::TurnGuard::interrupted).
    pub fn is_interrupt(&self) -> bool {
        self.category() == ErrorCategory::Interrupted
    }
}

impl From<toml::de::Error> for OrcaError {
    fn from(error: toml::de::Error) -> Self {
        Self::Configuration(error.to_string())
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, OrcaError>;
