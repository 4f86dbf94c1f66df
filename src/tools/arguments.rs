//! Typed access to tool call arguments.

use crate::error::OrcaError;

/// Wrapper around tool call arguments providing typed extraction.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolArguments {
    value: serde_json::Value,
}

impl ToolArguments {
    pub fn new(value: serde_json::Value) -> Self {
        Self { value }
    }

    /// Get the raw JSON value.
    pub fn raw(&self) -> &serde_json::Value {
        &self.value
    }

    fn missing(kind: &str, key: &str) -> OrcaError {
        OrcaError::InvalidArgument(format!("Missing {kind} argument: {key}"))
    }

    /// Get a string argument by key.
    pub fn get_str(&self, key: &str) -> Result<&str, OrcaError> {
        self.get_str_opt(key).ok_or_else(|| Self::missing("string", key))
    }

    /// Get an optional string argument.
    pub fn get_str_opt(&self, key: &str) -> Option<&str> {
        self.value.get(key).and_then(|v| v.as_str())
    }

    /// Get an integer argument.
    pub fn get_i64(&self, key: &str) -> Result<i64, OrcaError> {
        self.value
            .get(key)
            .and_then(|v| v.as_i64())
            .ok_or_else(|| Self::missing("integer", key))
    }

    /// Get a float argument.
    pub fn get_f64(&self, key: &str) -> Result<f64, OrcaError> {
        self.value
            .get(key)
            .and_then(|v| v.as_f64())
            .ok_or_else(|| Self::missing("float", key))
    }

    /// Get a boolean argument.
    pub fn get_bool(&self, key: &str) -> Result<bool, OrcaError> {
        self.value
            .get(key)
            .and_then(|v| v.as_bool())
            .ok_or_else(|| Self::missing("boolean", key))
    }

    /// Deserialize the entire arguments into a typed struct.
    ///
    /// Providers sometimes send arguments as a JSON-encoded string; those are
    /// decoded first, and an empty string is treated as `{}`.
    pub fn deserialize<T: serde::de::DeserializeOwned>(&self) -> Result<T, OrcaError> {
        let value = match &self.value {
            serde_json::Value::String(raw) if raw.trim().is_empty() => serde_json::json!({}),
            serde_json::Value::String(raw) => serde_json::from_str(raw.trim()).map_err(|e| {
                OrcaError::InvalidArgument(format!("Failed to deserialize arguments: {e}"))
            })?,
            other => other.clone(),
        };
        serde_json::from_value(value)
            .map_err(|e| OrcaError::InvalidArgument(format!("Failed to deserialize arguments: {e}")))
    }
}

impl From<serde_json::Value> for ToolArguments {
    fn from(value: serde_json::Value) -> Self {
        Self::new(value)
    }
}
