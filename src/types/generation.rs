//! Generation settings and related enums.

use bon::Builder;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Settings controlling a single model call.
#[derive(Debug, Clone, Builder, Serialize, Deserialize, Default, PartialEq)]
pub struct GenerationSettings {
    pub max_tokens: Option<u32>,
    pub temperature: Option<f64>,
    pub top_p: Option<f64>,
    pub stop_sequences: Option<Vec<String>>,
    pub seed: Option<u64>,
    pub response_format: Option<ResponseFormat>,
}

/// Requested response format.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponseFormat {
    Text,
    JsonSchema {
        schema: serde_json::Value,
        name: String,
    },
}

/// A named JSON Schema for structured output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectSchema {
    pub name: String,
    pub schema: serde_json::Value,
}

impl ObjectSchema {
    pub fn new(name: impl Into<String>, schema: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            schema,
        }
    }

    pub fn response_format(&self) -> ResponseFormat {
        ResponseFormat::JsonSchema {
            schema: self.schema.clone(),
            name: self.name.clone(),
        }
    }
}

/// Shape of the output a turn asks for.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum OutputMode {
    /// Free-form text.
    #[default]
    Text,
    /// A JSON object matching the schema.
    Object(ObjectSchema),
}

impl OutputMode {
    /// Structured output against a JSON Schema.
    pub fn object(name: impl Into<String>, schema: serde_json::Value) -> Self {
        Self::Object(ObjectSchema::new(name, schema))
    }

    pub fn is_text(&self) -> bool {
        matches!(self, Self::Text)
    }
}

/// Why generation finished.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FinishReason {
    Stop,
    Length,
    ToolCalls,
    ContentFilter,
    Error,
}
