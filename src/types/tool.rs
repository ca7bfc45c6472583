//! Tool and function calling definitions

use serde::{Deserialize, Serialize};

/// Tool definition offered to the model.
///
/// `args` is a JSON Schema fragment and is passed through to backends verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tool {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub args: serde_json::Value,
}

impl Tool {
    pub fn new(name: impl Into<String>, args: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            description: None,
            args,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        let description = description.into();
        self.description = if description.is_empty() {
            None
        } else {
            Some(description)
        };
        self
    }
}

/// Which calling convention the caller asked for.
///
/// `Tool` is the modern `tools` API, `Function` the legacy `functions` API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolSelection {
    #[default]
    None,
    Tool,
    Function,
}

/// A call requested by the model, either natively or through prompt emulation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    pub parameters: serde_json::Value,
}

impl FunctionCall {
    pub fn new(name: impl Into<String>, parameters: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            parameters,
        }
    }

    /// Parameters as a JSON string, the form OpenAI-style APIs expect for `arguments`.
    pub fn arguments_string(&self) -> String {
        match &self.parameters {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}
