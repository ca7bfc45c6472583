//! Canonical inference request, options and response

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::message::InferenceMessage;
use super::tool::{FunctionCall, Tool, ToolSelection};

/// Requested structured output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Json,
}

/// Backend-agnostic inference request.
///
/// `tools` is non-empty only when `tool_selection` is `Tool` or `Function`;
/// use [`InferenceRequest::with_tools`] to keep the two in sync.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InferenceRequest {
    pub model: String,
    pub messages: Vec<InferenceMessage>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<Tool>,
    #[serde(default)]
    pub tool_selection: ToolSelection,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_format: Option<OutputFormat>,
}

impl InferenceRequest {
    pub fn new(model: impl Into<String>, messages: Vec<InferenceMessage>) -> Self {
        Self {
            model: model.into(),
            messages,
            tools: Vec::new(),
            tool_selection: ToolSelection::None,
            output_format: None,
        }
    }

    /// Attach tools in the given calling mode. An empty list or `ToolSelection::None`
    /// clears both.
    pub fn with_tools(mut self, selection: ToolSelection, tools: Vec<Tool>) -> Self {
        if selection == ToolSelection::None || tools.is_empty() {
            self.tools = Vec::new();
            self.tool_selection = ToolSelection::None;
        } else {
            self.tools = tools;
            self.tool_selection = selection;
        }
        self
    }

    pub fn with_output_format(mut self, format: OutputFormat) -> Self {
        self.output_format = Some(format);
        self
    }

    pub fn has_tools(&self) -> bool {
        !self.tools.is_empty()
    }
}

/// Sampling options. Unset fields are filled from the model defaults before dispatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InferenceOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_k: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_ctx: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    /// Opaque, driver-specific options merged into the wire request.
    #[serde(default = "empty_object")]
    pub driver_options: serde_json::Value,
}

fn empty_object() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

impl InferenceOptions {
    pub fn new(
        top_p: Option<f64>,
        top_k: Option<i32>,
        num_ctx: Option<i32>,
        temperature: Option<f64>,
    ) -> Self {
        Self {
            top_p,
            top_k,
            num_ctx,
            temperature,
            driver_options: empty_object(),
        }
    }

    /// True when no driver options were supplied (null or `{}`).
    pub fn driver_options_is_empty(&self) -> bool {
        match &self.driver_options {
            serde_json::Value::Null => true,
            serde_json::Value::Object(map) => map.is_empty(),
            _ => false,
        }
    }
}

impl Default for InferenceOptions {
    fn default() -> Self {
        Self::new(None, None, None, None)
    }
}

/// Why the model stopped generating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    Length,
    ToolCalls,
    FunctionCall,
    ContentFilter,
}

impl FinishReason {
    /// Parse a wire finish reason. Unknown or empty values yield `None`.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "stop" => Some(FinishReason::Stop),
            "length" => Some(FinishReason::Length),
            "tool_calls" => Some(FinishReason::ToolCalls),
            "function_call" => Some(FinishReason::FunctionCall),
            "content_filter" => Some(FinishReason::ContentFilter),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FinishReason::Stop => "stop",
            FinishReason::Length => "length",
            FinishReason::ToolCalls => "tool_calls",
            FinishReason::FunctionCall => "function_call",
            FinishReason::ContentFilter => "content_filter",
        }
    }

    /// Finish reason that reports a call in the given calling mode.
    pub fn for_call(selection: ToolSelection) -> Self {
        match selection {
            ToolSelection::Function => FinishReason::FunctionCall,
            _ => FinishReason::ToolCalls,
        }
    }
}

/// Generation statistics. Durations are nanoseconds, as Ollama reports them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InferenceStats {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_duration: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub load_duration: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_eval_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_eval_duration: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eval_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eval_duration: Option<u64>,
}

impl InferenceStats {
    /// Stats carrying only token counts (OpenAI-style usage).
    pub fn from_usage(prompt_tokens: u64, completion_tokens: u64) -> Self {
        Self {
            prompt_eval_count: Some(prompt_tokens),
            eval_count: Some(completion_tokens),
            ..Default::default()
        }
    }

    pub fn prompt_tokens(&self) -> u64 {
        self.prompt_eval_count.unwrap_or(0)
    }

    pub fn completion_tokens(&self) -> u64 {
        self.eval_count.unwrap_or(0)
    }

    pub fn total_tokens(&self) -> u64 {
        self.prompt_tokens() + self.completion_tokens()
    }
}

/// Canonical non-streaming response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InferenceResponse {
    pub id: String,
    pub model: String,
    pub created_at: DateTime<Utc>,
    pub content: String,
    pub finish_reason: Option<FinishReason>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_call: Option<FunctionCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stats: Option<InferenceStats>,
}

impl InferenceResponse {
    pub fn new(model: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            model: model.into(),
            created_at: Utc::now(),
            content: content.into(),
            finish_reason: None,
            function_call: None,
            stats: None,
        }
    }
}
