//! OpenAI chat completions dialect.
//!
//! Inbound requests accept both the `tools` API and the legacy `functions` API;
//! the outbound message reports a call in the same style the caller used.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::types::{
    FunctionCall, InferenceMessage, InferenceOptions, InferenceRequest, InferenceResponse,
    InferenceStats, OutputFormat, ResponseFragment, Tool, ToolSelection,
};
use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ChatTool>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub functions: Vec<FunctionObject>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<i32>,
    #[serde(default)]
    pub stream: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_format: Option<ResponseFormat>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    #[serde(default)]
    pub content: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatTool {
    #[serde(rename = "type", default = "function_type")]
    pub tool_type: String,
    pub function: FunctionObject,
}

fn function_type() -> String {
    "function".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionObject {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub parameters: Value,
}

impl FunctionObject {
    fn to_tool(&self) -> Tool {
        let tool = Tool::new(self.name.clone(), self.parameters.clone());
        match &self.description {
            Some(d) => tool.with_description(d.clone()),
            None => tool,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseFormat {
    #[serde(rename = "type")]
    pub format_type: String,
}

impl ChatCompletionRequest {
    /// Translate into the canonical request and options.
    ///
    /// `tools` wins over `functions` when both are present. Streaming with
    /// either is rejected.
    pub fn into_canonical(self) -> Result<(InferenceRequest, InferenceOptions)> {
        if self.stream && (!self.tools.is_empty() || !self.functions.is_empty()) {
            return Err(Error::validation(
                "tools and functions are not allowed for streaming responses",
            ));
        }

        let (selection, tools) = if !self.tools.is_empty() {
            (
                ToolSelection::Tool,
                self.tools.iter().map(|t| t.function.to_tool()).collect(),
            )
        } else if !self.functions.is_empty() {
            (
                ToolSelection::Function,
                self.functions.iter().map(FunctionObject::to_tool).collect(),
            )
        } else {
            (ToolSelection::None, Vec::new())
        };

        let messages = self
            .messages
            .into_iter()
            .map(|m| InferenceMessage::new(m.role, m.content.unwrap_or_default()))
            .collect();

        let mut request = InferenceRequest::new(self.model, messages).with_tools(selection, tools);
        if self
            .response_format
            .as_ref()
            .is_some_and(|f| f.format_type == "json_object")
        {
            request = request.with_output_format(OutputFormat::Json);
        }

        let options = InferenceOptions::new(self.top_p, None, self.max_tokens, self.temperature);
        Ok((request, options))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

impl From<&InferenceStats> for CompletionUsage {
    fn from(stats: &InferenceStats) -> Self {
        Self {
            prompt_tokens: stats.prompt_tokens(),
            completion_tokens: stats.completion_tokens(),
            total_tokens: stats.total_tokens(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatCompletionResponse {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub model: String,
    pub choices: Vec<ResponseChoice>,
    pub usage: CompletionUsage,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseChoice {
    pub index: u32,
    pub message: ResponseMessage,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseMessage {
    pub role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_call: Option<FunctionCallOut>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    #[serde(rename = "type")]
    pub call_type: String,
    pub function: FunctionCallOut,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCallOut {
    pub name: String,
    pub arguments: String,
}

impl From<&FunctionCall> for FunctionCallOut {
    fn from(call: &FunctionCall) -> Self {
        Self {
            name: call.name.clone(),
            arguments: call.arguments_string(),
        }
    }
}

impl ChatCompletionResponse {
    pub fn from_inference(response: &InferenceResponse, selection: ToolSelection) -> Self {
        let mut message = ResponseMessage {
            role: "assistant".to_string(),
            content: Some(response.content.clone()),
            tool_calls: None,
            function_call: None,
        };
        if let Some(call) = &response.function_call {
            match selection {
                ToolSelection::Function => message.function_call = Some(call.into()),
                _ => {
                    message.tool_calls = Some(vec![ToolCall {
                        id: format!("call_{}", Uuid::new_v4().simple()),
                        call_type: "function".to_string(),
                        function: call.into(),
                    }])
                }
            }
        }

        Self {
            id: response.id.clone(),
            object: "chat.completion".to_string(),
            created: response.created_at.timestamp(),
            model: response.model.clone(),
            choices: vec![ResponseChoice {
                index: 0,
                message,
                finish_reason: response.finish_reason.map(|f| f.as_str().to_string()),
            }],
            usage: response
                .stats
                .as_ref()
                .map(CompletionUsage::from)
                .unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatCompletionChunk {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub model: String,
    pub choices: Vec<ChunkChoice>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<CompletionUsage>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkChoice {
    pub index: u32,
    pub delta: ChunkDelta,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChunkDelta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

impl ChatCompletionChunk {
    pub fn from_fragment(fragment: &ResponseFragment) -> Self {
        let delta = if fragment.content_delta.is_empty() {
            ChunkDelta::default()
        } else {
            ChunkDelta {
                role: Some("assistant".to_string()),
                content: Some(fragment.content_delta.clone()),
            }
        };
        Self {
            id: fragment.id.clone(),
            object: "chat.completion.chunk".to_string(),
            created: fragment.created_at.timestamp(),
            model: fragment.model.clone(),
            choices: vec![ChunkChoice {
                index: 0,
                delta,
                finish_reason: fragment.finish_reason.map(|f| f.as_str().to_string()),
            }],
            usage: fragment.stats.as_ref().map(CompletionUsage::from),
        }
    }
}
