//! OpenAI-compatible chat completions backend (OpenAI, vLLM, llama.cpp server, ...)

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use futures::{stream, StreamExt};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tokio_util::sync::CancellationToken;

use super::{
    ensure_embeddings_enabled, function_definition, merge_driver_options, BackendConfig,
    BackendDriver, BackendOptions, BackendType, EndpointConfig, FragmentStream,
};
use crate::embeddings::{EmbeddingRequest, EmbeddingResponse};
use crate::transport::HttpTransport;
use crate::types::{
    FinishReason, FunctionCall, InferenceOptions, InferenceRequest, InferenceResponse,
    InferenceStats, OutputFormat, ResponseFragment, ToolSelection,
};
use crate::{BoxStream, Error, ErrorContext, Result};

const CHAT_PATH: &str = "/chat/completions";
const EMBEDDINGS_PATH: &str = "/embeddings";

#[derive(Debug)]
pub struct OpenAiDriver {
    name: String,
    options: BackendOptions,
    transport: HttpTransport,
}

impl OpenAiDriver {
    pub fn new(name: impl Into<String>, transport: HttpTransport, options: BackendOptions) -> Self {
        Self {
            name: name.into(),
            options,
            transport,
        }
    }

    pub fn from_config(config: &BackendConfig) -> Result<Self> {
        let endpoint = EndpointConfig::from_backend(config)?;
        Ok(Self::new(
            config.name.clone(),
            endpoint.transport()?,
            config.options.clone(),
        ))
    }

    /// Build the `/chat/completions` body.
    pub fn build_request(
        &self,
        request: &InferenceRequest,
        options: &InferenceOptions,
        stream: bool,
    ) -> Value {
        let messages: Vec<Value> = request
            .messages
            .iter()
            .map(|m| json!({"role": m.role, "content": m.content}))
            .collect();

        let mut body = Map::new();
        body.insert("model".into(), json!(request.model));
        body.insert("messages".into(), Value::Array(messages));
        body.insert("n".into(), json!(1));
        body.insert("stream".into(), json!(stream));
        if stream {
            body.insert("stream_options".into(), json!({"include_usage": true}));
        }
        if let Some(t) = options.temperature {
            body.insert("temperature".into(), json!(t));
        }
        if let Some(p) = options.top_p {
            body.insert("top_p".into(), json!(p));
        }
        if let Some(n) = options.num_ctx {
            body.insert("max_tokens".into(), json!(n));
        }
        if request.output_format == Some(OutputFormat::Json) {
            body.insert("response_format".into(), json!({"type": "json_object"}));
        }

        match request.tool_selection {
            ToolSelection::Tool if request.has_tools() => {
                let tools: Vec<Value> = request
                    .tools
                    .iter()
                    .map(|t| json!({"type": "function", "function": function_definition(t)}))
                    .collect();
                body.insert("tools".into(), Value::Array(tools));
            }
            ToolSelection::Function if request.has_tools() => {
                let functions: Vec<Value> = request.tools.iter().map(function_definition).collect();
                body.insert("functions".into(), Value::Array(functions));
            }
            _ => {}
        }

        merge_driver_options(&mut body, options);
        Value::Object(body)
    }

    /// Translate a `chat.completion` body into the canonical response.
    pub fn parse_response(
        &self,
        body: &Value,
        model: &str,
        selection: ToolSelection,
    ) -> Result<InferenceResponse> {
        let completion: ChatCompletion = serde_json::from_value(body.clone())?;
        if let Some(error) = completion.error {
            return Err(payload_error(&error));
        }
        let choice = completion.choices.into_iter().next().ok_or_else(|| {
            Error::invalid_response_with_context(
                "completion has no choices",
                ErrorContext::new()
                    .with_field_path("choices")
                    .with_source("openai_driver"),
            )
        })?;
        let message = choice.message.unwrap_or_default();

        let function_call = message.function_call();
        let mut finish_reason = choice.finish_reason.as_deref().and_then(FinishReason::parse);
        if function_call.is_some() && finish_reason.is_none() {
            finish_reason = Some(FinishReason::for_call(selection));
        }

        let mut response = InferenceResponse::new(model, message.content.unwrap_or_default());
        response.id = completion.id;
        response.created_at = created_at(completion.created);
        response.finish_reason = finish_reason;
        response.function_call = function_call;
        response.stats = completion
            .usage
            .map(|u| InferenceStats::from_usage(u.prompt_tokens, u.completion_tokens));
        Ok(response)
    }
}

#[async_trait]
impl BackendDriver for OpenAiDriver {
    fn name(&self) -> &str {
        &self.name
    }

    fn backend_type(&self) -> BackendType {
        BackendType::OpenAi
    }

    fn options(&self) -> &BackendOptions {
        &self.options
    }

    async fn run_inference(
        &self,
        cancel: &CancellationToken,
        request: &InferenceRequest,
        options: &InferenceOptions,
    ) -> Result<InferenceResponse> {
        let body = self.build_request(request, options, false);
        let raw: Value = self.transport.post_json(cancel, CHAT_PATH, &body).await?;
        self.parse_response(&raw, &request.model, request.tool_selection)
    }

    fn run_streaming_inference(
        &self,
        cancel: CancellationToken,
        request: &InferenceRequest,
        options: &InferenceOptions,
    ) -> FragmentStream {
        let body = self.build_request(request, options, true);
        let lines = self.transport.post_lines(cancel, CHAT_PATH, body);
        sse_fragments(lines, request.model.clone())
    }

    async fn create_embeddings(
        &self,
        cancel: &CancellationToken,
        request: &EmbeddingRequest,
    ) -> Result<EmbeddingResponse> {
        ensure_embeddings_enabled(&self.name, &self.options)?;
        let body = serde_json::to_value(request)?;
        self.transport.post_json(cancel, EMBEDDINGS_PATH, &body).await
    }
}

/// One SSE line, classified.
#[derive(Debug, PartialEq)]
enum SseFrame {
    Data(String),
    Done,
    Ignore,
}

fn classify_line(line: &str) -> Result<SseFrame> {
    if line.starts_with(':') {
        return Ok(SseFrame::Ignore);
    }
    if let Some(data) = line.strip_prefix("data:") {
        let data = data.trim();
        return Ok(if data == "[DONE]" {
            SseFrame::Done
        } else if data.is_empty() {
            SseFrame::Ignore
        } else {
            SseFrame::Data(data.to_string())
        });
    }
    if ["event:", "id:", "retry:"].iter().any(|p| line.starts_with(p)) {
        return Ok(SseFrame::Ignore);
    }
    Err(Error::invalid_response_with_context(
        "malformed SSE frame",
        ErrorContext::new()
            .with_details(line.chars().take(200).collect::<String>())
            .with_source("openai_driver"),
    ))
}

struct SseState {
    lines: BoxStream<'static, String>,
    model: String,
    finish: Option<FinishReason>,
    stats: Option<InferenceStats>,
    finished: bool,
}

/// Error object embedded in a body or chunk (`{"error": {...}}` or `{"error": "..."}`).
/// A numeric `code` in the HTTP error range is used as the status.
fn payload_error(error: &Value) -> Error {
    let status = error
        .get("code")
        .and_then(Value::as_u64)
        .filter(|c| (400..=599).contains(c))
        .unwrap_or(500) as u16;
    let message = match error {
        Value::String(s) => s.clone(),
        other => other
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| other.to_string()),
    };
    let error_type = error.get("type").and_then(Value::as_str).map(str::to_string);
    Error::Remote {
        status,
        message,
        error_type,
    }
}

/// Turn SSE lines into fragments.
///
/// Content chunks become deltas. The completion marker is the trailing usage
/// chunk (when the backend honours `include_usage`) or `[DONE]`, whichever comes
/// first; a stream that ends after a finish reason without either still
/// completes. Usage seen on any chunk rides on the completion marker. An
/// `error` chunk ends the stream.
fn sse_fragments(lines: BoxStream<'static, String>, model: String) -> FragmentStream {
    let state = SseState {
        lines,
        model,
        finish: None,
        stats: None,
        finished: false,
    };

    let stream = stream::unfold(state, |mut st| async move {
        if st.finished {
            return None;
        }
        loop {
            let line = match st.lines.next().await {
                Some(Ok(line)) => line,
                Some(Err(e)) => {
                    st.finished = true;
                    return Some((Err(e), st));
                }
                None => {
                    st.finished = true;
                    let finish = st.finish?;
                    let done = ResponseFragment::done(st.model.clone(), Some(finish), st.stats.take());
                    return Some((Ok(done), st));
                }
            };

            let data = match classify_line(&line) {
                Ok(SseFrame::Ignore) => continue,
                Ok(SseFrame::Done) => {
                    st.finished = true;
                    let done = ResponseFragment::done(st.model.clone(), st.finish, st.stats.take());
                    return Some((Ok(done), st));
                }
                Ok(SseFrame::Data(data)) => data,
                Err(e) => {
                    st.finished = true;
                    return Some((Err(e), st));
                }
            };

            let chunk: ChatCompletion = match serde_json::from_str(&data) {
                Ok(c) => c,
                Err(e) => {
                    st.finished = true;
                    let err = Error::invalid_response_with_context(
                        format!("unable to decode stream chunk: {}", e),
                        ErrorContext::new()
                            .with_details(data.chars().take(200).collect::<String>())
                            .with_source("openai_driver"),
                    );
                    return Some((Err(err), st));
                }
            };

            if let Some(error) = chunk.error {
                st.finished = true;
                return Some((Err(payload_error(&error)), st));
            }

            let created = created_at(chunk.created);
            if let Some(usage) = chunk.usage {
                st.stats = Some(InferenceStats::from_usage(usage.prompt_tokens, usage.completion_tokens));
            }
            let Some(choice) = chunk.choices.into_iter().next() else {
                if st.stats.is_some() {
                    st.finished = true;
                    let done = ResponseFragment::done(st.model.clone(), st.finish, st.stats.take())
                        .with_id(chunk.id)
                        .with_created_at(created);
                    return Some((Ok(done), st));
                }
                continue;
            };

            if let Some(reason) = choice.finish_reason.as_deref().and_then(FinishReason::parse) {
                st.finish = Some(reason);
            }
            let content = choice
                .delta
                .and_then(|d| d.content)
                .unwrap_or_default();
            if content.is_empty() {
                continue;
            }
            let fragment = ResponseFragment::delta(st.model.clone(), content)
                .with_id(chunk.id)
                .with_created_at(created);
            return Some((Ok(fragment), st));
        }
    });

    Box::pin(stream)
}

fn created_at(unix_secs: Option<i64>) -> DateTime<Utc> {
    unix_secs
        .and_then(|s| Utc.timestamp_opt(s, 0).single())
        .unwrap_or_else(Utc::now)
}

// Wire shapes. Fields are lenient: compatible servers omit or null most of them.

#[derive(Debug, Deserialize)]
struct ChatCompletion {
    #[serde(default)]
    id: String,
    #[serde(default)]
    created: Option<i64>,
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
    #[serde(default)]
    error: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    #[serde(default)]
    message: Option<ChoiceMessage>,
    #[serde(default)]
    delta: Option<ChoiceMessage>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<WireToolCall>>,
    #[serde(default)]
    function_call: Option<WireFunction>,
}

impl ChoiceMessage {
    /// First native tool call, falling back to the legacy `function_call`.
    fn function_call(&self) -> Option<FunctionCall> {
        let wire = self
            .tool_calls
            .as_ref()
            .and_then(|calls| calls.first())
            .map(|c| &c.function)
            .or(self.function_call.as_ref())?;
        if wire.name.is_empty() {
            return None;
        }
        Some(FunctionCall::new(wire.name.clone(), wire.parameters()))
    }
}

#[derive(Debug, Deserialize)]
struct WireToolCall {
    function: WireFunction,
}

#[derive(Debug, Deserialize)]
struct WireFunction {
    #[serde(default)]
    name: String,
    #[serde(default)]
    arguments: Value,
}

impl WireFunction {
    /// `arguments` is a JSON-encoded string on the wire; decode it when possible.
    fn parameters(&self) -> Value {
        match &self.arguments {
            Value::String(s) => serde_json::from_str(s).unwrap_or_else(|_| Value::String(s.clone())),
            other => other.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct Usage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}
