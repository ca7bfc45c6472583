//! Ollama native API backend (`/api/chat`, `/api/embed`)

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::{stream, StreamExt};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tokio_util::sync::CancellationToken;

use super::{
    ensure_embeddings_enabled, function_definition, merge_driver_options, BackendConfig,
    BackendDriver, BackendOptions, BackendType, EndpointConfig, FragmentStream,
};
use crate::embeddings::{EmbeddingRequest, EmbeddingResponse, EmbeddingUsage};
use crate::transport::HttpTransport;
use crate::types::{
    FinishReason, FunctionCall, InferenceOptions, InferenceRequest, InferenceResponse,
    InferenceStats, OutputFormat, ResponseFragment, ToolSelection,
};
use crate::{BoxStream, Error, ErrorContext, Result};

const CHAT_PATH: &str = "/api/chat";
const EMBED_PATH: &str = "/api/embed";

#[derive(Debug)]
pub struct OllamaDriver {
    name: String,
    options: BackendOptions,
    transport: HttpTransport,
}

impl OllamaDriver {
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

    /// Build the `/api/chat` body. Sampling options go into the `options` bag.
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

        let mut bag = Map::new();
        if let Some(n) = options.num_ctx {
            bag.insert("num_ctx".into(), json!(n));
        }
        if let Some(t) = options.temperature {
            bag.insert("temperature".into(), json!(t));
        }
        if let Some(k) = options.top_k {
            bag.insert("top_k".into(), json!(k));
        }
        if let Some(p) = options.top_p {
            bag.insert("top_p".into(), json!(p));
        }
        merge_driver_options(&mut bag, options);

        let mut body = Map::new();
        body.insert("model".into(), json!(request.model));
        body.insert("messages".into(), Value::Array(messages));
        body.insert("stream".into(), json!(stream));
        if !bag.is_empty() {
            body.insert("options".into(), Value::Object(bag));
        }
        if request.output_format == Some(OutputFormat::Json) {
            body.insert("format".into(), json!("json"));
        }
        if request.has_tools() {
            let tools: Vec<Value> = request
                .tools
                .iter()
                .map(|t| json!({"type": "function", "function": function_definition(t)}))
                .collect();
            body.insert("tools".into(), Value::Array(tools));
        }
        Value::Object(body)
    }

    pub fn parse_response(
        &self,
        body: &Value,
        model: &str,
        selection: ToolSelection,
    ) -> Result<InferenceResponse> {
        let chat: ChatResponse = serde_json::from_value(body.clone())?;
        if let Some(message) = chat.error {
            return Err(stream_error(message));
        }
        let function_call = chat.message.as_ref().and_then(|m| m.function_call());
        let finish_reason = if function_call.is_some() {
            FinishReason::for_call(selection)
        } else {
            chat.finish_reason()
        };

        let mut response = InferenceResponse::new(model, chat.content());
        response.created_at = chat.created_at.unwrap_or_else(Utc::now);
        response.finish_reason = Some(finish_reason);
        response.function_call = function_call;
        response.stats = Some(chat.stats());
        Ok(response)
    }
}

#[async_trait]
impl BackendDriver for OllamaDriver {
    fn name(&self) -> &str {
        &self.name
    }

    fn backend_type(&self) -> BackendType {
        BackendType::Ollama
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
        ndjson_fragments(lines, request.model.clone())
    }

    async fn create_embeddings(
        &self,
        cancel: &CancellationToken,
        request: &EmbeddingRequest,
    ) -> Result<EmbeddingResponse> {
        ensure_embeddings_enabled(&self.name, &self.options)?;
        let body = json!({"model": request.model, "input": request.input});
        let resp: EmbedResponse = self.transport.post_json(cancel, EMBED_PATH, &body).await?;
        Ok(EmbeddingResponse::from_vectors(
            resp.embeddings,
            request.model.clone(),
            EmbeddingUsage::new(resp.prompt_eval_count.unwrap_or(0)),
        ))
    }
}

struct NdjsonState {
    lines: BoxStream<'static, String>,
    model: String,
    /// Stats fragment owed after the final unit's content.
    pending_done: Option<ResponseFragment>,
    finished: bool,
}

/// Turn NDJSON chat units into fragments.
///
/// Every unit yields a content delta; the final (`done: true`) unit additionally
/// yields a completion fragment carrying its stats.
fn ndjson_fragments(lines: BoxStream<'static, String>, model: String) -> FragmentStream {
    let state = NdjsonState {
        lines,
        model,
        pending_done: None,
        finished: false,
    };

    let stream = stream::unfold(state, |mut st| async move {
        if let Some(done) = st.pending_done.take() {
            st.finished = true;
            return Some((Ok(done), st));
        }
        if st.finished {
            return None;
        }

        let line = match st.lines.next().await? {
            Ok(line) => line,
            Err(e) => {
                st.finished = true;
                return Some((Err(e), st));
            }
        };

        let unit: ChatResponse = match serde_json::from_str(&line) {
            Ok(unit) => unit,
            Err(e) => {
                st.finished = true;
                let err = Error::invalid_response_with_context(
                    format!("unable to decode stream unit: {}", e),
                    ErrorContext::new()
                        .with_details(line.chars().take(200).collect::<String>())
                        .with_source("ollama_driver"),
                );
                return Some((Err(err), st));
            }
        };
        if let Some(message) = unit.error {
            st.finished = true;
            return Some((Err(stream_error(message)), st));
        }

        let created = unit.created_at.unwrap_or_else(Utc::now);
        let delta = ResponseFragment::delta(st.model.clone(), unit.content()).with_created_at(created);
        if unit.done {
            st.pending_done = Some(
                ResponseFragment::done(st.model.clone(), Some(unit.finish_reason()), Some(unit.stats()))
                    .with_created_at(created),
            );
        }
        Some((Ok(delta), st))
    });

    Box::pin(stream)
}

/// Ollama reports failures after a 200 as `{"error": "..."}`.
fn stream_error(message: String) -> Error {
    Error::Remote {
        status: 500,
        message,
        error_type: None,
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    message: Option<ChatMessage>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    done_reason: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    total_duration: Option<u64>,
    #[serde(default)]
    load_duration: Option<u64>,
    #[serde(default)]
    prompt_eval_count: Option<u64>,
    #[serde(default)]
    prompt_eval_duration: Option<u64>,
    #[serde(default)]
    eval_count: Option<u64>,
    #[serde(default)]
    eval_duration: Option<u64>,
}

impl ChatResponse {
    fn content(&self) -> String {
        self.message
            .as_ref()
            .and_then(|m| m.content.clone())
            .unwrap_or_default()
    }

    fn finish_reason(&self) -> FinishReason {
        self.done_reason
            .as_deref()
            .and_then(FinishReason::parse)
            .unwrap_or(FinishReason::Stop)
    }

    fn stats(&self) -> InferenceStats {
        InferenceStats {
            total_duration: self.total_duration,
            load_duration: self.load_duration,
            prompt_eval_count: self.prompt_eval_count,
            prompt_eval_duration: self.prompt_eval_duration,
            eval_count: self.eval_count,
            eval_duration: self.eval_duration,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ToolCall>>,
}

impl ChatMessage {
    fn function_call(&self) -> Option<FunctionCall> {
        let call = self.tool_calls.as_ref()?.first()?;
        if call.function.name.is_empty() {
            return None;
        }
        Some(FunctionCall::new(
            call.function.name.clone(),
            call.function.arguments.clone(),
        ))
    }
}

#[derive(Debug, Deserialize)]
struct ToolCall {
    function: ToolFunction,
}

#[derive(Debug, Deserialize)]
struct ToolFunction {
    #[serde(default)]
    name: String,
    #[serde(default)]
    arguments: Value,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    #[serde(default)]
    embeddings: Vec<Vec<f32>>,
    #[serde(default)]
    prompt_eval_count: Option<u64>,
}
