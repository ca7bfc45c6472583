//! Broker behaviour with scripted in-process drivers.

use async_trait::async_trait;
use futures::{stream, StreamExt};
use inferix::drivers::{BackendDriver, BackendOptions, BackendType, FragmentStream};
use inferix::embeddings::{EmbeddingRequest, EmbeddingResponse};
use inferix::registry::{BackendRegistry, ModelConfig, ModelOptions, ModelRegistry};
use inferix::types::{
    FinishReason, FunctionCall, InferenceMessage, InferenceOptions, InferenceRequest,
    InferenceResponse, ResponseFragment, Tool, ToolSelection,
};
use inferix::{Broker, BrokerConfig, Error, Result};
use serde_json::json;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

/// Replays canned answers and records what it was asked.
#[derive(Debug)]
struct ScriptedDriver {
    options: BackendOptions,
    replies: Mutex<VecDeque<Result<InferenceResponse>>>,
    fragments: Mutex<Vec<Result<ResponseFragment>>>,
    calls: AtomicUsize,
    seen: Mutex<Vec<(InferenceRequest, InferenceOptions)>>,
    /// When set, calls block until cancelled.
    hang: AtomicBool,
    entered: Notify,
}

impl ScriptedDriver {
    fn new(inject_fn_call_prompt: bool) -> Arc<Self> {
        Arc::new(Self {
            options: BackendOptions {
                inject_fn_call_prompt,
                enable_embeddings_api: false,
            },
            replies: Mutex::new(VecDeque::new()),
            fragments: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
            hang: AtomicBool::new(false),
            entered: Notify::new(),
        })
    }

    fn reply(&self, content: &str) {
        self.replies
            .lock()
            .unwrap()
            .push_back(Ok(InferenceResponse::new("target", content)));
    }

    fn reply_with(&self, reply: Result<InferenceResponse>) {
        self.replies.lock().unwrap().push_back(reply);
    }

    fn stream(&self, items: Vec<Result<ResponseFragment>>) {
        *self.fragments.lock().unwrap() = items;
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn last_seen(&self) -> (InferenceRequest, InferenceOptions) {
        self.seen.lock().unwrap().last().cloned().unwrap()
    }
}

#[async_trait]
impl BackendDriver for ScriptedDriver {
    fn name(&self) -> &str {
        "scripted"
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
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen
            .lock()
            .unwrap()
            .push((request.clone(), options.clone()));
        if self.hang.load(Ordering::SeqCst) {
            self.entered.notify_one();
            cancel.cancelled().await;
            return Err(Error::Cancelled);
        }
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(InferenceResponse::new("target", "")))
    }

    fn run_streaming_inference(
        &self,
        _cancel: CancellationToken,
        request: &InferenceRequest,
        options: &InferenceOptions,
    ) -> FragmentStream {
        self.seen
            .lock()
            .unwrap()
            .push((request.clone(), options.clone()));
        let items = std::mem::take(&mut *self.fragments.lock().unwrap());
        Box::pin(stream::iter(items))
    }

    async fn create_embeddings(
        &self,
        _cancel: &CancellationToken,
        _request: &EmbeddingRequest,
    ) -> Result<EmbeddingResponse> {
        Err(Error::EmbeddingsDisabled("scripted".into()))
    }
}

fn broker(driver: Arc<ScriptedDriver>) -> Broker {
    let models = ModelRegistry::new(vec![
        ModelConfig::new("llama3.1", "scripted")
            .with_aliases(["chat"])
            .with_target_name("llama3.1:8b-instruct-q4"),
        ModelConfig::new("tuned", "scripted").with_default_options(ModelOptions {
            top_k: Some(20),
            temperature: Some(0.9),
            ..ModelOptions::default()
        }),
        ModelConfig::new("orphan", "missing-backend"),
    ])
    .unwrap();
    let mut backends = BackendRegistry::new();
    backends.register("scripted", driver).unwrap();
    Broker::new(models, backends, BrokerConfig::default())
}

fn ask(model: &str) -> InferenceRequest {
    InferenceRequest::new(model, vec![InferenceMessage::user("What's the weather in Paris?")])
}

fn weather_tool() -> Tool {
    Tool::new(
        "get_weather",
        json!({"type": "object", "properties": {"city": {"type": "string"}}}),
    )
}

const EMULATED_REPLY: &str = r#"Parameter Selection:
The user wants the weather for Paris.

Function Call:
<code>
{
    "type": "FUNC_CALL",
    "reasoning": "Paris is the only city mentioned",
    "name": "get_weather",
    "parameters": {"city": "Paris"}
}
</code>"#;

#[tokio::test]
async fn test_degenerate_output_exhausts_attempts() {
    let driver = ScriptedDriver::new(false);
    driver.reply("");
    driver.reply("  ok ");
    driver.reply("hi");

    let err = broker(driver.clone())
        .run_inference(&CancellationToken::new(), ask("llama3.1"), InferenceOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::InferenceExhausted { attempts: 3 }));
    assert_eq!(err.status(), 500);
    assert_eq!(driver.calls(), 3);
}

#[tokio::test]
async fn test_valid_second_attempt_stops_retrying() {
    let driver = ScriptedDriver::new(false);
    driver.reply("...");
    driver.reply("\n  It is sunny in Paris.  \n");
    driver.reply("never requested");

    let resp = broker(driver.clone())
        .run_inference(&CancellationToken::new(), ask("chat"), InferenceOptions::default())
        .await
        .unwrap();

    assert_eq!(driver.calls(), 2);
    assert_eq!(resp.content, "It is sunny in Paris.");
    assert_eq!(resp.model, "chat");
    assert_eq!(resp.id, "inferix");
    assert_eq!(resp.finish_reason, Some(FinishReason::Stop));

    let (sent, opts) = driver.last_seen();
    assert_eq!(sent.model, "llama3.1:8b-instruct-q4");
    assert_eq!(opts.temperature, Some(0.2));
}

#[tokio::test]
async fn test_attempt_bound_is_configurable() {
    let driver = ScriptedDriver::new(false);
    let models = ModelRegistry::new(vec![ModelConfig::new("m", "scripted")]).unwrap();
    let mut backends = BackendRegistry::new();
    backends.register("scripted", driver.clone()).unwrap();
    let broker = Broker::new(
        models,
        backends,
        BrokerConfig {
            max_attempts: 5,
            min_content_length: 1,
        },
    );

    let err = broker
        .run_inference(&CancellationToken::new(), ask("m"), InferenceOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InferenceExhausted { attempts: 5 }));
    assert_eq!(driver.calls(), 5);
}

#[tokio::test]
async fn test_defaults_merge_without_overriding_caller() {
    let driver = ScriptedDriver::new(false);
    driver.reply("A complete answer.");

    broker(driver.clone())
        .run_inference(
            &CancellationToken::new(),
            ask("tuned"),
            InferenceOptions::new(Some(0.8), None, None, Some(0.1)),
        )
        .await
        .unwrap();

    let (_, opts) = driver.last_seen();
    assert_eq!(opts.top_p, Some(0.8));
    assert_eq!(opts.temperature, Some(0.1));
    assert_eq!(opts.top_k, Some(20));
}

#[tokio::test]
async fn test_emulated_tool_call_round_trip() {
    let driver = ScriptedDriver::new(true);
    driver.reply(EMULATED_REPLY);

    let req = ask("llama3.1").with_tools(ToolSelection::Tool, vec![weather_tool()]);
    let resp = broker(driver.clone())
        .run_inference(&CancellationToken::new(), req, InferenceOptions::default())
        .await
        .unwrap();

    let call = resp.function_call.unwrap();
    assert_eq!(call.name, "get_weather");
    assert_eq!(call.parameters, json!({"city": "Paris"}));
    assert_eq!(resp.finish_reason, Some(FinishReason::ToolCalls));
    assert_eq!(
        resp.content,
        r#"Execute function get_weather with arguments: {"city":"Paris"}"#
    );

    let (sent, _) = driver.last_seen();
    assert!(sent.tools.is_empty());
    assert_eq!(sent.messages.len(), 2);
    let injected = &sent.messages[1];
    assert_eq!(injected.role, "system");
    assert!(injected.content.contains("- Name: get_weather"));
    assert!(injected.content.contains("FUNC_CALL"));
}

#[tokio::test]
async fn test_emulated_legacy_function_call() {
    let driver = ScriptedDriver::new(true);
    driver.reply(EMULATED_REPLY);

    let req = ask("llama3.1").with_tools(ToolSelection::Function, vec![weather_tool()]);
    let resp = broker(driver)
        .run_inference(&CancellationToken::new(), req, InferenceOptions::default())
        .await
        .unwrap();

    assert_eq!(resp.finish_reason, Some(FinishReason::FunctionCall));
    assert_eq!(resp.function_call.unwrap().name, "get_weather");
}

#[tokio::test]
async fn test_unparseable_emulated_call_uses_retry_budget() {
    let driver = ScriptedDriver::new(true);
    driver.reply("FUNC_CALL <code>{\"type\": \"FUNC_CALL\", \"name\": </code>");
    driver.reply(EMULATED_REPLY);

    let req = ask("llama3.1").with_tools(ToolSelection::Tool, vec![weather_tool()]);
    let resp = broker(driver.clone())
        .run_inference(&CancellationToken::new(), req, InferenceOptions::default())
        .await
        .unwrap();

    assert_eq!(driver.calls(), 2);
    assert!(resp.function_call.is_some());
}

#[tokio::test]
async fn test_native_backend_receives_tools_untouched() {
    let driver = ScriptedDriver::new(false);
    let mut native = InferenceResponse::new("target", "");
    native.function_call = Some(FunctionCall::new("get_weather", json!({"city": "Paris"})));
    native.finish_reason = Some(FinishReason::ToolCalls);
    driver.reply_with(Ok(native));

    let req = ask("llama3.1").with_tools(ToolSelection::Function, vec![weather_tool()]);
    let resp = broker(driver.clone())
        .run_inference(&CancellationToken::new(), req, InferenceOptions::default())
        .await
        .unwrap();

    // Empty content is fine when a call was produced
    assert_eq!(driver.calls(), 1);
    assert_eq!(resp.finish_reason, Some(FinishReason::FunctionCall));

    let (sent, _) = driver.last_seen();
    assert_eq!(sent.tools.len(), 1);
    assert_eq!(sent.messages.len(), 1);
}

#[tokio::test]
async fn test_backend_error_is_not_retried() {
    let driver = ScriptedDriver::new(false);
    driver.reply_with(Err(Error::Remote {
        status: 429,
        message: "rate limited".into(),
        error_type: None,
    }));
    driver.reply("A complete answer.");

    let err = broker(driver.clone())
        .run_inference(&CancellationToken::new(), ask("llama3.1"), InferenceOptions::default())
        .await
        .unwrap_err();

    assert_eq!(err.status(), 429);
    assert_eq!(driver.calls(), 1);
}

#[tokio::test]
async fn test_cancelled_before_dispatch() {
    let driver = ScriptedDriver::new(false);
    driver.reply("A complete answer.");
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = broker(driver.clone())
        .run_inference(&cancel, ask("llama3.1"), InferenceOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Cancelled));
    assert_eq!(driver.calls(), 0);
}

#[tokio::test]
async fn test_cancel_during_call_abandons_retries() {
    let driver = ScriptedDriver::new(false);
    driver.hang.store(true, Ordering::SeqCst);
    let cancel = CancellationToken::new();

    let call = {
        let broker = broker(driver.clone());
        let cancel = cancel.clone();
        tokio::spawn(async move {
            broker
                .run_inference(&cancel, ask("llama3.1"), InferenceOptions::default())
                .await
        })
    };

    driver.entered.notified().await;
    cancel.cancel();
    let err = call.await.unwrap().unwrap_err();

    assert!(matches!(err, Error::Cancelled));
    assert_eq!(err.status(), 499);
    assert_eq!(driver.calls(), 1);
}

#[tokio::test]
async fn test_missing_backend_is_terminal() {
    let driver = ScriptedDriver::new(false);
    let err = broker(driver.clone())
        .run_inference(&CancellationToken::new(), ask("orphan"), InferenceOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::BackendNotFound(ref name) if name == "missing-backend"));
    assert_eq!(driver.calls(), 0);
}

#[tokio::test]
async fn test_stream_is_normalized() {
    let driver = ScriptedDriver::new(false);
    driver.stream(vec![
        Ok(ResponseFragment::delta("llama3.1:8b-instruct-q4", "Sunny")),
        Ok(ResponseFragment::delta("llama3.1:8b-instruct-q4", " today").with_id("abc")),
        Ok(ResponseFragment::done("llama3.1:8b-instruct-q4", None, None)),
    ]);

    let fragments: Vec<ResponseFragment> = broker(driver)
        .run_streaming_inference(CancellationToken::new(), ask("chat"), InferenceOptions::default())
        .map(|f| f.unwrap())
        .collect()
        .await;

    assert_eq!(fragments.len(), 3);
    assert!(fragments.iter().all(|f| f.model == "chat"));
    assert_eq!(fragments[0].id, "inferix");
    assert_eq!(fragments[1].id, "abc");
    assert_eq!(fragments[2].finish_reason, Some(FinishReason::Stop));
}

#[tokio::test]
async fn test_stream_error_ends_sequence() {
    let driver = ScriptedDriver::new(false);
    driver.stream(vec![
        Ok(ResponseFragment::delta("t", "partial")),
        Err(Error::invalid_response("bad frame")),
        Ok(ResponseFragment::done("t", None, None)),
    ]);

    let items: Vec<_> = broker(driver)
        .run_streaming_inference(CancellationToken::new(), ask("llama3.1"), InferenceOptions::default())
        .collect()
        .await;

    assert_eq!(items.len(), 2);
    assert!(items[0].is_ok());
    assert!(matches!(items[1], Err(Error::BackendInvalidResponse { .. })));
}

#[tokio::test]
async fn test_streaming_emulation_injects_prompt() {
    let driver = ScriptedDriver::new(true);
    driver.stream(vec![Ok(ResponseFragment::done("t", None, None))]);

    let req = ask("llama3.1").with_tools(ToolSelection::Tool, vec![weather_tool()]);
    let items: Vec<_> = broker(driver.clone())
        .run_streaming_inference(CancellationToken::new(), req, InferenceOptions::default())
        .collect()
        .await;

    assert_eq!(items.len(), 1);
    let (sent, _) = driver.last_seen();
    assert!(sent.tools.is_empty());
    assert_eq!(sent.messages.last().unwrap().role, "system");
}
