//! HTTP surface end to end: reqwest -> axum routes -> broker -> mock backend.

mod common;

use common::{embeddings_enabled, MockServerFixture};
use inferix::drivers::{BackendOptions, BackendType};
use inferix::registry::ModelConfig;
use inferix::{server, Broker, BrokerConfig, GatewayConfig};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

struct Gateway {
    url: String,
    shutdown: CancellationToken,
}

impl Drop for Gateway {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn start_gateway(fixture: &MockServerFixture) -> Gateway {
    let config = GatewayConfig {
        models: vec![
            ModelConfig::new("llama3.1", "ollama").with_aliases(["chat"]),
            ModelConfig::new("bge-large-en-v1.5", "tei")
                .with_aliases(["default"])
                .with_target_name("BAAI/bge-large-en-v1.5"),
        ],
        backends: vec![
            fixture.backend("ollama", BackendType::Ollama, BackendOptions::default()),
            fixture.backend("tei", BackendType::Tei, embeddings_enabled()),
        ],
        broker: BrokerConfig::default(),
    };
    let broker = Broker::from_config(&config).unwrap();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        server::serve(listener, broker, async move { signal.cancelled().await })
            .await
            .unwrap();
    });

    Gateway {
        url: format!("http://{}/api/v1", addr),
        shutdown,
    }
}

#[tokio::test]
async fn test_chat_completion_json() {
    let fixture = MockServerFixture::new().await;
    let _mock = fixture
        .mock_json(
            "/api/chat",
            json!({"model": "llama3.1", "stream": false}),
            json!({
                "model": "llama3.1",
                "created_at": "2024-07-22T20:33:28Z",
                "message": {"role": "assistant", "content": "Rayleigh scattering."},
                "done": true,
                "done_reason": "stop",
                "prompt_eval_count": 8,
                "eval_count": 4
            }),
        )
        .await;
    let gateway = start_gateway(&fixture).await;

    let resp = reqwest::Client::new()
        .post(format!("{}/chat/completions", gateway.url))
        .json(&json!({"model": "chat", "messages": [{"role": "user", "content": "Why is the sky blue?"}]}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["object"], "chat.completion");
    assert_eq!(body["model"], "chat");
    assert_eq!(body["id"], "inferix");
    assert_eq!(body["created"], 1721680408);
    assert_eq!(body["choices"][0]["message"]["content"], "Rayleigh scattering.");
    assert_eq!(body["choices"][0]["finish_reason"], "stop");
    assert_eq!(body["usage"]["total_tokens"], 12);
}

#[tokio::test]
async fn test_chat_completion_sse() {
    let fixture = MockServerFixture::new().await;
    let _mock = fixture
        .mock_ndjson_stream(
            "/api/chat",
            &[
                json!({"message": {"role": "assistant", "content": "Hello"}, "done": false}),
                json!({"message": {"role": "assistant", "content": ""}, "done": true, "eval_count": 1}),
            ],
        )
        .await;
    let gateway = start_gateway(&fixture).await;

    let resp = reqwest::Client::new()
        .post(format!("{}/chat/completions", gateway.url))
        .json(&json!({"model": "llama3.1", "stream": true, "messages": [{"role": "user", "content": "Hi"}]}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert!(resp.headers()["content-type"]
        .to_str()
        .unwrap()
        .starts_with("text/event-stream"));

    let text = resp.text().await.unwrap();
    let data: Vec<&str> = text
        .lines()
        .filter_map(|l| l.strip_prefix("data:"))
        .map(str::trim)
        .collect();
    assert_eq!(*data.last().unwrap(), "[DONE]");

    let chunks: Vec<Value> = data[..data.len() - 1]
        .iter()
        .map(|d| serde_json::from_str(d).unwrap())
        .collect();
    assert_eq!(chunks.len(), 3);
    assert!(chunks.iter().all(|c| c["object"] == "chat.completion.chunk"));
    assert_eq!(chunks[0]["choices"][0]["delta"]["content"], "Hello");
    assert_eq!(chunks[2]["choices"][0]["finish_reason"], "stop");
}

#[tokio::test]
async fn test_streaming_with_tools_is_rejected() {
    let fixture = MockServerFixture::new().await;
    let mock = fixture.mock_never_called("/api/chat").await;
    let gateway = start_gateway(&fixture).await;

    let resp = reqwest::Client::new()
        .post(format!("{}/chat/completions", gateway.url))
        .json(&json!({
            "model": "llama3.1",
            "stream": true,
            "messages": [{"role": "user", "content": "Weather?"}],
            "tools": [{"type": "function", "function": {"name": "get_weather", "parameters": {}}}]
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["type"], "invalid_request");
    assert_eq!(body["status"], 400);
    mock.assert_async().await;
}

#[tokio::test]
async fn test_unknown_model_is_404() {
    let fixture = MockServerFixture::new().await;
    let gateway = start_gateway(&fixture).await;

    let resp = reqwest::Client::new()
        .post(format!("{}/chat/completions", gateway.url))
        .json(&json!({"model": "gpt-5", "messages": [{"role": "user", "content": "Hi"}]}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["type"], "model_not_found");
    assert_eq!(body["message"], "model gpt-5 not found");
}

#[tokio::test]
async fn test_malformed_body_is_400() {
    let fixture = MockServerFixture::new().await;
    let gateway = start_gateway(&fixture).await;

    let resp = reqwest::Client::new()
        .post(format!("{}/embeddings", gateway.url))
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["type"], "invalid_request");
}

#[tokio::test]
async fn test_tei_embed_uses_default_model() {
    let fixture = MockServerFixture::new().await;
    let mock = fixture
        .mock_json(
            "/embeddings",
            json!({"model": "BAAI/bge-large-en-v1.5", "input": "What is Deep Learning?"}),
            json!({
                "object": "list",
                "model": "BAAI/bge-large-en-v1.5",
                "data": [{"object": "embedding", "index": 0, "embedding": [0.25, 0.5]}],
                "usage": {"prompt_tokens": 6, "total_tokens": 6}
            }),
        )
        .await;
    let gateway = start_gateway(&fixture).await;

    let resp = reqwest::Client::new()
        .post(format!("{}/embed", gateway.url))
        .json(&json!({"inputs": "What is Deep Learning?", "truncate": true}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Vec<Vec<f32>> = resp.json().await.unwrap();
    assert_eq!(body, vec![vec![0.25, 0.5]]);
    mock.assert_async().await;
}

#[tokio::test]
async fn test_openai_embeddings_report_caller_model() {
    let fixture = MockServerFixture::new().await;
    let _mock = fixture
        .mock_json(
            "/embeddings",
            json!({"model": "BAAI/bge-large-en-v1.5"}),
            json!({
                "object": "list",
                "model": "BAAI/bge-large-en-v1.5",
                "data": [{"object": "embedding", "index": 0, "embedding": [1.0]}],
                "usage": {"prompt_tokens": 1, "total_tokens": 1}
            }),
        )
        .await;
    let gateway = start_gateway(&fixture).await;

    let resp = reqwest::Client::new()
        .post(format!("{}/embeddings", gateway.url))
        .json(&json!({"model": "bge-large-en-v1.5", "input": ["a"]}))
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["model"], "bge-large-en-v1.5");
    assert_eq!(body["data"][0]["embedding"], json!([1.0]));
}
