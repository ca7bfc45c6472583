//! Mock backend server setup for integration tests
#![allow(dead_code)]

use inferix::drivers::{BackendConfig, BackendOptions, BackendType};
use mockito::{Matcher, Mock, Server, ServerGuard};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Test fixture that manages a mock backend
pub struct MockServerFixture {
    pub server: Arc<Mutex<ServerGuard>>,
    pub base_url: String,
}

impl MockServerFixture {
    pub async fn new() -> Self {
        let server = Server::new_async().await;
        let base_url = server.url();
        Self {
            server: Arc::new(Mutex::new(server)),
            base_url,
        }
    }

    /// Backend configuration pointing at this server
    pub fn backend(&self, name: &str, backend_type: BackendType, options: BackendOptions) -> BackendConfig {
        BackendConfig {
            name: name.to_string(),
            backend_type,
            config: json!({"baseUrl": self.base_url}),
            options,
        }
    }

    /// Successful JSON response whose request body contains `expected` (partial match)
    pub async fn mock_json(&self, path: &str, expected: Value, body: Value) -> Mock {
        let mut server = self.server.lock().await;
        server
            .mock("POST", path)
            .match_body(Matcher::PartialJson(expected))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(body.to_string())
            .create_async()
            .await
    }

    /// Error response with a raw body
    pub async fn mock_error_response(&self, path: &str, status: usize, error_body: &str) -> Mock {
        let mut server = self.server.lock().await;
        server
            .mock("POST", path)
            .with_status(status)
            .with_header("content-type", "application/json")
            .with_body(error_body)
            .create_async()
            .await
    }

    /// Successful SSE response built from `data:` payloads
    pub async fn mock_sse_stream(&self, path: &str, chunks: &[&str]) -> Mock {
        let body = chunks
            .iter()
            .map(|chunk| {
                if chunk.starts_with("data: ") {
                    format!("{}\n\n", chunk)
                } else {
                    format!("data: {}\n\n", chunk)
                }
            })
            .collect::<Vec<_>>()
            .join("");

        let mut server = self.server.lock().await;
        server
            .mock("POST", path)
            .match_body(Matcher::PartialJson(json!({"stream": true})))
            .with_status(200)
            .with_header("content-type", "text/event-stream")
            .with_body(body)
            .create_async()
            .await
    }

    /// Successful NDJSON response, one object per line
    pub async fn mock_ndjson_stream(&self, path: &str, units: &[Value]) -> Mock {
        let body = units
            .iter()
            .map(|u| format!("{}\n", u))
            .collect::<Vec<_>>()
            .join("");

        let mut server = self.server.lock().await;
        server
            .mock("POST", path)
            .match_body(Matcher::PartialJson(json!({"stream": true})))
            .with_status(200)
            .with_header("content-type", "application/x-ndjson")
            .with_body(body)
            .create_async()
            .await
    }

    /// Mock that must never be hit
    pub async fn mock_never_called(&self, path: &str) -> Mock {
        let mut server = self.server.lock().await;
        server
            .mock("POST", path)
            .with_status(200)
            .expect(0)
            .create_async()
            .await
    }
}

pub fn embeddings_enabled() -> BackendOptions {
    BackendOptions {
        inject_fn_call_prompt: false,
        enable_embeddings_api: true,
    }
}

pub fn emulated_tools() -> BackendOptions {
    BackendOptions {
        inject_fn_call_prompt: true,
        enable_embeddings_api: false,
    }
}
