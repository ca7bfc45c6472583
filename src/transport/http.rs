use crate::transport::{cancellable, line_stream, TransportError};
use crate::{BoxStream, Error, ErrorContext, Result};
use bytes::Bytes;
use futures::{future, stream, StreamExt, TryStreamExt};
use serde::de::DeserializeOwned;
use std::env;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Maximum number of response body bytes echoed into error details.
const ERROR_DETAIL_LIMIT: usize = 512;

/// One HTTP endpoint (base URL plus optional bearer key) shared by a driver.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    timeout: Duration,
}

impl HttpTransport {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Result<Self> {
        // Env-overridable defaults. Generation can be slow, so the request timeout is generous.
        let timeout_secs = env::var("INFERIX_HTTP_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(300);

        let builder = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .pool_max_idle_per_host(
                env::var("INFERIX_HTTP_POOL_MAX_IDLE_PER_HOST")
                    .ok()
                    .and_then(|s| s.parse::<usize>().ok())
                    .unwrap_or(32),
            )
            .pool_idle_timeout(Some(Duration::from_secs(90)))
            .http2_adaptive_window(true)
            .http2_keep_alive_interval(Some(Duration::from_secs(30)))
            .http2_keep_alive_timeout(Duration::from_secs(10));

        let client = builder
            .build()
            .map_err(|e| Error::BackendCall(TransportError::Other(e.to_string())))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.filter(|k| !k.is_empty()),
            timeout: Duration::from_secs(timeout_secs),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn post(&self, path: &str, body: &serde_json::Value) -> reqwest::RequestBuilder {
        let mut req = self.client.post(self.url(path)).json(body);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }
        req
    }

    /// POST a JSON body and decode the JSON response.
    ///
    /// Non-2xx answers become [`Error::Remote`] carrying the backend's status and,
    /// when the body is a recognizable error document, its message and type.
    pub async fn post_json<T: DeserializeOwned>(
        &self,
        cancel: &CancellationToken,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<T> {
        let url = self.url(path);
        let call = async {
            let resp = self
                .post(path, body)
                .timeout(self.timeout)
                .send()
                .await
                .map_err(TransportError::Http)?;
            let status = resp.status();
            let text = resp.text().await.map_err(TransportError::Http)?;
            debug!(url = %url, http_status = status.as_u16(), "backend call completed");

            if !status.is_success() {
                warn!(url = %url, http_status = status.as_u16(), "backend returned error status");
                return Err(remote_error(status.as_u16(), &text));
            }

            serde_json::from_str::<T>(&text).map_err(|e| {
                Error::invalid_response_with_context(
                    format!("unable to decode backend response: {}", e),
                    ErrorContext::new()
                        .with_details(truncate(&text))
                        .with_source("http_transport"),
                )
            })
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Error::Cancelled),
            result = call => result,
        }
    }

    /// POST a JSON body and expose the response body as a lazy line stream.
    ///
    /// Nothing is sent until the stream is first polled. A non-2xx answer yields a
    /// single [`Error::Remote`] item; cancellation yields [`Error::Cancelled`] and
    /// drops the connection.
    pub fn post_lines(
        &self,
        cancel: CancellationToken,
        path: &str,
        body: serde_json::Value,
    ) -> BoxStream<'static, String> {
        let request = self
            .post(path, &body)
            .header("accept", "text/event-stream, application/x-ndjson");
        let url = self.url(path);

        let opened = async move {
            let resp = request.send().await.map_err(TransportError::Http)?;
            let status = resp.status();
            if !status.is_success() {
                let text = error_body(resp, &url).await;
                warn!(url = %url, http_status = status.as_u16(), "backend stream rejected");
                return Err(remote_error(status.as_u16(), &text));
            }
            debug!(url = %url, http_status = status.as_u16(), "backend stream opened");

            let bytes: BoxStream<'static, Bytes> = Box::pin(
                resp.bytes_stream()
                    .map_err(|e| Error::BackendCall(TransportError::Http(e))),
            );
            Ok(line_stream(bytes))
        };

        let lines = stream::once(opened).flat_map(|opened| match opened {
            Ok(lines) => lines,
            Err(e) => Box::pin(stream::once(future::ready(Err(e)))) as BoxStream<'static, String>,
        });

        cancellable(Box::pin(lines), cancel)
    }
}

/// Body of a rejected response. A body that cannot be read falls back to the
/// status-only message.
async fn error_body(resp: reqwest::Response, url: &str) -> String {
    match resp.text().await {
        Ok(text) => text,
        Err(e) => {
            debug!(url = %url, error = %e, "unable to read error body");
            String::new()
        }
    }
}

/// Build a remote error from a non-2xx body.
///
/// Recognizes `{"message", "type"}`, OpenAI's `{"error": {"message", "type"}}`
/// and Ollama's `{"error": "..."}`; anything else is used as raw text.
pub(crate) fn remote_error(status: u16, body: &str) -> Error {
    let parsed: Option<serde_json::Value> = serde_json::from_str(body).ok();
    let (message, error_type) = match parsed.as_ref() {
        Some(v) => {
            let doc = match v.get("error") {
                Some(inner) if inner.is_object() => inner,
                _ => v,
            };
            let message = doc
                .get("message")
                .and_then(|m| m.as_str())
                .or_else(|| v.get("error").and_then(|e| e.as_str()))
                .map(str::to_string);
            let error_type = doc
                .get("type")
                .and_then(|t| t.as_str())
                .filter(|t| !t.is_empty())
                .map(str::to_string);
            (message, error_type)
        }
        None => (None, None),
    };

    let message = message.unwrap_or_else(|| {
        let trimmed = body.trim();
        if trimmed.is_empty() {
            format!("backend responded with HTTP {}", status)
        } else {
            truncate(trimmed)
        }
    });

    Error::Remote {
        status,
        message,
        error_type,
    }
}

fn truncate(text: &str) -> String {
    if text.len() <= ERROR_DETAIL_LIMIT {
        return text.to_string();
    }
    let mut end = ERROR_DETAIL_LIMIT;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &text[..end])
}
