//! Backend driver abstraction layer.
//!
//! Each configured backend is one [`BackendDriver`] trait object. A driver
//! translates canonical requests into its wire format, performs the remote call
//! through its [`HttpTransport`] and translates the answer back. The broker only
//! ever talks to `Arc<dyn BackendDriver>`, so OpenAI-compatible, Ollama and TEI
//! backends are interchangeable behind a model name.
//!
//! Request building and response parsing are plain functions on each driver so
//! they can be tested without a server.

pub mod ollama;
pub mod openai;
pub mod tei;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::embeddings::{EmbeddingRequest, EmbeddingResponse};
use crate::transport::HttpTransport;
use crate::types::{InferenceOptions, InferenceRequest, InferenceResponse, ResponseFragment, Tool};
use crate::{BoxStream, Error, ErrorContext, Result};

pub use ollama::OllamaDriver;
pub use openai::OpenAiDriver;
pub use tei::TeiDriver;

/// Lazy, finite stream of response fragments; errors are terminal `Err` items.
pub type FragmentStream = BoxStream<'static, ResponseFragment>;

/// Wire protocol spoken by a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendType {
    OpenAi,
    Ollama,
    Tei,
}

impl BackendType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendType::OpenAi => "openai",
            BackendType::Ollama => "ollama",
            BackendType::Tei => "tei",
        }
    }
}

/// Per-backend behaviour switches.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendOptions {
    /// Emulate tool calling through the prompt instead of the native API.
    #[serde(default, rename = "injectFnCallPrompt")]
    pub inject_fn_call_prompt: bool,
    #[serde(default, rename = "enableEmbeddingsAPI")]
    pub enable_embeddings_api: bool,
}

/// One entry of the `backends` configuration list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendConfig {
    pub name: String,
    #[serde(rename = "type")]
    pub backend_type: BackendType,
    /// Type-specific connection settings, see [`EndpointConfig`].
    #[serde(default)]
    pub config: Value,
    #[serde(default)]
    pub options: BackendOptions,
}

/// Connection settings shared by every backend type.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EndpointConfig {
    #[serde(rename = "baseUrl", alias = "base_url")]
    pub base_url: String,
    #[serde(default, rename = "apiKey", alias = "api_key")]
    pub api_key: Option<String>,
}

impl EndpointConfig {
    /// Decode the opaque `config` object of a backend entry.
    pub fn from_backend(config: &BackendConfig) -> Result<Self> {
        let endpoint: EndpointConfig =
            serde_json::from_value(config.config.clone()).map_err(|e| {
                Error::configuration_with_context(
                    format!("invalid config for backend {}: {}", config.name, e),
                    ErrorContext::new()
                        .with_field_path(format!("backends.{}.config", config.name))
                        .with_source("backend_config"),
                )
            })?;
        if endpoint.base_url.trim().is_empty() {
            return Err(Error::configuration_with_context(
                format!("backend {} has an empty baseUrl", config.name),
                ErrorContext::new()
                    .with_field_path(format!("backends.{}.config.baseUrl", config.name))
                    .with_source("backend_config"),
            ));
        }
        Ok(endpoint)
    }

    pub fn transport(&self) -> Result<HttpTransport> {
        HttpTransport::new(self.base_url.trim(), self.api_key.clone())
    }
}

/// Capability contract every backend variant implements.
///
/// All remote operations observe the supplied cancellation token. Streaming
/// builds its request eagerly but performs no I/O until the stream is polled.
#[async_trait]
pub trait BackendDriver: Send + Sync + std::fmt::Debug {
    /// Configured backend name.
    fn name(&self) -> &str;

    fn backend_type(&self) -> BackendType;

    fn options(&self) -> &BackendOptions;

    /// Whether tools can be handed to the backend directly.
    fn supports_native_function_calling(&self) -> bool {
        !self.options().inject_fn_call_prompt
    }

    async fn run_inference(
        &self,
        cancel: &CancellationToken,
        request: &InferenceRequest,
        options: &InferenceOptions,
    ) -> Result<InferenceResponse>;

    fn run_streaming_inference(
        &self,
        cancel: CancellationToken,
        request: &InferenceRequest,
        options: &InferenceOptions,
    ) -> FragmentStream;

    async fn create_embeddings(
        &self,
        cancel: &CancellationToken,
        request: &EmbeddingRequest,
    ) -> Result<EmbeddingResponse>;
}

/// Build a driver from one backend configuration entry.
pub fn create_driver(config: &BackendConfig) -> Result<Arc<dyn BackendDriver>> {
    let driver: Arc<dyn BackendDriver> = match config.backend_type {
        BackendType::OpenAi => Arc::new(OpenAiDriver::from_config(config)?),
        BackendType::Ollama => Arc::new(OllamaDriver::from_config(config)?),
        BackendType::Tei => Arc::new(TeiDriver::from_config(config)?),
    };
    Ok(driver)
}

/// Reject embedding calls on backends that were not opted in.
pub(crate) fn ensure_embeddings_enabled(name: &str, options: &BackendOptions) -> Result<()> {
    if options.enable_embeddings_api {
        Ok(())
    } else {
        Err(Error::EmbeddingsDisabled(name.to_string()))
    }
}

/// Copy `driver_options` keys into a wire object. Non-object values are ignored.
pub(crate) fn merge_driver_options(target: &mut Map<String, Value>, options: &InferenceOptions) {
    if let Value::Object(extra) = &options.driver_options {
        for (k, v) in extra {
            target.insert(k.clone(), v.clone());
        }
    }
}

/// Function definition in the `{name, description?, parameters}` form shared by
/// the OpenAI and Ollama tool APIs.
pub(crate) fn function_definition(tool: &Tool) -> Value {
    let mut def = json!({
        "name": tool.name,
        "parameters": tool.args,
    });
    if let Some(desc) = &tool.description {
        def["description"] = json!(desc);
    }
    def
}

/// Single-item stream carrying `err`.
pub(crate) fn error_stream(err: Error) -> FragmentStream {
    Box::pin(futures::stream::once(futures::future::ready(Err(err))))
}
