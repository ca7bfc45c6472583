//! # Inference broker
//!
//! The orchestrator between adapters and backend drivers. For every call it:
//!
//! 1. resolves the logical model name to a descriptor and backend driver,
//! 2. merges the model's default options into the caller's,
//! 3. emulates tool calling through the prompt when the backend lacks it,
//! 4. dispatches (with a bounded retry on degenerate output for non-streaming
//!    calls) and normalizes the result.
//!
//! The broker keeps no per-request state; cloning it is cheap.

pub mod emulation;

use futures::{stream, StreamExt};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::config::{BrokerConfig, GatewayConfig};
use crate::drivers::{error_stream, BackendDriver, FragmentStream};
use crate::embeddings::{EmbeddingRequest, EmbeddingResponse};
use crate::registry::{BackendRegistry, ModelDescriptor, ModelRegistry};
use crate::types::{
    FinishReason, InferenceOptions, InferenceRequest, InferenceResponse, ToolSelection,
};
use crate::{Error, Result};

/// Id given to responses whose backend did not supply one.
pub const PLACEHOLDER_ID: &str = "inferix";

#[derive(Debug, Clone)]
pub struct Broker {
    models: Arc<ModelRegistry>,
    backends: Arc<BackendRegistry>,
    config: BrokerConfig,
}

/// A request after resolution, ready for dispatch.
struct Prepared {
    caller_model: String,
    descriptor: Arc<ModelDescriptor>,
    driver: Arc<dyn BackendDriver>,
    request: InferenceRequest,
    options: InferenceOptions,
    emulated: bool,
    selection: ToolSelection,
}

impl Broker {
    pub fn new(models: ModelRegistry, backends: BackendRegistry, config: BrokerConfig) -> Self {
        Self {
            models: Arc::new(models),
            backends: Arc::new(backends),
            config,
        }
    }

    /// Build registries and broker from a parsed configuration file.
    pub fn from_config(config: &GatewayConfig) -> Result<Self> {
        config.validate();
        let models = ModelRegistry::new(config.models.clone())?;
        let backends = BackendRegistry::from_config(&config.backends)?;
        info!(
            models = models.len(),
            backends = backends.len(),
            max_attempts = config.broker.max_attempts,
            "broker ready"
        );
        Ok(Self::new(models, backends, config.broker.clone()))
    }

    fn prepare(&self, mut request: InferenceRequest, options: InferenceOptions) -> Result<Prepared> {
        let descriptor = self.models.resolve(&request.model)?;
        let options = descriptor.merge_defaults(&options);
        let driver = self.backends.resolve(&descriptor.driver)?;

        let caller_model = std::mem::replace(&mut request.model, descriptor.target_name().to_string());
        let selection = request.tool_selection;

        let emulated = request.has_tools() && !driver.supports_native_function_calling();
        if emulated {
            emulation::inject_fn_call_prompt(&mut request.messages, &request.tools);
            request.tools.clear();
        }

        Ok(Prepared {
            caller_model,
            descriptor,
            driver,
            request,
            options,
            emulated,
            selection,
        })
    }

    /// Non-streaming inference with a bounded retry on degenerate output.
    pub async fn run_inference(
        &self,
        cancel: &CancellationToken,
        request: InferenceRequest,
        options: InferenceOptions,
    ) -> Result<InferenceResponse> {
        let prepared = self.prepare(request, options)?;
        let span = info_span!(
            "inference",
            request_id = %Uuid::new_v4(),
            model = %prepared.caller_model,
            backend = prepared.driver.name()
        );
        self.dispatch(cancel, prepared).instrument(span).await
    }

    async fn dispatch(&self, cancel: &CancellationToken, p: Prepared) -> Result<InferenceResponse> {
        let max_attempts = self.config.max_attempts.max(1);
        for attempt in 1..=max_attempts {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }

            let started = Instant::now();
            let response = match p.driver.run_inference(cancel, &p.request, &p.options).await {
                Ok(r) => r,
                Err(e) => {
                    warn!(attempt, error = %e, "backend inference failed");
                    return Err(e);
                }
            };
            let duration_ms = started.elapsed().as_millis() as u64;

            match self.post_process(response, &p) {
                Some(response) => {
                    info!(
                        attempt,
                        duration_ms,
                        finish_reason = response.finish_reason.map(|f| f.as_str()).unwrap_or(""),
                        function_call = response.function_call.is_some(),
                        "inference completed"
                    );
                    return Ok(response);
                }
                None => debug!(attempt, duration_ms, "degenerate response, retrying"),
            }
        }

        warn!(attempts = max_attempts, "inference attempts exhausted");
        Err(Error::InferenceExhausted {
            attempts: max_attempts,
        })
    }

    /// Normalize one backend answer. `None` marks the attempt as degenerate.
    fn post_process(&self, mut response: InferenceResponse, p: &Prepared) -> Option<InferenceResponse> {
        response.model = p.caller_model.clone();
        if response.id.is_empty() {
            response.id = PLACEHOLDER_ID.to_string();
        }
        if response.finish_reason.is_none() {
            response.finish_reason = Some(FinishReason::Stop);
        }
        response.content = response.content.trim().to_string();

        if response.function_call.is_none()
            && response.content.chars().count() < self.config.min_content_length
        {
            return None;
        }

        if p.emulated && response.content.contains(emulation::FUNC_CALL_MARKER) {
            let Some(call) = emulation::extract_function_call(&response.content) else {
                debug!("unable to parse emulated function call");
                return None;
            };
            response.content = emulation::describe_call(&call);
            response.function_call = Some(call);
            response.finish_reason = Some(FinishReason::for_call(p.selection));
        } else if response.function_call.is_some() && p.selection != ToolSelection::None {
            response.finish_reason = Some(FinishReason::for_call(p.selection));
        }

        Some(response)
    }

    /// Streaming inference. Resolution failures surface as the single item of
    /// the returned stream.
    pub fn run_streaming_inference(
        &self,
        cancel: CancellationToken,
        request: InferenceRequest,
        options: InferenceOptions,
    ) -> FragmentStream {
        let p = match self.prepare(request, options) {
            Ok(p) => p,
            Err(e) => return error_stream(e),
        };
        debug!(
            model = %p.caller_model,
            target = p.descriptor.target_name(),
            backend = p.driver.name(),
            emulated = p.emulated,
            "starting streaming inference"
        );
        let inner = p.driver.run_streaming_inference(cancel, &p.request, &p.options);
        guard_stream(inner, p.caller_model)
    }

    pub async fn create_embeddings(
        &self,
        cancel: &CancellationToken,
        mut request: EmbeddingRequest,
    ) -> Result<EmbeddingResponse> {
        let descriptor = self.models.resolve(&request.model)?;
        let driver = self.backends.resolve(&descriptor.driver)?;
        let caller_model = std::mem::replace(&mut request.model, descriptor.target_name().to_string());

        let started = Instant::now();
        let mut response = driver.create_embeddings(cancel, &request).await.map_err(|e| {
            warn!(model = %caller_model, backend = driver.name(), error = %e, "embeddings failed");
            e
        })?;
        debug!(
            model = %caller_model,
            backend = driver.name(),
            inputs = request.input.len(),
            duration_ms = started.elapsed().as_millis() as u64,
            "embeddings completed"
        );
        response.model = caller_model;
        Ok(response)
    }
}

struct GuardState {
    inner: FragmentStream,
    model: String,
    finished: bool,
}

/// Enforce the fragment stream contract on a driver stream: caller's model name,
/// placeholder id, a finish reason on the completion fragment, nothing after an
/// error or completion, and an error when the driver ends without completing.
fn guard_stream(inner: FragmentStream, model: String) -> FragmentStream {
    let state = GuardState {
        inner,
        model,
        finished: false,
    };

    let stream = stream::unfold(state, |mut st| async move {
        if st.finished {
            return None;
        }
        match st.inner.next().await {
            Some(Ok(mut fragment)) => {
                fragment.model = st.model.clone();
                if fragment.id.is_empty() {
                    fragment.id = PLACEHOLDER_ID.to_string();
                }
                if fragment.done {
                    st.finished = true;
                    if fragment.finish_reason.is_none() {
                        fragment.finish_reason = Some(FinishReason::Stop);
                    }
                }
                Some((Ok(fragment), st))
            }
            Some(Err(e)) => {
                st.finished = true;
                warn!(model = %st.model, error = %e, "streaming inference failed");
                Some((Err(e), st))
            }
            None => {
                st.finished = true;
                Some((
                    Err(Error::invalid_response(
                        "backend stream ended without a completion marker",
                    )),
                    st,
                ))
            }
        }
    });

    Box::pin(stream)
}
