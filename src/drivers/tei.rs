//! Text Embeddings Inference backend. Embeddings only.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::{
    ensure_embeddings_enabled, error_stream, BackendConfig, BackendDriver, BackendOptions,
    BackendType, EndpointConfig, FragmentStream,
};
use crate::embeddings::{EmbeddingRequest, EmbeddingResponse};
use crate::transport::HttpTransport;
use crate::types::{InferenceOptions, InferenceRequest, InferenceResponse};
use crate::{Error, Result};

const EMBEDDINGS_PATH: &str = "/embeddings";

#[derive(Debug)]
pub struct TeiDriver {
    name: String,
    options: BackendOptions,
    transport: HttpTransport,
}

impl TeiDriver {
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

    fn chat_unsupported(&self) -> Error {
        Error::NotImplemented(format!(
            "backend {} (tei) does not support chat inference",
            self.name
        ))
    }
}

#[async_trait]
impl BackendDriver for TeiDriver {
    fn name(&self) -> &str {
        &self.name
    }

    fn backend_type(&self) -> BackendType {
        BackendType::Tei
    }

    fn options(&self) -> &BackendOptions {
        &self.options
    }

    async fn run_inference(
        &self,
        _cancel: &CancellationToken,
        _request: &InferenceRequest,
        _options: &InferenceOptions,
    ) -> Result<InferenceResponse> {
        Err(self.chat_unsupported())
    }

    fn run_streaming_inference(
        &self,
        _cancel: CancellationToken,
        _request: &InferenceRequest,
        _options: &InferenceOptions,
    ) -> FragmentStream {
        error_stream(self.chat_unsupported())
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::InferenceMessage;
    use futures::StreamExt;

    fn driver() -> TeiDriver {
        TeiDriver::new(
            "tei",
            HttpTransport::new("http://localhost:8080", None).unwrap(),
            BackendOptions::default(),
        )
    }

    #[tokio::test]
    async fn test_chat_is_not_implemented() {
        let req = InferenceRequest::new("bge", vec![InferenceMessage::user("hi")]);
        let err = driver()
            .run_inference(&CancellationToken::new(), &req, &InferenceOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.status(), 501);

        let items: Vec<_> = driver()
            .run_streaming_inference(CancellationToken::new(), &req, &InferenceOptions::default())
            .collect()
            .await;
        assert_eq!(items.len(), 1);
        assert!(matches!(items[0], Err(Error::NotImplemented(_))));
    }
}
