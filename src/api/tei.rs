//! TEI `/embed` dialect: `{"inputs": ..., "truncate": bool}` -> `[[f32]]`.

use serde::{Deserialize, Serialize};

use crate::embeddings::{EmbeddingInput, EmbeddingRequest, EmbeddingResponse};

/// TEI requests carry no model; they are served by the model named (or aliased) `default`.
pub const DEFAULT_MODEL: &str = "default";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbedRequest {
    pub inputs: EmbeddingInput,
    /// Accepted for compatibility; backends truncate according to their own settings.
    #[serde(default)]
    pub truncate: bool,
}

pub type EmbedResponse = Vec<Vec<f32>>;

impl EmbedRequest {
    pub fn into_canonical(self) -> EmbeddingRequest {
        EmbeddingRequest {
            input: self.inputs,
            model: DEFAULT_MODEL.to_string(),
        }
    }
}

pub fn embed_response(response: EmbeddingResponse) -> EmbedResponse {
    response.into_vectors()
}
