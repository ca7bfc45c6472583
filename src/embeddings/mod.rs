//! Embedding request and response types.

mod types;

pub use types::{Embedding, EmbeddingInput, EmbeddingRequest, EmbeddingResponse, EmbeddingUsage};
