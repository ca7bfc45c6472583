//! Embedding types and data structures.
//!
//! These are both the canonical shapes and the OpenAI-compatible wire shapes,
//! which the OpenAI and TEI backends accept verbatim.

use serde::{Deserialize, Serialize};

/// A single embedding vector with metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding {
    pub index: u32,
    pub embedding: Vec<f32>,
    #[serde(default = "default_object_type")]
    pub object: String,
}

fn default_object_type() -> String {
    "embedding".to_string()
}

impl Embedding {
    pub fn new(index: u32, embedding: Vec<f32>) -> Self {
        Self {
            index,
            embedding,
            object: "embedding".to_string(),
        }
    }
}

/// Request for generating embeddings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingRequest {
    pub input: EmbeddingInput,
    pub model: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EmbeddingInput {
    Single(String),
    Batch(Vec<String>),
}

impl EmbeddingInput {
    pub fn len(&self) -> usize {
        match self {
            EmbeddingInput::Single(_) => 1,
            EmbeddingInput::Batch(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl EmbeddingRequest {
    pub fn single(model: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            input: EmbeddingInput::Single(text.into()),
            model: model.into(),
        }
    }

    pub fn batch(model: impl Into<String>, texts: Vec<String>) -> Self {
        Self {
            input: EmbeddingInput::Batch(texts),
            model: model.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbeddingUsage {
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub total_tokens: u64,
}

impl EmbeddingUsage {
    pub fn new(prompt_tokens: u64) -> Self {
        Self {
            prompt_tokens,
            total_tokens: prompt_tokens,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingResponse {
    #[serde(default = "default_list_type")]
    pub object: String,
    pub model: String,
    pub data: Vec<Embedding>,
    #[serde(default)]
    pub usage: EmbeddingUsage,
}

fn default_list_type() -> String {
    "list".to_string()
}

impl EmbeddingResponse {
    pub fn new(data: Vec<Embedding>, model: impl Into<String>, usage: EmbeddingUsage) -> Self {
        Self {
            object: "list".to_string(),
            model: model.into(),
            data,
            usage,
        }
    }

    /// Build from a list of raw vectors, indexing them in order.
    pub fn from_vectors(
        vectors: Vec<Vec<f32>>,
        model: impl Into<String>,
        usage: EmbeddingUsage,
    ) -> Self {
        let data = vectors
            .into_iter()
            .enumerate()
            .map(|(i, v)| Embedding::new(i as u32, v))
            .collect();
        Self::new(data, model, usage)
    }

    pub fn into_vectors(self) -> Vec<Vec<f32>> {
        let mut data = self.data;
        data.sort_by_key(|e| e.index);
        data.into_iter().map(|e| e.embedding).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_accepts_string_or_list() {
        let single: EmbeddingRequest =
            serde_json::from_str(r#"{"model":"m","input":"hello"}"#).unwrap();
        assert_eq!(single.input, EmbeddingInput::Single("hello".into()));

        let batch: EmbeddingRequest =
            serde_json::from_str(r#"{"model":"m","input":["a","b"]}"#).unwrap();
        assert_eq!(batch.input.len(), 2);
    }

    #[test]
    fn test_into_vectors_orders_by_index() {
        let resp = EmbeddingResponse::new(
            vec![Embedding::new(1, vec![2.0]), Embedding::new(0, vec![1.0])],
            "m",
            EmbeddingUsage::default(),
        );
        assert_eq!(resp.into_vectors(), vec![vec![1.0], vec![2.0]]);
    }
}
