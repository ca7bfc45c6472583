//! Public API dialects served by the gateway.
//!
//! | Module | Dialect |
//! |--------|---------|
//! | [`openai`] | OpenAI chat completions and embeddings |
//! | [`tei`] | Text Embeddings Inference `/embed` |
//!
//! Adapters only translate shapes; every decision is made by the broker.

pub mod openai;
pub mod tei;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::Error;

/// Error body returned by every endpoint: `{"message", "type", "status"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiError {
    pub message: String,
    #[serde(rename = "type")]
    pub error_type: String,
    pub status: u16,
}

impl ApiError {
    pub fn new(status: u16, message: impl Into<String>, error_type: &str) -> Self {
        Self {
            message: message.into(),
            error_type: error_type.to_string(),
            status,
        }
    }

    /// 400 for a request body the adapter could not decode.
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(400, message, "invalid_request")
    }
}

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        e.to_api_error()
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self)).into_response()
    }
}
