//! Streaming response fragments

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::inference::{FinishReason, InferenceStats};

/// One unit of a streaming response.
///
/// Error terminals are carried as `Err` items of the surrounding stream; a
/// well-formed stream ends with exactly one fragment where `done` is true.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseFragment {
    pub id: String,
    pub model: String,
    pub created_at: DateTime<Utc>,
    pub content_delta: String,
    pub done: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<FinishReason>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stats: Option<InferenceStats>,
}

impl ResponseFragment {
    pub fn delta(model: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            model: model.into(),
            created_at: Utc::now(),
            content_delta: content.into(),
            done: false,
            finish_reason: None,
            stats: None,
        }
    }

    /// Completion marker with optional final stats.
    pub fn done(
        model: impl Into<String>,
        finish_reason: Option<FinishReason>,
        stats: Option<InferenceStats>,
    ) -> Self {
        Self {
            id: String::new(),
            model: model.into(),
            created_at: Utc::now(),
            content_delta: String::new(),
            done: true,
            finish_reason,
            stats,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }
}
