//! Canonical chat message

use serde::{Deserialize, Serialize};

/// A single role/content pair, kept in request order through every driver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InferenceMessage {
    pub role: String,
    #[serde(default)]
    pub content: String,
}

impl InferenceMessage {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self::new(MessageRole::System.as_str(), text)
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(MessageRole::User.as_str(), text)
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(MessageRole::Assistant.as_str(), text)
    }
}

/// Well-known roles. Roles stay free-form strings on the wire so backends can
/// receive roles this enum does not know about (e.g. "tool").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::System => "system",
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
        }
    }
}
