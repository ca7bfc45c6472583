//! # Types Module
//!
//! Canonical, backend-agnostic shapes the broker operates on. Adapters translate
//! their dialect into these types; drivers translate them into wire formats.
//!
//! | Type | Description |
//! |------|-------------|
//! | [`InferenceRequest`] | Model, ordered messages, tools and output format |
//! | [`InferenceOptions`] | Sampling options merged with model defaults |
//! | [`InferenceResponse`] | Non-streaming result |
//! | [`ResponseFragment`] | One unit of a streaming result |
//! | [`FunctionCall`] | Native or emulated function call |
//!
//! ## Example
//!
//! ```rust
//! use inferix::types::{InferenceMessage, InferenceRequest, Tool, ToolSelection};
//!
//! let req = InferenceRequest::new(
//!     "llama3.1",
//!     vec![InferenceMessage::user("What's the weather in Paris?")],
//! )
//! .with_tools(
//!     ToolSelection::Tool,
//!     vec![Tool::new("get_weather", serde_json::json!({"type": "object"}))],
//! );
//! assert!(req.has_tools());
//! ```

pub mod fragment;
pub mod inference;
pub mod message;
pub mod tool;

pub use fragment::ResponseFragment;
pub use inference::{
    FinishReason, InferenceOptions, InferenceRequest, InferenceResponse, InferenceStats,
    OutputFormat,
};
pub use message::{InferenceMessage, MessageRole};
pub use tool::{FunctionCall, Tool, ToolSelection};
