//! # inferix
//!
//! An OpenAI/TEI-compatible gateway that brokers chat and embedding calls to
//! heterogeneous inference backends.
//!
//! ## Overview
//!
//! Callers speak one stable API. Each logical model name (or alias) is mapped to
//! a configured backend (an OpenAI-compatible server, Ollama, or Text Embeddings
//! Inference), and the [`broker::Broker`] translates, dispatches and normalizes
//! every call:
//!
//! - **Model routing**: names and aliases resolve to a backend plus a backend-side
//!   target name and default sampling options
//! - **Normalization**: synchronous and streaming answers come back in one
//!   canonical shape regardless of the backend's wire format
//! - **Retry on degenerate output**: near-empty answers are retried a bounded
//!   number of times
//! - **Tool calling emulation**: backends without a tools API are prompted to
//!   answer with a structured call, which is parsed back out of the text
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use inferix::{broker::Broker, config::GatewayConfig};
//! use inferix::types::{InferenceMessage, InferenceOptions, InferenceRequest};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> inferix::Result<()> {
//!     let config = GatewayConfig::from_path("inferix.yaml")?;
//!     let broker = Broker::from_config(&config)?;
//!
//!     let request = InferenceRequest::new("llama3.1", vec![InferenceMessage::user("Hello!")]);
//!     let response = broker
//!         .run_inference(&CancellationToken::new(), request, InferenceOptions::default())
//!         .await?;
//!     println!("{}", response.content);
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`broker`] | Resolution, dispatch, retry and tool-call emulation |
//! | [`registry`] | Model and backend lookup tables |
//! | [`drivers`] | Backend drivers (OpenAI-compatible, Ollama, TEI) |
//! | [`transport`] | HTTP calls and line streaming shared by drivers |
//! | [`types`] | Canonical requests, responses and fragments |
//! | [`embeddings`] | Embedding request/response types |
//! | [`api`] | OpenAI and TEI request/response dialects |
//! | [`server`] | `axum` routes under `/api/v1` |
//! | [`config`] | Configuration file model |

pub mod api;
pub mod broker;
pub mod config;
pub mod drivers;
pub mod embeddings;
pub mod registry;
pub mod server;
pub mod transport;
pub mod types;

pub use broker::Broker;
pub use config::{BrokerConfig, GatewayConfig};
pub use types::{
    FinishReason, FunctionCall, InferenceMessage, InferenceOptions, InferenceRequest,
    InferenceResponse, ResponseFragment, Tool, ToolSelection,
};

use futures::Stream;
use std::pin::Pin;

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;

/// A unified pinned, boxed stream that emits `Result<T>`
pub type BoxStream<'a, T> = Pin<Box<dyn Stream<Item = Result<T>> + Send + 'a>>;

/// Error type for the library
pub mod error;
pub use error::{Error, ErrorContext};
