//! Low-level HTTP plumbing shared by all backend drivers.
//!
//! A driver owns one [`HttpTransport`] per configured backend. The transport
//! performs exactly one HTTP call per invocation (no retries) and either decodes
//! a JSON body or exposes the response body as a lazy stream of text lines.

mod http;
mod lines;

pub use http::HttpTransport;
pub use lines::{cancellable, line_stream};

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Transport error: {0}")]
    Other(String),
}
