use crate::transport::TransportError;
use thiserror::Error;

/// Structured error context for better error handling and debugging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorContext {
    /// Field path or configuration key that caused the error (e.g., "models[0].aliases", "choices[0].message")
    pub field_path: Option<String>,
    /// Additional context about the error (e.g., the offending frame or value)
    pub details: Option<String>,
    /// Source of the error (e.g., "model_registry", "openai_driver")
    pub source: Option<String>,
}

impl ErrorContext {
    pub fn new() -> Self {
        Self {
            field_path: None,
            details: None,
            source: None,
        }
    }

    pub fn with_field_path(mut self, path: impl Into<String>) -> Self {
        self.field_path = Some(path.into());
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

impl Default for ErrorContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Unified error type for the gateway.
///
/// Every variant maps to an HTTP-like status and a machine-readable type tag
/// (see [`Error::status`] and [`Error::error_type`]) so adapters can render it
/// without inspecting the message text.
#[derive(Debug, Error)]
pub enum Error {
    #[error("model {0} not found")]
    ModelNotFound(String),

    #[error("backend {0} not found")]
    BackendNotFound(String),

    #[error("Backend call error: {0}")]
    BackendCall(#[from] TransportError),

    #[error("Backend error: HTTP {status}: {message}")]
    Remote {
        status: u16,
        message: String,
        error_type: Option<String>,
    },

    #[error("Invalid backend response: {message}{}", format_context(.context))]
    BackendInvalidResponse {
        message: String,
        context: ErrorContext,
    },

    #[error("Embeddings API is disabled for backend {0}")]
    EmbeddingsDisabled(String),

    #[error("unable to generate a response after {attempts} attempts")]
    InferenceExhausted { attempts: u32 },

    #[error("{0}")]
    NotImplemented(String),

    #[error("request cancelled")]
    Cancelled,

    #[error("Validation error: {message}{}", format_context(.context))]
    Validation {
        message: String,
        context: ErrorContext,
    },

    #[error("Configuration error: {message}{}", format_context(.context))]
    Configuration {
        message: String,
        context: ErrorContext,
    },
}

// Helper function to format error context for display
fn format_context(ctx: &ErrorContext) -> String {
    let mut parts = Vec::new();
    if let Some(ref field) = ctx.field_path {
        parts.push(format!("field: {}", field));
    }
    if let Some(ref details) = ctx.details {
        parts.push(format!("details: {}", details));
    }
    if let Some(ref source) = ctx.source {
        parts.push(format!("source: {}", source));
    }
    if parts.is_empty() {
        String::new()
    } else {
        format!(" ({})", parts.join(", "))
    }
}

impl Error {
    /// Create a new invalid-response error with structured context
    pub fn invalid_response_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::BackendInvalidResponse {
            message: msg.into(),
            context,
        }
    }

    /// Create a new validation error with structured context
    pub fn validation_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Validation {
            message: msg.into(),
            context,
        }
    }

    /// Create a new configuration error with structured context
    pub fn configuration_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Configuration {
            message: msg.into(),
            context,
        }
    }

    pub fn invalid_response(msg: impl Into<String>) -> Self {
        Self::invalid_response_with_context(msg, ErrorContext::new())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::validation_with_context(msg, ErrorContext::new())
    }

    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::configuration_with_context(msg, ErrorContext::new())
    }

    /// Extract error context if available
    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            Error::BackendInvalidResponse { context, .. }
            | Error::Validation { context, .. }
            | Error::Configuration { context, .. } => Some(context),
            _ => None,
        }
    }

    /// HTTP-like status code adapters should answer with.
    pub fn status(&self) -> u16 {
        match self {
            Error::ModelNotFound(_) => 404,
            Error::BackendNotFound(_) => 500,
            Error::BackendCall(_) => 500,
            Error::Remote { status, .. } => *status,
            Error::BackendInvalidResponse { .. } => 500,
            Error::EmbeddingsDisabled(_) => 400,
            Error::InferenceExhausted { .. } => 500,
            Error::NotImplemented(_) => 501,
            // Client closed request
            Error::Cancelled => 499,
            Error::Validation { .. } => 400,
            Error::Configuration { .. } => 500,
        }
    }

    /// Machine-readable type tag.
    pub fn error_type(&self) -> &str {
        match self {
            Error::ModelNotFound(_) => "model_not_found",
            Error::BackendNotFound(_) => "backend_not_found",
            Error::BackendCall(_) => "backend_call_error",
            Error::Remote { error_type, .. } => error_type.as_deref().unwrap_or("backend_error"),
            Error::BackendInvalidResponse { .. } => "backend_invalid_response",
            Error::EmbeddingsDisabled(_) => "embeddings_disabled",
            Error::InferenceExhausted { .. } => "inference_exhausted",
            Error::NotImplemented(_) => "not_implemented",
            Error::Cancelled => "cancelled",
            Error::Validation { .. } => "invalid_request",
            Error::Configuration { .. } => "configuration_error",
        }
    }

    /// Whether the error stems from configuration rather than the request itself.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Error::BackendNotFound(_) | Error::Configuration { .. }
        )
    }

    /// Convert into the `{status, message, type}` shape handed to adapters.
    pub fn to_api_error(&self) -> crate::api::ApiError {
        let message = match self {
            // The remote message is already user-facing; skip our prefix.
            Error::Remote { message, .. } => message.clone(),
            other => other.to_string(),
        };
        crate::api::ApiError::new(self.status(), message, self.error_type())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::invalid_response_with_context(
            e.to_string(),
            ErrorContext::new().with_source("json_decode"),
        )
    }
}
