//! Gateway configuration file (`inferix.yaml`).
//!
//! ```yaml
//! backends:
//!   - name: ollama
//!     type: ollama
//!     config:
//!       baseUrl: http://localhost:11434
//!     options:
//!       injectFnCallPrompt: true
//!       enableEmbeddingsAPI: true
//! models:
//!   - name: llama3.1
//!     aliases: [default-chat]
//!     driver: ollama
//!     default_options:
//!       temperature: 0.3
//!       num_ctx: 8192
//! broker:
//!   max_attempts: 3
//! ```
//!
//! JSON is accepted too, since it is a subset of YAML.

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::warn;

use crate::drivers::BackendConfig;
use crate::registry::ModelConfig;
use crate::{Error, ErrorContext, Result};

/// Retry and degeneracy settings of the inference broker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrokerConfig {
    /// Upper bound on backend calls per non-streaming request.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Trimmed content shorter than this (in characters) without a function
    /// call counts as a degenerate answer.
    #[serde(default = "default_min_content_length")]
    pub min_content_length: usize,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_min_content_length() -> usize {
    5
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            min_content_length: default_min_content_length(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default)]
    pub models: Vec<ModelConfig>,
    #[serde(default)]
    pub backends: Vec<BackendConfig>,
    #[serde(default)]
    pub broker: BrokerConfig,
}

impl GatewayConfig {
    pub fn from_yaml_str(text: &str) -> Result<Self> {
        serde_yaml::from_str(text).map_err(|e| {
            let mut ctx = ErrorContext::new().with_source("config");
            if let Some(loc) = e.location() {
                ctx = ctx.with_details(format!("line {}, column {}", loc.line(), loc.column()));
            }
            Error::configuration_with_context(format!("invalid configuration: {}", e), ctx)
        })
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            Error::configuration_with_context(
                format!("unable to read config file: {}", e),
                ErrorContext::new()
                    .with_details(path.display().to_string())
                    .with_source("config"),
            )
        })?;
        Self::from_yaml_str(&text)
    }

    /// Names of models whose driver is not a configured backend.
    ///
    /// These are logged, not rejected: requests for such a model fail with
    /// `BackendNotFound` at call time.
    pub fn validate(&self) -> Vec<String> {
        let dangling: Vec<String> = self
            .models
            .iter()
            .filter(|m| !self.backends.iter().any(|b| b.name == m.driver.trim()))
            .map(|m| m.name.clone())
            .collect();
        for model in &self.models {
            if dangling.contains(&model.name) {
                warn!(model = %model.name, driver = %model.driver, "model refers to an unknown backend");
            }
        }
        dangling
    }
}
