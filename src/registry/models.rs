//! Logical model names and aliases -> model descriptors.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use crate::types::InferenceOptions;
use crate::{Error, ErrorContext, Result};

/// Temperature applied when a model declares no default options.
pub const DEFAULT_TEMPERATURE: f64 = 0.2;

/// Default sampling options of a model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_k: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_ctx: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub driver_options: Option<serde_json::Value>,
}

impl Default for ModelOptions {
    fn default() -> Self {
        Self {
            top_p: None,
            top_k: None,
            num_ctx: None,
            temperature: Some(DEFAULT_TEMPERATURE),
            driver_options: None,
        }
    }
}

/// One entry of the `models` configuration list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    pub name: String,
    #[serde(default)]
    pub aliases: Vec<String>,
    /// Name of the backend serving this model.
    pub driver: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_options: Option<ModelOptions>,
}

impl ModelConfig {
    pub fn new(name: impl Into<String>, driver: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            aliases: Vec::new(),
            driver: driver.into(),
            target_name: None,
            default_options: None,
        }
    }

    pub fn with_aliases<I, S>(mut self, aliases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.aliases = aliases.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_target_name(mut self, target: impl Into<String>) -> Self {
        self.target_name = Some(target.into());
        self
    }

    pub fn with_default_options(mut self, options: ModelOptions) -> Self {
        self.default_options = Some(options);
        self
    }
}

/// Immutable, resolved model entry.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelDescriptor {
    pub name: String,
    pub aliases: Vec<String>,
    pub driver: String,
    pub target_name: Option<String>,
    pub default_options: ModelOptions,
}

impl ModelDescriptor {
    /// Backend-side model identifier.
    pub fn target_name(&self) -> &str {
        self.target_name
            .as_deref()
            .filter(|t| !t.is_empty())
            .unwrap_or(&self.name)
    }

    /// Fill every unset option from this model's defaults.
    ///
    /// Caller-supplied fields are never overwritten. Driver options are taken
    /// from the defaults only when the caller supplied none.
    pub fn merge_defaults(&self, options: &InferenceOptions) -> InferenceOptions {
        let defaults = &self.default_options;
        let mut merged = options.clone();
        merged.top_p = merged.top_p.or(defaults.top_p);
        merged.top_k = merged.top_k.or(defaults.top_k);
        merged.num_ctx = merged.num_ctx.or(defaults.num_ctx);
        merged.temperature = merged.temperature.or(defaults.temperature);
        if merged.driver_options_is_empty() {
            if let Some(driver_options) = &defaults.driver_options {
                merged.driver_options = driver_options.clone();
            }
        }
        merged
    }
}

/// Lookup table from names and aliases to descriptors. Read-only once built.
#[derive(Debug, Clone, Default)]
pub struct ModelRegistry {
    by_name: HashMap<String, Arc<ModelDescriptor>>,
    models: Vec<Arc<ModelDescriptor>>,
}

impl ModelRegistry {
    /// Build the registry, rejecting empty names and name/alias collisions.
    pub fn new(configs: Vec<ModelConfig>) -> Result<Self> {
        let mut registry = Self::default();
        for (idx, config) in configs.into_iter().enumerate() {
            registry.register(idx, config)?;
        }
        Ok(registry)
    }

    fn register(&mut self, idx: usize, config: ModelConfig) -> Result<()> {
        let name = config.name.trim().to_string();
        if name.is_empty() {
            return Err(Error::configuration_with_context(
                "model name must not be empty",
                ErrorContext::new()
                    .with_field_path(format!("models[{}].name", idx))
                    .with_source("model_registry"),
            ));
        }

        let aliases: Vec<String> = config
            .aliases
            .iter()
            .map(|a| a.trim().to_string())
            .filter(|a| !a.is_empty())
            .collect();

        let descriptor = Arc::new(ModelDescriptor {
            name: name.clone(),
            aliases: aliases.clone(),
            driver: config.driver.trim().to_string(),
            target_name: config
                .target_name
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty()),
            default_options: config.default_options.unwrap_or_default(),
        });

        for key in std::iter::once(&name).chain(aliases.iter()) {
            if self.by_name.contains_key(key) {
                return Err(Error::configuration_with_context(
                    format!("model name or alias {} is already registered", key),
                    ErrorContext::new()
                        .with_field_path(format!("models[{}]", idx))
                        .with_details(key.clone())
                        .with_source("model_registry"),
                ));
            }
            self.by_name.insert(key.clone(), descriptor.clone());
        }
        self.models.push(descriptor);
        Ok(())
    }

    /// Exact, case-sensitive lookup by name or alias.
    pub fn resolve(&self, name: &str) -> Result<Arc<ModelDescriptor>> {
        self.by_name
            .get(name)
            .cloned()
            .ok_or_else(|| Error::ModelNotFound(name.to_string()))
    }

    /// Descriptors in registration order.
    pub fn models(&self) -> impl Iterator<Item = &Arc<ModelDescriptor>> {
        self.models.iter()
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}
