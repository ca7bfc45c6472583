//! Backend names -> configured driver instances.

use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

use crate::drivers::{create_driver, BackendConfig, BackendDriver};
use crate::{Error, ErrorContext, Result};

#[derive(Debug, Clone, Default)]
pub struct BackendRegistry {
    drivers: HashMap<String, Arc<dyn BackendDriver>>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Instantiate one driver per configuration entry.
    pub fn from_config(configs: &[BackendConfig]) -> Result<Self> {
        let mut registry = Self::new();
        for config in configs {
            let driver = create_driver(config)?;
            info!(
                backend = %config.name,
                backend_type = config.backend_type.as_str(),
                native_tools = driver.supports_native_function_calling(),
                embeddings = config.options.enable_embeddings_api,
                "backend registered"
            );
            registry.register(config.name.clone(), driver)?;
        }
        Ok(registry)
    }

    /// Register a driver instance under `name`. Duplicate names are rejected.
    pub fn register(&mut self, name: impl Into<String>, driver: Arc<dyn BackendDriver>) -> Result<()> {
        let name = name.into().trim().to_string();
        if name.is_empty() {
            return Err(Error::configuration_with_context(
                "backend name must not be empty",
                ErrorContext::new().with_source("backend_registry"),
            ));
        }
        if self.drivers.contains_key(&name) {
            return Err(Error::configuration_with_context(
                format!("backend {} is already registered", name),
                ErrorContext::new()
                    .with_field_path(format!("backends.{}", name))
                    .with_source("backend_registry"),
            ));
        }
        self.drivers.insert(name, driver);
        Ok(())
    }

    pub fn resolve(&self, name: &str) -> Result<Arc<dyn BackendDriver>> {
        self.drivers
            .get(name)
            .cloned()
            .ok_or_else(|| Error::BackendNotFound(name.to_string()))
    }

    pub fn len(&self) -> usize {
        self.drivers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.drivers.is_empty()
    }
}
