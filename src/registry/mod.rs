//! Startup-built lookup tables: models by name/alias and backends by name.
//!
//! Both registries are immutable after construction and shared through `Arc`
//! by the broker, so lookups take no locks.

mod backends;
mod models;

pub use backends::BackendRegistry;
pub use models::{ModelConfig, ModelDescriptor, ModelOptions, ModelRegistry, DEFAULT_TEMPERATURE};
