//! Search Space Registry
//!
//! Maps string keys to search-space factories so a search driver can
//! enumerate and instantiate spaces from configuration.

use std::collections::BTreeMap;
use std::fmt;
use tracing::info;

use super::config::SearchSpaceConfig;
use super::mobilenet_v1::MobileNetV1Space;
use super::search_space::SearchSpace;
use crate::error::{KolosalError, Result};

/// Builds a search space from its configuration
pub type SpaceFactory = fn(&SearchSpaceConfig) -> Result<Box<dyn SearchSpace>>;

/// Registry of named search spaces
#[derive(Clone, Default)]
pub struct SearchSpaceRegistry {
    factories: BTreeMap<String, SpaceFactory>,
}

impl fmt::Debug for SearchSpaceRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SearchSpaceRegistry")
            .field("names", &self.names())
            .finish()
    }
}

impl SearchSpaceRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in search space
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.insert(MobileNetV1Space::NAME.to_string(), build_mobilenet_v1);
        registry
    }

    /// Register a factory under `name`
    pub fn register(&mut self, name: impl Into<String>, factory: SpaceFactory) -> Result<()> {
        let name = name.into();
        if self.factories.contains_key(&name) {
            return Err(KolosalError::ConfigError(format!(
                "search space '{}' is already registered",
                name
            )));
        }
        self.insert(name, factory);
        Ok(())
    }

    fn insert(&mut self, name: String, factory: SpaceFactory) {
        info!(search_space = %name, "registered search space");
        self.factories.insert(name, factory);
    }

    /// Instantiate the search space named by `config.class_name`
    pub fn create(&self, config: &SearchSpaceConfig) -> Result<Box<dyn SearchSpace>> {
        config.validate()?;
        let factory = self.factories.get(&config.class_name).ok_or_else(|| {
            KolosalError::ConfigError(format!(
                "unknown search space '{}', available: [{}]",
                config.class_name,
                self.names().join(", ")
            ))
        })?;
        factory(config)
    }

    /// Whether `name` is registered
    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }
}

fn build_mobilenet_v1(config: &SearchSpaceConfig) -> Result<Box<dyn SearchSpace>> {
    let space = MobileNetV1Space::new(config.input_size, config.output_size, config.block_num)?
        .with_scale(config.scale)?
        .with_class_dim(config.class_dim)?;
    Ok(Box::new(space))
}
