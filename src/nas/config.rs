//! Search space configuration

use serde::{Deserialize, Serialize};
use std::path::Path;

use super::search_space::MAX_BLOCK_NUM;
use crate::error::{KolosalError, Result};

/// Configuration used by the registry to instantiate a search space
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchSpaceConfig {
    /// Registry key, e.g. `"MobileNetV1Space"`
    pub class_name: String,

    /// Input feature map size
    pub input_size: usize,

    /// Output feature map size (1 appends a classifier)
    pub output_size: usize,

    /// Number of downsampling stages
    pub block_num: usize,

    /// Channel width multiplier
    #[serde(default = "default_scale")]
    pub scale: f64,

    /// Classifier width
    #[serde(default = "default_class_dim")]
    pub class_dim: usize,
}

fn default_scale() -> f64 {
    1.0
}

fn default_class_dim() -> usize {
    1000
}

impl SearchSpaceConfig {
    /// Create a configuration with default scale and class count
    pub fn new(
        class_name: impl Into<String>,
        input_size: usize,
        output_size: usize,
        block_num: usize,
    ) -> Self {
        Self {
            class_name: class_name.into(),
            input_size,
            output_size,
            block_num,
            scale: default_scale(),
            class_dim: default_class_dim(),
        }
    }

    /// Set channel width multiplier
    pub fn with_scale(mut self, scale: f64) -> Self {
        self.scale = scale;
        self
    }

    /// Set classifier width
    pub fn with_class_dim(mut self, class_dim: usize) -> Self {
        self.class_dim = class_dim;
        self
    }

    /// Parse from a JSON string and validate
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a JSON file and validate
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        Self::from_json(&contents)
    }

    /// Serialize to pretty JSON
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Check the preconditions every search space enforces at construction
    pub fn validate(&self) -> Result<()> {
        if self.class_name.is_empty() {
            return Err(KolosalError::ConfigError("class_name must not be empty".to_string()));
        }
        if self.block_num == 0 || self.block_num > MAX_BLOCK_NUM {
            return Err(KolosalError::invalid_parameter(
                "block_num",
                self.block_num,
                format!("block number must be in [1, {}]", MAX_BLOCK_NUM),
            ));
        }
        if self.input_size == 0 || self.output_size == 0 {
            return Err(KolosalError::ConfigError(format!(
                "input_size and output_size must be positive (got {} and {})",
                self.input_size, self.output_size
            )));
        }
        if !self.scale.is_finite() || self.scale <= 0.0 {
            return Err(KolosalError::invalid_parameter(
                "scale",
                self.scale,
                "must be a positive finite number",
            ));
        }
        if self.class_dim == 0 {
            return Err(KolosalError::invalid_parameter(
                "class_dim",
                self.class_dim,
                "must be positive",
            ));
        }
        Ok(())
    }
}
