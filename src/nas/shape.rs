//! Shape Inference
//!
//! A [`LayerBuilder`] that needs no tensor engine: it propagates feature-map
//! shapes through the network and estimates parameter and FLOP counts.
//! Search drivers use it to reject architectures cheaply before training.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use super::layers::{ConvBnSpec, FcSpec, LayerBuilder};
use crate::error::{KolosalError, Result};

/// Feature map shape in CHW layout (batch dimension omitted)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FeatureShape {
    pub channels: usize,
    pub height: usize,
    pub width: usize,
}

impl FeatureShape {
    /// Create a new shape
    pub fn new(channels: usize, height: usize, width: usize) -> Self {
        Self { channels, height, width }
    }

    /// Square image input
    pub fn image(channels: usize, size: usize) -> Self {
        Self::new(channels, size, size)
    }

    /// Number of elements, `None` on overflow
    pub fn numel(&self) -> Option<usize> {
        self.channels
            .checked_mul(self.height)?
            .checked_mul(self.width)
    }
}

/// One layer seen by the shape tracer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayerRecord {
    /// Parameter name prefix
    pub name: String,
    /// Input shape
    pub input: FeatureShape,
    /// Output shape
    pub output: FeatureShape,
    /// Trainable parameters
    pub params: usize,
    /// Multiply-accumulate operations
    pub flops: usize,
}

/// Shape-propagating layer builder
#[derive(Debug, Default)]
pub struct ShapeInference {
    records: Vec<LayerRecord>,
    names: HashSet<String>,
}

impl ShapeInference {
    /// Create an empty tracer
    pub fn new() -> Self {
        Self::default()
    }

    /// Layers recorded so far, in build order
    pub fn records(&self) -> &[LayerRecord] {
        &self.records
    }

    /// Total trainable parameters (saturating)
    pub fn total_params(&self) -> usize {
        self.records.iter().fold(0, |acc, r| acc.saturating_add(r.params))
    }

    /// Total multiply-accumulate operations (saturating)
    pub fn total_flops(&self) -> usize {
        self.records.iter().fold(0, |acc, r| acc.saturating_add(r.flops))
    }

    fn claim_name(&mut self, name: &str) -> Result<()> {
        if !self.names.insert(name.to_string()) {
            return Err(KolosalError::ConfigError(format!(
                "duplicate parameter name '{}'",
                name
            )));
        }
        Ok(())
    }
}

/// Multiply layer dimensions, reporting overflow as a graph error
fn checked_product(layer: &str, factors: &[usize]) -> Result<usize> {
    factors
        .iter()
        .try_fold(1usize, |acc, &f| acc.checked_mul(f))
        .ok_or_else(|| {
            KolosalError::GraphError(format!("size of layer '{}' overflows usize", layer))
        })
}

impl LayerBuilder for ShapeInference {
    type Tensor = FeatureShape;

    fn conv_bn(&mut self, input: &FeatureShape, spec: &ConvBnSpec) -> Result<FeatureShape> {
        let groups = spec.groups();
        if groups == 0 || spec.num_filters == 0 || spec.stride == 0 || spec.filter_size == 0 {
            return Err(KolosalError::GraphError(format!(
                "layer '{}' has a zero-sized dimension \
                 (filters={}, groups={}, stride={}, kernel={})",
                spec.name, spec.num_filters, groups, spec.stride, spec.filter_size
            )));
        }
        if input.channels % groups != 0 || spec.num_filters % groups != 0 {
            return Err(KolosalError::ShapeError {
                expected: format!(
                    "channels divisible by {} groups in layer '{}'",
                    groups, spec.name
                ),
                actual: format!(
                    "{} input channels, {} filters",
                    input.channels, spec.num_filters
                ),
            });
        }

        let padding = spec.padding();
        let out_dim = |dim: usize| -> Result<usize> {
            let padded = dim
                .checked_add(2 * padding)
                .ok_or_else(|| KolosalError::GraphError(format!(
                    "padded size of layer '{}' overflows usize",
                    spec.name
                )))?;
            if padded < spec.filter_size {
                return Err(KolosalError::ShapeError {
                    expected: format!(
                        "spatial size >= {} in layer '{}'",
                        spec.filter_size, spec.name
                    ),
                    actual: format!("{}", dim),
                });
            }
            Ok((padded - spec.filter_size) / spec.stride + 1)
        };

        let output = FeatureShape::new(
            spec.num_filters,
            out_dim(input.height)?,
            out_dim(input.width)?,
        );

        // Conv has no bias; batch norm contributes scale and offset.
        let kernel_params = checked_product(
            &spec.name,
            &[spec.filter_size, spec.filter_size, input.channels / groups, spec.num_filters],
        )?;
        let params = kernel_params
            .checked_add(checked_product(&spec.name, &[2, spec.num_filters])?)
            .ok_or_else(|| {
                KolosalError::GraphError(format!(
                    "parameters of layer '{}' overflow usize",
                    spec.name
                ))
            })?;
        let flops = checked_product(&spec.name, &[kernel_params, output.height, output.width])?;
        self.claim_name(&spec.name)?;

        self.records.push(LayerRecord {
            name: spec.name.clone(),
            input: *input,
            output,
            params,
            flops,
        });
        Ok(output)
    }

    fn fc(&mut self, input: &FeatureShape, spec: &FcSpec) -> Result<FeatureShape> {
        if spec.size == 0 {
            return Err(KolosalError::GraphError(format!(
                "fc layer '{}' has zero units",
                spec.weight_name
            )));
        }
        let in_features = input.numel().ok_or_else(|| {
            KolosalError::GraphError(format!("input of '{}' overflows usize", spec.weight_name))
        })?;
        let flops = checked_product(&spec.weight_name, &[in_features, spec.size])?;
        let params = flops.checked_add(spec.size).ok_or_else(|| {
            KolosalError::GraphError(format!("parameters of '{}' overflow usize", spec.weight_name))
        })?;
        self.claim_name(&spec.weight_name)?;
        self.claim_name(&spec.bias_name)?;

        let output = FeatureShape::new(spec.size, 1, 1);
        self.records.push(LayerRecord {
            name: spec.weight_name.clone(),
            input: *input,
            output,
            params,
            flops,
        });
        Ok(output)
    }

    fn spatial_size(&self, tensor: &FeatureShape) -> usize {
        tensor.height
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stride_two_conv_halves() {
        let mut tracer = ShapeInference::new();
        let out = tracer
            .conv_bn(&FeatureShape::image(3, 224), &ConvBnSpec::new(3, 32, 2, "stem"))
            .unwrap();
        assert_eq!(out, FeatureShape::image(32, 112));

        let out = tracer
            .conv_bn(&out, &ConvBnSpec::new(5, 32, 2, "dw").with_groups(32))
            .unwrap();
        assert_eq!(out, FeatureShape::image(32, 56));
    }

    #[test]
    fn test_param_count() {
        let mut tracer = ShapeInference::new();
        let input = FeatureShape::image(32, 8);
        tracer
            .conv_bn(&input, &ConvBnSpec::new(3, 32, 1, "dw").with_groups(32))
            .unwrap();
        tracer.conv_bn(&input, &ConvBnSpec::new(1, 64, 1, "pw")).unwrap();

        // depthwise: 3*3*1*32 + 64, pointwise: 1*1*32*64 + 128
        assert_eq!(tracer.total_params(), 288 + 64 + 2048 + 128);
        assert_eq!(tracer.records().len(), 2);
        assert_eq!(tracer.total_flops(), 288 * 64 + 2048 * 64);
    }

    #[test]
    fn test_group_mismatch() {
        let mut tracer = ShapeInference::new();
        let spec = ConvBnSpec::new(3, 24, 1, "dw").with_groups(24);
        let err = tracer.conv_bn(&FeatureShape::image(32, 8), &spec).unwrap_err();
        assert!(matches!(err, KolosalError::ShapeError { .. }));
    }

    #[test]
    fn test_duplicate_names() {
        let mut tracer = ShapeInference::new();
        let input = FeatureShape::image(3, 8);
        tracer.conv_bn(&input, &ConvBnSpec::new(3, 8, 1, "conv")).unwrap();
        let err = tracer.conv_bn(&input, &ConvBnSpec::new(3, 8, 1, "conv")).unwrap_err();
        assert!(matches!(err, KolosalError::ConfigError(_)));
    }

    #[test]
    fn test_overflowing_layer_is_an_error() {
        let mut tracer = ShapeInference::new();
        let wide = 1usize << 40;
        let err = tracer
            .conv_bn(&FeatureShape::image(wide, 8), &ConvBnSpec::new(3, wide, 1, "wide"))
            .unwrap_err();
        assert!(matches!(err, KolosalError::GraphError(_)));
        assert!(tracer.records().is_empty());

        // The failed layer did not claim its name.
        let out = tracer
            .conv_bn(&FeatureShape::image(3, 8), &ConvBnSpec::new(3, 8, 1, "wide"))
            .unwrap();
        assert_eq!(out.channels, 8);
    }

    #[test]
    fn test_fc_overflow_is_an_error() {
        let mut tracer = ShapeInference::new();
        let fc = FcSpec {
            size: 1 << 20,
            weight_name: "fc_w".to_string(),
            bias_name: "fc_b".to_string(),
        };
        let input = FeatureShape::new(1 << 30, 1 << 20, 1);
        let err = tracer.fc(&input, &fc).unwrap_err();
        assert!(matches!(err, KolosalError::GraphError(_)));
    }

    #[test]
    fn test_numel_overflow() {
        assert_eq!(FeatureShape::image(4, 8).numel(), Some(256));
        assert_eq!(FeatureShape::image(usize::MAX, 2).numel(), None);
    }

    #[test]
    fn test_fc_flattens() {
        let mut tracer = ShapeInference::new();
        let fc = FcSpec {
            size: 10,
            weight_name: "fc_w".to_string(),
            bias_name: "fc_b".to_string(),
        };
        let out = tracer.fc(&FeatureShape::image(16, 2), &fc).unwrap();
        assert_eq!(out, FeatureShape::new(10, 1, 1));
        assert_eq!(tracer.total_params(), 64 * 10 + 10);
    }
}
