//! Layer Specifications and Graph Assembly
//!
//! A decoded architecture is a plain list of layer records. Building an
//! actual graph is delegated to a [`LayerBuilder`], so decoding stays pure
//! and the tensor engine stays outside this crate.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{KolosalError, Result};

/// Fused convolution + batch normalization layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConvBnSpec {
    /// Square kernel size
    pub filter_size: usize,
    /// Number of output channels
    pub num_filters: usize,
    /// Convolution stride
    pub stride: usize,
    /// Group count for grouped/depthwise convolution
    pub num_groups: Option<usize>,
    /// Whether the vendor fast path may be used
    pub use_cudnn: bool,
    /// Parameter name prefix
    pub name: String,
}

impl ConvBnSpec {
    /// Create a plain (ungrouped) conv+bn layer
    pub fn new(
        filter_size: usize,
        num_filters: usize,
        stride: usize,
        name: impl Into<String>,
    ) -> Self {
        Self {
            filter_size,
            num_filters,
            stride,
            num_groups: None,
            use_cudnn: true,
            name: name.into(),
        }
    }

    /// Set the group count
    pub fn with_groups(mut self, groups: usize) -> Self {
        self.num_groups = Some(groups);
        self
    }

    /// Disable the cudnn path
    pub fn without_cudnn(mut self) -> Self {
        self.use_cudnn = false;
        self
    }

    /// "Same" padding for odd kernels
    pub fn padding(&self) -> usize {
        self.filter_size.saturating_sub(1) / 2
    }

    /// Effective group count
    pub fn groups(&self) -> usize {
        self.num_groups.unwrap_or(1)
    }
}

/// Fully connected classification layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FcSpec {
    /// Output units
    pub size: usize,
    /// Weight parameter name
    pub weight_name: String,
    /// Bias parameter name
    pub bias_name: String,
}

/// A single layer of a decoded network
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LayerSpec {
    ConvBn(ConvBnSpec),
    Fc(FcSpec),
}

impl LayerSpec {
    /// Parameter name that identifies the layer
    pub fn name(&self) -> &str {
        match self {
            LayerSpec::ConvBn(conv) => &conv.name,
            LayerSpec::Fc(fc) => &fc.weight_name,
        }
    }
}

/// One decoded bottleneck entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BottleneckParam {
    /// Depthwise channel count (before scaling)
    pub in_channels: usize,
    /// Pointwise channel count (before scaling)
    pub out_channels: usize,
    /// Depthwise stride
    pub stride: usize,
    /// Depthwise kernel size
    pub kernel_size: usize,
}

/// What happens after the last body layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArchHead {
    /// Append a classifier; the feature map size is not checked
    Classifier(FcSpec),
    /// Require the final feature map to have this spatial size
    FeatureMap {
        output_size: usize,
        input_size: usize,
        block_num: usize,
    },
}

/// External layer-construction primitive.
///
/// Implementations own the tensor type and all parameter allocation.
pub trait LayerBuilder {
    /// Tensor/feature-map handle produced by the builder
    type Tensor;

    /// Build a conv+bn layer on top of `input`
    fn conv_bn(&mut self, input: &Self::Tensor, spec: &ConvBnSpec) -> Result<Self::Tensor>;

    /// Build a fully connected layer on top of `input`
    fn fc(&mut self, input: &Self::Tensor, spec: &FcSpec) -> Result<Self::Tensor>;

    /// Spatial (height) size of a tensor in NCHW layout
    fn spatial_size(&self, tensor: &Self::Tensor) -> usize;
}

/// A decoded architecture, ready to be built against any [`LayerBuilder`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetArch {
    /// Stem output channels
    pub head_channels: usize,
    /// Decoded bottleneck entries, in build order
    pub bottlenecks: Vec<BottleneckParam>,
    /// Width multiplier applied to depthwise-separable block channels
    pub scale: f64,
    /// Body layers (stem + depthwise-separable blocks)
    pub layers: Vec<LayerSpec>,
    /// Classifier or output-size check
    pub head: ArchHead,
}

impl NetArch {
    /// Every layer `build` will emit, in order
    pub fn layer_specs(&self) -> Vec<LayerSpec> {
        let mut specs = self.layers.clone();
        if let ArchHead::Classifier(fc) = &self.head {
            specs.push(LayerSpec::Fc(fc.clone()));
        }
        specs
    }

    /// Number of bottleneck entries
    pub fn num_bottlenecks(&self) -> usize {
        self.bottlenecks.len()
    }

    /// Build the network on `input`, returning the output tensor
    pub fn build<B: LayerBuilder>(&self, builder: &mut B, input: B::Tensor) -> Result<B::Tensor> {
        let mut x = input;
        for layer in &self.layers {
            x = match layer {
                LayerSpec::ConvBn(conv) => builder.conv_bn(&x, conv)?,
                LayerSpec::Fc(fc) => builder.fc(&x, fc)?,
            };
        }

        match &self.head {
            ArchHead::Classifier(fc) => {
                warn!(
                    class_dim = fc.size,
                    "output_size is 1, appending fc layer at the end of the network"
                );
                x = builder.fc(&x, fc)?;
            }
            ArchHead::FeatureMap { output_size, input_size, block_num } => {
                let actual = builder.spatial_size(&x);
                if actual != *output_size {
                    return Err(KolosalError::ShapeError {
                        expected: format!(
                            "output_size == input_size / 2^block_num \
                             (input_size={}, output_size={}, block_num={})",
                            input_size, output_size, block_num
                        ),
                        actual: format!("feature map of spatial size {}", actual),
                    });
                }
            }
        }

        debug!(layers = self.layers.len(), "network assembled");
        Ok(x)
    }
}

/// Build a depthwise-separable block: depthwise conv+bn then pointwise conv+bn.
///
/// Channel counts are scaled and truncated toward zero. Returns the two
/// layer records in build order.
pub fn depthwise_separable(
    in_channels: usize,
    out_channels: usize,
    groups: usize,
    stride: usize,
    scale: f64,
    kernel_size: usize,
    name: &str,
) -> [LayerSpec; 2] {
    let depthwise = ConvBnSpec::new(
        kernel_size,
        scale_channels(in_channels, scale),
        stride,
        format!("{}_dw", name),
    )
    .with_groups(scale_channels(groups, scale))
    .without_cudnn();
    let pointwise = ConvBnSpec::new(
        1,
        scale_channels(out_channels, scale),
        1,
        format!("{}_sep", name),
    );

    [LayerSpec::ConvBn(depthwise), LayerSpec::ConvBn(pointwise)]
}

/// Apply a width multiplier, truncating toward zero
pub fn scale_channels(channels: usize, scale: f64) -> usize {
    (channels as f64 * scale) as usize
}
