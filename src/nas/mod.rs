//! Neural Architecture Search (NAS) Module
//!
//! Token-encoded search spaces for convolutional networks:
//! - Search space interface and shared base state
//! - MobileNetV1 search space (token encoding and decoding)
//! - Layer specifications and graph assembly over an external layer builder
//! - Shape inference for cheap parameter/FLOP estimates
//! - Registry for instantiating spaces by name from configuration

mod config;
mod layers;
mod mobilenet_v1;
mod registry;
mod search_space;
mod shape;

pub use config::SearchSpaceConfig;
pub use layers::{
    depthwise_separable, scale_channels, ArchHead, BottleneckParam, ConvBnSpec, FcSpec,
    LayerBuilder, LayerSpec, NetArch,
};
pub use mobilenet_v1::{
    MobileNetV1Space, FILTER_NUM1, FILTER_NUM2, FILTER_NUM3, FILTER_NUM4, FILTER_NUM5,
    FILTER_NUM6, FILTER_NUM7, FILTER_NUM8, FILTER_NUM9, HEAD_NUM, K_SIZE, REPEAT,
};
pub use registry::{SearchSpaceRegistry, SpaceFactory};
pub use search_space::{random_tokens, validate_tokens, SearchSpace, SearchSpaceBase, MAX_BLOCK_NUM};
pub use shape::{FeatureShape, LayerRecord, ShapeInference};
