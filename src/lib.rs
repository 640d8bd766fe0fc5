//! Kolosal NAS - MobileNetV1 neural architecture search space
//!
//! This crate defines the discrete encoding used by architecture search
//! drivers: a fixed-length token vector, the range table bounding it, and the
//! decoder that turns tokens into a network topology.
//!
//! # Modules
//!
//! - [`nas`] - Search spaces, layer specifications, shape inference, registry
//! - [`error`] - Error and result types
//!
//! # Example
//!
//! ```
//! use kolosal_nas::prelude::*;
//!
//! let space = MobileNetV1Space::new(224, 7, 5)?;
//! let arch = space.token2arch(Some(&space.init_tokens()))?;
//!
//! let mut tracer = ShapeInference::new();
//! let out = arch.build(&mut tracer, FeatureShape::image(3, 224))?;
//! assert_eq!(out.height, 7);
//! # Ok::<(), kolosal_nas::KolosalError>(())
//! ```

// Core error handling
pub mod error;

// Search spaces
pub mod nas;

pub use error::{KolosalError, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::error::{KolosalError, Result};
    pub use crate::nas::{
        FeatureShape, LayerBuilder, MobileNetV1Space, NetArch, SearchSpace, SearchSpaceConfig,
        SearchSpaceRegistry, ShapeInference,
    };
}
