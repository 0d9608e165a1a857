//! # minipool
//!
//! A single max / mean 2d pooling layer for convolutional networks, with two
//! interchangeable kernels behind it.
//!
//! # Layers
//!
//! *See [nn] for more information.*
//!
//! A [`nn::PoolingLayer`] is configured once with a [`nn::PoolingConfig`]
//! and then driven through the [`nn::Layer`] trait: `forward` caches what the
//! next `backward` needs, and `backward` consumes it.
//!
//! ```rust
//! # use minipool::prelude::*;
//! let config = PoolingConfig::new((1, 2, 2), (2, 2), 2, PoolingMode::Max);
//! let mut layer: PoolingLayer<f32> = PoolingLayer::try_new(config).unwrap();
//!
//! let x = Tensor::from([[[[1.0, 5.0], [3.0, 2.0]]]]);
//! let z = layer.forward(&x);
//! assert_eq!(z.as_vec(), [5.0]);
//!
//! let dx = layer.backward(&Tensor::from([[[[1.0]]]]), 1);
//! assert_eq!(dx.as_vec(), [0.0, 1.0, 0.0, 0.0]);
//! ```
//!
//! # Kernels
//!
//! The kernel is a type parameter of the layer. [`DirectLoop`] is the default;
//! [`Im2Col`] computes the same thing through a window matrix:
//!
//! ```rust
//! # use minipool::prelude::*;
//! let config = PoolingConfig::new((1, 2, 2), (2, 2), 2, PoolingMode::Max);
//! let mut layer: PoolingLayer<f32, Im2Col> = PoolingLayer::try_new(config).unwrap();
//! let z = layer.forward(&Tensor::from([[[[1.0, 5.0], [3.0, 2.0]]]]));
//! assert_eq!(z.as_vec(), [5.0]);
//! ```
//!
//! # Feature flags
//!
//! - `safetensors` (default): [`nn::SafeTensorsModeStore`], which persists a
//!   layer's pooling mode in the metadata of a `.safetensors` file.

pub mod nn;

pub use minipool_core::{dtypes, shapes, tensor, tensor_ops, Error, Tensor};

/// Contains all the layer traits and types, plus the core prelude.
pub mod prelude {
    pub use crate::nn::*;
    pub use minipool_core::prelude::*;
}
