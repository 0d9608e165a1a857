//! High level neural network building blocks: the [Layer] contract, the
//! [PoolingLayer] that implements it, and mode persistence through [ModeStore].
//!
//! # Forward / backward alternation
//!
//! A layer holds at most one in-flight activation. Each training `forward`
//! replaces it and each `backward` consumes it, so calls must alternate:
//!
//! ```rust
//! # use minipool::prelude::*;
//! let config = PoolingConfig::new((1, 4, 4), (2, 2), 2, PoolingMode::Max);
//! let mut layer: PoolingLayer<f32> = PoolingLayer::try_new(config).unwrap();
//! let g: Tensor<f32> = Tensor::zeros(&[1, 1, 2, 2]);
//! assert!(matches!(layer.try_backward(&g, 0), Err(Error::StateMisuse(_))));
//!
//! let _ = layer.forward(&Tensor::zeros(&[1, 1, 4, 4]));
//! assert!(layer.try_backward(&g, 0).is_ok());
//! assert!(layer.try_backward(&g, 0).is_err());
//! ```

mod layer;
mod mode_store;
mod pooling;

pub use layer::Layer;
pub use mode_store::{ModeStore, MemoryModeStore, MODE_KEY};
#[cfg(feature = "safetensors")]
pub use mode_store::SafeTensorsModeStore;
pub use pooling::{PoolingConfig, PoolingLayer, PoolingMode};
