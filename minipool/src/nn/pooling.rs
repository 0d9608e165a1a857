use minipool_core::{
    dtypes::Dtype,
    shapes::IMAGE_DIMS,
    tensor_ops::{
        try_pool2d_backward, try_pool2d_forward, DirectLoop, Pool2DKernel, Pool2DKind, Pool2DOp,
    },
    Error, Tensor,
};

use super::{Layer, ModeStore};

/// How each pooling window reduces to one value.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash)]
pub enum PoolingMode {
    #[default]
    Max,
    /// Window average. Backward spreads each gradient uniformly,
    /// `delta / pool_size` to every element of the window.
    Mean,
}

impl From<PoolingMode> for Pool2DKind {
    fn from(mode: PoolingMode) -> Self {
        match mode {
            PoolingMode::Max => Pool2DKind::Max,
            PoolingMode::Mean => Pool2DKind::Avg,
        }
    }
}

impl std::fmt::Display for PoolingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Max => f.write_str("MAX"),
            Self::Mean => f.write_str("MEAN"),
        }
    }
}

impl std::str::FromStr for PoolingMode {
    type Err = Error;

    /// Parses `"MAX"` or `"MEAN"`, ignoring case.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("max") {
            Ok(Self::Max)
        } else if s.eq_ignore_ascii_case("mean") {
            Ok(Self::Mean)
        } else {
            Err(Error::UnsupportedMode(s.to_string()))
        }
    }
}

/// Construction parameters of a [PoolingLayer].
///
/// - `input_shape`: `(channels, height, width)` of one image.
/// - `pool_shape`: `(height, width)` of the pooling window.
/// - `stride`: step between window origins, in both directions.
/// - `mode`: [PoolingMode::Max] or [PoolingMode::Mean].
///
/// There is no padding: each output dimension is
/// `(input - pool) / stride + 1`, rounded down.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct PoolingConfig {
    pub input_shape: (usize, usize, usize),
    pub pool_shape: (usize, usize),
    pub stride: usize,
    pub mode: PoolingMode,
}

impl PoolingConfig {
    pub fn new(
        input_shape: (usize, usize, usize),
        pool_shape: (usize, usize),
        stride: usize,
        mode: PoolingMode,
    ) -> Self {
        Self {
            input_shape,
            pool_shape,
            stride,
            mode,
        }
    }

    /// The kernel op for a batch of `batch` images. Fails with
    /// [Error::InvalidConfig] if any output dimension would be empty.
    pub fn try_op(&self, batch: usize) -> Result<Pool2DOp, Error> {
        let (chan, h, w) = self.input_shape;
        Pool2DOp::try_new(self.mode.into(), [batch, chan, h, w], self.pool_shape, self.stride)
    }
}

#[derive(Debug, Clone)]
struct Cycle<E> {
    op: Pool2DOp,
    x: Tensor<E>,
    z: Tensor<E>,
    arg_max: Vec<usize>,
}

/// `Idle -> AwaitingBackward -> Idle`. Forward always lands in
/// `AwaitingBackward`, backward always leaves it.
#[derive(Debug, Clone)]
enum Phase<E> {
    Idle,
    AwaitingBackward(Cycle<E>),
}

/// Max or mean 2d pooling over `(batch, channels, height, width)` tensors.
///
/// The kernel `K` decides how windows are evaluated; [DirectLoop] and
/// [minipool_core::tensor_ops::Im2Col] give the same results. The layer keeps
/// a shared handle to the last training input, the last output, and the
/// argmax of every window until the matching backward.
///
/// Examples:
/// ```rust
/// # use minipool::prelude::*;
/// let config = PoolingConfig::new((3, 28, 28), (2, 2), 2, PoolingMode::Max);
/// let layer: PoolingLayer<f32> = PoolingLayer::try_new(config).unwrap();
/// assert_eq!(layer.output_shape(), (3, 14, 14));
/// assert_eq!(layer.output_size(), 3 * 14 * 14);
/// ```
#[derive(Debug, Clone)]
pub struct PoolingLayer<E, K = DirectLoop> {
    config: PoolingConfig,
    op: Pool2DOp,
    kernel: K,
    phase: Phase<E>,
}

impl<E: Dtype, K: Pool2DKernel<E> + Default> PoolingLayer<E, K> {
    pub fn try_new(config: PoolingConfig) -> Result<Self, Error> {
        Self::try_with_kernel(config, K::default())
    }
}

impl<E: Dtype, K: Pool2DKernel<E>> PoolingLayer<E, K> {
    pub fn try_with_kernel(config: PoolingConfig, kernel: K) -> Result<Self, Error> {
        let op = config.try_op(0)?;
        Ok(Self {
            config,
            op,
            kernel,
            phase: Phase::Idle,
        })
    }

    pub fn config(&self) -> &PoolingConfig {
        &self.config
    }

    pub fn mode(&self) -> PoolingMode {
        self.config.mode
    }

    pub fn kernel(&self) -> &K {
        &self.kernel
    }

    /// `(channels, output height, output width)` of one pooled image.
    pub fn output_shape(&self) -> (usize, usize, usize) {
        (self.op.chan, self.op.h_out, self.op.w_out)
    }

    pub fn output_size(&self) -> usize {
        self.op.chan * self.op.h_out * self.op.w_out
    }

    pub fn pool_size(&self) -> usize {
        self.op.pool_size()
    }

    /// Whether a forward pass is cached and waiting for its backward.
    pub fn is_awaiting_backward(&self) -> bool {
        matches!(self.phase, Phase::AwaitingBackward(_))
    }

    /// Batch size of the in-flight forward pass.
    pub fn batch_size(&self) -> Option<usize> {
        match &self.phase {
            Phase::Idle => None,
            Phase::AwaitingBackward(cycle) => Some(cycle.op.batch),
        }
    }

    /// The input of the in-flight forward pass.
    pub fn input(&self) -> Option<&Tensor<E>> {
        match &self.phase {
            Phase::Idle => None,
            Phase::AwaitingBackward(cycle) => Some(&cycle.x),
        }
    }

    /// The output of the in-flight forward pass.
    pub fn output(&self) -> Option<&Tensor<E>> {
        match &self.phase {
            Phase::Idle => None,
            Phase::AwaitingBackward(cycle) => Some(&cycle.z),
        }
    }

    fn op_for(&self, x: &Tensor<E>) -> Result<Pool2DOp, Error> {
        let shape = x.shape();
        let batch = shape.first().copied().unwrap_or(0);
        let op = self.op.with_batch(batch);
        if shape.len() != IMAGE_DIMS || shape != op.inp_shape() {
            return Err(Error::ShapeMismatch {
                expected: op.inp_shape().to_vec(),
                found: shape.to_vec(),
            });
        }
        Ok(op)
    }

    /// Pools `x` without caching anything, leaving any in-flight forward pass
    /// untouched. Use this for inference.
    pub fn try_predict(&self, x: &Tensor<E>) -> Result<Tensor<E>, Error> {
        let op = self.op_for(x)?;
        let (z, _) = try_pool2d_forward(&self.kernel, &op, x)?;
        Ok(z)
    }

    pub fn predict(&self, x: &Tensor<E>) -> Tensor<E> {
        self.try_predict(x).unwrap()
    }

    /// Writes this layer's pooling mode to `store`.
    pub fn save_parameters<S: ModeStore + ?Sized>(&self, store: &S) -> Result<(), Error> {
        store.save_mode(self.config.mode)
    }

    /// Replaces this layer's pooling mode with the one in `store`. Any
    /// in-flight forward pass is dropped, since its cache belongs to the old mode.
    pub fn load_parameters<S: ModeStore + ?Sized>(&mut self, store: &S) -> Result<(), Error> {
        let mode = store.load_mode()?;
        let config = PoolingConfig { mode, ..self.config };
        let op = config.try_op(0)?;
        log::debug!("pooling layer mode loaded: {} -> {}", self.config.mode, mode);
        self.config = config;
        self.op = op;
        self.phase = Phase::Idle;
        Ok(())
    }
}

impl<E: Dtype, K: Pool2DKernel<E>> Layer<E> for PoolingLayer<E, K> {
    fn try_forward(&mut self, x: &Tensor<E>) -> Result<Tensor<E>, Error> {
        let op = self.op_for(x)?;
        let (z, arg_max) = try_pool2d_forward(&self.kernel, &op, x)?;
        if self.is_awaiting_backward() {
            log::debug!("pooling forward replaced a pass that never ran backward");
        }
        self.phase = Phase::AwaitingBackward(Cycle {
            op,
            x: x.clone(),
            z: z.clone(),
            arg_max,
        });
        Ok(z)
    }

    fn try_backward(&mut self, delta_in: &Tensor<E>, layer_idx: usize) -> Result<Tensor<E>, Error> {
        let Phase::AwaitingBackward(cycle) = &self.phase else {
            return Err(Error::StateMisuse("backward called without a pending forward"));
        };
        if delta_in.shape() != cycle.z.shape() {
            return Err(Error::ShapeMismatch {
                expected: cycle.z.shape().to_vec(),
                found: delta_in.shape().to_vec(),
            });
        }
        log::trace!("pooling backward for layer {layer_idx}");
        let delta_out = try_pool2d_backward(&self.kernel, &cycle.op, &cycle.arg_max, delta_in)?;
        debug_assert_eq!(delta_out.shape(), cycle.x.shape());
        self.phase = Phase::Idle;
        Ok(delta_out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nn::MemoryModeStore;
    use minipool_core::{tensor_ops::Im2Col, tests::*};
    use rand::{rngs::StdRng, SeedableRng};

    fn max_config() -> PoolingConfig {
        PoolingConfig::new((1, 2, 2), (2, 2), 2, PoolingMode::Max)
    }

    #[test]
    fn test_mode_names() {
        assert_eq!("MAX".parse::<PoolingMode>().unwrap(), PoolingMode::Max);
        assert_eq!("mean".parse::<PoolingMode>().unwrap(), PoolingMode::Mean);
        assert_eq!(PoolingMode::Mean.to_string(), "MEAN");
        assert!(matches!(
            "MIN".parse::<PoolingMode>(),
            Err(Error::UnsupportedMode(m)) if m == "MIN"
        ));
    }

    #[test]
    fn test_invalid_configs() {
        let bad = [
            PoolingConfig::new((3, 2, 2), (3, 3), 1, PoolingMode::Max),
            PoolingConfig::new((3, 8, 8), (2, 2), 0, PoolingMode::Max),
            PoolingConfig::new((0, 8, 8), (2, 2), 2, PoolingMode::Mean),
            PoolingConfig::new((3, 8, 8), (2, 0), 2, PoolingMode::Mean),
        ];
        for config in bad {
            let r: Result<PoolingLayer<TestDtype>, _> = PoolingLayer::try_new(config);
            assert!(matches!(r, Err(Error::InvalidConfig(_))), "{config:?}");
        }
    }

    #[test]
    fn test_output_dims() {
        let config = PoolingConfig::new((3, 7, 10), (2, 3), 2, PoolingMode::Max);
        let mut layer: PoolingLayer<TestDtype> = PoolingLayer::try_new(config).unwrap();
        assert_eq!(layer.output_shape(), (3, 3, 4));
        assert_eq!(layer.pool_size(), 6);
        let x: Tensor<TestDtype> = Tensor::zeros(&[5, 3, 7, 10]);
        let z = layer.forward(&x);
        assert_eq!(z.shape(), &[5, 3, 3, 4]);
        assert_eq!(layer.batch_size(), Some(5));
    }

    #[test]
    fn test_forward_keeps_shared_input() {
        let mut layer: PoolingLayer<TestDtype> = PoolingLayer::try_new(max_config()).unwrap();
        let x: Tensor<TestDtype> = Tensor::from([[[[1.0, 5.0], [3.0, 2.0]]]]);
        let z = layer.forward(&x);
        assert!(layer.input().unwrap().ptr_eq(&x));
        assert!(layer.output().unwrap().ptr_eq(&z));
        assert_close_to_literal!(x, [[[[1.0, 5.0], [3.0, 2.0]]]]);
    }

    #[test]
    fn test_forward_rejects_bad_shapes() {
        let mut layer: PoolingLayer<TestDtype> = PoolingLayer::try_new(max_config()).unwrap();
        for shape in [&[1, 2, 2][..], &[1, 1, 2, 3], &[1, 2, 2, 2], &[1, 1, 1, 2, 2]] {
            let x: Tensor<TestDtype> = Tensor::zeros(shape);
            assert!(
                matches!(layer.try_forward(&x), Err(Error::ShapeMismatch { .. })),
                "{shape:?}"
            );
        }
        assert!(!layer.is_awaiting_backward());
    }

    #[test]
    fn test_backward_requires_forward() {
        let mut layer: PoolingLayer<TestDtype> = PoolingLayer::try_new(max_config()).unwrap();
        let g: Tensor<TestDtype> = Tensor::from([[[[1.0]]]]);
        assert!(matches!(
            layer.try_backward(&g, 0),
            Err(Error::StateMisuse(_))
        ));

        let _ = layer.forward(&Tensor::from([[[[1.0, 5.0], [3.0, 2.0]]]]));
        assert!(layer.is_awaiting_backward());
        let dx = layer.backward(&g, 0);
        assert_close_to_literal!(dx, [[[[0.0, 1.0], [0.0, 0.0]]]]);
        assert!(!layer.is_awaiting_backward());
        assert!(matches!(
            layer.try_backward(&g, 0),
            Err(Error::StateMisuse(_))
        ));
    }

    #[test]
    fn test_backward_shape_mismatch_keeps_pending_pass() {
        let mut layer: PoolingLayer<TestDtype> = PoolingLayer::try_new(max_config()).unwrap();
        let _ = layer.forward(&Tensor::from([[[[1.0, 5.0], [3.0, 2.0]]]]));
        for g in [
            Tensor::zeros(&[1, 1, 1]),
            Tensor::zeros(&[2, 1, 1, 1]),
            Tensor::zeros(&[1, 1, 2, 2]),
        ] {
            assert!(matches!(
                layer.try_backward(&g, 0),
                Err(Error::ShapeMismatch { .. })
            ));
            assert!(layer.is_awaiting_backward());
        }
        let dx = layer.backward(&Tensor::from([[[[2.0]]]]), 0);
        assert_close_to_literal!(dx, [[[[0.0, 2.0], [0.0, 0.0]]]]);
    }

    #[test]
    fn test_second_forward_replaces_first() {
        let config = PoolingConfig::new((1, 2, 2), (2, 2), 2, PoolingMode::Max);
        let mut layer: PoolingLayer<TestDtype> = PoolingLayer::try_new(config).unwrap();
        let _ = layer.forward(&Tensor::from([[[[1.0, 5.0], [3.0, 2.0]]]]));
        let x: Tensor<TestDtype> =
            Tensor::from([[[[9.0, 5.0], [3.0, 2.0]]], [[[0.0, 0.0], [0.0, 1.0]]]]);
        let _ = layer.forward(&x);
        assert_eq!(layer.batch_size(), Some(2));
        let dx = layer.backward(&Tensor::from([[[[1.0]]], [[[3.0]]]]), 0);
        assert_close_to_literal!(dx, [[[[1.0, 0.0], [0.0, 0.0]]], [[[0.0, 0.0], [0.0, 3.0]]]]);
    }

    #[test]
    fn test_predict_leaves_state_alone() {
        let mut layer: PoolingLayer<TestDtype, Im2Col> =
            PoolingLayer::try_new(max_config()).unwrap();
        let x: Tensor<TestDtype> = Tensor::from([[[[1.0, 5.0], [3.0, 2.0]]]]);
        assert_close_to_literal!(layer.predict(&x), [[[[5.0]]]]);
        assert!(!layer.is_awaiting_backward());

        let _ = layer.forward(&x);
        let other: Tensor<TestDtype> = Tensor::from([[[[7.0, 0.0], [0.0, 0.0]]]]);
        assert_close_to_literal!(layer.predict(&other), [[[[7.0]]]]);
        assert!(layer.input().unwrap().ptr_eq(&x));
        let dx = layer.backward(&Tensor::from([[[[1.0]]]]), 0);
        assert_close_to_literal!(dx, [[[[0.0, 1.0], [0.0, 0.0]]]]);
    }

    #[test]
    fn test_mean_mode() {
        let config = PoolingConfig::new((1, 2, 4), (2, 2), 2, PoolingMode::Mean);
        let mut layer: PoolingLayer<TestDtype> = PoolingLayer::try_new(config).unwrap();
        let x: Tensor<TestDtype> = Tensor::from([[[[1.0, 2.0, 3.0, 4.0], [5.0, 6.0, 7.0, 8.0]]]]);
        assert_close_to_literal!(layer.forward(&x), [[[[3.5, 5.5]]]]);
        let dx = layer.backward(&Tensor::from([[[[4.0, 8.0]]]]), 0);
        assert_close_to_literal!(dx, [[[[1.0, 1.0, 2.0, 2.0], [1.0, 1.0, 2.0, 2.0]]]]);
    }

    #[test]
    fn test_identical_layers_are_deterministic() {
        let config = PoolingConfig::new((3, 9, 9), (3, 3), 2, PoolingMode::Max);
        let mut a: PoolingLayer<TestDtype> = PoolingLayer::try_new(config).unwrap();
        let mut b: PoolingLayer<TestDtype> = PoolingLayer::try_new(config).unwrap();
        let mut rng = StdRng::seed_from_u64(5);
        let x: Tensor<TestDtype> = Tensor::sample_normal(&[2, 3, 9, 9], &mut rng);
        let g: Tensor<TestDtype> = Tensor::sample_normal(&[2, 3, 4, 4], &mut rng);
        assert_eq!(a.forward(&x), b.forward(&x));
        assert_eq!(a.backward(&g, 0), b.backward(&g, 0));
    }

    #[test]
    fn test_load_parameters_switches_mode() {
        let store = MemoryModeStore::default();
        let mean = PoolingConfig::new((1, 2, 2), (2, 2), 2, PoolingMode::Mean);
        let source: PoolingLayer<TestDtype> = PoolingLayer::try_new(mean).unwrap();
        source.save_parameters(&store).unwrap();

        let mut layer: PoolingLayer<TestDtype> = PoolingLayer::try_new(max_config()).unwrap();
        let x: Tensor<TestDtype> = Tensor::from([[[[1.0, 5.0], [3.0, 2.0]]]]);
        let _ = layer.forward(&x);
        layer.load_parameters(&store).unwrap();
        assert_eq!(layer.mode(), PoolingMode::Mean);
        assert!(!layer.is_awaiting_backward());
        assert_close_to_literal!(layer.forward(&x), [[[[2.75]]]]);
    }

    #[test]
    fn test_load_parameters_from_empty_store() {
        let mut layer: PoolingLayer<TestDtype> = PoolingLayer::try_new(max_config()).unwrap();
        assert!(matches!(
            layer.load_parameters(&MemoryModeStore::default()),
            Err(Error::MissingMetadata(_))
        ));
        assert_eq!(layer.mode(), PoolingMode::Max);
    }
}
