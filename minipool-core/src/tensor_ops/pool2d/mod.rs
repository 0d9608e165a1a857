mod direct_kernel;
mod im2col_kernel;


pub use direct_kernel::DirectLoop;
pub use im2col_kernel::{col2im, im2col, Im2Col};

use crate::{dtypes::Dtype, shapes::IMAGE_DIMS, tensor::*};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Pool2DKind {
    /// Each window reduces to its maximum. Ties go to the first element in
    /// row-major window order.
    Max,
    /// Each window reduces to its mean.
    Avg,
}

/// Everything a kernel needs to know about one pooling call. Images are
/// `(batch, chan, h_in, w_in)`, outputs `(batch, chan, h_out, w_out)`.
/// There is no padding or dilation.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Pool2DOp {
    pub kind: Pool2DKind,
    pub kernel_h: usize,
    pub kernel_w: usize,
    pub stride: usize,
    pub batch: usize,
    pub chan: usize,
    pub h_in: usize,
    pub h_out: usize,
    pub w_in: usize,
    pub w_out: usize,
}

/// `⌊(dim - kernel) / stride⌋ + 1`, or `None` when the window does not fit or
/// any size is zero.
///
/// ```rust
/// # use minipool_core::tensor_ops::pool2d_out_dim;
/// assert_eq!(pool2d_out_dim(28, 2, 2), Some(14));
/// assert_eq!(pool2d_out_dim(5, 3, 1), Some(3));
/// assert_eq!(pool2d_out_dim(2, 3, 1), None);
/// ```
pub fn pool2d_out_dim(dim: usize, kernel: usize, stride: usize) -> Option<usize> {
    if dim == 0 || kernel == 0 || stride == 0 {
        return None;
    }
    dim.checked_sub(kernel).map(|d| d / stride + 1)
}

impl Pool2DOp {
    /// Builds the op for an input of shape `[batch, chan, h_in, w_in]`.
    /// `batch` may be zero; every other size must be positive and the window
    /// must fit inside the image.
    pub fn try_new(
        kind: Pool2DKind,
        [batch, chan, h_in, w_in]: [usize; 4],
        (kernel_h, kernel_w): (usize, usize),
        stride: usize,
    ) -> Result<Self, Error> {
        if chan == 0 {
            return Err(Error::InvalidConfig("number of channels must be positive"));
        }
        if stride == 0 {
            return Err(Error::InvalidConfig("stride must be positive"));
        }
        let h_out = pool2d_out_dim(h_in, kernel_h, stride)
            .ok_or(Error::InvalidConfig("pool height does not fit the input height"))?;
        let w_out = pool2d_out_dim(w_in, kernel_w, stride)
            .ok_or(Error::InvalidConfig("pool width does not fit the input width"))?;
        Ok(Self {
            kind,
            kernel_h,
            kernel_w,
            stride,
            batch,
            chan,
            h_in,
            h_out,
            w_in,
            w_out,
        })
    }

    /// Same op for a different batch size.
    pub fn with_batch(self, batch: usize) -> Self {
        Self { batch, ..self }
    }

    pub fn pool_size(&self) -> usize {
        self.kernel_h * self.kernel_w
    }

    pub fn inp_shape(&self) -> [usize; 4] {
        [self.batch, self.chan, self.h_in, self.w_in]
    }

    pub fn out_shape(&self) -> [usize; 4] {
        [self.batch, self.chan, self.h_out, self.w_out]
    }

    /// Number of pooling windows, which is also the number of outputs.
    pub fn num_windows(&self) -> usize {
        self.batch * self.chan * self.h_out * self.w_out
    }

    /// Length of the argmax buffer forward fills. Mean pooling keeps none.
    pub fn arg_max_len(&self) -> usize {
        match self.kind {
            Pool2DKind::Max => self.num_windows(),
            Pool2DKind::Avg => 0,
        }
    }
}

/// A pooling strategy. Buffers are contiguous and sized by the op:
/// `inp`/`grad_inp` hold `op.inp_shape()`, `out`/`grad_out` hold
/// `op.out_shape()`, and `arg_max` holds `op.arg_max_len()` entries.
pub trait Pool2DKernel<E: Dtype> {
    /// Writes every output and, for [Pool2DKind::Max], the flat in-window
    /// offset of each window's maximum.
    fn forward(
        &self,
        op: &Pool2DOp,
        inp: &[E],
        out: &mut [E],
        arg_max: &mut [usize],
    ) -> Result<(), Error>;

    /// Accumulates (`+=`) the gradient of every input element into `grad_inp`.
    fn backward(
        &self,
        op: &Pool2DOp,
        arg_max: &[usize],
        grad_inp: &mut [E],
        grad_out: &[E],
    ) -> Result<(), Error>;
}

fn check_shape(expected: [usize; IMAGE_DIMS], found: &[usize]) -> Result<(), Error> {
    if found != expected {
        return Err(Error::ShapeMismatch {
            expected: expected.to_vec(),
            found: found.to_vec(),
        });
    }
    Ok(())
}

/// Runs `kernel` forward on `inp`, returning the pooled tensor and the argmax
/// buffer (empty for mean pooling). `inp` must have shape `op.inp_shape()`.
pub fn try_pool2d_forward<E: Dtype, K: Pool2DKernel<E>>(
    kernel: &K,
    op: &Pool2DOp,
    inp: &Tensor<E>,
) -> Result<(Tensor<E>, Vec<usize>), Error> {
    check_shape(op.inp_shape(), inp.shape())?;
    log::trace!(
        "pool2d forward {:?} via {}",
        op,
        std::any::type_name::<K>()
    );
    let mut out = vec![E::zero(); op.num_windows()];
    let mut arg_max = vec![0; op.arg_max_len()];
    kernel.forward(op, inp.as_slice(), &mut out, &mut arg_max)?;
    Ok((Tensor::from_parts(out, op.out_shape().to_vec()), arg_max))
}

/// Runs `kernel` backward, returning the gradient with respect to the input.
/// `grad_out` must have shape `op.out_shape()` and `arg_max` must come from
/// the same kernel's forward for the same op.
pub fn try_pool2d_backward<E: Dtype, K: Pool2DKernel<E>>(
    kernel: &K,
    op: &Pool2DOp,
    arg_max: &[usize],
    grad_out: &Tensor<E>,
) -> Result<Tensor<E>, Error> {
    check_shape(op.out_shape(), grad_out.shape())?;
    if arg_max.len() != op.arg_max_len() {
        return Err(Error::StateMisuse("argmax buffer does not belong to this op"));
    }
    if arg_max.iter().any(|&k| k >= op.pool_size()) {
        return Err(Error::StateMisuse("argmax entry lies outside its window"));
    }
    log::trace!(
        "pool2d backward {:?} via {}",
        op,
        std::any::type_name::<K>()
    );
    let mut grad_inp = vec![E::zero(); op.batch * op.chan * op.h_in * op.w_in];
    kernel.backward(op, arg_max, &mut grad_inp, grad_out.as_slice())?;
    Ok(Tensor::from_parts(grad_inp, op.inp_shape().to_vec()))
}
