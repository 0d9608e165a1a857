//! Operations on tensors. The only operation family here is 2d pooling,
//! described by [Pool2DOp] and executed by a [Pool2DKernel].
//!
//! # Kernels
//!
//! A kernel is a strategy object. Every kernel implements the same contract
//! and must agree with every other kernel within floating point tolerance:
//!
//! | kernel | forward | backward |
//! | --- | --- | --- |
//! | [DirectLoop] | scan each window | scatter into the winning position |
//! | [Im2Col] | unroll windows to rows, reduce rows | one-hot rows, col2im |
//!
//! # Argmax layout
//!
//! The argmax buffer a kernel fills in forward is only meaningful to the same
//! kernel's backward. [DirectLoop] orders it `(batch, chan, h_out, w_out)`;
//! [Im2Col] orders it like the rows of its window matrix,
//! `(batch, h_out, w_out, chan)`.

mod pool2d;

pub use pool2d::{
    col2im, im2col, pool2d_out_dim, try_pool2d_backward, try_pool2d_forward, DirectLoop, Im2Col,
    Pool2DKernel, Pool2DKind, Pool2DOp,
};
