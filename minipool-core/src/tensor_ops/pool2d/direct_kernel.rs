use crate::{dtypes::Dtype, tensor::Error};

use super::{Pool2DKernel, Pool2DKind, Pool2DOp};

/// Pools by visiting every window of every image directly, one output at a
/// time. The argmax buffer is laid out like the output,
/// `(batch, chan, h_out, w_out)`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DirectLoop;

impl DirectLoop {
    fn max_forward<E: Dtype>(op: &Pool2DOp, inp: &[E], out: &mut [E], arg_max: &mut [usize]) {
        let img_len = op.h_in * op.w_in;
        let out_len = op.h_out * op.w_out;
        for bc in 0..op.batch * op.chan {
            let img = &inp[bc * img_len..(bc + 1) * img_len];
            for oh in 0..op.h_out {
                for ow in 0..op.w_out {
                    let mut best = img[oh * op.stride * op.w_in + ow * op.stride];
                    let mut best_k = 0;
                    for k1 in 0..op.kernel_h {
                        let y = oh * op.stride + k1;
                        for k2 in 0..op.kernel_w {
                            let x = ow * op.stride + k2;
                            let v = img[y * op.w_in + x];
                            if v > best {
                                best = v;
                                best_k = k1 * op.kernel_w + k2;
                            }
                        }
                    }
                    let o = bc * out_len + oh * op.w_out + ow;
                    out[o] = best;
                    arg_max[o] = best_k;
                }
            }
        }
    }

    fn max_backward<E: Dtype>(
        op: &Pool2DOp,
        arg_max: &[usize],
        grad_inp: &mut [E],
        grad_out: &[E],
    ) {
        let img_len = op.h_in * op.w_in;
        let out_len = op.h_out * op.w_out;
        for bc in 0..op.batch * op.chan {
            let img_g = &mut grad_inp[bc * img_len..(bc + 1) * img_len];
            for oh in 0..op.h_out {
                for ow in 0..op.w_out {
                    let o = bc * out_len + oh * op.w_out + ow;
                    let k = arg_max[o];
                    let y = oh * op.stride + k / op.kernel_w;
                    let x = ow * op.stride + k % op.kernel_w;
                    img_g[y * op.w_in + x] += grad_out[o];
                }
            }
        }
    }

    fn avg_forward<E: Dtype>(op: &Pool2DOp, inp: &[E], out: &mut [E]) -> Result<(), Error> {
        let inv_k = pool_size_recip(op)?;
        let img_len = op.h_in * op.w_in;
        let out_len = op.h_out * op.w_out;
        for bc in 0..op.batch * op.chan {
            let img = &inp[bc * img_len..(bc + 1) * img_len];
            for oh in 0..op.h_out {
                for ow in 0..op.w_out {
                    let mut tmp = E::zero();
                    for k1 in 0..op.kernel_h {
                        let y = oh * op.stride + k1;
                        for k2 in 0..op.kernel_w {
                            tmp += img[y * op.w_in + ow * op.stride + k2];
                        }
                    }
                    out[bc * out_len + oh * op.w_out + ow] = tmp * inv_k;
                }
            }
        }
        Ok(())
    }

    fn avg_backward<E: Dtype>(
        op: &Pool2DOp,
        grad_inp: &mut [E],
        grad_out: &[E],
    ) -> Result<(), Error> {
        let inv_k = pool_size_recip(op)?;
        let img_len = op.h_in * op.w_in;
        let out_len = op.h_out * op.w_out;
        for bc in 0..op.batch * op.chan {
            let img_g = &mut grad_inp[bc * img_len..(bc + 1) * img_len];
            for oh in 0..op.h_out {
                for ow in 0..op.w_out {
                    let g = grad_out[bc * out_len + oh * op.w_out + ow] * inv_k;
                    for k1 in 0..op.kernel_h {
                        let y = oh * op.stride + k1;
                        for k2 in 0..op.kernel_w {
                            img_g[y * op.w_in + ow * op.stride + k2] += g;
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

/// `1 / (kernel_h * kernel_w)` in the element type.
pub(super) fn pool_size_recip<E: Dtype>(op: &Pool2DOp) -> Result<E, Error> {
    E::from_usize(op.pool_size())
        .map(E::recip)
        .ok_or(Error::InvalidConfig("pool size is not representable in the dtype"))
}

impl<E: Dtype> Pool2DKernel<E> for DirectLoop {
    fn forward(
        &self,
        op: &Pool2DOp,
        inp: &[E],
        out: &mut [E],
        arg_max: &mut [usize],
    ) -> Result<(), Error> {
        match op.kind {
            Pool2DKind::Max => {
                Self::max_forward(op, inp, out, arg_max);
                Ok(())
            }
            Pool2DKind::Avg => Self::avg_forward(op, inp, out),
        }
    }

    fn backward(
        &self,
        op: &Pool2DOp,
        arg_max: &[usize],
        grad_inp: &mut [E],
        grad_out: &[E],
    ) -> Result<(), Error> {
        match op.kind {
            Pool2DKind::Max => {
                Self::max_backward(op, arg_max, grad_inp, grad_out);
                Ok(())
            }
            Pool2DKind::Avg => Self::avg_backward(op, grad_inp, grad_out),
        }
    }
}
