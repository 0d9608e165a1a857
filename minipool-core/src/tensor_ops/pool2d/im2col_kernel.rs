use crate::{dtypes::Dtype, shapes::permute_into, tensor::Error};

use super::{direct_kernel::pool_size_recip, Pool2DKernel, Pool2DKind, Pool2DOp};

/// Pools by first unrolling every window into one row of a
/// `(batch * h_out * w_out * chan, kernel_h * kernel_w)` matrix, then reducing
/// the rows. Backward builds the matching gradient matrix and folds it back
/// with [col2im]. Trades memory for a few large, regular passes.
///
/// The argmax buffer follows the row order of the window matrix,
/// `(batch, h_out, w_out, chan)`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Im2Col;

/// Unrolls the windows of `img` (shaped `op.inp_shape()`) into `col`. Row
/// `((b * h_out + oh) * w_out + ow) * chan + c` holds the window at
/// `(oh * stride, ow * stride)` of image `b`, channel `c`, in row-major order.
///
/// Returns [Error::ShapeMismatch] (`[image_len, col_len]`) if either buffer
/// has the wrong length for `op`.
pub fn im2col<E: Dtype>(op: &Pool2DOp, img: &[E], col: &mut [E]) -> Result<(), Error> {
    check_buffers(op, img.len(), col.len())?;
    let mut rows = col.chunks_exact_mut(op.pool_size());
    for b in 0..op.batch {
        for oh in 0..op.h_out {
            for ow in 0..op.w_out {
                for c in 0..op.chan {
                    let Some(row) = rows.next() else { return Ok(()) };
                    let base = (b * op.chan + c) * op.h_in * op.w_in;
                    for k1 in 0..op.kernel_h {
                        let y = oh * op.stride + k1;
                        let src = base + y * op.w_in + ow * op.stride;
                        row[k1 * op.kernel_w..(k1 + 1) * op.kernel_w]
                            .copy_from_slice(&img[src..src + op.kernel_w]);
                    }
                }
            }
        }
    }
    Ok(())
}

/// The inverse of [im2col]: adds every entry of `col` back onto the image
/// position it was unrolled from. Positions shared by overlapping windows
/// receive the sum of their entries.
pub fn col2im<E: Dtype>(op: &Pool2DOp, col: &[E], img: &mut [E]) -> Result<(), Error> {
    check_buffers(op, img.len(), col.len())?;
    let mut rows = col.chunks_exact(op.pool_size());
    for b in 0..op.batch {
        for oh in 0..op.h_out {
            for ow in 0..op.w_out {
                for c in 0..op.chan {
                    let Some(row) = rows.next() else { return Ok(()) };
                    let base = (b * op.chan + c) * op.h_in * op.w_in;
                    for k1 in 0..op.kernel_h {
                        let y = oh * op.stride + k1;
                        let dst = base + y * op.w_in + ow * op.stride;
                        for (d, s) in img[dst..dst + op.kernel_w]
                            .iter_mut()
                            .zip(&row[k1 * op.kernel_w..(k1 + 1) * op.kernel_w])
                        {
                            *d += *s;
                        }
                    }
                }
            }
        }
    }
    Ok(())
}

fn check_buffers(op: &Pool2DOp, img_len: usize, col_len: usize) -> Result<(), Error> {
    let img_expected = op.batch * op.chan * op.h_in * op.w_in;
    let col_expected = op.num_windows() * op.pool_size();
    if img_len != img_expected || col_len != col_expected {
        return Err(Error::ShapeMismatch {
            expected: vec![img_expected, col_expected],
            found: vec![img_len, col_len],
        });
    }
    Ok(())
}

impl<E: Dtype> Pool2DKernel<E> for Im2Col {
    fn forward(
        &self,
        op: &Pool2DOp,
        inp: &[E],
        out: &mut [E],
        arg_max: &mut [usize],
    ) -> Result<(), Error> {
        let k = op.pool_size();
        let mut col = vec![E::zero(); op.num_windows() * k];
        im2col(op, inp, &mut col)?;

        // (B * OH * OW * C, K) -> (B * OH * OW * C)
        let mut pooled = Vec::with_capacity(op.num_windows());
        match op.kind {
            Pool2DKind::Max => {
                for (row, am) in col.chunks_exact(k).zip(arg_max.iter_mut()) {
                    let (best_k, best) = row
                        .iter()
                        .copied()
                        .enumerate()
                        .fold((0, row[0]), |acc, (i, v)| if v > acc.1 { (i, v) } else { acc });
                    *am = best_k;
                    pooled.push(best);
                }
            }
            Pool2DKind::Avg => {
                let inv_k: E = pool_size_recip(op)?;
                pooled.extend(
                    col.chunks_exact(k)
                        .map(|row| row.iter().copied().sum::<E>() * inv_k),
                );
            }
        }

        // (B, OH, OW, C) -> (B, C, OH, OW)
        permute_into(&pooled, &[op.batch, op.h_out, op.w_out, op.chan], &[0, 3, 1, 2], out);
        Ok(())
    }

    fn backward(
        &self,
        op: &Pool2DOp,
        arg_max: &[usize],
        grad_inp: &mut [E],
        grad_out: &[E],
    ) -> Result<(), Error> {
        let k = op.pool_size();

        // (B, C, OH, OW) -> (B, OH, OW, C)
        let mut dout = vec![E::zero(); op.num_windows()];
        permute_into(grad_out, &[op.batch, op.chan, op.h_out, op.w_out], &[0, 2, 3, 1], &mut dout);

        let mut dcol = vec![E::zero(); op.num_windows() * k];
        match op.kind {
            Pool2DKind::Max => {
                for ((row, &am), &g) in dcol.chunks_exact_mut(k).zip(arg_max).zip(&dout) {
                    row[am] = g;
                }
            }
            Pool2DKind::Avg => {
                let inv_k: E = pool_size_recip(op)?;
                for (row, &g) in dcol.chunks_exact_mut(k).zip(&dout) {
                    row.fill(g * inv_k);
                }
            }
        }

        col2im(op, &dcol, grad_inp)
    }
}
