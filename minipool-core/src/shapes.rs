//! Helpers for the row-major, dynamically ranked shapes used by [crate::Tensor].

/// Number of dimensions of an image batch: `(batch, channels, height, width)`.
pub const IMAGE_DIMS: usize = 4;

/// Total number of elements in `shape`. The empty shape has one element.
pub fn num_elements(shape: &[usize]) -> usize {
    shape.iter().product()
}

/// Contiguous row-major strides for `shape`.
///
/// ```rust
/// # use minipool_core::shapes::strides;
/// assert_eq!(strides(&[2, 3, 4]), [12, 4, 1]);
/// ```
pub fn strides(shape: &[usize]) -> Vec<usize> {
    let mut strides = vec![1; shape.len()];
    for i in (0..shape.len().saturating_sub(1)).rev() {
        strides[i] = strides[i + 1] * shape[i + 1];
    }
    strides
}

/// Returns `true` if `axes` contains every index in `0..axes.len()` exactly once.
pub fn is_permutation(axes: &[usize]) -> bool {
    let mut seen = vec![false; axes.len()];
    for &a in axes {
        match seen.get_mut(a) {
            Some(s) if !*s => *s = true,
            _ => return false,
        }
    }
    true
}

/// Copies `src` (contiguous, shaped `shape`) into `dst` so that `dst` is the
/// contiguous layout of `src` with its axes reordered by `axes`. Output axis
/// `i` is input axis `axes[i]`.
pub(crate) fn permute_into<E: Copy>(src: &[E], shape: &[usize], axes: &[usize], dst: &mut [E]) {
    debug_assert_eq!(shape.len(), axes.len());
    debug_assert_eq!(src.len(), dst.len());
    let src_strides = strides(shape);
    let dst_shape: Vec<usize> = axes.iter().map(|&a| shape[a]).collect();
    let gather_strides: Vec<usize> = axes.iter().map(|&a| src_strides[a]).collect();

    let mut idx = vec![0; axes.len()];
    for d in dst.iter_mut() {
        let offset: usize = idx.iter().zip(gather_strides.iter()).map(|(i, s)| i * s).sum();
        *d = src[offset];
        for dim in (0..idx.len()).rev() {
            idx[dim] += 1;
            if idx[dim] < dst_shape[dim] {
                break;
            }
            idx[dim] = 0;
        }
    }
}
