//! # minipool-core
//!
//! The numeric half of minipool: a small reference counted nd-array
//! ([`tensor::Tensor`]), the error type shared by the workspace, and the 2d
//! pooling kernels that the `minipool` layer drives.
//!
//! # Tensors
//!
//! *See [tensor] for more information.*
//!
//! A [`Tensor`] is a row-major, contiguous nd-array whose storage sits behind
//! an [`std::sync::Arc`]. Cloning a tensor is cheap and never copies data, which
//! is how a layer keeps hold of its input between forward and backward without
//! touching the caller's copy.
//!
//! ```rust
//! # use minipool_core::prelude::*;
//! let x: Tensor<f32> = Tensor::from([[[[1.0, 5.0], [3.0, 2.0]]]]);
//! assert_eq!(x.shape(), &[1, 1, 2, 2]);
//! ```
//!
//! # Pooling kernels
//!
//! *See [tensor_ops] for more information.*
//!
//! A pooling call is described by a [`tensor_ops::Pool2DOp`] and executed by a
//! [`tensor_ops::Pool2DKernel`]. Two kernels are provided and they are
//! interchangeable:
//! 1. [`tensor_ops::DirectLoop`] scans each window in place.
//! 2. [`tensor_ops::Im2Col`] unrolls every window into a matrix row, reduces
//!    the rows, and folds gradients back with col2im.
//!
//! ```rust
//! # use minipool_core::prelude::*;
//! let x: Tensor<f32> = Tensor::from([[[[1.0, 5.0], [3.0, 2.0]]]]);
//! let op = Pool2DOp::try_new(Pool2DKind::Max, [1, 1, 2, 2], (2, 2), 2).unwrap();
//! let (z, arg_max) = try_pool2d_forward(&DirectLoop, &op, &x).unwrap();
//! assert_eq!(z.as_vec(), [5.0]);
//! assert_eq!(arg_max, [1]);
//! ```

pub mod dtypes;
pub mod shapes;
pub mod tensor;
pub mod tensor_ops;

pub use tensor::{Error, Tensor};

/// Contains everything needed to run the pooling kernels directly.
pub mod prelude {
    pub use crate::dtypes::Dtype;
    pub use crate::shapes::*;
    pub use crate::tensor::{Error, Tensor};
    pub use crate::tensor_ops::*;
}

#[cfg(any(test, feature = "test-utils"))]
#[doc(hidden)]
pub mod tests {
    pub use num_traits::{Float, FromPrimitive, NumCast, Zero};

    #[cfg(not(feature = "test-f64"))]
    pub type TestDtype = f32;

    #[cfg(feature = "test-f64")]
    pub type TestDtype = f64;

    /// Where two values first disagree.
    #[derive(Debug, Clone, Copy, PartialEq)]
    pub enum Mismatch<T> {
        Len { lhs: usize, rhs: usize },
        Value { index: usize, lhs: T, rhs: T },
    }

    impl<T: std::fmt::Display> std::fmt::Display for Mismatch<T> {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            match self {
                Self::Len { lhs, rhs } => write!(f, "lhs has {lhs} elements, rhs has {rhs}"),
                Self::Value { index, lhs, rhs } => {
                    write!(f, "lhs != rhs at {index} | {lhs} != {rhs}")
                }
            }
        }
    }

    pub trait AssertClose {
        type Elem: std::fmt::Display + std::fmt::Debug + Copy;
        const DEFAULT_TOLERANCE: Self::Elem;
        fn default_tolerance(&self) -> Self::Elem {
            Self::DEFAULT_TOLERANCE
        }
        fn first_mismatch(
            &self,
            rhs: &Self,
            tolerance: Self::Elem,
        ) -> Option<Mismatch<Self::Elem>>;
        fn assert_close(&self, rhs: &Self, tolerance: Self::Elem)
        where
            Self: std::fmt::Debug,
        {
            if let Some(mismatch) = self.first_mismatch(rhs, tolerance) {
                panic!("{mismatch}\n\n{self:?}\n\n{rhs:?}");
            }
        }
    }

    macro_rules! float_assert_close {
        ($($F:ty),*) => {
            $(
                impl AssertClose for $F {
                    type Elem = $F;
                    const DEFAULT_TOLERANCE: $F = 1e-6;
                    fn first_mismatch(&self, rhs: &Self, tolerance: $F) -> Option<Mismatch<$F>> {
                        ((self - rhs).abs() > tolerance).then_some(Mismatch::Value {
                            index: 0,
                            lhs: *self,
                            rhs: *rhs,
                        })
                    }
                }
            )*
        };
    }
    float_assert_close!(f32, f64);

    impl<T: AssertClose> AssertClose for Vec<T> {
        type Elem = T::Elem;
        const DEFAULT_TOLERANCE: Self::Elem = T::DEFAULT_TOLERANCE;
        fn first_mismatch(
            &self,
            rhs: &Self,
            tolerance: Self::Elem,
        ) -> Option<Mismatch<Self::Elem>> {
            if self.len() != rhs.len() {
                return Some(Mismatch::Len {
                    lhs: self.len(),
                    rhs: rhs.len(),
                });
            }
            self.iter()
                .zip(rhs.iter())
                .enumerate()
                .find_map(|(i, (l, r))| match l.first_mismatch(r, tolerance)? {
                    Mismatch::Value { lhs, rhs, .. } => {
                        Some(Mismatch::Value { index: i, lhs, rhs })
                    }
                    len => Some(len),
                })
        }
    }

    /// Nested `f64` array literals, flattened in row-major order.
    pub trait NdLiteral {
        fn ndshape(&self) -> Vec<usize>;
        fn ndflat(&self, out: &mut Vec<f64>);
    }

    impl NdLiteral for f64 {
        fn ndshape(&self) -> Vec<usize> {
            Vec::new()
        }
        fn ndflat(&self, out: &mut Vec<f64>) {
            out.push(*self);
        }
    }

    impl<T: NdLiteral, const M: usize> NdLiteral for [T; M] {
        fn ndshape(&self) -> Vec<usize> {
            let mut shape = vec![M];
            if let Some(first) = self.first() {
                shape.extend(first.ndshape());
            }
            shape
        }
        fn ndflat(&self, out: &mut Vec<f64>) {
            for t in self.iter() {
                t.ndflat(out);
            }
        }
    }

    pub fn literal_as_vec<E: FromPrimitive, L: NdLiteral>(lit: &L) -> Vec<E> {
        let mut flat = Vec::new();
        lit.ndflat(&mut flat);
        flat.into_iter()
            .map(|x| E::from_f64(x).unwrap())
            .collect()
    }

    #[macro_export]
    #[doc(hidden)]
    macro_rules! assert_close_to_literal {
        ($Lhs:expr, $Rhs:expr) => {{
            let lhs = &$Lhs;
            let rhs = $Rhs;
            assert_eq!(
                lhs.shape(),
                &$crate::tests::NdLiteral::ndshape(&rhs)[..],
                "shape mismatch"
            );
            let lhs = lhs.as_vec();
            let rhs = $crate::tests::literal_as_vec(&rhs);
            let tol = $crate::tests::AssertClose::default_tolerance(&lhs);
            $crate::tests::AssertClose::assert_close(&lhs, &rhs, tol);
        }};
        ($Lhs:expr, $Rhs:expr, $Tolerance:expr) => {{
            let lhs = &$Lhs;
            let rhs = $Rhs;
            assert_eq!(
                lhs.shape(),
                &$crate::tests::NdLiteral::ndshape(&rhs)[..],
                "shape mismatch"
            );
            let lhs = lhs.as_vec();
            let rhs = $crate::tests::literal_as_vec(&rhs);
            let tol = $crate::tests::FromPrimitive::from_f64($Tolerance).unwrap();
            $crate::tests::AssertClose::assert_close(&lhs, &rhs, tol);
        }};
    }
    pub use crate::assert_close_to_literal;

    #[macro_export]
    #[doc(hidden)]
    macro_rules! assert_close_to_tensor {
        ($Lhs:expr, $Rhs:expr) => {{
            let (lhs, rhs) = (&$Lhs, &$Rhs);
            assert_eq!(lhs.shape(), rhs.shape(), "shape mismatch");
            let (lhs, rhs) = (lhs.as_vec(), rhs.as_vec());
            let tol = $crate::tests::AssertClose::default_tolerance(&lhs);
            $crate::tests::AssertClose::assert_close(&lhs, &rhs, tol);
        }};
        ($Lhs:expr, $Rhs:expr, $Tolerance:expr) => {{
            let (lhs, rhs) = (&$Lhs, &$Rhs);
            assert_eq!(lhs.shape(), rhs.shape(), "shape mismatch");
            let (lhs, rhs) = (lhs.as_vec(), rhs.as_vec());
            let tol = $crate::tests::FromPrimitive::from_f64($Tolerance).unwrap();
            $crate::tests::AssertClose::assert_close(&lhs, &rhs, tol);
        }};
    }
    pub use crate::assert_close_to_tensor;

    #[cfg(test)]
    mod mismatch_tests {
        use super::*;

        #[test]
        fn test_first_mismatch() {
            let a: Vec<f64> = vec![1.0, 2.0, 3.0];
            assert_eq!(a.first_mismatch(&vec![1.0, 2.0, 3.0], 1e-6), None);
            assert_eq!(
                a.first_mismatch(&vec![1.0, 2.5, 3.5], 1e-6),
                Some(Mismatch::Value {
                    index: 1,
                    lhs: 2.0,
                    rhs: 2.5
                })
            );
            assert_eq!(
                a.first_mismatch(&vec![1.0, 2.0], 1e-6),
                Some(Mismatch::Len { lhs: 3, rhs: 2 })
            );
        }

        #[test]
        #[should_panic(expected = "lhs has 3 elements, rhs has 2")]
        fn test_assert_close_reports_length() {
            vec![1.0f32, 2.0, 3.0].assert_close(&vec![1.0, 2.0], 1e-6);
        }
    }
}
