//! The [Tensor] struct, its constructors, and the [Error] type.
//!
//! A [Tensor] is a dynamically ranked, row-major, contiguous array. The data
//! lives behind an [Arc], so `clone()` only bumps a reference count:
//!
//! ```rust
//! # use minipool_core::prelude::*;
//! let a: Tensor<f32> = Tensor::zeros(&[2, 3]);
//! let b = a.clone();
//! assert!(a.ptr_eq(&b));
//! ```
//!
//! # Creating tensors
//!
//! 1. From nested rust arrays with [From] (ranks 1 through 4).
//! 2. From a flat [Vec] and a shape with [Tensor::try_from_vec].
//! 3. Filled with zeros via [Tensor::zeros].
//! 4. From a standard normal distribution via [Tensor::sample_normal].
//!
//! ```rust
//! # use minipool_core::prelude::*;
//! # use rand::{rngs::StdRng, SeedableRng};
//! let a: Tensor<f32> = Tensor::from([[1.0, 2.0], [3.0, 4.0]]);
//! let b = Tensor::try_from_vec(vec![1.0, 2.0, 3.0, 4.0], &[2, 2]).unwrap();
//! assert_eq!(a.as_vec(), b.as_vec());
//! let mut rng = StdRng::seed_from_u64(0);
//! let c: Tensor<f64> = Tensor::sample_normal(&[2, 3, 8, 8], &mut rng);
//! assert_eq!(c.len(), 2 * 3 * 8 * 8);
//! ```

mod error;

pub use error::Error;

use crate::{dtypes::Dtype, shapes};
use rand::Rng;
use rand_distr::{Distribution, StandardNormal};
use std::sync::Arc;

#[derive(Clone, Debug, PartialEq)]
pub struct Tensor<E> {
    pub(crate) shape: Vec<usize>,
    pub(crate) data: Arc<Vec<E>>,
}

impl<E: Dtype> Tensor<E> {
    /// Creates a tensor from row-major `data`. Fails with
    /// [Error::WrongNumElements] if `data.len()` does not match `shape`.
    pub fn try_from_vec(data: Vec<E>, shape: &[usize]) -> Result<Self, Error> {
        if data.len() != shapes::num_elements(shape) {
            return Err(Error::WrongNumElements);
        }
        Ok(Self {
            shape: shape.to_vec(),
            data: Arc::new(data),
        })
    }

    pub fn zeros(shape: &[usize]) -> Self {
        Self {
            shape: shape.to_vec(),
            data: Arc::new(vec![E::zero(); shapes::num_elements(shape)]),
        }
    }

    /// Fills a tensor with samples from the standard normal distribution.
    pub fn sample_normal<R: Rng>(shape: &[usize], rng: &mut R) -> Self
    where
        StandardNormal: Distribution<E>,
    {
        let numel = shapes::num_elements(shape);
        let data = StandardNormal.sample_iter(rng).take(numel).collect();
        Self {
            shape: shape.to_vec(),
            data: Arc::new(data),
        }
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn strides(&self) -> Vec<usize> {
        shapes::strides(&self.shape)
    }

    pub fn as_slice(&self) -> &[E] {
        &self.data
    }

    pub fn as_vec(&self) -> Vec<E> {
        self.data.as_ref().clone()
    }

    /// Element at a full multi-index, or `None` if it is out of bounds.
    pub fn get(&self, index: &[usize]) -> Option<E> {
        if index.len() != self.shape.len() || index.iter().zip(&self.shape).any(|(i, d)| i >= d) {
            return None;
        }
        let offset: usize = index.iter().zip(self.strides()).map(|(i, s)| i * s).sum();
        self.data.get(offset).copied()
    }

    pub fn sum(&self) -> E {
        self.data.iter().copied().sum()
    }

    /// Whether both tensors share the same underlying storage.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.data, &other.data)
    }

    /// Reinterprets the data with a new shape holding the same number of elements.
    /// No data is copied.
    pub fn try_reshape(&self, shape: &[usize]) -> Result<Self, Error> {
        if shapes::num_elements(shape) != self.len() {
            return Err(Error::ShapeMismatch {
                expected: self.shape.clone(),
                found: shape.to_vec(),
            });
        }
        Ok(Self {
            shape: shape.to_vec(),
            data: self.data.clone(),
        })
    }

    /// Reorders the axes, producing a new contiguous tensor whose axis `i` is
    /// this tensor's axis `axes[i]`.
    ///
    /// ```rust
    /// # use minipool_core::prelude::*;
    /// let a: Tensor<f32> = Tensor::from([[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]]);
    /// let b = a.try_permute(&[1, 0]).unwrap();
    /// assert_eq!(b.shape(), &[3, 2]);
    /// assert_eq!(b.as_vec(), [1.0, 4.0, 2.0, 5.0, 3.0, 6.0]);
    /// ```
    pub fn try_permute(&self, axes: &[usize]) -> Result<Self, Error> {
        if axes.len() != self.ndim() || !shapes::is_permutation(axes) {
            return Err(Error::ShapeMismatch {
                expected: (0..self.ndim()).collect(),
                found: axes.to_vec(),
            });
        }
        let shape: Vec<usize> = axes.iter().map(|&a| self.shape[a]).collect();
        let mut data = vec![E::zero(); self.len()];
        shapes::permute_into(&self.data, &self.shape, axes, &mut data);
        Ok(Self {
            shape,
            data: Arc::new(data),
        })
    }

    pub(crate) fn from_parts(data: Vec<E>, shape: Vec<usize>) -> Self {
        debug_assert_eq!(data.len(), shapes::num_elements(&shape));
        Self {
            shape,
            data: Arc::new(data),
        }
    }
}

impl<E: Dtype, const M: usize> From<[E; M]> for Tensor<E> {
    fn from(value: [E; M]) -> Self {
        Self::from_parts(value.to_vec(), vec![M])
    }
}

impl<E: Dtype, const M: usize, const N: usize> From<[[E; N]; M]> for Tensor<E> {
    fn from(value: [[E; N]; M]) -> Self {
        let data = value.iter().flatten().copied().collect();
        Self::from_parts(data, vec![M, N])
    }
}

impl<E: Dtype, const M: usize, const N: usize, const O: usize> From<[[[E; O]; N]; M]>
    for Tensor<E>
{
    fn from(value: [[[E; O]; N]; M]) -> Self {
        let data = value.iter().flatten().flatten().copied().collect();
        Self::from_parts(data, vec![M, N, O])
    }
}

impl<E: Dtype, const M: usize, const N: usize, const O: usize, const P: usize>
    From<[[[[E; P]; O]; N]; M]> for Tensor<E>
{
    fn from(value: [[[[E; P]; O]; N]; M]) -> Self {
        let data = value.iter().flatten().flatten().flatten().copied().collect();
        Self::from_parts(data, vec![M, N, O, P])
    }
}
