use minipool_core::{dtypes::Dtype, Error, Tensor};

/// A unit of a neural network that can be trained by backpropagation.
///
/// `try_forward` may cache whatever `try_backward` needs; `try_backward` takes
/// the gradient of the loss with respect to this layer's output and returns
/// the gradient with respect to its input. `layer_idx` is the position of the
/// layer in the enclosing network.
pub trait Layer<E: Dtype> {
    fn try_forward(&mut self, x: &Tensor<E>) -> Result<Tensor<E>, Error>;

    fn try_backward(&mut self, delta_in: &Tensor<E>, layer_idx: usize) -> Result<Tensor<E>, Error>;

    fn forward(&mut self, x: &Tensor<E>) -> Tensor<E> {
        self.try_forward(x).unwrap()
    }

    fn backward(&mut self, delta_in: &Tensor<E>, layer_idx: usize) -> Tensor<E> {
        self.try_backward(delta_in, layer_idx).unwrap()
    }
}
