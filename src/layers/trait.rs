//! Layer trait definition for neural network layers
//!
//! This module defines the core Layer trait that all layer types implement.
//! A forward pass hands back its cache by value and the matching backward pass consumes it,
//! so a cache can only ever be used once and only with the forward call that produced it.

use crate::tensor::Element;
use ndarray::{Array2, ArrayView2};

/// Core trait for neural network layers.
///
/// Layers borrow their parameters from the store for the duration of one network call.
/// Parameter gradients are returned from `backward` rather than accumulated internally.
///
/// # Example
///
/// ```ignore
/// let (out, cache) = layer.forward(x.view());
/// // ... downstream layers, loss ...
/// let (dx, grads) = Affine::backward(cache, dout.view());
/// ```
pub trait Layer<T: Element> {
    /// Values retained by a training forward pass for the matching backward pass.
    type Cache;

    /// Gradients w.r.t. the layer's own learnable parameters (`()` when it has none).
    type Grads;

    /// Training-mode forward pass over a `(N, input_size)` minibatch.
    fn forward(&mut self, input: ArrayView2<'_, T>) -> (Array2<T>, Self::Cache);

    /// Test-mode forward pass. Deterministic and produces no cache.
    fn predict(&self, input: ArrayView2<'_, T>) -> Array2<T>;

    /// Gradient w.r.t. the layer input, plus parameter gradients, given the upstream
    /// gradient and the cache from this minibatch's forward pass.
    fn backward(cache: Self::Cache, grad_output: ArrayView2<'_, T>) -> (Array2<T>, Self::Grads);
}
