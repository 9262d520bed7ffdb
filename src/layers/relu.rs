//! Rectified linear unit layer.

use super::Layer;
use crate::tensor::Element;
use ndarray::{Array2, ArrayView2, Zip};

/// Elementwise `max(0, x)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Relu;

/// Pre-activation input of one ReLU forward pass.
#[derive(Debug, Clone)]
pub struct ReluCache<T> {
    input: Array2<T>,
}

impl<T: Element> Layer<T> for Relu {
    type Cache = ReluCache<T>;
    type Grads = ();

    fn forward(&mut self, input: ArrayView2<'_, T>) -> (Array2<T>, Self::Cache) {
        let out = self.predict(input);
        (
            out,
            ReluCache {
                input: input.to_owned(),
            },
        )
    }

    fn predict(&self, input: ArrayView2<'_, T>) -> Array2<T> {
        input.mapv(|v| if v > T::zero() { v } else { T::zero() })
    }

    /// Passes the gradient where the input was positive and zeroes it elsewhere.
    fn backward(cache: Self::Cache, grad_output: ArrayView2<'_, T>) -> (Array2<T>, Self::Grads) {
        let mut grad_input = grad_output.to_owned();
        Zip::from(&mut grad_input)
            .and(&cache.input)
            .for_each(|g, &x| {
                if x <= T::zero() {
                    *g = T::zero();
                }
            });
        (grad_input, ())
    }
}
