//! Affine (fully connected) layer implementation
//!
//! This module provides the transformation: output = input × weights + biases

use super::Layer;
use crate::tensor::Element;
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};

/// Affine layer computing `y = xW + b`.
///
/// `x` is `(N, fan_in)`, `W` is `(fan_in, fan_out)` and `b` is `(fan_out)`.
/// The layer borrows `W` and `b` from the parameter store.
#[derive(Debug, Clone, Copy)]
pub struct Affine<'p, T> {
    weight: ArrayView2<'p, T>,
    bias: ArrayView1<'p, T>,
}

impl<'p, T: Element> Affine<'p, T> {
    pub fn new(weight: ArrayView2<'p, T>, bias: ArrayView1<'p, T>) -> Self {
        assert_eq!(
            weight.ncols(),
            bias.len(),
            "bias len mismatch: expected {}, got {}",
            weight.ncols(),
            bias.len()
        );
        Self { weight, bias }
    }

    pub fn input_size(&self) -> usize {
        self.weight.nrows()
    }

    pub fn output_size(&self) -> usize {
        self.weight.ncols()
    }

    fn apply(&self, input: ArrayView2<'_, T>) -> Array2<T> {
        assert_eq!(
            input.ncols(),
            self.input_size(),
            "input width mismatch: expected {}, got {}",
            self.input_size(),
            input.ncols()
        );
        input.dot(&self.weight) + &self.bias
    }
}

/// Input and weight of one affine forward pass.
#[derive(Debug, Clone)]
pub struct AffineCache<'p, T> {
    input: Array2<T>,
    weight: ArrayView2<'p, T>,
}

/// Gradients w.r.t. the affine weight and bias.
#[derive(Debug, Clone)]
pub struct AffineGrads<T> {
    pub weight: Array2<T>,
    pub bias: Array1<T>,
}

impl<'p, T: Element> Layer<T> for Affine<'p, T> {
    type Cache = AffineCache<'p, T>;
    type Grads = AffineGrads<T>;

    fn forward(&mut self, input: ArrayView2<'_, T>) -> (Array2<T>, Self::Cache) {
        let out = self.apply(input);
        let cache = AffineCache {
            input: input.to_owned(),
            weight: self.weight,
        };
        (out, cache)
    }

    fn predict(&self, input: ArrayView2<'_, T>) -> Array2<T> {
        self.apply(input)
    }

    /// `dx = dout·Wᵀ`, `dW = xᵀ·dout`, `db = Σₙ dout`.
    fn backward(cache: Self::Cache, grad_output: ArrayView2<'_, T>) -> (Array2<T>, Self::Grads) {
        let grad_input = grad_output.dot(&cache.weight.t());
        let grads = AffineGrads {
            weight: cache.input.t().dot(&grad_output),
            bias: grad_output.sum_axis(Axis(0)),
        };
        (grad_input, grads)
    }
}
