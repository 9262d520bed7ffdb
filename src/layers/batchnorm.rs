//! Batch normalization layer implementation
//!
//! # Batch Normalization Theory
//!
//! Batch normalization normalizes each feature to zero mean and unit variance within the
//! mini-batch, then applies learnable scale (gamma) and shift (beta) parameters:
//!
//! 1. Compute batch statistics: mean μ and variance σ² across the batch
//! 2. Normalize: x̂ = (x - μ) / sqrt(σ² + ε)
//! 3. Scale and shift: y = γ * x̂ + β
//!
//! Each training pass reports its batch statistics, which are folded into running statistics
//! as `running = momentum * running + (1 - momentum) * batch`. At inference the running
//! statistics are used verbatim and never updated.
//!
//! # References
//!
//! Ioffe, S., & Szegedy, C. (2015). Batch Normalization: Accelerating Deep Network Training
//! by Reducing Internal Covariate Shift. ICML.

use super::Layer;
use crate::params::RunningStats;
use crate::tensor::Element;
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};

/// Batch normalization over the feature axis of a `(N, D)` minibatch.
///
/// Borrows gamma and beta from the parameter store and reads the running statistics for
/// test-mode passes. A training pass returns the batch mean and variance in its cache; the
/// caller folds them into the running statistics with [`RunningStats::update`].
#[derive(Debug, Clone, Copy)]
pub struct BatchNorm<'p, 'r, T> {
    gamma: ArrayView1<'p, T>,
    beta: ArrayView1<'p, T>,
    running: &'r RunningStats<T>,
    epsilon: T,
}

impl<'p, 'r, T: Element> BatchNorm<'p, 'r, T> {
    pub fn new(
        gamma: ArrayView1<'p, T>,
        beta: ArrayView1<'p, T>,
        running: &'r RunningStats<T>,
        epsilon: T,
    ) -> Self {
        assert!(epsilon > T::zero(), "epsilon must be positive");
        assert_eq!(gamma.len(), beta.len(), "gamma/beta len mismatch");
        assert_eq!(
            gamma.len(),
            running.mean.len(),
            "running statistics len mismatch: expected {}, got {}",
            gamma.len(),
            running.mean.len()
        );
        Self {
            gamma,
            beta,
            running,
            epsilon,
        }
    }

    pub fn size(&self) -> usize {
        self.gamma.len()
    }
}

/// Values retained by one training forward pass.
#[derive(Debug, Clone)]
pub struct BatchNormCache<'p, T> {
    x_hat: Array2<T>,
    mean: Array1<T>,
    var: Array1<T>,
    inv_std: Array1<T>,
    gamma: ArrayView1<'p, T>,
}

impl<'p, T> BatchNormCache<'p, T> {
    /// Per-feature mean of the minibatch.
    pub fn mean(&self) -> &Array1<T> {
        &self.mean
    }

    /// Per-feature biased variance of the minibatch.
    pub fn var(&self) -> &Array1<T> {
        &self.var
    }

    pub fn normalized(&self) -> &Array2<T> {
        &self.x_hat
    }
}

/// Gradients w.r.t. gamma and beta.
#[derive(Debug, Clone)]
pub struct BatchNormGrads<T> {
    pub gamma: Array1<T>,
    pub beta: Array1<T>,
}

impl<'p, 'r, T: Element> Layer<T> for BatchNorm<'p, 'r, T> {
    type Cache = BatchNormCache<'p, T>;
    type Grads = BatchNormGrads<T>;

    fn forward(&mut self, input: ArrayView2<'_, T>) -> (Array2<T>, Self::Cache) {
        assert_eq!(
            input.ncols(),
            self.size(),
            "input width mismatch: expected {}, got {}",
            self.size(),
            input.ncols()
        );
        let n = T::cast(input.nrows() as f64);

        let mean = input.sum_axis(Axis(0)) / n;
        let centered = &input - &mean;
        let var = (&centered * &centered).sum_axis(Axis(0)) / n;
        let inv_std = var.mapv(|v| T::one() / (v + self.epsilon).sqrt());
        let x_hat = centered * &inv_std;
        let out = &x_hat * &self.gamma + &self.beta;

        let cache = BatchNormCache {
            x_hat,
            mean,
            var,
            inv_std,
            gamma: self.gamma,
        };
        (out, cache)
    }

    fn predict(&self, input: ArrayView2<'_, T>) -> Array2<T> {
        let eps = self.epsilon;
        let inv_std = self.running.var.mapv(|v| T::one() / (v + eps).sqrt());
        let x_hat = (&input - &self.running.mean) * &inv_std;
        x_hat * &self.gamma + &self.beta
    }

    /// Closed form of the batch normalization gradient:
    ///
    /// `dx = (1/N) · inv_std · (N·dx̂ − Σ dx̂ − x̂ · Σ(dx̂ · x̂))` with `dx̂ = dout · γ`.
    fn backward(cache: Self::Cache, grad_output: ArrayView2<'_, T>) -> (Array2<T>, Self::Grads) {
        let n = T::cast(grad_output.nrows() as f64);

        let grads = BatchNormGrads {
            gamma: (&grad_output * &cache.x_hat).sum_axis(Axis(0)),
            beta: grad_output.sum_axis(Axis(0)),
        };

        let dx_hat = &grad_output * &cache.gamma;
        let sum_dx_hat = dx_hat.sum_axis(Axis(0));
        let sum_dx_hat_x_hat = (&dx_hat * &cache.x_hat).sum_axis(Axis(0));
        let grad_input = (dx_hat * n - &sum_dx_hat - &cache.x_hat * &sum_dx_hat_x_hat)
            * &(&cache.inv_std / n);

        (grad_input, grads)
    }
}
