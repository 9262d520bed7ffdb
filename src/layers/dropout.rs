//! Dropout layer implementation for regularization
//!
//! During training each unit is dropped with probability `drop_prob` and the survivors are
//! scaled by `1 / (1 - drop_prob)` (inverted dropout), so expected activations match between
//! training and inference. During inference the layer is the identity.

use super::Layer;
use crate::error::{NetError, Result};
use crate::tensor::Element;
use ndarray::{Array2, ArrayView2};
use rand::rngs::StdRng;
use rand_distr::{Bernoulli, Distribution};

/// Inverted dropout drawing its masks from a borrowed RNG.
#[derive(Debug)]
pub struct Dropout<'r> {
    drop_prob: f64,
    keep: Bernoulli,
    rng: &'r mut StdRng,
}

impl<'r> Dropout<'r> {
    /// Fails with a `Configuration` error unless `drop_prob` lies in [0, 1).
    pub fn new(drop_prob: f64, rng: &'r mut StdRng) -> Result<Self> {
        if !(0.0..1.0).contains(&drop_prob) {
            return Err(NetError::config(format!(
                "dropout must be in range [0.0, 1.0), got {}",
                drop_prob
            )));
        }
        let keep = Bernoulli::new(1.0 - drop_prob)
            .map_err(|e| NetError::config(format!("invalid dropout {}: {}", drop_prob, e)))?;
        Ok(Self {
            drop_prob,
            keep,
            rng,
        })
    }

    pub fn drop_prob(&self) -> f64 {
        self.drop_prob
    }
}

/// Scaled keep-mask of one training forward pass.
#[derive(Debug, Clone)]
pub struct DropoutCache<T> {
    mask: Array2<T>,
}

impl<T> DropoutCache<T> {
    /// Entries are `0` for dropped units and `1 / (1 - drop_prob)` for kept ones.
    pub fn mask(&self) -> &Array2<T> {
        &self.mask
    }
}

impl<'r, T: Element> Layer<T> for Dropout<'r> {
    type Cache = DropoutCache<T>;
    type Grads = ();

    fn forward(&mut self, input: ArrayView2<'_, T>) -> (Array2<T>, Self::Cache) {
        let scale = T::cast(1.0 / (1.0 - self.drop_prob));
        let keep = &self.keep;
        let rng = &mut *self.rng;
        let mask = Array2::from_shape_fn(input.raw_dim(), |_| {
            if keep.sample(&mut *rng) {
                scale
            } else {
                T::zero()
            }
        });
        let out = &input * &mask;
        (out, DropoutCache { mask })
    }

    fn predict(&self, input: ArrayView2<'_, T>) -> Array2<T> {
        input.to_owned()
    }

    fn backward(cache: Self::Cache, grad_output: ArrayView2<'_, T>) -> (Array2<T>, Self::Grads) {
        (&grad_output * &cache.mask, ())
    }
}
