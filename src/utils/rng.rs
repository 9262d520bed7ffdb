//! Random number generation for weight initialization and dropout masks.
//!
//! Every stochastic draw in the crate goes through a [`StdRng`] created here, so a fixed seed
//! reproduces both the initial parameters and the dropout masks.

use crate::error::{NetError, Result};
use crate::tensor::Element;
use ndarray::Array2;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};

/// RNG seeded from `seed`, or from OS entropy when no seed is given.
pub fn seeded_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}

/// Matrix of i.i.d. draws from N(0, std_dev²).
pub fn normal_matrix<T: Element>(
    rng: &mut StdRng,
    shape: (usize, usize),
    std_dev: f64,
) -> Result<Array2<T>> {
    let normal = Normal::new(0.0, std_dev)
        .map_err(|e| NetError::config(format!("invalid weight_scale {}: {}", std_dev, e)))?;
    Ok(Array2::from_shape_fn(shape, |_| T::cast(normal.sample(rng))))
}
