//! Numeric element types and validated minibatch inputs.

use crate::config::Precision;
use crate::error::{NetError, Result};
use ndarray::{ArrayBase, ArrayView2, CowArray, Data, Dimension, Ix2, NdFloat};
use std::fmt;

/// Floating point element stored in the parameter store.
///
/// Implemented for `f32` and `f64`; the network's precision is chosen by this type parameter.
pub trait Element: NdFloat + Default {
    const PRECISION: Precision;

    /// Converts an `f64` constant or hyperparameter into this precision.
    fn cast(value: f64) -> Self;

    fn as_f64(self) -> f64;
}

impl Element for f32 {
    const PRECISION: Precision = Precision::Float32;

    fn cast(value: f64) -> Self {
        value as f32
    }

    fn as_f64(self) -> f64 {
        self as f64
    }
}

impl Element for f64 {
    const PRECISION: Precision = Precision::Float64;

    fn cast(value: f64) -> Self {
        value
    }

    fn as_f64(self) -> f64 {
        self
    }
}

/// Train/test flag for one evaluation.
///
/// Derived once per `loss()` call from whether labels were supplied and reported in the
/// trace log. The mode itself is not passed to the layers: a training call runs
/// `loss_and_grads`, where batch normalization uses batch statistics and dropout samples a
/// mask, and a test call runs `scores`, which only uses `predict`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Train,
    Test,
}

impl Mode {
    pub fn from_labels(has_labels: bool) -> Self {
        if has_labels {
            Mode::Train
        } else {
            Mode::Test
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Train => f.write_str("train"),
            Mode::Test => f.write_str("test"),
        }
    }
}

/// Input features flattened to `(N, D)` and checked against the network's input width.
///
/// Only constructible through [`Minibatch::new`], so every network entry point that takes a
/// `Minibatch` sees a non-empty batch of the right width.
#[derive(Debug)]
pub struct Minibatch<'a, T: Element> {
    features: CowArray<'a, T, Ix2>,
}

impl<'a, T: Element> Minibatch<'a, T> {
    /// Flattens every axis after the first into the feature axis.
    ///
    /// Contiguous inputs are viewed without copying.
    pub fn new<S, D>(x: &'a ArrayBase<S, D>, input_dim: usize) -> Result<Self>
    where
        S: Data<Elem = T>,
        D: Dimension,
    {
        let shape = x.shape();
        let n = match shape.first() {
            Some(&n) => n,
            None => {
                return Err(NetError::ShapeMismatch {
                    what: "input rank",
                    expected: 2,
                    actual: 0,
                })
            }
        };
        if n == 0 {
            return Err(NetError::EmptyBatch);
        }
        let d: usize = shape[1..].iter().product();
        if d != input_dim {
            return Err(NetError::ShapeMismatch {
                what: "input features",
                expected: input_dim,
                actual: d,
            });
        }
        let features = x
            .to_shape((n, d))
            .map_err(|_| NetError::ShapeMismatch {
                what: "input elements",
                expected: n * d,
                actual: x.len(),
            })?;
        Ok(Self { features })
    }

    pub fn features(&self) -> ArrayView2<'_, T> {
        self.features.view()
    }

    pub fn len(&self) -> usize {
        self.features.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.features.nrows() == 0
    }
}

/// Class labels checked against a minibatch size and the number of classes.
#[derive(Debug, Clone, Copy)]
pub struct Labels<'a> {
    labels: &'a [usize],
}

impl<'a> Labels<'a> {
    pub fn new(labels: &'a [usize], batch_len: usize, num_classes: usize) -> Result<Self> {
        if labels.len() != batch_len {
            return Err(NetError::ShapeMismatch {
                what: "labels",
                expected: batch_len,
                actual: labels.len(),
            });
        }
        if let Some((index, &label)) = labels
            .iter()
            .enumerate()
            .find(|(_, &label)| label >= num_classes)
        {
            return Err(NetError::LabelOutOfRange {
                index,
                label,
                num_classes,
            });
        }
        Ok(Self { labels })
    }

    pub fn as_slice(&self) -> &'a [usize] {
        self.labels
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array2, Array4};

    #[test]
    fn test_minibatch_flattens_trailing_axes() {
        let x = Array4::<f64>::zeros((5, 3, 2, 2));
        let batch = Minibatch::new(&x, 12).unwrap();
        assert_eq!(batch.features().dim(), (5, 12));
        assert_eq!(batch.len(), 5);
    }

    #[test]
    fn test_minibatch_wrong_width() {
        let x = Array2::<f32>::zeros((5, 4));
        let err = Minibatch::new(&x, 3).unwrap_err();
        assert!(matches!(
            err,
            NetError::ShapeMismatch {
                expected: 3,
                actual: 4,
                ..
            }
        ));
    }

    #[test]
    fn test_minibatch_non_contiguous_input() {
        let x = Array2::<f64>::from_shape_fn((4, 3), |(i, j)| (i * 3 + j) as f64);
        let xt = x.t();
        let batch = Minibatch::new(&xt, 4).unwrap();
        assert_eq!(batch.features()[[1, 0]], 1.0);
        assert_eq!(batch.features()[[0, 1]], 3.0);
    }

    #[test]
    fn test_empty_minibatch() {
        let x = Array2::<f64>::zeros((0, 4));
        assert!(matches!(Minibatch::new(&x, 4), Err(NetError::EmptyBatch)));
    }

    #[test]
    fn test_labels_validation() {
        assert!(Labels::new(&[0, 2, 1], 3, 3).is_ok());
        assert!(matches!(
            Labels::new(&[0, 1], 3, 3),
            Err(NetError::ShapeMismatch { what: "labels", .. })
        ));
        assert!(matches!(
            Labels::new(&[0, 3, 1], 3, 3),
            Err(NetError::LabelOutOfRange { index: 1, label: 3, .. })
        ));
    }

    #[test]
    fn test_mode_from_labels() {
        assert_eq!(Mode::from_labels(true), Mode::Train);
        assert_eq!(Mode::from_labels(false).to_string(), "test");
    }
}
