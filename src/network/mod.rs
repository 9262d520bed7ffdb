//! Network assemblers
//!
//! Both assemblers own a [`ParamSet`] and expose it to an external optimizer. Each call to
//! [`Classifier::loss`] either returns class scores (no labels) or runs a full forward and
//! backward pass and returns the regularized loss with a fresh gradient set.

mod fc_net;
mod two_layer;

pub use fc_net::FullyConnectedNet;
pub use two_layer::TwoLayerNet;

use crate::error::Result;
use crate::params::{Gradients, ParamSet, ParamsMut};
use crate::tensor::{Element, Labels, Minibatch, Mode};
use ndarray::{Array2, ArrayBase, Axis, Data, Dimension};

/// Result of [`Classifier::loss`].
#[derive(Debug, Clone)]
pub enum LossOutput<T> {
    /// `(N, C)` class scores from a test-mode pass
    Scores(Array2<T>),
    /// Regularized loss and gradients from a training-mode pass
    Loss { loss: T, grads: Gradients<T> },
}

impl<T> LossOutput<T> {
    pub fn into_scores(self) -> Option<Array2<T>> {
        match self {
            LossOutput::Scores(scores) => Some(scores),
            LossOutput::Loss { .. } => None,
        }
    }

    pub fn into_loss(self) -> Option<(T, Gradients<T>)> {
        match self {
            LossOutput::Loss { loss, grads } => Some((loss, grads)),
            LossOutput::Scores(_) => None,
        }
    }
}

/// A classifier trainable by an external optimizer.
///
/// The optimizer writes parameter values between calls through `params_mut`, and drives
/// training through `loss`. The handle allows in-place writes only, so the layout checked at
/// construction holds for every later call. Test-mode scoring takes `&self`, so it cannot
/// touch the parameters or any running statistics.
pub trait Classifier<T: Element> {
    fn input_dim(&self) -> usize;

    fn num_classes(&self) -> usize;

    fn params(&self) -> &ParamSet<T>;

    fn params_mut(&mut self) -> ParamsMut<'_, T>;

    /// Test-mode forward pass producing `(N, C)` scores.
    fn scores(&self, batch: &Minibatch<'_, T>) -> Result<Array2<T>>;

    /// Training-mode forward and backward pass.
    ///
    /// Returns the data loss plus `0.5 * reg * Σ‖W‖²`, and one gradient per parameter.
    fn loss_and_grads(
        &mut self,
        batch: &Minibatch<'_, T>,
        labels: Labels<'_>,
    ) -> Result<(T, Gradients<T>)>;

    /// Single runtime entry point.
    ///
    /// `x` has the minibatch on its first axis; all remaining axes are flattened into the
    /// features. Without labels this is a test-mode pass returning scores; with labels it is
    /// a training pass returning the loss and gradients. Inputs are validated before anything
    /// is computed.
    fn loss<S, D>(&mut self, x: &ArrayBase<S, D>, y: Option<&[usize]>) -> Result<LossOutput<T>>
    where
        S: Data<Elem = T>,
        D: Dimension,
    {
        let batch = Minibatch::new(x, self.input_dim())?;
        let labels = y
            .map(|y| Labels::new(y, batch.len(), self.num_classes()))
            .transpose()?;
        let mode = Mode::from_labels(labels.is_some());
        log::trace!("loss: mode={} batch={}", mode, batch.len());

        match labels {
            None => Ok(LossOutput::Scores(self.scores(&batch)?)),
            Some(labels) => {
                let (loss, grads) = self.loss_and_grads(&batch, labels)?;
                log::trace!("loss: {}", loss);
                Ok(LossOutput::Loss { loss, grads })
            }
        }
    }

    /// Highest scoring class of every example.
    fn predict<S, D>(&self, x: &ArrayBase<S, D>) -> Result<Vec<usize>>
    where
        S: Data<Elem = T>,
        D: Dimension,
    {
        let batch = Minibatch::new(x, self.input_dim())?;
        let scores = self.scores(&batch)?;
        Ok(scores
            .axis_iter(Axis(0))
            .map(|row| {
                row.iter()
                    .enumerate()
                    .fold((0, T::neg_infinity()), |(best, max), (c, &v)| {
                        if v > max {
                            (c, v)
                        } else {
                            (best, max)
                        }
                    })
                    .0
            })
            .collect())
    }
}

/// Adds the L2 penalty to `data_loss` and `reg * W` to every weight gradient.
///
/// Biases and batch normalization parameters are not regularized.
pub(crate) fn regularize<T: Element>(
    data_loss: T,
    reg: T,
    params: &ParamSet<T>,
    grads: &mut Gradients<T>,
) -> T {
    if reg == T::zero() {
        return data_loss;
    }
    for (grad, layer) in grads.layers_mut().iter_mut().zip(params.layers()) {
        grad.weight.scaled_add(reg, &layer.weight);
    }
    data_loss + T::cast(0.5) * reg * params.weight_square_sum()
}

pub(crate) fn check_finite<T: Element>(loss: T) {
    if !loss.is_finite() {
        log::warn!("training loss is not finite: {}", loss);
    }
}
