//! Numerical gradient checking.
//!
//! Estimates the gradient of a classifier's training loss by centered finite differences,
//! one parameter entry at a time, for comparison against the analytic gradients returned by
//! [`Classifier::loss`].

use crate::error::{NetError, Result};
use crate::network::Classifier;
use crate::params::ParamKey;
use crate::tensor::Element;
use ndarray::{ArrayBase, ArrayD, ArrayView, Data, Dimension};

/// Centered finite-difference gradient of the training loss w.r.t. the tensor at `key`.
///
/// Each entry is perturbed by `±h`, the loss re-evaluated, and the entry restored, so the
/// parameters are unchanged on return. With dropout, the network must be seeded so every
/// evaluation sees the same masks.
pub fn numerical_gradient<T, M, S, D>(
    model: &mut M,
    x: &ArrayBase<S, D>,
    y: &[usize],
    key: ParamKey,
    h: T,
) -> Result<ArrayD<T>>
where
    T: Element,
    M: Classifier<T>,
    S: Data<Elem = T>,
    D: Dimension,
{
    let shape = model
        .params()
        .get(key)
        .ok_or(NetError::MissingParameter(key))?
        .raw_dim();
    let mut grad = ArrayD::zeros(shape);
    let two_h = h + h;

    for (i, slot) in grad.iter_mut().enumerate() {
        let original = nudge(model, key, i, None)?;

        nudge(model, key, i, Some(original + h))?;
        let plus = training_loss(model, x, y)?;

        nudge(model, key, i, Some(original - h))?;
        let minus = training_loss(model, x, y)?;

        nudge(model, key, i, Some(original))?;
        *slot = (plus - minus) / two_h;
    }
    Ok(grad)
}

/// Reads entry `i` (in logical order) of the tensor at `key`, optionally overwriting it.
/// Returns the value before the write.
fn nudge<T: Element, M: Classifier<T>>(
    model: &mut M,
    key: ParamKey,
    i: usize,
    value: Option<T>,
) -> Result<T> {
    let mut params = model.params_mut();
    let mut tensor = params
        .get_mut(key)
        .ok_or(NetError::MissingParameter(key))?;
    let entry = tensor
        .iter_mut()
        .nth(i)
        .ok_or(NetError::MissingParameter(key))?;
    let old = *entry;
    if let Some(v) = value {
        *entry = v;
    }
    Ok(old)
}

fn training_loss<T, M, S, D>(model: &mut M, x: &ArrayBase<S, D>, y: &[usize]) -> Result<T>
where
    T: Element,
    M: Classifier<T>,
    S: Data<Elem = T>,
    D: Dimension,
{
    model
        .loss(x, Some(y))?
        .into_loss()
        .map(|(loss, _)| loss)
        .ok_or(NetError::EmptyBatch)
}

/// Maximum elementwise relative error `|a - b| / max(1e-8, |a| + |b|)`.
pub fn rel_error<T: Element, D: Dimension>(a: ArrayView<'_, T, D>, b: ArrayView<'_, T, D>) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(&a, &b)| {
            let a = a.as_f64();
            let b = b.as_f64();
            (a - b).abs() / (a.abs() + b.abs()).max(1e-8)
        })
        .fold(0.0, f64::max)
}
