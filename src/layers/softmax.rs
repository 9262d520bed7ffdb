//! Softmax cross-entropy loss.

use crate::tensor::Element;
use ndarray::{Array2, ArrayView2, ArrayViewMut1, Axis};

/// Row-wise softmax applied in place.
///
/// Subtracts each row's maximum before exponentiating to avoid overflow with large logits.
pub fn softmax_rows<T: Element>(scores: &mut Array2<T>) {
    for row in scores.axis_iter_mut(Axis(0)) {
        to_log_probs(row);
    }
    scores.mapv_inplace(|v| v.exp());
}

/// Rewrites one row of logits as log-probabilities.
fn to_log_probs<T: Element>(mut row: ArrayViewMut1<'_, T>) {
    let max = row.fold(T::neg_infinity(), |m, &v| if v > m { v } else { m });
    row.mapv_inplace(|v| v - max);
    let log_sum = row.fold(T::zero(), |s, &v| s + v.exp()).ln();
    row.mapv_inplace(|v| v - log_sum);
}

/// Mean cross-entropy of `scores` against `labels`, and its gradient w.r.t. the scores.
///
/// The gradient is `(softmax(scores) - one_hot(labels)) / N`.
///
/// # Panics
///
/// Panics if `labels.len()` differs from the number of rows or a label is not a valid
/// column index. Network entry points validate both before calling.
pub fn softmax_loss<T: Element>(scores: ArrayView2<'_, T>, labels: &[usize]) -> (T, Array2<T>) {
    assert_eq!(
        labels.len(),
        scores.nrows(),
        "labels len mismatch: expected {}, got {}",
        scores.nrows(),
        labels.len()
    );
    let n = T::cast(scores.nrows() as f64);

    let mut log_probs = scores.to_owned();
    for row in log_probs.axis_iter_mut(Axis(0)) {
        to_log_probs(row);
    }

    let loss = labels
        .iter()
        .enumerate()
        .fold(T::zero(), |acc, (i, &y)| acc - log_probs[[i, y]])
        / n;

    let mut grad = log_probs.mapv(|v| v.exp());
    for (i, &y) in labels.iter().enumerate() {
        grad[[i, y]] -= T::one();
    }
    grad /= n;

    (loss, grad)
}
