//! Tests for numerical gradient checking using finite differences.
//!
//! Every analytic gradient returned by a training-mode `loss` call is compared against a
//! centered finite-difference estimate. All checks run in f64.

use fc_nets::config::{NetworkConfig, Precision};
use fc_nets::utils::gradcheck::{numerical_gradient, rel_error};
use fc_nets::utils::rng::{normal_matrix, seeded_rng};
use fc_nets::{Classifier, FullyConnectedNet, TwoLayerNet};
use ndarray::Array2;
use rand::Rng;

fn random_batch(n: usize, d: usize, classes: usize, seed: u64) -> (Array2<f64>, Vec<usize>) {
    let mut rng = seeded_rng(Some(seed));
    let x = normal_matrix(&mut rng, (n, d), 1.0).unwrap();
    let y = (0..n).map(|_| rng.gen_range(0..classes)).collect();
    (x, y)
}

// Compares every parameter's analytic gradient with its numerical estimate.
//
// Entries whose gradient vanishes analytically (e.g. a bias feeding batch normalization)
// only carry roundoff in the numerical estimate, so they are held to an absolute bound.
fn check_gradients<M: Classifier<f64>>(
    model: &mut M,
    x: &Array2<f64>,
    y: &[usize],
    h: f64,
    tolerance: f64,
) {
    let (_, grads) = model.loss(x, Some(y)).unwrap().into_loss().unwrap();

    for key in grads.keys() {
        let analytic = grads.get(key).unwrap();
        let numeric = numerical_gradient(model, x, y, key, h).unwrap();
        let err = rel_error(analytic.view(), numeric.view());
        let max_abs = analytic
            .iter()
            .zip(numeric.iter())
            .map(|(a, b)| (a - b).abs())
            .fold(0.0, f64::max);
        assert!(
            err < tolerance || max_abs < 1e-8,
            "{}: relative error {:e}, max abs diff {:e}",
            key,
            err,
            max_abs
        );
    }
}

fn f64_config(input_dim: usize, hidden: Vec<usize>, classes: usize) -> NetworkConfig {
    NetworkConfig {
        precision: Precision::Float64,
        seed: Some(123),
        weight_scale: 5e-2,
        ..NetworkConfig::new(input_dim, hidden, classes)
    }
}

// ============================================================================
// Two-layer net
// ============================================================================

mod two_layer_tests {
    use super::*;

    #[test]
    fn test_two_layer_small_scenario() {
        let mut net = TwoLayerNet::<f64>::new(4, 10, 3, 1e-2, 0.0, Some(0)).unwrap();
        let (x, y) = random_batch(5, 4, 3, 1);
        check_gradients(&mut net, &x, &y, 1e-6, 1e-5);
    }

    #[test]
    fn test_two_layer_with_reg() {
        let mut net = TwoLayerNet::<f64>::new(5, 8, 4, 5e-2, 0.7, Some(2)).unwrap();
        let (x, y) = random_batch(6, 5, 4, 3);
        check_gradients(&mut net, &x, &y, 1e-5, 1e-5);
    }
}

// ============================================================================
// Fully-connected net
// ============================================================================

mod fc_net_tests {
    use super::*;

    #[test]
    fn test_softmax_classifier_without_hidden_layers() {
        let mut net = FullyConnectedNet::<f64>::new(&f64_config(6, vec![], 4)).unwrap();
        let (x, y) = random_batch(5, 6, 4, 4);
        check_gradients(&mut net, &x, &y, 1e-5, 1e-6);
    }

    #[test]
    fn test_deep_net_with_reg() {
        for reg in [0.0, 3.14] {
            let config = NetworkConfig {
                reg,
                ..f64_config(15, vec![20, 30], 10)
            };
            let mut net = FullyConnectedNet::<f64>::new(&config).unwrap();
            let (x, y) = random_batch(2, 15, 10, 5);
            check_gradients(&mut net, &x, &y, 1e-5, 1e-4);
        }
    }

    #[test]
    fn test_batchnorm_net() {
        for reg in [0.0, 3.14] {
            let config = NetworkConfig {
                reg,
                use_batchnorm: true,
                ..f64_config(15, vec![20, 30], 10)
            };
            let mut net = FullyConnectedNet::<f64>::new(&config).unwrap();
            let (x, y) = random_batch(10, 15, 10, 6);
            check_gradients(&mut net, &x, &y, 1e-5, 1e-4);
        }
    }

    #[test]
    fn test_seeded_dropout_net() {
        for dropout in [0.25, 0.5] {
            let config = NetworkConfig {
                dropout,
                ..f64_config(15, vec![20, 30], 10)
            };
            let mut net = FullyConnectedNet::<f64>::new(&config).unwrap();
            let (x, y) = random_batch(4, 15, 10, 7);
            check_gradients(&mut net, &x, &y, 1e-5, 1e-4);
        }
    }

    #[test]
    fn test_batchnorm_and_dropout_together() {
        let config = NetworkConfig {
            use_batchnorm: true,
            dropout: 0.3,
            reg: 0.1,
            ..f64_config(8, vec![12, 9], 5)
        };
        let mut net = FullyConnectedNet::<f64>::new(&config).unwrap();
        let (x, y) = random_batch(8, 8, 5, 8);
        check_gradients(&mut net, &x, &y, 1e-5, 1e-4);
    }
}
