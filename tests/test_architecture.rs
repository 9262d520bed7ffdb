//! Tests for building networks from configuration
//!
//! Covers precision dispatch, layer sequence expansion and loading networks straight from
//! JSON files.

use fc_nets::architecture::{build_network, layer_sequence, load_network, LayerSpec, Network};
use fc_nets::config::{load_config, NetworkConfig, Precision};
use fc_nets::Classifier;
use ndarray::Array2;
use std::fs;
use tempfile::TempDir;

#[test]
fn test_load_network_from_bundled_config() {
    let network = load_network("config/cifar_fc.json").unwrap();
    assert_eq!(network.precision(), Precision::Float32);
    assert_eq!(network.num_layers(), 6);

    let keys: Vec<String> = network.param_keys().iter().map(ToString::to_string).collect();
    assert_eq!(keys.len(), 5 * 4 + 2);
    assert_eq!(&keys[..4], ["W1", "b1", "gamma1", "beta1"]);
    assert_eq!(&keys[20..], ["W6", "b6"]);
}

#[test]
fn test_layer_sequence_matches_config_file() {
    let config = load_config("config/mnist_dropout.json").unwrap();
    let names: Vec<String> = layer_sequence(&config)
        .iter()
        .map(ToString::to_string)
        .collect();
    assert_eq!(
        names,
        [
            "affine(784 -> 256)",
            "relu",
            "dropout(0.25)",
            "affine(256 -> 128)",
            "relu",
            "dropout(0.25)",
            "affine(128 -> 10)",
            "softmax(10)",
        ]
    );
}

#[test]
fn test_layer_sequence_counts_affine_layers() {
    let config = NetworkConfig {
        use_batchnorm: true,
        dropout: 0.1,
        ..NetworkConfig::new(32, vec![16, 16, 16], 4)
    };
    let layers = layer_sequence(&config);
    let affine = layers
        .iter()
        .filter(|l| matches!(l, LayerSpec::Affine { .. }))
        .count();
    let batchnorm = layers
        .iter()
        .filter(|l| matches!(l, LayerSpec::BatchNorm { .. }))
        .count();
    assert_eq!(affine, config.num_layers());
    assert_eq!(batchnorm, 3);
}

#[test]
fn test_built_f64_network_runs() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("net.json");
    fs::write(
        &path,
        r#"{ "input_dim": 6, "hidden_dims": [5], "num_classes": 2, "precision": "float64", "seed": 4 }"#,
    )
    .unwrap();

    let mut network = load_network(&path).unwrap();
    let net = match &mut network {
        Network::F64(net) => net,
        Network::F32(_) => panic!("expected a float64 network"),
    };
    let x = Array2::from_shape_fn((3, 6), |(i, j)| (i * j) as f64 * 0.1);
    let scores = net.loss(&x, None).unwrap().into_scores().unwrap();
    assert_eq!(scores.shape(), &[3, 2]);
}

#[test]
fn test_build_network_reports_parameter_count() {
    let config = NetworkConfig {
        use_batchnorm: true,
        ..NetworkConfig::new(4, vec![10], 3)
    };
    let network = build_network(&config).unwrap();
    // W1 + b1 + gamma1 + beta1 + W2 + b2
    assert_eq!(network.parameter_count(), 40 + 10 + 10 + 10 + 30 + 3);
}

#[test]
fn test_build_network_rejects_bad_config() {
    let config = NetworkConfig {
        batchnorm_momentum: 1.5,
        use_batchnorm: true,
        ..NetworkConfig::new(4, vec![10], 3)
    };
    assert!(build_network(&config).is_err());
}
