//! Configuration structures for network construction
//!
//! This module provides the configuration accepted by the network assemblers,
//! either built in code or parsed from a JSON file.

use crate::error::{NetError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Floating point precision used for parameters and all computations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Precision {
    #[default]
    Float32,
    Float64,
}

/// Construction options for a fully-connected classifier.
///
/// Every field has a default, so a JSON file only needs to name what it changes:
///
/// ```json
/// {
///   "input_dim": 784,
///   "hidden_dims": [256, 128],
///   "num_classes": 10,
///   "weight_scale": 0.05,
///   "reg": 0.001,
///   "use_batchnorm": true,
///   "dropout": 0.25,
///   "precision": "float64",
///   "seed": 231
/// }
/// ```
///
/// - **dropout** is the probability of dropping a unit; `0.0` disables dropout entirely.
/// - **seed** makes weight initialization and dropout masks reproducible. With a seed,
///   every training call draws the same dropout masks.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct NetworkConfig {
    /// Number of features per example after flattening
    pub input_dim: usize,

    /// Width of each hidden layer, in order. May be empty (linear softmax classifier).
    pub hidden_dims: Vec<usize>,

    /// Number of output classes
    pub num_classes: usize,

    /// Standard deviation of the zero-mean normal used to draw initial weights
    pub weight_scale: f64,

    /// L2 regularization strength
    pub reg: f64,

    /// Insert batch normalization between every hidden affine layer and its ReLU
    pub use_batchnorm: bool,

    /// Dropout probability in [0, 1)
    pub dropout: f64,

    /// Numeric precision of the parameter store
    pub precision: Precision,

    /// Seed for initialization and dropout masks
    pub seed: Option<u64>,

    /// Variance offset used by batch normalization
    pub batchnorm_epsilon: f64,

    /// Decay of the batch normalization running statistics
    pub batchnorm_momentum: f64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            input_dim: 3 * 32 * 32,
            hidden_dims: Vec::new(),
            num_classes: 10,
            weight_scale: 1e-2,
            reg: 0.0,
            use_batchnorm: false,
            dropout: 0.0,
            precision: Precision::Float32,
            seed: None,
            batchnorm_epsilon: 1e-5,
            batchnorm_momentum: 0.9,
        }
    }
}

impl NetworkConfig {
    /// Config with the given dimensions and defaults everywhere else.
    pub fn new(input_dim: usize, hidden_dims: Vec<usize>, num_classes: usize) -> Self {
        Self {
            input_dim,
            hidden_dims,
            num_classes,
            ..Self::default()
        }
    }

    /// Same config with `precision` replaced.
    pub fn with_precision(self, precision: Precision) -> Self {
        Self { precision, ..self }
    }

    /// Total number of affine layers (hidden layers plus the output layer).
    pub fn num_layers(&self) -> usize {
        self.hidden_dims.len() + 1
    }

    /// Whether dropout layers are part of the network.
    pub fn use_dropout(&self) -> bool {
        self.dropout > 0.0
    }

    /// Output width of every affine layer, ending with `num_classes`.
    pub fn layer_dims(&self) -> Vec<usize> {
        let mut dims = self.hidden_dims.clone();
        dims.push(self.num_classes);
        dims
    }

    /// Checks every option, returning a `Configuration` error for the first invalid one.
    pub fn validate(&self) -> Result<()> {
        if self.input_dim == 0 {
            return Err(NetError::config("input_dim must be greater than 0"));
        }
        if self.num_classes == 0 {
            return Err(NetError::config("num_classes must be greater than 0"));
        }
        if let Some(i) = self.hidden_dims.iter().position(|&h| h == 0) {
            return Err(NetError::config(format!(
                "hidden_dims[{}] must be greater than 0",
                i
            )));
        }
        if !(self.weight_scale.is_finite() && self.weight_scale > 0.0) {
            return Err(NetError::config(format!(
                "weight_scale must be positive and finite, got {}",
                self.weight_scale
            )));
        }
        if !(self.reg.is_finite() && self.reg >= 0.0) {
            return Err(NetError::config(format!(
                "reg must be non-negative and finite, got {}",
                self.reg
            )));
        }
        if !(0.0..1.0).contains(&self.dropout) {
            return Err(NetError::config(format!(
                "dropout must be in range [0.0, 1.0), got {}",
                self.dropout
            )));
        }
        if !(self.batchnorm_epsilon.is_finite() && self.batchnorm_epsilon > 0.0) {
            return Err(NetError::config("batchnorm_epsilon must be positive"));
        }
        if !(0.0..=1.0).contains(&self.batchnorm_momentum) {
            return Err(NetError::config(
                "batchnorm_momentum must be in range [0.0, 1.0]",
            ));
        }
        Ok(())
    }
}

/// Loads a network configuration from a JSON file.
///
/// Reads the file at `path`, deserializes it into a `NetworkConfig` and validates it.
///
/// # Examples
///
/// ```no_run
/// use fc_nets::config::load_config;
///
/// let cfg = load_config("config/cifar_fc.json").unwrap();
/// assert!(cfg.num_layers() >= 1);
/// ```
pub fn load_config(path: impl AsRef<Path>) -> Result<NetworkConfig> {
    let contents = fs::read_to_string(path)?;
    let config: NetworkConfig = serde_json::from_str(&contents)?;
    config.validate()?;
    Ok(config)
}
