//! Network construction from configuration
//!
//! This module turns a [`NetworkConfig`] into a ready-to-train network of the requested
//! precision, and lists the layer sequence a config expands to.

use crate::config::{load_config, NetworkConfig, Precision};
use crate::error::Result;
use crate::network::{Classifier, FullyConnectedNet};
use crate::params::ParamKey;
use std::fmt;
use std::path::Path;

/// One layer of the expanded architecture.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LayerSpec {
    Affine { input_size: usize, output_size: usize },
    BatchNorm { size: usize, epsilon: f64, momentum: f64 },
    Relu,
    Dropout { drop_rate: f64 },
    Softmax { classes: usize },
}

impl fmt::Display for LayerSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LayerSpec::Affine {
                input_size,
                output_size,
            } => write!(f, "affine({} -> {})", input_size, output_size),
            LayerSpec::BatchNorm { size, .. } => write!(f, "batchnorm({})", size),
            LayerSpec::Relu => write!(f, "relu"),
            LayerSpec::Dropout { drop_rate } => write!(f, "dropout({})", drop_rate),
            LayerSpec::Softmax { classes } => write!(f, "softmax({})", classes),
        }
    }
}

/// Expands a config into its layer sequence, ending with the softmax loss.
///
/// # Examples
///
/// ```
/// use fc_nets::architecture::layer_sequence;
/// use fc_nets::config::NetworkConfig;
///
/// let layers = layer_sequence(&NetworkConfig::new(4, vec![10], 3));
/// let names: Vec<String> = layers.iter().map(ToString::to_string).collect();
/// assert_eq!(names, ["affine(4 -> 10)", "relu", "affine(10 -> 3)", "softmax(3)"]);
/// ```
pub fn layer_sequence(config: &NetworkConfig) -> Vec<LayerSpec> {
    let mut layers = Vec::new();
    let mut fan_in = config.input_dim;
    for &size in &config.hidden_dims {
        layers.push(LayerSpec::Affine {
            input_size: fan_in,
            output_size: size,
        });
        if config.use_batchnorm {
            layers.push(LayerSpec::BatchNorm {
                size,
                epsilon: config.batchnorm_epsilon,
                momentum: config.batchnorm_momentum,
            });
        }
        layers.push(LayerSpec::Relu);
        if config.use_dropout() {
            layers.push(LayerSpec::Dropout {
                drop_rate: config.dropout,
            });
        }
        fan_in = size;
    }
    layers.push(LayerSpec::Affine {
        input_size: fan_in,
        output_size: config.num_classes,
    });
    layers.push(LayerSpec::Softmax {
        classes: config.num_classes,
    });
    layers
}

/// A fully-connected network in whichever precision its config selected.
#[derive(Debug, Clone)]
pub enum Network {
    F32(FullyConnectedNet<f32>),
    F64(FullyConnectedNet<f64>),
}

impl Network {
    pub fn precision(&self) -> Precision {
        match self {
            Network::F32(_) => Precision::Float32,
            Network::F64(_) => Precision::Float64,
        }
    }

    pub fn num_layers(&self) -> usize {
        match self {
            Network::F32(net) => net.num_layers(),
            Network::F64(net) => net.num_layers(),
        }
    }

    pub fn parameter_count(&self) -> usize {
        match self {
            Network::F32(net) => net.params().parameter_count(),
            Network::F64(net) => net.params().parameter_count(),
        }
    }

    pub fn param_keys(&self) -> Vec<ParamKey> {
        match self {
            Network::F32(net) => net.params().keys(),
            Network::F64(net) => net.params().keys(),
        }
    }

    pub fn as_f32(&mut self) -> Option<&mut FullyConnectedNet<f32>> {
        match self {
            Network::F32(net) => Some(net),
            Network::F64(_) => None,
        }
    }

    pub fn as_f64(&mut self) -> Option<&mut FullyConnectedNet<f64>> {
        match self {
            Network::F64(net) => Some(net),
            Network::F32(_) => None,
        }
    }
}

/// Builds a network with freshly initialized parameters in the config's precision.
pub fn build_network(config: &NetworkConfig) -> Result<Network> {
    let network = match config.precision {
        Precision::Float32 => Network::F32(FullyConnectedNet::new(config)?),
        Precision::Float64 => Network::F64(FullyConnectedNet::new(config)?),
    };
    log::info!(
        "built {:?} network: {}",
        network.precision(),
        layer_sequence(config)
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(" - ")
    );
    Ok(network)
}

/// Loads a JSON config from `path` and builds the network it describes.
///
/// # Examples
///
/// ```no_run
/// use fc_nets::architecture::load_network;
///
/// let network = load_network("config/cifar_fc.json").unwrap();
/// assert!(network.num_layers() >= 1);
/// ```
pub fn load_network(path: impl AsRef<Path>) -> Result<Network> {
    let config = load_config(path)?;
    build_network(&config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layer_sequence_with_batchnorm_and_dropout() {
        let config = NetworkConfig {
            use_batchnorm: true,
            dropout: 0.5,
            ..NetworkConfig::new(8, vec![6], 2)
        };
        let layers = layer_sequence(&config);
        assert_eq!(layers.len(), 6);
        assert_eq!(
            layers[1],
            LayerSpec::BatchNorm {
                size: 6,
                epsilon: 1e-5,
                momentum: 0.9
            }
        );
        assert_eq!(layers[3], LayerSpec::Dropout { drop_rate: 0.5 });
        assert_eq!(layers[5], LayerSpec::Softmax { classes: 2 });
    }

    #[test]
    fn test_layer_sequence_without_hidden_layers() {
        let layers = layer_sequence(&NetworkConfig::new(5, vec![], 3));
        assert_eq!(
            layers,
            vec![
                LayerSpec::Affine {
                    input_size: 5,
                    output_size: 3
                },
                LayerSpec::Softmax { classes: 3 }
            ]
        );
    }

    #[test]
    fn test_build_network_follows_precision() {
        let mut config = NetworkConfig::new(4, vec![10], 3);
        assert_eq!(build_network(&config).unwrap().precision(), Precision::Float32);

        config.precision = Precision::Float64;
        let mut network = build_network(&config).unwrap();
        assert_eq!(network.precision(), Precision::Float64);
        assert!(network.as_f32().is_none());
        assert!(network.as_f64().is_some());
        assert_eq!(network.parameter_count(), 4 * 10 + 10 + 10 * 3 + 3);
    }

    #[test]
    fn test_build_network_rejects_invalid_config() {
        let config = NetworkConfig {
            weight_scale: 0.0,
            ..NetworkConfig::new(4, vec![10], 3)
        };
        assert!(build_network(&config).is_err());
    }
}
