//! Fully-Connected Classifier Networks
//!
//! Modular fully-connected softmax classifiers with optional batch normalization and
//! dropout. Each network owns its parameter store and exposes a single `loss` entry point:
//! scores in test mode, loss and gradients in training mode. Optimizers live outside the
//! crate and update parameters between calls.
//!
//! # Modules
//!
//! - `layers`: Layer trait and primitives (affine, ReLU, batch norm, dropout, softmax loss)
//! - `params`: Parameter store, parameter keys and batch norm running statistics
//! - `network`: Two-layer and fully-connected network assemblers
//! - `config`: Network configuration structures
//! - `architecture`: Precision dispatch and layer sequence description
//! - `utils`: Seeded RNG and numerical gradient checking

pub mod architecture;
pub mod config;
pub mod error;
pub mod layers;
pub mod network;
pub mod params;
pub mod tensor;
pub mod utils;

pub use error::{NetError, Result};
pub use network::{Classifier, FullyConnectedNet, LossOutput, TwoLayerNet};
pub use params::{Gradients, ParamKey, ParamSet, ParamsMut};
