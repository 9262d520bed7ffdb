//! Layer abstractions for neural networks
//!
//! This module provides the Layer trait and the primitives the network assemblers are built
//! from: affine, ReLU, batch normalization, dropout and the softmax loss.

mod r#trait;
pub mod affine;
pub mod batchnorm;
pub mod dropout;
pub mod relu;
pub mod softmax;

// Re-export the Layer trait for convenience
pub use affine::{Affine, AffineCache, AffineGrads};
pub use batchnorm::{BatchNorm, BatchNormCache, BatchNormGrads};
pub use dropout::{Dropout, DropoutCache};
pub use r#trait::Layer;
pub use relu::{Relu, ReluCache};
pub use softmax::{softmax_loss, softmax_rows};
