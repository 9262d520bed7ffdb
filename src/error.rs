//! Error types shared across the crate.

use crate::params::ParamKey;
use thiserror::Error;

/// Errors raised while building a network or evaluating a minibatch.
#[derive(Debug, Error)]
pub enum NetError {
    /// Invalid construction options. Construction aborts and no network is returned.
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// Input or label dimensions disagree with the configured network.
    #[error("shape mismatch for {what}: expected {expected}, got {actual}")]
    ShapeMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("label {label} at index {index} is outside [0, {num_classes})")]
    LabelOutOfRange {
        index: usize,
        label: usize,
        num_classes: usize,
    },

    #[error("minibatch must contain at least one example")]
    EmptyBatch,

    #[error("unrecognized parameter key '{0}'")]
    UnknownKey(String),

    #[error("parameter {0} is not present in the store")]
    MissingParameter(ParamKey),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl NetError {
    pub(crate) fn config(msg: impl Into<String>) -> Self {
        NetError::Configuration(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, NetError>;
