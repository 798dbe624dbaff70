//! Error types for the flowlines core.

use thiserror::Error;

/// Errors produced while constructing fields, packers and sessions.
///
/// Sampling and point queries never fail; they return `None` instead. Only
/// construction-time validation produces a `FlowError`.
#[derive(Debug, Error)]
pub enum FlowError {
    /// Width or height was zero when creating a field, packer or session.
    #[error("invalid dimensions: width and height must be non-zero")]
    InvalidDimensions,

    /// A configuration value was outside its valid domain.
    #[error("invalid parameter '{name}': {reason}")]
    InvalidParameter { name: String, reason: String },

    /// A generator spec named a kind that does not exist.
    #[error("unknown generator: {0}")]
    UnknownGenerator(String),
}

impl FlowError {
    /// Shorthand for [`FlowError::InvalidParameter`].
    pub fn invalid(name: &str, reason: impl Into<String>) -> Self {
        FlowError::InvalidParameter {
            name: name.to_string(),
            reason: reason.into(),
        }
    }
}
