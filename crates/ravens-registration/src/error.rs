//! Error types for registration operations.
//!
//! Every failure of a registration run is reported as a [`RegistrationError`].
//! Input problems are detected before any optimization starts; numerical
//! breakdowns name the stage and pyramid level where they happened.

use ravens_core::{GeometryError, TransformError};
use thiserror::Error;

use crate::progress::Stage;

/// Main error type for registration operations.
#[derive(Error, Debug)]
pub enum RegistrationError {
    /// The input volumes or the resolution schedule cannot be registered.
    #[error("Invalid input geometry: {0}")]
    InputGeometry(String),

    /// Shape mismatch.
    #[error("Shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    /// A stage produced NaN/Inf values or a non-invertible transform.
    #[error("{stage} stage degenerated at level {level}: {reason}")]
    ConvergenceDegenerate {
        stage: Stage,
        level: usize,
        reason: String,
    },

    /// Writing or reading an artifact failed.
    #[error("I/O error: {0}")]
    Io(String),

    /// The run was cancelled through its cancellation token.
    #[error("Registration cancelled")]
    Cancelled,

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
}

/// Result type for registration operations.
pub type Result<T> = std::result::Result<T, RegistrationError>;

impl RegistrationError {
    /// Create an input geometry error.
    pub fn input_geometry(msg: impl Into<String>) -> Self {
        Self::InputGeometry(msg.into())
    }

    /// Create a convergence error for `stage` at pyramid `level`.
    pub fn degenerate(stage: Stage, level: usize, reason: impl Into<String>) -> Self {
        Self::ConvergenceDegenerate {
            stage,
            level,
            reason: reason.into(),
        }
    }

    /// Create an I/O error.
    pub fn io(msg: impl Into<String>) -> Self {
        Self::Io(msg.into())
    }

    /// Create an invalid configuration error.
    pub fn invalid_configuration(msg: impl Into<String>) -> Self {
        Self::InvalidConfiguration(msg.into())
    }

    /// True for errors raised before any optimization ran.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            Self::InputGeometry(_) | Self::ShapeMismatch { .. } | Self::InvalidConfiguration(_)
        )
    }
}

impl From<GeometryError> for RegistrationError {
    fn from(err: GeometryError) -> Self {
        Self::InputGeometry(err.to_string())
    }
}

impl From<TransformError> for RegistrationError {
    fn from(err: TransformError) -> Self {
        Self::InputGeometry(err.to_string())
    }
}
