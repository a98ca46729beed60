//! Environment errors.

use std::fmt;

/// Errors raised while stepping or resetting environments.
///
/// These propagate to the caller and abort the current rollout.
#[derive(Debug, Clone, PartialEq)]
pub enum EnvError {
    /// Flat action buffer does not match `n_envs * action_dim`.
    ActionDimensionMismatch { expected: usize, got: usize },
    /// An environment returned an observation of the wrong size.
    ObservationDimensionMismatch { expected: usize, got: usize },
    /// A vector environment needs at least one copy.
    NoEnvironments,
    /// Copies of a vector environment declare different spaces.
    InconsistentSpaces { index: usize },
    /// Failure reported by the simulator itself.
    Backend(String),
}

impl fmt::Display for EnvError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnvError::ActionDimensionMismatch { expected, got } => {
                write!(f, "action buffer has {} values, expected {}", got, expected)
            }
            EnvError::ObservationDimensionMismatch { expected, got } => {
                write!(f, "observation has {} values, expected {}", got, expected)
            }
            EnvError::NoEnvironments => write!(f, "vector environment needs at least one copy"),
            EnvError::InconsistentSpaces { index } => {
                write!(f, "environment copy {} declares different spaces than copy 0", index)
            }
            EnvError::Backend(msg) => write!(f, "environment backend error: {}", msg),
        }
    }
}

impl std::error::Error for EnvError {}
