//! Training runners for the trust-region family.
//!
//! - [`TrpoConfig`]: every run setting, validated up front
//! - [`Trainer`]: one worker's epoch loop (rollout, trust-region step,
//!   critic regression, metric dump)
//! - [`run_threaded`]: `world_size` trainers in lock-step on threads
//!
//! # Algorithms
//!
//! | name        | advantage               | environment          |
//! |-------------|-------------------------|----------------------|
//! | `TRPO`      | reward                  | raw CMDP             |
//! | `TRPOLag`   | `(A_r - λ A_c)/(1 + λ)` | raw CMDP             |
//! | `TRPOSaute` | reward                  | budget-augmented CMDP|

pub mod threaded;
pub mod trainer;
pub mod trpo_config;

#[cfg(test)]
mod tests;

pub use threaded::run_threaded;
pub use trainer::{keys, EpochSummary, TrainError, Trainer};
pub use trpo_config::{ConfigError, ModelConfig, TrpoConfig};
