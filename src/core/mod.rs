//! Core building blocks shared across the crate.
//!
//! - [`distributed`]: explicit distributed context and collective reductions
//! - [`param_vector`]: flat parameter views of burn modules
//! - [`running_stats`]: Welford running statistics
//! - [`transition`]: the recorded per-step data

pub mod distributed;
pub mod param_vector;
pub mod running_stats;
pub mod transition;

pub use distributed::{Collective, DistributedContext, LocalCollective, ThreadCollective};
pub use param_vector::{flatten_grads, flatten_params, gradients_from_flat, load_params};
pub use running_stats::RunningMeanStd;
pub use transition::Transition;
