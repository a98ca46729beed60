//! Policy and value networks.
//!
//! - [`actor`]: diagonal-Gaussian actor with a learned, state-independent log-std
//! - [`critic`]: scalar value network (used for both reward and cost)
//! - [`orthogonal`]: orthogonal initialization of dense layers

pub mod actor;
pub mod critic;
pub mod mlp;
pub mod orthogonal;

pub use actor::{GaussianActor, GaussianActorConfig};
pub use critic::{Critic, CriticConfig};
pub use mlp::Activation;
pub use orthogonal::{orthogonal_linear, orthogonal_matrix};
