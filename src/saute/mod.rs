//! Saute: safety budget folded into the state.
//!
//! - [`BudgetTracker`]: remaining budget of one environment copy
//! - [`SauteEnv`]: wraps a [`Cmdp`](crate::environment::Cmdp), one tracker per copy

pub mod budget;
pub mod env;

#[cfg(test)]
mod tests;

pub use budget::{BudgetTracker, PenaltyShape, SauteConfig};
pub use env::SauteEnv;
