//! Algorithm components for trust-region safe RL.
//!
//! - `gae`: Generalized Advantage Estimation over finished paths
//! - `gaussian`: diagonal Gaussian action distribution
//! - `policy`: the policy trait seen by the optimizer
//! - `conjugate_gradient`: matrix-free CG solver
//! - `trust_region`: natural-gradient step with KL line search and rollback
//! - `lagrange`: multiplier for the Lagrangian variant
//! - `algorithm`: closed set of supported variants

pub mod algorithm;
pub mod conjugate_gradient;
pub mod gae;
pub mod gaussian;
pub mod lagrange;
pub mod policy;
pub mod trust_region;

#[cfg(test)]
mod tests;

pub use algorithm::AlgorithmKind;
pub use conjugate_gradient::{conjugate_gradients, CgResult};
pub use gae::{center, compute_gae, discount_cumsum, estimate_path, standardize, PathEstimates};
pub use gaussian::DiagGaussian;
pub use lagrange::{Lagrange, LagrangeConfig};
pub use policy::GaussianPolicy;
pub use trust_region::{
    PolicyBatch, RejectReason, TrustRegionConfig, TrustRegionOptimizer, TrustRegionStats, UpdateOutcome,
};
