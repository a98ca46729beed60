//! Policy abstraction seen by the trust-region optimizer.

use burn::module::Module;
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

use super::gaussian::DiagGaussian;

/// A stochastic policy producing a diagonal Gaussian per observation.
///
/// The optimizer only needs the distribution; how the network maps
/// observations to mean and log-std is up to the implementation.
pub trait GaussianPolicy<B: Backend>: Module<B> {
    /// Action distribution for `[batch, obs_dim]` observations.
    fn distribution(&self, observations: Tensor<B, 2>) -> DiagGaussian<B>;

    fn action_dim(&self) -> usize;
}
