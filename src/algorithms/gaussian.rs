//! Diagonal Gaussian action distribution.
//!
//! Actions are unsquashed: the environment adapter clips them into the
//! action box. All reductions sum over the action dimension.
//!
//! ```text
//! log π(a|s) = Σ_i [ -0.5 ((a_i - μ_i)/σ_i)² - log σ_i - 0.5 log 2π ]
//! H          = Σ_i [ 0.5 + 0.5 log 2π + log σ_i ]
//! KL(p‖q)    = Σ_i [ log σq_i - log σp_i + (σp_i² + (μp_i - μq_i)²) / (2 σq_i²) - 0.5 ]
//! ```

use burn::tensor::backend::Backend;
use burn::tensor::{Distribution, Tensor};

pub const LOG_STD_MIN: f32 = -20.0;
pub const LOG_STD_MAX: f32 = 2.0;

/// Batch of independent diagonal Gaussians, both tensors `[batch, action_dim]`.
#[derive(Debug, Clone)]
pub struct DiagGaussian<B: Backend> {
    mean: Tensor<B, 2>,
    log_std: Tensor<B, 2>,
}

impl<B: Backend> DiagGaussian<B> {
    /// `log_std` is clamped to `[LOG_STD_MIN, LOG_STD_MAX]`.
    pub fn new(mean: Tensor<B, 2>, log_std: Tensor<B, 2>) -> Self {
        Self {
            mean,
            log_std: log_std.clamp(LOG_STD_MIN, LOG_STD_MAX),
        }
    }

    pub fn mean(&self) -> Tensor<B, 2> {
        self.mean.clone()
    }

    pub fn log_std(&self) -> Tensor<B, 2> {
        self.log_std.clone()
    }

    pub fn std(&self) -> Tensor<B, 2> {
        self.log_std.clone().exp()
    }

    pub fn batch_size(&self) -> usize {
        self.mean.dims()[0]
    }

    /// Copy cut from the autodiff graph.
    pub fn detach(&self) -> Self {
        Self {
            mean: self.mean.clone().detach(),
            log_std: self.log_std.clone().detach(),
        }
    }

    /// `mean + std * ε`, ε ~ N(0, I).
    pub fn sample(&self) -> Tensor<B, 2> {
        let noise: Tensor<B, 2> = Tensor::random(self.mean.shape(), Distribution::Normal(0.0, 1.0), &self.mean.device());
        self.mean.clone() + self.std() * noise
    }

    /// Log-density of `actions`: [batch].
    pub fn log_prob(&self, actions: Tensor<B, 2>) -> Tensor<B, 1> {
        let batch = self.batch_size();
        let log_2pi = (2.0 * std::f32::consts::PI).ln();
        let z = (actions - self.mean.clone()) / self.std();
        let per_dim = z.powf_scalar(2.0).mul_scalar(-0.5) - self.log_std.clone() - 0.5 * log_2pi;
        per_dim.sum_dim(1).reshape([batch])
    }

    /// Differential entropy: [batch].
    pub fn entropy(&self) -> Tensor<B, 1> {
        let batch = self.batch_size();
        let log_2pi = (2.0 * std::f32::consts::PI).ln();
        (self.log_std.clone() + (0.5 + 0.5 * log_2pi)).sum_dim(1).reshape([batch])
    }

    /// KL(self ‖ other): [batch].
    pub fn kl(&self, other: &Self) -> Tensor<B, 1> {
        let batch = self.batch_size();
        let var_p = self.log_std.clone().mul_scalar(2.0).exp();
        let var_q = other.log_std.clone().mul_scalar(2.0).exp();
        let mean_diff_sq = (self.mean.clone() - other.mean.clone()).powf_scalar(2.0);
        let per_dim = other.log_std.clone() - self.log_std.clone() + (var_p + mean_diff_sq) / var_q.mul_scalar(2.0)
            - 0.5;
        per_dim.sum_dim(1).reshape([batch])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type B = NdArray<f32>;

    fn scalar(t: Tensor<B, 1>) -> f32 {
        t.into_data().as_slice::<f32>().unwrap()[0]
    }

    fn dist(mean: [[f32; 2]; 1], log_std: [[f32; 2]; 1]) -> DiagGaussian<B> {
        let device = Default::default();
        DiagGaussian::new(
            Tensor::from_floats(mean, &device),
            Tensor::from_floats(log_std, &device),
        )
    }

    #[test]
    fn test_log_prob_standard_normal_at_mean() {
        let d = dist([[0.0, 0.0]], [[0.0, 0.0]]);
        let lp = scalar(d.log_prob(d.mean()));
        let expected = -(2.0 * std::f32::consts::PI).ln();
        assert!((lp - expected).abs() < 1e-5);
    }

    #[test]
    fn test_entropy_matches_closed_form() {
        let d = dist([[0.0, 0.0]], [[0.5, -0.5]]);
        let h = scalar(d.entropy());
        let expected = 2.0 * (0.5 + 0.5 * (2.0 * std::f32::consts::PI).ln());
        assert!((h - expected).abs() < 1e-5);
    }

    #[test]
    fn test_kl_self_is_zero() {
        let d = dist([[0.3, -1.0]], [[0.1, -0.4]]);
        assert!(scalar(d.kl(&d)).abs() < 1e-6);
    }

    #[test]
    fn test_kl_mean_shift() {
        // Unit variances: KL = 0.5 * |Δμ|²
        let p = dist([[0.0, 0.0]], [[0.0, 0.0]]);
        let q = dist([[1.0, 2.0]], [[0.0, 0.0]]);
        assert!((scalar(p.kl(&q)) - 2.5).abs() < 1e-5);
    }

    #[test]
    fn test_kl_nonnegative_and_asymmetric() {
        let p = dist([[0.0, 0.0]], [[0.0, 0.0]]);
        let q = dist([[0.5, 0.0]], [[1.0, 0.0]]);
        let pq = scalar(p.kl(&q));
        let qp = scalar(q.kl(&p));
        assert!(pq > 0.0 && qp > 0.0);
        assert!((pq - qp).abs() > 1e-3);
    }

    #[test]
    fn test_log_std_clamped() {
        let d = dist([[0.0, 0.0]], [[-100.0, 100.0]]);
        let ls = d.log_std().into_data();
        let ls = ls.as_slice::<f32>().unwrap();
        assert_eq!(ls, &[LOG_STD_MIN, LOG_STD_MAX]);
    }

    #[test]
    fn test_sample_shape() {
        let d = dist([[0.0, 0.0]], [[0.0, 0.0]]);
        assert_eq!(d.sample().dims(), [1, 2]);
    }
}
