//! Gaussian MLP actor with a state-independent log-std.

use burn::module::{Module, Param};
use burn::nn::Linear;
use burn::prelude::*;
use serde::{Deserialize, Serialize};

use super::mlp::{build_hidden, forward_hidden, trunk_width, Activation};
use super::orthogonal::{orthogonal_linear, POLICY_HEAD_GAIN};
use crate::algorithms::gaussian::DiagGaussian;
use crate::algorithms::policy::GaussianPolicy;

/// Actor network settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GaussianActorConfig {
    pub obs_dim: usize,
    pub action_dim: usize,
    pub hidden_sizes: Vec<usize>,
    pub activation: Activation,
    /// Initial value of every log-std entry.
    pub init_log_std: f32,
}

impl GaussianActorConfig {
    pub fn new(obs_dim: usize, action_dim: usize) -> Self {
        Self {
            obs_dim,
            action_dim,
            hidden_sizes: vec![64, 64],
            activation: Activation::Tanh,
            init_log_std: -0.5,
        }
    }

    pub fn with_hidden_sizes(mut self, sizes: Vec<usize>) -> Self {
        self.hidden_sizes = sizes;
        self
    }

    pub fn with_activation(mut self, activation: Activation) -> Self {
        self.activation = activation;
        self
    }

    pub fn with_init_log_std(mut self, log_std: f32) -> Self {
        self.init_log_std = log_std;
        self
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> GaussianActor<B> {
        let width = trunk_width(self.obs_dim, &self.hidden_sizes);
        GaussianActor {
            hidden: build_hidden(self.obs_dim, &self.hidden_sizes, device),
            mean_head: orthogonal_linear(width, self.action_dim, POLICY_HEAD_GAIN, device),
            log_std: Param::from_tensor(Tensor::full([self.action_dim], self.init_log_std, device)),
            activation: self.activation,
            action_dim: self.action_dim,
        }
    }
}

/// `π(a|s) = N(μ_θ(s), diag(exp(log_std))²)`
#[derive(Module, Debug)]
pub struct GaussianActor<B: Backend> {
    hidden: Vec<Linear<B>>,
    mean_head: Linear<B>,
    log_std: Param<Tensor<B, 1>>,
    #[module(skip)]
    activation: Activation,
    #[module(skip)]
    action_dim: usize,
}

impl<B: Backend> GaussianActor<B> {
    /// Mean `[batch, action_dim]` and broadcast log-std of the same shape.
    pub fn forward(&self, observations: Tensor<B, 2>) -> (Tensor<B, 2>, Tensor<B, 2>) {
        let features = forward_hidden(&self.hidden, self.activation, observations);
        let mean = self.mean_head.forward(features);
        let batch = mean.dims()[0];
        let log_std = self.log_std.val().unsqueeze_dim::<2>(0).repeat_dim(0, batch);
        (mean, log_std)
    }

    /// Current log-std vector.
    pub fn log_std(&self) -> Tensor<B, 1> {
        self.log_std.val()
    }
}

impl<B: Backend> GaussianPolicy<B> for GaussianActor<B> {
    fn distribution(&self, observations: Tensor<B, 2>) -> DiagGaussian<B> {
        let (mean, log_std) = self.forward(observations);
        DiagGaussian::new(mean, log_std)
    }

    fn action_dim(&self) -> usize {
        self.action_dim
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::{Autodiff, NdArray};

    type B = NdArray<f32>;

    #[test]
    fn test_output_shapes() {
        let device = Default::default();
        let actor: GaussianActor<B> = GaussianActorConfig::new(4, 2).init(&device);
        let obs = Tensor::<B, 2>::zeros([3, 4], &device);
        let (mean, log_std) = actor.forward(obs);
        assert_eq!(mean.dims(), [3, 2]);
        assert_eq!(log_std.dims(), [3, 2]);
    }

    #[test]
    fn test_log_std_is_state_independent() {
        let device = Default::default();
        let actor: GaussianActor<B> = GaussianActorConfig::new(2, 2).with_init_log_std(-1.0).init(&device);
        let obs = Tensor::<B, 2>::from_floats([[0.0, 1.0], [5.0, -3.0]], &device);
        let (_, log_std) = actor.forward(obs);
        let values = log_std.into_data();
        assert!(values.as_slice::<f32>().unwrap().iter().all(|&v| (v + 1.0).abs() < 1e-6));
    }

    #[test]
    fn test_num_params_includes_log_std() {
        let device = Default::default();
        let actor: GaussianActor<B> = GaussianActorConfig::new(3, 2).with_hidden_sizes(vec![4]).init(&device);
        // 3*4 + 4 + 4*2 + 2 + 2
        assert_eq!(actor.num_params(), 28);
    }

    #[test]
    fn test_log_std_receives_gradient() {
        let device = Default::default();
        let actor: GaussianActor<Autodiff<B>> = GaussianActorConfig::new(2, 1).init(&device);
        let obs = Tensor::<Autodiff<B>, 2>::ones([4, 2], &device);
        let dist = actor.distribution(obs);
        let grads = dist.entropy().mean().backward();
        let grad = actor.log_std().grad(&grads).unwrap();
        // dH/dlog_std = 1 per dimension
        assert!((grad.into_data().as_slice::<f32>().unwrap()[0] - 1.0).abs() < 1e-5);
    }
}
