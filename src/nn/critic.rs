//! State-value network shared by the reward and cost critics.

use burn::nn::Linear;
use burn::prelude::*;
use serde::{Deserialize, Serialize};

use super::mlp::{build_hidden, forward_hidden, trunk_width, Activation};
use super::orthogonal::{orthogonal_linear, VALUE_HEAD_GAIN};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriticConfig {
    pub obs_dim: usize,
    pub hidden_sizes: Vec<usize>,
    pub activation: Activation,
}

impl CriticConfig {
    pub fn new(obs_dim: usize) -> Self {
        Self {
            obs_dim,
            hidden_sizes: vec![64, 64],
            activation: Activation::Tanh,
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

    pub fn init<B: Backend>(&self, device: &B::Device) -> Critic<B> {
        let width = trunk_width(self.obs_dim, &self.hidden_sizes);
        Critic {
            hidden: build_hidden(self.obs_dim, &self.hidden_sizes, device),
            head: orthogonal_linear(width, 1, VALUE_HEAD_GAIN, device),
            activation: self.activation,
        }
    }
}

/// `V(s)` as an MLP with a scalar head.
#[derive(Module, Debug)]
pub struct Critic<B: Backend> {
    hidden: Vec<Linear<B>>,
    head: Linear<B>,
    #[module(skip)]
    activation: Activation,
}

impl<B: Backend> Critic<B> {
    /// Values `[batch]` for observations `[batch, obs_dim]`.
    pub fn forward(&self, observations: Tensor<B, 2>) -> Tensor<B, 1> {
        let batch = observations.dims()[0];
        let features = forward_hidden(&self.hidden, self.activation, observations);
        self.head.forward(features).reshape([batch])
    }

    /// Host-side values for a row-major observation block.
    pub fn predict(&self, observations: &[f32], obs_dim: usize, device: &B::Device) -> Vec<f32> {
        let batch = observations.len() / obs_dim.max(1);
        if batch == 0 {
            return Vec::new();
        }
        let input = Tensor::<B, 2>::from_data(TensorData::new(observations.to_vec(), [batch, obs_dim]), device);
        self.forward(input).into_data().iter::<f32>().collect()
    }
}
