//! Shared feed-forward trunk pieces.

use burn::nn::Linear;
use burn::prelude::*;
use burn::tensor::activation::{relu, tanh};
use serde::{Deserialize, Serialize};

use super::orthogonal::{orthogonal_linear, HIDDEN_GAIN};

/// Hidden-layer nonlinearity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Activation {
    #[default]
    Tanh,
    Relu,
}

impl core::fmt::Display for Activation {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Debug::fmt(self, f)
    }
}

use burn::constant;
constant!(Activation);

impl Activation {
    pub fn apply<B: Backend, const D: usize>(self, x: Tensor<B, D>) -> Tensor<B, D> {
        match self {
            Activation::Tanh => tanh(x),
            Activation::Relu => relu(x),
        }
    }
}

/// Hidden layers `input -> sizes[0] -> ... -> sizes[n-1]`.
pub fn build_hidden<B: Backend>(input: usize, sizes: &[usize], device: &B::Device) -> Vec<Linear<B>> {
    let mut layers = Vec::with_capacity(sizes.len());
    let mut width = input;
    for &size in sizes {
        layers.push(orthogonal_linear(width, size, HIDDEN_GAIN, device));
        width = size;
    }
    layers
}

/// Output width of the trunk.
pub fn trunk_width(input: usize, sizes: &[usize]) -> usize {
    sizes.last().copied().unwrap_or(input)
}

/// Apply hidden layers with the activation after each.
pub fn forward_hidden<B: Backend>(layers: &[Linear<B>], activation: Activation, mut x: Tensor<B, 2>) -> Tensor<B, 2> {
    for layer in layers {
        x = activation.apply(layer.forward(x));
    }
    x
}
