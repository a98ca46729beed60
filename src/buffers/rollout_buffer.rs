//! Per-epoch rollout buffer for on-policy trust-region training.
//!
//! Key characteristics:
//! - One storage lane per environment copy, temporal order preserved
//! - Paths are closed explicitly with their bootstrap values
//! - Reward and cost streams get independent GAE estimates
//! - Drained once per epoch into an immutable [`RolloutBatch`]

use std::fmt;

use burn::prelude::*;

use crate::algorithms::gae::{center, estimate_path, standardize};
use crate::algorithms::trust_region::PolicyBatch;
use crate::core::{DistributedContext, Transition};

/// Configuration for the rollout buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct RolloutBufferConfig {
    pub n_envs: usize,
    /// Steps stored per environment copy each epoch.
    pub steps_per_env: usize,
    pub obs_dim: usize,
    pub action_dim: usize,
    pub gamma: f32,
    pub gae_lambda: f32,
    /// Standardize reward advantages across workers.
    pub standardize_advantages: bool,
    /// Center cost advantages across workers.
    pub center_cost_advantages: bool,
}

impl RolloutBufferConfig {
    pub fn new(n_envs: usize, steps_per_env: usize, obs_dim: usize, action_dim: usize) -> Self {
        Self {
            n_envs,
            steps_per_env,
            obs_dim,
            action_dim,
            gamma: 0.99,
            gae_lambda: 0.95,
            standardize_advantages: true,
            center_cost_advantages: true,
        }
    }

    pub fn with_discount(mut self, gamma: f32, gae_lambda: f32) -> Self {
        self.gamma = gamma;
        self.gae_lambda = gae_lambda;
        self
    }

    pub fn with_advantage_normalization(mut self, standardize: bool, center_cost: bool) -> Self {
        self.standardize_advantages = standardize;
        self.center_cost_advantages = center_cost;
        self
    }
}

/// Misuse of the rollout buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BufferError {
    EnvOutOfRange { env: usize, n_envs: usize },
    Full { env: usize, capacity: usize },
    ShapeMismatch { field: &'static str, expected: usize, got: usize },
    /// A lane still has transitions not covered by `finish_path`.
    UnfinishedPath { env: usize },
}

impl fmt::Display for BufferError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BufferError::EnvOutOfRange { env, n_envs } => {
                write!(f, "environment index {} out of range ({} envs)", env, n_envs)
            }
            BufferError::Full { env, capacity } => {
                write!(f, "rollout lane {} is full ({} steps)", env, capacity)
            }
            BufferError::ShapeMismatch { field, expected, got } => {
                write!(f, "{} has length {}, expected {}", field, got, expected)
            }
            BufferError::UnfinishedPath { env } => {
                write!(f, "rollout lane {} has an unfinished path", env)
            }
        }
    }
}

impl std::error::Error for BufferError {}

#[derive(Debug, Default)]
struct Lane {
    transitions: Vec<Transition>,
    path_start: usize,
    reward_advantages: Vec<f32>,
    cost_advantages: Vec<f32>,
    reward_targets: Vec<f32>,
    cost_targets: Vec<f32>,
}

impl Lane {
    fn clear(&mut self) {
        self.transitions.clear();
        self.path_start = 0;
        self.reward_advantages.clear();
        self.cost_advantages.clear();
        self.reward_targets.clear();
        self.cost_targets.clear();
    }
}

/// Everything the update phase needs from one epoch of experience.
///
/// Rows are lane-major (all of env 0, then env 1, ...).
#[derive(Debug, Clone, PartialEq)]
pub struct RolloutBatch {
    /// `[len * obs_dim]`
    pub observations: Vec<f32>,
    /// `[len * action_dim]`
    pub actions: Vec<f32>,
    pub log_probs: Vec<f32>,
    pub reward_advantages: Vec<f32>,
    pub cost_advantages: Vec<f32>,
    pub reward_targets: Vec<f32>,
    pub cost_targets: Vec<f32>,
    pub obs_dim: usize,
    pub action_dim: usize,
}

impl RolloutBatch {
    pub fn len(&self) -> usize {
        self.log_probs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.log_probs.is_empty()
    }

    /// Mean reward advantage after normalization.
    pub fn mean_advantage(&self) -> f32 {
        if self.is_empty() {
            return 0.0;
        }
        self.reward_advantages.iter().sum::<f32>() / self.len() as f32
    }

    /// Tensors for the policy step, with `advantages` as the surrogate signal.
    pub fn policy_batch<B: Backend>(
        &self,
        advantages: &[f32],
        with_cost: bool,
        device: &B::Device,
    ) -> PolicyBatch<B> {
        let n = self.len();
        let vector = |values: &[f32]| Tensor::<B, 1>::from_data(TensorData::new(values.to_vec(), [n]), device);
        PolicyBatch {
            observations: Tensor::from_data(TensorData::new(self.observations.clone(), [n, self.obs_dim]), device),
            actions: Tensor::from_data(TensorData::new(self.actions.clone(), [n, self.action_dim]), device),
            log_probs: vector(&self.log_probs),
            advantages: vector(advantages),
            cost_advantages: with_cost.then(|| vector(&self.cost_advantages)),
        }
    }
}

/// Fixed-capacity rollout storage for one worker.
#[derive(Debug)]
pub struct RolloutBuffer {
    config: RolloutBufferConfig,
    lanes: Vec<Lane>,
}

impl RolloutBuffer {
    pub fn new(config: RolloutBufferConfig) -> Self {
        let lanes = (0..config.n_envs)
            .map(|_| Lane {
                transitions: Vec::with_capacity(config.steps_per_env),
                ..Lane::default()
            })
            .collect();
        Self { config, lanes }
    }

    pub fn config(&self) -> &RolloutBufferConfig {
        &self.config
    }

    /// Transitions stored across all lanes.
    pub fn len(&self) -> usize {
        self.lanes.iter().map(|l| l.transitions.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether every lane holds `steps_per_env` transitions.
    pub fn is_full(&self) -> bool {
        self.lanes.iter().all(|l| l.transitions.len() >= self.config.steps_per_env)
    }

    /// Append one transition to lane `env`.
    pub fn store(&mut self, env: usize, transition: Transition) -> Result<(), BufferError> {
        let (obs_dim, action_dim, capacity) = (self.config.obs_dim, self.config.action_dim, self.config.steps_per_env);
        let lane = self.lane_mut(env)?;
        if lane.transitions.len() >= capacity {
            return Err(BufferError::Full { env, capacity });
        }
        if transition.observation.len() != obs_dim {
            return Err(BufferError::ShapeMismatch {
                field: "observation",
                expected: obs_dim,
                got: transition.observation.len(),
            });
        }
        if transition.action.len() != action_dim {
            return Err(BufferError::ShapeMismatch {
                field: "action",
                expected: action_dim,
                got: transition.action.len(),
            });
        }
        lane.transitions.push(transition);
        Ok(())
    }

    /// Close the open path of lane `env`.
    ///
    /// `last_value` / `last_cost_value` are the bootstrap values: zero when
    /// the path terminated, the critics' estimate of the final observation
    /// when it was truncated or cut by the end of the epoch.
    pub fn finish_path(&mut self, env: usize, last_value: f32, last_cost_value: f32) -> Result<(), BufferError> {
        let (gamma, lambda) = (self.config.gamma, self.config.gae_lambda);
        let lane = self.lane_mut(env)?;
        let path = &lane.transitions[lane.path_start..];
        if path.is_empty() {
            return Ok(());
        }

        let rewards: Vec<f32> = path.iter().map(|t| t.reward).collect();
        let costs: Vec<f32> = path.iter().map(|t| t.cost).collect();
        let values: Vec<f32> = path.iter().map(|t| t.value).collect();
        let cost_values: Vec<f32> = path.iter().map(|t| t.cost_value).collect();

        let reward = estimate_path(&rewards, &values, last_value, gamma, lambda);
        let cost = estimate_path(&costs, &cost_values, last_cost_value, gamma, lambda);

        lane.reward_advantages.extend(reward.advantages);
        lane.reward_targets.extend(reward.targets);
        lane.cost_advantages.extend(cost.advantages);
        lane.cost_targets.extend(cost.targets);
        lane.path_start = lane.transitions.len();
        Ok(())
    }

    /// Whether lane `env` has transitions not yet covered by `finish_path`.
    pub fn has_open_path(&self, env: usize) -> bool {
        self.lanes
            .get(env)
            .map(|l| l.path_start < l.transitions.len())
            .unwrap_or(false)
    }

    /// Drain all lanes into a batch and clear the buffer.
    ///
    /// Advantage statistics are pooled over all workers, so every worker
    /// must call this at the same point of the epoch.
    pub fn take_batch(&mut self, ctx: &DistributedContext) -> Result<RolloutBatch, BufferError> {
        if let Some(env) = (0..self.lanes.len()).find(|&e| self.has_open_path(e)) {
            return Err(BufferError::UnfinishedPath { env });
        }

        let n = self.len();
        let mut batch = RolloutBatch {
            observations: Vec::with_capacity(n * self.config.obs_dim),
            actions: Vec::with_capacity(n * self.config.action_dim),
            log_probs: Vec::with_capacity(n),
            reward_advantages: Vec::with_capacity(n),
            cost_advantages: Vec::with_capacity(n),
            reward_targets: Vec::with_capacity(n),
            cost_targets: Vec::with_capacity(n),
            obs_dim: self.config.obs_dim,
            action_dim: self.config.action_dim,
        };

        for lane in &mut self.lanes {
            for t in &lane.transitions {
                batch.observations.extend_from_slice(&t.observation);
                batch.actions.extend_from_slice(&t.action);
                batch.log_probs.push(t.log_prob);
            }
            batch.reward_advantages.append(&mut lane.reward_advantages);
            batch.cost_advantages.append(&mut lane.cost_advantages);
            batch.reward_targets.append(&mut lane.reward_targets);
            batch.cost_targets.append(&mut lane.cost_targets);
            lane.clear();
        }

        if self.config.standardize_advantages {
            let (mean, std) = ctx.mean_std(&batch.reward_advantages);
            standardize(&mut batch.reward_advantages, mean, std);
        }
        if self.config.center_cost_advantages {
            let (mean, _) = ctx.mean_std(&batch.cost_advantages);
            center(&mut batch.cost_advantages, mean);
        }

        Ok(batch)
    }

    fn lane_mut(&mut self, env: usize) -> Result<&mut Lane, BufferError> {
        let n_envs = self.lanes.len();
        self.lanes.get_mut(env).ok_or(BufferError::EnvOutOfRange { env, n_envs })
    }
}
