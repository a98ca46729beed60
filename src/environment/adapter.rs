//! CMDP interface and the adapter from raw vector environments.
//!
//! Every wrapper in the pipeline (observation normalization, Saute budget
//! augmentation) implements [`Cmdp`] over an inner [`Cmdp`], so the
//! optimizer only ever sees one flat interface:
//!
//! ```text
//! RawVectorEnv -> CmdpAdapter -> ObsNormalize -> SauteEnv -> rollout
//! ```

use rand::RngCore;

use super::cost::{CostContext, CostSource};
use super::raw::RawVectorEnv;
use super::{BoxSpace, EnvError, Space};
use crate::runners::ConfigError;

/// Per-step side information of a CMDP.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CmdpInfo {
    /// Dense `[n_envs * obs_dim]` block present when any copy auto-reset.
    /// Rows of copies that did not finish are zero.
    pub final_observation: Option<Vec<f32>>,
    /// Which rows of `final_observation` are real final observations.
    pub final_mask: Vec<bool>,
    /// Reward before Saute reshaping or reward scaling.
    pub original_reward: Option<Vec<f32>>,
    /// Cost before cost scaling.
    pub original_cost: Option<Vec<f32>>,
    /// Remaining budget after this step, before any episode reset.
    pub remaining_budget: Option<Vec<f32>>,
}

impl CmdpInfo {
    /// Final observation of copy `index`, if it finished this step.
    pub fn final_observation_row(&self, index: usize, obs_dim: usize) -> Option<&[f32]> {
        let block = self.final_observation.as_ref()?;
        if !self.final_mask.get(index).copied().unwrap_or(false) {
            return None;
        }
        block.get(index * obs_dim..(index + 1) * obs_dim)
    }
}

/// One vectorized CMDP step.
#[derive(Debug, Clone, PartialEq)]
pub struct CmdpStep {
    /// `[n_envs * obs_dim]`
    pub observations: Vec<f32>,
    pub rewards: Vec<f32>,
    pub costs: Vec<f32>,
    pub terminated: Vec<bool>,
    pub truncated: Vec<bool>,
    pub info: CmdpInfo,
}

impl CmdpStep {
    pub fn n_envs(&self) -> usize {
        self.rewards.len()
    }

    pub fn done(&self, index: usize) -> bool {
        self.terminated[index] || self.truncated[index]
    }
}

/// Vectorized constrained MDP with box spaces.
pub trait Cmdp: Send {
    fn n_envs(&self) -> usize;

    /// Single-copy observation space as seen by the policy.
    fn observation_space(&self) -> &BoxSpace;

    fn action_space(&self) -> &BoxSpace;

    fn reset(&mut self, seed: Option<u64>) -> Result<(Vec<f32>, CmdpInfo), EnvError>;

    fn step(&mut self, actions: &[f32]) -> Result<CmdpStep, EnvError>;

    fn obs_dim(&self) -> usize {
        self.observation_space().dim()
    }

    fn action_dim(&self) -> usize {
        self.action_space().dim()
    }

    /// Uniform random actions `[n_envs * action_dim]` from the action space.
    fn sample_actions(&self, rng: &mut dyn RngCore) -> Vec<f32> {
        let space = self.action_space();
        (0..self.n_envs()).flat_map(|_| space.sample(&mut *rng)).collect()
    }
}

impl<C: Cmdp + ?Sized> Cmdp for Box<C> {
    fn n_envs(&self) -> usize {
        (**self).n_envs()
    }

    fn observation_space(&self) -> &BoxSpace {
        (**self).observation_space()
    }

    fn action_space(&self) -> &BoxSpace {
        (**self).action_space()
    }

    fn reset(&mut self, seed: Option<u64>) -> Result<(Vec<f32>, CmdpInfo), EnvError> {
        (**self).reset(seed)
    }

    fn step(&mut self, actions: &[f32]) -> Result<CmdpStep, EnvError> {
        (**self).step(actions)
    }
}

fn require_box(space: &Space, role: &'static str) -> Result<BoxSpace, ConfigError> {
    space.as_box().cloned().ok_or_else(|| ConfigError::UnsupportedSpace {
        role,
        space: space.to_string(),
    })
}

/// Turns a raw vector environment into a [`Cmdp`].
///
/// - actions are clipped into the declared bounds before stepping
/// - cost comes from the configured [`CostSource`]
/// - `final_observation` is densified with zero rows
pub struct CmdpAdapter<V: RawVectorEnv> {
    env: V,
    cost_source: Box<dyn CostSource>,
    observation_space: BoxSpace,
    action_space: BoxSpace,
    clipped: Vec<f32>,
}

impl<V: RawVectorEnv> CmdpAdapter<V> {
    /// Fails when either declared space is not a box.
    pub fn new(env: V, cost_source: Box<dyn CostSource>) -> Result<Self, ConfigError> {
        let observation_space = require_box(env.single_observation_space(), "observation")?;
        let action_space = require_box(env.single_action_space(), "action")?;
        Ok(Self {
            env,
            cost_source,
            observation_space,
            action_space,
            clipped: Vec::new(),
        })
    }

    pub fn inner(&self) -> &V {
        &self.env
    }

    pub fn cost_source(&self) -> &dyn CostSource {
        self.cost_source.as_ref()
    }
}

impl<V: RawVectorEnv> Cmdp for CmdpAdapter<V> {
    fn n_envs(&self) -> usize {
        self.env.n_envs()
    }

    fn observation_space(&self) -> &BoxSpace {
        &self.observation_space
    }

    fn action_space(&self) -> &BoxSpace {
        &self.action_space
    }

    fn reset(&mut self, seed: Option<u64>) -> Result<(Vec<f32>, CmdpInfo), EnvError> {
        let (obs, _) = self.env.reset(seed)?;
        Ok((obs, CmdpInfo::default()))
    }

    fn step(&mut self, actions: &[f32]) -> Result<CmdpStep, EnvError> {
        let n = self.env.n_envs();
        let act_dim = self.action_space.dim();
        let obs_dim = self.observation_space.dim();
        if actions.len() != n * act_dim {
            return Err(EnvError::ActionDimensionMismatch {
                expected: n * act_dim,
                got: actions.len(),
            });
        }

        self.clipped.clear();
        self.clipped.extend_from_slice(actions);
        if act_dim > 0 {
            for row in self.clipped.chunks_exact_mut(act_dim) {
                self.action_space.clip(row);
            }
        }

        let raw = self.env.step(&self.clipped)?;

        let mut final_mask = vec![false; n];
        let final_observation = raw.info.final_observation.as_ref().map(|finals| {
            let mut dense = vec![0.0f32; n * obs_dim];
            for (i, row) in finals.iter().enumerate().take(n) {
                if let Some(obs) = row {
                    if obs.len() == obs_dim {
                        dense[i * obs_dim..(i + 1) * obs_dim].copy_from_slice(obs);
                        final_mask[i] = true;
                    }
                }
            }
            dense
        });

        let costs = (0..n)
            .map(|i| {
                let observation = match &final_observation {
                    Some(block) if final_mask[i] => &block[i * obs_dim..(i + 1) * obs_dim],
                    _ => &raw.observations[i * obs_dim..(i + 1) * obs_dim],
                };
                self.cost_source.cost(&CostContext {
                    native: raw.info.costs.as_ref().and_then(|c| c.get(i).copied()),
                    reward: raw.rewards[i],
                    terminated: raw.terminated[i],
                    truncated: raw.truncated[i],
                    observation,
                })
            })
            .collect();

        Ok(CmdpStep {
            observations: raw.observations,
            rewards: raw.rewards,
            costs,
            terminated: raw.terminated,
            truncated: raw.truncated,
            info: CmdpInfo {
                final_observation,
                final_mask,
                original_reward: None,
                original_cost: None,
                remaining_budget: None,
            },
        })
    }
}
