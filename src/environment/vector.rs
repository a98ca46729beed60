//! Sequential vector environment with auto-reset.

use super::raw::{RawEnv, RawStep, RawVectorEnv, RawVectorStep, VectorInfo};
use super::{EnvError, Space};

fn flat_dim(space: &Space) -> usize {
    match space {
        Space::Box(b) => b.dim(),
        Space::Discrete { .. } => 1,
    }
}

/// Steps `N` copies of a raw environment one after another.
///
/// A copy that finishes (terminated or truncated) is reset immediately; the
/// observation it finished on is reported in
/// [`VectorInfo::final_observation`] and the returned observation row is the
/// first observation of the next episode. Reset seeds are `seed + index`.
pub struct SyncVectorEnv<E: RawEnv> {
    envs: Vec<E>,
    obs_space: Space,
    act_space: Space,
    obs_dim: usize,
    act_dim: usize,
}

impl<E: RawEnv> SyncVectorEnv<E> {
    pub fn new(envs: Vec<E>) -> Result<Self, EnvError> {
        let first = envs.first().ok_or(EnvError::NoEnvironments)?;
        let obs_space = first.observation_space().clone();
        let act_space = first.action_space().clone();

        for (index, env) in envs.iter().enumerate().skip(1) {
            if env.observation_space() != &obs_space || env.action_space() != &act_space {
                return Err(EnvError::InconsistentSpaces { index });
            }
        }

        Ok(Self {
            obs_dim: flat_dim(&obs_space),
            act_dim: flat_dim(&act_space),
            envs,
            obs_space,
            act_space,
        })
    }

    pub fn envs(&self) -> &[E] {
        &self.envs
    }

    fn check_obs(&self, obs: &[f32]) -> Result<(), EnvError> {
        if obs.len() != self.obs_dim {
            return Err(EnvError::ObservationDimensionMismatch {
                expected: self.obs_dim,
                got: obs.len(),
            });
        }
        Ok(())
    }
}

impl<E: RawEnv> RawVectorEnv for SyncVectorEnv<E> {
    fn n_envs(&self) -> usize {
        self.envs.len()
    }

    fn single_observation_space(&self) -> &Space {
        &self.obs_space
    }

    fn single_action_space(&self) -> &Space {
        &self.act_space
    }

    fn reset(&mut self, seed: Option<u64>) -> Result<(Vec<f32>, VectorInfo), EnvError> {
        let mut observations = Vec::with_capacity(self.envs.len() * self.obs_dim);
        let mut costs = Vec::with_capacity(self.envs.len());

        for i in 0..self.envs.len() {
            let (obs, info) = self.envs[i].reset(seed.map(|s| s.wrapping_add(i as u64)))?;
            self.check_obs(&obs)?;
            observations.extend_from_slice(&obs);
            costs.push(info.cost);
        }

        let info = VectorInfo {
            costs: costs.into_iter().collect(),
            final_observation: None,
        };
        Ok((observations, info))
    }

    fn step(&mut self, actions: &[f32]) -> Result<RawVectorStep, EnvError> {
        let n = self.envs.len();
        if actions.len() != n * self.act_dim {
            return Err(EnvError::ActionDimensionMismatch {
                expected: n * self.act_dim,
                got: actions.len(),
            });
        }

        let mut observations = Vec::with_capacity(n * self.obs_dim);
        let mut rewards = Vec::with_capacity(n);
        let mut terminated = Vec::with_capacity(n);
        let mut truncated = Vec::with_capacity(n);
        let mut costs = Vec::with_capacity(n);
        let mut final_observation = vec![None; n];
        let mut any_final = false;

        for i in 0..n {
            let action = &actions[i * self.act_dim..(i + 1) * self.act_dim];
            let RawStep {
                observation,
                reward,
                terminated: term,
                truncated: trunc,
                info,
            } = self.envs[i].step(action)?;
            self.check_obs(&observation)?;

            if term || trunc {
                let (next_obs, _) = self.envs[i].reset(None)?;
                self.check_obs(&next_obs)?;
                observations.extend_from_slice(&next_obs);
                final_observation[i] = Some(observation);
                any_final = true;
            } else {
                observations.extend_from_slice(&observation);
            }

            rewards.push(reward);
            terminated.push(term);
            truncated.push(trunc);
            costs.push(info.cost);
        }

        Ok(RawVectorStep {
            observations,
            rewards,
            terminated,
            truncated,
            info: VectorInfo {
                costs: costs.into_iter().collect(),
                final_observation: any_final.then_some(final_observation),
            },
        })
    }
}
