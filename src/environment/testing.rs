//! Deterministic scripted environment for unit tests.

use super::raw::{RawEnv, RawInfo, RawStep};
use super::{BoxSpace, EnvError, Space};

/// Observation is `[t, 1.0, 1.0, ...]` where `t` counts steps since reset.
#[derive(Debug, Clone)]
pub struct ScriptedEnv {
    obs_space: Space,
    act_space: Space,
    obs_dim: usize,
    horizon: usize,
    terminate_at: Option<usize>,
    native_cost: Option<f32>,
    reward: f32,
    fail_after: Option<usize>,
    steps_taken: usize,
    t: usize,
    last_seed: Option<u64>,
    last_action: Option<Vec<f32>>,
}

impl ScriptedEnv {
    pub fn new(obs_dim: usize, act_dim: usize) -> Self {
        Self {
            obs_space: Space::Box(BoxSpace::unbounded(obs_dim)),
            act_space: Space::Box(BoxSpace::uniform(act_dim, -1.0, 1.0).unwrap()),
            obs_dim,
            horizon: 1000,
            terminate_at: None,
            native_cost: None,
            reward: 1.0,
            fail_after: None,
            steps_taken: 0,
            t: 0,
            last_seed: None,
            last_action: None,
        }
    }

    pub fn with_horizon(mut self, horizon: usize) -> Self {
        self.horizon = horizon;
        self
    }

    pub fn with_terminate_at(mut self, t: usize) -> Self {
        self.terminate_at = Some(t);
        self
    }

    pub fn with_native_cost(mut self, cost: f32) -> Self {
        self.native_cost = Some(cost);
        self
    }

    pub fn with_reward(mut self, reward: f32) -> Self {
        self.reward = reward;
        self
    }

    /// Report a backend error on the step after `steps` total steps.
    pub fn with_fail_after(mut self, steps: usize) -> Self {
        self.fail_after = Some(steps);
        self
    }

    pub fn with_action_space(mut self, space: Space) -> Self {
        self.act_space = space;
        self
    }

    pub fn with_observation_space(mut self, space: Space) -> Self {
        self.obs_space = space;
        self
    }

    pub fn last_seed(&self) -> Option<u64> {
        self.last_seed
    }

    pub fn last_action(&self) -> Option<&[f32]> {
        self.last_action.as_deref()
    }

    fn observation(&self) -> Vec<f32> {
        let mut obs = vec![1.0; self.obs_dim];
        if let Some(first) = obs.first_mut() {
            *first = self.t as f32;
        }
        obs
    }
}

impl RawEnv for ScriptedEnv {
    fn observation_space(&self) -> &Space {
        &self.obs_space
    }

    fn action_space(&self) -> &Space {
        &self.act_space
    }

    fn reset(&mut self, seed: Option<u64>) -> Result<(Vec<f32>, RawInfo), EnvError> {
        self.t = 0;
        self.last_seed = seed;
        Ok((self.observation(), RawInfo::default()))
    }

    fn step(&mut self, action: &[f32]) -> Result<RawStep, EnvError> {
        if self.fail_after == Some(self.steps_taken) {
            return Err(EnvError::Backend("scripted failure".to_string()));
        }
        self.steps_taken += 1;
        self.last_action = Some(action.to_vec());
        self.t += 1;
        let terminated = self.terminate_at == Some(self.t);
        let truncated = !terminated && self.t >= self.horizon;
        Ok(RawStep {
            observation: self.observation(),
            reward: self.reward,
            terminated,
            truncated,
            info: RawInfo {
                cost: self.native_cost,
            },
        })
    }
}
