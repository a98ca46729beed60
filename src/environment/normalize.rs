//! Running observation normalization and reward/cost scaling.

use super::adapter::{Cmdp, CmdpInfo, CmdpStep};
use super::{BoxSpace, EnvError};
use crate::core::RunningMeanStd;

/// Normalizes raw observations with running statistics and clips them.
///
/// Sits below the Saute wrapper, so the budget dimension is never
/// normalized. Final observations use the same statistics but do not update
/// them.
pub struct ObsNormalize<E: Cmdp> {
    inner: E,
    stats: RunningMeanStd,
    clip: f32,
    update: bool,
    observation_space: BoxSpace,
}

impl<E: Cmdp> ObsNormalize<E> {
    pub fn new(inner: E, clip: f32) -> Self {
        let dim = inner.obs_dim();
        let clip = clip.abs();
        Self {
            stats: RunningMeanStd::new(dim),
            observation_space: BoxSpace::uniform(dim, -clip, clip).unwrap_or_else(|| BoxSpace::unbounded(dim)),
            inner,
            clip,
            update: true,
        }
    }

    /// Stop (or resume) updating the statistics, e.g. for evaluation.
    pub fn set_update(&mut self, update: bool) {
        self.update = update;
    }

    pub fn stats(&self) -> &RunningMeanStd {
        &self.stats
    }

    pub fn inner(&self) -> &E {
        &self.inner
    }

    fn normalize_block(&self, block: &mut [f32]) {
        let dim = self.stats.dim();
        if dim == 0 {
            return;
        }
        for row in block.chunks_exact_mut(dim) {
            self.stats.normalize_clip_inplace(row, self.clip);
        }
    }

    fn normalize_finals(&self, info: &mut CmdpInfo) {
        let dim = self.stats.dim();
        if let Some(block) = info.final_observation.as_mut() {
            for (i, &real) in info.final_mask.iter().enumerate() {
                if real {
                    self.stats.normalize_clip_inplace(&mut block[i * dim..(i + 1) * dim], self.clip);
                }
            }
        }
    }
}

impl<E: Cmdp> Cmdp for ObsNormalize<E> {
    fn n_envs(&self) -> usize {
        self.inner.n_envs()
    }

    fn observation_space(&self) -> &BoxSpace {
        &self.observation_space
    }

    fn action_space(&self) -> &BoxSpace {
        self.inner.action_space()
    }

    fn reset(&mut self, seed: Option<u64>) -> Result<(Vec<f32>, CmdpInfo), EnvError> {
        let (mut obs, info) = self.inner.reset(seed)?;
        if self.update {
            self.stats.update_batch(&obs);
        }
        self.normalize_block(&mut obs);
        Ok((obs, info))
    }

    fn step(&mut self, actions: &[f32]) -> Result<CmdpStep, EnvError> {
        let mut step = self.inner.step(actions)?;
        if self.update {
            self.stats.update_batch(&step.observations);
        }
        self.normalize_block(&mut step.observations);
        self.normalize_finals(&mut step.info);
        Ok(step)
    }
}

/// Scales one scalar signal by the running std of its discounted return.
#[derive(Debug, Clone)]
struct ReturnScaler {
    stats: RunningMeanStd,
    returns: Vec<f64>,
    gamma: f64,
}

impl ReturnScaler {
    fn new(n_envs: usize, gamma: f32) -> Self {
        Self {
            stats: RunningMeanStd::new(1),
            returns: vec![0.0; n_envs],
            gamma: gamma as f64,
        }
    }

    fn apply(&mut self, signals: &mut [f32], dones: &[bool], clip: f32, update: bool) {
        for (i, x) in signals.iter_mut().enumerate() {
            self.returns[i] = self.returns[i] * self.gamma + *x as f64;
            if update {
                self.stats.update(&[self.returns[i] as f32]);
            }
            if dones[i] {
                self.returns[i] = 0.0;
            }
            self.stats.scale_clip_inplace(std::slice::from_mut(x), clip);
        }
    }
}

/// Divides rewards and/or costs by the running std of their discounted
/// returns. The unscaled values are kept in `original_reward` /
/// `original_cost` for episode statistics.
pub struct SignalNormalize<E: Cmdp> {
    inner: E,
    reward: Option<ReturnScaler>,
    cost: Option<ReturnScaler>,
    clip: f32,
    update: bool,
}

impl<E: Cmdp> SignalNormalize<E> {
    pub fn new(inner: E, normalize_reward: bool, normalize_cost: bool, gamma: f32, clip: f32) -> Self {
        let n = inner.n_envs();
        Self {
            reward: normalize_reward.then(|| ReturnScaler::new(n, gamma)),
            cost: normalize_cost.then(|| ReturnScaler::new(n, gamma)),
            inner,
            clip: clip.abs(),
            update: true,
        }
    }

    pub fn set_update(&mut self, update: bool) {
        self.update = update;
    }

    pub fn inner(&self) -> &E {
        &self.inner
    }
}

impl<E: Cmdp> Cmdp for SignalNormalize<E> {
    fn n_envs(&self) -> usize {
        self.inner.n_envs()
    }

    fn observation_space(&self) -> &BoxSpace {
        self.inner.observation_space()
    }

    fn action_space(&self) -> &BoxSpace {
        self.inner.action_space()
    }

    fn reset(&mut self, seed: Option<u64>) -> Result<(Vec<f32>, CmdpInfo), EnvError> {
        for scaler in [self.reward.as_mut(), self.cost.as_mut()].into_iter().flatten() {
            scaler.returns.iter_mut().for_each(|r| *r = 0.0);
        }
        self.inner.reset(seed)
    }

    fn step(&mut self, actions: &[f32]) -> Result<CmdpStep, EnvError> {
        let mut step = self.inner.step(actions)?;
        let dones: Vec<bool> = (0..step.n_envs()).map(|i| step.done(i)).collect();
        if let Some(scaler) = self.reward.as_mut() {
            if step.info.original_reward.is_none() {
                step.info.original_reward = Some(step.rewards.clone());
            }
            scaler.apply(&mut step.rewards, &dones, self.clip, self.update);
        }
        if let Some(scaler) = self.cost.as_mut() {
            if step.info.original_cost.is_none() {
                step.info.original_cost = Some(step.costs.clone());
            }
            scaler.apply(&mut step.costs, &dones, self.clip, self.update);
        }
        Ok(step)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::cost::NativeOrTermination;
    use crate::environment::testing::ScriptedEnv;
    use crate::environment::{CmdpAdapter, SyncVectorEnv};

    fn normalized(envs: Vec<ScriptedEnv>) -> ObsNormalize<CmdpAdapter<SyncVectorEnv<ScriptedEnv>>> {
        let adapter = CmdpAdapter::new(SyncVectorEnv::new(envs).unwrap(), Box::new(NativeOrTermination)).unwrap();
        ObsNormalize::new(adapter, 5.0)
    }

    #[test]
    fn test_values_clipped() {
        let mut env = normalized(vec![ScriptedEnv::new(2, 1)]);
        let (obs, _) = env.reset(None).unwrap();
        for x in obs {
            assert!(x.abs() <= 5.0);
        }
        for _ in 0..20 {
            let step = env.step(&[0.0]).unwrap();
            assert!(step.observations.iter().all(|x| x.abs() <= 5.0));
        }
        assert_eq!(env.stats().count(), 21.0);
    }

    #[test]
    fn test_frozen_stats_do_not_update() {
        let mut env = normalized(vec![ScriptedEnv::new(2, 1)]);
        env.set_update(false);
        env.reset(None).unwrap();
        env.step(&[0.0]).unwrap();
        assert_eq!(env.stats().count(), 0.0);
    }

    #[test]
    fn test_final_observation_normalized_only_on_real_rows() {
        let mut env = normalized(vec![
            ScriptedEnv::new(2, 1).with_horizon(3),
            ScriptedEnv::new(2, 1).with_horizon(10),
        ]);
        env.reset(None).unwrap();
        env.step(&[0.0, 0.0]).unwrap();
        env.step(&[0.0, 0.0]).unwrap();
        let step = env.step(&[0.0, 0.0]).unwrap();
        let block = step.info.final_observation.unwrap();
        assert_eq!(&block[2..4], &[0.0, 0.0]);
        assert!(block[0].abs() <= 5.0);
    }

    fn scaled(reward: bool, cost: bool) -> SignalNormalize<CmdpAdapter<SyncVectorEnv<ScriptedEnv>>> {
        let env = ScriptedEnv::new(2, 1).with_reward(4.0).with_native_cost(2.0);
        let adapter = CmdpAdapter::new(SyncVectorEnv::new(vec![env]).unwrap(), Box::new(NativeOrTermination)).unwrap();
        SignalNormalize::new(adapter, reward, cost, 0.99, 10.0)
    }

    #[test]
    fn test_reward_scaled_and_original_kept() {
        let mut env = scaled(true, false);
        env.reset(None).unwrap();
        let mut last = None;
        for _ in 0..10 {
            last = Some(env.step(&[0.0]).unwrap());
        }
        let step = last.unwrap();
        assert_eq!(step.info.original_reward, Some(vec![4.0]));
        assert_ne!(step.rewards[0], 4.0);
        assert!(step.rewards[0].is_finite() && step.rewards[0] <= 10.0);
        // cost untouched
        assert_eq!(step.costs, vec![2.0]);
        assert_eq!(step.info.original_cost, None);
    }

    #[test]
    fn test_cost_scaled() {
        let mut env = scaled(false, true);
        env.reset(None).unwrap();
        env.step(&[0.0]).unwrap();
        let step = env.step(&[0.0]).unwrap();
        assert_eq!(step.info.original_cost, Some(vec![2.0]));
        assert_eq!(step.rewards, vec![4.0]);
        assert!(step.costs[0] > 0.0);
    }
}
