//! Saute wrapper over a vectorized CMDP.

use crate::environment::{BoxSpace, Cmdp, CmdpInfo, CmdpStep, EnvError};
use crate::runners::ConfigError;

use super::budget::{BudgetTracker, SauteConfig};

/// Folds the remaining safety budget into every transition.
///
/// One [`BudgetTracker`] per environment copy. Copies that finish (either
/// way) get their tracker reset, so the next episode starts from the full
/// budget. Final observations carry the budget the episode ended with.
pub struct SauteEnv<E: Cmdp> {
    inner: E,
    trackers: Vec<BudgetTracker>,
    observation_space: BoxSpace,
    raw_dim: usize,
}

impl<E: Cmdp> SauteEnv<E> {
    pub fn new(inner: E, config: &SauteConfig) -> Result<Self, ConfigError> {
        let prototype = BudgetTracker::from_config(config)?;
        let trackers = vec![prototype; inner.n_envs()];
        let raw_space = inner.observation_space();
        let observation_space = if config.augment_observation {
            raw_space.extended(f32::NEG_INFINITY, f32::INFINITY)
        } else {
            raw_space.clone()
        };
        Ok(Self {
            raw_dim: raw_space.dim(),
            inner,
            trackers,
            observation_space,
        })
    }

    pub fn trackers(&self) -> &[BudgetTracker] {
        &self.trackers
    }

    pub fn inner(&self) -> &E {
        &self.inner
    }

    fn augment_block(&self, raw: &[f32]) -> Vec<f32> {
        let mut out = Vec::with_capacity(self.trackers.len() * self.observation_space.dim());
        if self.raw_dim == 0 {
            for tracker in &self.trackers {
                tracker.augment_into(&[], &mut out);
            }
            return out;
        }
        for (row, tracker) in raw.chunks_exact(self.raw_dim).zip(&self.trackers) {
            tracker.augment_into(row, &mut out);
        }
        out
    }

    /// Augment real final-observation rows; other rows stay zero.
    fn augment_finals(&self, info: &CmdpInfo) -> Option<Vec<f32>> {
        let block = info.final_observation.as_ref()?;
        let dim = self.observation_space.dim();
        let mut out = vec![0.0f32; self.trackers.len() * dim];
        let mut row = Vec::with_capacity(dim);
        for (i, tracker) in self.trackers.iter().enumerate() {
            if !info.final_mask.get(i).copied().unwrap_or(false) {
                continue;
            }
            row.clear();
            tracker.augment_into(&block[i * self.raw_dim..(i + 1) * self.raw_dim], &mut row);
            out[i * dim..(i + 1) * dim].copy_from_slice(&row);
        }
        Some(out)
    }
}

impl<E: Cmdp> Cmdp for SauteEnv<E> {
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
        let (raw, mut info) = self.inner.reset(seed)?;
        for tracker in &mut self.trackers {
            tracker.reset();
        }
        info.remaining_budget = Some(self.trackers.iter().map(BudgetTracker::remaining).collect());
        Ok((self.augment_block(&raw), info))
    }

    fn step(&mut self, actions: &[f32]) -> Result<CmdpStep, EnvError> {
        let step = self.inner.step(actions)?;
        let n = step.n_envs();

        let mut shaped = Vec::with_capacity(n);
        let mut remaining = Vec::with_capacity(n);
        for (i, tracker) in self.trackers.iter_mut().enumerate() {
            remaining.push(tracker.step(step.costs[i]));
            shaped.push(tracker.shape_reward(step.rewards[i]));
        }

        let final_observation = self.augment_finals(&step.info);

        for (i, tracker) in self.trackers.iter_mut().enumerate() {
            if step.done(i) {
                tracker.reset();
            }
        }
        let observations = self.augment_block(&step.observations);

        let CmdpStep {
            rewards,
            costs,
            terminated,
            truncated,
            info,
            ..
        } = step;

        Ok(CmdpStep {
            observations,
            rewards: shaped,
            costs,
            terminated,
            truncated,
            info: CmdpInfo {
                final_observation,
                final_mask: info.final_mask,
                original_reward: Some(info.original_reward.unwrap_or(rewards)),
                original_cost: info.original_cost,
                remaining_budget: Some(remaining),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::testing::ScriptedEnv;
    use crate::environment::{CmdpAdapter, NativeOrTermination, SyncVectorEnv};
    use crate::saute::PenaltyShape;

    type TestEnv = SauteEnv<CmdpAdapter<SyncVectorEnv<ScriptedEnv>>>;

    fn saute(envs: Vec<ScriptedEnv>, config: &SauteConfig) -> TestEnv {
        let adapter = CmdpAdapter::new(SyncVectorEnv::new(envs).unwrap(), Box::new(NativeOrTermination)).unwrap();
        SauteEnv::new(adapter, config).unwrap()
    }

    fn undiscounted(budget: f32) -> SauteConfig {
        SauteConfig::new()
            .with_safety_budget(budget)
            .with_saute_gamma(1.0)
            .with_penalty(PenaltyShape::Constant, 1.0)
    }

    #[test]
    fn test_augmented_dimension_on_reset_and_step() {
        let mut env = saute(vec![ScriptedEnv::new(3, 1), ScriptedEnv::new(3, 1)], &undiscounted(5.0));
        assert_eq!(env.obs_dim(), 4);
        let (obs, info) = env.reset(Some(1)).unwrap();
        assert_eq!(obs.len(), 2 * 4);
        assert_eq!(obs[3], 1.0);
        assert_eq!(obs[7], 1.0);
        assert_eq!(info.remaining_budget, Some(vec![5.0, 5.0]));

        let step = env.step(&[0.0, 0.0]).unwrap();
        assert_eq!(step.observations.len(), 2 * 4);
    }

    #[test]
    fn test_budget_decays_and_reward_reshaped() {
        let mut env = saute(vec![ScriptedEnv::new(2, 1).with_native_cost(2.0)], &undiscounted(3.0));
        env.reset(None).unwrap();

        let first = env.step(&[0.0]).unwrap();
        assert_eq!(first.info.remaining_budget, Some(vec![1.0]));
        assert_eq!(first.rewards, vec![1.0]);
        assert!((first.observations[2] - 1.0 / 3.0).abs() < 1e-6);

        let second = env.step(&[0.0]).unwrap();
        assert_eq!(second.info.remaining_budget, Some(vec![-1.0]));
        assert_eq!(second.rewards, vec![-1.0]);
        assert_eq!(second.info.original_reward, Some(vec![1.0]));
    }

    #[test]
    fn test_truncation_resets_budget_without_carry_over() {
        let mut env = saute(
            vec![ScriptedEnv::new(2, 1).with_native_cost(1.0).with_horizon(2)],
            &undiscounted(4.0),
        );
        env.reset(None).unwrap();
        env.step(&[0.0]).unwrap();
        let end = env.step(&[0.0]).unwrap();
        assert!(end.truncated[0]);
        // Episode ended with 2.0 left; final obs carries 0.5, next obs starts fresh.
        assert_eq!(end.info.remaining_budget, Some(vec![2.0]));
        let finals = end.info.final_observation.unwrap();
        assert_eq!(finals[2], 0.5);
        assert_eq!(end.observations[2], 1.0);
        assert_eq!(env.trackers()[0].remaining(), 4.0);
    }

    #[test]
    fn test_final_rows_zero_for_unfinished_copies() {
        let mut env = saute(
            vec![
                ScriptedEnv::new(1, 1).with_horizon(1),
                ScriptedEnv::new(1, 1).with_horizon(9),
            ],
            &undiscounted(4.0),
        );
        env.reset(None).unwrap();
        let step = env.step(&[0.0, 0.0]).unwrap();
        let finals = step.info.final_observation.unwrap();
        assert_eq!(finals.len(), 4);
        assert_eq!(&finals[2..4], &[0.0, 0.0]);
        assert_eq!(finals[1], 1.0);
    }

    #[test]
    fn test_invalid_gamma_fails_construction() {
        let adapter = CmdpAdapter::new(
            SyncVectorEnv::new(vec![ScriptedEnv::new(1, 1)]).unwrap(),
            Box::new(NativeOrTermination),
        )
        .unwrap();
        let config = SauteConfig::new().with_saute_gamma(0.0);
        assert!(SauteEnv::new(adapter, &config).is_err());
    }
}
