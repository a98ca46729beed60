//! Property tests for the budget recursion and the Saute wrapper.

use proptest::prelude::*;

use super::{BudgetTracker, PenaltyShape, SauteConfig, SauteEnv};
use crate::environment::testing::ScriptedEnv;
use crate::environment::{Cmdp, CmdpAdapter, NativeOrTermination, SyncVectorEnv};

fn budget() -> impl Strategy<Value = f32> {
    0.1f32..100.0
}

fn gamma() -> impl Strategy<Value = f32> {
    0.5f32..=1.0
}

fn cost() -> impl Strategy<Value = f32> {
    0.0f32..5.0
}

fn shape() -> impl Strategy<Value = PenaltyShape> {
    prop_oneof![Just(PenaltyShape::Proportional), Just(PenaltyShape::Constant)]
}

proptest! {
    /// Property: every step applies remaining = (before - c) / γ exactly.
    #[test]
    fn test_budget_recursion(
        initial in budget(),
        g in gamma(),
        costs in prop::collection::vec(cost(), 1..40),
    ) {
        let mut tracker = BudgetTracker::new(initial, g, PenaltyShape::Constant, 1.0).unwrap();
        for c in costs {
            let before = tracker.remaining();
            let after = tracker.step(c);
            prop_assert_eq!(after, (before - c) / g);
        }
        tracker.reset();
        prop_assert_eq!(tracker.remaining(), initial);
    }

    /// Property: reshaped reward is the raw reward iff the budget is not negative,
    /// otherwise it does not depend on the raw reward.
    #[test]
    fn test_reshaping_by_sign(
        initial in budget(),
        g in gamma(),
        costs in prop::collection::vec(cost(), 1..40),
        reward in -10.0f32..10.0,
        other_reward in -10.0f32..10.0,
        shape in shape(),
        scale in 0.01f32..20.0,
    ) {
        let mut tracker = BudgetTracker::new(initial, g, shape, scale).unwrap();
        for c in costs {
            tracker.step(c);
            if tracker.remaining() >= 0.0 {
                prop_assert_eq!(tracker.shape_reward(reward), reward);
            } else {
                let penalty = tracker.shape_reward(reward);
                prop_assert_eq!(penalty, tracker.shape_reward(other_reward));
                prop_assert!(penalty <= 0.0);
            }
        }
    }

    /// Property: the augmented observation is always raw + 1 wide.
    #[test]
    fn test_augmented_dimensionality(
        obs_dim in 1usize..6,
        n_envs in 1usize..4,
        horizon in 1usize..5,
        native_cost in cost(),
        steps in 1usize..12,
    ) {
        let envs: Vec<_> = (0..n_envs)
            .map(|_| ScriptedEnv::new(obs_dim, 1).with_horizon(horizon).with_native_cost(native_cost))
            .collect();
        let adapter = CmdpAdapter::new(SyncVectorEnv::new(envs).unwrap(), Box::new(NativeOrTermination)).unwrap();
        let mut env = SauteEnv::new(adapter, &SauteConfig::new().with_max_ep_len(horizon)).unwrap();

        let (obs, _) = env.reset(Some(0)).unwrap();
        prop_assert_eq!(obs.len(), n_envs * (obs_dim + 1));
        for _ in 0..steps {
            let step = env.step(&vec![0.0; n_envs]).unwrap();
            prop_assert_eq!(step.observations.len(), n_envs * (obs_dim + 1));
            if let Some(finals) = &step.info.final_observation {
                prop_assert_eq!(finals.len(), n_envs * (obs_dim + 1));
            }
        }
    }
}

#[test]
fn test_scenario_sign_flip_through_wrapper() {
    // Initial budget 25.0, γ = 0.99, cost 3.0 per step over 10 steps.
    // A one-step horizon makes the derived initial budget equal the safety budget.
    let config = SauteConfig::new()
        .with_safety_budget(25.0)
        .with_saute_gamma(0.99)
        .with_max_ep_len(1)
        .with_penalty(PenaltyShape::Constant, 1.0);
    let raw = ScriptedEnv::new(2, 1).with_native_cost(3.0).with_reward(0.5);
    let adapter = CmdpAdapter::new(SyncVectorEnv::new(vec![raw]).unwrap(), Box::new(NativeOrTermination)).unwrap();
    let mut env = SauteEnv::new(adapter, &config).unwrap();
    assert!((env.trackers()[0].initial() - 25.0).abs() < 1e-4);

    env.reset(None).unwrap();
    for step in 1..=10 {
        let out = env.step(&[0.0]).unwrap();
        let remaining = out.info.remaining_budget.unwrap()[0];
        if step < 9 {
            assert!(remaining >= 0.0, "step {}: {}", step, remaining);
            assert_eq!(out.rewards, vec![0.5]);
        } else {
            assert!(remaining < 0.0, "step {}: {}", step, remaining);
            assert_eq!(out.rewards, vec![-1.0]);
        }
        assert_eq!(out.info.original_reward, Some(vec![0.5]));
    }
}
