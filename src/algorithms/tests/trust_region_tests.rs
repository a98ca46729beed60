//! Tests for the trust-region policy step.

use burn::backend::{Autodiff, NdArray};
use burn::module::AutodiffModule;
use burn::prelude::*;

use crate::algorithms::policy::GaussianPolicy;
use crate::algorithms::trust_region::{
    PolicyBatch, RejectReason, TrustRegionConfig, TrustRegionOptimizer, UpdateOutcome,
};
use crate::core::{flatten_params, DistributedContext};
use crate::nn::{GaussianActor, GaussianActorConfig};

type B = Autodiff<NdArray<f32>>;

const N: usize = 32;

fn actor() -> GaussianActor<B> {
    GaussianActorConfig::new(2, 1)
        .with_hidden_sizes(vec![8])
        .init(&Default::default())
}

fn observations() -> Vec<f32> {
    (0..N)
        .flat_map(|i| {
            let x = i as f32 / N as f32;
            [x - 0.5, (x * 6.0).sin()]
        })
        .collect()
}

fn actions() -> Vec<f32> {
    (0..N).map(|i| if i % 2 == 0 { 0.5 } else { -0.5 }).collect()
}

/// Batch whose behaviour log-probs come from `policy` itself.
fn batch(policy: &GaussianActor<B>, advantages: Vec<f32>, cost_advantages: Option<Vec<f32>>) -> PolicyBatch<B> {
    let device = Default::default();
    let observations = Tensor::<B, 2>::from_data(TensorData::new(observations(), [N, 2]), &device);
    let actions = Tensor::<B, 2>::from_data(TensorData::new(actions(), [N, 1]), &device);
    let log_probs = policy
        .distribution(observations.clone())
        .log_prob(actions.clone())
        .detach();
    PolicyBatch {
        observations,
        actions,
        log_probs,
        advantages: Tensor::from_data(TensorData::new(advantages, [N]), &device),
        cost_advantages: cost_advantages.map(|c| Tensor::from_data(TensorData::new(c, [N]), &device)),
    }
}

/// Advantages favouring the positive action.
fn informative_advantages() -> Vec<f32> {
    actions().iter().map(|a| a * 2.0).collect()
}

#[test]
fn test_accepted_step_respects_kl_bound() {
    let policy = actor();
    let batch = batch(&policy, informative_advantages(), None);
    let mut optimizer = TrustRegionOptimizer::new(TrustRegionConfig::new()).unwrap();
    let ctx = DistributedContext::single();

    let before = flatten_params(&policy);
    let (updated, stats) = optimizer.step(policy, &batch, &ctx);

    assert!(stats.outcome.is_accepted(), "outcome {:?}", stats.outcome);
    assert!(stats.kl <= optimizer.config().target_kl);
    assert!(stats.kl >= 0.0);
    assert!(stats.loss_after <= stats.loss_before);
    assert!(stats.final_step_norm > 0.0);
    assert_ne!(flatten_params(&updated), before);
    assert_eq!(optimizer.line_search_failures(), 0);
}

#[test]
fn test_accepted_step_moves_network_weights() {
    let policy = actor();
    let batch = batch(&policy, informative_advantages(), None);
    let mut optimizer = TrustRegionOptimizer::new(TrustRegionConfig::new()).unwrap();

    let before = flatten_params(&policy);
    let (updated, stats) = optimizer.step(policy, &batch, &DistributedContext::single());
    assert!(stats.outcome.is_accepted());

    // Everything but the trailing log_std belongs to the trunk and mean head.
    let after = flatten_params(&updated);
    let last = before.len() - 1;
    let moved = before[..last]
        .iter()
        .zip(&after[..last])
        .filter(|(a, b)| a != b)
        .count();
    assert!(moved > last / 2, "only {} of {} network weights moved", moved, last);
}

#[test]
fn test_surrogate_gradient_reaches_mean_head() {
    let policy = actor();
    let batch = batch(&policy, informative_advantages(), None);
    let mut optimizer = TrustRegionOptimizer::new(TrustRegionConfig::new()).unwrap();
    let (_, stats) = optimizer.step(policy, &batch, &DistributedContext::single());
    // A gradient through log_std alone sits orders of magnitude lower.
    assert!(stats.xhx > 1e-4, "xHx = {}", stats.xhx);
}

#[test]
fn test_empty_shard_joins_without_poisoning() {
    let policy = actor();
    let single = {
        let batch = batch(&policy, informative_advantages(), None);
        let mut optimizer = TrustRegionOptimizer::new(TrustRegionConfig::new()).unwrap();
        let (updated, stats) = optimizer.step(policy.clone(), &batch, &DistributedContext::single());
        (flatten_params(&updated), stats)
    };

    let contexts = DistributedContext::threaded(2);
    let results: Vec<_> = std::thread::scope(|scope| {
        let handles: Vec<_> = contexts
            .into_iter()
            .map(|ctx| {
                let policy = policy.clone();
                scope.spawn(move || {
                    let batch = if ctx.rank() == 0 {
                        batch(&policy, informative_advantages(), None)
                    } else {
                        let device = Default::default();
                        PolicyBatch::<B> {
                            observations: Tensor::zeros([0, 2], &device),
                            actions: Tensor::zeros([0, 1], &device),
                            log_probs: Tensor::zeros([0], &device),
                            advantages: Tensor::zeros([0], &device),
                            cost_advantages: None,
                        }
                    };
                    let mut optimizer = TrustRegionOptimizer::new(TrustRegionConfig::new()).unwrap();
                    let (updated, stats) = optimizer.step(policy, &batch, &ctx);
                    (flatten_params(&updated), stats)
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    for (params, stats) in &results {
        assert!(stats.outcome.is_accepted(), "outcome {:?}", stats.outcome);
        assert!(stats.entropy.is_finite() && stats.loss_before.is_finite());
        assert!((stats.entropy - single.1.entropy).abs() < 1e-4);
        assert!((stats.loss_before - single.1.loss_before).abs() < 1e-4);
        for (a, b) in params.iter().zip(single.0.iter()) {
            assert!((a - b).abs() < 1e-4);
        }
    }
    assert_eq!(results[0].0, results[1].0);
}

#[test]
fn test_step_size_matches_quadratic_model() {
    let policy = actor();
    let batch = batch(&policy, informative_advantages(), None);
    let mut optimizer = TrustRegionOptimizer::new(TrustRegionConfig::new()).unwrap();
    let (_, stats) = optimizer.step(policy, &batch, &DistributedContext::single());

    // α² xᵀHx = 2δ
    let predicted_kl = 0.5 * stats.alpha * stats.alpha * stats.xhx;
    assert!((predicted_kl - 0.01).abs() < 1e-4, "predicted {}", predicted_kl);
    assert!(stats.cg_iterations >= 1);
}

#[test]
fn test_rejected_step_is_bit_identical() {
    let policy = actor();
    // A cost bound of -1 can never be met: the cost surrogate is positive.
    let batch = batch(&policy, informative_advantages(), Some(vec![1.0; N]));
    let config = TrustRegionConfig::new()
        .with_line_search(3, 0.5)
        .with_cost_surrogate_bound(Some(-1.0));
    let mut optimizer = TrustRegionOptimizer::new(config).unwrap();
    let ctx = DistributedContext::single();

    let before = flatten_params(&policy);
    let (same, stats) = optimizer.step(policy, &batch, &ctx);

    assert_eq!(stats.outcome, UpdateOutcome::Rejected(RejectReason::LineSearchExhausted));
    assert_eq!(flatten_params(&same), before);
    assert_eq!(stats.kl, 0.0);
    assert_eq!(stats.loss_after, stats.loss_before);
    assert_eq!(stats.line_search_failures, 1);

    let (same, stats) = optimizer.step(same, &batch, &ctx);
    assert_eq!(flatten_params(&same), before);
    assert_eq!(stats.line_search_failures, 2);
    assert_eq!(optimizer.line_search_failures(), 2);
}

#[test]
fn test_zero_advantages_reject_without_counting_failure() {
    let policy = actor();
    let batch = batch(&policy, vec![0.0; N], None);
    let mut optimizer = TrustRegionOptimizer::new(TrustRegionConfig::new()).unwrap();

    let before = flatten_params(&policy);
    let (same, stats) = optimizer.step(policy, &batch, &DistributedContext::single());

    assert_eq!(stats.outcome, UpdateOutcome::Rejected(RejectReason::DegenerateDirection));
    assert_eq!(flatten_params(&same), before);
    assert_eq!(optimizer.line_search_failures(), 0);
}

#[test]
fn test_empty_batch_rejected() {
    let policy = actor();
    let device = Default::default();
    let batch = PolicyBatch::<B> {
        observations: Tensor::zeros([0, 2], &device),
        actions: Tensor::zeros([0, 1], &device),
        log_probs: Tensor::zeros([0], &device),
        advantages: Tensor::zeros([0], &device),
        cost_advantages: None,
    };
    assert!(batch.is_empty());
    let mut optimizer = TrustRegionOptimizer::new(TrustRegionConfig::new()).unwrap();
    let (_, stats) = optimizer.step(policy, &batch, &DistributedContext::single());
    assert_eq!(stats.outcome, UpdateOutcome::Rejected(RejectReason::EmptyBatch));
}

#[test]
fn test_fisher_vector_product_on_log_std() {
    // For a diagonal Gaussian, d²KL/d(log σ)² = 2 at θ_old, and the
    // mean/log-std cross terms vanish.
    let policy = actor();
    let config = TrustRegionConfig::new();
    let damping = config.cg_damping;
    let optimizer = TrustRegionOptimizer::new(config).unwrap();
    let device = Default::default();
    let obs = Tensor::<B, 2>::from_data(TensorData::new(observations(), [N, 2]), &device);
    let old = policy.distribution(obs.clone()).detach();

    let theta = flatten_params(&policy);
    let mut v = vec![0.0f32; theta.len()];
    // log_std is the last parameter in traversal order
    let last = theta.len() - 1;
    v[last] = 1.0;

    let hv = optimizer.fisher_vector_product(&policy, &theta, &old, &obs, &v, &DistributedContext::single());

    assert!((hv[last] - (2.0 + damping)).abs() < 1e-2, "Hv = {}", hv[last]);
    for (i, value) in hv.iter().enumerate().take(last) {
        assert!(value.abs() < 1e-2, "cross term {} = {}", i, value);
    }
}

#[test]
fn test_subsampled_fvp_still_accepts() {
    let policy = actor();
    let batch = batch(&policy, informative_advantages(), None);
    let mut optimizer = TrustRegionOptimizer::new(TrustRegionConfig::new().with_fvp_sample_freq(4)).unwrap();
    let (_, stats) = optimizer.step(policy, &batch, &DistributedContext::single());
    assert!(stats.outcome.is_accepted());
    assert!(stats.kl <= 0.01);
}

#[test]
fn test_workers_with_identical_shards_stay_in_sync() {
    let policy = actor();
    let single = {
        let batch = batch(&policy, informative_advantages(), None);
        let mut optimizer = TrustRegionOptimizer::new(TrustRegionConfig::new()).unwrap();
        let (updated, _) = optimizer.step(policy.clone(), &batch, &DistributedContext::single());
        flatten_params(&updated)
    };

    let contexts = DistributedContext::threaded(2);
    let results: Vec<Vec<f32>> = std::thread::scope(|scope| {
        let handles: Vec<_> = contexts
            .into_iter()
            .map(|ctx| {
                let policy = policy.clone();
                scope.spawn(move || {
                    let batch = batch(&policy, informative_advantages(), None);
                    let mut optimizer = TrustRegionOptimizer::new(TrustRegionConfig::new()).unwrap();
                    let (updated, _) = optimizer.step(policy, &batch, &ctx);
                    flatten_params(&updated)
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert_eq!(results[0], results[1]);
    for (a, b) in results[0].iter().zip(single.iter()) {
        assert!((a - b).abs() < 1e-5);
    }
}

#[test]
fn test_inner_policy_matches_after_step() {
    let policy = actor();
    let batch = batch(&policy, informative_advantages(), None);
    let mut optimizer = TrustRegionOptimizer::new(TrustRegionConfig::new()).unwrap();
    let (updated, _) = optimizer.step(policy, &batch, &DistributedContext::single());
    assert_eq!(flatten_params(&updated.valid()), flatten_params(&updated));
}
