//! Generalized Advantage Estimation over finished paths.
//!
//! A path is the stretch of one environment copy between two episode
//! boundaries (or the epoch boundary). It carries no done flags: the caller
//! supplies the bootstrap value, zero when the path terminated and V(s_T)
//! when it was truncated by a time limit or the end of the epoch.
//!
//! ## Formula
//!
//! A_t = Σ_{l=0}^{T-t-1} (γλ)^l δ_{t+l},  δ_t = r_t + γ V(s_{t+1}) - V(s_t)
//!
//! Critic targets are the bootstrapped discounted returns-to-go
//! R_t = Σ_{l} γ^l r_{t+l} + γ^{T-t} V(s_T).
//!
//! ## References
//!
//! - Schulman et al., "High-Dimensional Continuous Control Using
//!   Generalized Advantage Estimation" (2016)

/// GAE advantages for one path.
///
/// # Arguments
///
/// * `rewards` - rewards r_t [T]
/// * `values` - baseline V(s_t) [T]
/// * `last_value` - bootstrap V(s_T) (0 if terminated)
/// * `gamma` - discount factor
/// * `gae_lambda` - trace decay λ
pub fn compute_gae(rewards: &[f32], values: &[f32], last_value: f32, gamma: f32, gae_lambda: f32) -> Vec<f32> {
    let n = rewards.len();
    assert_eq!(values.len(), n);

    let mut advantages = vec![0.0f32; n];
    let mut gae = 0.0f32;
    let mut next_value = last_value;

    for t in (0..n).rev() {
        let delta = rewards[t] + gamma * next_value - values[t];
        gae = delta + gamma * gae_lambda * gae;
        advantages[t] = gae;
        next_value = values[t];
    }

    advantages
}

/// Discounted cumulative sum with a bootstrap tail.
///
/// `out[t] = x[t] + γ x[t+1] + ... + γ^{T-t} last`
pub fn discount_cumsum(x: &[f32], last: f32, gamma: f32) -> Vec<f32> {
    let mut out = vec![0.0f32; x.len()];
    let mut running = last;
    for t in (0..x.len()).rev() {
        running = x[t] + gamma * running;
        out[t] = running;
    }
    out
}

/// Advantages and critic targets of one stream (reward or cost).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PathEstimates {
    pub advantages: Vec<f32>,
    pub targets: Vec<f32>,
}

/// Advantages and discounted targets for one stream of one path.
pub fn estimate_path(
    signals: &[f32],
    values: &[f32],
    last_value: f32,
    gamma: f32,
    gae_lambda: f32,
) -> PathEstimates {
    PathEstimates {
        advantages: compute_gae(signals, values, last_value, gamma, gae_lambda),
        targets: discount_cumsum(signals, last_value, gamma),
    }
}

/// Shift and scale in place: `(x - mean) / (std + eps)`.
pub fn standardize(values: &mut [f32], mean: f32, std: f32) {
    let denom = std + 1e-8;
    for v in values.iter_mut() {
        *v = (*v - mean) / denom;
    }
}

/// Shift in place: `x - mean`.
pub fn center(values: &mut [f32], mean: f32) {
    for v in values.iter_mut() {
        *v -= mean;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gae_simple() {
        let rewards = vec![1.0, 1.0, 1.0];
        let values = vec![0.5, 0.5, 0.5];
        let adv = compute_gae(&rewards, &values, 0.0, 0.99, 0.95);

        // Last step: δ = 1 + 0 - 0.5
        assert!((adv[2] - 0.5).abs() < 1e-6);
        assert!(adv[0] > adv[1] && adv[1] > adv[2]);
    }

    #[test]
    fn test_discount_cumsum() {
        let out = discount_cumsum(&[1.0, 2.0, 3.0], 0.0, 0.5);
        assert!((out[2] - 3.0).abs() < 1e-6);
        assert!((out[1] - 3.5).abs() < 1e-6);
        assert!((out[0] - 2.75).abs() < 1e-6);
    }

    #[test]
    fn test_discount_cumsum_bootstraps() {
        let out = discount_cumsum(&[0.0], 10.0, 0.9);
        assert!((out[0] - 9.0).abs() < 1e-6);
    }

    #[test]
    fn test_standardize() {
        let mut v = vec![1.0, 3.0];
        standardize(&mut v, 2.0, 1.0);
        assert!((v[0] + 1.0).abs() < 1e-6);
        assert!((v[1] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_center() {
        let mut v = vec![1.0, 3.0];
        center(&mut v, 2.0);
        assert_eq!(v, vec![-1.0, 1.0]);
    }

    #[test]
    fn test_empty_path() {
        assert!(compute_gae(&[], &[], 1.0, 0.99, 0.95).is_empty());
        assert!(discount_cumsum(&[], 1.0, 0.99).is_empty());
    }
}
