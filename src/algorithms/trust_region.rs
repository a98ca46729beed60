//! Trust-region policy step (natural gradient + backtracking line search).
//!
//! ```text
//! snapshot θ_old ─► g = ∇L(θ_old) ─► x ≈ H⁻¹(-g) by CG ─► α = √(2δ / xᵀHx)
//!      ─► try θ_old + decayʲ·α·x, j = 0..max_backtracks
//!            accept: L improves, KL(π_old‖π_new) ≤ δ, cost bound holds
//!            reject: return the snapshot untouched
//! ```
//!
//! `H` is the Fisher matrix of the policy at θ_old, i.e. the Hessian of the
//! mean KL. burn has no double-backward, so `H v` is the central finite
//! difference of the KL gradient along `v`, plus damping. Gradients,
//! Fisher-vector products, losses and KL are averaged over all workers.
//!
//! ## References
//!
//! - Schulman et al., "Trust Region Policy Optimization" (2015)

use burn::module::AutodiffModule;
use burn::tensor::backend::{AutodiffBackend, Backend};
use burn::tensor::{ElementConversion, Int, Tensor, TensorData};
use serde::{Deserialize, Serialize};

use super::conjugate_gradient::conjugate_gradients;
use super::gaussian::DiagGaussian;
use super::policy::GaussianPolicy;
use crate::core::param_vector::{dot, flatten_grads, flatten_params, load_params, norm};
use crate::core::DistributedContext;
use crate::runners::ConfigError;

/// Trust-region settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrustRegionConfig {
    /// KL bound δ on mean KL(π_old‖π_new).
    pub target_kl: f32,
    pub cg_iters: usize,
    pub cg_damping: f32,
    pub cg_tolerance: f32,
    /// Step shrink factor per backtrack, in (0, 1).
    pub step_decay: f32,
    pub max_backtracks: usize,
    /// Use every n-th observation for Fisher-vector products.
    pub fvp_sample_freq: usize,
    /// Finite-difference radius for Fisher-vector products.
    pub fvp_epsilon: f32,
    /// Maximum allowed increase of the cost surrogate per step.
    pub cost_surrogate_bound: Option<f32>,
}

impl Default for TrustRegionConfig {
    fn default() -> Self {
        Self {
            target_kl: 0.01,
            cg_iters: 15,
            cg_damping: 0.1,
            cg_tolerance: 1e-10,
            step_decay: 0.8,
            max_backtracks: 15,
            fvp_sample_freq: 1,
            fvp_epsilon: 1e-2,
            cost_surrogate_bound: None,
        }
    }
}

impl TrustRegionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_target_kl(mut self, target_kl: f32) -> Self {
        self.target_kl = target_kl;
        self
    }

    pub fn with_cg(mut self, iters: usize, damping: f32) -> Self {
        self.cg_iters = iters;
        self.cg_damping = damping;
        self
    }

    pub fn with_line_search(mut self, max_backtracks: usize, step_decay: f32) -> Self {
        self.max_backtracks = max_backtracks;
        self.step_decay = step_decay;
        self
    }

    pub fn with_fvp_sample_freq(mut self, freq: usize) -> Self {
        self.fvp_sample_freq = freq;
        self
    }

    pub fn with_cost_surrogate_bound(mut self, bound: Option<f32>) -> Self {
        self.cost_surrogate_bound = bound;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.target_kl > 0.0 && self.target_kl.is_finite()) {
            return Err(ConfigError::OutOfRange {
                field: "target_kl",
                value: self.target_kl,
                min: f32::MIN_POSITIVE,
                max: f32::MAX,
            });
        }
        for (field, value) in [
            ("cg_iters", self.cg_iters),
            ("max_backtracks", self.max_backtracks),
            ("fvp_sample_freq", self.fvp_sample_freq),
        ] {
            if value == 0 {
                return Err(ConfigError::InvalidCount { field, value });
            }
        }
        if !(self.cg_damping >= 0.0 && self.cg_damping.is_finite()) {
            return Err(ConfigError::OutOfRange {
                field: "cg_damping",
                value: self.cg_damping,
                min: 0.0,
                max: f32::MAX,
            });
        }
        if !(self.step_decay > 0.0 && self.step_decay < 1.0) {
            return Err(ConfigError::OutOfRange {
                field: "step_decay",
                value: self.step_decay,
                min: 0.0,
                max: 1.0,
            });
        }
        if !(self.fvp_epsilon > 0.0 && self.fvp_epsilon.is_finite()) {
            return Err(ConfigError::OutOfRange {
                field: "fvp_epsilon",
                value: self.fvp_epsilon,
                min: f32::MIN_POSITIVE,
                max: f32::MAX,
            });
        }
        Ok(())
    }
}

/// Policy-update inputs of one epoch, already on the training device.
#[derive(Debug, Clone)]
pub struct PolicyBatch<B: Backend> {
    /// `[N, obs_dim]`
    pub observations: Tensor<B, 2>,
    /// `[N, action_dim]`
    pub actions: Tensor<B, 2>,
    /// Behaviour log-probabilities `[N]`.
    pub log_probs: Tensor<B, 1>,
    /// Surrogate advantages `[N]`.
    pub advantages: Tensor<B, 1>,
    /// Cost advantages `[N]`, needed only with a cost-surrogate bound.
    pub cost_advantages: Option<Tensor<B, 1>>,
}

impl<B: Backend> PolicyBatch<B> {
    pub fn len(&self) -> usize {
        self.observations.dims()[0]
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Why a step left the policy unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// No backtracking step satisfied the acceptance criteria.
    LineSearchExhausted,
    /// Gradient or search direction was zero, NaN or infinite.
    DegenerateDirection,
    /// Nothing to learn from.
    EmptyBatch,
}

/// Result of one trust-region step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// Accepted at backtracking step `step` (1 = full step).
    Accepted { step: usize },
    Rejected(RejectReason),
}

impl UpdateOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, UpdateOutcome::Accepted { .. })
    }

    /// Backtracking index, 0 when rejected.
    pub fn acceptance_step(&self) -> usize {
        match self {
            UpdateOutcome::Accepted { step } => *step,
            UpdateOutcome::Rejected(_) => 0,
        }
    }
}

/// Diagnostics of one trust-region step.
#[derive(Debug, Clone, PartialEq)]
pub struct TrustRegionStats {
    pub outcome: UpdateOutcome,
    pub loss_before: f32,
    /// Equals `loss_before` when rejected.
    pub loss_after: f32,
    /// Exact mean KL of the applied step (0 when rejected).
    pub kl: f32,
    pub alpha: f32,
    pub xhx: f32,
    pub gradient_norm: f32,
    pub h_inv_g_norm: f32,
    pub final_step_norm: f32,
    pub cg_iterations: usize,
    pub cg_residual: f32,
    pub cg_converged: bool,
    /// Mean entropy of π_old on the batch.
    pub entropy: f32,
    /// Mean std of π_old on the batch.
    pub policy_std: f32,
    /// Running count of exhausted line searches.
    pub line_search_failures: usize,
}

impl TrustRegionStats {
    fn rejected(reason: RejectReason, loss: f32, failures: usize) -> Self {
        Self {
            outcome: UpdateOutcome::Rejected(reason),
            loss_before: loss,
            loss_after: loss,
            kl: 0.0,
            alpha: 0.0,
            xhx: 0.0,
            gradient_norm: 0.0,
            h_inv_g_norm: 0.0,
            final_step_norm: 0.0,
            cg_iterations: 0,
            cg_residual: 0.0,
            cg_converged: false,
            entropy: 0.0,
            policy_std: 0.0,
            line_search_failures: failures,
        }
    }
}

fn scalar<B: Backend>(tensor: Tensor<B, 1>) -> f32 {
    tensor.into_scalar().elem::<f32>()
}

/// Sample-weighted worker average of per-shard means.
///
/// `local` is only evaluated on a non-empty shard; an empty shard
/// contributes zeros but still joins the reduction.
fn pool_shard_means(ctx: &DistributedContext, len: usize, width: usize, local: impl FnOnce() -> Vec<f32>) -> Vec<f32> {
    let n = len as f32;
    let mut buf = if len == 0 {
        vec![0.0; width]
    } else {
        local().into_iter().map(|m| m * n).collect()
    };
    buf.push(n);
    ctx.all_reduce_mean(&mut buf);
    let total = buf.pop().unwrap_or(0.0);
    if total > 0.0 {
        buf.iter_mut().for_each(|m| *m /= total);
    }
    buf
}

/// `-mean(exp(log π - log π_b) · A)`
fn surrogate_loss<B: Backend>(
    dist: &DiagGaussian<B>,
    actions: Tensor<B, 2>,
    behaviour_log_probs: Tensor<B, 1>,
    advantages: Tensor<B, 1>,
) -> Tensor<B, 1> {
    let ratio = (dist.log_prob(actions) - behaviour_log_probs).exp();
    (ratio * advantages).mean().neg()
}

/// `mean(exp(log π - log π_b) · A_c)`
fn cost_surrogate<B: Backend>(
    dist: &DiagGaussian<B>,
    actions: Tensor<B, 2>,
    behaviour_log_probs: Tensor<B, 1>,
    cost_advantages: Tensor<B, 1>,
) -> Tensor<B, 1> {
    let ratio = (dist.log_prob(actions) - behaviour_log_probs).exp();
    (ratio * cost_advantages).mean()
}

/// Natural-gradient optimizer with a KL trust region.
///
/// Holds only configuration and the failure counter; the policy is passed
/// in by value and returned, either the accepted candidate or the
/// untouched snapshot.
#[derive(Debug, Clone)]
pub struct TrustRegionOptimizer {
    config: TrustRegionConfig,
    line_search_failures: usize,
}

impl TrustRegionOptimizer {
    pub fn new(config: TrustRegionConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            line_search_failures: 0,
        })
    }

    pub fn config(&self) -> &TrustRegionConfig {
        &self.config
    }

    pub fn line_search_failures(&self) -> usize {
        self.line_search_failures
    }

    /// Run one trust-region step on `policy`.
    pub fn step<B, P>(&mut self, policy: P, batch: &PolicyBatch<B>, ctx: &DistributedContext) -> (P, TrustRegionStats)
    where
        B: AutodiffBackend,
        P: GaussianPolicy<B> + AutodiffModule<B>,
        P::InnerModule: GaussianPolicy<B::InnerBackend>,
    {
        // Every worker must join the same reductions, so an empty shard still
        // reports and only the global count decides.
        let local_len = batch.len();
        let global_len = ctx.mean_scalar(local_len as f32);
        if global_len <= 0.0 {
            return (
                policy,
                TrustRegionStats::rejected(RejectReason::EmptyBatch, 0.0, self.line_search_failures),
            );
        }

        let theta_old = flatten_params(&policy);

        let dist = policy.distribution(batch.observations.clone());
        let old_dist = dist.detach();
        let spread = pool_shard_means(ctx, local_len, 2, || {
            vec![scalar(old_dist.entropy().mean()), scalar(old_dist.std().mean())]
        });
        let (entropy, policy_std) = (spread[0], spread[1]);

        let fvp_obs = self.fvp_observations(&batch.observations);
        let old_fvp_dist = if self.config.fvp_sample_freq == 1 {
            old_dist.clone()
        } else {
            policy.distribution(fvp_obs.clone()).detach()
        };

        // Surrogate loss and gradient at θ_old, pooled as [loss, grad...].
        let n_params = theta_old.len();
        let mut pooled = pool_shard_means(ctx, local_len, n_params + 1, || {
            let loss = surrogate_loss(
                &dist,
                batch.actions.clone(),
                batch.log_probs.clone(),
                batch.advantages.clone(),
            );
            let value = scalar(loss.clone());
            let grads = loss.backward();
            let mut out = Vec::with_capacity(n_params + 1);
            out.push(value);
            out.extend(flatten_grads(&policy, &grads));
            out
        });
        let loss_grad = pooled.split_off(1);
        let loss_before = pooled[0];

        let ascent: Vec<f32> = loss_grad.iter().map(|g| -g).collect();
        let gradient_norm = norm(&ascent);
        if !gradient_norm.is_finite() || gradient_norm == 0.0 {
            log::warn!("trust region: degenerate policy gradient (norm {})", gradient_norm);
            let mut stats = TrustRegionStats::rejected(RejectReason::DegenerateDirection, loss_before, self.line_search_failures);
            stats.entropy = entropy;
            stats.policy_std = policy_std;
            return (policy, stats);
        }

        let fvp = |v: &[f32]| self.fisher_vector_product(&policy, &theta_old, &old_fvp_dist, &fvp_obs, v, ctx);
        let cg = conjugate_gradients(fvp, &ascent, self.config.cg_iters, self.config.cg_tolerance);
        if !cg.converged {
            log::debug!(
                "trust region: CG not converged after {} iterations (residual {:.3e}), using best iterate",
                cg.iterations,
                cg.residual_norm
            );
        }

        let direction = cg.solution;
        let h_inv_g_norm = norm(&direction);
        let hx = self.fisher_vector_product(&policy, &theta_old, &old_fvp_dist, &fvp_obs, &direction, ctx);
        let xhx = dot(&direction, &hx);
        let alpha = (2.0 * self.config.target_kl / (xhx + 1e-8)).sqrt();

        let mut stats = TrustRegionStats {
            outcome: UpdateOutcome::Rejected(RejectReason::DegenerateDirection),
            loss_before,
            loss_after: loss_before,
            kl: 0.0,
            alpha,
            xhx,
            gradient_norm,
            h_inv_g_norm,
            final_step_norm: 0.0,
            cg_iterations: cg.iterations,
            cg_residual: cg.residual_norm,
            cg_converged: cg.converged,
            entropy,
            policy_std,
            line_search_failures: self.line_search_failures,
        };

        if !alpha.is_finite() || !xhx.is_finite() || xhx <= 0.0 || h_inv_g_norm == 0.0 {
            log::warn!("trust region: degenerate search direction (xHx {}, alpha {})", xhx, alpha);
            return (policy, stats);
        }

        let full_step: Vec<f32> = direction.iter().map(|d| d * alpha).collect();
        let cost_before = self.cost_surrogate_value(&policy, batch, ctx);

        let mut step_frac = 1.0f32;
        for j in 0..self.config.max_backtracks {
            let theta_new: Vec<f32> = theta_old
                .iter()
                .zip(full_step.iter())
                .map(|(t, s)| t + step_frac * s)
                .collect();
            let candidate = load_params(policy.clone(), &theta_new);

            let (loss_new, kl) = self.evaluate_candidate(&candidate, &old_dist, batch, ctx);
            let improve = loss_before - loss_new;

            let cost_ok = match (self.config.cost_surrogate_bound, cost_before) {
                (Some(bound), Some(before)) => match self.cost_surrogate_value(&candidate, batch, ctx) {
                    Some(after) => after.is_finite() && after - before <= bound,
                    None => true,
                },
                _ => true,
            };

            if !loss_new.is_finite() || !kl.is_finite() {
                log::debug!("line search step {}: non-finite loss or KL", j + 1);
            } else if improve < 0.0 {
                log::debug!("line search step {}: surrogate got worse ({:.3e})", j + 1, improve);
            } else if kl > self.config.target_kl {
                log::debug!("line search step {}: KL {:.3e} above bound", j + 1, kl);
            } else if !cost_ok {
                log::debug!("line search step {}: cost surrogate bound violated", j + 1);
            } else {
                stats.outcome = UpdateOutcome::Accepted { step: j + 1 };
                stats.loss_after = loss_new;
                stats.kl = kl;
                stats.final_step_norm = step_frac * norm(&full_step);
                return (candidate, stats);
            }
            step_frac *= self.config.step_decay;
        }

        self.line_search_failures += 1;
        stats.outcome = UpdateOutcome::Rejected(RejectReason::LineSearchExhausted);
        stats.line_search_failures = self.line_search_failures;
        log::warn!(
            "trust region: line search exhausted after {} steps, update rejected ({} total)",
            self.config.max_backtracks,
            self.line_search_failures
        );
        (policy, stats)
    }

    fn fvp_observations<B: Backend>(&self, observations: &Tensor<B, 2>) -> Tensor<B, 2> {
        let freq = self.config.fvp_sample_freq;
        if freq <= 1 {
            return observations.clone();
        }
        let n = observations.dims()[0];
        let indices: Vec<i64> = (0..n).step_by(freq).map(|i| i as i64).collect();
        let len = indices.len();
        let indices = Tensor::<B, 1, Int>::from_data(TensorData::new(indices, [len]), &observations.device());
        observations.clone().select(0, indices)
    }

    /// Gradient of mean KL(π_old‖π_θ) on the FVP observations.
    fn kl_gradient<B, P>(&self, policy: &P, theta: &[f32], old: &DiagGaussian<B>, obs: &Tensor<B, 2>) -> Vec<f32>
    where
        B: AutodiffBackend,
        P: GaussianPolicy<B> + AutodiffModule<B>,
    {
        let perturbed = load_params(policy.clone(), theta);
        let kl = old.kl(&perturbed.distribution(obs.clone())).mean();
        let grads = kl.backward();
        flatten_grads(&perturbed, &grads)
    }

    /// `(H + damping·I) v`, all-reduced.
    pub(crate) fn fisher_vector_product<B, P>(
        &self,
        policy: &P,
        theta_old: &[f32],
        old: &DiagGaussian<B>,
        obs: &Tensor<B, 2>,
        v: &[f32],
        ctx: &DistributedContext,
    ) -> Vec<f32>
    where
        B: AutodiffBackend,
        P: GaussianPolicy<B> + AutodiffModule<B>,
    {
        let v_norm = norm(v);
        let usable = v_norm > 0.0 && v_norm.is_finite();
        let local_len = if usable { obs.dims()[0] } else { 0 };
        let mut out = pool_shard_means(ctx, local_len, v.len(), || {
            let eps = self.config.fvp_epsilon;
            let plus: Vec<f32> = theta_old.iter().zip(v).map(|(t, x)| t + eps * x / v_norm).collect();
            let minus: Vec<f32> = theta_old.iter().zip(v).map(|(t, x)| t - eps * x / v_norm).collect();
            let g_plus = self.kl_gradient(policy, &plus, old, obs);
            let g_minus = self.kl_gradient(policy, &minus, old, obs);
            let scale = v_norm / (2.0 * eps);
            g_plus.into_iter().zip(g_minus).map(|(gp, gm)| (gp - gm) * scale).collect()
        });
        for (o, x) in out.iter_mut().zip(v) {
            *o += self.config.cg_damping * x;
        }
        out
    }

    /// Worker-averaged surrogate loss and mean KL(π_old‖π_candidate).
    fn evaluate_candidate<B, P>(
        &self,
        candidate: &P,
        old: &DiagGaussian<B>,
        batch: &PolicyBatch<B>,
        ctx: &DistributedContext,
    ) -> (f32, f32)
    where
        B: AutodiffBackend,
        P: GaussianPolicy<B> + AutodiffModule<B>,
        P::InnerModule: GaussianPolicy<B::InnerBackend>,
    {
        let buf = pool_shard_means(ctx, batch.len(), 2, || {
            let model = candidate.valid();
            let dist = model.distribution(batch.observations.clone().inner());
            let old_inner = DiagGaussian::new(old.mean().inner(), old.log_std().inner());

            let loss = scalar(surrogate_loss(
                &dist,
                batch.actions.clone().inner(),
                batch.log_probs.clone().inner(),
                batch.advantages.clone().inner(),
            ));
            vec![loss, scalar(old_inner.kl(&dist).mean())]
        });
        (buf[0], buf[1])
    }

    fn cost_surrogate_value<B, P>(&self, policy: &P, batch: &PolicyBatch<B>, ctx: &DistributedContext) -> Option<f32>
    where
        B: AutodiffBackend,
        P: GaussianPolicy<B> + AutodiffModule<B>,
        P::InnerModule: GaussianPolicy<B::InnerBackend>,
    {
        self.config.cost_surrogate_bound?;
        let cost_advantages = batch.cost_advantages.as_ref()?;
        let pooled = pool_shard_means(ctx, batch.len(), 1, || {
            let model = policy.valid();
            let dist = model.distribution(batch.observations.clone().inner());
            vec![scalar(cost_surrogate(
                &dist,
                batch.actions.clone().inner(),
                batch.log_probs.clone().inner(),
                cost_advantages.clone().inner(),
            ))]
        });
        Some(pooled[0])
    }
}
