//! Per-episode safety budget (Saute state augmentation).
//!
//! ```text
//! reset:  remaining = initial
//! step:   remaining = (remaining - cost) / γ
//! reward: remaining >= 0 ? r : penalty(overage)
//! obs:    [raw_obs, remaining / initial]
//! ```
//!
//! With γ < 1 the remaining budget grows between costly steps, which keeps
//! the augmented state Markov with respect to the discounted constraint.
//!
//! ## References
//!
//! - Sootla et al., "Saute RL: Almost Surely Safe Reinforcement Learning
//!   Using State Augmentation" (2022)

use serde::{Deserialize, Serialize};

use crate::runners::ConfigError;

/// Reward assigned once the budget is exhausted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PenaltyShape {
    /// `-scale * overage` with `overage = -remaining / initial`.
    #[default]
    Proportional,
    /// `-scale` regardless of the overage.
    Constant,
}

impl PenaltyShape {
    /// Penalty for a normalized remaining budget below zero.
    pub fn penalty(self, scale: f32, normalized_remaining: f32) -> f32 {
        match self {
            PenaltyShape::Proportional => -scale * (-normalized_remaining),
            PenaltyShape::Constant => -scale,
        }
    }
}

/// Saute settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SauteConfig {
    /// Undiscounted episode budget the initial budget is derived from.
    pub safety_budget: f32,
    /// Budget discount γ_saute, in (0, 1].
    pub saute_gamma: f32,
    /// Episode horizon used to spread the budget.
    pub max_ep_len: usize,
    pub penalty_shape: PenaltyShape,
    pub penalty_scale: f32,
    /// Append `remaining / initial` to the observation.
    pub augment_observation: bool,
}

impl Default for SauteConfig {
    fn default() -> Self {
        Self {
            safety_budget: 25.0,
            saute_gamma: 0.999,
            max_ep_len: 1000,
            penalty_shape: PenaltyShape::Proportional,
            penalty_scale: 10.0,
            augment_observation: true,
        }
    }
}

impl SauteConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_safety_budget(mut self, budget: f32) -> Self {
        self.safety_budget = budget;
        self
    }

    pub fn with_saute_gamma(mut self, gamma: f32) -> Self {
        self.saute_gamma = gamma;
        self
    }

    pub fn with_max_ep_len(mut self, len: usize) -> Self {
        self.max_ep_len = len;
        self
    }

    pub fn with_penalty(mut self, shape: PenaltyShape, scale: f32) -> Self {
        self.penalty_shape = shape;
        self.penalty_scale = scale;
        self
    }

    pub fn with_augment_observation(mut self, augment: bool) -> Self {
        self.augment_observation = augment;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_gamma(self.saute_gamma)?;
        if !(self.safety_budget.is_finite() && self.safety_budget > 0.0) {
            return Err(ConfigError::OutOfRange {
                field: "safety_budget",
                value: self.safety_budget,
                min: f32::MIN_POSITIVE,
                max: f32::MAX,
            });
        }
        if self.max_ep_len == 0 {
            return Err(ConfigError::InvalidCount {
                field: "max_ep_len",
                value: 0,
            });
        }
        validate_penalty_scale(self.penalty_scale)
    }

    /// Per-episode starting budget:
    /// `safety_budget * (1 - γ^T) / (1 - γ) / T`, or `safety_budget` for γ = 1.
    pub fn initial_budget(&self) -> f32 {
        let gamma = self.saute_gamma as f64;
        let budget = self.safety_budget as f64;
        if gamma >= 1.0 {
            return self.safety_budget;
        }
        let t = self.max_ep_len as f64;
        (budget * (1.0 - gamma.powf(t)) / (1.0 - gamma) / t) as f32
    }
}

fn validate_gamma(gamma: f32) -> Result<(), ConfigError> {
    if !(gamma > 0.0 && gamma <= 1.0) {
        return Err(ConfigError::OutOfRange {
            field: "saute_gamma",
            value: gamma,
            min: f32::MIN_POSITIVE,
            max: 1.0,
        });
    }
    Ok(())
}

fn validate_penalty_scale(scale: f32) -> Result<(), ConfigError> {
    if !(scale.is_finite() && scale > 0.0) {
        return Err(ConfigError::OutOfRange {
            field: "penalty_scale",
            value: scale,
            min: f32::MIN_POSITIVE,
            max: f32::MAX,
        });
    }
    Ok(())
}

/// Remaining-budget state of one environment copy.
#[derive(Debug, Clone, PartialEq)]
pub struct BudgetTracker {
    initial: f32,
    remaining: f32,
    gamma: f32,
    penalty_shape: PenaltyShape,
    penalty_scale: f32,
    augment: bool,
}

impl BudgetTracker {
    /// Tracker with an explicit starting budget.
    ///
    /// Fails when γ is outside (0, 1], or the budget or penalty scale is
    /// not positive.
    pub fn new(
        initial_budget: f32,
        gamma: f32,
        penalty_shape: PenaltyShape,
        penalty_scale: f32,
    ) -> Result<Self, ConfigError> {
        validate_gamma(gamma)?;
        validate_penalty_scale(penalty_scale)?;
        if !(initial_budget.is_finite() && initial_budget > 0.0) {
            return Err(ConfigError::OutOfRange {
                field: "initial_budget",
                value: initial_budget,
                min: f32::MIN_POSITIVE,
                max: f32::MAX,
            });
        }
        Ok(Self {
            initial: initial_budget,
            remaining: initial_budget,
            gamma,
            penalty_shape,
            penalty_scale,
            augment: true,
        })
    }

    pub fn from_config(config: &SauteConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let mut tracker = Self::new(
            config.initial_budget(),
            config.saute_gamma,
            config.penalty_shape,
            config.penalty_scale,
        )?;
        tracker.augment = config.augment_observation;
        Ok(tracker)
    }

    pub fn reset(&mut self) {
        self.remaining = self.initial;
    }

    /// Charge `cost` and return the new remaining budget.
    pub fn step(&mut self, cost: f32) -> f32 {
        self.remaining = (self.remaining - cost) / self.gamma;
        self.remaining
    }

    /// Reward after reshaping by the sign of the remaining budget.
    pub fn shape_reward(&self, reward: f32) -> f32 {
        if self.remaining >= 0.0 {
            reward
        } else {
            self.penalty_shape.penalty(self.penalty_scale, self.normalized())
        }
    }

    pub fn initial(&self) -> f32 {
        self.initial
    }

    pub fn remaining(&self) -> f32 {
        self.remaining
    }

    pub fn gamma(&self) -> f32 {
        self.gamma
    }

    /// `remaining / initial`
    pub fn normalized(&self) -> f32 {
        self.remaining / self.initial
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining < 0.0
    }

    pub fn augments(&self) -> bool {
        self.augment
    }

    /// Number of extra observation dimensions (1 when augmenting).
    pub fn extra_dims(&self) -> usize {
        usize::from(self.augment)
    }

    /// Append `raw` and the normalized budget to `out`.
    pub fn augment_into(&self, raw: &[f32], out: &mut Vec<f32>) {
        out.extend_from_slice(raw);
        if self.augment {
            out.push(self.normalized());
        }
    }
}
