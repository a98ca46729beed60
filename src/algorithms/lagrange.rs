//! Lagrange multiplier for the Lagrangian TRPO variant.
//!
//! ```text
//! λ ← clip(λ + lr · (J_c - d), 0, upper)
//! A = (A_r - λ A_c) / (1 + λ)
//! ```

use serde::{Deserialize, Serialize};

use crate::runners::ConfigError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LagrangeConfig {
    /// Episode cost limit d.
    pub cost_limit: f32,
    pub multiplier_init: f32,
    pub multiplier_lr: f32,
    /// Upper clamp of λ; unbounded when `None`.
    pub upper_bound: Option<f32>,
}

impl Default for LagrangeConfig {
    fn default() -> Self {
        Self {
            cost_limit: 25.0,
            multiplier_init: 0.001,
            multiplier_lr: 0.035,
            upper_bound: None,
        }
    }
}

impl LagrangeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cost_limit(mut self, limit: f32) -> Self {
        self.cost_limit = limit;
        self
    }

    pub fn with_multiplier(mut self, init: f32, lr: f32) -> Self {
        self.multiplier_init = init;
        self.multiplier_lr = lr;
        self
    }

    pub fn with_upper_bound(mut self, upper: Option<f32>) -> Self {
        self.upper_bound = upper;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let upper = self.upper_bound.unwrap_or(f32::INFINITY);
        if !(upper >= 0.0) {
            return Err(ConfigError::OutOfRange {
                field: "lagrangian_upper_bound",
                value: upper,
                min: 0.0,
                max: f32::INFINITY,
            });
        }
        if !(self.multiplier_init >= 0.0 && self.multiplier_init <= upper) {
            return Err(ConfigError::OutOfRange {
                field: "lagrangian_multiplier_init",
                value: self.multiplier_init,
                min: 0.0,
                max: upper,
            });
        }
        if !(self.multiplier_lr >= 0.0 && self.multiplier_lr.is_finite()) {
            return Err(ConfigError::OutOfRange {
                field: "lambda_lr",
                value: self.multiplier_lr,
                min: 0.0,
                max: f32::MAX,
            });
        }
        if !self.cost_limit.is_finite() {
            return Err(ConfigError::OutOfRange {
                field: "cost_limit",
                value: self.cost_limit,
                min: f32::MIN,
                max: f32::MAX,
            });
        }
        Ok(())
    }
}

/// Projected gradient-ascent multiplier.
#[derive(Debug, Clone, PartialEq)]
pub struct Lagrange {
    config: LagrangeConfig,
    multiplier: f32,
}

impl Lagrange {
    pub fn new(config: LagrangeConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            multiplier: config.multiplier_init,
            config,
        })
    }

    pub fn multiplier(&self) -> f32 {
        self.multiplier
    }

    pub fn cost_limit(&self) -> f32 {
        self.config.cost_limit
    }

    /// One ascent step on `mean_ep_cost - cost_limit`; returns the new λ.
    pub fn update(&mut self, mean_ep_cost: f32) -> f32 {
        if !mean_ep_cost.is_finite() {
            log::warn!("lagrange: skipping update on non-finite episode cost {}", mean_ep_cost);
            return self.multiplier;
        }
        let violation = mean_ep_cost - self.config.cost_limit;
        let upper = self.config.upper_bound.unwrap_or(f32::INFINITY);
        self.multiplier = (self.multiplier + self.config.multiplier_lr * violation).clamp(0.0, upper);
        self.multiplier
    }

    /// `(A_r - λ A_c) / (1 + λ)`
    pub fn combine_advantages(&self, reward_adv: &[f32], cost_adv: &[f32]) -> Vec<f32> {
        let lambda = self.multiplier;
        reward_adv
            .iter()
            .zip(cost_adv.iter())
            .map(|(r, c)| (r - lambda * c) / (1.0 + lambda))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_multiplier_rises_on_violation() {
        let mut lag = Lagrange::new(LagrangeConfig::new().with_cost_limit(10.0).with_multiplier(0.0, 0.1)).unwrap();
        assert!((lag.update(20.0) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_multiplier_projected_to_zero() {
        let mut lag = Lagrange::new(LagrangeConfig::new().with_cost_limit(10.0).with_multiplier(0.5, 1.0)).unwrap();
        assert_eq!(lag.update(0.0), 0.0);
    }

    #[test]
    fn test_multiplier_clamped_to_upper_bound() {
        let config = LagrangeConfig::new()
            .with_cost_limit(0.0)
            .with_multiplier(0.0, 1.0)
            .with_upper_bound(Some(2.0));
        let mut lag = Lagrange::new(config).unwrap();
        assert_eq!(lag.update(100.0), 2.0);
    }

    #[test]
    fn test_non_finite_cost_ignored() {
        let mut lag = Lagrange::new(LagrangeConfig::new().with_multiplier(0.3, 1.0)).unwrap();
        assert_eq!(lag.update(f32::NAN), 0.3);
    }

    #[test]
    fn test_combine_advantages() {
        let config = LagrangeConfig::new().with_multiplier(1.0, 0.0);
        let lag = Lagrange::new(config).unwrap();
        let adv = lag.combine_advantages(&[2.0, 0.0], &[1.0, -2.0]);
        assert_eq!(adv, vec![0.5, 1.0]);
    }

    #[test]
    fn test_invalid_init_rejected() {
        let config = LagrangeConfig::new().with_multiplier(-1.0, 0.1);
        assert!(Lagrange::new(config).is_err());
    }
}
