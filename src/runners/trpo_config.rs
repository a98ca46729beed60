//! Configuration for trust-region training runs.
//!
//! All settings are checked by [`TrpoConfig::validate_for`] before any
//! environment or network is built, so a bad value fails the run up front
//! instead of mid-epoch.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::algorithms::{AlgorithmKind, LagrangeConfig, TrustRegionConfig};
use crate::environment::CostSourceKind;
use crate::nn::Activation;
use crate::saute::SauteConfig;
use crate::scheduling::LrSchedule;

/// Configuration validation error.
///
/// Returned when configuration parameters are invalid or inconsistent.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// A count parameter must be positive.
    InvalidCount { field: &'static str, value: usize },
    /// A parameter is outside its valid range.
    OutOfRange {
        field: &'static str,
        value: f32,
        min: f32,
        max: f32,
    },
    /// `steps_per_epoch` does not split evenly over environment copies.
    IndivisibleSteps {
        steps_per_epoch: usize,
        n_envs: usize,
        world_size: usize,
    },
    /// The environment exposes a space other than a box.
    UnsupportedSpace { role: &'static str, space: String },
    /// Two options that cannot be combined.
    IncompatibleOption { option: &'static str, reason: &'static str },
    UnknownAlgorithm(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidCount { field, value } => {
                write!(f, "{} must be > 0, got {}", field, value)
            }
            ConfigError::OutOfRange { field, value, min, max } => {
                write!(f, "{} must be in [{}, {}], got {}", field, min, max, value)
            }
            ConfigError::IndivisibleSteps {
                steps_per_epoch,
                n_envs,
                world_size,
            } => write!(
                f,
                "steps_per_epoch ({}) must be divisible by n_envs ({}) x world_size ({})",
                steps_per_epoch, n_envs, world_size
            ),
            ConfigError::UnsupportedSpace { role, space } => {
                write!(f, "{} space must be a box, got {}", role, space)
            }
            ConfigError::IncompatibleOption { option, reason } => {
                write!(f, "{} cannot be used: {}", option, reason)
            }
            ConfigError::UnknownAlgorithm(name) => {
                write!(f, "unknown algorithm '{}' (expected TRPO, TRPOLag or TRPOSaute)", name)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Network and critic-optimizer settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    pub actor_hidden_sizes: Vec<usize>,
    pub critic_hidden_sizes: Vec<usize>,
    pub activation: Activation,
    pub init_log_std: f32,
    pub critic_lr: f64,
    pub lr_schedule: LrSchedule,
    /// Passes over the epoch's data per critic update.
    pub critic_update_iters: usize,
    pub critic_batch_size: usize,
    /// L2 penalty on critic weights (Adam weight decay); off when `None`.
    pub critic_norm_coef: Option<f32>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            actor_hidden_sizes: vec![64, 64],
            critic_hidden_sizes: vec![64, 64],
            activation: Activation::Tanh,
            init_log_std: -0.5,
            critic_lr: 1e-3,
            lr_schedule: LrSchedule::Constant,
            critic_update_iters: 10,
            critic_batch_size: 64,
            critic_norm_coef: Some(0.001),
        }
    }
}

/// Full training configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrpoConfig {
    pub algorithm: AlgorithmKind,
    pub seed: u64,
    pub epochs: usize,
    /// Environment steps per epoch, summed over all copies and workers.
    pub steps_per_epoch: usize,
    /// Environment copies per worker.
    pub n_envs: usize,
    pub gamma: f32,
    pub gae_lambda: f32,
    pub standardize_advantages: bool,
    pub center_cost_advantages: bool,
    pub obs_normalize: bool,
    pub obs_clip: f32,
    pub reward_normalize: bool,
    pub cost_normalize: bool,
    pub cost_source: CostSourceKind,
    /// Episodes kept in the `Metrics/Ep*` running window.
    pub episode_window: usize,
    pub trust_region: TrustRegionConfig,
    pub saute: SauteConfig,
    pub lagrange: LagrangeConfig,
    pub model: ModelConfig,
}

impl Default for TrpoConfig {
    fn default() -> Self {
        Self {
            algorithm: AlgorithmKind::TrpoSaute,
            seed: 0,
            epochs: 100,
            steps_per_epoch: 20_000,
            n_envs: 1,
            gamma: 0.99,
            gae_lambda: 0.95,
            standardize_advantages: true,
            center_cost_advantages: true,
            obs_normalize: true,
            obs_clip: 5.0,
            reward_normalize: false,
            cost_normalize: false,
            cost_source: CostSourceKind::default(),
            episode_window: 50,
            trust_region: TrustRegionConfig::default(),
            saute: SauteConfig::default(),
            lagrange: LagrangeConfig::default(),
            model: ModelConfig::default(),
        }
    }
}

impl TrpoConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults for the named algorithm (`"TRPO"`, `"TRPOLag"`, `"TRPOSaute"`).
    pub fn for_algorithm(name: &str) -> Result<Self, ConfigError> {
        Ok(Self::default().with_algorithm(name.parse()?))
    }

    /// Environment steps each copy contributes per epoch on one worker.
    pub fn steps_per_env(&self, world_size: usize) -> usize {
        self.steps_per_epoch / (self.n_envs * world_size).max(1)
    }

    /// Validate for a single worker.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_for(1)
    }

    /// Validate for `world_size` workers.
    pub fn validate_for(&self, world_size: usize) -> Result<(), ConfigError> {
        for (field, value) in [
            ("epochs", self.epochs),
            ("steps_per_epoch", self.steps_per_epoch),
            ("n_envs", self.n_envs),
            ("world_size", world_size),
            ("episode_window", self.episode_window),
            ("critic_update_iters", self.model.critic_update_iters),
            ("critic_batch_size", self.model.critic_batch_size),
        ] {
            if value == 0 {
                return Err(ConfigError::InvalidCount { field, value });
            }
        }
        if self.steps_per_epoch % (self.n_envs * world_size) != 0 {
            return Err(ConfigError::IndivisibleSteps {
                steps_per_epoch: self.steps_per_epoch,
                n_envs: self.n_envs,
                world_size,
            });
        }
        if !(self.gamma > 0.0 && self.gamma <= 1.0) {
            return Err(ConfigError::OutOfRange {
                field: "gamma",
                value: self.gamma,
                min: f32::MIN_POSITIVE,
                max: 1.0,
            });
        }
        if !(0.0..=1.0).contains(&self.gae_lambda) {
            return Err(ConfigError::OutOfRange {
                field: "gae_lambda",
                value: self.gae_lambda,
                min: 0.0,
                max: 1.0,
            });
        }
        if self.obs_normalize && !(self.obs_clip.is_finite() && self.obs_clip > 0.0) {
            return Err(ConfigError::OutOfRange {
                field: "obs_clip",
                value: self.obs_clip,
                min: f32::MIN_POSITIVE,
                max: f32::MAX,
            });
        }
        if !(self.model.critic_lr.is_finite() && self.model.critic_lr >= 0.0) {
            return Err(ConfigError::OutOfRange {
                field: "critic_lr",
                value: self.model.critic_lr as f32,
                min: 0.0,
                max: f32::MAX,
            });
        }
        if let Some(coef) = self.model.critic_norm_coef {
            if !(coef.is_finite() && coef >= 0.0) {
                return Err(ConfigError::OutOfRange {
                    field: "critic_norm_coef",
                    value: coef,
                    min: 0.0,
                    max: f32::MAX,
                });
            }
        }

        self.trust_region.validate()?;
        if self.algorithm.uses_saute() {
            self.saute.validate()?;
            if self.reward_normalize {
                return Err(ConfigError::IncompatibleOption {
                    option: "reward_normalize",
                    reason: "the Saute penalty is defined on raw rewards",
                });
            }
            if self.cost_normalize {
                return Err(ConfigError::IncompatibleOption {
                    option: "cost_normalize",
                    reason: "the Saute budget is defined on raw costs",
                });
            }
        }
        if self.algorithm.uses_lagrange() {
            self.lagrange.validate()?;
        }
        Ok(())
    }

    /// Build and validate the configuration for one worker.
    pub fn build(self) -> Result<Self, ConfigError> {
        self.validate()?;
        Ok(self)
    }

    pub fn with_algorithm(mut self, algorithm: AlgorithmKind) -> Self {
        self.algorithm = algorithm;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_epochs(mut self, epochs: usize) -> Self {
        self.epochs = epochs;
        self
    }

    pub fn with_steps_per_epoch(mut self, steps: usize) -> Self {
        self.steps_per_epoch = steps;
        self
    }

    pub fn with_n_envs(mut self, n_envs: usize) -> Self {
        self.n_envs = n_envs;
        self
    }

    pub fn with_gamma(mut self, gamma: f32) -> Self {
        self.gamma = gamma;
        self
    }

    pub fn with_gae_lambda(mut self, lambda: f32) -> Self {
        self.gae_lambda = lambda;
        self
    }

    pub fn with_advantage_normalization(mut self, standardize: bool, center_cost: bool) -> Self {
        self.standardize_advantages = standardize;
        self.center_cost_advantages = center_cost;
        self
    }

    pub fn with_obs_normalize(mut self, normalize: bool) -> Self {
        self.obs_normalize = normalize;
        self
    }

    pub fn with_signal_normalize(mut self, reward: bool, cost: bool) -> Self {
        self.reward_normalize = reward;
        self.cost_normalize = cost;
        self
    }

    pub fn with_cost_source(mut self, source: CostSourceKind) -> Self {
        self.cost_source = source;
        self
    }

    pub fn with_trust_region(mut self, config: TrustRegionConfig) -> Self {
        self.trust_region = config;
        self
    }

    pub fn with_saute(mut self, config: SauteConfig) -> Self {
        self.saute = config;
        self
    }

    pub fn with_lagrange(mut self, config: LagrangeConfig) -> Self {
        self.lagrange = config;
        self
    }

    pub fn with_model(mut self, config: ModelConfig) -> Self {
        self.model = config;
        self
    }
}
