//! Learning-rate schedules for the critic optimizers.
//!
//! Schedules are indexed by epoch. Non-finite or negative rates are
//! sanitized to 0 at construction so a bad value never reaches Adam.

use serde::{Deserialize, Serialize};

/// Epoch-dependent learning rate.
pub trait LRScheduler: Send + Sync {
    fn get_lr(&self, epoch: usize) -> f64;
}

fn sanitize(lr: f64) -> f64 {
    if lr.is_finite() && lr >= 0.0 {
        lr
    } else {
        log::warn!("lr scheduler: replacing invalid learning rate {} with 0", lr);
        0.0
    }
}

/// Fixed learning rate.
#[derive(Debug, Clone, PartialEq)]
pub struct ConstantLR {
    lr: f64,
}

impl ConstantLR {
    pub fn new(lr: f64) -> Self {
        Self { lr: sanitize(lr) }
    }

    pub fn lr(&self) -> f64 {
        self.lr
    }
}

impl LRScheduler for ConstantLR {
    fn get_lr(&self, _epoch: usize) -> f64 {
        self.lr
    }
}

/// Linear interpolation from `start_lr` to `end_lr` over `total_epochs`,
/// then constant at `end_lr`.
#[derive(Debug, Clone, PartialEq)]
pub struct LinearDecay {
    start_lr: f64,
    end_lr: f64,
    total_epochs: usize,
}

impl LinearDecay {
    pub fn new(start_lr: f64, end_lr: f64, total_epochs: usize) -> Self {
        Self {
            start_lr: sanitize(start_lr),
            end_lr: sanitize(end_lr),
            total_epochs,
        }
    }
}

impl LRScheduler for LinearDecay {
    fn get_lr(&self, epoch: usize) -> f64 {
        if self.total_epochs == 0 {
            return self.start_lr;
        }
        let progress = (epoch as f64 / self.total_epochs as f64).min(1.0);
        self.start_lr + (self.end_lr - self.start_lr) * progress
    }
}

/// Serializable schedule choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LrSchedule {
    #[default]
    Constant,
    /// Decay linearly to zero over the run.
    Linear,
}

impl LrSchedule {
    pub fn build(self, lr: f64, epochs: usize) -> Box<dyn LRScheduler> {
        match self {
            LrSchedule::Constant => Box::new(ConstantLR::new(lr)),
            LrSchedule::Linear => Box::new(LinearDecay::new(lr, 0.0, epochs)),
        }
    }
}
