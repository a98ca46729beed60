//! Learning-rate scheduling.
//!
//! - [`ConstantLR`]: fixed rate
//! - [`LinearDecay`]: linear interpolation from start to end rate

pub mod lr_scheduler;


pub use lr_scheduler::{ConstantLR, LRScheduler, LinearDecay, LrSchedule};
