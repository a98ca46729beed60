//! Experience storage for on-policy training.
//!
//! - `RolloutBuffer`: per-epoch lanes (one per environment copy) with
//!   reward and cost GAE computed as paths finish

pub mod rollout_buffer;

pub use rollout_buffer::{BufferError, RolloutBatch, RolloutBuffer, RolloutBufferConfig};
