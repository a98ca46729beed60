//! # saute_trpo: trust-region safe RL with Saute budget augmentation
//!
//! TRPO and two constrained variants for continuous-control CMDPs:
//! plain TRPO, Lagrangian TRPO, and TRPO on the Saute-augmented
//! environment, where the remaining safety budget is folded into the state
//! and the reward is reshaped once it runs out.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                           Trainer (one per worker)                    │
//! ├──────────────────────────────────────────────────────────────────────┤
//! │  RawVectorEnv                                                         │
//! │      │  CmdpAdapter (cost source, action clipping)                    │
//! │      │  ObsNormalize / SignalNormalize                                │
//! │      ▼  SauteEnv (budget tracker per copy)                            │
//! │  ┌──────────────┐   ┌──────────────────┐   ┌───────────────────────┐  │
//! │  │ GaussianActor│──►│  RolloutBuffer   │──►│ TrustRegionOptimizer  │  │
//! │  │ Critic x2    │   │  (reward + cost  │   │ CG on Fisher products │  │
//! │  └──────────────┘   │   GAE per path)  │   │ KL line search        │  │
//! │                     └──────────────────┘   └───────────────────────┘  │
//! │                              │                                        │
//! │                              ▼                                        │
//! │                  MetricRegistry ─► ConsoleSink / CsvSink              │
//! └──────────────────────────────────────────────────────────────────────┘
//!             ▲ all_reduce_mean / broadcast (DistributedContext)
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use burn::backend::{Autodiff, NdArray};
//! use saute_trpo::{ConsoleSink, DistributedContext, SyncVectorEnv, Trainer, TrpoConfig};
//!
//! let config = TrpoConfig::for_algorithm("TRPOSaute")?
//!     .with_steps_per_epoch(4000)
//!     .with_n_envs(4);
//! let env = SyncVectorEnv::new((0..4).map(|_| MyEnv::new()).collect())?;
//! let mut trainer = Trainer::<Autodiff<NdArray>>::new(config, env, DistributedContext::single(), Default::default())?
//!     .with_sink(ConsoleSink::new());
//! trainer.run()?;
//! ```

pub mod algorithms;
pub mod buffers;
pub mod core;
pub mod environment;
pub mod metrics;
pub mod nn;
pub mod runners;
pub mod saute;
pub mod scheduling;

pub use crate::core::{Collective, DistributedContext, LocalCollective, RunningMeanStd, ThreadCollective, Transition};

pub use algorithms::{
    AlgorithmKind, DiagGaussian, GaussianPolicy, Lagrange, LagrangeConfig, PolicyBatch, RejectReason,
    TrustRegionConfig, TrustRegionOptimizer, TrustRegionStats, UpdateOutcome,
};

pub use buffers::{BufferError, RolloutBatch, RolloutBuffer, RolloutBufferConfig};

// Environment layer
pub use environment::{
    BoxSpace, Cmdp, CmdpAdapter, CmdpInfo, CmdpStep, CostSource, CostSourceKind, EnvError, ObsNormalize, RawEnv,
    RawVectorEnv, SignalNormalize, Space, SyncVectorEnv,
};
pub use saute::{BudgetTracker, PenaltyShape, SauteConfig, SauteEnv};

pub use metrics::{ConsoleSink, CsvSink, MetricError, MetricRegistry, MetricsSink, MultiSink};
pub use nn::{Activation, Critic, CriticConfig, GaussianActor, GaussianActorConfig};

pub use runners::{keys, run_threaded, ConfigError, EpochSummary, ModelConfig, TrainError, Trainer, TrpoConfig};

// Learning rate scheduling
pub use scheduling::{ConstantLR, LRScheduler, LinearDecay, LrSchedule};
