//! Epoch loop: rollout → advantages → trust-region step → critic fit → log.
//!
//! ```text
//! RawVectorEnv ─► CmdpAdapter ─► [ObsNormalize] ─► [SignalNormalize] ─► [SauteEnv]
//!                                                                          │
//!        ┌────────────────────────── rollout (inner backend) ◄─────────────┘
//!        ▼
//!   RolloutBuffer ─► take_batch ─► TrustRegionOptimizer::step (actor)
//!                              └─► Adam minibatches (reward / cost critics)
//!                              └─► MetricRegistry::dump ─► sinks (rank 0)
//! ```
//!
//! Each worker owns one `Trainer` and its environment copies. Every
//! collective call (advantage statistics, gradients, metrics) happens at
//! the same point on every worker, so workers stay in lock-step.

use std::fmt;
use std::time::Instant;

use burn::module::AutodiffModule;
use burn::optim::adaptor::OptimizerAdaptor;
use burn::optim::decay::WeightDecayConfig;
use burn::optim::{Adam, AdamConfig, GradientsParams, Optimizer};
use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use super::trpo_config::{ConfigError, TrpoConfig};
use crate::algorithms::{GaussianPolicy, Lagrange, TrustRegionOptimizer, TrustRegionStats};
use crate::buffers::{BufferError, RolloutBatch, RolloutBuffer, RolloutBufferConfig};
use crate::core::{flatten_grads, flatten_params, gradients_from_flat, load_params, DistributedContext, Transition};
use crate::environment::{Cmdp, CmdpAdapter, CmdpStep, EnvError, ObsNormalize, RawVectorEnv, SignalNormalize};
use crate::metrics::{MetricError, MetricRegistry, MetricRow, MetricsSink, MultiSink};
use crate::nn::{Critic, CriticConfig, GaussianActor, GaussianActorConfig};
use crate::saute::SauteEnv;
use crate::scheduling::LRScheduler;

/// Failure of a training run.
#[derive(Debug)]
pub enum TrainError {
    Config(ConfigError),
    Env(EnvError),
    Metric(MetricError),
    Buffer(BufferError),
    /// A worker thread could not be spawned or panicked.
    Worker { rank: usize, reason: String },
    /// Another worker failed and tore down the group.
    PeerAborted,
}

impl fmt::Display for TrainError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrainError::Config(e) => write!(f, "configuration error: {}", e),
            TrainError::Env(e) => write!(f, "environment error: {}", e),
            TrainError::Metric(e) => write!(f, "metric error: {}", e),
            TrainError::Buffer(e) => write!(f, "rollout buffer error: {}", e),
            TrainError::Worker { rank, reason } => write!(f, "worker {} failed: {}", rank, reason),
            TrainError::PeerAborted => write!(f, "stopped after another worker failed"),
        }
    }
}

impl std::error::Error for TrainError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TrainError::Config(e) => Some(e),
            TrainError::Env(e) => Some(e),
            TrainError::Metric(e) => Some(e),
            TrainError::Buffer(e) => Some(e),
            TrainError::Worker { .. } | TrainError::PeerAborted => None,
        }
    }
}

impl From<ConfigError> for TrainError {
    fn from(e: ConfigError) -> Self {
        TrainError::Config(e)
    }
}

impl From<EnvError> for TrainError {
    fn from(e: EnvError) -> Self {
        TrainError::Env(e)
    }
}

impl From<MetricError> for TrainError {
    fn from(e: MetricError) -> Self {
        TrainError::Metric(e)
    }
}

impl From<BufferError> for TrainError {
    fn from(e: BufferError) -> Self {
        TrainError::Buffer(e)
    }
}

/// Metric keys logged every epoch, in column order.
pub mod keys {
    pub const EP_RET: &str = "Metrics/EpRet";
    pub const EP_COST: &str = "Metrics/EpCost";
    pub const EP_LEN: &str = "Metrics/EpLen";
    pub const EP_BUDGET: &str = "Metrics/EpBudget";
    pub const LAGRANGE_MULTIPLIER: &str = "Metrics/LagrangeMultiplier";
    pub const EPOCH: &str = "Train/Epoch";
    pub const ENTROPY: &str = "Train/Entropy";
    pub const KL: &str = "Train/KL";
    pub const POLICY_STD: &str = "Train/PolicyStd";
    pub const LR: &str = "Train/LR";
    pub const ADV: &str = "Value/Adv";
    pub const LOSS_PI: &str = "Loss/Loss_pi";
    pub const LOSS_PI_DELTA: &str = "Loss/Loss_pi_delta";
    pub const LOSS_REWARD_CRITIC: &str = "Loss/Loss_reward_critic";
    pub const LOSS_COST_CRITIC: &str = "Loss/Loss_cost_critic";
    pub const ALPHA: &str = "Misc/Alpha";
    pub const XHX: &str = "Misc/xHx";
    pub const GRADIENT_NORM: &str = "Misc/gradient_norm";
    pub const H_INV_G: &str = "Misc/H_inv_g";
    pub const FINAL_STEP_NORM: &str = "Misc/FinalStepNorm";
    pub const ACCEPTANCE_STEP: &str = "Misc/AcceptanceStep";
    pub const CG_ITERATIONS: &str = "Misc/CgIterations";
    pub const LINE_SEARCH_FAILURES: &str = "Misc/LineSearchFailures";
    pub const TIME_ROLLOUT: &str = "Time/Rollout";
    pub const TIME_UPDATE: &str = "Time/Update";
    pub const TOTAL_ENV_STEPS: &str = "TotalEnvSteps";
}

/// Running totals of the episode currently played by one copy.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct EpisodeAccumulator {
    ret: f32,
    cost: f32,
    len: usize,
}

/// Summary of one finished epoch, as seen by this worker after reduction.
#[derive(Debug, Clone, PartialEq)]
pub struct EpochSummary {
    pub epoch: usize,
    pub row: MetricRow,
    pub trust_region: TrustRegionStats,
}

impl EpochSummary {
    /// Value of a dumped metric key.
    pub fn metric(&self, key: &str) -> Option<f32> {
        self.row.iter().find(|(k, _)| k == key).map(|(_, v)| *v)
    }
}

pub(crate) type CriticOptimizer<B> = OptimizerAdaptor<Adam, Critic<B>, B>;

/// Single-worker trainer for the TRPO family.
pub struct Trainer<B: AutodiffBackend> {
    config: TrpoConfig,
    ctx: DistributedContext,
    device: B::Device,
    env: Box<dyn Cmdp>,
    actor: GaussianActor<B>,
    reward_critic: Critic<B>,
    cost_critic: Critic<B>,
    reward_optimizer: CriticOptimizer<B>,
    cost_optimizer: CriticOptimizer<B>,
    trust_region: TrustRegionOptimizer,
    lagrange: Option<Lagrange>,
    buffer: RolloutBuffer,
    registry: MetricRegistry,
    sink: MultiSink,
    lr_scheduler: Box<dyn LRScheduler>,
    rng: StdRng,
    observations: Vec<f32>,
    episodes: Vec<EpisodeAccumulator>,
    total_env_steps: usize,
    epoch: usize,
}

impl<B: AutodiffBackend> Trainer<B> {
    /// Validate the configuration, wrap the environment and build the
    /// networks. Fails before any environment step on a bad configuration.
    pub fn new<V>(config: TrpoConfig, raw_env: V, ctx: DistributedContext, device: B::Device) -> Result<Self, TrainError>
    where
        V: RawVectorEnv + 'static,
    {
        config.validate_for(ctx.world_size())?;
        if raw_env.n_envs() != config.n_envs {
            return Err(ConfigError::IncompatibleOption {
                option: "n_envs",
                reason: "the environment holds a different number of copies",
            }
            .into());
        }

        let mut env: Box<dyn Cmdp> = Box::new(CmdpAdapter::new(raw_env, config.cost_source.build())?);
        if config.obs_normalize {
            env = Box::new(ObsNormalize::new(env, config.obs_clip));
        }
        if config.reward_normalize || config.cost_normalize {
            env = Box::new(SignalNormalize::new(
                env,
                config.reward_normalize,
                config.cost_normalize,
                config.gamma,
                10.0,
            ));
        }
        if config.algorithm.uses_saute() {
            env = Box::new(SauteEnv::new(env, &config.saute)?);
        }

        let obs_dim = env.obs_dim();
        let action_dim = env.action_dim();
        let model = &config.model;

        let actor = GaussianActorConfig::new(obs_dim, action_dim)
            .with_hidden_sizes(model.actor_hidden_sizes.clone())
            .with_activation(model.activation)
            .with_init_log_std(model.init_log_std)
            .init(&device);
        let critic_config = CriticConfig::new(obs_dim)
            .with_hidden_sizes(model.critic_hidden_sizes.clone())
            .with_activation(model.activation);
        let reward_critic = critic_config.init(&device);
        let cost_critic = critic_config.init(&device);
        let (actor, reward_critic, cost_critic) = if ctx.world_size() > 1 {
            (
                sync_from_main(actor, &ctx),
                sync_from_main(reward_critic, &ctx),
                sync_from_main(cost_critic, &ctx),
            )
        } else {
            (actor, reward_critic, cost_critic)
        };

        let buffer = RolloutBuffer::new(
            RolloutBufferConfig::new(config.n_envs, config.steps_per_env(ctx.world_size()), obs_dim, action_dim)
                .with_discount(config.gamma, config.gae_lambda)
                .with_advantage_normalization(config.standardize_advantages, config.center_cost_advantages),
        );

        let lagrange = if config.algorithm.uses_lagrange() {
            Some(Lagrange::new(config.lagrange.clone())?)
        } else {
            None
        };

        let mut trainer = Self {
            trust_region: TrustRegionOptimizer::new(config.trust_region.clone())?,
            reward_optimizer: critic_optimizer(model.critic_norm_coef),
            cost_optimizer: critic_optimizer(model.critic_norm_coef),
            lr_scheduler: model.lr_schedule.build(model.critic_lr, config.epochs),
            rng: StdRng::seed_from_u64(config.seed.wrapping_add(ctx.rank() as u64)),
            registry: MetricRegistry::new(),
            sink: MultiSink::new(),
            episodes: vec![EpisodeAccumulator::default(); config.n_envs],
            observations: Vec::new(),
            total_env_steps: 0,
            epoch: 0,
            env,
            actor,
            reward_critic,
            cost_critic,
            lagrange,
            buffer,
            ctx,
            device,
            config,
        };
        trainer.register_metrics()?;

        // Distinct seeds per worker and per copy (the vector env adds the index).
        let seed = trainer
            .config
            .seed
            .wrapping_add((trainer.ctx.rank() * trainer.config.n_envs) as u64);
        let (obs, _) = trainer.env.reset(Some(seed))?;
        trainer.observations = obs;

        log::info!(
            "trainer: {} on rank {}/{}, obs_dim {}, action_dim {}, {} steps per copy per epoch",
            trainer.config.algorithm,
            trainer.ctx.rank(),
            trainer.ctx.world_size(),
            obs_dim,
            action_dim,
            trainer.buffer.config().steps_per_env
        );
        Ok(trainer)
    }

    /// Attach an output sink. Only rank 0 writes; other ranks ignore sinks.
    pub fn with_sink<S: MetricsSink + 'static>(mut self, sink: S) -> Self {
        if self.ctx.is_main() {
            self.sink = std::mem::take(&mut self.sink).add(sink);
        }
        self
    }

    pub fn config(&self) -> &TrpoConfig {
        &self.config
    }

    pub fn actor(&self) -> &GaussianActor<B> {
        &self.actor
    }

    pub fn reward_critic(&self) -> &Critic<B> {
        &self.reward_critic
    }

    pub fn cost_critic(&self) -> &Critic<B> {
        &self.cost_critic
    }

    pub fn lagrange(&self) -> Option<&Lagrange> {
        self.lagrange.as_ref()
    }

    pub fn env(&self) -> &dyn Cmdp {
        self.env.as_ref()
    }

    pub fn registry(&self) -> &MetricRegistry {
        &self.registry
    }

    pub fn epoch(&self) -> usize {
        self.epoch
    }

    pub fn total_env_steps(&self) -> usize {
        self.total_env_steps
    }

    /// Run all configured epochs.
    pub fn run(&mut self) -> Result<Vec<EpochSummary>, TrainError> {
        let mut summaries = Vec::with_capacity(self.config.epochs);
        while self.epoch < self.config.epochs {
            summaries.push(self.train_epoch()?);
        }
        self.sink.flush()?;
        Ok(summaries)
    }

    /// One full epoch: rollout, update, dump.
    pub fn train_epoch(&mut self) -> Result<EpochSummary, TrainError> {
        let rollout_start = Instant::now();
        self.rollout()?;
        let rollout_time = rollout_start.elapsed().as_secs_f32();
        self.check_peers()?;

        let update_start = Instant::now();
        let batch = self.buffer.take_batch(&self.ctx)?;
        let stats = self.update(&batch)?;
        let update_time = update_start.elapsed().as_secs_f32();
        self.check_peers()?;

        self.registry.store(keys::TIME_ROLLOUT, rollout_time)?;
        self.registry.store(keys::TIME_UPDATE, update_time)?;
        self.registry.store(keys::EPOCH, self.epoch as f32)?;
        let global_steps = self.total_env_steps as f32 * self.ctx.world_size() as f32;
        self.registry.store(keys::TOTAL_ENV_STEPS, global_steps)?;

        let row = self.registry.dump(&self.ctx);
        if self.ctx.is_main() {
            self.sink.write(&row)?;
        }
        let summary = EpochSummary {
            epoch: self.epoch,
            row,
            trust_region: stats,
        };
        log::info!(
            "epoch {}: EpRet {:.3}, EpCost {:.3}, KL {:.2e}, accepted at step {}",
            self.epoch,
            summary.metric(keys::EP_RET).unwrap_or(0.0),
            summary.metric(keys::EP_COST).unwrap_or(0.0),
            summary.trust_region.kl,
            summary.trust_region.outcome.acceptance_step()
        );
        self.epoch += 1;
        Ok(summary)
    }

    fn register_metrics(&mut self) -> Result<(), MetricError> {
        let window = Some(self.config.episode_window);
        for key in [keys::EP_RET, keys::EP_COST, keys::EP_LEN] {
            self.registry.register_key(key, window)?;
        }
        if self.config.algorithm.uses_saute() {
            self.registry.register_key(keys::EP_BUDGET, window)?;
        }
        if self.config.algorithm.uses_lagrange() {
            self.registry.register_key(keys::LAGRANGE_MULTIPLIER, None)?;
        }
        for key in [
            keys::EPOCH,
            keys::ENTROPY,
            keys::KL,
            keys::POLICY_STD,
            keys::LR,
            keys::ADV,
            keys::LOSS_PI,
            keys::LOSS_PI_DELTA,
            keys::LOSS_REWARD_CRITIC,
            keys::LOSS_COST_CRITIC,
            keys::ALPHA,
            keys::XHX,
            keys::GRADIENT_NORM,
            keys::H_INV_G,
            keys::FINAL_STEP_NORM,
            keys::ACCEPTANCE_STEP,
            keys::CG_ITERATIONS,
            keys::LINE_SEARCH_FAILURES,
            keys::TIME_ROLLOUT,
            keys::TIME_UPDATE,
            keys::TOTAL_ENV_STEPS,
        ] {
            self.registry.register_key(key, None)?;
        }
        Ok(())
    }

    fn check_peers(&self) -> Result<(), TrainError> {
        if self.ctx.is_aborted() {
            return Err(TrainError::PeerAborted);
        }
        Ok(())
    }

    /// Fill the buffer with `steps_per_env` steps of every copy.
    fn rollout(&mut self) -> Result<(), TrainError> {
        let n_envs = self.config.n_envs;
        let obs_dim = self.env.obs_dim();
        let action_dim = self.env.action_dim();
        let steps = self.buffer.config().steps_per_env;

        let actor = self.actor.valid();
        let reward_critic = self.reward_critic.valid();
        let cost_critic = self.cost_critic.valid();

        for t in 0..steps {
            let obs = Tensor::<B::InnerBackend, 2>::from_data(
                TensorData::new(self.observations.clone(), [n_envs, obs_dim]),
                &self.device,
            );
            let dist = actor.distribution(obs.clone());
            let actions = dist.sample();
            let log_probs = to_vec(dist.log_prob(actions.clone()));
            let actions = actions.into_data().iter::<f32>().collect::<Vec<f32>>();
            let values = to_vec(reward_critic.forward(obs.clone()));
            let cost_values = to_vec(cost_critic.forward(obs));

            let step = self.env.step(&actions)?;
            self.total_env_steps += n_envs;
            let epoch_end = t + 1 == steps;

            for i in 0..n_envs {
                self.buffer.store(
                    i,
                    Transition {
                        observation: self.observations[i * obs_dim..(i + 1) * obs_dim].to_vec(),
                        action: actions[i * action_dim..(i + 1) * action_dim].to_vec(),
                        reward: step.rewards[i],
                        cost: step.costs[i],
                        terminated: step.terminated[i],
                        truncated: step.truncated[i],
                        value: values[i],
                        cost_value: cost_values[i],
                        log_prob: log_probs[i],
                    },
                )?;
                self.track_episode(i, &step)?;

                if step.terminated[i] {
                    self.buffer.finish_path(i, 0.0, 0.0)?;
                } else if step.truncated[i] {
                    let last = match step.info.final_observation_row(i, obs_dim) {
                        Some(row) => row,
                        None => {
                            log::warn!("rollout: copy {} truncated without a final observation", i);
                            &step.observations[i * obs_dim..(i + 1) * obs_dim]
                        }
                    };
                    let v = reward_critic.predict(last, obs_dim, &self.device)[0];
                    let vc = cost_critic.predict(last, obs_dim, &self.device)[0];
                    self.buffer.finish_path(i, v, vc)?;
                } else if epoch_end {
                    let next = &step.observations[i * obs_dim..(i + 1) * obs_dim];
                    let v = reward_critic.predict(next, obs_dim, &self.device)[0];
                    let vc = cost_critic.predict(next, obs_dim, &self.device)[0];
                    self.buffer.finish_path(i, v, vc)?;
                }
            }
            self.observations = step.observations;
        }
        Ok(())
    }

    /// Accumulate episode statistics of copy `i`; log them when it finished.
    fn track_episode(&mut self, i: usize, step: &CmdpStep) -> Result<(), MetricError> {
        let reward = step
            .info
            .original_reward
            .as_ref()
            .map_or(step.rewards[i], |r| r[i]);
        let cost = step.info.original_cost.as_ref().map_or(step.costs[i], |c| c[i]);

        let ep = &mut self.episodes[i];
        ep.ret += reward;
        ep.cost += cost;
        ep.len += 1;

        if step.done(i) {
            let finished = std::mem::take(ep);
            self.registry.store(keys::EP_RET, finished.ret)?;
            self.registry.store(keys::EP_COST, finished.cost)?;
            self.registry.store(keys::EP_LEN, finished.len as f32)?;
            if self.config.algorithm.uses_saute() {
                if let Some(budget) = step.info.remaining_budget.as_ref() {
                    self.registry.store(keys::EP_BUDGET, budget[i])?;
                }
            }
        }
        Ok(())
    }

    fn update(&mut self, batch: &RolloutBatch) -> Result<TrustRegionStats, TrainError> {
        if let Some(lagrange) = self.lagrange.as_mut() {
            // Episode cost is pooled over workers so all multipliers agree.
            let local = self.registry.local_mean(keys::EP_COST);
            let mut pooled = [local.unwrap_or(0.0), if local.is_some() { 1.0 } else { 0.0 }];
            self.ctx.all_reduce_mean(&mut pooled);
            if pooled[1] > 0.0 {
                lagrange.update(pooled[0] / pooled[1]);
            }
            self.registry.store(keys::LAGRANGE_MULTIPLIER, lagrange.multiplier())?;
        }

        let advantages = match self.lagrange.as_ref() {
            Some(lagrange) => lagrange.combine_advantages(&batch.reward_advantages, &batch.cost_advantages),
            None => batch.reward_advantages.clone(),
        };
        let with_cost = self.config.trust_region.cost_surrogate_bound.is_some();
        let policy_batch = batch.policy_batch::<B>(&advantages, with_cost, &self.device);

        let (actor, stats) = self.trust_region.step(self.actor.clone(), &policy_batch, &self.ctx);
        self.actor = actor;

        let lr = self.lr_scheduler.get_lr(self.epoch);
        let (reward_critic, reward_loss) = fit_critic(
            self.reward_critic.clone(),
            &mut self.reward_optimizer,
            &batch.observations,
            &batch.reward_targets,
            batch.obs_dim,
            lr,
            &self.config,
            &mut self.rng,
            &self.ctx,
            &self.device,
        );
        self.reward_critic = reward_critic;
        let (cost_critic, cost_loss) = fit_critic(
            self.cost_critic.clone(),
            &mut self.cost_optimizer,
            &batch.observations,
            &batch.cost_targets,
            batch.obs_dim,
            lr,
            &self.config,
            &mut self.rng,
            &self.ctx,
            &self.device,
        );
        self.cost_critic = cost_critic;

        let registry = &mut self.registry;
        registry.store(keys::ENTROPY, stats.entropy)?;
        registry.store(keys::KL, stats.kl)?;
        registry.store(keys::POLICY_STD, stats.policy_std)?;
        registry.store(keys::LR, lr as f32)?;
        registry.store(keys::ADV, batch.mean_advantage())?;
        registry.store(keys::LOSS_PI, stats.loss_before)?;
        registry.store(keys::LOSS_PI_DELTA, stats.loss_after - stats.loss_before)?;
        registry.store(keys::LOSS_REWARD_CRITIC, reward_loss)?;
        registry.store(keys::LOSS_COST_CRITIC, cost_loss)?;
        registry.store(keys::ALPHA, stats.alpha)?;
        registry.store(keys::XHX, stats.xhx)?;
        registry.store(keys::GRADIENT_NORM, stats.gradient_norm)?;
        registry.store(keys::H_INV_G, stats.h_inv_g_norm)?;
        registry.store(keys::FINAL_STEP_NORM, stats.final_step_norm)?;
        registry.store(keys::ACCEPTANCE_STEP, stats.outcome.acceptance_step() as f32)?;
        registry.store(keys::CG_ITERATIONS, stats.cg_iterations as f32)?;
        registry.store(keys::LINE_SEARCH_FAILURES, stats.line_search_failures as f32)?;
        Ok(stats)
    }
}

pub(crate) fn critic_optimizer<B: AutodiffBackend>(norm_coef: Option<f32>) -> CriticOptimizer<B> {
    AdamConfig::new()
        .with_epsilon(1e-5)
        .with_weight_decay(norm_coef.map(WeightDecayConfig::new))
        .init()
}

/// Start every worker from rank 0's parameters.
fn sync_from_main<B: Backend, M: Module<B>>(module: M, ctx: &DistributedContext) -> M {
    let mut params = flatten_params::<B, M>(&module);
    ctx.broadcast_from_main(&mut params);
    load_params::<B, M>(module, &params)
}

fn to_vec<B: Backend>(tensor: Tensor<B, 1>) -> Vec<f32> {
    tensor.into_data().iter::<f32>().collect()
}

/// Shuffled-minibatch MSE regression of `critic` onto `targets`; returns the
/// updated critic and the mean minibatch loss.
#[allow(clippy::too_many_arguments)]
pub(crate) fn fit_critic<B: AutodiffBackend>(
    mut critic: Critic<B>,
    optimizer: &mut CriticOptimizer<B>,
    observations: &[f32],
    targets: &[f32],
    obs_dim: usize,
    lr: f64,
    config: &TrpoConfig,
    rng: &mut StdRng,
    ctx: &DistributedContext,
    device: &B::Device,
) -> (Critic<B>, f32) {
    let n = targets.len();
    if n == 0 {
        return (critic, 0.0);
    }
    let batch_size = config.model.critic_batch_size.min(n);
    let mut indices: Vec<usize> = (0..n).collect();
    let mut loss_sum = 0.0f32;
    let mut loss_count = 0usize;

    for _ in 0..config.model.critic_update_iters {
        indices.shuffle(rng);
        for chunk in indices.chunks(batch_size) {
            let m = chunk.len();
            let mut obs = Vec::with_capacity(m * obs_dim);
            let mut tgt = Vec::with_capacity(m);
            for &j in chunk {
                obs.extend_from_slice(&observations[j * obs_dim..(j + 1) * obs_dim]);
                tgt.push(targets[j]);
            }
            let obs = Tensor::<B, 2>::from_data(TensorData::new(obs, [m, obs_dim]), device);
            let tgt = Tensor::<B, 1>::from_data(TensorData::new(tgt, [m]), device);

            let loss = (critic.forward(obs) - tgt).powf_scalar(2.0).mean();
            loss_sum += loss.clone().into_scalar().elem::<f32>();
            loss_count += 1;

            let grads = loss.backward();
            let grads = if ctx.world_size() > 1 {
                let mut flat = flatten_grads::<B, _>(&critic, &grads);
                ctx.all_reduce_mean(&mut flat);
                gradients_from_flat::<B, _>(&critic, &flat)
            } else {
                GradientsParams::from_grads(grads, &critic)
            };
            critic = optimizer.step(lr, critic, grads);
        }
    }
    let loss = ctx.mean_scalar(loss_sum / loss_count.max(1) as f32);
    (critic, loss)
}
