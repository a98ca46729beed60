//! In-process data-parallel training: one thread per worker.

use std::thread;

use burn::tensor::backend::AutodiffBackend;

use super::trainer::{EpochSummary, TrainError, Trainer};
use super::trpo_config::{ConfigError, TrpoConfig};
use crate::core::DistributedContext;
use crate::environment::RawVectorEnv;

/// Aborts the worker group unless the worker finished cleanly, so a
/// failing or panicking worker releases its peers.
struct AbortOnFailure {
    ctx: DistributedContext,
    finished: bool,
}

impl Drop for AbortOnFailure {
    fn drop(&mut self) {
        if !self.finished {
            self.ctx.abort();
        }
    }
}

/// Train `world_size` workers in lock-step and return each worker's
/// epoch summaries, indexed by rank.
///
/// `env_factory(rank)` builds the environment copies of one worker. The
/// configuration and every worker's copy count are checked before any
/// thread starts. If a worker fails mid-run, its peers stop at their next
/// checkpoint and the failing worker's error is returned.
pub fn run_threaded<B, V, F>(
    config: TrpoConfig,
    world_size: usize,
    env_factory: F,
    device: B::Device,
) -> Result<Vec<Vec<EpochSummary>>, TrainError>
where
    B: AutodiffBackend,
    V: RawVectorEnv + 'static,
    F: Fn(usize) -> V,
{
    config.validate_for(world_size)?;
    let envs: Vec<V> = (0..world_size).map(&env_factory).collect();
    if envs.iter().any(|env| env.n_envs() != config.n_envs) {
        return Err(ConfigError::IncompatibleOption {
            option: "n_envs",
            reason: "a worker's environment holds a different number of copies",
        }
        .into());
    }
    let contexts = DistributedContext::threaded(world_size);

    let results: Vec<Result<Vec<EpochSummary>, TrainError>> = thread::scope(|scope| {
        let mut handles = Vec::with_capacity(world_size);
        for (ctx, env) in contexts.into_iter().zip(envs) {
            let rank = ctx.rank();
            let config = config.clone();
            let device = device.clone();
            let guard_ctx = ctx.clone();
            let group = ctx.clone();
            let spawned = thread::Builder::new()
                .name(format!("trpo-worker-{}", rank))
                .spawn_scoped(scope, move || {
                    let mut guard = AbortOnFailure {
                        ctx: guard_ctx,
                        finished: false,
                    };
                    let result = Trainer::<B>::new(config, env, ctx, device).and_then(|mut trainer| trainer.run());
                    guard.finished = result.is_ok();
                    result
                });
            match spawned {
                Ok(handle) => handles.push((rank, handle)),
                Err(e) => {
                    log::error!("failed to spawn worker {}: {}", rank, e);
                    // Unspawned ranks never reach a reduction.
                    group.abort();
                    return vec![Err(TrainError::Worker {
                        rank,
                        reason: e.to_string(),
                    })];
                }
            }
        }

        handles
            .into_iter()
            .map(|(rank, handle)| {
                handle.join().unwrap_or_else(|_| {
                    Err(TrainError::Worker {
                        rank,
                        reason: "thread panicked".to_string(),
                    })
                })
            })
            .collect()
    });

    collect_results(results)
}

/// First root-cause error in rank order, else every worker's summaries.
fn collect_results(
    results: Vec<Result<Vec<EpochSummary>, TrainError>>,
) -> Result<Vec<Vec<EpochSummary>>, TrainError> {
    let mut peer_aborted = false;
    let mut summaries = Vec::with_capacity(results.len());
    for result in results {
        match result {
            Ok(worker) => summaries.push(worker),
            Err(TrainError::PeerAborted) => peer_aborted = true,
            Err(e) => return Err(e),
        }
    }
    if peer_aborted {
        return Err(TrainError::PeerAborted);
    }
    Ok(summaries)
}
