//! Saute TRPO on a 1-D point mass with a speed limit.
//!
//! # Environment
//!
//! - Observation: `[position, velocity]`
//! - Action: force in `[-1, 1]`
//! - Reward: `-(position - 1)²`, i.e. reach `x = 1` quickly
//! - Cost: `1` for every step with `|velocity| > 0.5`
//! - Horizon: 200 steps, no terminal states
//!
//! Rushing to the target earns reward but spends budget; once the Saute
//! budget is gone the shaped reward turns into a flat penalty.
//!
//! ```text
//! cargo run --release --example saute_point_mass
//! RUST_LOG=debug cargo run --release --example saute_point_mass
//! ```

use burn::backend::{Autodiff, NdArray};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use saute_trpo::{
    BoxSpace, ConsoleSink, CsvSink, DistributedContext, EnvError, RawEnv, SauteConfig, Space, SyncVectorEnv, Trainer,
    TrpoConfig,
};
use saute_trpo::environment::{RawInfo, RawStep};

type B = Autodiff<NdArray<f32>>;

const HORIZON: usize = 200;
const DT: f32 = 0.05;
const SPEED_LIMIT: f32 = 0.5;

struct PointMass {
    obs_space: Space,
    act_space: Space,
    position: f32,
    velocity: f32,
    t: usize,
    rng: StdRng,
}

impl PointMass {
    fn new() -> Self {
        Self {
            obs_space: Space::Box(BoxSpace::unbounded(2)),
            act_space: Space::Box(BoxSpace::uniform(1, -1.0, 1.0).unwrap_or_else(|| BoxSpace::unbounded(1))),
            position: 0.0,
            velocity: 0.0,
            t: 0,
            rng: StdRng::seed_from_u64(0),
        }
    }

    fn observation(&self) -> Vec<f32> {
        vec![self.position, self.velocity]
    }
}

impl RawEnv for PointMass {
    fn observation_space(&self) -> &Space {
        &self.obs_space
    }

    fn action_space(&self) -> &Space {
        &self.act_space
    }

    fn reset(&mut self, seed: Option<u64>) -> Result<(Vec<f32>, RawInfo), EnvError> {
        if let Some(seed) = seed {
            self.rng = StdRng::seed_from_u64(seed);
        }
        self.position = self.rng.gen_range(-0.1..0.1);
        self.velocity = 0.0;
        self.t = 0;
        Ok((self.observation(), RawInfo { cost: Some(0.0) }))
    }

    fn step(&mut self, action: &[f32]) -> Result<RawStep, EnvError> {
        let force = *action.first().ok_or(EnvError::ActionDimensionMismatch { expected: 1, got: 0 })?;
        self.velocity = 0.9 * self.velocity + force * DT * 10.0;
        self.position += self.velocity * DT;
        self.t += 1;

        let cost = if self.velocity.abs() > SPEED_LIMIT { 1.0 } else { 0.0 };
        Ok(RawStep {
            observation: self.observation(),
            reward: -(self.position - 1.0).powi(2),
            terminated: false,
            truncated: self.t >= HORIZON,
            info: RawInfo { cost: Some(cost) },
        })
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let n_envs = 4;
    let config = TrpoConfig::for_algorithm("TRPOSaute")?
        .with_epochs(50)
        .with_steps_per_epoch(4000)
        .with_n_envs(n_envs)
        .with_saute(SauteConfig::new().with_safety_budget(10.0).with_max_ep_len(HORIZON))
        .build()?;

    let env = SyncVectorEnv::new((0..n_envs).map(|_| PointMass::new()).collect())?;
    let mut trainer = Trainer::<B>::new(config, env, DistributedContext::single(), Default::default())?
        .with_sink(ConsoleSink::new())
        .with_sink(CsvSink::new("saute_point_mass.csv")?);

    let summaries = trainer.run()?;
    if let Some(last) = summaries.last() {
        log::info!(
            "finished after {} epochs: EpRet {:.2}, EpCost {:.2}",
            last.epoch + 1,
            last.metric(saute_trpo::keys::EP_RET).unwrap_or(0.0),
            last.metric(saute_trpo::keys::EP_COST).unwrap_or(0.0)
        );
    }
    Ok(())
}
