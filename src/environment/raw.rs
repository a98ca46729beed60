//! Interfaces to the raw simulators.
//!
//! Physics lives outside this crate. A simulator implements [`RawEnv`] for a
//! single copy (or [`RawVectorEnv`] directly when it is natively batched).
//! Observations of a vector environment use the flat layout
//! `[env0_obs, env1_obs, ...]`.

use super::{EnvError, Space};

/// Extra data returned by a single raw environment.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawInfo {
    /// Native cost channel, if the simulator has one.
    pub cost: Option<f32>,
}

/// Result of stepping one raw environment.
#[derive(Debug, Clone, PartialEq)]
pub struct RawStep {
    pub observation: Vec<f32>,
    pub reward: f32,
    pub terminated: bool,
    pub truncated: bool,
    pub info: RawInfo,
}

/// A single continuous-control simulator.
pub trait RawEnv: Send {
    fn observation_space(&self) -> &Space;

    fn action_space(&self) -> &Space;

    fn reset(&mut self, seed: Option<u64>) -> Result<(Vec<f32>, RawInfo), EnvError>;

    fn step(&mut self, action: &[f32]) -> Result<RawStep, EnvError>;
}

/// Extra data returned by a vector environment.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VectorInfo {
    /// Native costs `[n_envs]`, present only when every copy reports one.
    pub costs: Option<Vec<f32>>,
    /// Present when at least one copy auto-reset during this step; holds the
    /// last observation of each finished episode and `None` elsewhere.
    pub final_observation: Option<Vec<Option<Vec<f32>>>>,
}

/// Result of stepping a vector environment.
#[derive(Debug, Clone, PartialEq)]
pub struct RawVectorStep {
    /// `[n_envs * obs_dim]`, already reset for finished copies.
    pub observations: Vec<f32>,
    pub rewards: Vec<f32>,
    pub terminated: Vec<bool>,
    pub truncated: Vec<bool>,
    pub info: VectorInfo,
}

/// Batched simulator with auto-reset semantics.
pub trait RawVectorEnv: Send {
    fn n_envs(&self) -> usize;

    fn single_observation_space(&self) -> &Space;

    fn single_action_space(&self) -> &Space;

    fn reset(&mut self, seed: Option<u64>) -> Result<(Vec<f32>, VectorInfo), EnvError>;

    fn step(&mut self, actions: &[f32]) -> Result<RawVectorStep, EnvError>;
}
