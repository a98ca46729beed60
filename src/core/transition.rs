//! One recorded environment step of a single environment copy.

/// A transition as stored in the rollout buffer.
///
/// `observation` is the policy input (budget-augmented when Saute is on).
/// Values and the behaviour log-probability are computed before stepping
/// the environment. Stored transitions are only ever read back.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub observation: Vec<f32>,
    pub action: Vec<f32>,
    pub reward: f32,
    pub cost: f32,
    pub terminated: bool,
    pub truncated: bool,
    /// Reward critic estimate V(s).
    pub value: f32,
    /// Cost critic estimate V_c(s).
    pub cost_value: f32,
    /// log π_old(a|s)
    pub log_prob: f32,
}

impl Transition {
    #[inline]
    pub fn done(&self) -> bool {
        self.terminated || self.truncated
    }
}
