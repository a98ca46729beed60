//! Pluggable cost derivation.
//!
//! Many continuous-control simulators have no cost channel. For the
//! locomotion family used with Saute, falling over (termination) is the
//! unsafe event, so [`TerminationCost`] charges 1.0 per terminated step.
//! That is a property of that environment family, not a general cost model;
//! simulators with a native channel should use it.

use serde::{Deserialize, Serialize};

/// What a cost source may look at for one environment copy.
#[derive(Debug, Clone, Copy)]
pub struct CostContext<'a> {
    /// Native cost reported by the simulator, if any.
    pub native: Option<f32>,
    pub reward: f32,
    pub terminated: bool,
    pub truncated: bool,
    /// Observation the step ended on (before any auto-reset).
    pub observation: &'a [f32],
}

/// Maps one raw transition to a scalar cost.
pub trait CostSource: Send + Sync {
    fn cost(&self, ctx: &CostContext<'_>) -> f32;

    fn name(&self) -> &'static str;
}

/// 1.0 when the episode terminated, 0.0 otherwise.
#[derive(Debug, Clone, Copy, Default)]
pub struct TerminationCost;

impl CostSource for TerminationCost {
    fn cost(&self, ctx: &CostContext<'_>) -> f32 {
        if ctx.terminated {
            1.0
        } else {
            0.0
        }
    }

    fn name(&self) -> &'static str {
        "termination"
    }
}

/// The simulator's own cost; 0.0 when it reports none.
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeCost;

impl CostSource for NativeCost {
    fn cost(&self, ctx: &CostContext<'_>) -> f32 {
        ctx.native.unwrap_or(0.0)
    }

    fn name(&self) -> &'static str {
        "native"
    }
}

/// Native cost when present, termination-derived otherwise.
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeOrTermination;

impl CostSource for NativeOrTermination {
    fn cost(&self, ctx: &CostContext<'_>) -> f32 {
        match ctx.native {
            Some(c) => c,
            None => TerminationCost.cost(ctx),
        }
    }

    fn name(&self) -> &'static str {
        "native_or_termination"
    }
}

/// Serializable selector for the built-in cost sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CostSourceKind {
    Native,
    Termination,
    #[default]
    NativeOrTermination,
}

impl CostSourceKind {
    pub fn build(self) -> Box<dyn CostSource> {
        match self {
            CostSourceKind::Native => Box::new(NativeCost),
            CostSourceKind::Termination => Box::new(TerminationCost),
            CostSourceKind::NativeOrTermination => Box::new(NativeOrTermination),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(native: Option<f32>, terminated: bool) -> CostContext<'static> {
        CostContext {
            native,
            reward: 1.0,
            terminated,
            truncated: false,
            observation: &[],
        }
    }

    #[test]
    fn test_termination_cost() {
        assert_eq!(TerminationCost.cost(&ctx(None, true)), 1.0);
        assert_eq!(TerminationCost.cost(&ctx(None, false)), 0.0);
        // Native channel is ignored.
        assert_eq!(TerminationCost.cost(&ctx(Some(5.0), false)), 0.0);
    }

    #[test]
    fn test_native_or_termination_prefers_native() {
        assert_eq!(NativeOrTermination.cost(&ctx(Some(0.25), true)), 0.25);
        assert_eq!(NativeOrTermination.cost(&ctx(None, true)), 1.0);
        assert_eq!(NativeOrTermination.cost(&ctx(None, false)), 0.0);
    }

    #[test]
    fn test_kind_builds_matching_source() {
        assert_eq!(CostSourceKind::Termination.build().name(), "termination");
        assert_eq!(CostSourceKind::default().build().name(), "native_or_termination");
        assert_eq!(NativeCost.cost(&ctx(None, true)), 0.0);
    }
}
