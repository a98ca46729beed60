//! Environment layer: raw simulator interfaces and CMDP wrappers.
//!
//! Raw simulators report `(obs, reward, terminated, truncated, info)`. The
//! [`CmdpAdapter`] adds a cost per step through a pluggable
//! [`CostSource`], clips actions and densifies final observations. Further
//! wrappers ([`ObsNormalize`], [`SignalNormalize`], the Saute wrapper)
//! compose over [`Cmdp`].

pub mod adapter;
pub mod cost;
pub mod error;
pub mod normalize;
pub mod raw;
pub mod space;
pub mod vector;

#[cfg(test)]
pub(crate) mod testing;

pub use adapter::{Cmdp, CmdpAdapter, CmdpInfo, CmdpStep};
pub use cost::{CostContext, CostSource, CostSourceKind, NativeCost, NativeOrTermination, TerminationCost};
pub use error::EnvError;
pub use normalize::{ObsNormalize, SignalNormalize};
pub use raw::{RawEnv, RawInfo, RawStep, RawVectorEnv, RawVectorStep, VectorInfo};
pub use space::{BoxSpace, Space};
pub use vector::SyncVectorEnv;
