//! Behavioural tests for the algorithms module.
//!
//! - `gae_tests`: advantage and target estimation over paths
//! - `trust_region_tests`: acceptance, rejection and rollback of policy steps

pub mod trust_region_tests;
