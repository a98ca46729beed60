//! Runner tests.
//!
//! - `config_tests`: validation of [`TrpoConfig`](crate::runners::TrpoConfig)
//! - `trainer_tests`: short end-to-end runs on scripted environments
