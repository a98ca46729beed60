//! Metric registry and output sinks.
//!
//! - [`MetricRegistry`]: named keys, `store` per sample, worker-averaged `dump`
//! - [`ConsoleSink`]: key/value table on stdout
//! - [`CsvSink`]: one CSV row per dump
//! - [`MultiSink`]: combine sinks

pub mod error;
pub mod logger;
pub mod registry;

pub use error::MetricError;
pub use logger::{ConsoleSink, CsvSink, MetricsSink, MultiSink};
pub use registry::{MetricRegistry, MetricRow};
