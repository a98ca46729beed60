//! Named-metric registry with worker-averaged dumps.
//!
//! Keys are registered up front in a fixed order; every worker registers
//! the same keys, so the reduction at `dump` lines up element by element.
//! Plain keys are cleared after each dump. Windowed keys keep their last
//! `window` values across dumps (episode statistics).

use std::collections::{HashMap, VecDeque};

use super::error::MetricError;
use crate::core::DistributedContext;

#[derive(Debug)]
struct Entry {
    key: String,
    window: Option<usize>,
    values: VecDeque<f32>,
}

/// One dumped row: `(key, value)` in registration order.
pub type MetricRow = Vec<(String, f32)>;

#[derive(Debug, Default)]
pub struct MetricRegistry {
    entries: Vec<Entry>,
    index: HashMap<String, usize>,
}

impl MetricRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `key`; `window` keeps a running window instead of clearing.
    pub fn register_key(&mut self, key: &str, window: Option<usize>) -> Result<(), MetricError> {
        if self.index.contains_key(key) {
            return Err(MetricError::DuplicateKey(key.to_string()));
        }
        self.index.insert(key.to_string(), self.entries.len());
        self.entries.push(Entry {
            key: key.to_string(),
            window: window.map(|w| w.max(1)),
            values: VecDeque::new(),
        });
        Ok(())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.key.as_str())
    }

    /// Record one value for a registered key.
    pub fn store(&mut self, key: &str, value: f32) -> Result<(), MetricError> {
        let idx = *self
            .index
            .get(key)
            .ok_or_else(|| MetricError::UnknownKey(key.to_string()))?;
        let entry = &mut self.entries[idx];
        entry.values.push_back(value);
        if let Some(window) = entry.window {
            while entry.values.len() > window {
                entry.values.pop_front();
            }
        }
        Ok(())
    }

    /// Local mean of `key`, `None` when nothing is stored.
    pub fn local_mean(&self, key: &str) -> Option<f32> {
        let entry = &self.entries[*self.index.get(key)?];
        if entry.values.is_empty() {
            return None;
        }
        Some(entry.values.iter().sum::<f32>() / entry.values.len() as f32)
    }

    /// Average every key over its samples on all workers and clear the
    /// non-windowed keys. Keys with no samples anywhere dump as 0.
    pub fn dump(&mut self, ctx: &DistributedContext) -> MetricRow {
        let mut sums: Vec<f32> = Vec::with_capacity(self.entries.len() * 2);
        for entry in &self.entries {
            sums.push(entry.values.iter().sum());
            sums.push(entry.values.len() as f32);
        }
        ctx.all_reduce_mean(&mut sums);

        let row = self
            .entries
            .iter()
            .zip(sums.chunks(2))
            .map(|(entry, pair)| {
                let value = if pair[1] > 0.0 { pair[0] / pair[1] } else { 0.0 };
                (entry.key.clone(), value)
            })
            .collect();

        for entry in &mut self.entries {
            if entry.window.is_none() {
                entry.values.clear();
            }
        }
        row
    }
}
