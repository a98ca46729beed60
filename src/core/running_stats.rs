//! Running observation statistics (Welford / parallel Welford).
//!
//! Used by the observation normalization wrapper. Batches from the vector
//! environment are folded in with the parallel merge formula, so updating
//! with one `[n_envs × dim]` batch equals updating row by row.

use serde::{Deserialize, Serialize};

/// Per-dimension running mean and variance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunningMeanStd {
    mean: Vec<f64>,
    /// Sum of squared deviations; variance = m2 / count.
    m2: Vec<f64>,
    count: f64,
    epsilon: f64,
}

impl RunningMeanStd {
    pub fn new(dim: usize) -> Self {
        Self::with_epsilon(dim, 1e-8)
    }

    pub fn with_epsilon(dim: usize, epsilon: f64) -> Self {
        Self {
            mean: vec![0.0; dim],
            m2: vec![0.0; dim],
            count: 0.0,
            epsilon,
        }
    }

    /// Fold in a single row.
    ///
    /// # Panics
    /// Panics if `row.len() != dim`.
    pub fn update(&mut self, row: &[f32]) {
        assert_eq!(row.len(), self.mean.len(), "Observation dimension mismatch");

        self.count += 1.0;
        for (i, &x) in row.iter().enumerate() {
            let x = x as f64;
            let delta = x - self.mean[i];
            self.mean[i] += delta / self.count;
            self.m2[i] += delta * (x - self.mean[i]);
        }
    }

    /// Fold in a flat batch of rows.
    pub fn update_batch(&mut self, batch: &[f32]) {
        let dim = self.mean.len();
        if dim == 0 || batch.is_empty() {
            return;
        }
        assert_eq!(batch.len() % dim, 0, "Batch size must be multiple of dimension");

        let mut batch_stats = Self::with_epsilon(dim, self.epsilon);
        for row in batch.chunks_exact(dim) {
            batch_stats.update(row);
        }
        self.merge(&batch_stats);
    }

    /// Combine with statistics gathered elsewhere.
    pub fn merge(&mut self, other: &RunningMeanStd) {
        assert_eq!(self.mean.len(), other.mean.len(), "Dimension mismatch in merge");

        if other.count == 0.0 {
            return;
        }
        if self.count == 0.0 {
            self.mean.copy_from_slice(&other.mean);
            self.m2.copy_from_slice(&other.m2);
            self.count = other.count;
            return;
        }

        let total = self.count + other.count;
        for i in 0..self.mean.len() {
            let delta = other.mean[i] - self.mean[i];
            self.mean[i] += delta * other.count / total;
            self.m2[i] += other.m2[i] + delta * delta * self.count * other.count / total;
        }
        self.count = total;
    }

    #[inline]
    fn std(&self, i: usize) -> f64 {
        if self.count < 2.0 {
            1.0
        } else {
            (self.m2[i] / self.count).sqrt().max(self.epsilon)
        }
    }

    /// Normalize `row` in place and clip every entry to `[-clip, clip]`.
    pub fn normalize_clip_inplace(&self, row: &mut [f32], clip: f32) {
        assert_eq!(row.len(), self.mean.len(), "Observation dimension mismatch");

        for (i, x) in row.iter_mut().enumerate() {
            let z = ((*x as f64 - self.mean[i]) / self.std(i)) as f32;
            *x = z.clamp(-clip, clip);
        }
    }

    /// Divide `row` by the running std (no centering) and clip.
    pub fn scale_clip_inplace(&self, row: &mut [f32], clip: f32) {
        assert_eq!(row.len(), self.mean.len(), "Observation dimension mismatch");

        for (i, x) in row.iter_mut().enumerate() {
            let z = (*x as f64 / self.std(i)) as f32;
            *x = z.clamp(-clip, clip);
        }
    }

    pub fn mean(&self) -> &[f64] {
        &self.mean
    }

    pub fn variance(&self) -> Vec<f64> {
        if self.count < 2.0 {
            vec![1.0; self.mean.len()]
        } else {
            self.m2.iter().map(|&v| v / self.count).collect()
        }
    }

    pub fn count(&self) -> f64 {
        self.count
    }

    pub fn dim(&self) -> usize {
        self.mean.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mean_and_variance() {
        let mut stats = RunningMeanStd::new(1);
        for x in [1.0, 2.0, 3.0, 4.0, 5.0] {
            stats.update(&[x]);
        }
        assert!((stats.mean()[0] - 3.0).abs() < 1e-10);
        assert!((stats.variance()[0] - 2.0).abs() < 1e-10);
        assert_eq!(stats.count(), 5.0);
    }

    #[test]
    fn test_batch_equals_sequential() {
        let rows = [[1.0f32, -1.0], [3.0, 0.5], [-2.0, 4.0], [0.0, 0.0]];
        let mut seq = RunningMeanStd::new(2);
        seq.update(&rows[0]);
        for r in &rows[1..] {
            seq.update(r);
        }

        let mut batched = RunningMeanStd::new(2);
        batched.update(&rows[0]);
        let flat: Vec<f32> = rows[1..].iter().flatten().copied().collect();
        batched.update_batch(&flat);

        for i in 0..2 {
            assert!((seq.mean()[i] - batched.mean()[i]).abs() < 1e-9);
            assert!((seq.variance()[i] - batched.variance()[i]).abs() < 1e-9);
        }
    }

    #[test]
    fn test_normalize_clip() {
        let mut stats = RunningMeanStd::new(1);
        stats.update_batch(&[-1.0, 1.0, -1.0, 1.0]);
        let mut row = [100.0f32];
        stats.normalize_clip_inplace(&mut row, 5.0);
        assert_eq!(row[0], 5.0);

        let mut row = [1.0f32];
        stats.normalize_clip_inplace(&mut row, 5.0);
        assert!((row[0] - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_few_samples_uses_unit_std() {
        let mut stats = RunningMeanStd::new(1);
        stats.update(&[2.0]);
        let mut row = [3.0f32];
        stats.normalize_clip_inplace(&mut row, 10.0);
        assert!((row[0] - 1.0).abs() < 1e-6);
    }
}
