//! Observation and action spaces.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Bounded continuous box, one interval per dimension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoxSpace {
    low: Vec<f32>,
    high: Vec<f32>,
}

impl BoxSpace {
    /// Build a box from per-dimension bounds.
    ///
    /// Returns `None` when the bounds differ in length or `low > high`
    /// somewhere.
    pub fn new(low: Vec<f32>, high: Vec<f32>) -> Option<Self> {
        if low.len() != high.len() || low.iter().zip(high.iter()).any(|(l, h)| l > h) {
            return None;
        }
        Some(Self { low, high })
    }

    /// Same bounds on every dimension.
    pub fn uniform(dim: usize, low: f32, high: f32) -> Option<Self> {
        Self::new(vec![low; dim], vec![high; dim])
    }

    /// Unbounded box, typical for observations.
    pub fn unbounded(dim: usize) -> Self {
        Self {
            low: vec![f32::NEG_INFINITY; dim],
            high: vec![f32::INFINITY; dim],
        }
    }

    pub fn dim(&self) -> usize {
        self.low.len()
    }

    pub fn low(&self) -> &[f32] {
        &self.low
    }

    pub fn high(&self) -> &[f32] {
        &self.high
    }

    /// Clamp one point into the box. NaN entries become the lower bound.
    pub fn clip(&self, point: &mut [f32]) {
        for ((x, &lo), &hi) in point.iter_mut().zip(&self.low).zip(&self.high) {
            *x = if x.is_nan() { lo } else { x.clamp(lo, hi) };
        }
    }

    pub fn contains(&self, point: &[f32]) -> bool {
        point.len() == self.dim()
            && point
                .iter()
                .zip(self.low.iter().zip(&self.high))
                .all(|(x, (lo, hi))| x >= lo && x <= hi)
    }

    /// Uniform point inside the box.
    ///
    /// A dimension open on one side draws from a unit interval next to its
    /// finite bound; a fully open one draws from `[-1, 1]`.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec<f32> {
        self.low
            .iter()
            .zip(&self.high)
            .map(|(&lo, &hi)| match (lo.is_finite(), hi.is_finite()) {
                (true, true) if lo < hi => rng.gen_range(lo..=hi),
                (true, true) => lo,
                (true, false) => lo + rng.gen::<f32>(),
                (false, true) => hi - rng.gen::<f32>(),
                (false, false) => rng.gen_range(-1.0..=1.0),
            })
            .collect()
    }

    /// Copy of this box with one extra dimension bounded by `[low, high]`.
    pub fn extended(&self, low: f32, high: f32) -> Self {
        let mut out = self.clone();
        out.low.push(low);
        out.high.push(high);
        out
    }
}

/// Space declared by a raw environment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Space {
    Box(BoxSpace),
    Discrete { n: usize },
}

impl Space {
    pub fn as_box(&self) -> Option<&BoxSpace> {
        match self {
            Space::Box(b) => Some(b),
            Space::Discrete { .. } => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Space::Box(_) => "Box",
            Space::Discrete { .. } => "Discrete",
        }
    }
}

impl fmt::Display for Space {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Space::Box(b) => write!(f, "Box({})", b.dim()),
            Space::Discrete { n } => write!(f, "Discrete({})", n),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clip() {
        let space = BoxSpace::uniform(3, -1.0, 1.0).unwrap();
        let mut a = [2.0, -5.0, 0.3];
        space.clip(&mut a);
        assert_eq!(a, [1.0, -1.0, 0.3]);
        assert!(space.contains(&a));
    }

    #[test]
    fn test_clip_nan() {
        let space = BoxSpace::uniform(1, -2.0, 2.0).unwrap();
        let mut a = [f32::NAN];
        space.clip(&mut a);
        assert_eq!(a, [-2.0]);
    }

    #[test]
    fn test_invalid_bounds() {
        assert!(BoxSpace::new(vec![1.0], vec![0.0]).is_none());
        assert!(BoxSpace::new(vec![0.0, 0.0], vec![1.0]).is_none());
    }

    #[test]
    fn test_sample_stays_inside() {
        use rand::rngs::StdRng;
        use rand::SeedableRng;

        let mut rng = StdRng::seed_from_u64(3);
        let space = BoxSpace::new(vec![-1.0, 0.0, 2.0, f32::NEG_INFINITY], vec![1.0, f32::INFINITY, 2.0, 0.5]).unwrap();
        for _ in 0..100 {
            let a = space.sample(&mut rng);
            assert_eq!(a.len(), 4);
            assert!(space.contains(&a), "{:?}", a);
            assert_eq!(a[2], 2.0);
        }
    }

    #[test]
    fn test_extended() {
        let space = BoxSpace::unbounded(2).extended(f32::NEG_INFINITY, 1.0);
        assert_eq!(space.dim(), 3);
        assert_eq!(space.high()[2], 1.0);
    }

    #[test]
    fn test_space_kind() {
        assert_eq!(Space::Discrete { n: 4 }.kind(), "Discrete");
        assert!(Space::Discrete { n: 4 }.as_box().is_none());
        assert_eq!(format!("{}", Space::Box(BoxSpace::unbounded(5))), "Box(5)");
    }
}
