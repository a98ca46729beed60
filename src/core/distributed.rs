//! Distributed context and blocking collective reductions.
//!
//! Every worker runs the full rollout/update pipeline on its own shard and
//! meets the others at a collective reduction whenever gradients,
//! Fisher-vector products, advantage statistics or logged metrics must agree.
//!
//! - [`LocalCollective`]: world size 1, every reduction is the identity
//! - [`ThreadCollective`]: N in-process workers sharing a barrier-synchronized
//!   accumulator
//!
//! A cross-process transport implements [`Collective`] outside this crate.
//!
//! A worker that fails calls [`DistributedContext::abort`]. Reductions that
//! are waiting, or start later, then return with `values` untouched, and
//! the peers see [`DistributedContext::is_aborted`] at their next check.
//!
//! # Example
//! ```ignore
//! let contexts = DistributedContext::threaded(4);
//! for ctx in contexts {
//!     std::thread::spawn(move || {
//!         let mut grad = vec![ctx.rank() as f32];
//!         ctx.all_reduce_mean(&mut grad); // 1.5 on every worker
//!     });
//! }
//! ```

use std::fmt;
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

/// Blocking element-wise reduction shared by all workers.
///
/// Every worker must call each reduction the same number of times with
/// equally sized buffers, otherwise the group deadlocks.
pub trait Collective: Send + Sync {
    /// Number of participating workers.
    fn world_size(&self) -> usize;

    /// Replace `values` with the element-wise mean over all workers.
    fn all_reduce_mean(&self, values: &mut [f32]);

    /// Overwrite `values` on every worker with the root worker's values.
    /// Exactly one caller passes `is_root = true`.
    fn broadcast(&self, values: &mut [f32], is_root: bool);

    /// Release every worker blocked in, or later entering, a reduction.
    fn abort(&self) {}

    fn is_aborted(&self) -> bool {
        false
    }
}

/// Single-worker collective.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalCollective;

impl Collective for LocalCollective {
    fn world_size(&self) -> usize {
        1
    }

    fn all_reduce_mean(&self, _values: &mut [f32]) {}

    fn broadcast(&self, _values: &mut [f32], _is_root: bool) {}
}

#[derive(Debug, Default)]
struct BarrierState {
    arrived: usize,
    generation: u64,
    aborted: bool,
}

/// Reusable barrier that can be torn down while workers wait on it.
#[derive(Debug)]
struct AbortableBarrier {
    parties: usize,
    state: Mutex<BarrierState>,
    released: Condvar,
}

impl AbortableBarrier {
    fn new(parties: usize) -> Self {
        Self {
            parties,
            state: Mutex::new(BarrierState::default()),
            released: Condvar::new(),
        }
    }

    /// `Some(is_leader)` once all parties arrived, `None` if aborted first.
    fn wait(&self) -> Option<bool> {
        let mut state = self.state.lock();
        if state.aborted {
            return None;
        }
        let generation = state.generation;
        state.arrived += 1;
        if state.arrived == self.parties {
            state.arrived = 0;
            state.generation = generation.wrapping_add(1);
            self.released.notify_all();
            return Some(true);
        }
        while state.generation == generation && !state.aborted {
            self.released.wait(&mut state);
        }
        if state.generation == generation {
            None
        } else {
            Some(false)
        }
    }

    fn abort(&self) {
        let mut state = self.state.lock();
        state.aborted = true;
        self.released.notify_all();
    }

    fn is_aborted(&self) -> bool {
        self.state.lock().aborted
    }
}

struct ReductionGroup {
    world_size: usize,
    barrier: AbortableBarrier,
    accumulator: Mutex<Vec<f64>>,
}

/// In-process collective for `world_size` worker threads.
///
/// Reductions use three barrier phases: the leader clears the accumulator,
/// every worker adds its contribution, every worker reads the mean back.
/// Sums are accumulated in `f64`.
#[derive(Clone)]
pub struct ThreadCollective {
    group: Arc<ReductionGroup>,
}

impl ThreadCollective {
    /// Create one handle per worker, all bound to the same group.
    pub fn group(world_size: usize) -> Vec<Self> {
        let world_size = world_size.max(1);
        let group = Arc::new(ReductionGroup {
            world_size,
            barrier: AbortableBarrier::new(world_size),
            accumulator: Mutex::new(Vec::new()),
        });
        (0..world_size)
            .map(|_| Self {
                group: Arc::clone(&group),
            })
            .collect()
    }
}

impl fmt::Debug for ThreadCollective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadCollective")
            .field("world_size", &self.group.world_size)
            .finish()
    }
}

impl Collective for ThreadCollective {
    fn world_size(&self) -> usize {
        self.group.world_size
    }

    fn all_reduce_mean(&self, values: &mut [f32]) {
        let group = &self.group;
        if group.world_size == 1 {
            return;
        }

        let Some(leader) = group.barrier.wait() else {
            return;
        };
        if leader {
            let mut acc = group.accumulator.lock();
            acc.clear();
            acc.resize(values.len(), 0.0);
        }
        if group.barrier.wait().is_none() {
            return;
        }

        {
            let mut acc = group.accumulator.lock();
            debug_assert_eq!(acc.len(), values.len(), "mismatched reduction sizes");
            for (a, &v) in acc.iter_mut().zip(values.iter()) {
                *a += v as f64;
            }
        }
        if group.barrier.wait().is_none() {
            return;
        }

        let acc = group.accumulator.lock();
        let n = group.world_size as f64;
        for (v, &a) in values.iter_mut().zip(acc.iter()) {
            *v = (a / n) as f32;
        }
    }

    fn broadcast(&self, values: &mut [f32], is_root: bool) {
        let group = &self.group;
        if group.world_size == 1 {
            return;
        }

        if group.barrier.wait().is_none() {
            return;
        }
        if is_root {
            let mut acc = group.accumulator.lock();
            acc.clear();
            acc.extend(values.iter().map(|&v| v as f64));
        }
        if group.barrier.wait().is_none() {
            return;
        }

        if !is_root {
            let acc = group.accumulator.lock();
            debug_assert_eq!(acc.len(), values.len(), "mismatched broadcast sizes");
            for (v, &a) in values.iter_mut().zip(acc.iter()) {
                *v = a as f32;
            }
        }
    }

    fn abort(&self) {
        self.group.barrier.abort();
    }

    fn is_aborted(&self) -> bool {
        self.group.barrier.is_aborted()
    }
}

/// World size, rank and the collective used by one worker.
///
/// Passed explicitly into every constructor that needs to reduce across
/// workers; there is no global process-group state.
#[derive(Clone)]
pub struct DistributedContext {
    rank: usize,
    collective: Arc<dyn Collective>,
}

impl DistributedContext {
    /// Context for a single worker.
    pub fn single() -> Self {
        Self {
            rank: 0,
            collective: Arc::new(LocalCollective),
        }
    }

    pub fn new(rank: usize, collective: Arc<dyn Collective>) -> Self {
        Self { rank, collective }
    }

    /// One context per in-process worker, ranks `0..world_size`.
    pub fn threaded(world_size: usize) -> Vec<Self> {
        ThreadCollective::group(world_size)
            .into_iter()
            .enumerate()
            .map(|(rank, c)| Self::new(rank, Arc::new(c)))
            .collect()
    }

    pub fn world_size(&self) -> usize {
        self.collective.world_size()
    }

    pub fn rank(&self) -> usize {
        self.rank
    }

    /// Whether this worker owns console/CSV output.
    pub fn is_main(&self) -> bool {
        self.rank == 0
    }

    pub fn all_reduce_mean(&self, values: &mut [f32]) {
        self.collective.all_reduce_mean(values);
    }

    /// Copy rank 0's `values` to every worker.
    pub fn broadcast_from_main(&self, values: &mut [f32]) {
        self.collective.broadcast(values, self.is_main());
    }

    /// Tear down the worker group after a local failure.
    pub fn abort(&self) {
        self.collective.abort();
    }

    /// Whether some worker aborted the group.
    pub fn is_aborted(&self) -> bool {
        self.collective.is_aborted()
    }

    /// Mean of a scalar over all workers.
    pub fn mean_scalar(&self, value: f32) -> f32 {
        let mut buf = [value];
        self.all_reduce_mean(&mut buf);
        buf[0]
    }

    /// Global mean and population std of `values` pooled over all workers.
    ///
    /// Shards may differ in length; each sample carries equal weight.
    pub fn mean_std(&self, values: &[f32]) -> (f32, f32) {
        let local_sum: f64 = values.iter().map(|&v| v as f64).sum();
        let mut buf = [local_sum as f32, values.len() as f32];
        self.all_reduce_mean(&mut buf);
        if buf[1] <= 0.0 {
            return (0.0, 0.0);
        }
        let mean = buf[0] / buf[1];

        let local_sq: f64 = values
            .iter()
            .map(|&v| {
                let d = v as f64 - mean as f64;
                d * d
            })
            .sum();
        let mut sq = [local_sq as f32];
        self.all_reduce_mean(&mut sq);
        let var = (sq[0] / buf[1]).max(0.0);
        (mean, var.sqrt())
    }
}

impl Default for DistributedContext {
    fn default() -> Self {
        Self::single()
    }
}

impl fmt::Debug for DistributedContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DistributedContext")
            .field("rank", &self.rank)
            .field("world_size", &self.world_size())
            .finish()
    }
}
