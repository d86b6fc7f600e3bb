use std::sync::atomic::{AtomicUsize, Ordering};

include!(concat!(env!("OUT_DIR"), "/tuned_constants.rs"));

// Pre-sized capacity hints. A 3x3 block at SPH densities rarely holds more
// candidates than this, and a single particle rarely more neighbors.
const DEFAULT_CANDIDATE_CAPACITY: usize = 170;
const DEFAULT_NEIGHBOR_CAPACITY: usize = 30;

static PARALLEL_THRESHOLD: AtomicUsize = AtomicUsize::new(TUNED_PARALLEL_THRESHOLD);
static CANDIDATE_CAPACITY: AtomicUsize = AtomicUsize::new(DEFAULT_CANDIDATE_CAPACITY);
static NEIGHBOR_CAPACITY: AtomicUsize = AtomicUsize::new(DEFAULT_NEIGHBOR_CAPACITY);

/// Particle count at or above which rebinning, the neighbor pass and
/// flattening use the rayon pool.
pub fn get_parallel_threshold() -> usize {
    PARALLEL_THRESHOLD.load(Ordering::Relaxed)
}

pub fn set_parallel_threshold(val: usize) {
    PARALLEL_THRESHOLD.store(val, Ordering::Relaxed);
}

pub fn get_candidate_capacity() -> usize {
    CANDIDATE_CAPACITY.load(Ordering::Relaxed)
}

pub fn set_candidate_capacity(val: usize) {
    CANDIDATE_CAPACITY.store(val, Ordering::Relaxed);
}

pub fn get_neighbor_capacity() -> usize {
    NEIGHBOR_CAPACITY.load(Ordering::Relaxed)
}

pub fn set_neighbor_capacity(val: usize) {
    NEIGHBOR_CAPACITY.store(val, Ordering::Relaxed);
}

pub(crate) fn use_parallel(n: usize) -> bool {
    n >= get_parallel_threshold()
}
