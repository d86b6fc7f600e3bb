use crate::config;
use crate::error::GridError;
use rayon::prelude::*;
use tracing::{debug, info_span};

/// Ragged neighbor lists packed into flat buffers.
///
/// Particle `i` owns `distances[offsets[i]..offsets[i + 1]]` and the same
/// span of `indices`. `offsets` always has `n + 1` entries, the last one
/// being the total neighbor count.
#[derive(Debug, Clone, PartialEq)]
pub struct FlatNeighbors {
    pub distances: Vec<f64>,
    pub indices: Vec<usize>,
    pub offsets: Vec<usize>,
}

impl FlatNeighbors {
    pub fn total_size(&self) -> usize {
        self.indices.len()
    }

    pub fn num_particles(&self) -> usize {
        self.offsets.len() - 1
    }

    pub fn neighbors(&self, i: usize) -> Option<(&[f64], &[usize])> {
        if i >= self.num_particles() {
            return None;
        }
        let span = self.offsets[i]..self.offsets[i + 1];
        Some((&self.distances[span.clone()], &self.indices[span]))
    }
}

/// Packs per-particle distance and index lists into a [`FlatNeighbors`].
///
/// Both inputs must hold the same number of lists, and list `i` of each must
/// have the same length. Zero particles yield empty buffers with
/// `offsets == [0]`.
pub fn flatten(dists: &[Vec<f64>], indices: &[Vec<usize>]) -> Result<FlatNeighbors, GridError> {
    let _span = info_span!("flatten", n_particles = dists.len()).entered();

    if dists.len() != indices.len() {
        return Err(GridError::ListCountMismatch {
            distances: dists.len(),
            indices: indices.len(),
        });
    }
    if let Some(particle) = dists
        .iter()
        .zip(indices)
        .position(|(d, i)| d.len() != i.len())
    {
        return Err(GridError::ListLengthMismatch {
            particle,
            distances: dists[particle].len(),
            indices: indices[particle].len(),
        });
    }

    let n = dists.len();
    let mut offsets = Vec::with_capacity(n + 1);
    let mut accum = 0;
    offsets.push(accum);
    for list in indices {
        accum += list.len();
        offsets.push(accum);
    }
    let total = accum;

    let (flat_dists, flat_indices): (Vec<f64>, Vec<usize>) = if config::use_parallel(n) {
        rayon::join(
            || dists.par_iter().flat_map_iter(|d| d.iter().copied()).collect(),
            || indices.par_iter().flat_map_iter(|i| i.iter().copied()).collect(),
        )
    } else {
        (dists.concat(), indices.concat())
    };
    debug_assert_eq!(flat_dists.len(), total);
    debug!(total_neighbors = total, "flattened");

    Ok(FlatNeighbors {
        distances: flat_dists,
        indices: flat_indices,
        offsets,
    })
}
