use crate::config;
use crate::error::GridError;
use crate::geometry::Point;
use crate::index::Binning;
use rayon::prelude::*;
use tracing::{debug, info_span};

// Internal tuning parameters
const PARALLEL_TASKS_PER_THREAD: usize = 64;

/// Per-particle squared distances and sorted indices of all neighbors.
pub type NeighborLists = (Vec<Vec<f64>>, Vec<Vec<usize>>);

/// Candidate particles gathered from a 3x3 block: (position, sorted index).
pub type Candidates = Vec<(Point, usize)>;

impl Binning<'_> {
    /// Neighbor lists of every particle using the cell size as the cutoff.
    ///
    /// Each list holds `(d^2, j)` for every `j` with `d^2 <= dx^2`, the
    /// particle itself included. Order within a list is unspecified.
    pub fn find_all_neighbor_lists(&self) -> NeighborLists {
        let dx = self.geometry().cell_size();
        self.neighbor_lists(dx * dx, config::use_parallel(self.len()))
    }

    /// Like [`find_all_neighbor_lists`](Self::find_all_neighbor_lists) with an
    /// explicit cutoff. The 3x3 search covers one cell width, so `radius`
    /// may not exceed the cell size.
    pub fn find_all_neighbor_lists_within(&self, radius: f64) -> Result<NeighborLists, GridError> {
        let cell_size = self.geometry().cell_size();
        if !(radius > 0.0 && radius <= cell_size) {
            return Err(GridError::InvalidRadius { radius, cell_size });
        }
        Ok(self.neighbor_lists(radius * radius, config::use_parallel(self.len())))
    }

    /// Collects every particle of the 3x3 block centred on cell `(cx, cy)`,
    /// skipping coordinates outside the grid.
    pub fn find_candidates(&self, cx: usize, cy: usize, candidates: &mut Candidates) {
        let geometry = self.geometry();
        let particles = self.particles();
        for xo in -1..=1isize {
            for yo in -1..=1isize {
                let nx = cx as isize + xo;
                let ny = cy as isize + yo;
                if !geometry.idx_ok(nx, ny) {
                    continue;
                }
                let range = self.cell_range(geometry.key_of_coords(nx as usize, ny as usize));
                candidates.extend(range.map(|j| (particles[j], j)));
            }
        }
    }

    /// Appends `(d^2, j)` for every candidate `j` within `radius_sq` of particle `i`.
    pub fn filter_by_radius(
        &self,
        i: usize,
        candidates: &[(Point, usize)],
        radius_sq: f64,
        dists: &mut Vec<f64>,
        indices: &mut Vec<usize>,
    ) {
        let capacity = config::get_neighbor_capacity();
        dists.reserve(capacity);
        indices.reserve(capacity);

        let pos_i = self.particles()[i];
        for &(pos_j, j) in candidates {
            let r_ij = (pos_i - pos_j).norm_squared();
            if r_ij > radius_sq {
                continue;
            }
            dists.push(r_ij);
            indices.push(j);
        }
    }

    pub(crate) fn neighbor_lists(&self, radius_sq: f64, parallel: bool) -> NeighborLists {
        let _span = info_span!("Binning::neighbor_lists", n_particles = self.len(), parallel)
            .entered();
        let num_cells = self.geometry().num_cells();

        let (dists, indices): NeighborLists = if parallel {
            let num_threads = rayon::current_num_threads();
            let min_len = (num_cells / (num_threads * PARALLEL_TASKS_PER_THREAD)).max(1);
            (0..num_cells)
                .into_par_iter()
                .with_min_len(min_len)
                .flat_map_iter(|key| self.cell_neighbor_lists(key, radius_sq))
                .unzip()
        } else {
            (0..num_cells)
                .flat_map(|key| self.cell_neighbor_lists(key, radius_sq))
                .unzip()
        };

        // Cells are visited in key order and their ranges tile the sorted
        // buffer, so list i belongs to particle i.
        debug_assert_eq!(dists.len(), self.len());
        debug!(
            total_neighbors = indices.iter().map(Vec::len).sum::<usize>(),
            "neighbor lists built"
        );
        (dists, indices)
    }

    /// Lists for every particle of one cell, sharing a single candidate set.
    fn cell_neighbor_lists(&self, key: usize, radius_sq: f64) -> Vec<(Vec<f64>, Vec<usize>)> {
        let range = self.cell_range(key);
        if range.is_empty() {
            return Vec::new();
        }

        let (cx, cy) = self.geometry().coords_of_key(key);
        let mut candidates = Vec::with_capacity(config::get_candidate_capacity());
        self.find_candidates(cx, cy, &mut candidates);

        range
            .map(|i| {
                let mut dists = Vec::new();
                let mut indices = Vec::new();
                self.filter_by_radius(i, &candidates, radius_sq, &mut dists, &mut indices);
                (dists, indices)
            })
            .collect()
    }
}

/// O(n^2) reference: neighbor lists of every particle within `radius`, self included.
pub fn brute_force_neighbor_lists(particles: &[Point], radius: f64) -> NeighborLists {
    let radius_sq = radius * radius;
    let n = particles.len();
    let mut all_dists = Vec::with_capacity(n);
    let mut all_indices = Vec::with_capacity(n);

    for pos_i in particles {
        let mut dists = Vec::new();
        let mut indices = Vec::new();
        for (j, pos_j) in particles.iter().enumerate() {
            let r_ij = (pos_i - pos_j).norm_squared();
            if r_ij <= radius_sq {
                dists.push(r_ij);
                indices.push(j);
            }
        }
        all_dists.push(dists);
        all_indices.push(indices);
    }
    (all_dists, all_indices)
}
