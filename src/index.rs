use crate::config;
use crate::error::GridError;
use crate::geometry::{GridGeometry, Point};
use crate::sort::{PairSort, ParallelSort};
use rayon::prelude::*;
use std::ops::Range;
use tracing::{debug, info_span};

const UNSET: usize = usize::MAX;

/// Uniform-grid bucket index over a caller-owned particle buffer.
///
/// Rebinning sorts the buffer by cell key in place and derives where each
/// cell's run of particles starts. There is no per-cell count array: a cell
/// ends where the next one starts.
pub struct GridIndex<S: PairSort = ParallelSort> {
    geometry: GridGeometry,
    sorter: S,
    /// keys[sorted_idx] = cell key of particles[sorted_idx]
    keys: Vec<usize>,
    /// bucket_starts[key] = first sorted index whose key is >= `key`
    bucket_starts: Vec<usize>,
    n_binned: Option<usize>,
}

impl GridIndex<ParallelSort> {
    pub fn new(width: f64, height: f64, cell_size: f64) -> Result<Self, GridError> {
        Self::with_sorter(width, height, cell_size, ParallelSort)
    }
}

impl<S: PairSort> GridIndex<S> {
    pub fn with_sorter(
        width: f64,
        height: f64,
        cell_size: f64,
        sorter: S,
    ) -> Result<Self, GridError> {
        let geometry = GridGeometry::new(width, height, cell_size)?;
        let num_cells = geometry.num_cells();
        let mut bucket_starts = Vec::new();
        bucket_starts
            .try_reserve_exact(num_cells)
            .map_err(|_| GridError::InvalidDimensions {
                width,
                height,
                cell_size,
            })?;
        bucket_starts.resize(num_cells, 0);
        Ok(Self {
            geometry,
            sorter,
            keys: Vec::new(),
            bucket_starts,
            n_binned: None,
        })
    }

    pub fn geometry(&self) -> &GridGeometry {
        &self.geometry
    }

    /// Reorders `particles` so that every cell's particles are contiguous and
    /// rebuilds the bucket table. The returned view answers queries against
    /// this arrangement.
    ///
    /// On error `particles` is left untouched and the previous binning, if
    /// any, stays valid.
    pub fn rebin<'a>(&'a mut self, particles: &'a mut [Point]) -> Result<Binning<'a>, GridError> {
        let _span = info_span!("GridIndex::rebin", n_particles = particles.len()).entered();

        if particles.is_empty() {
            return Err(GridError::EmptyParticles);
        }
        let n = particles.len();
        let parallel = config::use_parallel(n);

        // 1. Cell key per particle
        {
            let _s = info_span!("compute_keys").entered();
            let geometry = &self.geometry;
            self.keys.clear();
            self.keys.resize(n, 0);
            if parallel {
                self.keys
                    .par_iter_mut()
                    .zip(particles.par_iter())
                    .try_for_each(|(k, p)| {
                        *k = geometry.key(p)?;
                        Ok::<(), GridError>(())
                    })?;
            } else {
                for (k, p) in self.keys.iter_mut().zip(particles.iter()) {
                    *k = geometry.key(p)?;
                }
            }
        }

        // Keys are valid; from here the old table is overwritten
        self.n_binned = None;

        // 2. Group particles by key
        {
            let _s = info_span!("sort_pairs").entered();
            self.sorter
                .sort_pairs(&mut self.keys, particles, self.geometry.num_cells());
        }

        // 3. Bucket starts
        let occupied = {
            let _s = info_span!("bucket_starts").entered();
            self.fill_bucket_starts(parallel)
        };
        debug!(n_particles = n, occupied_cells = occupied, "rebinned");

        self.n_binned = Some(n);
        Ok(Binning {
            geometry: &self.geometry,
            bucket_starts: &self.bucket_starts,
            particles,
        })
    }

    /// Re-attaches to a buffer that was arranged by the last successful
    /// [`rebin`](Self::rebin) and not reordered since.
    pub fn view<'a>(&'a self, particles: &'a [Point]) -> Result<Binning<'a>, GridError> {
        let expected = self.n_binned.ok_or(GridError::NotBinned)?;
        if particles.len() != expected {
            return Err(GridError::ParticleCountMismatch {
                expected,
                actual: particles.len(),
            });
        }
        Ok(Binning {
            geometry: &self.geometry,
            bucket_starts: &self.bucket_starts,
            particles,
        })
    }

    /// Writes a start at every key transition of the sorted key array, then
    /// fills each empty cell with the start of the next occupied cell (or the
    /// particle count past the last one). Returns the number of occupied cells.
    fn fill_bucket_starts(&mut self, parallel: bool) -> usize {
        let keys = &self.keys;
        let n = keys.len();

        let transitions: Vec<(usize, usize)> = if parallel {
            (1..n)
                .into_par_iter()
                .filter(|&i| keys[i - 1] != keys[i])
                .map(|i| (keys[i], i))
                .collect()
        } else {
            (1..n)
                .filter(|&i| keys[i - 1] != keys[i])
                .map(|i| (keys[i], i))
                .collect()
        };

        let starts = &mut self.bucket_starts;
        if parallel {
            starts.par_iter_mut().for_each(|s| *s = UNSET);
        } else {
            starts.fill(UNSET);
        }

        starts[keys[0]] = 0;
        for &(key, i) in &transitions {
            starts[key] = i;
        }

        let mut next = n;
        for slot in starts.iter_mut().rev() {
            if *slot == UNSET {
                *slot = next;
            } else {
                next = *slot;
            }
        }

        transitions.len() + 1
    }
}

/// Read-only view of a rebinned particle buffer.
#[derive(Clone, Copy)]
pub struct Binning<'a> {
    geometry: &'a GridGeometry,
    bucket_starts: &'a [usize],
    particles: &'a [Point],
}

impl<'a> Binning<'a> {
    pub fn geometry(&self) -> &'a GridGeometry {
        self.geometry
    }

    /// Particles in sorted order. Indices returned by queries refer to this slice.
    pub fn particles(&self) -> &'a [Point] {
        self.particles
    }

    pub fn len(&self) -> usize {
        self.particles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.particles.is_empty()
    }

    /// Range of sorted indices belonging to cell `key`. Empty cells yield an
    /// empty range.
    pub fn cell(&self, key: usize) -> Result<Range<usize>, GridError> {
        let cells = self.bucket_starts.len();
        if key >= cells {
            return Err(GridError::KeyOutOfRange { key, cells });
        }
        Ok(self.cell_range(key))
    }

    /// Range of sorted indices in the cell containing `p`.
    pub fn cell_of(&self, p: &Point) -> Result<Range<usize>, GridError> {
        let key = self.geometry.key(p)?;
        Ok(self.cell_range(key))
    }

    /// All `(key, range)` pairs, occupied or not, in key order.
    pub fn cells(&self) -> impl Iterator<Item = (usize, Range<usize>)> + '_ {
        (0..self.bucket_starts.len()).map(move |key| (key, self.cell_range(key)))
    }

    pub fn particles_in(&self, key: usize) -> Result<&'a [Point], GridError> {
        let range = self.cell(key)?;
        Ok(&self.particles[range])
    }

    /// Particles sharing `p`'s cell. Adjacent cells are not searched.
    pub fn neighbors_of(&self, p: &Point) -> Result<Vec<Point>, GridError> {
        let range = self.cell_of(p)?;
        Ok(self.particles[range].to_vec())
    }

    /// Sorted index of the particle closest to `p` within `p`'s own cell.
    /// Ties go to the lowest index.
    pub fn nearest(&self, p: &Point) -> Result<usize, GridError> {
        let key = self.geometry.key(p)?;
        let range = self.cell_range(key);
        if range.is_empty() {
            return Err(GridError::EmptyCell { key });
        }

        let mut nearest = range.start;
        let mut dist = (self.particles[range.start] - p).norm_squared();
        for i in range.start + 1..range.end {
            let d = (self.particles[i] - p).norm_squared();
            if d < dist {
                dist = d;
                nearest = i;
            }
        }
        Ok(nearest)
    }

    pub(crate) fn cell_range(&self, key: usize) -> Range<usize> {
        let start = self.bucket_starts[key];
        let stop = self
            .bucket_starts
            .get(key + 1)
            .copied()
            .unwrap_or(self.particles.len());
        start..stop
    }
}
