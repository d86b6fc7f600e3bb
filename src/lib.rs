//! Uniform-grid spatial index for fixed-radius neighbor queries over 2D
//! particles.
//!
//! A [`GridIndex`] buckets particles into square cells by sorting the
//! caller's buffer by cell key. The resulting [`Binning`] answers per-cell
//! queries and builds per-particle neighbor lists from each cell's 3x3
//! neighborhood, which [`flatten()`] packs into flat buffers.

pub mod config;
pub mod error;
pub mod flatten;
pub mod geometry;
pub mod index;
pub mod search;
pub mod sort;

#[cfg(feature = "python")]
pub mod python_api;

#[cfg(feature = "dhat-heap")]
#[global_allocator]
static ALLOC: dhat::Alloc = dhat::Alloc;

pub use error::GridError;
pub use flatten::{FlatNeighbors, flatten};
pub use geometry::{GridGeometry, Point};
pub use index::{Binning, GridIndex};
pub use search::{NeighborLists, brute_force_neighbor_lists};
pub use sort::{CountingSort, PairSort, ParallelSort, SortBackend};

use tracing_subscriber::EnvFilter;

/// Installs a global `tracing` subscriber. `RUST_LOG` takes precedence over
/// `level`, which defaults to `info`. Later calls are ignored.
pub fn init_logging(level: Option<&str>) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.unwrap_or("info")));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_span_events(tracing_subscriber::fmt::format::FmtSpan::CLOSE)
        .with_thread_ids(true)
        .try_init();
}
