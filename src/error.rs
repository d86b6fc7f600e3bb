use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GridError {
    #[error("Grid dimensions must be positive and finite (width={width}, height={height}, cell_size={cell_size})")]
    InvalidDimensions {
        width: f64,
        height: f64,
        cell_size: f64,
    },
    #[error("Point ({x}, {y}) lies outside the grid domain")]
    OutOfBounds { x: f64, y: f64 },
    #[error("Cannot bin an empty particle set")]
    EmptyParticles,
    #[error("Grid has not been binned yet")]
    NotBinned,
    #[error("Expected {expected} particles from the last rebin, got {actual}")]
    ParticleCountMismatch { expected: usize, actual: usize },
    #[error("Cell key {key} out of range for a grid of {cells} cells")]
    KeyOutOfRange { key: usize, cells: usize },
    #[error("Cell {key} holds no particles")]
    EmptyCell { key: usize },
    #[error("Search radius {radius} must be positive and at most the cell size {cell_size}")]
    InvalidRadius { radius: f64, cell_size: f64 },
    #[error("Got {distances} distance lists but {indices} index lists")]
    ListCountMismatch { distances: usize, indices: usize },
    #[error("Particle {particle} has {distances} distances but {indices} indices")]
    ListLengthMismatch {
        particle: usize,
        distances: usize,
        indices: usize,
    },
}
