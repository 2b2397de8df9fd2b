//! Error types shared by the storage layer and the engine façade.

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, DbError>;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("capacity exceeded: file was created for {capacity} rows")]
    CapacityExceeded { capacity: u64 },

    #[error("slot out of bounds: {slot} >= {count}")]
    SlotOutOfBounds { slot: u64, count: u64 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
