//! Structured error types for the vitzarr workspace.

use thiserror::Error;

/// Unified error type for all vitzarr operations.
#[derive(Debug, Error)]
pub enum VitzarrError {
    /// I/O error (file not found, permission denied, etc.)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Parse error (malformed or unsupported source data)
    #[error("parse error: {0}")]
    Parse(String),

    /// Invalid input (bad arguments, out-of-range values, shape mismatches)
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Neither a source file nor an in-memory dataset was supplied
    #[error("missing input: {0}")]
    MissingInput(String),

    /// Failure reported by the HDF5 library
    #[error("HDF5 error: {0}")]
    Hdf5(String),

    /// Failure reported by the zarr store or codec pipeline
    #[error("zarr error: {0}")]
    Zarr(String),

    /// A numeric routine (PCA, neighbor graph, UMAP) could not run
    #[error("computation error: {0}")]
    Compute(String),

    /// Catch-all for other errors
    #[error("{0}")]
    Other(String),
}

/// Convenience alias used throughout the vitzarr workspace.
pub type Result<T> = std::result::Result<T, VitzarrError>;
