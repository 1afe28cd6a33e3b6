//! Conversion settings.

use log::LevelFilter;
use vitzarr_anndata::sc_embed::{NeighborsParams, PcaParams, UmapParams};

/// Default number of variables per X chunk.
pub const DEFAULT_CHUNK_SIZE: usize = 10;

/// Settings for [`convert`](crate::convert).
#[derive(Debug, Clone)]
pub struct ConvertOptions {
    /// Compute `X_pca` and `X_umap` when they are missing.
    pub compute_embeddings: bool,
    /// Variables per X chunk; each chunk spans all observations.
    pub chunk_size: usize,
    /// `var` column to promote to the variable index.
    pub var_index: Option<String>,
    /// Highest level of messages to emit while converting, including those
    /// from loading, embedding and writing. Applies to the converting thread
    /// for this call only; the process-wide logger is left untouched.
    pub verbosity: LevelFilter,
    pub pca: PcaParams,
    pub neighbors: NeighborsParams,
    pub umap: UmapParams,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self {
            compute_embeddings: false,
            chunk_size: DEFAULT_CHUNK_SIZE,
            var_index: None,
            verbosity: LevelFilter::Warn,
            pca: PcaParams::default(),
            neighbors: NeighborsParams::default(),
            umap: UmapParams::default(),
        }
    }
}

impl ConvertOptions {
    pub fn with_embeddings(mut self, compute: bool) -> Self {
        self.compute_embeddings = compute;
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn with_var_index(mut self, column: impl Into<String>) -> Self {
        self.var_index = Some(column.into());
        self
    }

    pub fn with_verbosity(mut self, verbosity: LevelFilter) -> Self {
        self.verbosity = verbosity;
        self
    }
}
