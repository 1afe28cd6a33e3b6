//! Numeric building blocks for single-cell embeddings.
//!
//! - **Distances** — Euclidean, Manhattan and cosine metrics
//! - **PCA** — exact (Jacobi) and matrix-free power-iteration solvers
//! - **Neighbors** — exact kNN graphs and UMAP fuzzy simplicial sets
//! - **UMAP** — SGD layout of a fuzzy neighbor graph

pub mod distance;
pub mod neighbors;
pub mod reduction;
pub mod umap;

pub use distance::DistanceMetric;
pub use neighbors::{fuzzy_simplicial_set, knn_graph, Edge, FuzzyGraph, KnnGraph};
pub use reduction::{pca, PcaConfig, PcaResult, PcaSolver};
pub use umap::{umap, umap_layout, UmapConfig, UmapInit, UmapResult};
