//! Annotated data matrices for the vitzarr converter.
//!
//! This crate provides an in-memory AnnData model and its persistence:
//!
//! - **Dataset** — [`AnnData`] with `X`, `obs`/`var` frames, `obsm`, `varm`,
//!   `obsp`, `layers`, `uns` and `raw`
//! - **Frames** — typed [`Column`]s, [`Index`] labels and [`DataFrame`]
//! - **Dtypes** — [`DTypeKind`] classification shared by every coercion step
//! - **h5ad** — HDF5 reader and writer (feature `h5ad`)
//! - **zarr** — chunked Zarr v2 store reader and writer (feature `zarr`)
//! - **Embeddings** — PCA, neighbor graph and UMAP (feature `single-cell`)
//!
//! # Quick start
//!
//! ```
//! use ndarray::array;
//! use vitzarr_anndata::{AnnData, MatrixData};
//! use vitzarr_core::Summarizable;
//!
//! let adata = AnnData::from_names(
//!     MatrixData::Dense(array![[1.0, 0.0], [0.0, 2.0], [3.0, 0.0]]),
//!     vec!["c1".into(), "c2".into(), "c3".into()],
//!     vec!["g1".into(), "g2".into()],
//! ).unwrap();
//!
//! assert_eq!(adata.shape(), (3, 2));
//! assert!(adata.summary().starts_with("AnnData: 3 obs \u{00d7} 2 vars"));
//! ```

pub mod array;
pub mod dataset;
pub mod dtype;
pub mod encoding;
pub mod frame;
pub mod matrix;
#[cfg(feature = "h5ad")]
pub mod h5ad;
#[cfg(feature = "zarr")]
pub mod zarr;
#[cfg(feature = "single-cell")]
pub mod sc_embed;

pub use array::{DenseArray, Embedding};
pub use dataset::{AnnData, Raw};
pub use dtype::DTypeKind;
pub use frame::{Column, DataFrame, Index, IndexValues};
pub use matrix::MatrixData;
#[cfg(feature = "h5ad")]
pub use h5ad::{read_h5ad, write_h5ad};
#[cfg(feature = "zarr")]
pub use zarr::{read_zarr, write_zarr};
