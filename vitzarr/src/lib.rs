//! Convert h5ad single-cell datasets into AnnData zarr stores that the
//! Vitessce viewer can load.
//!
//! The conversion normalizes the dataset before writing it:
//!
//! - variable names become unique strings, optionally taken from a `var` column
//! - a non-numeric observation index is replaced by categorical codes, with the
//!   original labels kept in `label_id`
//! - `int8`/`int64` obs columns become `int32`, booleans become categoricals
//! - embeddings become plain arrays; `spatial` is stored as `int32`
//! - `X` is densified and chunked as `(n_obs, chunk_size)`; `raw` is dropped
//!
//! PCA and UMAP embeddings can be computed when missing.
//!
//! ```no_run
//! use vitzarr::{convert, ConvertOptions, Source};
//!
//! let options = ConvertOptions::default().with_embeddings(true);
//! let path = convert(Source::Path("pbmc3k.h5ad".into()), "out/pbmc3k", &options)?;
//! assert!(path.ends_with("pbmc3k_anndata.zarr"));
//! # Ok::<(), vitzarr_core::VitzarrError>(())
//! ```

pub mod coerce;
pub mod convert;
pub mod options;

pub use convert::{convert, h5ad_to_zarr, output_path, Source, SUFFIX};
pub use options::ConvertOptions;
