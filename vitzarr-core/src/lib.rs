//! Shared primitives for the vitzarr h5ad → zarr conversion workspace.
//!
//! `vitzarr-core` provides the foundation the other crates build on:
//!
//! - **Error types** — [`VitzarrError`] and [`Result`] for structured error handling
//! - **Traits** — [`Summarizable`] for one-line descriptions of datasets and results
//! - **Verbosity** — [`verbosity::scoped`] and the [`warn!`], [`info!`], [`debug!`]
//!   macros that respect it

pub mod error;
pub mod traits;
pub mod verbosity;

pub use error::{Result, VitzarrError};
pub use traits::*;
