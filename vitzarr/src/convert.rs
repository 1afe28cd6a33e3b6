//! The h5ad → zarr conversion pipeline.

use std::path::{Path, PathBuf};

use vitzarr_anndata::sc_embed;
use vitzarr_anndata::{read_h5ad, write_zarr, AnnData};
use vitzarr_core::{debug, info, verbosity, warn};
use vitzarr_core::{Result, Summarizable, VitzarrError};

use crate::coerce;
use crate::options::ConvertOptions;

/// Appended to the output stem.
pub const SUFFIX: &str = "anndata.zarr";

/// Where the dataset comes from.
#[derive(Debug)]
pub enum Source {
    /// An h5ad file to load.
    Path(PathBuf),
    /// A dataset already in memory.
    Dataset(AnnData),
}

impl Source {
    /// Prefer an in-memory dataset; fall back to the file.
    pub fn from_parts(file: Option<PathBuf>, adata: Option<AnnData>) -> Result<Self> {
        match (adata, file) {
            (Some(adata), _) => Ok(Source::Dataset(adata)),
            (None, Some(file)) => Ok(Source::Path(file)),
            (None, None) => Err(VitzarrError::MissingInput(
                "either an h5ad file or a dataset is required".into(),
            )),
        }
    }

    fn load(self) -> Result<AnnData> {
        match self {
            Source::Dataset(adata) => Ok(adata),
            Source::Path(path) => read_h5ad(&path),
        }
    }
}

impl From<AnnData> for Source {
    fn from(adata: AnnData) -> Self {
        Source::Dataset(adata)
    }
}

impl From<PathBuf> for Source {
    fn from(path: PathBuf) -> Self {
        Source::Path(path)
    }
}

impl From<&Path> for Source {
    fn from(path: &Path) -> Self {
        Source::Path(path.to_path_buf())
    }
}

/// `{stem}_anndata.zarr`.
pub fn output_path(stem: &str) -> PathBuf {
    PathBuf::from(format!("{stem}_{SUFFIX}"))
}

/// Convert `source` into a Vitessce-ready zarr store at [`output_path`].
///
/// The dataset is normalized in this order: variable index, observation
/// index, embedding containers, optional embeddings, obs dtypes, obsm dtypes,
/// dense `X`, no `raw`. An existing store at the output path is replaced.
///
/// # Errors
///
/// Fails if the source cannot be loaded, if `chunk_size` is zero, if an
/// embedding cannot be computed, or if the store cannot be written.
///
/// Messages from every stage, including h5ad loading and embedding
/// computation, are limited to `options.verbosity` for the duration of the
/// call on the calling thread.
pub fn convert(source: Source, stem: &str, options: &ConvertOptions) -> Result<PathBuf> {
    if options.chunk_size == 0 {
        return Err(VitzarrError::InvalidInput("chunk_size must be > 0".into()));
    }
    let _verbosity = verbosity::scoped(options.verbosity);

    let mut adata = source.load()?;
    info!("loaded {}", adata.summary());

    if let Some(column) = options.var_index.as_deref() {
        if coerce::promote_var_index(&mut adata, column)? {
            debug!("var index set from column '{column}'");
        } else {
            debug!("var has no column '{column}', index kept");
        }
    }
    let renamed = adata.var_names_make_unique();
    if renamed > 0 {
        warn!("made {renamed} duplicate var names unique");
    }

    if coerce::normalize_obs_index(&mut adata)? {
        debug!("obs index replaced by codes, labels kept in '{}'", coerce::LABEL_COLUMN);
    }

    for key in coerce::embeddings_to_arrays(&mut adata)? {
        debug!("obsm '{key}' converted to an array");
    }

    if options.compute_embeddings {
        compute_embeddings(&mut adata, options)?;
    }

    for (name, from, to) in coerce::coerce_obs_dtypes(&mut adata)? {
        debug!("obs '{name}': {from} -> {to}");
    }
    for (key, from, to) in coerce::coerce_obsm_dtypes(&mut adata)? {
        debug!("obsm '{key}': {from} -> {to}");
    }

    if adata.densify_x() {
        debug!("X densified");
    }
    if adata.take_raw().is_some() {
        debug!("raw removed");
    }

    let path = output_path(stem);
    let chunks = [adata.n_obs() as u64, options.chunk_size as u64];
    write_zarr(&adata, &path, Some(chunks))?;
    info!("wrote {} (X chunks {:?})", path.display(), chunks);
    Ok(path)
}

fn compute_embeddings(adata: &mut AnnData, options: &ConvertOptions) -> Result<()> {
    if adata.get_obsm("X_pca").is_none() {
        info!("computing X_pca");
        sc_embed::pca(adata, &options.pca)?;
    }
    if adata.get_obsm("X_umap").is_none() {
        info!("computing neighbors and X_umap");
        sc_embed::neighbors(adata, &options.neighbors)?;
        sc_embed::umap(adata, &options.umap)?;
    }
    Ok(())
}

/// Flat entry point: a file or an in-memory dataset, plus the conversion
/// knobs. Returns the written store path.
pub fn h5ad_to_zarr(
    file: Option<PathBuf>,
    stem: &str,
    adata: Option<AnnData>,
    compute_embeddings: bool,
    chunk_size: usize,
    var_index: Option<String>,
) -> Result<PathBuf> {
    let options = ConvertOptions {
        compute_embeddings,
        chunk_size,
        var_index,
        ..ConvertOptions::default()
    };
    convert(Source::from_parts(file, adata)?, stem, &options)
}
