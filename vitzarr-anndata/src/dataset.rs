//! AnnData container for single-cell data.
//!
//! # Structure
//!
//! - `X` — primary matrix (observations × variables), dense or sparse
//! - `obs` / `var` — annotation tables indexed by observation / variable names
//! - `obsm` / `varm` — multi-dimensional annotations (e.g. `X_pca`, `PCs`)
//! - `obsp` — pairwise observation graphs (e.g. kNN `connectivities`)
//! - `layers` — alternative matrices with the shape of `X`
//! - `uns` — unstructured values, flattened to 1-D columns
//! - `raw` — an optional unfiltered snapshot of `X` and `var`
//!
//! # Example
//!
//! ```
//! use ndarray::array;
//! use vitzarr_anndata::{AnnData, MatrixData};
//!
//! let adata = AnnData::from_names(
//!     MatrixData::Dense(array![[1.0, 2.0], [3.0, 4.0]]),
//!     vec!["cell_1".into(), "cell_2".into()],
//!     vec!["gene_a".into(), "gene_b".into()],
//! ).unwrap();
//! assert_eq!(adata.shape(), (2, 2));
//! ```

use indexmap::IndexMap;
use sprs::CsMat;

use vitzarr_core::{Result, Summarizable, VitzarrError};

use crate::array::{DenseArray, Embedding};
use crate::dtype::DTypeKind;
use crate::frame::{Column, DataFrame, Index};
use crate::matrix::MatrixData;

/// Unfiltered snapshot kept alongside the processed matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct Raw {
    pub x: MatrixData,
    pub var: DataFrame,
}

/// Annotated data matrix.
#[derive(Debug, Clone)]
pub struct AnnData {
    x: MatrixData,
    /// On-disk element type of `X` (`float32` or `float64`).
    x_dtype: DTypeKind,
    obs: DataFrame,
    var: DataFrame,
    obsm: IndexMap<String, Embedding>,
    varm: IndexMap<String, DenseArray>,
    obsp: IndexMap<String, CsMat<f64>>,
    layers: IndexMap<String, MatrixData>,
    uns: IndexMap<String, Column>,
    raw: Option<Raw>,
}

impl AnnData {
    /// Create a container from a matrix and its annotation tables.
    ///
    /// # Errors
    ///
    /// Returns an error if the table lengths don't match the matrix shape.
    pub fn new(x: MatrixData, obs: DataFrame, var: DataFrame) -> Result<Self> {
        let (n_obs, n_vars) = x.shape();
        if obs.len() != n_obs {
            return Err(VitzarrError::InvalidInput(format!(
                "obs length ({}) does not match n_obs ({})",
                obs.len(),
                n_obs
            )));
        }
        if var.len() != n_vars {
            return Err(VitzarrError::InvalidInput(format!(
                "var length ({}) does not match n_vars ({})",
                var.len(),
                n_vars
            )));
        }
        Ok(Self {
            x,
            x_dtype: DTypeKind::Float32,
            obs,
            var,
            obsm: IndexMap::new(),
            varm: IndexMap::new(),
            obsp: IndexMap::new(),
            layers: IndexMap::new(),
            uns: IndexMap::new(),
            raw: None,
        })
    }

    /// Create a container with string-indexed, column-less `obs` and `var`.
    pub fn from_names(x: MatrixData, obs_names: Vec<String>, var_names: Vec<String>) -> Result<Self> {
        Self::new(
            x,
            DataFrame::new(Index::from_strings(obs_names)),
            DataFrame::new(Index::from_strings(var_names)),
        )
    }

    /// Number of observations (cells).
    pub fn n_obs(&self) -> usize {
        self.obs.len()
    }

    /// Number of variables (genes).
    pub fn n_vars(&self) -> usize {
        self.var.len()
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.n_obs(), self.n_vars())
    }

    pub fn x(&self) -> &MatrixData {
        &self.x
    }

    /// Replace `X`; the shape must not change.
    pub fn set_x(&mut self, x: MatrixData) -> Result<()> {
        if x.shape() != self.shape() {
            return Err(VitzarrError::InvalidInput(format!(
                "new X shape {:?} does not match {:?}",
                x.shape(),
                self.shape()
            )));
        }
        self.x = x;
        Ok(())
    }

    pub fn x_dtype(&self) -> DTypeKind {
        self.x_dtype
    }

    /// Set the on-disk element type of `X`. Only float kinds are accepted.
    pub fn set_x_dtype(&mut self, kind: DTypeKind) -> Result<()> {
        if !kind.is_float() {
            return Err(VitzarrError::InvalidInput(format!(
                "X is stored as float32 or float64, not {kind}"
            )));
        }
        self.x_dtype = kind;
        Ok(())
    }

    /// Make `X` dense. Returns `true` if it was sparse.
    pub fn densify_x(&mut self) -> bool {
        if !self.x.is_sparse() {
            return false;
        }
        let x = std::mem::replace(&mut self.x, MatrixData::Dense(ndarray::Array2::zeros((0, 0))));
        self.x = MatrixData::Dense(x.into_dense());
        true
    }

    pub fn obs(&self) -> &DataFrame {
        &self.obs
    }

    /// Mutable `obs`. Callers must keep the row count.
    pub fn obs_mut(&mut self) -> &mut DataFrame {
        &mut self.obs
    }

    pub fn var(&self) -> &DataFrame {
        &self.var
    }

    /// Mutable `var`. Callers must keep the row count.
    pub fn var_mut(&mut self) -> &mut DataFrame {
        &mut self.var
    }

    pub fn obs_names(&self) -> Vec<String> {
        self.obs.index().to_strings()
    }

    pub fn var_names(&self) -> Vec<String> {
        self.var.index().to_strings()
    }

    pub fn add_obs_column(&mut self, key: &str, col: Column) -> Result<()> {
        self.obs.add_column(key, col)
    }

    pub fn add_var_column(&mut self, key: &str, col: Column) -> Result<()> {
        self.var.add_column(key, col)
    }

    /// Rename repeated variable names with `-1`, `-2`, ... suffixes.
    /// Returns the number of renamed variables.
    pub fn var_names_make_unique(&mut self) -> usize {
        self.var.index_mut().make_unique("-")
    }

    // -- obsm ---------------------------------------------------------------

    pub fn obsm(&self) -> &IndexMap<String, Embedding> {
        &self.obsm
    }

    pub fn get_obsm(&self, key: &str) -> Option<&Embedding> {
        self.obsm.get(key)
    }

    /// Add an observation embedding; it must have one row per observation.
    pub fn add_obsm(&mut self, key: &str, data: impl Into<Embedding>) -> Result<()> {
        let data = data.into();
        if data.nrows() != self.n_obs() {
            return Err(VitzarrError::InvalidInput(format!(
                "obsm '{}' rows ({}) do not match n_obs ({})",
                key,
                data.nrows(),
                self.n_obs()
            )));
        }
        self.obsm.insert(key.to_string(), data);
        Ok(())
    }

    /// Rewrite `obsm` entries through `f`, keeping keys and order. `f`
    /// returns `None` to leave an entry as it is. `obsm` is only modified
    /// once every call has succeeded.
    pub fn try_map_obsm<F>(&mut self, mut f: F) -> Result<()>
    where
        F: FnMut(&str, &Embedding) -> Result<Option<Embedding>>,
    {
        let n_obs = self.n_obs();
        let mut replaced = Vec::new();
        for (i, (key, entry)) in self.obsm.iter().enumerate() {
            let Some(mapped) = f(key, entry)? else {
                continue;
            };
            if mapped.nrows() != n_obs {
                return Err(VitzarrError::InvalidInput(format!(
                    "obsm '{}' changed to {} rows (expected {})",
                    key,
                    mapped.nrows(),
                    n_obs
                )));
            }
            replaced.push((i, mapped));
        }
        for (i, mapped) in replaced {
            self.obsm[i] = mapped;
        }
        Ok(())
    }

    // -- varm ---------------------------------------------------------------

    pub fn varm(&self) -> &IndexMap<String, DenseArray> {
        &self.varm
    }

    pub fn get_varm(&self, key: &str) -> Option<&DenseArray> {
        self.varm.get(key)
    }

    pub fn add_varm(&mut self, key: &str, data: DenseArray) -> Result<()> {
        if data.nrows() != self.n_vars() {
            return Err(VitzarrError::InvalidInput(format!(
                "varm '{}' rows ({}) do not match n_vars ({})",
                key,
                data.nrows(),
                self.n_vars()
            )));
        }
        self.varm.insert(key.to_string(), data);
        Ok(())
    }

    // -- obsp ---------------------------------------------------------------

    pub fn obsp(&self) -> &IndexMap<String, CsMat<f64>> {
        &self.obsp
    }

    pub fn get_obsp(&self, key: &str) -> Option<&CsMat<f64>> {
        self.obsp.get(key)
    }

    /// Add a pairwise observation matrix of shape `(n_obs, n_obs)`.
    pub fn add_obsp(&mut self, key: &str, matrix: CsMat<f64>) -> Result<()> {
        let n = self.n_obs();
        if matrix.rows() != n || matrix.cols() != n {
            return Err(VitzarrError::InvalidInput(format!(
                "obsp '{}' shape ({}, {}) is not ({n}, {n})",
                key,
                matrix.rows(),
                matrix.cols()
            )));
        }
        self.obsp.insert(key.to_string(), matrix);
        Ok(())
    }

    // -- layers -------------------------------------------------------------

    pub fn layers(&self) -> &IndexMap<String, MatrixData> {
        &self.layers
    }

    pub fn get_layer(&self, key: &str) -> Option<&MatrixData> {
        self.layers.get(key)
    }

    pub fn add_layer(&mut self, key: &str, layer: MatrixData) -> Result<()> {
        if layer.shape() != self.shape() {
            return Err(VitzarrError::InvalidInput(format!(
                "layer '{}' shape {:?} does not match {:?}",
                key,
                layer.shape(),
                self.shape()
            )));
        }
        self.layers.insert(key.to_string(), layer);
        Ok(())
    }

    // -- uns ----------------------------------------------------------------

    pub fn uns(&self) -> &IndexMap<String, Column> {
        &self.uns
    }

    pub fn get_uns(&self, key: &str) -> Option<&Column> {
        self.uns.get(key)
    }

    pub fn add_uns(&mut self, key: &str, value: impl Into<Column>) {
        self.uns.insert(key.to_string(), value.into());
    }

    // -- raw ----------------------------------------------------------------

    pub fn raw(&self) -> Option<&Raw> {
        self.raw.as_ref()
    }

    /// Attach an unfiltered snapshot; its row count must match `n_obs`.
    pub fn set_raw(&mut self, raw: Raw) -> Result<()> {
        let (rows, cols) = raw.x.shape();
        if rows != self.n_obs() || cols != raw.var.len() {
            return Err(VitzarrError::InvalidInput(format!(
                "raw X shape ({rows}, {cols}) does not match {} obs and {} raw vars",
                self.n_obs(),
                raw.var.len()
            )));
        }
        self.raw = Some(raw);
        Ok(())
    }

    pub fn take_raw(&mut self) -> Option<Raw> {
        self.raw.take()
    }
}

impl Summarizable for AnnData {
    fn summary(&self) -> String {
        format!(
            "AnnData: {} obs \u{00d7} {} vars ({}{}), {} obs columns, {} var columns, \
             {} obsm, {} varm, {} obsp, {} layers, {} uns{}",
            self.n_obs(),
            self.n_vars(),
            if self.x.is_sparse() { "sparse " } else { "" },
            self.x_dtype,
            self.obs.n_columns(),
            self.var.n_columns(),
            self.obsm.len(),
            self.varm.len(),
            self.obsp.len(),
            self.layers.len(),
            self.uns.len(),
            if self.raw.is_some() { ", raw" } else { "" },
        )
    }
}
