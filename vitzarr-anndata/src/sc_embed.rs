//! Dataset-level embeddings: PCA, neighbor graph and UMAP.
//!
//! Each tool reads from and writes back into an [`AnnData`] using the slot
//! names single-cell viewers expect (`X_pca`, `PCs`, `distances`,
//! `connectivities`, `X_umap`).

use ndarray::{s, Array2};
use sprs::CsMat;

use vitzarr_core::{Result, VitzarrError};
use vitzarr_ml::{
    knn_graph, fuzzy_simplicial_set, reduction, umap_layout, DistanceMetric, Edge, FuzzyGraph,
    PcaConfig, PcaSolver, UmapConfig, UmapInit,
};

use crate::array::DenseArray;
use crate::dataset::AnnData;
use crate::matrix::csr_from_triplets;

/// Above this many variables, neighbors computes PCA instead of using `X`.
pub const MAX_RAW_FEATURES: usize = 50;
/// Up to this many observations, UMAP runs the longer epoch schedule.
pub const LONG_SCHEDULE_MAX_OBS: usize = 10_000;

fn compute_err(step: &str) -> impl Fn(VitzarrError) -> VitzarrError + '_ {
    move |e| VitzarrError::Compute(format!("{step}: {e}"))
}

// ── PCA ────────────────────────────────────────────────────────────────────

/// Configuration for [`pca`].
#[derive(Debug, Clone)]
pub struct PcaParams {
    /// Requested components; capped at `min(n_obs, n_vars) - 1`.
    pub n_comps: usize,
    pub max_iter: usize,
    pub tolerance: f64,
    pub solver: PcaSolver,
}

impl Default for PcaParams {
    fn default() -> Self {
        Self {
            n_comps: 50,
            max_iter: 1000,
            tolerance: 1e-10,
            solver: PcaSolver::Auto,
        }
    }
}

/// Principal components of `X`.
///
/// Writes `obsm["X_pca"]`, `varm["PCs"]`, `uns["pca_variance"]` and
/// `uns["pca_variance_ratio"]`.
pub fn pca(adata: &mut AnnData, params: &PcaParams) -> Result<()> {
    let (n_obs, n_vars) = adata.shape();
    let limit = n_obs.min(n_vars).saturating_sub(1);
    let n_comps = params.n_comps.min(limit);
    if n_comps == 0 {
        return Err(VitzarrError::Compute(format!(
            "pca: cannot compute components for a {n_obs} x {n_vars} matrix"
        )));
    }
    if n_comps < params.n_comps {
        vitzarr_core::debug!("pca: reducing n_comps from {} to {n_comps}", params.n_comps);
    }

    let x = adata.x().to_dense();
    let config = PcaConfig {
        n_components: n_comps,
        max_iter: params.max_iter,
        tolerance: params.tolerance,
        solver: params.solver,
    };
    let result = reduction::pca(x.view(), &config).map_err(compute_err("pca"))?;
    vitzarr_core::info!(
        "pca: {} components explain {:.1}% of the variance",
        result.n_components,
        100.0 * result.explained_variance_ratio.iter().sum::<f64>()
    );

    adata.add_obsm("X_pca", DenseArray::Float64(result.transformed))?;
    adata.add_varm("PCs", DenseArray::Float64(result.components.t().to_owned()))?;
    adata.add_uns("pca_variance", result.explained_variance);
    adata.add_uns("pca_variance_ratio", result.explained_variance_ratio);
    Ok(())
}

// ── Neighbors ──────────────────────────────────────────────────────────────

/// Configuration for [`neighbors`].
#[derive(Debug, Clone)]
pub struct NeighborsParams {
    /// Neighborhood size, counting the observation itself.
    pub n_neighbors: usize,
    /// Leading `X_pca` columns to use; all when `None`.
    pub n_pcs: Option<usize>,
    pub metric: DistanceMetric,
}

impl Default for NeighborsParams {
    fn default() -> Self {
        Self {
            n_neighbors: 15,
            n_pcs: None,
            metric: DistanceMetric::Euclidean,
        }
    }
}

/// The matrix neighbors are computed on: `X_pca` if present, PCA of `X` for
/// wide matrices, otherwise `X` itself.
fn representation(adata: &mut AnnData, n_pcs: Option<usize>) -> Result<Array2<f64>> {
    if adata.get_obsm("X_pca").is_none() && adata.n_vars() > MAX_RAW_FEATURES {
        vitzarr_core::info!("neighbors: X_pca missing, computing PCA first");
        pca(adata, &PcaParams::default())?;
    }
    match adata.get_obsm("X_pca") {
        Some(entry) => {
            let values = entry.to_array()?.to_f64();
            let n = n_pcs.unwrap_or(values.ncols()).min(values.ncols());
            Ok(values.slice(s![.., ..n]).to_owned())
        }
        None => Ok(adata.x().to_dense()),
    }
}

/// Exact kNN graph and its fuzzy connectivities.
///
/// Writes `obsp["distances"]`, `obsp["connectivities"]`,
/// `uns["neighbors_n_neighbors"]` and `uns["neighbors_metric"]`.
pub fn neighbors(adata: &mut AnnData, params: &NeighborsParams) -> Result<()> {
    let n_obs = adata.n_obs();
    let n_neighbors = params.n_neighbors.min(n_obs);
    if n_neighbors < 2 {
        return Err(VitzarrError::Compute(format!(
            "neighbors: need at least 2 observations and n_neighbors >= 2 (have {n_obs} and {})",
            params.n_neighbors
        )));
    }
    if n_neighbors < params.n_neighbors {
        vitzarr_core::warn!("neighbors: n_neighbors reduced to {n_neighbors} ({n_obs} observations)");
    }

    let data = representation(adata, params.n_pcs)?;
    let knn = knn_graph(data.view(), n_neighbors - 1, params.metric).map_err(compute_err("neighbors"))?;
    let graph = fuzzy_simplicial_set(&knn);

    let distances = csr_from_triplets(
        (n_obs, n_obs),
        knn.indices.iter().zip(&knn.distances).enumerate().flat_map(|(i, (idx, dst))| {
            idx.iter().zip(dst).map(move |(&j, &d)| (i, j, d))
        }),
    );
    let connectivities = csr_from_triplets(
        (n_obs, n_obs),
        graph
            .edges
            .iter()
            .flat_map(|e| [(e.i, e.j, e.weight), (e.j, e.i, e.weight)]),
    );
    vitzarr_core::info!(
        "neighbors: {} observations, k={}, {} connectivity edges",
        n_obs,
        knn.k,
        graph.edges.len()
    );

    adata.add_obsp("distances", distances)?;
    adata.add_obsp("connectivities", connectivities)?;
    adata.add_uns("neighbors_n_neighbors", vec![n_neighbors as i64]);
    adata.add_uns("neighbors_metric", vec![params.metric.name()]);
    Ok(())
}

// ── UMAP ───────────────────────────────────────────────────────────────────

/// Configuration for [`umap`].
#[derive(Debug, Clone)]
pub struct UmapParams {
    pub n_components: usize,
    pub min_dist: f64,
    pub spread: f64,
    /// 500 for up to 10 000 observations, 200 above, when `None`.
    pub n_epochs: Option<usize>,
    pub learning_rate: f64,
    pub negative_sample_rate: usize,
    pub seed: u64,
}

impl Default for UmapParams {
    fn default() -> Self {
        Self {
            n_components: 2,
            min_dist: 0.5,
            spread: 1.0,
            n_epochs: None,
            learning_rate: 1.0,
            negative_sample_rate: 5,
            seed: 0,
        }
    }
}

/// Upper-triangle edges of a symmetric connectivity matrix.
fn graph_from_connectivities(m: &CsMat<f64>) -> FuzzyGraph {
    let edges = m
        .iter()
        .filter(|&(&w, (i, j))| i < j && w > 0.0)
        .map(|(&weight, (i, j))| Edge { i, j, weight })
        .collect();
    FuzzyGraph {
        n_samples: m.rows(),
        edges,
    }
}

/// Lay out the neighbor graph in `n_components` dimensions.
///
/// Requires `obsp["connectivities"]` (run [`neighbors`] first). Writes
/// `obsm["X_umap"]`, `uns["umap_a"]` and `uns["umap_b"]`.
pub fn umap(adata: &mut AnnData, params: &UmapParams) -> Result<()> {
    let connectivities = adata.get_obsp("connectivities").ok_or_else(|| {
        VitzarrError::Compute("umap: obsp['connectivities'] not found; run neighbors first".into())
    })?;
    let graph = graph_from_connectivities(connectivities);
    let n_obs = adata.n_obs();

    let (init, init_data) = match adata.get_obsm("X_pca") {
        Some(entry) => (UmapInit::Pca, entry.to_array()?.to_f64()),
        None => (UmapInit::Random, Array2::zeros((n_obs, params.n_components))),
    };
    let n_epochs = params.n_epochs.unwrap_or(if n_obs <= LONG_SCHEDULE_MAX_OBS {
        500
    } else {
        200
    });
    let config = UmapConfig {
        n_components: params.n_components,
        min_dist: params.min_dist,
        spread: params.spread,
        learning_rate: params.learning_rate,
        n_epochs,
        negative_sample_rate: params.negative_sample_rate,
        init,
        seed: params.seed,
        ..UmapConfig::default()
    };
    let result = umap_layout(&graph, init_data.view(), &config).map_err(compute_err("umap"))?;
    vitzarr_core::info!("umap: {n_obs} observations, {n_epochs} epochs");

    adata.add_obsm("X_umap", DenseArray::Float64(result.embedding))?;
    adata.add_uns("umap_a", vec![result.a]);
    adata.add_uns("umap_b", vec![result.b]);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::array::Embedding;
    use crate::frame::Column;
    use crate::matrix::MatrixData;

    /// Two separated groups of observations over `n_vars` variables.
    fn clustered(n_obs: usize, n_vars: usize) -> AnnData {
        let x = Array2::from_shape_fn((n_obs, n_vars), |(i, j)| {
            let center = if i < n_obs / 2 { 0.0 } else { 10.0 };
            center + ((i * 7 + j * 13) % 11) as f64 * 0.1
        });
        AnnData::from_names(
            MatrixData::Dense(x),
            (0..n_obs).map(|i| format!("cell_{i}")).collect(),
            (0..n_vars).map(|j| format!("gene_{j}")).collect(),
        )
        .unwrap()
    }

    #[test]
    fn pca_caps_components() {
        let mut adata = clustered(20, 8);
        pca(&mut adata, &PcaParams::default()).unwrap();
        let x_pca = adata.get_obsm("X_pca").and_then(Embedding::as_array).unwrap();
        assert_eq!(x_pca.dim(), (20, 7));
        assert_eq!(adata.get_varm("PCs").map(DenseArray::dim), Some((8, 7)));
        match adata.get_uns("pca_variance_ratio") {
            Some(Column::Float64(ratio)) => {
                assert_eq!(ratio.len(), 7);
                assert!(ratio.iter().sum::<f64>() <= 1.0 + 1e-9);
                assert!(ratio[0] > 0.5, "the cluster split dominates");
            }
            other => panic!("unexpected variance ratio {other:?}"),
        }
    }

    #[test]
    fn pca_rejects_degenerate_shapes() {
        let mut adata = clustered(1, 5);
        assert!(matches!(
            pca(&mut adata, &PcaParams::default()),
            Err(VitzarrError::Compute(_))
        ));
    }

    #[test]
    fn neighbors_uses_x_for_narrow_matrices() {
        let mut adata = clustered(12, 4);
        let params = NeighborsParams {
            n_neighbors: 4,
            ..NeighborsParams::default()
        };
        neighbors(&mut adata, &params).unwrap();
        assert!(adata.get_obsm("X_pca").is_none());

        let distances = adata.get_obsp("distances").unwrap();
        assert_eq!(distances.nnz(), 12 * 3);
        let conn = adata.get_obsp("connectivities").unwrap();
        assert_eq!(conn.to_dense(), conn.transpose_view().to_dense());
        // Neighbors stay within their cluster.
        for (_, (i, j)) in conn.iter() {
            assert_eq!(i < 6, j < 6);
        }
        assert_eq!(adata.get_uns("neighbors_n_neighbors"), Some(&Column::Int64(vec![4])));
    }

    #[test]
    fn neighbors_runs_pca_for_wide_matrices() {
        let mut adata = clustered(10, 60);
        neighbors(&mut adata, &NeighborsParams::default()).unwrap();
        assert!(adata.get_obsm("X_pca").is_some());
        // n_neighbors is capped at the number of observations.
        assert_eq!(adata.get_uns("neighbors_n_neighbors"), Some(&Column::Int64(vec![10])));
    }

    #[test]
    fn umap_requires_neighbors() {
        let mut adata = clustered(10, 4);
        assert!(matches!(
            umap(&mut adata, &UmapParams::default()),
            Err(VitzarrError::Compute(_))
        ));
    }

    #[test]
    fn umap_after_neighbors() {
        let mut adata = clustered(16, 6);
        pca(&mut adata, &PcaParams::default()).unwrap();
        neighbors(
            &mut adata,
            &NeighborsParams {
                n_neighbors: 5,
                ..NeighborsParams::default()
            },
        )
        .unwrap();
        umap(
            &mut adata,
            &UmapParams {
                n_epochs: Some(50),
                ..UmapParams::default()
            },
        )
        .unwrap();
        let x_umap = adata.get_obsm("X_umap").and_then(Embedding::as_array).unwrap();
        assert_eq!(x_umap.dim(), (16, 2));
        assert!(x_umap.to_f64().iter().all(|v| v.is_finite()));
        assert!(adata.get_uns("umap_a").is_some());
    }
}
