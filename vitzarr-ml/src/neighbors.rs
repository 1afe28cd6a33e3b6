//! Exact k-nearest-neighbor graphs and their fuzzy simplicial set.
//!
//! The fuzzy set is the symmetric "connectivities" graph used by UMAP:
//! directed memberships `exp(-(d - rho_i) / sigma_i)` combined with the
//! probabilistic union `w + wᵀ - w ∘ wᵀ`.

use std::collections::BTreeMap;

use ndarray::ArrayView2;
use vitzarr_core::{Result, VitzarrError};

use crate::distance::{compute_distance, DistanceMetric};

const SMOOTH_K_TOLERANCE: f64 = 1e-5;
const MIN_K_DIST_SCALE: f64 = 1e-3;

/// Neighbors of every sample, excluding the sample itself, nearest first.
#[derive(Debug, Clone)]
pub struct KnnGraph {
    /// Neighbor indices, one row of length `k` per sample.
    pub indices: Vec<Vec<usize>>,
    /// Distances matching `indices`.
    pub distances: Vec<Vec<f64>>,
    /// Neighbors per sample.
    pub k: usize,
}

impl KnnGraph {
    pub fn n_samples(&self) -> usize {
        self.indices.len()
    }
}

/// Undirected weighted edge; `i < j`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Edge {
    pub i: usize,
    pub j: usize,
    pub weight: f64,
}

/// Symmetric membership graph stored as its upper triangle.
#[derive(Debug, Clone)]
pub struct FuzzyGraph {
    pub n_samples: usize,
    pub edges: Vec<Edge>,
}

/// Brute-force kNN over the rows of `data`.
///
/// # Errors
///
/// Fails when there are fewer than two rows, when `k` is zero or not smaller
/// than the number of rows, or when a distance cannot be computed.
pub fn knn_graph(data: ArrayView2<'_, f64>, k: usize, metric: DistanceMetric) -> Result<KnnGraph> {
    let n_samples = data.nrows();
    if n_samples < 2 {
        return Err(VitzarrError::InvalidInput("need at least 2 samples".into()));
    }
    if data.ncols() == 0 {
        return Err(VitzarrError::InvalidInput("n_features must be > 0".into()));
    }
    if k == 0 || k >= n_samples {
        return Err(VitzarrError::InvalidInput(format!(
            "k ({k}) must be in 1..{n_samples}"
        )));
    }

    let rows: Vec<Vec<f64>> = data.outer_iter().map(|r| r.to_vec()).collect();
    let mut indices = Vec::with_capacity(n_samples);
    let mut distances = Vec::with_capacity(n_samples);
    for (i, ri) in rows.iter().enumerate() {
        let mut dists: Vec<(usize, f64)> = Vec::with_capacity(n_samples - 1);
        for (j, rj) in rows.iter().enumerate() {
            if j == i {
                continue;
            }
            dists.push((j, compute_distance(ri, rj, metric)?));
        }
        dists.sort_by(|a, b| a.1.total_cmp(&b.1));
        dists.truncate(k);
        let (idx, dst): (Vec<_>, Vec<_>) = dists.into_iter().unzip();
        indices.push(idx);
        distances.push(dst);
    }
    Ok(KnnGraph {
        indices,
        distances,
        k,
    })
}

/// Per-sample `(sigmas, rhos)` calibrating the membership kernel.
///
/// `rho_i` is the distance to the nearest non-identical neighbor; `sigma_i`
/// is found by bisection so that the memberships of sample `i` sum to
/// `log2(k + 1)` (the neighborhood size counting the sample itself).
pub fn smooth_knn_distances(knn: &KnnGraph) -> (Vec<f64>, Vec<f64>) {
    let n_samples = knn.n_samples();
    let target = ((knn.k + 1) as f64).log2();
    let all_mean = {
        let total: f64 = knn.distances.iter().flatten().sum();
        let count = knn.distances.iter().map(Vec::len).sum::<usize>().max(1);
        total / count as f64
    };

    let mut sigmas = Vec::with_capacity(n_samples);
    let mut rhos = Vec::with_capacity(n_samples);
    for dists in &knn.distances {
        let rho = dists.iter().copied().find(|&d| d > 0.0).unwrap_or(0.0);

        let mut lo = 0.0_f64;
        let mut hi = f64::INFINITY;
        let mut mid = 1.0_f64;
        for _ in 0..64 {
            let psum: f64 = dists
                .iter()
                .map(|&d| {
                    let shifted = d - rho;
                    if shifted > 0.0 {
                        (-shifted / mid).exp()
                    } else {
                        1.0
                    }
                })
                .sum();
            if (psum - target).abs() < SMOOTH_K_TOLERANCE {
                break;
            }
            if psum > target {
                hi = mid;
                mid = (lo + hi) / 2.0;
            } else {
                lo = mid;
                mid = if hi.is_infinite() { mid * 2.0 } else { (lo + hi) / 2.0 };
            }
        }

        let floor = if rho > 0.0 {
            let mean = dists.iter().sum::<f64>() / dists.len().max(1) as f64;
            MIN_K_DIST_SCALE * mean
        } else {
            MIN_K_DIST_SCALE * all_mean
        };
        sigmas.push(mid.max(floor));
        rhos.push(rho);
    }
    (sigmas, rhos)
}

/// Build the symmetric fuzzy union of the directed kNN memberships.
pub fn fuzzy_simplicial_set(knn: &KnnGraph) -> FuzzyGraph {
    let (sigmas, rhos) = smooth_knn_distances(knn);

    // (min, max) -> (w(min→max), w(max→min))
    let mut pairs: BTreeMap<(usize, usize), (f64, f64)> = BTreeMap::new();
    for (i, (idx, dst)) in knn.indices.iter().zip(&knn.distances).enumerate() {
        for (&j, &d) in idx.iter().zip(dst) {
            if i == j {
                continue;
            }
            let shifted = d - rhos[i];
            let w = if shifted <= 0.0 || sigmas[i] <= 0.0 {
                1.0
            } else {
                (-shifted / sigmas[i]).exp()
            };
            let entry = pairs.entry((i.min(j), i.max(j))).or_insert((0.0, 0.0));
            if i < j {
                entry.0 = w;
            } else {
                entry.1 = w;
            }
        }
    }

    let edges = pairs
        .into_iter()
        .filter_map(|((i, j), (w_ij, w_ji))| {
            let weight = w_ij + w_ji - w_ij * w_ji;
            (weight > 0.0).then_some(Edge { i, j, weight })
        })
        .collect();
    FuzzyGraph {
        n_samples: knn.n_samples(),
        edges,
    }
}
