//! UMAP (Uniform Manifold Approximation and Projection) layout.
//!
//! The layout step works on a precomputed [`FuzzyGraph`], so a dataset that
//! already carries a neighbor graph can be embedded without recomputing it.
//! [`umap`] chains the kNN search, fuzzy set construction and layout for
//! callers starting from raw coordinates.

use ndarray::{Array2, ArrayView2};
use vitzarr_core::{Result, Summarizable, VitzarrError};

use crate::distance::DistanceMetric;
use crate::neighbors::{fuzzy_simplicial_set, knn_graph, Edge, FuzzyGraph};
use crate::reduction::{pca, PcaConfig};

// ---------------------------------------------------------------------------
// Config & Result types
// ---------------------------------------------------------------------------

/// Initialization strategy for the UMAP embedding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UmapInit {
    /// Uniform random coordinates in `[-10, 10)` using Xorshift64.
    Random,
    /// Leading principal components of the initialization data, falling back
    /// to random coordinates when PCA cannot run.
    #[default]
    Pca,
}

/// Configuration for the UMAP layout.
#[derive(Debug, Clone)]
pub struct UmapConfig {
    /// Number of output dimensions.
    pub n_components: usize,
    /// Minimum distance between points in the embedding.
    pub min_dist: f64,
    /// Effective scale of embedded points.
    pub spread: f64,
    /// Initial learning rate for SGD.
    pub learning_rate: f64,
    /// Number of optimization epochs.
    pub n_epochs: usize,
    /// Number of negative samples per positive edge.
    pub negative_sample_rate: usize,
    /// Weight of the repulsive term.
    pub repulsion_strength: f64,
    /// Embedding initialization method.
    pub init: UmapInit,
    /// Random seed for reproducibility.
    pub seed: u64,
}

impl Default for UmapConfig {
    fn default() -> Self {
        Self {
            n_components: 2,
            min_dist: 0.5,
            spread: 1.0,
            learning_rate: 1.0,
            n_epochs: 200,
            negative_sample_rate: 5,
            repulsion_strength: 1.0,
            init: UmapInit::Pca,
            seed: 0,
        }
    }
}

/// Result of a UMAP layout.
#[derive(Debug, Clone)]
pub struct UmapResult {
    /// Embedded coordinates: `n_samples × n_components`.
    pub embedding: Array2<f64>,
    /// Fitted curve parameter `a`.
    pub a: f64,
    /// Fitted curve parameter `b`.
    pub b: f64,
    /// Number of optimization epochs run.
    pub n_epochs: usize,
}

impl Summarizable for UmapResult {
    fn summary(&self) -> String {
        format!(
            "UMAP: {} samples in {}D, {} epochs",
            self.embedding.nrows(),
            self.embedding.ncols(),
            self.n_epochs,
        )
    }
}

/// Minimal xorshift64 PRNG.
struct Xorshift64(u64);

impl Xorshift64 {
    fn new(seed: u64) -> Self {
        // Zero is a fixed point of xorshift.
        Self(seed ^ 0x9E37_79B9_7F4A_7C15)
    }

    fn next_u64(&mut self) -> u64 {
        let mut x = self.0;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.0 = x;
        x
    }

    fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / ((1u64 << 53) as f64)
    }

    fn next_bounded(&mut self, bound: usize) -> usize {
        (self.next_u64() % bound as u64) as usize
    }
}

// ---------------------------------------------------------------------------
// Entry points
// ---------------------------------------------------------------------------

/// Run kNN, fuzzy set construction and layout on the rows of `data`.
///
/// `n_neighbors` counts the sample itself, so each row gets
/// `n_neighbors - 1` graph neighbors.
///
/// # Errors
///
/// Returns an error if the data is empty or `n_neighbors` is out of range.
pub fn umap(
    data: ArrayView2<'_, f64>,
    n_neighbors: usize,
    metric: DistanceMetric,
    config: &UmapConfig,
) -> Result<UmapResult> {
    if n_neighbors < 2 {
        return Err(VitzarrError::InvalidInput("n_neighbors must be >= 2".into()));
    }
    if n_neighbors > data.nrows() {
        return Err(VitzarrError::InvalidInput(format!(
            "n_neighbors ({}) must be <= n_samples ({})",
            n_neighbors,
            data.nrows()
        )));
    }
    let knn = knn_graph(data, n_neighbors - 1, metric)?;
    let graph = fuzzy_simplicial_set(&knn);
    umap_layout(&graph, data, config)
}

/// Optimize a low-dimensional layout of `graph`.
///
/// `init_data` supplies one row per graph vertex and is only used by
/// [`UmapInit::Pca`].
///
/// # Errors
///
/// Returns an error if the graph has fewer than two vertices, the
/// initialization data does not match it, or `n_components` is zero.
pub fn umap_layout(
    graph: &FuzzyGraph,
    init_data: ArrayView2<'_, f64>,
    config: &UmapConfig,
) -> Result<UmapResult> {
    let n_samples = graph.n_samples;
    if n_samples < 2 {
        return Err(VitzarrError::InvalidInput("need at least 2 samples".into()));
    }
    if init_data.nrows() != n_samples {
        return Err(VitzarrError::InvalidInput(format!(
            "initialization data has {} rows, graph has {} vertices",
            init_data.nrows(),
            n_samples
        )));
    }
    if config.n_components == 0 {
        return Err(VitzarrError::InvalidInput("n_components must be > 0".into()));
    }
    if let Some(edge) = graph.edges.iter().find(|e| e.j >= n_samples || e.i >= e.j) {
        return Err(VitzarrError::InvalidInput(format!(
            "malformed graph edge ({}, {})",
            edge.i, edge.j
        )));
    }

    let (a, b) = fit_ab_params(config.min_dist, config.spread);
    let mut embedding = initialize_embedding(init_data, config);
    let edges = prune_edges(&graph.edges, config.n_epochs);
    optimize_embedding(&mut embedding, &edges, a, b, config);
    vitzarr_core::debug!(
        "UMAP layout: {} vertices, {} edges, a={a:.4}, b={b:.4}",
        n_samples,
        edges.len()
    );

    Ok(UmapResult {
        embedding,
        a,
        b,
        n_epochs: config.n_epochs,
    })
}

// ---------------------------------------------------------------------------
// Curve parameters
// ---------------------------------------------------------------------------

/// Fit `a`, `b` of `1 / (1 + a d^(2b))` to the offset exponential defined by
/// `min_dist` and `spread`.
///
/// Common settings are served from precomputed values, anything else runs a
/// Gauss-Newton least-squares fit.
pub fn fit_ab_params(min_dist: f64, spread: f64) -> (f64, f64) {
    const KNOWN: [(f64, f64, f64, f64); 2] = [
        (0.1, 1.0, 1.576_943_5, 0.895_060_6),
        (0.5, 1.0, 0.583_030_0, 1.334_166_3),
    ];
    for (md, sp, a, b) in KNOWN {
        if (min_dist - md).abs() < 1e-10 && (spread - sp).abs() < 1e-10 {
            return (a, b);
        }
    }

    let n_points = 300;
    let samples: Vec<(f64, f64)> = (0..n_points)
        .map(|k| {
            let d = (k as f64 + 0.5) * 3.0 * spread / n_points as f64;
            let target = if d < min_dist {
                1.0
            } else {
                (-(d - min_dist) / spread).exp()
            };
            (d, target)
        })
        .collect();
    let sse = |a: f64, b: f64| -> f64 {
        samples
            .iter()
            .map(|&(d, t)| (1.0 / (1.0 + a * d.powf(2.0 * b)) - t).powi(2))
            .sum()
    };

    let mut a = 1.0;
    let mut b = 1.0;
    let mut err = sse(a, b);

    for _ in 0..100 {
        let mut jt_j_00 = 0.0;
        let mut jt_j_01 = 0.0;
        let mut jt_j_11 = 0.0;
        let mut jt_r_0 = 0.0;
        let mut jt_r_1 = 0.0;

        for &(d, target) in &samples {
            let d2b = d.powf(2.0 * b);
            let denom = 1.0 + a * d2b;
            let residual = 1.0 / denom - target;

            let df_da = -d2b / (denom * denom);
            let df_db = -a * d2b * 2.0 * d.ln() / (denom * denom);

            jt_j_00 += df_da * df_da;
            jt_j_01 += df_da * df_db;
            jt_j_11 += df_db * df_db;
            jt_r_0 += df_da * residual;
            jt_r_1 += df_db * residual;
        }

        let det = jt_j_00 * jt_j_11 - jt_j_01 * jt_j_01;
        if det.abs() < 1e-20 {
            break;
        }
        let mut da = -(jt_j_11 * jt_r_0 - jt_j_01 * jt_r_1) / det;
        let mut db = -(jt_j_00 * jt_r_1 - jt_j_01 * jt_r_0) / det;

        // Backtrack until the step reduces the residual.
        let mut accepted = false;
        for _ in 0..30 {
            let (na, nb) = ((a + da).max(0.001), (b + db).max(0.001));
            let next = sse(na, nb);
            if next <= err {
                a = na;
                b = nb;
                err = next;
                accepted = true;
                break;
            }
            da *= 0.5;
            db *= 0.5;
        }
        if !accepted || (da.abs() < 1e-8 && db.abs() < 1e-8) {
            break;
        }
    }

    (a, b)
}

// ---------------------------------------------------------------------------
// Initialization
// ---------------------------------------------------------------------------

fn initialize_embedding(init_data: ArrayView2<'_, f64>, config: &UmapConfig) -> Array2<f64> {
    let n_samples = init_data.nrows();
    let n_components = config.n_components;
    let mut rng = Xorshift64::new(config.seed);

    if config.init == UmapInit::Pca {
        let pca_config = PcaConfig {
            n_components,
            ..Default::default()
        };
        match pca(init_data, &pca_config) {
            Ok(result) => {
                let dims = result.n_components;
                let mut embedding = Array2::from_shape_fn((n_samples, n_components), |(i, d)| {
                    if d < dims {
                        result.transformed[[i, d]]
                    } else {
                        0.0
                    }
                });
                // Pad missing dimensions with jitter, then scale into [-10, 10].
                for d in dims..n_components {
                    for i in 0..n_samples {
                        embedding[[i, d]] = rng.next_f64() * 0.01 - 0.005;
                    }
                }
                let max_abs = embedding.iter().fold(0.0_f64, |m, x| m.max(x.abs()));
                if max_abs > 0.0 {
                    embedding.mapv_inplace(|x| x * 10.0 / max_abs);
                    return embedding;
                }
                vitzarr_core::debug!("PCA initialization is degenerate, using random coordinates");
            }
            Err(e) => {
                vitzarr_core::debug!("PCA initialization failed ({e}), using random coordinates");
            }
        }
    }

    Array2::from_shape_fn((n_samples, n_components), |_| rng.next_f64() * 20.0 - 10.0)
}

// ---------------------------------------------------------------------------
// SGD optimization
// ---------------------------------------------------------------------------

/// Drop edges too weak to be sampled even once in `n_epochs`.
fn prune_edges(edges: &[Edge], n_epochs: usize) -> Vec<Edge> {
    let max_weight = edges.iter().map(|e| e.weight).fold(0.0_f64, f64::max);
    if max_weight <= 0.0 || n_epochs == 0 {
        return edges.to_vec();
    }
    let threshold = max_weight / n_epochs as f64;
    edges.iter().copied().filter(|e| e.weight >= threshold).collect()
}

fn optimize_embedding(
    embedding: &mut Array2<f64>,
    edges: &[Edge],
    a: f64,
    b: f64,
    config: &UmapConfig,
) {
    let n_epochs = config.n_epochs;
    if edges.is_empty() || n_epochs == 0 {
        return;
    }
    let n_samples = embedding.nrows();
    let n_components = embedding.ncols();

    let max_weight = edges.iter().map(|e| e.weight).fold(0.0_f64, f64::max);
    let epochs_per_sample: Vec<f64> = edges.iter().map(|e| max_weight / e.weight).collect();
    let mut epochs_of_next_sample = epochs_per_sample.clone();
    let mut rng = Xorshift64::new(config.seed.wrapping_add(1));
    let clip = 4.0;
    let mut diff = vec![0.0; n_components];

    for epoch in 0..n_epochs {
        let lr = config.learning_rate * (1.0 - epoch as f64 / n_epochs as f64);

        for (edge_idx, edge) in edges.iter().enumerate() {
            if epochs_of_next_sample[edge_idx] > (epoch + 1) as f64 {
                continue;
            }
            // Sample both directions of the undirected edge.
            for (head, tail) in [(edge.i, edge.j), (edge.j, edge.i)] {
                let mut dist_sq = 0.0;
                for d in 0..n_components {
                    diff[d] = embedding[[head, d]] - embedding[[tail, d]];
                    dist_sq += diff[d] * diff[d];
                }
                if dist_sq > 0.0 {
                    let grad_coeff =
                        -2.0 * a * b * dist_sq.powf(b - 1.0) / (1.0 + a * dist_sq.powf(b));
                    for d in 0..n_components {
                        let grad = (grad_coeff * diff[d]).clamp(-clip, clip);
                        embedding[[head, d]] += lr * grad;
                        embedding[[tail, d]] -= lr * grad;
                    }
                }

                for _ in 0..config.negative_sample_rate {
                    let neg = rng.next_bounded(n_samples);
                    if neg == head {
                        continue;
                    }
                    let mut neg_dist_sq = 0.0;
                    for d in 0..n_components {
                        diff[d] = embedding[[head, d]] - embedding[[neg, d]];
                        neg_dist_sq += diff[d] * diff[d];
                    }
                    let grad_coeff = if neg_dist_sq > 0.0 {
                        2.0 * config.repulsion_strength * b
                            / ((0.001 + neg_dist_sq) * (1.0 + a * neg_dist_sq.powf(b)))
                    } else {
                        0.0
                    };
                    for d in 0..n_components {
                        let grad = if grad_coeff > 0.0 {
                            (grad_coeff * diff[d]).clamp(-clip, clip)
                        } else {
                            clip
                        };
                        embedding[[head, d]] += lr * grad;
                    }
                }
            }

            epochs_of_next_sample[edge_idx] += epochs_per_sample[edge_idx];
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
