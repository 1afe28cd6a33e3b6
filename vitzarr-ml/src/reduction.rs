//! Principal Component Analysis over dense `ndarray` matrices.
//!
//! Two solvers are available:
//!
//! - **Exact** — cyclic Jacobi eigendecomposition of the smaller of the
//!   covariance (`p × p`) and Gram (`n × n`) matrices. Used whenever
//!   `min(n_samples, n_features)` is at most [`EXACT_LIMIT`].
//! - **Power iteration** — one eigenvector at a time, with Gram-Schmidt
//!   deflation against the components already found. The covariance matrix is
//!   never formed: each step evaluates `Xcᵀ (Xc v) / (n - 1)`.

use ndarray::{Array1, Array2, ArrayView2, Axis};
use vitzarr_core::{Result, Summarizable, VitzarrError};

/// Largest `min(n_samples, n_features)` handled by the exact solver under
/// [`PcaSolver::Auto`].
pub const EXACT_LIMIT: usize = 512;

/// Eigen-solver used by [`pca`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PcaSolver {
    /// Exact for small problems, power iteration otherwise.
    #[default]
    Auto,
    /// Jacobi eigendecomposition of the covariance or Gram matrix.
    Exact,
    /// Matrix-free power iteration with deflation.
    PowerIteration,
}

/// Configuration for PCA.
#[derive(Debug, Clone)]
pub struct PcaConfig {
    /// Number of principal components to compute.
    pub n_components: usize,
    /// Maximum iterations per component (power iteration) or sweeps (Jacobi).
    pub max_iter: usize,
    /// Convergence tolerance.
    pub tolerance: f64,
    /// Eigen-solver selection.
    pub solver: PcaSolver,
}

impl Default for PcaConfig {
    fn default() -> Self {
        Self {
            n_components: 2,
            max_iter: 1000,
            tolerance: 1e-10,
            solver: PcaSolver::Auto,
        }
    }
}

/// Result of PCA computation.
#[derive(Debug, Clone)]
pub struct PcaResult {
    /// Principal axes, one per row: `n_components × n_features`.
    pub components: Array2<f64>,
    /// Variance (eigenvalue, `ddof = 1`) explained by each component.
    pub explained_variance: Vec<f64>,
    /// Fraction of total variance explained by each component.
    pub explained_variance_ratio: Vec<f64>,
    /// Projected data: `n_samples × n_components`.
    pub transformed: Array2<f64>,
    /// Per-feature mean of the input data.
    pub mean: Array1<f64>,
    /// Number of features in the original data.
    pub n_features: usize,
    /// Number of components computed.
    pub n_components: usize,
}

impl Summarizable for PcaResult {
    fn summary(&self) -> String {
        let total: f64 = self.explained_variance_ratio.iter().sum();
        format!(
            "PCA: {} components, {:.1}% variance explained",
            self.n_components,
            total * 100.0,
        )
    }
}

/// Run PCA on a `n_samples × n_features` matrix.
///
/// The number of components is capped at `min(n_samples, n_features)`.
/// Component signs are fixed so that the largest-magnitude loading of each
/// axis is positive, which makes results reproducible across solvers.
///
/// # Errors
///
/// Returns an error if the data is empty, has fewer than two samples,
/// contains non-finite values, or `n_components` is zero.
pub fn pca(data: ArrayView2<'_, f64>, config: &PcaConfig) -> Result<PcaResult> {
    let (n_samples, n_features) = data.dim();
    if n_samples == 0 || n_features == 0 {
        return Err(VitzarrError::InvalidInput("empty data".into()));
    }
    if n_samples < 2 {
        return Err(VitzarrError::InvalidInput("need at least 2 samples".into()));
    }
    if data.iter().any(|v| !v.is_finite()) {
        return Err(VitzarrError::InvalidInput(
            "data contains NaN or infinite values".into(),
        ));
    }
    let n_components = config.n_components.min(n_features).min(n_samples);
    if n_components == 0 {
        return Err(VitzarrError::InvalidInput("n_components must be > 0".into()));
    }

    let mean = data
        .mean_axis(Axis(0))
        .ok_or_else(|| VitzarrError::InvalidInput("empty data".into()))?;
    let centered = &data - &mean;
    let scale = (n_samples - 1) as f64;
    let total_variance = centered.iter().map(|v| v * v).sum::<f64>() / scale;

    let exact = match config.solver {
        PcaSolver::Exact => true,
        PcaSolver::PowerIteration => false,
        PcaSolver::Auto => n_samples.min(n_features) <= EXACT_LIMIT,
    };
    let (mut components, eigenvalues) = if exact {
        exact_components(&centered, n_components, scale, config)
    } else {
        power_components(&centered, n_components, scale, config)
    };
    flip_signs(&mut components);

    let transformed = centered.dot(&components.t());
    let explained_variance_ratio = if total_variance > 0.0 {
        eigenvalues.iter().map(|&ev| ev / total_variance).collect()
    } else {
        vec![0.0; n_components]
    };

    Ok(PcaResult {
        components,
        explained_variance: eigenvalues,
        explained_variance_ratio,
        transformed,
        mean,
        n_features,
        n_components,
    })
}

// ---------------------------------------------------------------------------
// Exact solver
// ---------------------------------------------------------------------------

fn exact_components(
    centered: &Array2<f64>,
    n_components: usize,
    scale: f64,
    config: &PcaConfig,
) -> (Array2<f64>, Vec<f64>) {
    let (n_samples, n_features) = centered.dim();
    let sweeps = config.max_iter.clamp(1, 100);
    let mut components = Array2::<f64>::zeros((n_components, n_features));
    let mut eigenvalues = Vec::with_capacity(n_components);

    if n_features <= n_samples {
        let cov = centered.t().dot(centered) / scale;
        let (values, vectors) = jacobi_eigen(cov, sweeps, config.tolerance);
        for k in 0..n_components {
            components.row_mut(k).assign(&vectors.column(k));
            eigenvalues.push(values[k].max(0.0));
        }
    } else {
        // Eigenvectors of the Gram matrix map to principal axes through Xcᵀ.
        let gram = centered.dot(&centered.t()) / scale;
        let (values, vectors) = jacobi_eigen(gram, sweeps, config.tolerance);
        for k in 0..n_components {
            let axis = centered.t().dot(&vectors.column(k));
            let norm = axis.dot(&axis).sqrt();
            if norm > 0.0 {
                components.row_mut(k).assign(&(axis / norm));
            }
            eigenvalues.push(values[k].max(0.0));
        }
    }
    (components, eigenvalues)
}

/// Cyclic Jacobi eigendecomposition of a symmetric matrix.
///
/// Returns eigenvalues in descending order with matching eigenvectors as
/// columns.
fn jacobi_eigen(mut a: Array2<f64>, max_sweeps: usize, tol: f64) -> (Vec<f64>, Array2<f64>) {
    let n = a.nrows();
    let mut v = Array2::<f64>::eye(n);
    let scale = a.iter().map(|x| x * x).sum::<f64>().max(f64::MIN_POSITIVE);

    for _ in 0..max_sweeps {
        let mut off = 0.0;
        for p in 0..n {
            for q in (p + 1)..n {
                off += a[[p, q]] * a[[p, q]];
            }
        }
        if off <= tol * tol * scale {
            break;
        }
        for p in 0..n {
            for q in (p + 1)..n {
                let apq = a[[p, q]];
                if apq == 0.0 {
                    continue;
                }
                let theta = (a[[q, q]] - a[[p, p]]) / (2.0 * apq);
                let t = theta.signum() / (theta.abs() + (theta * theta + 1.0).sqrt());
                let c = 1.0 / (t * t + 1.0).sqrt();
                let s = t * c;
                for k in 0..n {
                    let (akp, akq) = (a[[k, p]], a[[k, q]]);
                    a[[k, p]] = c * akp - s * akq;
                    a[[k, q]] = s * akp + c * akq;
                }
                for k in 0..n {
                    let (apk, aqk) = (a[[p, k]], a[[q, k]]);
                    a[[p, k]] = c * apk - s * aqk;
                    a[[q, k]] = s * apk + c * aqk;
                }
                for k in 0..n {
                    let (vkp, vkq) = (v[[k, p]], v[[k, q]]);
                    v[[k, p]] = c * vkp - s * vkq;
                    v[[k, q]] = s * vkp + c * vkq;
                }
            }
        }
    }

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&i, &j| a[[j, j]].total_cmp(&a[[i, i]]));
    let values = order.iter().map(|&i| a[[i, i]]).collect();
    let mut vectors = Array2::<f64>::zeros((n, n));
    for (dst, &src) in order.iter().enumerate() {
        vectors.column_mut(dst).assign(&v.column(src));
    }
    (values, vectors)
}

// ---------------------------------------------------------------------------
// Power iteration
// ---------------------------------------------------------------------------

fn power_components(
    centered: &Array2<f64>,
    n_components: usize,
    scale: f64,
    config: &PcaConfig,
) -> (Array2<f64>, Vec<f64>) {
    let n_features = centered.ncols();
    let mut components = Array2::<f64>::zeros((n_components, n_features));
    let mut eigenvalues = Vec::with_capacity(n_components);

    for k in 0..n_components {
        // Deterministic start, rotated per component so it is never parallel
        // to an axis already removed.
        let mut v =
            Array1::from_shape_fn(n_features, |i| 1.0 / (((i + k) % n_features) + 1) as f64);
        orthogonalize(&mut v, &components, k);
        normalize(&mut v);

        let mut eigenvalue = 0.0;
        for _ in 0..config.max_iter {
            let mut w = centered.t().dot(&centered.dot(&v)) / scale;
            orthogonalize(&mut w, &components, k);
            let estimate = v.dot(&w);
            if !normalize(&mut w) {
                eigenvalue = 0.0;
                break;
            }
            let diff = (&v - &w).mapv(|x| x * x).sum().sqrt();
            v = w;
            eigenvalue = estimate;
            if diff < config.tolerance {
                break;
            }
        }
        components.row_mut(k).assign(&v);
        eigenvalues.push(eigenvalue.max(0.0));
    }
    (components, eigenvalues)
}

/// Remove the projections onto the first `k` rows of `basis`.
fn orthogonalize(v: &mut Array1<f64>, basis: &Array2<f64>, k: usize) {
    for row in basis.outer_iter().take(k) {
        let proj = row.dot(&*v);
        v.scaled_add(-proj, &row);
    }
}

/// Scale to unit length; `false` when the vector is (numerically) zero.
fn normalize(v: &mut Array1<f64>) -> bool {
    let norm = v.dot(&*v).sqrt();
    if norm <= f64::EPSILON {
        return false;
    }
    v.mapv_inplace(|x| x / norm);
    true
}

fn flip_signs(components: &mut Array2<f64>) {
    for mut row in components.outer_iter_mut() {
        let pivot = row
            .iter()
            .copied()
            .fold(0.0_f64, |best, x| if x.abs() > best.abs() { x } else { best });
        if pivot < 0.0 {
            row.mapv_inplace(|x| -x);
        }
    }
}
