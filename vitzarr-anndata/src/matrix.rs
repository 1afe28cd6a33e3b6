//! Dense or compressed-sparse 2-D matrices for `X`, `layers` and `raw`.

use ndarray::Array2;
use sprs::{CsMat, TriMat};

use vitzarr_core::{Result, VitzarrError};

/// A numeric matrix, rows = observations.
#[derive(Debug, Clone, PartialEq)]
pub enum MatrixData {
    Dense(Array2<f64>),
    Sparse(CsMat<f64>),
}

impl From<Array2<f64>> for MatrixData {
    fn from(a: Array2<f64>) -> Self {
        MatrixData::Dense(a)
    }
}

impl From<CsMat<f64>> for MatrixData {
    fn from(m: CsMat<f64>) -> Self {
        MatrixData::Sparse(m)
    }
}

impl MatrixData {
    /// (rows, columns).
    pub fn shape(&self) -> (usize, usize) {
        match self {
            MatrixData::Dense(a) => a.dim(),
            MatrixData::Sparse(m) => (m.rows(), m.cols()),
        }
    }

    pub fn is_sparse(&self) -> bool {
        matches!(self, MatrixData::Sparse(_))
    }

    /// Stored entries: every cell for dense matrices.
    pub fn nnz(&self) -> usize {
        match self {
            MatrixData::Dense(a) => a.len(),
            MatrixData::Sparse(m) => m.nnz(),
        }
    }

    /// A dense copy.
    pub fn to_dense(&self) -> Array2<f64> {
        match self {
            MatrixData::Dense(a) => a.clone(),
            MatrixData::Sparse(m) => m.to_dense(),
        }
    }

    /// Convert to dense in place of the sparse representation.
    pub fn into_dense(self) -> Array2<f64> {
        match self {
            MatrixData::Dense(a) => a,
            MatrixData::Sparse(m) => m.to_dense(),
        }
    }

    pub fn get(&self, row: usize, col: usize) -> f64 {
        match self {
            MatrixData::Dense(a) => a.get((row, col)).copied().unwrap_or(0.0),
            MatrixData::Sparse(m) => m.get(row, col).copied().unwrap_or(0.0),
        }
    }
}

/// Assemble a compressed matrix from its on-disk parts.
///
/// `csr` selects row (`csr_matrix`) or column (`csc_matrix`) compression.
/// Parts that are valid but not in canonical order (unsorted indices) are
/// rebuilt through triplets; the result is always CSR.
pub fn compressed_from_parts(
    shape: (usize, usize),
    indptr: Vec<usize>,
    indices: Vec<usize>,
    data: Vec<f64>,
    csr: bool,
) -> Result<CsMat<f64>> {
    let (n_rows, n_cols) = shape;
    let (outer, inner) = if csr { (n_rows, n_cols) } else { (n_cols, n_rows) };
    if indptr.len() != outer + 1 {
        return Err(VitzarrError::Parse(format!(
            "indptr length {} does not match {} outer dimensions",
            indptr.len(),
            outer
        )));
    }
    if indices.len() != data.len() {
        return Err(VitzarrError::Parse(format!(
            "indices ({}) and data ({}) lengths differ",
            indices.len(),
            data.len()
        )));
    }

    let attempt = if csr {
        CsMat::try_new(shape, indptr.clone(), indices.clone(), data.clone())
    } else {
        CsMat::try_new_csc(shape, indptr.clone(), indices.clone(), data.clone())
    };
    match attempt {
        Ok(m) if m.is_csr() => return Ok(m),
        Ok(m) => return Ok(m.to_other_storage()),
        Err((_, _, _, e)) => vitzarr_core::debug!("rebuilding sparse matrix from triplets: {e}"),
    }

    let mut tri = TriMat::with_capacity(shape, data.len());
    for o in 0..outer {
        let (start, end) = (indptr[o], indptr[o + 1]);
        if start > end || end > indices.len() {
            return Err(VitzarrError::Parse(format!(
                "indptr is not monotonic at position {o}"
            )));
        }
        for k in start..end {
            let i = indices[k];
            if i >= inner {
                return Err(VitzarrError::Parse(format!(
                    "sparse index {i} out of bounds for dimension {inner}"
                )));
            }
            if csr {
                tri.add_triplet(o, i, data[k]);
            } else {
                tri.add_triplet(i, o, data[k]);
            }
        }
    }
    Ok(tri.to_csr())
}

/// CSR parts of a matrix: `(indptr, indices, data)`.
pub fn csr_parts(m: &CsMat<f64>) -> (Vec<usize>, Vec<usize>, Vec<f64>) {
    let csr;
    let m = if m.is_csr() {
        m
    } else {
        csr = m.to_other_storage();
        &csr
    };
    (
        m.proper_indptr().into_owned(),
        m.indices().to_vec(),
        m.data().to_vec(),
    )
}

/// Build a CSR matrix from dense `(row, col, value)` entries.
pub fn csr_from_triplets(
    shape: (usize, usize),
    entries: impl IntoIterator<Item = (usize, usize, f64)>,
) -> CsMat<f64> {
    let mut tri = TriMat::new(shape);
    for (r, c, v) in entries {
        tri.add_triplet(r, c, v);
    }
    tri.to_csr()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn csr_parts_round_trip() {
        let m = compressed_from_parts((2, 3), vec![0, 2, 3], vec![0, 2, 1], vec![1.0, 2.0, 3.0], true)
            .unwrap();
        let dense = MatrixData::Sparse(m.clone()).to_dense();
        assert_eq!(dense, array![[1.0, 0.0, 2.0], [0.0, 3.0, 0.0]]);
        assert_eq!(csr_parts(&m), (vec![0, 2, 3], vec![0, 2, 1], vec![1.0, 2.0, 3.0]));
    }

    #[test]
    fn csc_parts_become_csr() {
        // Column-compressed form of [[1, 0, 2], [0, 3, 0]].
        let m = compressed_from_parts((2, 3), vec![0, 1, 2, 3], vec![0, 1, 0], vec![1.0, 3.0, 2.0], false)
            .unwrap();
        assert!(m.is_csr());
        assert_eq!(m.to_dense(), array![[1.0, 0.0, 2.0], [0.0, 3.0, 0.0]]);
    }

    #[test]
    fn unsorted_indices_are_rebuilt() {
        let m = compressed_from_parts((1, 3), vec![0, 2], vec![2, 0], vec![5.0, 7.0], true).unwrap();
        assert_eq!(m.to_dense(), array![[7.0, 0.0, 5.0]]);
    }

    #[test]
    fn bad_parts_are_parse_errors() {
        assert!(compressed_from_parts((2, 2), vec![0, 1], vec![0], vec![1.0], true).is_err());
        assert!(compressed_from_parts((1, 2), vec![0, 1], vec![5], vec![1.0], true).is_err());
        assert!(compressed_from_parts((1, 2), vec![0, 1], vec![0, 1], vec![1.0], true).is_err());
    }

    #[test]
    fn densify_keeps_shape_and_values() {
        let m = csr_from_triplets((3, 2), [(0, 1, 4.0), (2, 0, -1.0)]);
        let x = MatrixData::from(m);
        assert!(x.is_sparse());
        assert_eq!(x.nnz(), 2);
        assert_eq!(x.get(0, 1), 4.0);
        let dense = x.into_dense();
        assert_eq!(dense, array![[0.0, 4.0], [0.0, 0.0], [-1.0, 0.0]]);
    }
}
