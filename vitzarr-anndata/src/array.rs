//! Typed dense 2-D arrays and observation-aligned embeddings.

use std::borrow::Cow;

use ndarray::{Array2, ShapeBuilder};

use vitzarr_core::{Result, VitzarrError};

use crate::dtype::{CastI32, DTypeKind};
use crate::frame::{Column, DataFrame};

/// A dense row-major 2-D array of one numeric element type.
#[derive(Debug, Clone, PartialEq)]
pub enum DenseArray {
    Int8(Array2<i8>),
    Int16(Array2<i16>),
    Int32(Array2<i32>),
    Int64(Array2<i64>),
    UInt8(Array2<u8>),
    UInt16(Array2<u16>),
    UInt32(Array2<u32>),
    UInt64(Array2<u64>),
    Float32(Array2<f32>),
    Float64(Array2<f64>),
}

/// Apply `$body` to the array inside any variant.
macro_rules! dense_match {
    ($arr:expr, $a:ident => $body:expr) => {
        match $arr {
            DenseArray::Int8($a) => $body,
            DenseArray::Int16($a) => $body,
            DenseArray::Int32($a) => $body,
            DenseArray::Int64($a) => $body,
            DenseArray::UInt8($a) => $body,
            DenseArray::UInt16($a) => $body,
            DenseArray::UInt32($a) => $body,
            DenseArray::UInt64($a) => $body,
            DenseArray::Float32($a) => $body,
            DenseArray::Float64($a) => $body,
        }
    };
}
pub(crate) use dense_match;

impl From<Array2<f64>> for DenseArray {
    fn from(a: Array2<f64>) -> Self {
        DenseArray::Float64(a)
    }
}

impl From<Array2<f32>> for DenseArray {
    fn from(a: Array2<f32>) -> Self {
        DenseArray::Float32(a)
    }
}

impl From<Array2<i32>> for DenseArray {
    fn from(a: Array2<i32>) -> Self {
        DenseArray::Int32(a)
    }
}

impl From<Array2<i64>> for DenseArray {
    fn from(a: Array2<i64>) -> Self {
        DenseArray::Int64(a)
    }
}

impl DenseArray {
    /// (rows, columns).
    pub fn dim(&self) -> (usize, usize) {
        dense_match!(self, a => a.dim())
    }

    pub fn nrows(&self) -> usize {
        self.dim().0
    }

    pub fn kind(&self) -> DTypeKind {
        match self {
            DenseArray::Int8(_) => DTypeKind::Int8,
            DenseArray::Int16(_) => DTypeKind::Int16,
            DenseArray::Int32(_) => DTypeKind::Int32,
            DenseArray::Int64(_) => DTypeKind::Int64,
            DenseArray::UInt8(_) => DTypeKind::UInt8,
            DenseArray::UInt16(_) => DTypeKind::UInt16,
            DenseArray::UInt32(_) => DTypeKind::UInt32,
            DenseArray::UInt64(_) => DTypeKind::UInt64,
            DenseArray::Float32(_) => DTypeKind::Float32,
            DenseArray::Float64(_) => DTypeKind::Float64,
        }
    }

    /// Values widened to `f64`.
    pub fn to_f64(&self) -> Array2<f64> {
        dense_match!(self, a => a.mapv(|x| x as f64))
    }

    /// Values cast to `int32` with numpy `astype` semantics: integers wrap,
    /// floats truncate, NaN and out-of-range floats become `i32::MIN`.
    pub fn cast_i32(&self) -> DenseArray {
        match self {
            DenseArray::Int32(a) => DenseArray::Int32(a.clone()),
            other => DenseArray::Int32(dense_match!(other, a => a.mapv(CastI32::cast_i32))),
        }
    }

    /// Cast `f64` values to the requested numeric kind.
    pub fn from_f64(values: &Array2<f64>, kind: DTypeKind) -> Result<DenseArray> {
        Ok(match kind {
            DTypeKind::Int8 => DenseArray::Int8(values.mapv(|x| x as i8)),
            DTypeKind::Int16 => DenseArray::Int16(values.mapv(|x| x as i16)),
            DTypeKind::Int32 => DenseArray::Int32(values.mapv(|x| x as i32)),
            DTypeKind::Int64 => DenseArray::Int64(values.mapv(|x| x as i64)),
            DTypeKind::UInt8 => DenseArray::UInt8(values.mapv(|x| x as u8)),
            DTypeKind::UInt16 => DenseArray::UInt16(values.mapv(|x| x as u16)),
            DTypeKind::UInt32 => DenseArray::UInt32(values.mapv(|x| x as u32)),
            DTypeKind::UInt64 => DenseArray::UInt64(values.mapv(|x| x as u64)),
            DTypeKind::Float32 => DenseArray::Float32(values.mapv(|x| x as f32)),
            DTypeKind::Float64 => DenseArray::Float64(values.clone()),
            other => {
                return Err(VitzarrError::InvalidInput(format!(
                    "cannot build a dense array of kind {other}"
                )))
            }
        })
    }

    /// Reshape a flat numeric column (row-major) into `(rows, cols)`.
    pub fn from_column(col: Column, shape: (usize, usize)) -> Result<DenseArray> {
        fn reshape<T>(v: Vec<T>, shape: (usize, usize)) -> Result<Array2<T>> {
            Array2::from_shape_vec(shape, v)
                .map_err(|e| VitzarrError::Parse(format!("array shape error: {e}")))
        }
        Ok(match col {
            Column::Int8(v) => DenseArray::Int8(reshape(v, shape)?),
            Column::Int16(v) => DenseArray::Int16(reshape(v, shape)?),
            Column::Int32(v) => DenseArray::Int32(reshape(v, shape)?),
            Column::Int64(v) => DenseArray::Int64(reshape(v, shape)?),
            Column::UInt8(v) => DenseArray::UInt8(reshape(v, shape)?),
            Column::UInt16(v) => DenseArray::UInt16(reshape(v, shape)?),
            Column::UInt32(v) => DenseArray::UInt32(reshape(v, shape)?),
            Column::UInt64(v) => DenseArray::UInt64(reshape(v, shape)?),
            Column::Float32(v) => DenseArray::Float32(reshape(v, shape)?),
            Column::Float64(v) => DenseArray::Float64(reshape(v, shape)?),
            other => {
                return Err(VitzarrError::Parse(format!(
                    "{} values cannot form a numeric array",
                    other.kind()
                )))
            }
        })
    }

    /// Row-major flat copy as a column of the same kind.
    pub fn to_flat_column(&self) -> Column {
        dense_match!(self, a => Column::from(a.iter().copied().collect::<Vec<_>>()))
    }

    /// Stack the columns of a table into an array, numpy-style.
    ///
    /// All columns sharing one numeric kind keep it; any other mix of numeric
    /// or boolean columns becomes `float64`. String and categorical columns
    /// are rejected.
    pub fn from_frame(df: &DataFrame) -> Result<DenseArray> {
        let n_rows = df.len();
        let n_cols = df.n_columns();
        let kinds: Vec<DTypeKind> = df.columns().map(|(_, c)| c.kind()).collect();
        if let Some((name, col)) = df
            .columns()
            .find(|(_, c)| !(c.kind().is_numeric() || c.kind() == DTypeKind::Bool))
        {
            return Err(VitzarrError::InvalidInput(format!(
                "column '{}' of kind {} cannot be converted to a numeric array",
                name,
                col.kind()
            )));
        }

        let uniform = kinds.first().copied().filter(|k| {
            k.is_numeric() && kinds.iter().all(|other| other == k)
        });
        match uniform {
            // Wider than the 53 bits f64 holds exactly.
            Some(DTypeKind::Int64) => {
                let cols: Vec<&Vec<i64>> = df
                    .columns()
                    .filter_map(|(_, c)| match c {
                        Column::Int64(v) => Some(v),
                        _ => None,
                    })
                    .collect();
                Ok(DenseArray::Int64(Array2::from_shape_fn((n_rows, n_cols), |(i, j)| cols[j][i])))
            }
            Some(DTypeKind::UInt64) => {
                let cols: Vec<&Vec<u64>> = df
                    .columns()
                    .filter_map(|(_, c)| match c {
                        Column::UInt64(v) => Some(v),
                        _ => None,
                    })
                    .collect();
                Ok(DenseArray::UInt64(Array2::from_shape_fn((n_rows, n_cols), |(i, j)| cols[j][i])))
            }
            _ => {
                // Column-major gather, then reinterpret as row-major.
                let mut flat = Vec::with_capacity(n_rows * n_cols);
                for (_, col) in df.columns() {
                    flat.extend(col_values_f64(col)?);
                }
                let values = Array2::from_shape_vec((n_rows, n_cols).f(), flat)
                    .map_err(|e| VitzarrError::InvalidInput(format!("frame shape error: {e}")))?
                    .as_standard_layout()
                    .to_owned();
                Self::from_f64(&values, uniform.unwrap_or(DTypeKind::Float64))
            }
        }
    }
}

fn col_values_f64(col: &Column) -> Result<Vec<f64>> {
    col.to_f64().ok_or_else(|| {
        VitzarrError::InvalidInput(format!("{} column is not numeric", col.kind()))
    })
}

/// An `obsm` entry: a plain array or a table with one row per observation.
#[derive(Debug, Clone, PartialEq)]
pub enum Embedding {
    Array(DenseArray),
    Frame(DataFrame),
}

impl Embedding {
    pub fn nrows(&self) -> usize {
        match self {
            Embedding::Array(a) => a.nrows(),
            Embedding::Frame(df) => df.len(),
        }
    }

    /// Element kind of an array entry; `None` for tables.
    pub fn kind(&self) -> Option<DTypeKind> {
        match self {
            Embedding::Array(a) => Some(a.kind()),
            Embedding::Frame(_) => None,
        }
    }

    pub fn as_array(&self) -> Option<&DenseArray> {
        match self {
            Embedding::Array(a) => Some(a),
            Embedding::Frame(_) => None,
        }
    }

    /// Borrowed array, or a new one stacked from the table's columns.
    pub fn to_array(&self) -> Result<Cow<'_, DenseArray>> {
        match self {
            Embedding::Array(a) => Ok(Cow::Borrowed(a)),
            Embedding::Frame(df) => DenseArray::from_frame(df).map(Cow::Owned),
        }
    }
}

impl From<DenseArray> for Embedding {
    fn from(a: DenseArray) -> Self {
        Embedding::Array(a)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Index;
    use ndarray::array;

    fn frame(columns: Vec<(&str, Column)>) -> DataFrame {
        let n = columns.first().map_or(0, |(_, c)| c.len());
        DataFrame::from_columns(
            Index::range(n),
            columns.into_iter().map(|(k, v)| (k.to_string(), v)),
        )
        .unwrap()
    }

    #[test]
    fn uniform_frame_keeps_kind() {
        let df = frame(vec![
            ("x", Column::Int32(vec![1, 2, 3])),
            ("y", Column::Int32(vec![4, 5, 6])),
        ]);
        let arr = DenseArray::from_frame(&df).unwrap();
        assert_eq!(arr, DenseArray::Int32(array![[1, 4], [2, 5], [3, 6]]));
    }

    #[test]
    fn int64_frame_is_exact() {
        let big = i64::MAX - 1;
        let df = frame(vec![
            ("x", Column::Int64(vec![big, 1])),
            ("y", Column::Int64(vec![2, 3])),
        ]);
        let arr = DenseArray::from_frame(&df).unwrap();
        assert_eq!(arr, DenseArray::Int64(array![[big, 2], [1, 3]]));
    }

    #[test]
    fn mixed_frame_becomes_float64() {
        let df = frame(vec![
            ("x", Column::Int8(vec![1, 2])),
            ("y", Column::Float32(vec![0.5, 1.5])),
            ("flag", Column::Bool(vec![true, false])),
        ]);
        let arr = DenseArray::from_frame(&df).unwrap();
        assert_eq!(arr, DenseArray::Float64(array![[1.0, 0.5, 1.0], [2.0, 1.5, 0.0]]));
    }

    #[test]
    fn string_frame_is_rejected() {
        let df = frame(vec![("label", Column::from(vec!["a", "b"]))]);
        assert!(DenseArray::from_frame(&df).is_err());
    }

    #[test]
    fn cast_i32_truncates_floats() {
        let arr = DenseArray::Float64(array![[1.9, -0.5], [3.0, 250.7]]);
        assert_eq!(arr.cast_i32(), DenseArray::Int32(array![[1, 0], [3, 250]]));
    }

    #[test]
    fn cast_i32_maps_nan_and_overflow_to_min() {
        let arr = DenseArray::Float64(array![[f64::NAN, 1e10], [-1e10, 7.5]]);
        assert_eq!(
            arr.cast_i32(),
            DenseArray::Int32(array![[i32::MIN, i32::MIN], [i32::MIN, 7]])
        );
        let wide = DenseArray::UInt64(array![[u64::from(u32::MAX) + 5]]);
        assert_eq!(wide.cast_i32(), DenseArray::Int32(array![[4]]));
    }

    #[test]
    fn column_round_trip() {
        let arr = DenseArray::UInt16(array![[1, 2, 3], [4, 5, 6]]);
        let col = arr.to_flat_column();
        assert_eq!(col, Column::UInt16(vec![1, 2, 3, 4, 5, 6]));
        assert_eq!(DenseArray::from_column(col, (2, 3)).unwrap(), arr);
        assert!(DenseArray::from_column(Column::Int8(vec![1, 2, 3]), (2, 2)).is_err());
    }

    #[test]
    fn embedding_rows() {
        let emb = Embedding::from(DenseArray::Float32(Array2::zeros((4, 2))));
        assert_eq!(emb.nrows(), 4);
        assert_eq!(emb.kind(), Some(DTypeKind::Float32));
    }
}
