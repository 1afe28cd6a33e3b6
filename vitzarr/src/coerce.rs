//! Normalization steps that make a dataset readable by the viewer.
//!
//! Each step mutates the dataset in place and reports what it changed so the
//! caller can log it at its own verbosity.

use std::borrow::Cow;

use vitzarr_anndata::frame::categorical_codes;
use vitzarr_anndata::{AnnData, Column, DTypeKind, DenseArray, Embedding, Index};
use vitzarr_core::Result;

/// Column holding the original observation labels after re-indexing.
pub const LABEL_COLUMN: &str = "label_id";
/// Embedding that is always stored as `int32`.
pub const SPATIAL_KEY: &str = "spatial";

/// What a column or embedding of a given dtype must become.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Coercion {
    /// `int8` and `int64` are narrowed (or widened) to `int32`.
    ToInt32,
    /// Booleans become `"True"`/`"False"` categoricals.
    ToCategorical,
    Keep,
}

/// The single dtype rule shared by the obs and obsm steps.
pub fn classify(kind: DTypeKind) -> Coercion {
    match kind {
        DTypeKind::Int8 | DTypeKind::Int64 => Coercion::ToInt32,
        DTypeKind::Bool => Coercion::ToCategorical,
        _ => Coercion::Keep,
    }
}

/// Make `column` the variable index. The previous index is kept as a column.
///
/// Returns `false` (and changes nothing) when `var` has no such column.
pub fn promote_var_index(adata: &mut AnnData, column: &str) -> Result<bool> {
    let var = adata.var_mut();
    if !var.contains(column) {
        return Ok(false);
    }
    var.reset_index()?;
    var.set_index_from_column(column)?;
    Ok(true)
}

/// Han ideographs with a Unihan numeric value (`kPrimaryNumeric`,
/// `kAccountingNumeric`). Their general category is `Lo`, so
/// `char::is_numeric` rejects them while Python's `str.isnumeric` accepts them.
const HAN_NUMERALS: &str = "零一二三四五六七八九十百千万萬億亿兆壹貳贰參叁肆伍陸柒捌玖拾佰仟";

fn is_numeric_char(c: char) -> bool {
    c.is_numeric() || HAN_NUMERALS.contains(c)
}

/// Non-empty and made only of numeric characters, as `str.isnumeric`.
fn is_numeric_label(label: &str) -> bool {
    !label.is_empty() && label.chars().all(is_numeric_char)
}

/// Replace a non-numeric observation index with stringified categorical
/// codes, keeping the original labels in [`LABEL_COLUMN`].
///
/// Returns whether the index was replaced.
pub fn normalize_obs_index(adata: &mut AnnData) -> Result<bool> {
    let index = adata.obs().index();
    if index.is_integer() {
        return Ok(false);
    }
    let labels = index.to_strings();
    if labels.iter().all(|l| is_numeric_label(l)) {
        return Ok(false);
    }

    let (codes, _) = categorical_codes(&labels);
    let obs = adata.obs_mut();
    obs.add_column(LABEL_COLUMN, Column::Strings(labels))?;
    obs.set_index(Index::from_strings(codes.iter().map(i32::to_string)))?;
    Ok(true)
}

/// Turn frame-valued embeddings into plain arrays. Returns the converted keys.
pub fn embeddings_to_arrays(adata: &mut AnnData) -> Result<Vec<String>> {
    let mut converted = Vec::new();
    adata.try_map_obsm(|key, entry| match entry {
        Embedding::Frame(df) => {
            let array = DenseArray::from_frame(df)?;
            converted.push(key.to_string());
            Ok(Some(Embedding::Array(array)))
        }
        Embedding::Array(_) => Ok(None),
    })?;
    Ok(converted)
}

/// Apply [`classify`] to every obs column. Returns `(column, from, to)` for
/// each column whose dtype changed.
pub fn coerce_obs_dtypes(adata: &mut AnnData) -> Result<Vec<(String, DTypeKind, DTypeKind)>> {
    let mut changed = Vec::new();
    adata.obs_mut().try_map_columns(|name, col| {
        let from = col.kind();
        let coerced = match classify(from) {
            Coercion::ToInt32 => col.cast_i32(),
            Coercion::ToCategorical => Some(Column::categorical_from_strings(&col.to_strings())),
            Coercion::Keep => None,
        };
        if let Some(to) = coerced.as_ref().map(Column::kind).filter(|&to| to != from) {
            changed.push((name.to_string(), from, to));
        }
        Ok(coerced)
    })?;
    Ok(changed)
}

/// Arrays for every embedding, `int32` for narrow-int kinds and for
/// [`SPATIAL_KEY`]. Returns `(key, from, to)` for each dtype change.
pub fn coerce_obsm_dtypes(adata: &mut AnnData) -> Result<Vec<(String, DTypeKind, DTypeKind)>> {
    let mut changed = Vec::new();
    adata.try_map_obsm(|key, entry| {
        let array = entry.to_array()?;
        let from = array.kind();
        let coerced = if classify(from) == Coercion::ToInt32 || key == SPATIAL_KEY {
            Cow::Owned(array.cast_i32())
        } else {
            array
        };
        if coerced.kind() != from {
            changed.push((key.to_string(), from, coerced.kind()));
        }
        Ok(match coerced {
            Cow::Owned(array) => Some(Embedding::Array(array)),
            Cow::Borrowed(_) => None,
        })
    })?;
    Ok(changed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array2};
    use vitzarr_anndata::{DataFrame, IndexValues, MatrixData};

    fn adata_with_obs(index: Index) -> AnnData {
        let n = index.len();
        AnnData::new(
            MatrixData::Dense(Array2::zeros((n, 2))),
            DataFrame::new(index),
            DataFrame::new(Index::from_strings(["g1", "g2"])),
        )
        .unwrap()
    }

    #[test]
    fn classification() {
        assert_eq!(classify(DTypeKind::Int8), Coercion::ToInt32);
        assert_eq!(classify(DTypeKind::Int64), Coercion::ToInt32);
        assert_eq!(classify(DTypeKind::Bool), Coercion::ToCategorical);
        for kind in [
            DTypeKind::Int16,
            DTypeKind::Int32,
            DTypeKind::UInt8,
            DTypeKind::UInt64,
            DTypeKind::Float32,
            DTypeKind::String,
            DTypeKind::Categorical,
        ] {
            assert_eq!(classify(kind), Coercion::Keep, "{kind}");
        }
    }

    #[test]
    fn integer_obs_index_is_kept() {
        let mut adata = adata_with_obs(Index::range(3));
        assert!(!normalize_obs_index(&mut adata).unwrap());
        assert!(!adata.obs().contains(LABEL_COLUMN));
    }

    #[test]
    fn numeric_string_obs_index_is_kept() {
        let mut adata = adata_with_obs(Index::from_strings(["10", "2", "٣"]));
        assert!(!normalize_obs_index(&mut adata).unwrap());
        assert_eq!(adata.obs_names(), vec!["10", "2", "٣"]);
    }

    #[test]
    fn han_numerals_count_as_numeric() {
        for label in ["一", "二十", "三百", "壹萬", "½", "Ⅻ", "〇"] {
            assert!(is_numeric_label(label), "{label}");
        }
        for label in ["", "1.5", "-3", "一a", "甲", "cell一"] {
            assert!(!is_numeric_label(label), "{label}");
        }
        let mut adata = adata_with_obs(Index::from_strings(["一", "二", "十"]));
        assert!(!normalize_obs_index(&mut adata).unwrap());
        assert_eq!(adata.obs_names(), vec!["一", "二", "十"]);
    }

    #[test]
    fn text_obs_index_becomes_codes() {
        let mut adata = adata_with_obs(Index::from_strings(["cell_b", "cell_a", "cell_c"]));
        assert!(normalize_obs_index(&mut adata).unwrap());
        assert_eq!(adata.obs_names(), vec!["1", "0", "2"]);
        assert_eq!(
            adata.obs().column(LABEL_COLUMN),
            Some(&Column::from(vec!["cell_b", "cell_a", "cell_c"]))
        );
    }

    #[test]
    fn repeated_labels_share_a_code() {
        let mut adata = adata_with_obs(Index::from_strings(["x", "y", "x", ""]));
        assert!(normalize_obs_index(&mut adata).unwrap());
        assert_eq!(adata.obs_names(), vec!["1", "2", "1", "0"]);
    }

    #[test]
    fn mixed_numeric_and_empty_labels_are_reindexed() {
        let mut adata = adata_with_obs(Index::from_strings(["1", "", "3"]));
        assert!(normalize_obs_index(&mut adata).unwrap());
        assert!(matches!(adata.obs().index().values(), IndexValues::Str(_)));
    }

    #[test]
    fn var_index_promotion() {
        let mut adata = adata_with_obs(Index::range(2));
        adata
            .add_var_column("symbol", Column::from(vec!["TP53", "GAPDH"]))
            .unwrap();
        adata.var_mut().index_mut().set_name(Some("ensembl".into()));

        assert!(!promote_var_index(&mut adata, "missing").unwrap());
        assert!(promote_var_index(&mut adata, "symbol").unwrap());
        assert_eq!(adata.var_names(), vec!["TP53", "GAPDH"]);
        assert_eq!(adata.var().index().name(), Some("symbol"));
        assert_eq!(
            adata.var().column("ensembl"),
            Some(&Column::from(vec!["g1", "g2"]))
        );
        assert!(!adata.var().contains("symbol"));
    }

    #[test]
    fn obs_dtype_coercion() {
        let mut adata = adata_with_obs(Index::range(2));
        adata.add_obs_column("small", Column::Int8(vec![1, -1])).unwrap();
        adata.add_obs_column("big", Column::Int64(vec![7, 8])).unwrap();
        adata.add_obs_column("flag", Column::Bool(vec![true, false])).unwrap();
        adata.add_obs_column("wide", Column::UInt64(vec![1, 2])).unwrap();
        adata.add_obs_column("score", Column::Float32(vec![0.5, 1.5])).unwrap();

        let changed = coerce_obs_dtypes(&mut adata).unwrap();
        assert_eq!(changed.len(), 3);

        let obs = adata.obs();
        assert_eq!(obs.column("small"), Some(&Column::Int32(vec![1, -1])));
        assert_eq!(obs.column("big"), Some(&Column::Int32(vec![7, 8])));
        assert_eq!(
            obs.column("flag"),
            Some(&Column::Categorical {
                codes: vec![1, 0],
                categories: vec!["False".into(), "True".into()],
                ordered: false,
            })
        );
        assert_eq!(obs.column("wide").map(Column::kind), Some(DTypeKind::UInt64));
        assert_eq!(obs.column("score").map(Column::kind), Some(DTypeKind::Float32));
        assert!(obs
            .columns()
            .all(|(_, c)| !matches!(c.kind(), DTypeKind::Int8 | DTypeKind::Int64 | DTypeKind::Bool)));
    }

    #[test]
    fn obsm_dtype_coercion() {
        let mut adata = adata_with_obs(Index::range(2));
        adata
            .add_obsm("spatial", DenseArray::Float64(array![[1.7, 2.2], [3.0, 4.9]]))
            .unwrap();
        adata
            .add_obsm("counts", DenseArray::Int64(array![[1], [2]]))
            .unwrap();
        adata
            .add_obsm("X_pca", DenseArray::Float32(array![[0.5], [0.25]]))
            .unwrap();
        let frame = DataFrame::from_columns(
            Index::range(2),
            [
                ("a".to_string(), Column::Int8(vec![1, 2])),
                ("b".to_string(), Column::Int8(vec![3, 4])),
            ],
        )
        .unwrap();
        adata.add_obsm("table", Embedding::Frame(frame)).unwrap();

        assert_eq!(embeddings_to_arrays(&mut adata).unwrap(), vec!["table"]);
        let changed = coerce_obsm_dtypes(&mut adata).unwrap();
        assert_eq!(changed.len(), 3);

        let get = |k: &str| adata.get_obsm(k).and_then(Embedding::as_array).cloned();
        assert_eq!(get("spatial"), Some(DenseArray::Int32(array![[1, 2], [3, 4]])));
        assert_eq!(get("counts"), Some(DenseArray::Int32(array![[1], [2]])));
        assert_eq!(get("table"), Some(DenseArray::Int32(array![[1, 3], [2, 4]])));
        assert_eq!(get("X_pca").map(|a| a.kind()), Some(DTypeKind::Float32));
    }

    #[test]
    fn non_numeric_embedding_frame_fails() {
        let mut adata = adata_with_obs(Index::range(2));
        let frame = DataFrame::from_columns(
            Index::range(2),
            [("label".to_string(), Column::from(vec!["a", "b"]))],
        )
        .unwrap();
        adata.add_obsm("bad", Embedding::Frame(frame)).unwrap();
        assert!(embeddings_to_arrays(&mut adata).is_err());
    }
}
