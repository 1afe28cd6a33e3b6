//! Zarr-backed AnnData reader/writer for `.zarr` directories.
//!
//! Stores are written in the Zarr v2 format (`.zgroup`, `.zarray` and
//! `.zattrs` per node, `.`-separated chunk keys, uncompressed chunks) through
//! the `zarrs` crate, with the AnnData node layout and encoding attributes.
//! String arrays use the `vlen-utf8` filter, as zarr-python does, so that
//! `anndata` and the viewers built on zarr.js can open them.

use std::num::NonZeroU64;
use std::path::Path;
use std::sync::Arc;

use serde_json::{Map, Value};
use zarrs::array::{Array, DataType, Element, ElementOwned};
use zarrs::filesystem::FilesystemStore;
use zarrs::group::Group;
use zarrs::metadata::v2::array::{DataTypeMetadataV2, FillValueMetadataV2};
use zarrs::metadata::v2::{ArrayMetadataV2, GroupMetadataV2, MetadataV2};
use zarrs::metadata::{ArrayMetadata, ChunkShape, GroupMetadata};
use zarrs::storage::{ReadableWritableListableStorage, ReadableWritableListableStorageTraits};

use vitzarr_core::{Result, VitzarrError};

use crate::array::{dense_match, DenseArray, Embedding};
use crate::dataset::{AnnData, Raw};
use crate::dtype::DTypeKind;
use crate::encoding::{
    attributes, ANNDATA, ARRAY, CATEGORICAL, COLUMN_ORDER_ATTR, CSR_MATRIX, DATAFRAME, DICT,
    ENCODING_TYPE, INDEX_ATTR, STRING_ARRAY,
};
use crate::frame::{numeric_match, Column, DataFrame, Index};
use crate::matrix::{compressed_from_parts, csr_parts, MatrixData};

type Store = ReadableWritableListableStorage;
type StoreArray = Array<dyn ReadableWritableListableStorageTraits>;

fn zarr_err(e: impl std::fmt::Display) -> VitzarrError {
    VitzarrError::Zarr(e.to_string())
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Write an [`AnnData`] container to a `.zarr` directory.
///
/// An existing store at `path` is replaced. `x_chunks` sets the chunk shape
/// of a dense `X`; other arrays are stored as a single chunk. Zero chunk
/// extents are raised to 1.
pub fn write_zarr<P: AsRef<Path>>(adata: &AnnData, path: P, x_chunks: Option<[u64; 2]>) -> Result<()> {
    let path = path.as_ref();
    if path.is_dir() {
        vitzarr_core::debug!("replacing existing store {}", path.display());
        std::fs::remove_dir_all(path)?;
    } else if path.exists() {
        std::fs::remove_file(path)?;
    }
    std::fs::create_dir_all(path).map_err(|e| {
        VitzarrError::Io(std::io::Error::new(
            e.kind(),
            format!("{}: {}", path.display(), e),
        ))
    })?;

    let store: Store = Arc::new(FilesystemStore::new(path).map_err(zarr_err)?);
    write_group(&store, "/", ANNDATA)?;

    write_matrix(&store, "/X", adata.x(), adata.x_dtype(), x_chunks)?;
    write_dataframe(&store, "/obs", adata.obs())?;
    write_dataframe(&store, "/var", adata.var())?;

    write_group(&store, "/obsm", DICT)?;
    for (key, entry) in adata.obsm() {
        let node = format!("/obsm/{key}");
        match entry {
            Embedding::Array(arr) => write_dense(&store, &node, arr)?,
            Embedding::Frame(df) => write_dataframe(&store, &node, df)?,
        }
    }
    write_group(&store, "/varm", DICT)?;
    for (key, arr) in adata.varm() {
        write_dense(&store, &format!("/varm/{key}"), arr)?;
    }
    write_group(&store, "/obsp", DICT)?;
    for (key, m) in adata.obsp() {
        write_sparse(&store, &format!("/obsp/{key}"), m, DTypeKind::Float64)?;
    }
    write_group(&store, "/layers", DICT)?;
    for (key, layer) in adata.layers() {
        write_matrix(&store, &format!("/layers/{key}"), layer, adata.x_dtype(), None)?;
    }
    write_group(&store, "/uns", DICT)?;
    for (key, value) in adata.uns() {
        write_column(&store, &format!("/uns/{key}"), value)?;
    }

    if let Some(raw) = adata.raw() {
        write_group(&store, "/raw", DICT)?;
        write_matrix(&store, "/raw/X", &raw.x, adata.x_dtype(), None)?;
        write_dataframe(&store, "/raw/var", &raw.var)?;
    }

    vitzarr_core::info!(
        "wrote {} ({} obs x {} vars)",
        path.display(),
        adata.n_obs(),
        adata.n_vars()
    );
    Ok(())
}

/// Read a `.zarr` directory written by [`write_zarr`] into an [`AnnData`].
pub fn read_zarr<P: AsRef<Path>>(path: P) -> Result<AnnData> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(VitzarrError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("{}: not found", path.display()),
        )));
    }
    let store: Store = Arc::new(FilesystemStore::new(path).map_err(zarr_err)?);

    let (x, x_kind) = read_matrix(&store, "/X")?;
    let (n_obs, n_vars) = x.shape();
    let obs = read_dataframe(&store, "/obs", n_obs)?;
    let var = read_dataframe(&store, "/var", n_vars)?;
    let mut adata = AnnData::new(x, obs, var)?;
    if x_kind.is_float() {
        adata.set_x_dtype(x_kind)?;
    }

    for name in list_members(path, "/obsm") {
        let node = format!("/obsm/{name}");
        let entry = match StoreArray::open(store.clone(), &node) {
            Ok(array) => Embedding::Array(read_dense(&array)?),
            Err(_) => Embedding::Frame(read_dataframe(&store, &node, n_obs)?),
        };
        adata.add_obsm(&name, entry)?;
    }
    for name in list_members(path, "/varm") {
        let array = StoreArray::open(store.clone(), &format!("/varm/{name}")).map_err(zarr_err)?;
        adata.add_varm(&name, read_dense(&array)?)?;
    }
    for name in list_members(path, "/obsp") {
        let (m, _) = read_sparse(&store, &format!("/obsp/{name}"))?;
        adata.add_obsp(&name, m)?;
    }
    for name in list_members(path, "/layers") {
        let (layer, _) = read_matrix(&store, &format!("/layers/{name}"))?;
        adata.add_layer(&name, layer)?;
    }
    for name in list_members(path, "/uns") {
        let node = format!("/uns/{name}");
        let value = match StoreArray::open(store.clone(), &node) {
            Ok(array) => read_elements(&array)?,
            Err(_) => read_categorical(&store, &node)?,
        };
        adata.add_uns(&name, value);
    }

    if path.join("raw").is_dir() {
        let (x, _) = read_matrix(&store, "/raw/X")?;
        let n_raw_vars = x.shape().1;
        let var = read_dataframe(&store, "/raw/var", n_raw_vars)?;
        adata.set_raw(Raw { x, var })?;
    }
    Ok(adata)
}

// ---------------------------------------------------------------------------
// Internal: nodes
// ---------------------------------------------------------------------------

fn write_group(store: &Store, path: &str, encoding: (&str, &str)) -> Result<()> {
    write_group_with(store, path, attributes(encoding))
}

fn write_group_with(store: &Store, path: &str, attrs: Map<String, Value>) -> Result<()> {
    let metadata = GroupMetadataV2::new().with_attributes(attrs);
    let group = Group::new_with_metadata(store.clone(), path, GroupMetadata::V2(metadata))
        .map_err(zarr_err)?;
    group.store_metadata().map_err(zarr_err)?;
    Ok(())
}

fn group_attributes(store: &Store, path: &str) -> Result<Map<String, Value>> {
    let group = Group::open(store.clone(), path).map_err(zarr_err)?;
    Ok(group.attributes().clone())
}

fn encoding_of(attrs: &Map<String, Value>) -> Option<&str> {
    attrs.get(ENCODING_TYPE).and_then(Value::as_str)
}

/// Child node names of a group directory, sorted.
fn list_members(root: &Path, group_path: &str) -> Vec<String> {
    let dir = root.join(group_path.trim_start_matches('/'));
    let Ok(entries) = std::fs::read_dir(&dir) else {
        return Vec::new();
    };
    let mut names: Vec<String> = entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().is_dir())
        .map(|entry| entry.file_name().to_string_lossy().to_string())
        .collect();
    names.sort();
    names
}

fn chunk_extents(chunks: &[u64]) -> ChunkShape {
    let nz: Vec<NonZeroU64> = chunks
        .iter()
        .map(|&s| NonZeroU64::new(s.max(1)).unwrap_or(NonZeroU64::MIN))
        .collect();
    ChunkShape::from(nz)
}

/// The numpy type string, fill value and filters of a v2 array of `kind`.
fn zarr_v2_type(
    kind: DTypeKind,
) -> Result<(&'static str, FillValueMetadataV2, Option<Vec<MetadataV2>>)> {
    let zero_int = FillValueMetadataV2::Number(0u64.into());
    let zero_float = serde_json::Number::from_f64(0.0)
        .map_or(FillValueMetadataV2::NaN, FillValueMetadataV2::Number);
    Ok(match kind {
        DTypeKind::Int8 => ("|i1", zero_int, None),
        DTypeKind::Int16 => ("<i2", zero_int, None),
        DTypeKind::Int32 => ("<i4", zero_int, None),
        DTypeKind::Int64 => ("<i8", zero_int, None),
        DTypeKind::UInt8 => ("|u1", zero_int, None),
        DTypeKind::UInt16 => ("<u2", zero_int, None),
        DTypeKind::UInt32 => ("<u4", zero_int, None),
        DTypeKind::UInt64 => ("<u8", zero_int, None),
        DTypeKind::Float32 => ("<f4", zero_float, None),
        DTypeKind::Float64 => ("<f8", zero_float, None),
        DTypeKind::Bool => ("|b1", zero_int, None),
        DTypeKind::String => {
            let vlen_utf8: MetadataV2 =
                serde_json::from_value(serde_json::json!({ "id": "vlen-utf8" })).map_err(zarr_err)?;
            ("|O", FillValueMetadataV2::Null, Some(vec![vlen_utf8]))
        }
        DTypeKind::Categorical => {
            return Err(VitzarrError::InvalidInput(
                "categoricals are stored as groups, not arrays".into(),
            ))
        }
    })
}

/// Store `data` (row-major) as one array node.
fn write_elements<T: Element>(
    store: &Store,
    path: &str,
    kind: DTypeKind,
    data: &[T],
    shape: &[u64],
    chunks: Option<&[u64]>,
    encoding: (&str, &str),
) -> Result<()> {
    let (dtype, fill_value, filters) = zarr_v2_type(kind)?;
    let metadata = ArrayMetadataV2::new(
        shape.to_vec(),
        chunk_extents(chunks.unwrap_or(shape)),
        DataTypeMetadataV2::Simple(dtype.to_string()),
        fill_value,
        None,
        filters,
    )
    .with_attributes(attributes(encoding));
    let array = StoreArray::new_with_metadata(store.clone(), path, ArrayMetadata::V2(metadata))
        .map_err(zarr_err)?;
    array.store_metadata().map_err(zarr_err)?;
    if !data.is_empty() {
        array
            .store_array_subset_elements::<T>(&array.subset_all(), data)
            .map_err(zarr_err)?;
    }
    Ok(())
}

fn retrieve<T: ElementOwned>(array: &StoreArray) -> Result<Vec<T>> {
    if array.shape().iter().product::<u64>() == 0 {
        return Ok(Vec::new());
    }
    array
        .retrieve_array_subset_elements::<T>(&array.subset_all())
        .map_err(zarr_err)
}

/// Read an array node of any supported element type, flattened.
fn read_elements(array: &StoreArray) -> Result<Column> {
    let col = match array.data_type() {
        DataType::Int8 => Column::Int8(retrieve(array)?),
        DataType::Int16 => Column::Int16(retrieve(array)?),
        DataType::Int32 => Column::Int32(retrieve(array)?),
        DataType::Int64 => Column::Int64(retrieve(array)?),
        DataType::UInt8 => Column::UInt8(retrieve(array)?),
        DataType::UInt16 => Column::UInt16(retrieve(array)?),
        DataType::UInt32 => Column::UInt32(retrieve(array)?),
        DataType::UInt64 => Column::UInt64(retrieve(array)?),
        DataType::Float32 => Column::Float32(retrieve(array)?),
        DataType::Float64 => Column::Float64(retrieve(array)?),
        DataType::Bool => Column::Bool(retrieve(array)?),
        DataType::String => Column::Strings(retrieve(array)?),
        other => {
            return Err(VitzarrError::Zarr(format!(
                "unsupported array data type {other:?}"
            )))
        }
    };
    Ok(col)
}

fn open_elements(store: &Store, path: &str) -> Result<Column> {
    let array = StoreArray::open(store.clone(), path).map_err(zarr_err)?;
    read_elements(&array)
}

// ---------------------------------------------------------------------------
// Internal: matrices and arrays
// ---------------------------------------------------------------------------

fn write_matrix(
    store: &Store,
    path: &str,
    m: &MatrixData,
    kind: DTypeKind,
    chunks: Option<[u64; 2]>,
) -> Result<()> {
    match m {
        MatrixData::Dense(a) => {
            let shape = [a.nrows() as u64, a.ncols() as u64];
            let chunks = chunks.as_ref().map(|c| c.as_slice());
            if kind == DTypeKind::Float32 {
                let flat: Vec<f32> = a.iter().map(|&v| v as f32).collect();
                write_elements(store, path, kind, &flat, &shape, chunks, ARRAY)
            } else {
                let flat: Vec<f64> = a.iter().copied().collect();
                write_elements(store, path, DTypeKind::Float64, &flat, &shape, chunks, ARRAY)
            }
        }
        MatrixData::Sparse(sm) => write_sparse(store, path, sm, kind),
    }
}

fn write_sparse(store: &Store, path: &str, m: &sprs::CsMat<f64>, kind: DTypeKind) -> Result<()> {
    let (indptr, indices, data) = csr_parts(m);
    let mut attrs = attributes(CSR_MATRIX);
    attrs.insert("shape".into(), Value::from(vec![m.rows() as u64, m.cols() as u64]));
    write_group_with(store, path, attrs)?;

    let data_path = format!("{path}/data");
    if kind == DTypeKind::Float32 {
        let narrow: Vec<f32> = data.iter().map(|&v| v as f32).collect();
        write_elements(store, &data_path, kind, &narrow, &[narrow.len() as u64], None, ARRAY)?;
    } else {
        let len = data.len() as u64;
        write_elements(store, &data_path, DTypeKind::Float64, &data, &[len], None, ARRAY)?;
    }
    for (member, values) in [("indices", indices), ("indptr", indptr)] {
        let wide: Vec<i64> = values.into_iter().map(|v| v as i64).collect();
        let len = wide.len() as u64;
        write_elements(store, &format!("{path}/{member}"), DTypeKind::Int64, &wide, &[len], None, ARRAY)?;
    }
    Ok(())
}

fn read_matrix(store: &Store, path: &str) -> Result<(MatrixData, DTypeKind)> {
    if let Ok(array) = StoreArray::open(store.clone(), path) {
        let dense = read_dense(&array)?;
        return Ok((MatrixData::Dense(dense.to_f64()), dense.kind()));
    }
    let (m, kind) = read_sparse(store, path)?;
    Ok((MatrixData::Sparse(m), kind))
}

fn read_sparse(store: &Store, path: &str) -> Result<(sprs::CsMat<f64>, DTypeKind)> {
    let attrs = group_attributes(store, path)?;
    let csr = match encoding_of(&attrs) {
        Some("csr_matrix") => true,
        Some("csc_matrix") => false,
        other => {
            return Err(VitzarrError::Parse(format!(
                "{path}: unsupported sparse encoding-type {other:?}"
            )))
        }
    };
    let shape: Vec<usize> = attrs
        .get("shape")
        .and_then(Value::as_array)
        .map(|dims| dims.iter().filter_map(Value::as_u64).map(|d| d as usize).collect())
        .unwrap_or_default();
    let [rows, cols] = shape[..] else {
        return Err(VitzarrError::Parse(format!("{path}: missing shape attribute")));
    };

    let data_col = open_elements(store, &format!("{path}/data"))?;
    let kind = data_col.kind();
    let data = data_col
        .to_f64()
        .ok_or_else(|| VitzarrError::Parse(format!("{path}/data is not numeric")))?;
    let indices = read_offsets(store, &format!("{path}/indices"))?;
    let indptr = read_offsets(store, &format!("{path}/indptr"))?;
    let m = compressed_from_parts((rows, cols), indptr, indices, data, csr)?;
    Ok((m, kind))
}

fn read_offsets(store: &Store, path: &str) -> Result<Vec<usize>> {
    let col = open_elements(store, path)?;
    if !col.kind().is_integer() {
        return Err(VitzarrError::Parse(format!("{path} is not an integer array")));
    }
    let values = col.to_f64().unwrap_or_default();
    values
        .into_iter()
        .map(|v| {
            if v < 0.0 {
                Err(VitzarrError::Parse(format!("{path}: negative offset {v}")))
            } else {
                Ok(v as usize)
            }
        })
        .collect()
}

fn write_dense(store: &Store, path: &str, arr: &DenseArray) -> Result<()> {
    let (rows, cols) = arr.dim();
    let shape = [rows as u64, cols as u64];
    dense_match!(arr, a => {
        let flat: Vec<_> = a.iter().copied().collect();
        write_elements(store, path, arr.kind(), &flat, &shape, None, ARRAY)
    })
}

fn read_dense(array: &StoreArray) -> Result<DenseArray> {
    let dims = match array.shape() {
        [rows, cols] => (*rows as usize, *cols as usize),
        [rows] => (*rows as usize, 1),
        other => {
            return Err(VitzarrError::Parse(format!(
                "expected a 1-D or 2-D array, found {} dimensions",
                other.len()
            )))
        }
    };
    DenseArray::from_column(read_elements(array)?, dims)
}

// ---------------------------------------------------------------------------
// Internal: dataframes and columns
// ---------------------------------------------------------------------------

fn write_dataframe(store: &Store, path: &str, df: &DataFrame) -> Result<()> {
    let index_key = df.index().name().unwrap_or(INDEX_ATTR);
    let mut attrs = attributes(DATAFRAME);
    attrs.insert(INDEX_ATTR.into(), Value::from(index_key));
    attrs.insert(
        COLUMN_ORDER_ATTR.into(),
        Value::from(df.column_names().collect::<Vec<_>>()),
    );
    write_group_with(store, path, attrs)?;

    write_column(store, &format!("{path}/{index_key}"), &df.index().to_column())?;
    for (key, col) in df.columns() {
        write_column(store, &format!("{path}/{key}"), col)?;
    }
    Ok(())
}

fn read_dataframe(store: &Store, path: &str, n_rows: usize) -> Result<DataFrame> {
    let attrs = group_attributes(store, path)?;
    let index_key = attrs
        .get(INDEX_ATTR)
        .and_then(Value::as_str)
        .unwrap_or(INDEX_ATTR)
        .to_string();
    let mut index = Index::from_column(open_elements(store, &format!("{path}/{index_key}"))?);
    if index_key != INDEX_ATTR {
        index.set_name(Some(index_key));
    }
    if index.len() != n_rows {
        return Err(VitzarrError::Parse(format!(
            "{path}: index has {} entries, expected {n_rows}",
            index.len()
        )));
    }

    let order: Vec<String> = attrs
        .get(COLUMN_ORDER_ATTR)
        .and_then(Value::as_array)
        .map(|names| names.iter().filter_map(Value::as_str).map(str::to_string).collect())
        .unwrap_or_default();
    let mut df = DataFrame::new(index);
    for name in order {
        let node = format!("{path}/{name}");
        let col = match StoreArray::open(store.clone(), &node) {
            Ok(array) => read_elements(&array)?,
            Err(_) => read_categorical(store, &node)?,
        };
        df.add_column(&name, col)?;
    }
    Ok(df)
}

fn write_column(store: &Store, path: &str, col: &Column) -> Result<()> {
    let len = [col.len() as u64];
    match col {
        Column::Strings(values) => {
            write_elements(store, path, DTypeKind::String, values, &len, None, STRING_ARRAY)
        }
        Column::Bool(values) => write_elements(store, path, DTypeKind::Bool, values, &len, None, ARRAY),
        Column::Categorical {
            codes,
            categories,
            ordered,
        } => {
            let mut attrs = attributes(CATEGORICAL);
            attrs.insert("ordered".into(), Value::from(*ordered));
            write_group_with(store, path, attrs)?;
            write_elements(store, &format!("{path}/codes"), DTypeKind::Int32, codes, &len, None, ARRAY)?;
            write_elements(
                store,
                &format!("{path}/categories"),
                DTypeKind::String,
                categories,
                &[categories.len() as u64],
                None,
                STRING_ARRAY,
            )
        }
        numeric => numeric_match!(numeric,
            v => write_elements(store, path, numeric.kind(), v, &len, None, ARRAY),
            other => Err(VitzarrError::InvalidInput(format!(
                "cannot store {} column at {path}", other.kind()
            )))),
    }
}

fn read_categorical(store: &Store, path: &str) -> Result<Column> {
    let attrs = group_attributes(store, path)?;
    if encoding_of(&attrs) != Some("categorical") {
        return Err(VitzarrError::Parse(format!(
            "{path}: unsupported column encoding-type {:?}",
            encoding_of(&attrs)
        )));
    }
    let codes = match open_elements(store, &format!("{path}/codes"))? {
        Column::Int32(codes) => codes,
        other => other
            .cast_i32()
            .and_then(|c| match c {
                Column::Int32(codes) => Some(codes),
                _ => None,
            })
            .ok_or_else(|| VitzarrError::Parse(format!("{path}/codes is not numeric")))?,
    };
    let categories = open_elements(store, &format!("{path}/categories"))?.to_strings();
    let ordered = attrs.get("ordered").and_then(Value::as_bool).unwrap_or(false);
    Ok(Column::Categorical {
        codes,
        categories,
        ordered,
    })
}

/// Chunk shape recorded for an array node.
pub fn chunk_shape<P: AsRef<Path>>(store_path: P, node: &str) -> Result<Vec<u64>> {
    let store: Store = Arc::new(FilesystemStore::new(store_path.as_ref()).map_err(zarr_err)?);
    let array = StoreArray::open(store, node).map_err(zarr_err)?;
    let shape = array
        .chunk_shape(&vec![0; array.dimensionality()])
        .map_err(zarr_err)?;
    Ok(shape.iter().map(|d| d.get()).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::csr_from_triplets;
    use ndarray::{array, Array2};
    use tempfile::TempDir;

    fn sample_adata() -> AnnData {
        let mut adata = AnnData::from_names(
            MatrixData::Dense(array![[1.0, 2.0, 0.0], [0.0, 3.0, 4.0]]),
            vec!["0".into(), "1".into()],
            vec!["gene_a".into(), "gene_b".into(), "gene_c".into()],
        )
        .unwrap();
        adata.add_obs_column("n_counts", Column::Int32(vec![3, 7])).unwrap();
        adata.add_obs_column("label_id", Column::from(vec!["AAAC", "AAAG"])).unwrap();
        adata
            .add_obs_column(
                "is_doublet",
                Column::Categorical {
                    codes: vec![1, 0],
                    categories: vec!["False".into(), "True".into()],
                    ordered: false,
                },
            )
            .unwrap();
        adata.add_var_column("highly_variable", Column::Bool(vec![true, false, true])).unwrap();
        adata
            .add_obsm("spatial", DenseArray::Int32(array![[10, 20], [30, 40]]))
            .unwrap();
        adata
            .add_varm("PCs", DenseArray::Float64(Array2::ones((3, 2))))
            .unwrap();
        adata
            .add_obsp("connectivities", csr_from_triplets((2, 2), [(0, 1, 1.0), (1, 0, 1.0)]))
            .unwrap();
        adata.add_uns("pca_variance", vec![2.0, 1.0]);
        adata
    }

    #[test]
    fn write_read_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sample_anndata.zarr");
        let adata = sample_adata();
        write_zarr(&adata, &path, Some([2, 10])).unwrap();

        let loaded = read_zarr(&path).unwrap();
        assert_eq!(loaded.shape(), (2, 3));
        assert_eq!(loaded.obs_names(), vec!["0", "1"]);
        assert_eq!(loaded.var_names(), vec!["gene_a", "gene_b", "gene_c"]);
        assert_eq!(loaded.x_dtype(), DTypeKind::Float32);
        assert_eq!(loaded.x().to_dense(), adata.x().to_dense());
        assert_eq!(loaded.obs(), adata.obs());
        assert_eq!(loaded.var(), adata.var());
        assert_eq!(loaded.get_obsm("spatial"), adata.get_obsm("spatial"));
        assert_eq!(loaded.get_varm("PCs"), adata.get_varm("PCs"));
        assert_eq!(loaded.get_obsp("connectivities").map(|m| m.nnz()), Some(2));
        assert_eq!(loaded.get_uns("pca_variance"), Some(&Column::Float64(vec![2.0, 1.0])));
    }

    #[test]
    fn x_uses_requested_chunks() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("chunked.zarr");
        write_zarr(&sample_adata(), &path, Some([2, 10])).unwrap();
        assert_eq!(chunk_shape(&path, "/X").unwrap(), vec![2, 10]);
        // Other arrays are a single chunk.
        assert_eq!(chunk_shape(&path, "/obsm/spatial").unwrap(), vec![2, 2]);
    }

    fn read_json(path: &Path) -> Value {
        serde_json::from_slice(&std::fs::read(path).unwrap()).unwrap()
    }

    #[test]
    fn nodes_use_zarr_v2_metadata_files() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("v2.zarr");
        write_zarr(&sample_adata(), &path, Some([2, 10])).unwrap();

        assert!(!path.join("zarr.json").exists());
        assert_eq!(read_json(&path.join(".zgroup"))["zarr_format"], 2);
        assert_eq!(read_json(&path.join(".zattrs"))[ENCODING_TYPE], "anndata");

        let x = read_json(&path.join("X/.zarray"));
        assert_eq!(x["zarr_format"], 2);
        assert_eq!(x["shape"], serde_json::json!([2, 3]));
        assert_eq!(x["chunks"], serde_json::json!([2, 10]));
        assert_eq!(x["dtype"], "<f4");
        assert_eq!(x["dimension_separator"], ".");
        assert!(path.join("X/0.0").is_file());
        assert_eq!(read_json(&path.join("X/.zattrs"))[ENCODING_TYPE], "array");

        let index = read_json(&path.join("obs/_index/.zarray"));
        assert_eq!(index["dtype"], "|O");
        assert_eq!(index["filters"][0]["id"], "vlen-utf8");
        assert_eq!(read_json(&path.join("obs/_index/.zattrs"))[ENCODING_TYPE], "string-array");
        assert_eq!(read_json(&path.join("obs/is_doublet/codes/.zarray"))["dtype"], "<i4");
        assert_eq!(read_json(&path.join("var/highly_variable/.zarray"))["dtype"], "|b1");
        assert_eq!(read_json(&path.join("obsp/connectivities/.zattrs"))["shape"], serde_json::json!([2, 2]));
    }

    #[test]
    fn encoding_attributes_are_written() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("attrs.zarr");
        write_zarr(&sample_adata(), &path, None).unwrap();

        let store: Store = Arc::new(FilesystemStore::new(&path).unwrap());
        let root = group_attributes(&store, "/").unwrap();
        assert_eq!(encoding_of(&root), Some("anndata"));
        let obs = group_attributes(&store, "/obs").unwrap();
        assert_eq!(encoding_of(&obs), Some("dataframe"));
        assert_eq!(obs[INDEX_ATTR], "_index");
        assert_eq!(
            obs[COLUMN_ORDER_ATTR],
            serde_json::json!(["n_counts", "label_id", "is_doublet"])
        );
        let cat = group_attributes(&store, "/obs/is_doublet").unwrap();
        assert_eq!(encoding_of(&cat), Some("categorical"));
        let index = StoreArray::open(store.clone(), "/obs/_index").unwrap();
        assert_eq!(index.attributes()[ENCODING_TYPE], "string-array");
    }

    #[test]
    fn sparse_x_is_csr_group() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sparse.zarr");
        let adata = AnnData::from_names(
            MatrixData::Sparse(csr_from_triplets((2, 2), [(0, 1, 5.0)])),
            vec!["a".into(), "b".into()],
            vec!["x".into(), "y".into()],
        )
        .unwrap();
        write_zarr(&adata, &path, None).unwrap();

        let loaded = read_zarr(&path).unwrap();
        assert!(loaded.x().is_sparse());
        assert_eq!(loaded.x().to_dense(), array![[0.0, 5.0], [0.0, 0.0]]);
    }

    #[test]
    fn existing_store_is_replaced() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.zarr");
        std::fs::create_dir_all(path.join("stale_member")).unwrap();
        write_zarr(&sample_adata(), &path, None).unwrap();
        assert!(!path.join("stale_member").exists());
        assert!(read_zarr(&path).is_ok());
    }

    #[test]
    fn raw_is_written_when_present() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("raw.zarr");
        let mut adata = sample_adata();
        adata
            .set_raw(Raw {
                x: MatrixData::Dense(Array2::zeros((2, 4))),
                var: DataFrame::new(Index::from_strings(["g1", "g2", "g3", "g4"])),
            })
            .unwrap();
        write_zarr(&adata, &path, None).unwrap();
        assert!(path.join("raw").is_dir());
        let loaded = read_zarr(&path).unwrap();
        assert_eq!(loaded.raw().map(|r| r.var.len()), Some(4));
    }

    #[test]
    fn missing_store_error() {
        let dir = TempDir::new().unwrap();
        let result = read_zarr(dir.path().join("absent.zarr"));
        assert!(matches!(result, Err(VitzarrError::Io(_))));
    }
}
