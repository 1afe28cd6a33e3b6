//! HDF5-backed AnnData reader/writer for `.h5ad` files.
//!
//! The `.h5ad` layout: `X` (dense dataset or `csr_matrix`/`csc_matrix`
//! group), `obs`/`var` dataframe groups, `obsm`/`varm`/`obsp`/`layers`
//! mappings, free-form `uns` and an optional `raw` snapshot. Every node
//! carries `encoding-type`/`encoding-version` attributes.
//!
//! Requires a system HDF5 library installation
//! (`brew install hdf5` on macOS, `apt install libhdf5-dev` on Linux).

use std::path::Path;
use std::str::FromStr;

use hdf5::types::{FixedAscii, FloatSize, IntSize, TypeDescriptor, VarLenAscii, VarLenUnicode};
use hdf5::{Dataset, File, Group, Location};
use ndarray::Array1;

use vitzarr_core::{Result, VitzarrError};

use crate::array::{dense_match, DenseArray, Embedding};
use crate::dataset::{AnnData, Raw};
use crate::dtype::DTypeKind;
use crate::encoding::{
    ANNDATA, ARRAY, CATEGORICAL, COLUMN_ORDER_ATTR, CSR_MATRIX, DATAFRAME, DICT, ENCODING_TYPE,
    ENCODING_VERSION, INDEX_ATTR, LEGACY_CATEGORIES, STRING_ARRAY,
};
use crate::frame::{numeric_match, Column, DataFrame, Index};
use crate::matrix::{compressed_from_parts, csr_parts, MatrixData};

/// Longest fixed-length string read from legacy files.
type FixedAscii256 = FixedAscii<256>;

fn h5err(e: hdf5::Error) -> VitzarrError {
    VitzarrError::Hdf5(e.to_string())
}

/// Write a VarLenUnicode scalar attribute on any HDF5 location.
macro_rules! write_attr_str {
    ($loc:expr, $key:expr, $val:expr) => {
        VarLenUnicode::from_str($val)
            .map_err(|e| {
                VitzarrError::InvalidInput(format!("attribute '{}' cannot be stored: {e}", $key))
            })
            .and_then(|s| {
                $loc.new_attr::<VarLenUnicode>()
                    .create($key)
                    .and_then(|attr| attr.write_scalar(&s))
                    .map_err(h5err)
            })
    };
}

/// Read an `.h5ad` file into an [`AnnData`] container.
///
/// `X`, `obs` and `var` must be readable; other members that cannot be
/// read are skipped with a warning.
pub fn read_h5ad<P: AsRef<Path>>(path: P) -> Result<AnnData> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(VitzarrError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("{}: not found", path.display()),
        )));
    }
    let file = File::open(path).map_err(|e| {
        VitzarrError::Parse(format!("cannot open h5ad file {}: {e}", path.display()))
    })?;

    let (x, x_kind) = read_matrix(&file, "X").map_err(|e| parse_member("X", e))?;
    let (n_obs, n_vars) = x.shape();
    let obs = read_frame_member(&file, "obs", n_obs).map_err(|e| parse_member("obs", e))?;
    let var = read_frame_member(&file, "var", n_vars).map_err(|e| parse_member("var", e))?;

    let mut adata = AnnData::new(x, obs, var)?;
    adata.set_x_dtype(float_width(x_kind))?;

    for_each_member(&file, "obsm", |group, name| {
        let entry = read_embedding(group, name, n_obs)?;
        adata.add_obsm(name, entry)
    })?;
    for_each_member(&file, "varm", |group, name| {
        let entry = read_dense(&group.dataset(name).map_err(h5err)?)?;
        adata.add_varm(name, entry)
    })?;
    for_each_member(&file, "obsp", |group, name| match read_matrix(group, name)?.0 {
        MatrixData::Sparse(m) => adata.add_obsp(name, m),
        MatrixData::Dense(_) => Err(VitzarrError::Parse("dense obsp is not supported".into())),
    })?;
    for_each_member(&file, "layers", |group, name| {
        adata.add_layer(name, read_matrix(group, name)?.0)
    })?;

    if file.link_exists("uns") {
        let mut entries = Vec::new();
        read_uns(&file.group("uns").map_err(h5err)?, "", &mut entries)?;
        for (key, value) in entries {
            adata.add_uns(&key, value);
        }
    }

    if file.link_exists("raw") {
        match read_raw(&file) {
            Ok(raw) => {
                if let Err(e) = adata.set_raw(raw) {
                    vitzarr_core::warn!("skipping raw: {e}");
                }
            }
            Err(e) => vitzarr_core::warn!("skipping raw: {e}"),
        }
    }

    vitzarr_core::info!(
        "read {} ({} obs x {} vars)",
        path.display(),
        adata.n_obs(),
        adata.n_vars()
    );
    Ok(adata)
}

/// Write an [`AnnData`] container to an `.h5ad` file.
pub fn write_h5ad<P: AsRef<Path>>(adata: &AnnData, path: P) -> Result<()> {
    let file = File::create(path.as_ref()).map_err(|e| {
        VitzarrError::InvalidInput(format!("cannot create h5ad file: {e}"))
    })?;
    write_encoding(&file, ANNDATA)?;

    write_matrix(&file, "X", adata.x(), adata.x_dtype())?;
    write_dataframe(&file, "obs", adata.obs())?;
    write_dataframe(&file, "var", adata.var())?;

    let obsm = create_dict(&file, "obsm")?;
    for (key, entry) in adata.obsm() {
        match entry {
            Embedding::Array(arr) => write_dense(&obsm, key, arr)?,
            Embedding::Frame(df) => write_dataframe(&obsm, key, df)?,
        }
    }
    let varm = create_dict(&file, "varm")?;
    for (key, arr) in adata.varm() {
        write_dense(&varm, key, arr)?;
    }
    let obsp = create_dict(&file, "obsp")?;
    for (key, m) in adata.obsp() {
        write_matrix(&obsp, key, &MatrixData::Sparse(m.clone()), DTypeKind::Float64)?;
    }
    let layers = create_dict(&file, "layers")?;
    for (key, layer) in adata.layers() {
        write_matrix(&layers, key, layer, adata.x_dtype())?;
    }
    let uns = create_dict(&file, "uns")?;
    for (key, value) in adata.uns() {
        write_column(&uns, key, value)?;
    }

    if let Some(raw) = adata.raw() {
        let group = file.create_group("raw").map_err(h5err)?;
        write_encoding(&group, DICT)?;
        write_matrix(&group, "X", &raw.x, adata.x_dtype())?;
        write_dataframe(&group, "var", &raw.var)?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Internal: attributes and types
// ---------------------------------------------------------------------------

fn parse_member(member: &str, e: VitzarrError) -> VitzarrError {
    VitzarrError::Parse(format!("cannot read {member}: {e}"))
}

fn write_encoding(loc: &Location, encoding: (&str, &str)) -> Result<()> {
    write_attr_str!(loc, ENCODING_TYPE, encoding.0)?;
    write_attr_str!(loc, ENCODING_VERSION, encoding.1)?;
    Ok(())
}

/// Read a string scalar attribute, if present.
fn read_attr_str(loc: &Location, key: &str) -> Option<String> {
    let attr = loc.attr(key).ok()?;
    match attr.read_scalar::<VarLenUnicode>() {
        Ok(s) => Some(s.as_str().to_string()),
        Err(_) => attr
            .read_scalar::<VarLenAscii>()
            .ok()
            .map(|s| s.as_str().to_string()),
    }
}

/// `h5py` stores booleans as a two-member `FALSE`/`TRUE` enum.
fn is_bool_enum(members: &[hdf5::types::EnumMember]) -> bool {
    members.len() == 2
        && members
            .iter()
            .all(|m| m.name.eq_ignore_ascii_case("true") || m.name.eq_ignore_ascii_case("false"))
}

fn dataset_kind(ds: &Dataset) -> Result<DTypeKind> {
    let descriptor = ds.dtype().and_then(|t| t.to_descriptor()).map_err(h5err)?;
    let kind = match &descriptor {
        TypeDescriptor::Integer(IntSize::U1) => DTypeKind::Int8,
        TypeDescriptor::Integer(IntSize::U2) => DTypeKind::Int16,
        TypeDescriptor::Integer(IntSize::U4) => DTypeKind::Int32,
        TypeDescriptor::Integer(IntSize::U8) => DTypeKind::Int64,
        TypeDescriptor::Unsigned(IntSize::U1) => DTypeKind::UInt8,
        TypeDescriptor::Unsigned(IntSize::U2) => DTypeKind::UInt16,
        TypeDescriptor::Unsigned(IntSize::U4) => DTypeKind::UInt32,
        TypeDescriptor::Unsigned(IntSize::U8) => DTypeKind::UInt64,
        TypeDescriptor::Float(FloatSize::U4) => DTypeKind::Float32,
        TypeDescriptor::Float(_) => DTypeKind::Float64,
        TypeDescriptor::Boolean => DTypeKind::Bool,
        TypeDescriptor::Enum(e) if is_bool_enum(&e.members) => DTypeKind::Bool,
        TypeDescriptor::VarLenUnicode
        | TypeDescriptor::VarLenAscii
        | TypeDescriptor::FixedAscii(_) => DTypeKind::String,
        other => {
            return Err(VitzarrError::Parse(format!(
                "unsupported HDF5 element type {other:?}"
            )))
        }
    };
    Ok(kind)
}

fn float_width(kind: DTypeKind) -> DTypeKind {
    if kind == DTypeKind::Float64 {
        DTypeKind::Float64
    } else {
        DTypeKind::Float32
    }
}

fn read_strings(ds: &Dataset) -> Result<Vec<String>> {
    let descriptor = ds.dtype().and_then(|t| t.to_descriptor()).map_err(h5err)?;
    let values = match descriptor {
        TypeDescriptor::VarLenAscii => ds
            .read_raw::<VarLenAscii>()
            .map_err(h5err)?
            .iter()
            .map(|s| s.as_str().to_string())
            .collect(),
        TypeDescriptor::FixedAscii(_) => ds
            .read_raw::<FixedAscii256>()
            .map_err(h5err)?
            .iter()
            .map(|s| s.as_str().to_string())
            .collect(),
        _ => ds
            .read_raw::<VarLenUnicode>()
            .map_err(h5err)?
            .iter()
            .map(|s| s.as_str().to_string())
            .collect(),
    };
    Ok(values)
}

/// Read a dataset of any supported element type, flattened.
fn read_typed(ds: &Dataset) -> Result<Column> {
    let col = match dataset_kind(ds)? {
        DTypeKind::Int8 => Column::Int8(ds.read_raw().map_err(h5err)?),
        DTypeKind::Int16 => Column::Int16(ds.read_raw().map_err(h5err)?),
        DTypeKind::Int32 => Column::Int32(ds.read_raw().map_err(h5err)?),
        DTypeKind::Int64 => Column::Int64(ds.read_raw().map_err(h5err)?),
        DTypeKind::UInt8 => Column::UInt8(ds.read_raw().map_err(h5err)?),
        DTypeKind::UInt16 => Column::UInt16(ds.read_raw().map_err(h5err)?),
        DTypeKind::UInt32 => Column::UInt32(ds.read_raw().map_err(h5err)?),
        DTypeKind::UInt64 => Column::UInt64(ds.read_raw().map_err(h5err)?),
        DTypeKind::Float32 => Column::Float32(ds.read_raw().map_err(h5err)?),
        DTypeKind::Float64 => Column::Float64(ds.read_raw().map_err(h5err)?),
        DTypeKind::Bool => Column::Bool(ds.read_raw().map_err(h5err)?),
        DTypeKind::String => Column::Strings(read_strings(ds)?),
        DTypeKind::Categorical => {
            return Err(VitzarrError::Parse("categorical dataset without categories".into()))
        }
    };
    Ok(col)
}

fn to_unicode<S: AsRef<str>>(values: &[S]) -> Result<Array1<VarLenUnicode>> {
    values
        .iter()
        .map(|s| {
            VarLenUnicode::from_str(s.as_ref()).map_err(|e| {
                VitzarrError::InvalidInput(format!("string {:?} cannot be stored: {e}", s.as_ref()))
            })
        })
        .collect::<Result<Vec<_>>>()
        .map(Array1::from)
}

fn create_dict(parent: &Group, name: &str) -> Result<Group> {
    let group = parent.create_group(name).map_err(h5err)?;
    write_encoding(&group, DICT)?;
    Ok(group)
}

/// Visit every member of an optional top-level mapping. Failing members are
/// skipped with a warning.
fn for_each_member<F>(file: &File, slot: &str, mut visit: F) -> Result<()>
where
    F: FnMut(&Group, &str) -> Result<()>,
{
    if !file.link_exists(slot) {
        return Ok(());
    }
    let group = file.group(slot).map_err(h5err)?;
    for name in group.member_names().map_err(h5err)? {
        if let Err(e) = visit(&group, &name) {
            vitzarr_core::warn!("skipping {slot}/{name}: {e}");
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Internal: matrices
// ---------------------------------------------------------------------------

/// Read a dense dataset or compressed sparse group. Also returns the stored
/// element kind.
fn read_matrix(parent: &Group, name: &str) -> Result<(MatrixData, DTypeKind)> {
    if let Ok(ds) = parent.dataset(name) {
        let kind = dataset_kind(&ds)?;
        let arr = ds.read_2d::<f64>().map_err(h5err)?;
        return Ok((MatrixData::Dense(arr), kind));
    }
    let group = parent.group(name).map_err(h5err)?;
    let csr = match read_attr_str(&group, ENCODING_TYPE).as_deref() {
        Some("csr_matrix") => true,
        Some("csc_matrix") => false,
        // Files written before encoding attributes existed.
        None => read_attr_str(&group, "h5sparse_format").as_deref() != Some("csc"),
        Some(other) => {
            return Err(VitzarrError::Parse(format!(
                "unsupported matrix encoding-type: {other}"
            )))
        }
    };

    let data_ds = group.dataset("data").map_err(h5err)?;
    let kind = dataset_kind(&data_ds)?;
    let data: Vec<f64> = data_ds.read_raw().map_err(h5err)?;
    let indices = read_offsets(&group, "indices")?;
    let indptr = read_offsets(&group, "indptr")?;
    let shape = read_shape_attr(&group)?;
    let m = compressed_from_parts(shape, indptr, indices, data, csr)?;
    Ok((MatrixData::Sparse(m), kind))
}

fn read_offsets(group: &Group, name: &str) -> Result<Vec<usize>> {
    let raw: Vec<i64> = group
        .dataset(name)
        .and_then(|ds| ds.read_raw())
        .map_err(h5err)?;
    raw.into_iter()
        .map(|v| {
            usize::try_from(v)
                .map_err(|_| VitzarrError::Parse(format!("negative {name} entry {v}")))
        })
        .collect()
}

fn read_shape_attr(group: &Group) -> Result<(usize, usize)> {
    for key in ["shape", "h5sparse_shape"] {
        if let Ok(attr) = group.attr(key) {
            let shape: Vec<i64> = attr.read_raw().map_err(h5err)?;
            if let [rows, cols] = shape[..] {
                return Ok((rows.max(0) as usize, cols.max(0) as usize));
            }
        }
    }
    Err(VitzarrError::Parse("sparse matrix has no shape attribute".into()))
}

fn write_matrix(parent: &Group, name: &str, m: &MatrixData, kind: DTypeKind) -> Result<()> {
    match m {
        MatrixData::Dense(a) => {
            let created = if kind == DTypeKind::Float32 {
                parent
                    .new_dataset_builder()
                    .with_data(&a.mapv(|v| v as f32))
                    .create(name)
            } else {
                parent.new_dataset_builder().with_data(a).create(name)
            };
            let ds = created.map_err(h5err)?;
            write_encoding(&ds, ARRAY)
        }
        MatrixData::Sparse(sm) => {
            let (indptr, indices, data) = csr_parts(sm);
            let group = parent.create_group(name).map_err(h5err)?;
            write_encoding(&group, CSR_MATRIX)?;

            let shape = ndarray::arr1(&[sm.rows() as i64, sm.cols() as i64]);
            group
                .new_attr_builder()
                .with_data(&shape)
                .create("shape")
                .map_err(h5err)?;

            let created = if kind == DTypeKind::Float32 {
                let narrow: Vec<f32> = data.iter().map(|&v| v as f32).collect();
                group
                    .new_dataset_builder()
                    .with_data(narrow.as_slice())
                    .create("data")
            } else {
                group
                    .new_dataset_builder()
                    .with_data(data.as_slice())
                    .create("data")
            };
            created.map_err(h5err)?;

            for (member, values) in [("indices", indices), ("indptr", indptr)] {
                let wide: Vec<i64> = values.into_iter().map(|v| v as i64).collect();
                group
                    .new_dataset_builder()
                    .with_data(wide.as_slice())
                    .create(member)
                    .map_err(h5err)?;
            }
            Ok(())
        }
    }
}

// ---------------------------------------------------------------------------
// Internal: dense arrays and embeddings
// ---------------------------------------------------------------------------

fn read_dense(ds: &Dataset) -> Result<DenseArray> {
    let shape = ds.shape();
    let dims = match shape[..] {
        [rows, cols] => (rows, cols),
        [rows] => (rows, 1),
        _ => {
            return Err(VitzarrError::Parse(format!(
                "expected a 1-D or 2-D array, found {} dimensions",
                shape.len()
            )))
        }
    };
    DenseArray::from_column(read_typed(ds)?, dims)
}

fn write_dense(parent: &Group, name: &str, arr: &DenseArray) -> Result<()> {
    let ds = dense_match!(arr, a => parent.new_dataset_builder().with_data(a).create(name))
        .map_err(h5err)?;
    write_encoding(&ds, ARRAY)
}

fn read_embedding(parent: &Group, name: &str, n_obs: usize) -> Result<Embedding> {
    if let Ok(ds) = parent.dataset(name) {
        return read_dense(&ds).map(Embedding::Array);
    }
    let group = parent.group(name).map_err(h5err)?;
    match read_attr_str(&group, ENCODING_TYPE).as_deref() {
        Some("dataframe") => read_dataframe(&group, n_obs).map(Embedding::Frame),
        other => Err(VitzarrError::Parse(format!(
            "unsupported obsm encoding-type: {other:?}"
        ))),
    }
}

// ---------------------------------------------------------------------------
// Internal: dataframes and columns
// ---------------------------------------------------------------------------

fn read_frame_member(file: &File, name: &str, n_rows: usize) -> Result<DataFrame> {
    if !file.link_exists(name) {
        vitzarr_core::debug!("no {name} group, using a range index");
        return Ok(DataFrame::new(Index::range(n_rows)));
    }
    read_dataframe(&file.group(name).map_err(h5err)?, n_rows)
}

fn read_dataframe(group: &Group, n_rows: usize) -> Result<DataFrame> {
    let index_key = read_attr_str(group, INDEX_ATTR).unwrap_or_else(|| INDEX_ATTR.to_string());
    let index = if group.link_exists(&index_key) {
        let mut index =
            Index::from_column(read_typed(&group.dataset(&index_key).map_err(h5err)?)?);
        if index_key != INDEX_ATTR {
            index.set_name(Some(index_key.clone()));
        }
        index
    } else {
        Index::range(n_rows)
    };
    if index.len() != n_rows {
        return Err(VitzarrError::Parse(format!(
            "index has {} entries, expected {n_rows}",
            index.len()
        )));
    }

    let order: Vec<String> = match group
        .attr(COLUMN_ORDER_ATTR)
        .and_then(|a| a.read_raw::<VarLenUnicode>())
    {
        Ok(names) => names.iter().map(|s| s.as_str().to_string()).collect(),
        // Empty orders are written as float arrays.
        Err(_) => group
            .member_names()
            .map_err(h5err)?
            .into_iter()
            .filter(|n| *n != index_key && n != LEGACY_CATEGORIES)
            .collect(),
    };

    let mut df = DataFrame::new(index);
    for name in order {
        let added = read_frame_column(group, &name).and_then(|col| df.add_column(&name, col));
        if let Err(e) = added {
            vitzarr_core::warn!("skipping column '{name}': {e}");
        }
    }
    Ok(df)
}

fn read_frame_column(group: &Group, name: &str) -> Result<Column> {
    if group.link_exists(LEGACY_CATEGORIES) {
        let legacy = group.group(LEGACY_CATEGORIES).map_err(h5err)?;
        if legacy.link_exists(name) {
            let cats_ds = legacy.dataset(name).map_err(h5err)?;
            let categories = read_typed(&cats_ds)?.to_strings();
            let ordered = cats_ds
                .attr("ordered")
                .and_then(|a| a.read_scalar::<bool>())
                .unwrap_or(false);
            let codes = group
                .dataset(name)
                .and_then(|ds| ds.read_raw::<i32>())
                .map_err(h5err)?;
            return Ok(Column::Categorical {
                codes,
                categories,
                ordered,
            });
        }
    }
    if let Ok(ds) = group.dataset(name) {
        return read_typed(&ds);
    }
    read_encoded_column(&group.group(name).map_err(h5err)?)
}

/// Columns stored as groups: categoricals and nullable arrays.
fn read_encoded_column(group: &Group) -> Result<Column> {
    match read_attr_str(group, ENCODING_TYPE).as_deref() {
        Some("categorical") => {
            let codes = group
                .dataset("codes")
                .and_then(|ds| ds.read_raw::<i32>())
                .map_err(h5err)?;
            let categories = read_typed(&group.dataset("categories").map_err(h5err)?)?.to_strings();
            let ordered = group
                .attr("ordered")
                .and_then(|a| a.read_scalar::<bool>())
                .unwrap_or(false);
            Ok(Column::Categorical {
                codes,
                categories,
                ordered,
            })
        }
        // The mask is dropped; masked entries keep their stored value.
        Some("nullable-integer") | Some("nullable-boolean") => {
            read_typed(&group.dataset("values").map_err(h5err)?)
        }
        other => Err(VitzarrError::Parse(format!(
            "unsupported column encoding-type: {other:?}"
        ))),
    }
}

fn write_dataframe(parent: &Group, name: &str, df: &DataFrame) -> Result<()> {
    let group = parent.create_group(name).map_err(h5err)?;
    write_encoding(&group, DATAFRAME)?;

    let index_key = df.index().name().unwrap_or(INDEX_ATTR);
    write_attr_str!(group, INDEX_ATTR, index_key)?;
    let order = to_unicode(&df.column_names().collect::<Vec<_>>())?;
    group
        .new_attr_builder()
        .with_data(&order)
        .create(COLUMN_ORDER_ATTR)
        .map_err(h5err)?;

    write_column(&group, index_key, &df.index().to_column())?;
    for (key, col) in df.columns() {
        write_column(&group, key, col)?;
    }
    Ok(())
}

fn write_column(parent: &Group, name: &str, col: &Column) -> Result<()> {
    match col {
        Column::Strings(values) => {
            let ds = parent
                .new_dataset_builder()
                .with_data(&to_unicode(values)?)
                .create(name)
                .map_err(h5err)?;
            write_encoding(&ds, STRING_ARRAY)
        }
        Column::Bool(values) => {
            let ds = parent
                .new_dataset_builder()
                .with_data(values.as_slice())
                .create(name)
                .map_err(h5err)?;
            write_encoding(&ds, ARRAY)
        }
        Column::Categorical {
            codes,
            categories,
            ordered,
        } => {
            let group = parent.create_group(name).map_err(h5err)?;
            write_encoding(&group, CATEGORICAL)?;
            group
                .new_attr::<bool>()
                .create("ordered")
                .and_then(|a| a.write_scalar(ordered))
                .map_err(h5err)?;
            group
                .new_dataset_builder()
                .with_data(codes.as_slice())
                .create("codes")
                .map_err(h5err)?;
            let ds = group
                .new_dataset_builder()
                .with_data(&to_unicode(categories)?)
                .create("categories")
                .map_err(h5err)?;
            write_encoding(&ds, STRING_ARRAY)
        }
        numeric => {
            let created = numeric_match!(numeric,
                v => parent.new_dataset_builder().with_data(v.as_slice()).create(name),
                other => return Err(VitzarrError::InvalidInput(format!(
                    "cannot store {} column '{name}'", other.kind()
                ))));
            let ds = created.map_err(h5err)?;
            write_encoding(&ds, ARRAY)
        }
    }
}

// ---------------------------------------------------------------------------
// Internal: uns and raw
// ---------------------------------------------------------------------------

/// Collect scalar and 1-D entries; nested mappings are flattened with `_`.
fn read_uns(group: &Group, prefix: &str, out: &mut Vec<(String, Column)>) -> Result<()> {
    for name in group.member_names().map_err(h5err)? {
        let key = if prefix.is_empty() {
            name.clone()
        } else {
            format!("{prefix}_{name}")
        };
        if let Ok(ds) = group.dataset(&name) {
            if ds.ndim() > 1 {
                vitzarr_core::debug!("skipping uns entry '{key}' with {} dimensions", ds.ndim());
                continue;
            }
            match read_typed(&ds) {
                Ok(col) => out.push((key, col)),
                Err(e) => vitzarr_core::warn!("skipping uns entry '{key}': {e}"),
            }
            continue;
        }
        let sub = group.group(&name).map_err(h5err)?;
        if read_attr_str(&sub, ENCODING_TYPE).as_deref() == Some("categorical") {
            match read_encoded_column(&sub) {
                Ok(col) => out.push((key, col)),
                Err(e) => vitzarr_core::warn!("skipping uns entry '{key}': {e}"),
            }
        } else {
            read_uns(&sub, &key, out)?;
        }
    }
    Ok(())
}

fn read_raw(file: &File) -> Result<Raw> {
    let group = file.group("raw").map_err(h5err)?;
    let (x, _) = read_matrix(&group, "X")?;
    let n_vars = x.shape().1;
    let var = if group.link_exists("var") {
        read_dataframe(&group.group("var").map_err(h5err)?, n_vars)?
    } else {
        DataFrame::new(Index::range(n_vars))
    };
    Ok(Raw { x, var })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::csr_from_triplets;
    use ndarray::{array, Array2};
    use tempfile::NamedTempFile;

    fn temp_path() -> (NamedTempFile, std::path::PathBuf) {
        let f = NamedTempFile::new().unwrap();
        let p = f.path().with_extension("h5ad");
        (f, p)
    }

    fn sample_dense_adata() -> AnnData {
        AnnData::from_names(
            MatrixData::Dense(array![[1.0, 2.0, 0.0], [0.0, 3.0, 4.0]]),
            vec!["cell_1".into(), "cell_2".into()],
            vec!["gene_a".into(), "gene_b".into(), "gene_c".into()],
        )
        .unwrap()
    }

    fn sample_sparse_adata() -> AnnData {
        let sm = csr_from_triplets((2, 3), [(0, 0, 1.0), (0, 2, 2.0), (1, 1, 3.0), (1, 2, 4.0)]);
        AnnData::from_names(
            MatrixData::Sparse(sm),
            vec!["c1".into(), "c2".into()],
            vec!["g1".into(), "g2".into(), "g3".into()],
        )
        .unwrap()
    }

    #[test]
    fn write_read_roundtrip_dense() {
        let (_tmp, path) = temp_path();
        let adata = sample_dense_adata();
        write_h5ad(&adata, &path).unwrap();

        let loaded = read_h5ad(&path).unwrap();
        assert_eq!(loaded.shape(), (2, 3));
        assert_eq!(loaded.obs_names(), vec!["cell_1", "cell_2"]);
        assert_eq!(loaded.var_names(), vec!["gene_a", "gene_b", "gene_c"]);
        assert_eq!(loaded.x_dtype(), DTypeKind::Float32);
        assert_eq!(loaded.x().get(1, 2), 4.0);
        assert!(loaded.raw().is_none());
    }

    #[test]
    fn write_read_roundtrip_sparse() {
        let (_tmp, path) = temp_path();
        let mut adata = sample_sparse_adata();
        adata.set_x_dtype(DTypeKind::Float64).unwrap();
        write_h5ad(&adata, &path).unwrap();

        let loaded = read_h5ad(&path).unwrap();
        assert!(loaded.x().is_sparse());
        assert_eq!(loaded.x_dtype(), DTypeKind::Float64);
        assert_eq!(loaded.x().to_dense(), array![[1.0, 0.0, 2.0], [0.0, 3.0, 4.0]]);
    }

    #[test]
    fn column_dtypes_survive() {
        let (_tmp, path) = temp_path();
        let mut adata = sample_dense_adata();
        adata.add_obs_column("n_genes", Column::Int64(vec![10, 20])).unwrap();
        adata.add_obs_column("batch", Column::Int8(vec![0, 1])).unwrap();
        adata.add_obs_column("is_doublet", Column::Bool(vec![true, false])).unwrap();
        adata.add_obs_column("score", Column::Float32(vec![0.5, 0.25])).unwrap();
        adata
            .add_obs_column(
                "cluster",
                Column::Categorical {
                    codes: vec![1, 0],
                    categories: vec!["A".into(), "B".into()],
                    ordered: true,
                },
            )
            .unwrap();
        adata
            .add_var_column("symbol", Column::from(vec!["A1BG", "TP53", "GAPDH"]))
            .unwrap();
        write_h5ad(&adata, &path).unwrap();

        let loaded = read_h5ad(&path).unwrap();
        let names: Vec<&str> = loaded.obs().column_names().collect();
        assert_eq!(names, vec!["n_genes", "batch", "is_doublet", "score", "cluster"]);
        assert_eq!(loaded.obs().column("n_genes"), Some(&Column::Int64(vec![10, 20])));
        assert_eq!(loaded.obs().column("batch"), Some(&Column::Int8(vec![0, 1])));
        assert_eq!(loaded.obs().column("is_doublet"), Some(&Column::Bool(vec![true, false])));
        assert_eq!(loaded.obs().column("score"), Some(&Column::Float32(vec![0.5, 0.25])));
        assert_eq!(
            loaded.obs().column("cluster"),
            Some(&Column::Categorical {
                codes: vec![1, 0],
                categories: vec!["A".into(), "B".into()],
                ordered: true,
            })
        );
        assert_eq!(
            loaded.var().column("symbol").map(Column::to_strings),
            Some(vec!["A1BG".to_string(), "TP53".into(), "GAPDH".into()])
        );
    }

    #[test]
    fn named_index_round_trips() {
        let (_tmp, path) = temp_path();
        let mut adata = sample_dense_adata();
        adata.var_mut().index_mut().set_name(Some("gene_ids".into()));
        write_h5ad(&adata, &path).unwrap();

        let loaded = read_h5ad(&path).unwrap();
        assert_eq!(loaded.var().index().name(), Some("gene_ids"));
        assert_eq!(loaded.obs().index().name(), None);
    }

    #[test]
    fn obsm_varm_obsp_roundtrip() {
        let (_tmp, path) = temp_path();
        let mut adata = sample_dense_adata();
        adata
            .add_obsm("X_pca", DenseArray::Float64(array![[0.1, 0.2], [0.3, 0.4]]))
            .unwrap();
        adata
            .add_obsm("spatial", DenseArray::Int64(array![[1, 2], [3, 4]]))
            .unwrap();
        let frame = DataFrame::from_columns(
            Index::from_strings(["cell_1", "cell_2"]),
            [
                ("x".to_string(), Column::Float64(vec![1.0, 2.0])),
                ("y".to_string(), Column::Float64(vec![3.0, 4.0])),
            ],
        )
        .unwrap();
        adata.add_obsm("coords", Embedding::Frame(frame.clone())).unwrap();
        adata
            .add_varm("PCs", DenseArray::Float32(Array2::ones((3, 2))))
            .unwrap();
        adata
            .add_obsp("connectivities", csr_from_triplets((2, 2), [(0, 1, 0.5), (1, 0, 0.5)]))
            .unwrap();
        write_h5ad(&adata, &path).unwrap();

        let loaded = read_h5ad(&path).unwrap();
        assert_eq!(
            loaded.get_obsm("X_pca").and_then(Embedding::as_array),
            Some(&DenseArray::Float64(array![[0.1, 0.2], [0.3, 0.4]]))
        );
        assert_eq!(loaded.get_obsm("spatial").and_then(Embedding::kind), Some(DTypeKind::Int64));
        assert_eq!(loaded.get_obsm("coords"), Some(&Embedding::Frame(frame)));
        assert_eq!(loaded.get_varm("PCs").map(DenseArray::kind), Some(DTypeKind::Float32));
        assert_eq!(loaded.get_obsp("connectivities").map(|m| m.nnz()), Some(2));
    }

    #[test]
    fn raw_and_uns_roundtrip() {
        let (_tmp, path) = temp_path();
        let mut adata = sample_dense_adata();
        adata.add_uns("pca_variance_ratio", vec![0.6, 0.3]);
        adata
            .set_raw(Raw {
                x: MatrixData::Sparse(csr_from_triplets((2, 4), [(0, 3, 9.0)])),
                var: DataFrame::new(Index::from_strings(["g1", "g2", "g3", "g4"])),
            })
            .unwrap();
        write_h5ad(&adata, &path).unwrap();

        let loaded = read_h5ad(&path).unwrap();
        assert_eq!(loaded.get_uns("pca_variance_ratio"), Some(&Column::Float64(vec![0.6, 0.3])));
        let raw = loaded.raw().unwrap();
        assert_eq!(raw.x.shape(), (2, 4));
        assert_eq!(raw.var.len(), 4);
    }

    #[test]
    fn nested_uns_is_flattened() {
        let (_tmp, path) = temp_path();
        write_h5ad(&sample_dense_adata(), &path).unwrap();
        {
            let file = File::open_rw(&path).unwrap();
            let uns = file.group("uns").unwrap();
            let params = uns.create_group("neighbors").unwrap().create_group("params").unwrap();
            params
                .new_dataset_builder()
                .with_data(&[15i64])
                .create("n_neighbors")
                .unwrap();
        }
        let loaded = read_h5ad(&path).unwrap();
        assert_eq!(
            loaded.get_uns("neighbors_params_n_neighbors"),
            Some(&Column::Int64(vec![15]))
        );
    }

    #[test]
    fn legacy_categories_and_csc() {
        let (_tmp, path) = temp_path();
        {
            let file = File::create(&path).unwrap();
            // [[1, 0], [0, 2], [3, 0]] compressed by column.
            let x = file.create_group("X").unwrap();
            write_attr_str!(x, ENCODING_TYPE, "csc_matrix").unwrap();
            x.new_attr_builder()
                .with_data(&ndarray::arr1(&[3i64, 2]))
                .create("shape")
                .unwrap();
            x.new_dataset_builder().with_data(&[1.0f32, 3.0, 2.0]).create("data").unwrap();
            x.new_dataset_builder().with_data(&[0i32, 2, 1]).create("indices").unwrap();
            x.new_dataset_builder().with_data(&[0i32, 2, 3]).create("indptr").unwrap();

            let obs = file.create_group("obs").unwrap();
            write_attr_str!(obs, INDEX_ATTR, "_index").unwrap();
            obs.new_dataset_builder()
                .with_data(&to_unicode(&["a", "b", "c"]).unwrap())
                .create("_index")
                .unwrap();
            obs.new_dataset_builder().with_data(&[1i8, 0, 1]).create("group").unwrap();
            obs.create_group(LEGACY_CATEGORIES)
                .unwrap()
                .new_dataset_builder()
                .with_data(&to_unicode(&["ctrl", "stim"]).unwrap())
                .create("group")
                .unwrap();
        }

        let loaded = read_h5ad(&path).unwrap();
        assert_eq!(loaded.shape(), (3, 2));
        assert_eq!(loaded.x().to_dense(), array![[1.0, 0.0], [0.0, 2.0], [3.0, 0.0]]);
        assert_eq!(
            loaded.obs().column("group").map(Column::to_strings),
            Some(vec!["stim".to_string(), "ctrl".into(), "stim".into()])
        );
        // No var group: a range index is used.
        assert!(loaded.var().index().is_integer());
    }

    #[test]
    fn empty_adata() {
        let (_tmp, path) = temp_path();
        let adata = AnnData::from_names(MatrixData::Dense(Array2::zeros((0, 0))), vec![], vec![])
            .unwrap();
        write_h5ad(&adata, &path).unwrap();

        let loaded = read_h5ad(&path).unwrap();
        assert_eq!(loaded.shape(), (0, 0));
    }

    #[test]
    fn nonexistent_file_error() {
        let result = read_h5ad("/nonexistent/path/file.h5ad");
        assert!(matches!(result, Err(VitzarrError::Io(_))));
    }

    #[test]
    fn garbage_file_is_parse_error() {
        let (tmp, _) = temp_path();
        std::fs::write(tmp.path(), b"not an hdf5 file").unwrap();
        assert!(matches!(read_h5ad(tmp.path()), Err(VitzarrError::Parse(_))));
    }
}
