//! AnnData on-disk encoding names and versions shared by the h5ad and zarr
//! backends.

pub const ENCODING_TYPE: &str = "encoding-type";
pub const ENCODING_VERSION: &str = "encoding-version";

/// `(encoding-type, encoding-version)` pairs.
pub const ANNDATA: (&str, &str) = ("anndata", "0.1.0");
pub const ARRAY: (&str, &str) = ("array", "0.2.0");
pub const STRING_ARRAY: (&str, &str) = ("string-array", "0.2.0");
pub const DATAFRAME: (&str, &str) = ("dataframe", "0.2.0");
pub const CATEGORICAL: (&str, &str) = ("categorical", "0.2.0");
pub const DICT: (&str, &str) = ("dict", "0.1.0");
pub const CSR_MATRIX: (&str, &str) = ("csr_matrix", "0.1.0");
pub const CSC_MATRIX: (&str, &str) = ("csc_matrix", "0.1.0");
pub const NULLABLE_INTEGER: (&str, &str) = ("nullable-integer", "0.1.0");
pub const NULLABLE_BOOLEAN: (&str, &str) = ("nullable-boolean", "0.1.0");

/// Dataframe attribute naming the index member.
pub const INDEX_ATTR: &str = "_index";
/// Dataframe attribute listing the column order.
pub const COLUMN_ORDER_ATTR: &str = "column-order";
/// Legacy location of categorical labels inside a dataframe group.
pub const LEGACY_CATEGORIES: &str = "__categories";

/// Encoding attributes as a JSON object.
pub(crate) fn attributes(encoding: (&str, &str)) -> serde_json::Map<String, serde_json::Value> {
    let mut attrs = serde_json::Map::new();
    attrs.insert(ENCODING_TYPE.into(), encoding.0.into());
    attrs.insert(ENCODING_VERSION.into(), encoding.1.into());
    attrs
}
