//! Typed, ordered column tables for `obs` and `var` annotations.
//!
//! A [`DataFrame`] is an [`Index`] plus named [`Column`]s kept in insertion
//! order. Every column has exactly one value per index entry.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt::Display;

use indexmap::IndexMap;

use vitzarr_core::{Result, VitzarrError};

use crate::dtype::{CastI32, DTypeKind};

/// One annotation column.
#[derive(Debug, Clone, PartialEq)]
pub enum Column {
    Int8(Vec<i8>),
    Int16(Vec<i16>),
    Int32(Vec<i32>),
    Int64(Vec<i64>),
    UInt8(Vec<u8>),
    UInt16(Vec<u16>),
    UInt32(Vec<u32>),
    UInt64(Vec<u64>),
    Float32(Vec<f32>),
    Float64(Vec<f64>),
    Bool(Vec<bool>),
    Strings(Vec<String>),
    /// Codes index into `categories`; `-1` marks a missing value.
    Categorical {
        codes: Vec<i32>,
        categories: Vec<String>,
        ordered: bool,
    },
}

/// Apply `$body` to the vector inside any numeric variant, or fall through.
macro_rules! numeric_match {
    ($col:expr, $v:ident => $body:expr, $other:pat => $fallback:expr) => {
        match $col {
            Column::Int8($v) => $body,
            Column::Int16($v) => $body,
            Column::Int32($v) => $body,
            Column::Int64($v) => $body,
            Column::UInt8($v) => $body,
            Column::UInt16($v) => $body,
            Column::UInt32($v) => $body,
            Column::UInt64($v) => $body,
            Column::Float32($v) => $body,
            Column::Float64($v) => $body,
            $other => $fallback,
        }
    };
}
pub(crate) use numeric_match;

macro_rules! impl_column_from {
    ($($t:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<Vec<$t>> for Column {
                fn from(values: Vec<$t>) -> Self {
                    Column::$variant(values)
                }
            }
        )*
    };
}

impl_column_from!(
    i8 => Int8, i16 => Int16, i32 => Int32, i64 => Int64,
    u8 => UInt8, u16 => UInt16, u32 => UInt32, u64 => UInt64,
    f32 => Float32, f64 => Float64, bool => Bool, String => Strings,
);

impl From<Vec<&str>> for Column {
    fn from(values: Vec<&str>) -> Self {
        Column::Strings(values.into_iter().map(str::to_string).collect())
    }
}

impl Column {
    pub fn len(&self) -> usize {
        numeric_match!(self, v => v.len(), other => match other {
            Column::Bool(v) => v.len(),
            Column::Strings(v) => v.len(),
            Column::Categorical { codes, .. } => codes.len(),
            _ => 0,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn kind(&self) -> DTypeKind {
        match self {
            Column::Int8(_) => DTypeKind::Int8,
            Column::Int16(_) => DTypeKind::Int16,
            Column::Int32(_) => DTypeKind::Int32,
            Column::Int64(_) => DTypeKind::Int64,
            Column::UInt8(_) => DTypeKind::UInt8,
            Column::UInt16(_) => DTypeKind::UInt16,
            Column::UInt32(_) => DTypeKind::UInt32,
            Column::UInt64(_) => DTypeKind::UInt64,
            Column::Float32(_) => DTypeKind::Float32,
            Column::Float64(_) => DTypeKind::Float64,
            Column::Bool(_) => DTypeKind::Bool,
            Column::Strings(_) => DTypeKind::String,
            Column::Categorical { .. } => DTypeKind::Categorical,
        }
    }

    /// Values rendered the way pandas' `astype(str)` renders them:
    /// `True`/`False` for booleans, `1.0`/`nan` for floats, category labels
    /// for categoricals (`nan` for missing codes).
    pub fn to_strings(&self) -> Vec<String> {
        match self {
            Column::Float32(v) => v.iter().map(|&x| float_repr(x)).collect(),
            Column::Float64(v) => v.iter().map(|&x| float_repr(x)).collect(),
            Column::Bool(v) => v
                .iter()
                .map(|&b| String::from(if b { "True" } else { "False" }))
                .collect(),
            Column::Strings(v) => v.clone(),
            Column::Categorical {
                codes, categories, ..
            } => codes
                .iter()
                .map(|&c| {
                    usize::try_from(c)
                        .ok()
                        .and_then(|i| categories.get(i))
                        .cloned()
                        .unwrap_or_else(|| "nan".to_string())
                })
                .collect(),
            other => numeric_match!(other, v => v.iter().map(|x| x.to_string()).collect(),
                _ => Vec::new()),
        }
    }

    /// Numeric (and boolean) values widened to `f64`.
    pub fn to_f64(&self) -> Option<Vec<f64>> {
        numeric_match!(self, v => Some(v.iter().map(|&x| x as f64).collect()), other => match other {
            Column::Bool(v) => Some(v.iter().map(|&b| if b { 1.0 } else { 0.0 }).collect()),
            _ => None,
        })
    }

    /// Numeric values cast to `int32` with numpy `astype` semantics:
    /// integers wrap, floats truncate toward zero, NaN and out-of-range
    /// floats become `i32::MIN`.
    pub fn cast_i32(&self) -> Option<Column> {
        numeric_match!(self, v => Some(Column::Int32(v.iter().map(|&x| x.cast_i32()).collect())),
            _ => None)
    }

    /// Build a categorical whose categories are the sorted distinct values.
    pub fn categorical_from_strings(values: &[String]) -> Column {
        let (codes, categories) = categorical_codes(values);
        Column::Categorical {
            codes,
            categories,
            ordered: false,
        }
    }
}

/// Codes and sorted categories of `values` (pandas `Categorical` semantics).
pub fn categorical_codes(values: &[String]) -> (Vec<i32>, Vec<String>) {
    let categories: Vec<String> = values
        .iter()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .cloned()
        .collect();
    let lookup: HashMap<&str, i32> = categories
        .iter()
        .enumerate()
        .map(|(i, c)| (c.as_str(), i as i32))
        .collect();
    let codes = values.iter().map(|v| lookup[v.as_str()]).collect();
    (codes, categories)
}

/// Python `str(float)`-style rendering.
fn float_repr<T: Copy + Display + Into<f64>>(x: T) -> String {
    let wide: f64 = x.into();
    if wide.is_nan() {
        "nan".to_string()
    } else if wide.is_infinite() {
        let sign = if wide > 0.0 { "" } else { "-" };
        format!("{sign}inf")
    } else if wide.fract() == 0.0 && wide.abs() < 1e16 {
        format!("{wide:.1}")
    } else {
        x.to_string()
    }
}

// ---------------------------------------------------------------------------
// Index
// ---------------------------------------------------------------------------

/// Index values: integer (pandas `Int64Index`/`RangeIndex`) or strings.
#[derive(Debug, Clone, PartialEq)]
pub enum IndexValues {
    Int(Vec<i64>),
    Str(Vec<String>),
}

/// Row labels of a [`DataFrame`].
#[derive(Debug, Clone, PartialEq)]
pub struct Index {
    name: Option<String>,
    values: IndexValues,
}

impl Index {
    pub fn new(values: IndexValues) -> Self {
        Self { name: None, values }
    }

    /// `0..n` as an integer index.
    pub fn range(n: usize) -> Self {
        Self::new(IndexValues::Int((0..n as i64).collect()))
    }

    pub fn from_strings<S: Into<String>>(values: impl IntoIterator<Item = S>) -> Self {
        Self::new(IndexValues::Str(values.into_iter().map(Into::into).collect()))
    }

    /// An index over stored values: integer kinds stay integers, anything
    /// else is rendered as strings.
    pub fn from_column(col: Column) -> Self {
        let values = if col.kind().is_integer() {
            numeric_match!(&col, v => IndexValues::Int(v.iter().map(|&x| x as i64).collect()),
                _ => IndexValues::Str(col.to_strings()))
        } else {
            IndexValues::Str(col.to_strings())
        };
        Self::new(values)
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn set_name(&mut self, name: Option<String>) {
        self.name = name;
    }

    pub fn values(&self) -> &IndexValues {
        &self.values
    }

    pub fn len(&self) -> usize {
        match &self.values {
            IndexValues::Int(v) => v.len(),
            IndexValues::Str(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_integer(&self) -> bool {
        matches!(self.values, IndexValues::Int(_))
    }

    pub fn to_strings(&self) -> Vec<String> {
        match &self.values {
            IndexValues::Int(v) => v.iter().map(i64::to_string).collect(),
            IndexValues::Str(v) => v.clone(),
        }
    }

    /// The index as a regular column.
    pub fn to_column(&self) -> Column {
        match &self.values {
            IndexValues::Int(v) => Column::Int64(v.clone()),
            IndexValues::Str(v) => Column::Strings(v.clone()),
        }
    }

    pub fn is_unique(&self) -> bool {
        match &self.values {
            IndexValues::Int(v) => v.iter().collect::<HashSet<_>>().len() == v.len(),
            IndexValues::Str(v) => v.iter().collect::<HashSet<_>>().len() == v.len(),
        }
    }

    /// Rename repeated labels: the first occurrence is kept, later ones get
    /// `<label><join><n>` with `n` counting up per label and skipping any
    /// candidate that already exists. Returns the number of renamed entries.
    ///
    /// Integer indices are converted to strings first when they contain
    /// duplicates.
    pub fn make_unique(&mut self, join: &str) -> usize {
        if self.is_unique() {
            return 0;
        }
        let mut values = self.to_strings();
        let mut taken: HashSet<String> = values.iter().cloned().collect();
        let mut seen: HashSet<String> = HashSet::with_capacity(values.len());
        let mut counters: HashMap<String, usize> = HashMap::new();
        let mut renamed = 0;
        let mut collisions = Vec::new();

        for value in values.iter_mut() {
            if seen.insert(value.clone()) {
                continue;
            }
            let counter = counters.entry(value.clone()).or_insert(0);
            loop {
                *counter += 1;
                let candidate = format!("{value}{join}{counter}");
                if taken.insert(candidate.clone()) {
                    *value = candidate;
                    renamed += 1;
                    break;
                }
                collisions.push(candidate);
            }
        }
        if !collisions.is_empty() {
            vitzarr_core::warn!(
                "suffixed names collided with existing names ({}), later candidates were used",
                collisions.iter().take(3).cloned().collect::<Vec<_>>().join(", ")
            );
        }
        self.values = IndexValues::Str(values);
        renamed
    }
}

// ---------------------------------------------------------------------------
// DataFrame
// ---------------------------------------------------------------------------

/// Index plus ordered, equally long, named columns.
#[derive(Debug, Clone, PartialEq)]
pub struct DataFrame {
    index: Index,
    columns: IndexMap<String, Column>,
}

impl DataFrame {
    /// An empty table over `index`.
    pub fn new(index: Index) -> Self {
        Self {
            index,
            columns: IndexMap::new(),
        }
    }

    /// Build a table from columns, validating their lengths.
    pub fn from_columns(
        index: Index,
        columns: impl IntoIterator<Item = (String, Column)>,
    ) -> Result<Self> {
        let mut df = Self::new(index);
        for (name, col) in columns {
            df.add_column(&name, col)?;
        }
        Ok(df)
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn index(&self) -> &Index {
        &self.index
    }

    pub fn index_mut(&mut self) -> &mut Index {
        &mut self.index
    }

    /// Replace the index; the row count must not change.
    pub fn set_index(&mut self, index: Index) -> Result<()> {
        if index.len() != self.len() {
            return Err(VitzarrError::InvalidInput(format!(
                "new index length ({}) does not match row count ({})",
                index.len(),
                self.len()
            )));
        }
        self.index = index;
        Ok(())
    }

    pub fn n_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }

    pub fn columns(&self) -> impl Iterator<Item = (&str, &Column)> {
        self.columns.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.columns.contains_key(name)
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.get(name)
    }

    /// Insert or replace a column. A replaced column keeps its position.
    pub fn add_column(&mut self, name: &str, col: Column) -> Result<()> {
        if col.len() != self.len() {
            return Err(VitzarrError::InvalidInput(format!(
                "column '{}' length ({}) does not match row count ({})",
                name,
                col.len(),
                self.len()
            )));
        }
        self.columns.insert(name.to_string(), col);
        Ok(())
    }

    pub fn remove_column(&mut self, name: &str) -> Option<Column> {
        self.columns.shift_remove(name)
    }

    /// Rewrite columns through `f`, keeping names and order. `f` returns
    /// `None` to leave a column as it is. The frame is only modified once
    /// every call has succeeded.
    pub fn try_map_columns<F>(&mut self, mut f: F) -> Result<()>
    where
        F: FnMut(&str, &Column) -> Result<Option<Column>>,
    {
        let n = self.len();
        let mut replaced = Vec::new();
        for (i, (name, col)) in self.columns.iter().enumerate() {
            let Some(mapped) = f(name, col)? else {
                continue;
            };
            if mapped.len() != n {
                return Err(VitzarrError::InvalidInput(format!(
                    "column '{}' changed length to {} (expected {})",
                    name,
                    mapped.len(),
                    n
                )));
            }
            replaced.push((i, mapped));
        }
        for (i, mapped) in replaced {
            self.columns[i] = mapped;
        }
        Ok(())
    }

    /// Move the index into a leading column and install a `0..n` index.
    ///
    /// The column is named after the index, or `index` (then `level_0`) when
    /// the index is unnamed.
    pub fn reset_index(&mut self) -> Result<()> {
        let name = match self.index.name() {
            Some(name) => name.to_string(),
            None if !self.contains("index") => "index".to_string(),
            None => "level_0".to_string(),
        };
        if self.contains(&name) {
            return Err(VitzarrError::InvalidInput(format!(
                "cannot reset index: column '{name}' already exists"
            )));
        }
        let col = self.index.to_column();
        let mut columns = IndexMap::with_capacity(self.columns.len() + 1);
        columns.insert(name, col);
        columns.extend(std::mem::take(&mut self.columns));
        self.columns = columns;
        self.index = Index::range(self.len());
        Ok(())
    }

    /// Promote column `name` to be the index, removing it from the columns.
    /// Values become strings and the index takes the column's name.
    pub fn set_index_from_column(&mut self, name: &str) -> Result<()> {
        let col = self.remove_column(name).ok_or_else(|| {
            VitzarrError::InvalidInput(format!("no column named '{name}'"))
        })?;
        self.index = Index::from_strings(col.to_strings()).with_name(name);
        Ok(())
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn make_unique_always_unique(names in proptest::collection::vec("[ab]{1,2}(-[12])?", 0..40)) {
            let mut index = Index::from_strings(names.clone());
            index.make_unique("-");
            prop_assert!(index.is_unique());
            prop_assert_eq!(index.len(), names.len());
            // First occurrences are untouched.
            let out = index.to_strings();
            let mut seen = HashSet::new();
            for (i, name) in names.iter().enumerate() {
                if seen.insert(name.clone()) {
                    prop_assert_eq!(&out[i], name);
                }
            }
        }
    }
}
