//! Element type kinds shared by columns, dense arrays and on-disk encodings.

use std::fmt;

/// Storage kind of a column or array, named after its numpy dtype.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DTypeKind {
    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Float32,
    Float64,
    Bool,
    String,
    Categorical,
}

impl DTypeKind {
    /// The numpy/pandas dtype name (`"int8"`, `"float32"`, `"category"`, ...).
    pub fn name(&self) -> &'static str {
        match self {
            DTypeKind::Int8 => "int8",
            DTypeKind::Int16 => "int16",
            DTypeKind::Int32 => "int32",
            DTypeKind::Int64 => "int64",
            DTypeKind::UInt8 => "uint8",
            DTypeKind::UInt16 => "uint16",
            DTypeKind::UInt32 => "uint32",
            DTypeKind::UInt64 => "uint64",
            DTypeKind::Float32 => "float32",
            DTypeKind::Float64 => "float64",
            DTypeKind::Bool => "bool",
            DTypeKind::String => "string",
            DTypeKind::Categorical => "category",
        }
    }

    pub fn is_signed_integer(&self) -> bool {
        matches!(
            self,
            DTypeKind::Int8 | DTypeKind::Int16 | DTypeKind::Int32 | DTypeKind::Int64
        )
    }

    pub fn is_unsigned_integer(&self) -> bool {
        matches!(
            self,
            DTypeKind::UInt8 | DTypeKind::UInt16 | DTypeKind::UInt32 | DTypeKind::UInt64
        )
    }

    pub fn is_integer(&self) -> bool {
        self.is_signed_integer() || self.is_unsigned_integer()
    }

    pub fn is_float(&self) -> bool {
        matches!(self, DTypeKind::Float32 | DTypeKind::Float64)
    }

    /// Integer or floating point.
    pub fn is_numeric(&self) -> bool {
        self.is_integer() || self.is_float()
    }
}

impl fmt::Display for DTypeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Cast to `int32` the way numpy's `astype(np.int32)` does on x86_64:
/// integers keep their low 32 bits, floats truncate toward zero, and NaN,
/// infinities and floats outside the `i32` range become `i32::MIN`.
pub(crate) trait CastI32: Copy {
    fn cast_i32(self) -> i32;
}

macro_rules! impl_cast_i32_wrapping {
    ($($t:ty),*) => {
        $(impl CastI32 for $t {
            fn cast_i32(self) -> i32 {
                self as i32
            }
        })*
    };
}

impl_cast_i32_wrapping!(i8, i16, i32, i64, u8, u16, u32, u64);

impl CastI32 for f64 {
    fn cast_i32(self) -> i32 {
        let t = self.trunc();
        if (f64::from(i32::MIN)..=f64::from(i32::MAX)).contains(&t) {
            t as i32
        } else {
            i32::MIN
        }
    }
}

impl CastI32 for f32 {
    fn cast_i32(self) -> i32 {
        f64::from(self).cast_i32()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_follow_numpy() {
        assert_eq!(DTypeKind::Int64.name(), "int64");
        assert_eq!(DTypeKind::UInt8.to_string(), "uint8");
        assert_eq!(DTypeKind::Categorical.name(), "category");
    }

    #[test]
    fn kind_predicates() {
        assert!(DTypeKind::Int8.is_signed_integer());
        assert!(!DTypeKind::UInt64.is_signed_integer());
        assert!(DTypeKind::UInt64.is_integer());
        assert!(DTypeKind::Float32.is_numeric());
        assert!(!DTypeKind::Bool.is_numeric());
        assert!(!DTypeKind::String.is_integer());
    }

    #[test]
    fn int32_cast_matches_numpy() {
        assert_eq!(i64::from(i32::MAX).wrapping_add(1).cast_i32(), i32::MIN);
        assert_eq!(u32::MAX.cast_i32(), -1);
        assert_eq!((-3i8).cast_i32(), -3);
        assert_eq!(2.9f64.cast_i32(), 2);
        assert_eq!((-2.9f32).cast_i32(), -2);
        assert_eq!(f64::NAN.cast_i32(), i32::MIN);
        assert_eq!(f32::INFINITY.cast_i32(), i32::MIN);
        assert_eq!(3e9f64.cast_i32(), i32::MIN);
        assert_eq!((-3e9f64).cast_i32(), i32::MIN);
        assert_eq!(2147483647.5f64.cast_i32(), i32::MAX);
    }
}
