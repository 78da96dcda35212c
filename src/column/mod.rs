//! Column buffers for every server type.
//!
//! A column buffer owns the decoded data of one block column. Each family
//! of types gets its own module with its own storage shape: a flat slab for
//! fixed-width values, offsets plus bytes for strings, a null mask plus an
//! inner column for Nullable, offsets plus a child for Array and Map, one
//! child per field for Tuple, and a dictionary plus index codes for
//! LowCardinality.
//!
//! Columns are exclusively owned by their [`Block`](crate::block::Block);
//! values are copied on append. Serialization is synchronous over in-memory
//! buffers -- [`ColumnData::read_body`] consumes a [`WireReader`] and
//! [`ColumnData::write_body`] appends to a `BytesMut`; the connection layer
//! decides when enough socket bytes have accumulated.

/// Array columns.
pub mod array;
/// Date, Date32, DateTime, and DateTime64 columns.
pub mod date;
/// Decimal columns with width chosen by precision.
pub mod decimal;
/// Enum8 and Enum16 columns.
pub mod enumeration;
/// IPv4 and IPv6 columns.
pub mod ip;
/// LowCardinality dictionary-encoded columns.
pub mod low_cardinality;
/// Map columns (Array(Tuple(K, V)) layout).
pub mod map;
/// The Nothing column.
pub mod nothing;
/// Nullable columns (null mask plus inner column).
pub mod nullable;
/// Fixed-width numeric columns, Bool, and the 256-bit integers.
pub mod numeric;
/// String and FixedString columns.
pub mod string;
/// Tuple columns.
pub mod tuple;
/// UUID columns.
pub mod uuid;

pub use array::ColumnArray;
pub use date::{ColumnDate, ColumnDate32, ColumnDateTime, ColumnDateTime64};
pub use decimal::ColumnDecimal;
pub use enumeration::{ColumnEnum16, ColumnEnum8};
pub use ip::{ColumnIpv4, ColumnIpv6};
pub use low_cardinality::ColumnLowCardinality;
pub use map::ColumnMap;
pub use nothing::ColumnNothing;
pub use nullable::ColumnNullable;
pub use numeric::{
    ColumnBool, ColumnFloat32, ColumnFloat64, ColumnInt128, ColumnInt16,
    ColumnInt256, ColumnInt32, ColumnInt64, ColumnInt8, ColumnUInt128,
    ColumnUInt16, ColumnUInt256, ColumnUInt32, ColumnUInt64, ColumnUInt8,
    ColumnVector,
};
pub use string::{ColumnFixedString, ColumnString};
pub use tuple::ColumnTuple;
pub use uuid::ColumnUuid;

use bytes::BytesMut;

use crate::types::Type;
use crate::value::Value;
use crate::wire::WireReader;
use crate::{Error, Result};

/// A typed, appendable buffer holding one column of a block.
pub trait ColumnData: Send + Sync {
    /// The type this column was created for.
    fn data_type(&self) -> &Type;

    /// Number of rows currently held.
    fn len(&self) -> usize;

    /// True when the column holds no rows.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops all rows, keeping the type.
    fn clear(&mut self);

    /// Reserves room for `additional` more rows.
    fn reserve(&mut self, additional: usize);

    /// Decodes `rows` values from the reader, appending to this column.
    fn read_body(&mut self, reader: &mut WireReader<'_>, rows: usize)
        -> Result<()>;

    /// Encodes all rows of this column.
    fn write_body(&self, buf: &mut BytesMut) -> Result<()>;

    /// Appends one dynamic value. The value must match the column type;
    /// NULL is accepted only by Nullable and LowCardinality(Nullable).
    fn append_value(&mut self, value: Value) -> Result<()>;

    /// Returns the value at `index` in its raw wire representation.
    ///
    /// # Panics
    ///
    /// Panics if `index >= len()`; the block layer checks bounds.
    fn value_at(&self, index: usize) -> Value;

    /// Downcast support.
    fn as_any(&self) -> &dyn std::any::Any;

    /// Mutable downcast support.
    fn as_any_mut(&mut self) -> &mut dyn std::any::Any;
}

/// A heap-allocated column buffer, exclusively owned by its block.
pub type ColumnBuffer = Box<dyn ColumnData>;

/// Creates an empty column buffer for `ty`.
pub fn new_column(ty: &Type) -> Result<ColumnBuffer> {
    Ok(match ty {
        Type::Bool => Box::new(ColumnBool::new()),
        Type::UInt8 => Box::new(ColumnUInt8::new()),
        Type::UInt16 => Box::new(ColumnUInt16::new()),
        Type::UInt32 => Box::new(ColumnUInt32::new()),
        Type::UInt64 => Box::new(ColumnUInt64::new()),
        Type::UInt128 => Box::new(ColumnUInt128::new()),
        Type::UInt256 => Box::new(ColumnUInt256::new()),
        Type::Int8 => Box::new(ColumnInt8::new()),
        Type::Int16 => Box::new(ColumnInt16::new()),
        Type::Int32 => Box::new(ColumnInt32::new()),
        Type::Int64 => Box::new(ColumnInt64::new()),
        Type::Int128 => Box::new(ColumnInt128::new()),
        Type::Int256 => Box::new(ColumnInt256::new()),
        Type::Float32 => Box::new(ColumnFloat32::new()),
        Type::Float64 => Box::new(ColumnFloat64::new()),
        Type::String => Box::new(ColumnString::new()),
        Type::FixedString(_) => Box::new(ColumnFixedString::new(ty.clone())?),
        Type::Date => Box::new(ColumnDate::new()),
        Type::Date32 => Box::new(ColumnDate32::new()),
        Type::DateTime { .. } => Box::new(ColumnDateTime::new(ty.clone())?),
        Type::DateTime64 { .. } => {
            Box::new(ColumnDateTime64::new(ty.clone())?)
        }
        Type::Decimal { .. } => Box::new(ColumnDecimal::new(ty.clone())?),
        Type::Uuid => Box::new(ColumnUuid::new()),
        Type::Ipv4 => Box::new(ColumnIpv4::new()),
        Type::Ipv6 => Box::new(ColumnIpv6::new()),
        Type::Enum8(_) => Box::new(ColumnEnum8::new(ty.clone())?),
        Type::Enum16(_) => Box::new(ColumnEnum16::new(ty.clone())?),
        Type::Nullable(_) => Box::new(ColumnNullable::new(ty.clone())?),
        Type::Array(_) => Box::new(ColumnArray::new(ty.clone())?),
        Type::Tuple(_) => Box::new(ColumnTuple::new(ty.clone())?),
        Type::Map(_, _) => Box::new(ColumnMap::new(ty.clone())?),
        Type::LowCardinality(_) => {
            Box::new(ColumnLowCardinality::new(ty.clone())?)
        }
        Type::Nothing => Box::new(ColumnNothing::new()),
    })
}

/// Error for a dynamic value that does not fit the column's type.
pub(crate) fn value_mismatch(value: &Value, ty: &Type) -> Error {
    Error::UnsupportedType(format!(
        "cannot append {} value to a column of type {}",
        value.variant_name(),
        ty
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_factory_covers_every_type() {
        let exprs = [
            "Bool",
            "UInt8",
            "UInt256",
            "Int128",
            "Float64",
            "String",
            "FixedString(4)",
            "Date",
            "Date32",
            "DateTime",
            "DateTime64(3)",
            "Decimal(40, 10)",
            "UUID",
            "IPv4",
            "IPv6",
            "Enum8('a' = 1)",
            "Nullable(String)",
            "Array(Int32)",
            "Tuple(UInt8, String)",
            "Map(String, UInt64)",
            "LowCardinality(String)",
            "Nothing",
        ];
        for expr in exprs {
            let ty = Type::parse(expr).unwrap();
            let col = new_column(&ty).unwrap();
            assert_eq!(col.len(), 0, "{}", expr);
            assert_eq!(col.data_type(), &ty);
        }
    }

    #[test]
    fn test_append_default_roundtrip_for_every_type() {
        // Every type's default value must be appendable and readable back.
        let exprs = [
            "Bool",
            "Int64",
            "String",
            "FixedString(4)",
            "DateTime64(6)",
            "Decimal(6, 2)",
            "UUID",
            "Nullable(UInt8)",
            "Array(String)",
            "Tuple(UInt8, String)",
            "Map(String, UInt64)",
            "LowCardinality(Nullable(String))",
        ];
        for expr in exprs {
            let ty = Type::parse(expr).unwrap();
            let mut col = new_column(&ty).unwrap();
            let default = ty.default_value();
            col.append_value(default.clone()).unwrap();
            assert_eq!(col.len(), 1, "{}", expr);
            assert_eq!(col.value_at(0), default, "{}", expr);
        }
    }
}
