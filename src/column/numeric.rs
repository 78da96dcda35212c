//! Fixed-width numeric columns.
//!
//! All integers and floats are flat slabs of `rows * width` little-endian
//! bytes. [`ColumnVector`] is generic over the element; `Bool` and the
//! 256-bit integers get their own small columns because their [`Value`]
//! shape differs from the plain integer case.

use bytes::{BufMut, BytesMut};

use super::{value_mismatch, ColumnData};
use crate::types::Type;
use crate::value::{Int256, UInt256, Value};
use crate::wire::WireReader;
use crate::Result;

/// A primitive element of a fixed-width numeric column.
pub trait Primitive: Copy + Send + Sync + 'static {
    /// Storage width in bytes.
    const WIDTH: usize;

    /// The server type this primitive maps to.
    fn data_type() -> Type;

    /// Decodes one value from a little-endian chunk of `WIDTH` bytes.
    fn from_le_chunk(chunk: &[u8]) -> Self;

    /// Encodes one value.
    fn put(self, buf: &mut BytesMut);

    /// Wraps into the matching [`Value`] variant.
    fn wrap(self) -> Value;

    /// Unwraps from the matching [`Value`] variant.
    fn unwrap(value: &Value) -> Option<Self>;
}

macro_rules! impl_primitive {
    ($ty:ty, $width:expr, $type_variant:ident, $value_variant:ident, $put:ident) => {
        impl Primitive for $ty {
            const WIDTH: usize = $width;

            fn data_type() -> Type {
                Type::$type_variant
            }

            fn from_le_chunk(chunk: &[u8]) -> Self {
                <$ty>::from_le_bytes(chunk.try_into().unwrap())
            }

            fn put(self, buf: &mut BytesMut) {
                buf.$put(self);
            }

            fn wrap(self) -> Value {
                Value::$value_variant(self)
            }

            fn unwrap(value: &Value) -> Option<Self> {
                match value {
                    Value::$value_variant(v) => Some(*v),
                    _ => None,
                }
            }
        }
    };
}

impl_primitive!(u8, 1, UInt8, UInt8, put_u8);
impl_primitive!(u16, 2, UInt16, UInt16, put_u16_le);
impl_primitive!(u32, 4, UInt32, UInt32, put_u32_le);
impl_primitive!(u64, 8, UInt64, UInt64, put_u64_le);
impl_primitive!(u128, 16, UInt128, UInt128, put_u128_le);
impl_primitive!(i8, 1, Int8, Int8, put_i8);
impl_primitive!(i16, 2, Int16, Int16, put_i16_le);
impl_primitive!(i32, 4, Int32, Int32, put_i32_le);
impl_primitive!(i64, 8, Int64, Int64, put_i64_le);
impl_primitive!(i128, 16, Int128, Int128, put_i128_le);
impl_primitive!(f32, 4, Float32, Float32, put_f32_le);
impl_primitive!(f64, 8, Float64, Float64, put_f64_le);

/// Generic flat column for numeric primitives.
pub struct ColumnVector<T: Primitive> {
    type_: Type,
    data: Vec<T>,
}

impl<T: Primitive> ColumnVector<T> {
    /// Creates an empty column of the primitive's type.
    pub fn new() -> Self {
        Self { type_: T::data_type(), data: Vec::new() }
    }

    /// Creates an empty column with reserved capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self { type_: T::data_type(), data: Vec::with_capacity(capacity) }
    }

    /// Creates a column from existing data.
    pub fn from_vec(data: Vec<T>) -> Self {
        Self { type_: T::data_type(), data }
    }

    /// Appends a typed value.
    pub fn append(&mut self, value: T) {
        self.data.push(value);
    }

    /// Returns the value at `index`, if in range.
    pub fn get(&self, index: usize) -> Option<T> {
        self.data.get(index).copied()
    }

    /// Returns the value at `index`.
    ///
    /// # Panics
    ///
    /// Panics if out of range.
    pub fn at(&self, index: usize) -> T {
        self.data[index]
    }

    /// The underlying slab.
    pub fn data(&self) -> &[T] {
        &self.data
    }

    /// Iterates the values.
    pub fn iter(&self) -> impl Iterator<Item = T> + '_ {
        self.data.iter().copied()
    }
}

impl<T: Primitive> Default for ColumnVector<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Primitive> ColumnData for ColumnVector<T> {
    fn data_type(&self) -> &Type {
        &self.type_
    }

    fn len(&self) -> usize {
        self.data.len()
    }

    fn clear(&mut self) {
        self.data.clear();
    }

    fn reserve(&mut self, additional: usize) {
        self.data.reserve(additional);
    }

    fn read_body(
        &mut self,
        reader: &mut WireReader<'_>,
        rows: usize,
    ) -> Result<()> {
        let raw = reader.read_raw(rows * T::WIDTH)?;
        self.data.reserve(rows);
        self.data.extend(raw.chunks_exact(T::WIDTH).map(T::from_le_chunk));
        Ok(())
    }

    fn write_body(&self, buf: &mut BytesMut) -> Result<()> {
        buf.reserve(self.data.len() * T::WIDTH);
        for value in &self.data {
            value.put(buf);
        }
        Ok(())
    }

    fn append_value(&mut self, value: Value) -> Result<()> {
        let v = T::unwrap(&value)
            .ok_or_else(|| value_mismatch(&value, &self.type_))?;
        self.data.push(v);
        Ok(())
    }

    fn value_at(&self, index: usize) -> Value {
        self.data[index].wrap()
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}

/// Unsigned 8-bit column.
pub type ColumnUInt8 = ColumnVector<u8>;
/// Unsigned 16-bit column.
pub type ColumnUInt16 = ColumnVector<u16>;
/// Unsigned 32-bit column.
pub type ColumnUInt32 = ColumnVector<u32>;
/// Unsigned 64-bit column.
pub type ColumnUInt64 = ColumnVector<u64>;
/// Unsigned 128-bit column.
pub type ColumnUInt128 = ColumnVector<u128>;
/// Signed 8-bit column.
pub type ColumnInt8 = ColumnVector<i8>;
/// Signed 16-bit column.
pub type ColumnInt16 = ColumnVector<i16>;
/// Signed 32-bit column.
pub type ColumnInt32 = ColumnVector<i32>;
/// Signed 64-bit column.
pub type ColumnInt64 = ColumnVector<i64>;
/// Signed 128-bit column.
pub type ColumnInt128 = ColumnVector<i128>;
/// 32-bit float column.
pub type ColumnFloat32 = ColumnVector<f32>;
/// 64-bit float column.
pub type ColumnFloat64 = ColumnVector<f64>;

/// Bool column; one byte per row, 0 or 1 on the wire.
pub struct ColumnBool {
    type_: Type,
    data: Vec<bool>,
}

impl ColumnBool {
    /// Creates an empty Bool column.
    pub fn new() -> Self {
        Self { type_: Type::Bool, data: Vec::new() }
    }

    /// Appends a value.
    pub fn append(&mut self, value: bool) {
        self.data.push(value);
    }

    /// Returns the value at `index`, if in range.
    pub fn get(&self, index: usize) -> Option<bool> {
        self.data.get(index).copied()
    }
}

impl Default for ColumnBool {
    fn default() -> Self {
        Self::new()
    }
}

impl ColumnData for ColumnBool {
    fn data_type(&self) -> &Type {
        &self.type_
    }

    fn len(&self) -> usize {
        self.data.len()
    }

    fn clear(&mut self) {
        self.data.clear();
    }

    fn reserve(&mut self, additional: usize) {
        self.data.reserve(additional);
    }

    fn read_body(
        &mut self,
        reader: &mut WireReader<'_>,
        rows: usize,
    ) -> Result<()> {
        let raw = reader.read_raw(rows)?;
        self.data.reserve(rows);
        self.data.extend(raw.iter().map(|&b| b != 0));
        Ok(())
    }

    fn write_body(&self, buf: &mut BytesMut) -> Result<()> {
        buf.reserve(self.data.len());
        for &value in &self.data {
            buf.put_u8(value as u8);
        }
        Ok(())
    }

    fn append_value(&mut self, value: Value) -> Result<()> {
        match value {
            Value::Bool(v) => {
                self.data.push(v);
                Ok(())
            }
            other => Err(value_mismatch(&other, &self.type_)),
        }
    }

    fn value_at(&self, index: usize) -> Value {
        Value::Bool(self.data[index])
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}

macro_rules! wide_int_column {
    ($name:ident, $elem:ty, $type_variant:ident, $value_variant:ident, $doc:literal) => {
        #[doc = $doc]
        pub struct $name {
            type_: Type,
            data: Vec<$elem>,
        }

        impl $name {
            /// Creates an empty column.
            pub fn new() -> Self {
                Self { type_: Type::$type_variant, data: Vec::new() }
            }

            /// Appends a typed value.
            pub fn append(&mut self, value: $elem) {
                self.data.push(value);
            }

            /// Returns the value at `index`, if in range.
            pub fn get(&self, index: usize) -> Option<$elem> {
                self.data.get(index).copied()
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl ColumnData for $name {
            fn data_type(&self) -> &Type {
                &self.type_
            }

            fn len(&self) -> usize {
                self.data.len()
            }

            fn clear(&mut self) {
                self.data.clear();
            }

            fn reserve(&mut self, additional: usize) {
                self.data.reserve(additional);
            }

            fn read_body(
                &mut self,
                reader: &mut WireReader<'_>,
                rows: usize,
            ) -> Result<()> {
                let raw = reader.read_raw(rows * 32)?;
                self.data.reserve(rows);
                for chunk in raw.chunks_exact(32) {
                    self.data
                        .push(<$elem>::from_le_bytes(chunk.try_into().unwrap()));
                }
                Ok(())
            }

            fn write_body(&self, buf: &mut BytesMut) -> Result<()> {
                buf.reserve(self.data.len() * 32);
                for value in &self.data {
                    buf.put_slice(&value.0);
                }
                Ok(())
            }

            fn append_value(&mut self, value: Value) -> Result<()> {
                match value {
                    Value::$value_variant(v) => {
                        self.data.push(v);
                        Ok(())
                    }
                    other => Err(value_mismatch(&other, &self.type_)),
                }
            }

            fn value_at(&self, index: usize) -> Value {
                Value::$value_variant(self.data[index])
            }

            fn as_any(&self) -> &dyn std::any::Any {
                self
            }

            fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
                self
            }
        }
    };
}

wide_int_column!(
    ColumnInt256,
    Int256,
    Int256,
    Int256,
    "Signed 256-bit column; 32 little-endian bytes per row."
);
wide_int_column!(
    ColumnUInt256,
    UInt256,
    UInt256,
    UInt256,
    "Unsigned 256-bit column; 32 little-endian bytes per row."
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vector_roundtrip() {
        let mut col = ColumnInt32::new();
        for v in [1, -2, 3, i32::MIN, i32::MAX] {
            col.append(v);
        }

        let mut buf = BytesMut::new();
        col.write_body(&mut buf).unwrap();
        assert_eq!(buf.len(), 5 * 4);

        let mut decoded = ColumnInt32::new();
        let mut reader = WireReader::new(&buf);
        decoded.read_body(&mut reader, 5).unwrap();
        assert_eq!(decoded.data(), col.data());
    }

    #[test]
    fn test_vector_value_api() {
        let mut col = ColumnUInt64::new();
        col.append_value(Value::UInt64(7)).unwrap();
        assert_eq!(col.value_at(0), Value::UInt64(7));
        assert!(col.append_value(Value::from("nope")).is_err());
    }

    #[test]
    fn test_float_roundtrip() {
        let mut col = ColumnFloat64::new();
        for v in [0.0, -1.5, std::f64::consts::PI] {
            col.append(v);
        }

        let mut buf = BytesMut::new();
        col.write_body(&mut buf).unwrap();

        let mut decoded = ColumnFloat64::new();
        decoded.read_body(&mut WireReader::new(&buf), 3).unwrap();
        assert_eq!(decoded.data(), col.data());
    }

    #[test]
    fn test_bool_wire_bytes() {
        let mut col = ColumnBool::new();
        col.append(true);
        col.append(false);

        let mut buf = BytesMut::new();
        col.write_body(&mut buf).unwrap();
        assert_eq!(&buf[..], &[1, 0]);

        let mut decoded = ColumnBool::new();
        decoded.read_body(&mut WireReader::new(&buf), 2).unwrap();
        assert_eq!(decoded.value_at(0), Value::Bool(true));
        assert_eq!(decoded.value_at(1), Value::Bool(false));
    }

    #[test]
    fn test_int256_roundtrip() {
        let mut col = ColumnInt256::new();
        col.append(Int256::from_i128(-42));
        col.append(Int256::from_i128(i128::MAX));

        let mut buf = BytesMut::new();
        col.write_body(&mut buf).unwrap();
        assert_eq!(buf.len(), 64);

        let mut decoded = ColumnInt256::new();
        decoded.read_body(&mut WireReader::new(&buf), 2).unwrap();
        assert_eq!(decoded.get(0), Some(Int256::from_i128(-42)));
        assert_eq!(decoded.get(1), Some(Int256::from_i128(i128::MAX)));
    }

    #[test]
    fn test_short_buffer() {
        let buf = [0u8; 7];
        let mut col = ColumnUInt64::new();
        let err = col.read_body(&mut WireReader::new(&buf), 1).unwrap_err();
        assert!(matches!(err, crate::Error::UnexpectedEof));
    }
}
