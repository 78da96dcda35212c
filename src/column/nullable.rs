//! Nullable columns.
//!
//! Wire layout: one mask byte per row (1 = null), then the inner column
//! encoded unconditionally for all rows. Null rows still occupy a slot in
//! the inner column; its bytes are the type default and carry no meaning.

use bytes::{BufMut, BytesMut};

use super::{new_column, ColumnBuffer, ColumnData};
use crate::types::Type;
use crate::value::Value;
use crate::wire::WireReader;
use crate::{Error, Result};

/// Column for `Nullable(T)`.
pub struct ColumnNullable {
    type_: Type,
    mask: Vec<u8>,
    inner: ColumnBuffer,
}

impl ColumnNullable {
    /// Creates an empty column for a `Nullable(T)` type.
    pub fn new(type_: Type) -> Result<Self> {
        type_.validate()?;
        let inner = match &type_ {
            Type::Nullable(inner) => new_column(inner)?,
            other => {
                return Err(Error::InvalidType(format!(
                    "ColumnNullable requires Nullable, got {}",
                    other
                )))
            }
        };
        Ok(Self { type_, mask: Vec::new(), inner })
    }

    /// Appends a null row. The inner column gets a default placeholder.
    pub fn append_null(&mut self) {
        self.mask.push(1);
        let placeholder = self.inner.data_type().default_value();
        self.inner
            .append_value(placeholder)
            .expect("default value always fits its own type");
    }

    /// Appends a non-null value.
    pub fn append(&mut self, value: Value) -> Result<()> {
        self.inner.append_value(value)?;
        self.mask.push(0);
        Ok(())
    }

    /// True when the row at `index` is null.
    ///
    /// # Panics
    ///
    /// Panics if out of range.
    pub fn is_null(&self, index: usize) -> bool {
        self.mask[index] != 0
    }

    /// The inner column holding the non-null payloads.
    pub fn inner(&self) -> &dyn ColumnData {
        self.inner.as_ref()
    }

    /// The raw null mask.
    pub fn mask(&self) -> &[u8] {
        &self.mask
    }
}

impl ColumnData for ColumnNullable {
    fn data_type(&self) -> &Type {
        &self.type_
    }

    fn len(&self) -> usize {
        self.mask.len()
    }

    fn clear(&mut self) {
        self.mask.clear();
        self.inner.clear();
    }

    fn reserve(&mut self, additional: usize) {
        self.mask.reserve(additional);
        self.inner.reserve(additional);
    }

    fn read_body(
        &mut self,
        reader: &mut WireReader<'_>,
        rows: usize,
    ) -> Result<()> {
        let mask = reader.read_raw(rows)?;
        self.mask.extend_from_slice(mask);
        self.inner.read_body(reader, rows)
    }

    fn write_body(&self, buf: &mut BytesMut) -> Result<()> {
        buf.put_slice(&self.mask);
        self.inner.write_body(buf)
    }

    fn append_value(&mut self, value: Value) -> Result<()> {
        match value {
            Value::Null => {
                self.append_null();
                Ok(())
            }
            other => self.append(other),
        }
    }

    fn value_at(&self, index: usize) -> Value {
        if self.is_null(index) {
            Value::Null
        } else {
            self.inner.value_at(index)
        }
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_byte_layout() {
        // ["a", NULL, "b"] => mask 00 01 00, then "a", "", "b".
        let ty = Type::parse("Nullable(String)").unwrap();
        let mut col = ColumnNullable::new(ty).unwrap();
        col.append(Value::from("a")).unwrap();
        col.append_null();
        col.append(Value::from("b")).unwrap();

        let mut buf = BytesMut::new();
        col.write_body(&mut buf).unwrap();
        assert_eq!(
            &buf[..],
            &[
                0x00, 0x01, 0x00, // null mask
                0x01, b'a', // "a"
                0x00, // "" placeholder for the null row
                0x01, b'b', // "b"
            ]
        );
    }

    #[test]
    fn test_roundtrip() {
        let ty = Type::parse("Nullable(Int32)").unwrap();
        let mut col = ColumnNullable::new(ty.clone()).unwrap();
        col.append(Value::Int32(5)).unwrap();
        col.append_null();
        col.append(Value::Int32(-7)).unwrap();

        let mut buf = BytesMut::new();
        col.write_body(&mut buf).unwrap();

        let mut decoded = ColumnNullable::new(ty).unwrap();
        decoded.read_body(&mut WireReader::new(&buf), 3).unwrap();
        assert_eq!(decoded.len(), 3);
        assert_eq!(decoded.value_at(0), Value::Int32(5));
        assert_eq!(decoded.value_at(1), Value::Null);
        assert_eq!(decoded.value_at(2), Value::Int32(-7));
    }

    #[test]
    fn test_illegal_inner_types_rejected() {
        assert!(ColumnNullable::new(Type::nullable(Type::array(Type::UInt8)))
            .is_err());
        assert!(ColumnNullable::new(Type::nullable(Type::nullable(
            Type::UInt8
        )))
        .is_err());
    }
}
