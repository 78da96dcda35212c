//! Enum8 and Enum16 columns.
//!
//! Storage is the signed code (one or two bytes LE); the name-to-code
//! mapping lives in the type descriptor. Codes without a mapped name pass
//! through as integers rather than failing the read.

use bytes::{BufMut, BytesMut};

use super::{value_mismatch, ColumnData};
use crate::types::Type;
use crate::value::Value;
use crate::wire::WireReader;
use crate::{Error, Result};

macro_rules! enum_column {
    ($name:ident, $code:ty, $type_variant:ident, $value_variant:ident, $width:expr, $doc:literal) => {
        #[doc = $doc]
        pub struct $name {
            type_: Type,
            data: Vec<$code>,
        }

        impl $name {
            /// Creates an empty column for the given enum type.
            pub fn new(type_: Type) -> Result<Self> {
                match &type_ {
                    Type::$type_variant(_) => {
                        Ok(Self { type_, data: Vec::new() })
                    }
                    other => Err(Error::InvalidType(format!(
                        concat!(
                            stringify!($name),
                            " requires ",
                            stringify!($type_variant),
                            ", got {}"
                        ),
                        other
                    ))),
                }
            }

            /// Appends a raw code; the code need not be mapped.
            pub fn append(&mut self, code: $code) {
                self.data.push(code);
            }

            /// Appends by variant name.
            pub fn append_name(&mut self, name: &str) -> Result<()> {
                let code = self.type_.enum_value(name).ok_or_else(|| {
                    Error::UnsupportedType(format!(
                        "no variant {:?} in {}",
                        name, self.type_
                    ))
                })?;
                self.data.push(code as $code);
                Ok(())
            }

            /// Raw code at `index`, if in range.
            pub fn get(&self, index: usize) -> Option<$code> {
                self.data.get(index).copied()
            }

            /// Variant name at `index`; `None` when the code is unmapped.
            pub fn name_at(&self, index: usize) -> Option<&str> {
                self.type_.enum_name(self.data[index] as i16)
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
                let raw = reader.read_raw(rows * $width)?;
                self.data.reserve(rows);
                self.data.extend(raw.chunks_exact($width).map(|c| {
                    <$code>::from_le_bytes(c.try_into().unwrap())
                }));
                Ok(())
            }

            fn write_body(&self, buf: &mut BytesMut) -> Result<()> {
                for &code in &self.data {
                    buf.put_slice(&code.to_le_bytes());
                }
                Ok(())
            }

            fn append_value(&mut self, value: Value) -> Result<()> {
                match value {
                    Value::$value_variant(code) => {
                        self.data.push(code);
                        Ok(())
                    }
                    Value::String(name) => {
                        let name = String::from_utf8_lossy(&name).into_owned();
                        self.append_name(&name)
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

enum_column!(
    ColumnEnum8,
    i8,
    Enum8,
    Enum8,
    1,
    "Enum8 column; one signed byte per row."
);
enum_column!(
    ColumnEnum16,
    i16,
    Enum16,
    Enum16,
    2,
    "Enum16 column; two little-endian signed bytes per row."
);

#[cfg(test)]
mod tests {
    use super::*;

    fn color_type() -> Type {
        Type::parse("Enum8('red' = 1, 'green' = 2, 'blue' = 3)").unwrap()
    }

    #[test]
    fn test_append_by_name_and_code() {
        let mut col = ColumnEnum8::new(color_type()).unwrap();
        col.append_name("red").unwrap();
        col.append(2);
        assert_eq!(col.get(0), Some(1));
        assert_eq!(col.name_at(1), Some("green"));
        assert!(col.append_name("magenta").is_err());
    }

    #[test]
    fn test_unknown_code_passes_through() {
        let mut col = ColumnEnum8::new(color_type()).unwrap();
        col.append(99);
        assert_eq!(col.name_at(0), None);
        assert_eq!(col.value_at(0), Value::Enum8(99));
    }

    #[test]
    fn test_roundtrip() {
        let ty = Type::parse("Enum16('on' = 300, 'off' = -300)").unwrap();
        let mut col = ColumnEnum16::new(ty.clone()).unwrap();
        col.append_name("on").unwrap();
        col.append_name("off").unwrap();

        let mut buf = BytesMut::new();
        col.write_body(&mut buf).unwrap();
        assert_eq!(buf.len(), 4);

        let mut decoded = ColumnEnum16::new(ty).unwrap();
        decoded.read_body(&mut WireReader::new(&buf), 2).unwrap();
        assert_eq!(decoded.get(0), Some(300));
        assert_eq!(decoded.name_at(1), Some("off"));
    }

    #[test]
    fn test_string_value_resolves() {
        let mut col = ColumnEnum8::new(color_type()).unwrap();
        col.append_value(Value::from("blue")).unwrap();
        assert_eq!(col.value_at(0), Value::Enum8(3));
    }
}
