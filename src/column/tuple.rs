//! Tuple columns: one child column per field, serialized back-to-back.

use bytes::BytesMut;

use super::{new_column, value_mismatch, ColumnBuffer, ColumnData};
use crate::types::Type;
use crate::value::Value;
use crate::wire::WireReader;
use crate::{Error, Result};

/// Column for `Tuple(T1, ..., Tn)`.
pub struct ColumnTuple {
    type_: Type,
    fields: Vec<ColumnBuffer>,
    rows: usize,
}

impl ColumnTuple {
    /// Creates an empty column for a `Tuple(...)` type.
    pub fn new(type_: Type) -> Result<Self> {
        let fields = match &type_ {
            Type::Tuple(items) => items
                .iter()
                .map(new_column)
                .collect::<Result<Vec<_>>>()?,
            other => {
                return Err(Error::InvalidType(format!(
                    "ColumnTuple requires Tuple, got {}",
                    other
                )))
            }
        };
        Ok(Self { type_, fields, rows: 0 })
    }

    /// Number of tuple fields.
    pub fn arity(&self) -> usize {
        self.fields.len()
    }

    /// The child column for field `index`.
    pub fn field(&self, index: usize) -> &dyn ColumnData {
        self.fields[index].as_ref()
    }

    /// Appends one tuple row; the element count must match the arity.
    pub fn append(&mut self, elements: Vec<Value>) -> Result<()> {
        if elements.len() != self.fields.len() {
            return Err(Error::UnsupportedType(format!(
                "tuple arity mismatch: expected {}, got {}",
                self.fields.len(),
                elements.len()
            )));
        }
        for (i, (field, element)) in
            self.fields.iter_mut().zip(elements).enumerate()
        {
            field.append_value(element).map_err(|e| {
                Error::UnsupportedType(format!("tuple field {}: {}", i, e))
            })?;
        }
        self.rows += 1;
        Ok(())
    }
}

impl ColumnData for ColumnTuple {
    fn data_type(&self) -> &Type {
        &self.type_
    }

    fn len(&self) -> usize {
        self.rows
    }

    fn clear(&mut self) {
        for field in &mut self.fields {
            field.clear();
        }
        self.rows = 0;
    }

    fn reserve(&mut self, additional: usize) {
        for field in &mut self.fields {
            field.reserve(additional);
        }
    }

    fn read_body(
        &mut self,
        reader: &mut WireReader<'_>,
        rows: usize,
    ) -> Result<()> {
        for field in &mut self.fields {
            field.read_body(reader, rows)?;
        }
        self.rows += rows;
        Ok(())
    }

    fn write_body(&self, buf: &mut BytesMut) -> Result<()> {
        for field in &self.fields {
            field.write_body(buf)?;
        }
        Ok(())
    }

    fn append_value(&mut self, value: Value) -> Result<()> {
        match value {
            Value::Tuple(elements) => self.append(elements),
            other => Err(value_mismatch(&other, &self.type_)),
        }
    }

    fn value_at(&self, index: usize) -> Value {
        Value::Tuple(
            self.fields.iter().map(|f| f.value_at(index)).collect(),
        )
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}
