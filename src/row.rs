//! Row-oriented access to blocks.
//!
//! Blocks are columnar; [`Row`] is a cheap view (block reference plus row
//! index) that resolves columns by name or ordinal on demand -- no
//! per-row allocation. For repeated extraction of the same fields across
//! many rows, [`RowMapper`] resolves field ordinals once per block schema
//! and reuses them row by row.

use std::collections::HashMap;

use crate::block::Block;
use crate::value::Value;
use crate::{Error, Result};

/// A view of one row of a block.
#[derive(Clone, Copy)]
pub struct Row<'b> {
    block: &'b Block,
    index: usize,
}

impl<'b> Row<'b> {
    /// The row's index within its block.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Number of columns.
    pub fn width(&self) -> usize {
        self.block.column_count()
    }

    /// Value by column ordinal.
    pub fn value(&self, ordinal: usize) -> Option<Value> {
        self.block.column(ordinal).map(|c| c.value_at(self.index))
    }

    /// Value by column name, matched case-insensitively.
    pub fn get(&self, name: &str) -> Option<Value> {
        self.block.column_ordinal(name).and_then(|i| self.value(i))
    }

    /// String value by name, decoded lossily; `None` when the column is
    /// missing, NULL, or not a string.
    pub fn get_str(&self, name: &str) -> Option<String> {
        match self.get(name)? {
            Value::String(bytes) | Value::FixedString(bytes) => {
                Some(String::from_utf8_lossy(&bytes).into_owned())
            }
            _ => None,
        }
    }
}

impl Block {
    /// Iterates the block's rows as [`Row`] views.
    pub fn rows(&self) -> impl ExactSizeIterator<Item = Row<'_>> {
        (0..self.row_count()).map(move |index| Row { block: self, index })
    }

    /// Row view at `index`, if in range.
    pub fn row(&self, index: usize) -> Option<Row<'_>> {
        (index < self.row_count()).then_some(Row { block: self, index })
    }
}

/// Field-to-ordinal binding resolved once per (field set, block schema)
/// pair, then reused for every row.
pub struct RowMapper {
    fields: Vec<String>,
}

impl RowMapper {
    /// A mapper for the given field names.
    pub fn new(fields: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self { fields: fields.into_iter().map(Into::into).collect() }
    }

    /// Resolves every field against the block's schema. Missing fields are
    /// a schema mismatch.
    pub fn bind(&self, block: &Block) -> Result<BoundMapper> {
        let index: HashMap<String, usize> = block
            .iter()
            .enumerate()
            .map(|(i, (name, _))| (name.to_ascii_lowercase(), i))
            .collect();
        let ordinals = self
            .fields
            .iter()
            .map(|field| {
                index.get(&field.to_ascii_lowercase()).copied().ok_or_else(
                    || {
                        Error::SchemaMismatch(format!(
                            "no column named {:?} in block",
                            field
                        ))
                    },
                )
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(BoundMapper { ordinals })
    }
}

/// The resolved ordinals for one block schema.
#[derive(Debug)]
pub struct BoundMapper {
    ordinals: Vec<usize>,
}

impl BoundMapper {
    /// The resolved column ordinals, in field order.
    pub fn ordinals(&self) -> &[usize] {
        &self.ordinals
    }

    /// Extracts the bound fields of one row, in field order.
    pub fn values(&self, row: &Row<'_>) -> Vec<Value> {
        self.ordinals
            .iter()
            .map(|&ordinal| row.value(ordinal).expect("ordinal was resolved"))
            .collect()
    }

    /// Maps every row of a block through a converter.
    pub fn map_rows<'b, T, F>(
        &'b self,
        block: &'b Block,
        mut convert: F,
    ) -> impl Iterator<Item = Result<T>> + 'b
    where
        F: FnMut(Vec<Value>) -> Result<T> + 'b,
    {
        block.rows().map(move |row| convert(self.values(&row)))
    }
}
