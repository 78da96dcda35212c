//! Decimal columns.
//!
//! A decimal value is a signed integer mantissa scaled by `10^scale`; the
//! container width follows the precision (4 bytes up to 9 digits, 8 up to
//! 18, 16 up to 38, 32 up to 76) and the mantissa is written as that
//! little-endian signed integer.

use bytes::{BufMut, BytesMut};

use super::{value_mismatch, ColumnData};
use crate::types::{decimal_container_width, Type};
use crate::value::{Int256, Value};
use crate::wire::WireReader;
use crate::{Error, Result};

enum Repr {
    W4(Vec<i32>),
    W8(Vec<i64>),
    W16(Vec<i128>),
    W32(Vec<Int256>),
}

/// Decimal column; storage width chosen by the type's precision.
pub struct ColumnDecimal {
    type_: Type,
    precision: u32,
    scale: u32,
    repr: Repr,
}

impl ColumnDecimal {
    /// Creates an empty column for a `Decimal(P, S)` type.
    pub fn new(type_: Type) -> Result<Self> {
        let (precision, scale) = match &type_ {
            Type::Decimal { precision, scale } => (*precision, *scale),
            other => {
                return Err(Error::InvalidType(format!(
                    "ColumnDecimal requires Decimal, got {}",
                    other
                )))
            }
        };
        let repr = match decimal_container_width(precision) {
            4 => Repr::W4(Vec::new()),
            8 => Repr::W8(Vec::new()),
            16 => Repr::W16(Vec::new()),
            _ => Repr::W32(Vec::new()),
        };
        Ok(Self { type_, precision, scale, repr })
    }

    /// Total significant digits.
    pub fn precision(&self) -> u32 {
        self.precision
    }

    /// Digits after the decimal point.
    pub fn scale(&self) -> u32 {
        self.scale
    }

    /// Container width in bytes.
    pub fn container_width(&self) -> usize {
        decimal_container_width(self.precision)
    }

    /// Appends a raw mantissa (the value times `10^scale`).
    ///
    /// Mantissas that do not fit the container are rejected.
    pub fn append_mantissa(&mut self, mantissa: i128) -> Result<()> {
        match &mut self.repr {
            Repr::W4(data) => {
                let v = i32::try_from(mantissa)
                    .map_err(|_| mantissa_overflow(mantissa, 4))?;
                data.push(v);
            }
            Repr::W8(data) => {
                let v = i64::try_from(mantissa)
                    .map_err(|_| mantissa_overflow(mantissa, 8))?;
                data.push(v);
            }
            Repr::W16(data) => data.push(mantissa),
            Repr::W32(data) => data.push(Int256::from_i128(mantissa)),
        }
        Ok(())
    }

    /// Parses and appends a decimal literal such as `"-12.345"`.
    ///
    /// The fractional part may not exceed the column's scale.
    pub fn append_from_string(&mut self, s: &str) -> Result<()> {
        let mantissa = parse_decimal(s, self.scale)?;
        self.append_mantissa(mantissa)
    }

    /// Raw mantissa at `index` widened to `i128`, if in range. For
    /// Decimal256 this truncates to the low 128 bits.
    pub fn get_mantissa(&self, index: usize) -> Option<i128> {
        match &self.repr {
            Repr::W4(data) => data.get(index).map(|&v| v as i128),
            Repr::W8(data) => data.get(index).map(|&v| v as i128),
            Repr::W16(data) => data.get(index).copied(),
            Repr::W32(data) => data.get(index).map(|v| v.low_i128()),
        }
    }

    /// The value at `index` rendered as `f64` (`mantissa / 10^scale`).
    /// Lossy for large mantissas; meant for display and tests.
    pub fn at_f64(&self, index: usize) -> f64 {
        self.get_mantissa(index).expect("row index in range") as f64
            / 10f64.powi(self.scale as i32)
    }
}

fn mantissa_overflow(mantissa: i128, width: usize) -> Error {
    Error::UnsupportedType(format!(
        "decimal mantissa {} does not fit a {}-byte container",
        mantissa, width
    ))
}

fn mantissa_overflow_wide(width: usize) -> Error {
    Error::UnsupportedType(format!(
        "256-bit decimal mantissa does not fit a {}-byte container",
        width
    ))
}

/// Parses a decimal literal into a mantissa at the given scale.
pub fn parse_decimal(s: &str, scale: u32) -> Result<i128> {
    let s = s.trim();
    let bad = || Error::UnsupportedType(format!("invalid decimal: {:?}", s));

    let (negative, digits) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s.strip_prefix('+').unwrap_or(s)),
    };
    let (int_part, frac_part) = match digits.split_once('.') {
        Some((i, f)) => (i, f),
        None => (digits, ""),
    };
    if int_part.is_empty() && frac_part.is_empty() {
        return Err(bad());
    }
    if frac_part.len() > scale as usize {
        return Err(Error::UnsupportedType(format!(
            "decimal {:?} has more than {} fractional digits",
            s, scale
        )));
    }

    let mut mantissa: i128 = 0;
    for ch in int_part.chars().chain(frac_part.chars()) {
        let digit = ch.to_digit(10).ok_or_else(bad)? as i128;
        mantissa = mantissa
            .checked_mul(10)
            .and_then(|m| m.checked_add(digit))
            .ok_or_else(bad)?;
    }
    for _ in frac_part.len()..scale as usize {
        mantissa = mantissa.checked_mul(10).ok_or_else(bad)?;
    }
    Ok(if negative { -mantissa } else { mantissa })
}

impl ColumnData for ColumnDecimal {
    fn data_type(&self) -> &Type {
        &self.type_
    }

    fn len(&self) -> usize {
        match &self.repr {
            Repr::W4(data) => data.len(),
            Repr::W8(data) => data.len(),
            Repr::W16(data) => data.len(),
            Repr::W32(data) => data.len(),
        }
    }

    fn clear(&mut self) {
        match &mut self.repr {
            Repr::W4(data) => data.clear(),
            Repr::W8(data) => data.clear(),
            Repr::W16(data) => data.clear(),
            Repr::W32(data) => data.clear(),
        }
    }

    fn reserve(&mut self, additional: usize) {
        match &mut self.repr {
            Repr::W4(data) => data.reserve(additional),
            Repr::W8(data) => data.reserve(additional),
            Repr::W16(data) => data.reserve(additional),
            Repr::W32(data) => data.reserve(additional),
        }
    }

    fn read_body(
        &mut self,
        reader: &mut WireReader<'_>,
        rows: usize,
    ) -> Result<()> {
        match &mut self.repr {
            Repr::W4(data) => {
                let raw = reader.read_raw(rows * 4)?;
                data.extend(
                    raw.chunks_exact(4)
                        .map(|c| i32::from_le_bytes(c.try_into().unwrap())),
                );
            }
            Repr::W8(data) => {
                let raw = reader.read_raw(rows * 8)?;
                data.extend(
                    raw.chunks_exact(8)
                        .map(|c| i64::from_le_bytes(c.try_into().unwrap())),
                );
            }
            Repr::W16(data) => {
                let raw = reader.read_raw(rows * 16)?;
                data.extend(
                    raw.chunks_exact(16)
                        .map(|c| i128::from_le_bytes(c.try_into().unwrap())),
                );
            }
            Repr::W32(data) => {
                let raw = reader.read_raw(rows * 32)?;
                data.extend(
                    raw.chunks_exact(32)
                        .map(|c| Int256::from_le_bytes(c.try_into().unwrap())),
                );
            }
        }
        Ok(())
    }

    fn write_body(&self, buf: &mut BytesMut) -> Result<()> {
        match &self.repr {
            Repr::W4(data) => {
                for &v in data {
                    buf.put_i32_le(v);
                }
            }
            Repr::W8(data) => {
                for &v in data {
                    buf.put_i64_le(v);
                }
            }
            Repr::W16(data) => {
                for &v in data {
                    buf.put_i128_le(v);
                }
            }
            Repr::W32(data) => {
                for v in data {
                    buf.put_slice(&v.to_le_bytes());
                }
            }
        }
        Ok(())
    }

    fn append_value(&mut self, value: Value) -> Result<()> {
        match value {
            Value::Decimal32(v) => self.append_mantissa(v as i128),
            Value::Decimal64(v) => self.append_mantissa(v as i128),
            Value::Decimal128(v) => self.append_mantissa(v),
            Value::Decimal256(v) => match &mut self.repr {
                Repr::W32(data) => {
                    data.push(v);
                    Ok(())
                }
                // Narrowing is only legal when the high limbs are a plain
                // sign extension of the low 128 bits.
                _ if !v.fits_i128() => {
                    Err(mantissa_overflow_wide(self.container_width()))
                }
                _ => self.append_mantissa(v.low_i128()),
            },
            other => Err(value_mismatch(&other, &self.type_)),
        }
    }

    fn value_at(&self, index: usize) -> Value {
        match &self.repr {
            Repr::W4(data) => Value::Decimal32(data[index]),
            Repr::W8(data) => Value::Decimal64(data[index]),
            Repr::W16(data) => Value::Decimal128(data[index]),
            Repr::W32(data) => Value::Decimal256(data[index]),
        }
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}
