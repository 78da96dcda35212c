//! Date and time columns.
//!
//! Wire values are plain integers: `Date` is days since 1970-01-01 as
//! UInt16, `Date32` the same as Int32, `DateTime` is epoch seconds as
//! UInt32, and `DateTime64(p)` is ticks at `10^p` per second as Int64
//! (negative before the epoch). Timezones on DateTime types are metadata
//! from the type expression and never change the stored value. chrono
//! appears only in the typed accessors.

use bytes::{BufMut, BytesMut};
use chrono::{DateTime, NaiveDate, TimeZone, Utc};

use super::{value_mismatch, ColumnData};
use crate::types::Type;
use crate::value::Value;
use crate::wire::WireReader;
use crate::{Error, Result};

fn epoch() -> NaiveDate {
    NaiveDate::from_ymd_opt(1970, 1, 1).unwrap()
}

/// `Date` column: days since 1970-01-01, UInt16.
pub struct ColumnDate {
    type_: Type,
    data: Vec<u16>,
}

impl ColumnDate {
    /// Creates an empty Date column.
    pub fn new() -> Self {
        Self { type_: Type::Date, data: Vec::new() }
    }

    /// Appends a raw day count.
    pub fn append(&mut self, days: u16) {
        self.data.push(days);
    }

    /// Appends a calendar date; dates before the epoch or beyond the u16
    /// range are rejected.
    pub fn append_date(&mut self, date: NaiveDate) -> Result<()> {
        let days = date.signed_duration_since(epoch()).num_days();
        let days = u16::try_from(days).map_err(|_| {
            Error::UnsupportedType(format!("{} is out of Date range", date))
        })?;
        self.data.push(days);
        Ok(())
    }

    /// Raw day count at `index`, if in range.
    pub fn get(&self, index: usize) -> Option<u16> {
        self.data.get(index).copied()
    }

    /// Calendar date at `index`.
    ///
    /// # Panics
    ///
    /// Panics if out of range.
    pub fn at_date(&self, index: usize) -> NaiveDate {
        epoch() + chrono::Duration::days(self.data[index] as i64)
    }
}

impl Default for ColumnDate {
    fn default() -> Self {
        Self::new()
    }
}

impl ColumnData for ColumnDate {
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
        let raw = reader.read_raw(rows * 2)?;
        self.data.reserve(rows);
        self.data.extend(
            raw.chunks_exact(2)
                .map(|c| u16::from_le_bytes(c.try_into().unwrap())),
        );
        Ok(())
    }

    fn write_body(&self, buf: &mut BytesMut) -> Result<()> {
        for &v in &self.data {
            buf.put_u16_le(v);
        }
        Ok(())
    }

    fn append_value(&mut self, value: Value) -> Result<()> {
        match value {
            Value::Date(days) => {
                self.data.push(days);
                Ok(())
            }
            other => Err(value_mismatch(&other, &self.type_)),
        }
    }

    fn value_at(&self, index: usize) -> Value {
        Value::Date(self.data[index])
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}

/// `Date32` column: days since 1970-01-01, Int32, covers dates before 1970.
pub struct ColumnDate32 {
    type_: Type,
    data: Vec<i32>,
}

impl ColumnDate32 {
    /// Creates an empty Date32 column.
    pub fn new() -> Self {
        Self { type_: Type::Date32, data: Vec::new() }
    }

    /// Appends a raw day count.
    pub fn append(&mut self, days: i32) {
        self.data.push(days);
    }

    /// Appends a calendar date.
    pub fn append_date(&mut self, date: NaiveDate) {
        let days = date.signed_duration_since(epoch()).num_days() as i32;
        self.data.push(days);
    }

    /// Raw day count at `index`, if in range.
    pub fn get(&self, index: usize) -> Option<i32> {
        self.data.get(index).copied()
    }

    /// Calendar date at `index`.
    ///
    /// # Panics
    ///
    /// Panics if out of range.
    pub fn at_date(&self, index: usize) -> NaiveDate {
        epoch() + chrono::Duration::days(self.data[index] as i64)
    }
}

impl Default for ColumnDate32 {
    fn default() -> Self {
        Self::new()
    }
}

impl ColumnData for ColumnDate32 {
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
        let raw = reader.read_raw(rows * 4)?;
        self.data.reserve(rows);
        self.data.extend(
            raw.chunks_exact(4)
                .map(|c| i32::from_le_bytes(c.try_into().unwrap())),
        );
        Ok(())
    }

    fn write_body(&self, buf: &mut BytesMut) -> Result<()> {
        for &v in &self.data {
            buf.put_i32_le(v);
        }
        Ok(())
    }

    fn append_value(&mut self, value: Value) -> Result<()> {
        match value {
            Value::Date32(days) => {
                self.data.push(days);
                Ok(())
            }
            other => Err(value_mismatch(&other, &self.type_)),
        }
    }

    fn value_at(&self, index: usize) -> Value {
        Value::Date32(self.data[index])
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}

/// `DateTime` column: epoch seconds, UInt32.
pub struct ColumnDateTime {
    type_: Type,
    data: Vec<u32>,
}

impl ColumnDateTime {
    /// Creates an empty column for a `DateTime` type (optionally carrying a
    /// timezone).
    pub fn new(type_: Type) -> Result<Self> {
        match &type_ {
            Type::DateTime { .. } => Ok(Self { type_, data: Vec::new() }),
            other => Err(Error::InvalidType(format!(
                "ColumnDateTime requires DateTime, got {}",
                other
            ))),
        }
    }

    /// Timezone named in the type expression, if any.
    pub fn timezone(&self) -> Option<&str> {
        match &self.type_ {
            Type::DateTime { timezone } => timezone.as_deref(),
            _ => unreachable!(),
        }
    }

    /// Appends raw epoch seconds.
    pub fn append(&mut self, seconds: u32) {
        self.data.push(seconds);
    }

    /// Appends a chrono instant, truncating sub-second precision.
    pub fn append_datetime(&mut self, dt: DateTime<Utc>) -> Result<()> {
        let seconds = u32::try_from(dt.timestamp()).map_err(|_| {
            Error::UnsupportedType(format!("{} is out of DateTime range", dt))
        })?;
        self.data.push(seconds);
        Ok(())
    }

    /// Raw epoch seconds at `index`, if in range.
    pub fn get(&self, index: usize) -> Option<u32> {
        self.data.get(index).copied()
    }

    /// UTC instant at `index`.
    ///
    /// # Panics
    ///
    /// Panics if out of range.
    pub fn at_datetime(&self, index: usize) -> DateTime<Utc> {
        Utc.timestamp_opt(self.data[index] as i64, 0).unwrap()
    }
}

impl ColumnData for ColumnDateTime {
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
        let raw = reader.read_raw(rows * 4)?;
        self.data.reserve(rows);
        self.data.extend(
            raw.chunks_exact(4)
                .map(|c| u32::from_le_bytes(c.try_into().unwrap())),
        );
        Ok(())
    }

    fn write_body(&self, buf: &mut BytesMut) -> Result<()> {
        for &v in &self.data {
            buf.put_u32_le(v);
        }
        Ok(())
    }

    fn append_value(&mut self, value: Value) -> Result<()> {
        match value {
            Value::DateTime(seconds) => {
                self.data.push(seconds);
                Ok(())
            }
            other => Err(value_mismatch(&other, &self.type_)),
        }
    }

    fn value_at(&self, index: usize) -> Value {
        Value::DateTime(self.data[index])
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}

/// `DateTime64(p)` column: ticks at `10^p` per second, Int64.
pub struct ColumnDateTime64 {
    type_: Type,
    scale: i64,
    data: Vec<i64>,
}

impl ColumnDateTime64 {
    /// Creates an empty column for a `DateTime64` type.
    pub fn new(type_: Type) -> Result<Self> {
        let scale = type_.tick_scale().ok_or_else(|| {
            Error::InvalidType(format!(
                "ColumnDateTime64 requires DateTime64, got {}",
                type_
            ))
        })?;
        Ok(Self { type_, scale, data: Vec::new() })
    }

    /// Ticks per second (`10^precision`).
    pub fn tick_scale(&self) -> i64 {
        self.scale
    }

    /// Appends raw ticks.
    pub fn append(&mut self, ticks: i64) {
        self.data.push(ticks);
    }

    /// Appends a chrono instant, truncating below the column's precision.
    pub fn append_datetime(&mut self, dt: DateTime<Utc>) {
        let sub = 1_000_000_000 / self.scale;
        let ticks = dt.timestamp() * self.scale
            + dt.timestamp_subsec_nanos() as i64 / sub;
        self.data.push(ticks);
    }

    /// Raw ticks at `index`, if in range.
    pub fn get(&self, index: usize) -> Option<i64> {
        self.data.get(index).copied()
    }

    /// UTC instant at `index`.
    ///
    /// # Panics
    ///
    /// Panics if out of range.
    pub fn at_datetime(&self, index: usize) -> DateTime<Utc> {
        let ticks = self.data[index];
        let secs = ticks.div_euclid(self.scale);
        let sub = ticks.rem_euclid(self.scale);
        let nanos = sub * (1_000_000_000 / self.scale);
        Utc.timestamp_opt(secs, nanos as u32).unwrap()
    }
}

impl ColumnData for ColumnDateTime64 {
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
        let raw = reader.read_raw(rows * 8)?;
        self.data.reserve(rows);
        self.data.extend(
            raw.chunks_exact(8)
                .map(|c| i64::from_le_bytes(c.try_into().unwrap())),
        );
        Ok(())
    }

    fn write_body(&self, buf: &mut BytesMut) -> Result<()> {
        for &v in &self.data {
            buf.put_i64_le(v);
        }
        Ok(())
    }

    fn append_value(&mut self, value: Value) -> Result<()> {
        match value {
            Value::DateTime64(ticks) => {
                self.data.push(ticks);
                Ok(())
            }
            other => Err(value_mismatch(&other, &self.type_)),
        }
    }

    fn value_at(&self, index: usize) -> Value {
        Value::DateTime64(self.data[index])
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
    fn test_date_conversions() {
        let mut col = ColumnDate::new();
        col.append_date(NaiveDate::from_ymd_opt(1970, 1, 2).unwrap()).unwrap();
        assert_eq!(col.get(0), Some(1));
        assert_eq!(col.at_date(0), NaiveDate::from_ymd_opt(1970, 1, 2).unwrap());

        // Pre-epoch dates do not fit Date.
        assert!(col
            .append_date(NaiveDate::from_ymd_opt(1969, 12, 31).unwrap())
            .is_err());
    }

    #[test]
    fn test_date32_negative_days() {
        let mut col = ColumnDate32::new();
        col.append_date(NaiveDate::from_ymd_opt(1969, 12, 31).unwrap());
        assert_eq!(col.get(0), Some(-1));
    }

    #[test]
    fn test_datetime64_known_ticks() {
        // 2024-01-15 10:30:45.123456 UTC at precision 6.
        let ty = Type::datetime64(6, None);
        let mut col = ColumnDateTime64::new(ty).unwrap();
        let dt = Utc.with_ymd_and_hms(2024, 1, 15, 10, 30, 45).unwrap()
            + chrono::Duration::microseconds(123_456);
        col.append_datetime(dt);
        assert_eq!(col.get(0), Some(1_705_314_645_123_456));
        assert_eq!(col.at_datetime(0), dt);
    }

    #[test]
    fn test_datetime64_negative_ticks() {
        let ty = Type::datetime64(3, None);
        let mut col = ColumnDateTime64::new(ty).unwrap();
        col.append(-1_500); // 1.5 seconds before the epoch
        let dt = col.at_datetime(0);
        assert_eq!(dt.timestamp(), -2);
        assert_eq!(dt.timestamp_subsec_millis(), 500);
    }

    #[test]
    fn test_datetime_roundtrip() {
        let ty = Type::DateTime { timezone: Some("UTC".into()) };
        let mut col = ColumnDateTime::new(ty).unwrap();
        col.append(1_700_000_000);

        let mut buf = BytesMut::new();
        col.write_body(&mut buf).unwrap();
        assert_eq!(buf.len(), 4);

        let ty = Type::DateTime { timezone: Some("UTC".into()) };
        let mut decoded = ColumnDateTime::new(ty).unwrap();
        decoded.read_body(&mut WireReader::new(&buf), 1).unwrap();
        assert_eq!(decoded.get(0), Some(1_700_000_000));
        assert_eq!(decoded.timezone(), Some("UTC"));
    }
}
