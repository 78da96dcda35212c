//! Wire format primitives for the native protocol.
//!
//! Everything on the wire is built from four shapes: unsigned LEB128
//! varints, little-endian fixed-width values, varint-length-prefixed byte
//! strings, and raw byte runs. [`WireReader`] decodes them from an in-memory
//! buffer and reports [`Error::UnexpectedEof`] when the buffer is short --
//! the connection layer uses that as its signal to read more from the
//! socket and retry. Writers are free functions over [`BytesMut`].
//!
//! Strings are byte strings. The protocol does not require UTF-8, and this
//! crate tolerates invalid UTF-8 on reads: raw bytes round-trip exactly, and
//! the `*_lossy` accessors substitute U+FFFD only at the API boundary.

use bytes::{BufMut, BytesMut};

use crate::{Error, Result};

/// Longest legal LEB128 encoding of a u64.
pub const MAX_VARINT_LEN: usize = 10;

/// Cap on a single length-prefixed string.
pub const MAX_STRING_LEN: usize = 0x00FF_FFFF;

/// Cap on any single raw read; larger requests are corruption, and letting
/// them through would make the connection pump buffer without bound.
pub const MAX_CHUNK_LEN: usize = 0x4000_0000;

/// Cursor-style decoder over a byte slice.
///
/// All reads advance an internal position; [`WireReader::consumed`] tells
/// the caller how many bytes a successful parse used so it can advance the
/// underlying buffer.
pub struct WireReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> WireReader<'a> {
    /// Creates a reader over `buf` starting at offset zero.
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Number of bytes consumed so far.
    pub fn consumed(&self) -> usize {
        self.pos
    }

    /// Number of bytes left to read.
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// True when every byte has been consumed.
    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// The unconsumed tail of the buffer, without advancing.
    pub fn peek_remaining(&self) -> &'a [u8] {
        &self.buf[self.pos..]
    }

    /// Reads `len` raw bytes.
    pub fn read_raw(&mut self, len: usize) -> Result<&'a [u8]> {
        if len > MAX_CHUNK_LEN {
            return Err(Error::ProtocolViolation(format!(
                "implausible read of {} bytes",
                len
            )));
        }
        if self.remaining() < len {
            return Err(Error::UnexpectedEof);
        }
        let out = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(out)
    }

    /// Reads a single byte.
    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read_raw(1)?[0])
    }

    /// Reads one byte as a boolean (0 = false, anything else = true).
    pub fn read_bool(&mut self) -> Result<bool> {
        Ok(self.read_u8()? != 0)
    }

    /// Reads an unsigned LEB128 varint.
    ///
    /// Encodings longer than [`MAX_VARINT_LEN`] bytes are rejected with
    /// [`Error::VarIntOverflow`].
    pub fn read_varint(&mut self) -> Result<u64> {
        let mut result: u64 = 0;
        let mut shift = 0u32;
        for _ in 0..MAX_VARINT_LEN {
            let byte = self.read_u8()?;
            result |= ((byte & 0x7F) as u64) << shift;
            if byte & 0x80 == 0 {
                return Ok(result);
            }
            shift += 7;
        }
        Err(Error::VarIntOverflow)
    }

    /// Reads a varint-length-prefixed byte string.
    pub fn read_string_bytes(&mut self) -> Result<&'a [u8]> {
        let len = self.read_varint()? as usize;
        if len > MAX_STRING_LEN {
            return Err(Error::ProtocolViolation(format!(
                "string length {} exceeds the {} byte cap",
                len, MAX_STRING_LEN
            )));
        }
        self.read_raw(len)
    }

    /// Reads a byte string and converts it to `String`, replacing invalid
    /// UTF-8 sequences with U+FFFD.
    pub fn read_string_lossy(&mut self) -> Result<String> {
        Ok(String::from_utf8_lossy(self.read_string_bytes()?).into_owned())
    }
}

macro_rules! impl_read_le {
    ($name:ident, $ty:ty) => {
        impl<'a> WireReader<'a> {
            /// Reads a little-endian fixed-width value.
            pub fn $name(&mut self) -> Result<$ty> {
                let raw = self.read_raw(std::mem::size_of::<$ty>())?;
                Ok(<$ty>::from_le_bytes(raw.try_into().unwrap()))
            }
        }
    };
}

impl_read_le!(read_u16, u16);
impl_read_le!(read_u32, u32);
impl_read_le!(read_u64, u64);
impl_read_le!(read_u128, u128);
impl_read_le!(read_i8, i8);
impl_read_le!(read_i16, i16);
impl_read_le!(read_i32, i32);
impl_read_le!(read_i64, i64);
impl_read_le!(read_i128, i128);
impl_read_le!(read_f32, f32);
impl_read_le!(read_f64, f64);

/// Writes an unsigned LEB128 varint.
pub fn put_varint(buf: &mut BytesMut, mut value: u64) {
    loop {
        let mut byte = (value & 0x7F) as u8;
        value >>= 7;
        if value != 0 {
            byte |= 0x80;
        }
        buf.put_u8(byte);
        if value == 0 {
            break;
        }
    }
}

/// Writes a varint-length-prefixed byte string.
pub fn put_string(buf: &mut BytesMut, s: impl AsRef<[u8]>) {
    let s = s.as_ref();
    put_varint(buf, s.len() as u64);
    buf.put_slice(s);
}

/// Writes one byte encoding a boolean.
pub fn put_bool(buf: &mut BytesMut, v: bool) {
    buf.put_u8(v as u8);
}

/// Number of bytes [`put_varint`] would emit for `value`.
pub fn varint_len(value: u64) -> usize {
    // 64 bits pack into ceil(bits/7) groups, minimum one byte.
    let bits = 64 - value.leading_zeros() as usize;
    bits.div_ceil(7).max(1)
}
