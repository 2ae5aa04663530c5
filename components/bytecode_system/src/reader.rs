//! Record-level access to the section stream.
//!
//! Every record starts with a flags byte that says how wide its tag and
//! length fields are:
//!
//! ```text
//! bit 7      extension: three more flag bytes follow
//! bit 4      tag is two bytes wide (otherwise one)
//! bits 2..3  length field width: 0 (inline), 1, 2 or 4 bytes
//! bits 0..1  inline length as a power of two, when the width is 0
//! ```

use crate::error::DecodeError;

pub(crate) const FLAG_EXT: u8 = 0x80;
pub(crate) const FLAG_WIDE_TAG: u8 = 0x10;
pub(crate) const FLAG_LEN_MASK: u8 = 0x0c;
pub(crate) const FLAG_LEN_SHIFT: u8 = 2;
pub(crate) const FLAG_VALUE_MASK: u8 = 0x03;

/// Header of one record: its key and the length of its value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Target {
    /// Record key (section id at the top level)
    pub tag: u16,
    /// Length of the value in bytes
    pub len: usize,
}

/// Cursor over a snapshot or a section of it.
#[derive(Debug, Clone)]
pub struct SectionReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> SectionReader<'a> {
    /// Cursor at the start of `data`.
    pub fn new(data: &'a [u8]) -> Self {
        SectionReader { data, pos: 0 }
    }

    /// Current offset.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Whether the cursor reached the end.
    pub fn is_at_end(&self) -> bool {
        self.pos >= self.data.len()
    }

    /// Bytes left.
    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    /// Reads the next record header.
    pub fn read_target(&mut self, context: &'static str) -> Result<Target, DecodeError> {
        let mut flags = [0u8; 4];
        flags[0] = self.read_u8(context)?;
        if flags[0] & FLAG_EXT != 0 {
            flags[1..].copy_from_slice(self.take(3, context)?);
        }
        let flags0 = flags[0];
        let tag = if flags0 & FLAG_WIDE_TAG != 0 {
            self.read_uint(2, context)? as u16
        } else {
            u16::from(self.read_u8(context)?)
        };
        let len = match (flags0 & FLAG_LEN_MASK) >> FLAG_LEN_SHIFT {
            0 => 1usize << (flags0 & FLAG_VALUE_MASK),
            3 => self.read_uint(4, context)? as usize,
            width => self.read_uint(width as usize, context)? as usize,
        };
        Ok(Target { tag, len })
    }

    /// Borrows the next `len` bytes.
    pub fn take(&mut self, len: usize, context: &'static str) -> Result<&'a [u8], DecodeError> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.data.len())
            .ok_or(DecodeError::Truncated(context))?;
        let bytes = &self.data[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    /// Skips `len` bytes.
    pub fn skip(&mut self, len: usize, context: &'static str) -> Result<(), DecodeError> {
        self.take(len, context).map(|_| ())
    }

    /// Reads one byte.
    pub fn read_u8(&mut self, context: &'static str) -> Result<u8, DecodeError> {
        Ok(self.take(1, context)?[0])
    }

    /// Reads a little-endian unsigned integer of up to four bytes.
    pub fn read_uint(&mut self, len: usize, context: &'static str) -> Result<u32, DecodeError> {
        if len > 4 {
            return Err(DecodeError::Malformed(format!(
                "{context}: integer field of {len} bytes"
            )));
        }
        Ok(le_uint(self.take(len, context)?))
    }

    /// Reads a little-endian signed integer of up to four bytes, sign
    /// extending shorter fields.
    pub fn read_int(&mut self, len: usize, context: &'static str) -> Result<i32, DecodeError> {
        let raw = self.read_uint(len, context)?;
        if len == 0 || len >= 4 {
            return Ok(raw as i32);
        }
        let shift = 32 - 8 * len as u32;
        Ok(((raw << shift) as i32) >> shift)
    }

    /// Reads a little-endian `u32`.
    pub fn read_u32(&mut self, context: &'static str) -> Result<u32, DecodeError> {
        self.read_uint(4, context)
    }

    /// Reads a little-endian `i32`.
    pub fn read_i32(&mut self, context: &'static str) -> Result<i32, DecodeError> {
        Ok(self.read_u32(context)? as i32)
    }

    /// Reads a little-endian `f64`.
    pub fn read_f64(&mut self, context: &'static str) -> Result<f64, DecodeError> {
        let bytes = self.take(8, context)?;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(bytes);
        Ok(f64::from_le_bytes(raw))
    }
}

pub(crate) fn le_uint(bytes: &[u8]) -> u32 {
    bytes
        .iter()
        .rev()
        .fold(0u32, |acc, byte| (acc << 8) | u32::from(*byte))
}
