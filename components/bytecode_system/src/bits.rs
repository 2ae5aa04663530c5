//! MSB-first bit streams used by the instruction encoding.

use crate::error::DecodeError;

/// Reads bits most-significant first from a byte slice.
#[derive(Debug)]
pub struct BitReader<'a> {
    data: &'a [u8],
    offset: usize,
    current: u64,
    current_bits: u32,
}

impl<'a> BitReader<'a> {
    /// Reader positioned at the start of `data`.
    pub fn new(data: &'a [u8]) -> Self {
        BitReader {
            data,
            offset: 0,
            current: 0,
            current_bits: 0,
        }
    }

    /// Reads `count` raw bytes. Only valid while no bits are buffered.
    pub fn read_bytes(&mut self, count: usize) -> Result<&'a [u8], DecodeError> {
        debug_assert_eq!(self.current_bits, 0);
        let end = self
            .offset
            .checked_add(count)
            .filter(|end| *end <= self.data.len())
            .ok_or(DecodeError::Truncated("instruction stream"))?;
        let bytes = &self.data[self.offset..end];
        self.offset = end;
        Ok(bytes)
    }

    /// Reads the next `count` bits (at most 32) as an unsigned integer.
    pub fn next_bits(&mut self, count: u32) -> Result<u32, DecodeError> {
        debug_assert!(count <= 32);
        while self.current_bits < count {
            let byte = *self.data.get(self.offset).ok_or_else(|| {
                DecodeError::MalformedInstruction("bit stream ended inside an instruction".into())
            })?;
            self.current = (self.current << 8) | u64::from(byte);
            self.current_bits += 8;
            self.offset += 1;
        }
        let remaining = self.current_bits - count;
        let result = (self.current >> remaining) as u32;
        self.current &= (1u64 << remaining) - 1;
        self.current_bits = remaining;
        Ok(result)
    }

    /// Reads a one-bit flag.
    pub fn next_flag(&mut self) -> Result<bool, DecodeError> {
        Ok(self.next_bits(1)? == 1)
    }

    /// Whole bytes not yet touched by the reader.
    pub fn remaining_bytes(&self) -> usize {
        self.data.len() - self.offset
    }
}

/// Writes bits most-significant first, padding the final byte with zeros.
#[derive(Debug, Default)]
pub struct BitWriter {
    bytes: Vec<u8>,
    current: u64,
    current_bits: u32,
}

impl BitWriter {
    /// Empty writer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends raw bytes. Only valid while no bits are buffered.
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        debug_assert_eq!(self.current_bits, 0);
        self.bytes.extend_from_slice(bytes);
    }

    /// Appends the low `count` bits of `value`.
    pub fn write_bits(&mut self, value: u32, count: u32) {
        debug_assert!(count <= 32);
        let mask = if count == 32 { u32::MAX } else { (1u32 << count) - 1 };
        self.current = (self.current << count) | u64::from(value & mask);
        self.current_bits += count;
        while self.current_bits >= 8 {
            self.current_bits -= 8;
            self.bytes.push((self.current >> self.current_bits) as u8);
        }
        self.current &= (1u64 << self.current_bits) - 1;
    }

    /// Appends a one-bit flag.
    pub fn write_flag(&mut self, flag: bool) {
        self.write_bits(u32::from(flag), 1);
    }

    /// Flushes the partial byte and returns the stream.
    pub fn finish(mut self) -> Vec<u8> {
        if self.current_bits > 0 {
            let pad = 8 - self.current_bits;
            self.bytes.push((self.current << pad) as u8);
        }
        self.bytes
    }
}
