
//! Specialized binary input and output.
//! Uses the error handling for this crate.
//!
//! Compressed slices are bit streams, written and read most significant bit first.
//! Signed fields use two's complement and are sign extended when read.
//! The container around the slices is made of big endian integers.

pub mod fifo;

pub use ::std::io::{Read, Write};
use bit_field::BitField;
use lebe::prelude::*;
use crate::error::{Error, Result, UnitResult};


/// Appends bit fields of up to 32 bits to a growing byte buffer.
/// A byte is zeroed when its first bit is written,
/// so the buffer never contains stale bits.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BitWriter {
    bytes: Vec<u8>,
    bit_count: usize,
}

impl BitWriter {

    /// Create an empty writer.
    pub fn new() -> Self { Self::default() }

    /// Create an empty writer that will not reallocate below the specified byte count.
    pub fn with_byte_capacity(capacity: usize) -> Self {
        Self { bytes: Vec::with_capacity(capacity), bit_count: 0 }
    }

    /// Write the lowest `size` bits of the value, most significant bit first.
    /// Negative values are written in two's complement.
    #[inline]
    pub fn write_bits(&mut self, value: i32, size: u32) {
        debug_assert!(size <= 32, "at most 32 bits can be written at once");
        let value = value as u32;

        for index in (0 .. size as usize).rev() {
            let bit_in_byte = self.bit_count % 8;
            if bit_in_byte == 0 { self.bytes.push(0); }

            let last = self.bytes.len() - 1;
            self.bytes[last].set_bit(7 - bit_in_byte, value.get_bit(index));
            self.bit_count += 1;
        }
    }

    /// Write a single flag bit.
    #[inline]
    pub fn write_bit(&mut self, bit: bool) {
        self.write_bits(bit as i32, 1);
    }

    /// Number of bits written so far.
    pub fn bit_count(&self) -> usize { self.bit_count }

    /// The bytes written so far, the last byte possibly only partially.
    pub fn bytes(&self) -> &[u8] { &self.bytes }

    /// Return all written bytes, the last byte padded with zero bits.
    pub fn into_bytes(self) -> Vec<u8> { self.bytes }
}


/// Reads bit fields of up to 32 bits from a byte slice.
#[derive(Debug, Clone)]
pub struct BitReader<'b> {
    bytes: &'b [u8],
    bit_count: usize,
}

impl<'b> BitReader<'b> {

    /// Start reading at the first bit of the slice.
    pub fn new(bytes: &'b [u8]) -> Self {
        Self { bytes, bit_count: 0 }
    }

    /// Read `size` bits as an unsigned number. Reading zero bits yields zero.
    #[inline]
    pub fn read_bits(&mut self, size: u32) -> Result<i32> {
        self.read(size, false)
    }

    /// Read `size` bits as a two's complement number.
    #[inline]
    pub fn read_signed_bits(&mut self, size: u32) -> Result<i32> {
        self.read(size, true)
    }

    /// Read a single flag bit.
    #[inline]
    pub fn read_bit(&mut self) -> Result<bool> {
        Ok(self.read(1, false)? != 0)
    }

    fn read(&mut self, size: u32, sign_extend: bool) -> Result<i32> {
        debug_assert!(size <= 32, "at most 32 bits can be read at once");
        if size == 0 { return Ok(0); }

        let mut value: u32 = 0;
        for _ in 0 .. size {
            let byte = *self.bytes.get(self.bit_count / 8).ok_or(Error::MissingBits)?;
            let bit = byte.get_bit(7 - self.bit_count % 8);
            value = (value << 1) | bit as u32;
            self.bit_count += 1;
        }

        if sign_extend && size < 32 && value.get_bit(size as usize - 1) {
            value |= !0_u32 << size;
        }

        Ok(value as i32)
    }

    /// Number of bits consumed so far.
    pub fn bit_count(&self) -> usize { self.bit_count }
}


/// Write a big endian `u16`, used for chunk sizes.
#[inline]
pub fn write_u16(write: &mut impl Write, value: u16) -> UnitResult {
    write.write_as_big_endian(&value)?;
    Ok(())
}

/// Read a big endian `u16`, used for chunk sizes.
#[inline]
pub fn read_u16(read: &mut impl Read) -> Result<u16> {
    Ok(read.read_from_big_endian()?)
}
