//! A circular buffer of bits.
//!
//! The entropy coder stages every coded unit in one fifo per substream
//! before the substreams are written to the slice bit stream.

use bit_field::BitField;
use crate::error::{Error, Result, UnitResult};
use super::BitWriter;


/// Fixed capacity bit queue with separate read and write cursors.
/// Both cursors wrap around at the end of the storage.
#[derive(Debug, Clone)]
pub struct BitFifo {
    data: Vec<u8>,
    capacity: usize,

    read_position: usize,
    write_position: usize,
    fullness: usize,

    max_fullness: usize,
    bits_added: usize,
}

impl BitFifo {

    /// Create an empty fifo that holds `byte_capacity * 8` bits.
    pub fn new(byte_capacity: usize) -> Self {
        Self {
            data: vec![0; byte_capacity],
            capacity: byte_capacity * 8,
            read_position: 0,
            write_position: 0,
            fullness: 0,
            max_fullness: 0,
            bits_added: 0,
        }
    }

    /// Append the lowest `count` bits of the value, most significant bit first.
    /// Fails without modifying the fifo if the bits do not fit.
    pub fn put_bits(&mut self, value: i32, count: u32) -> UnitResult {
        let count = count as usize;
        if self.fullness + count > self.capacity {
            return Err(Error::FifoOverflow);
        }

        let value = value as u32;
        for index in (0 .. count).rev() {
            let position = self.write_position;
            self.data[position / 8].set_bit(7 - position % 8, value.get_bit(index));
            self.write_position = (position + 1) % self.capacity;
        }

        self.bits_added += count;
        self.fullness += count;
        self.max_fullness = self.max_fullness.max(self.fullness);
        Ok(())
    }

    /// Remove `count` bits, optionally interpreting them as a two's complement number.
    pub fn get_bits(&mut self, count: u32, sign_extend: bool) -> Result<i32> {
        let count = count as usize;
        if count > self.fullness {
            return Err(Error::FifoUnderflow);
        }

        let mut value: u32 = 0;
        for _ in 0 .. count {
            let position = self.read_position;
            let bit = self.data[position / 8].get_bit(7 - position % 8);
            value = (value << 1) | bit as u32;
            self.read_position = (position + 1) % self.capacity;
        }

        self.fullness -= count;

        if sign_extend && count > 0 && count < 32 && value.get_bit(count - 1) {
            value |= !0_u32 << count;
        }

        Ok(value as i32)
    }

    /// Move every queued bit to the writer, oldest first.
    pub fn drain_into(&mut self, writer: &mut BitWriter) -> UnitResult {
        while self.fullness > 0 {
            let count = self.fullness.min(32) as u32;
            let bits = self.get_bits(count, false)?;
            writer.write_bits(bits, count);
        }

        Ok(())
    }

    /// Number of bits currently queued.
    pub fn fullness(&self) -> usize { self.fullness }

    /// The highest number of bits that were ever queued at once.
    pub fn max_fullness(&self) -> usize { self.max_fullness }

    /// Total number of bits ever added.
    pub fn bits_added(&self) -> usize { self.bits_added }

    /// Number of bits this fifo can hold.
    pub fn capacity(&self) -> usize { self.capacity }
}
