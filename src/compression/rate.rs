
//! The rate buffer model and the rate control.
//! Encoder and decoder run the identical model, so that both
//! arrive at the same qp for every group without transmitting it.

use crate::error::{Error, UnitResult};
use crate::meta::Config;
use super::tables::{
    GROUP_SIZE, COMPONENTS, OFFSET_FRACTIONAL_BITS, OVERFLOW_AVOID_THRESHOLD,
    RANGE_COUNT, RC_SCALE_BINARY_POINT,
};


/// The state of the rate buffer model of a slice.
#[derive(Debug, Clone, Default)]
pub(crate) struct RateState {

    /// Bits in the modelled rate buffer.
    pub buffer_fullness: i32,

    /// The highest fullness that the buffer reached.
    pub max_fullness: i32,

    /// The qp that the rate control chose for the next group.
    pub qp: i32,

    /// The qp that the rate control chose for the previous group.
    pub previous_qp: i32,

    /// Bits that the last group would need at the maximum residual sizes.
    pub rc_size_group: i32,

    /// Bits that the last group actually used.
    pub coded_group_size: i32,

    /// The range selected for the last group, applied one group later.
    pub previous_range: usize,

    /// The offset that transforms the fullness into the rate control model.
    pub xform_offset: i32,
    offset_fraction: i32,
    offset_clamped: bool,

    scale: i32,
    scale_adjust_counter: i32,
    scale_increment_started: bool,

    /// Pixels that have been accounted by the rate control.
    pub pixel_count: i32,
    previous_pixel_count: i32,

    bpp_fraction: i32,
    chunk_bits: i32,
    chunk_pixels: i32,

    /// Bits that were dropped from an empty buffer in variable bit rate mode.
    pub bits_clamped: i32,

    /// The byte size of each completed chunk.
    pub chunk_sizes: Vec<usize>,
}


impl RateState {

    /// The state before the first group of a slice.
    pub fn new(config: &Config) -> Self {
        Self {
            xform_offset: config.initial_offset.into(),
            chunk_sizes: Vec::with_capacity(config.slice_size.height()),
            .. Self::default()
        }
    }

    /// Number of completed chunks.
    pub fn chunk_count(&self) -> usize {
        self.chunk_sizes.len()
    }

    /// Bits removed from the buffer since the last completed chunk.
    pub fn chunk_bits(&self) -> i32 {
        self.chunk_bits
    }

    /// Remove the bits of one pixel time from the buffer.
    /// After a full line of pixel times, one chunk is complete.
    pub fn remove_bits(&mut self, config: &Config) {
        let bits_per_pixel = i32::from(config.bits_per_pixel);

        self.bpp_fraction += bits_per_pixel & 0xf;
        let removed = (bits_per_pixel >> 4) + (self.bpp_fraction >> 4);
        self.buffer_fullness -= removed;
        self.chunk_bits += removed;
        self.bpp_fraction &= 0xf;
        self.chunk_pixels += 1;

        if self.chunk_pixels < config.slice_size.width() as i32 {
            return;
        }

        if config.vbr {
            let chunk_bits = self.chunk_bits - self.bits_clamped;
            let size = (chunk_bits + 7) / 8;
            self.buffer_fullness -= size * 8 - chunk_bits;
            self.bits_clamped = 0;
            self.chunk_sizes.push(size.max(0) as usize);
        }
        else {
            self.buffer_fullness -= config.chunk_size as i32 * 8 - self.chunk_bits;
            self.chunk_sizes.push(config.chunk_size);
        }

        self.bpp_fraction = 0;
        self.chunk_bits = 0;
        self.chunk_pixels = 0;
    }

    /// Update the scale and the offset of the rate control model for the next group.
    /// Returns the scale and the bits per group offset.
    pub fn fullness_offset(&mut self, config: &Config, v_pos: i32, group_count: i32) -> (i32, i32) {
        let unity_scale = 1 << RC_SCALE_BINARY_POINT;

        if group_count == 0 {
            self.scale = config.initial_scale_value.into();
            self.scale_adjust_counter = 1;
        }
        else if v_pos == 0 && self.scale > unity_scale {
            self.scale_adjust_counter += 1;

            if self.scale_adjust_counter >= i32::from(config.scale_decrement_interval) {
                self.scale_adjust_counter = 0;
                self.scale -= 1;
            }
        }
        else if self.scale_increment_started {
            self.scale_adjust_counter += 1;

            if self.scale_adjust_counter >= i32::from(config.scale_increment_interval) {
                self.scale_adjust_counter = 0;
                self.scale += 1;
            }
        }

        let first_line_offset = i32::from(config.first_line_bpg_offset);
        let nfl_offset = i32::from(config.nfl_bpg_offset);
        let slice_offset = i32::from(config.slice_bpg_offset);
        let xmit_delay = i32::from(config.initial_xmit_delay);

        let (mut bpg_offset, mut increment) =
            if v_pos == 0 { (first_line_offset, -(first_line_offset << OFFSET_FRACTIONAL_BITS)) }
            else { (-(nfl_offset >> OFFSET_FRACTIONAL_BITS), nfl_offset) };

        if self.pixel_count < xmit_delay {
            let pixels =
                if self.pixel_count == 0 { GROUP_SIZE as i32 }
                else { self.pixel_count - self.previous_pixel_count };

            let pixels = pixels.min(xmit_delay - self.pixel_count);
            increment -= (i32::from(config.bits_per_pixel) * pixels) << (OFFSET_FRACTIONAL_BITS - 4);
        }
        else if config.scale_increment_interval != 0 && !self.scale_increment_started && v_pos > 0 && self.xform_offset > 0 {
            self.scale = 9;
            self.scale_adjust_counter = 0;
            self.scale_increment_started = true;
        }

        self.previous_pixel_count = self.pixel_count;

        bpg_offset -= slice_offset >> OFFSET_FRACTIONAL_BITS;
        increment += slice_offset;

        self.offset_fraction += increment;
        self.xform_offset += self.offset_fraction >> OFFSET_FRACTIONAL_BITS;
        self.offset_fraction &= (1 << OFFSET_FRACTIONAL_BITS) - 1;

        let final_offset = i32::from(config.final_offset);
        if self.xform_offset < final_offset {
            self.offset_clamped = true;
        }

        if self.offset_clamped {
            self.xform_offset = self.xform_offset.min(final_offset);
        }

        (self.scale, bpg_offset)
    }

    /// Account the coded bits of a group.
    pub fn add_group_bits(&mut self, bits: i32, rcb_bits: i32) -> UnitResult {
        self.coded_group_size = bits;
        self.buffer_fullness += bits;
        self.max_fullness = self.max_fullness.max(self.buffer_fullness);

        if self.buffer_fullness > rcb_bits {
            return Err(Error::BufferOverflow { capacity: rcb_bits, fullness: self.buffer_fullness });
        }

        Ok(())
    }

    /// Choose the qp of the next group after a group of `group_size` pixels.
    pub fn rate_control(
        &mut self, config: &Config, rcb_bits: i32, scale: i32, bpg_offset: i32,
        group_size: i32, rc_size_unit: [i32; COMPONENTS],
    ) -> UnitResult
    {
        let previous_rc_size_group = self.rc_size_group;
        let previous_qp = self.qp;
        let second_previous_qp = self.previous_qp;

        for _ in 0 .. group_size {
            self.pixel_count += 1;

            if self.pixel_count >= i32::from(config.initial_xmit_delay) {
                self.remove_bits(config);
            }
        }

        let rc_size_group: i32 = rc_size_unit.iter().sum();
        let model_size = i32::from(config.rc_model_size);
        let offset = self.xform_offset - model_size;
        let model_fullness = (scale * (self.buffer_fullness + offset)) >> RC_SCALE_BINARY_POINT;
        let overflow_avoid = self.buffer_fullness + offset > OVERFLOW_AVOID_THRESHOLD;

        let mut range = RANGE_COUNT - 1;
        while range > 0 && model_fullness <= i32::from(config.rc_buffer_thresholds[range - 1]) - model_size {
            range -= 1;
        }

        if model_fullness > 0 {
            return Err(Error::RateControlOverflow { model_fullness });
        }

        let selected_range = config.rc_ranges[self.previous_range];
        self.previous_range = range;

        let min_qp = i32::from(selected_range.min_qp);
        let max_qp = i32::from(selected_range.max_qp);

        let bits_per_group = (i32::from(config.bits_per_pixel) * group_size + 8) >> 4;
        let target = (bits_per_group + i32::from(selected_range.bpg_offset) + bpg_offset).max(0);
        let target_minus_offset = (target - i32::from(config.rc_target_offset_low)).max(0);
        let target_plus_offset = (target + i32::from(config.rc_target_offset_high)).max(0);
        let increment = (self.coded_group_size - target) >> 1;

        let edge_factor = i32::from(config.rc_edge_factor);
        let no_recent_edge = rc_size_group * 2 < previous_rc_size_group * edge_factor;

        let qp =
            if rc_size_group == GROUP_SIZE as i32 {
                (min_qp / 2).max(previous_qp - 1)
            }
            else if self.coded_group_size < target_minus_offset && rc_size_group < target_minus_offset {
                min_qp.max(previous_qp - 1)
            }
            else if self.buffer_fullness >= 64 && self.coded_group_size > target_plus_offset {
                let current_qp = previous_qp.max(min_qp);
                let increased = max_qp.min(current_qp + increment);

                let may_increase =
                    if second_previous_qp == current_qp { no_recent_edge }
                    else if second_previous_qp < current_qp { no_recent_edge && current_qp < i32::from(config.rc_quant_incr_limit0) }
                    else { current_qp < i32::from(config.rc_quant_incr_limit1) };

                if may_increase { increased } else { current_qp }
            }
            else {
                previous_qp
            };

        self.qp = if overflow_avoid { i32::from(config.rc_ranges[RANGE_COUNT - 1].max_qp) } else { qp };
        self.rc_size_group = rc_size_group;
        self.previous_qp = previous_qp;

        if self.buffer_fullness > rcb_bits {
            return Err(Error::BufferOverflow { capacity: rcb_bits, fullness: self.buffer_fullness });
        }

        Ok(())
    }

    /// Handle a buffer that was drained below zero.
    /// Variable bit rate streams drop the missing bits from the current chunk,
    /// for constant bit rate streams this is an error.
    pub fn absorb_underflow(&mut self, vbr: bool) -> UnitResult {
        if self.buffer_fullness >= 0 {
            return Ok(());
        }

        if !vbr {
            return Err(Error::BufferUnderflow { fullness: self.buffer_fullness });
        }

        self.bits_clamped -= self.buffer_fullness;
        self.buffer_fullness = 0;
        Ok(())
    }
}
