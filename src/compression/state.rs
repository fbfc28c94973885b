
//! The mutable state of a single slice coding pass.
//! Encoder and decoder hold the same state and must keep it numerically identical.

use std::ops::{Index, IndexMut};
use crate::error::Result;
use crate::meta::Setup;
use crate::meta::Config;
use super::flatness::FlatnessState;
use super::history::History;
use super::predict::BlockSearch;
use super::rate::RateState;
use super::tables::{QuantTables, COMPONENTS, GROUP_SIZE, PADDING};


/// The samples of one component of one slice line.
/// Positions are relative to the first sample of the slice,
/// and may reach `PADDING` samples beyond either end of the line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct LineBuffer {
    samples: Vec<i32>,
}

impl LineBuffer {

    /// A line of the specified width plus padding on both sides, filled with the value.
    pub fn new(width: usize, value: i32) -> Self {
        Self { samples: vec![ value; width + 2 * PADDING as usize ] }
    }

    /// The leftmost addressable position.
    pub fn first_position(&self) -> i32 { -PADDING }

    /// The rightmost addressable position.
    pub fn last_position(&self) -> i32 { self.samples.len() as i32 - PADDING - 1 }

    /// Read the sample, moving the position into the addressable range first.
    pub fn clamped(&self, position: i32) -> i32 {
        self[position.max(self.first_position()).min(self.last_position())]
    }
}

impl Index<i32> for LineBuffer {
    type Output = i32;

    #[inline]
    fn index(&self, position: i32) -> &i32 {
        &self.samples[(position + PADDING) as usize]
    }
}

impl IndexMut<i32> for LineBuffer {
    #[inline]
    fn index_mut(&mut self, position: i32) -> &mut i32 {
        &mut self.samples[(position + PADDING) as usize]
    }
}


/// Round a sample to the bit depth of the line buffer,
/// keeping it at the original scale.
#[inline]
pub(crate) fn to_line_buffer(sample: i32, bit_depth: i32, line_buffer_depth: i32) -> i32 {
    let shift = (bit_depth - line_buffer_depth).max(0);
    let round = if shift > 0 { 1 << (shift - 1) } else { 0 };
    ((sample + round) >> shift).min((1 << line_buffer_depth) - 1) << shift
}


/// Everything the entropy coder knows about the group that is currently being coded.
#[derive(Debug, Clone, Default)]
pub(crate) struct GroupState {

    /// The qp that the current group is coded with.
    pub master_qp: i32,

    /// The qp that the previous group was coded with.
    pub previous_master_qp: i32,

    /// Predicted residual size for the next unit, per component.
    pub predicted_size: [i32; COMPONENTS],

    /// Quantized prediction residuals, per component and sample.
    pub quantized_residual: [[i32; GROUP_SIZE]; COMPONENTS],

    /// Quantized residuals relative to the midpoint predictor. Encoder only.
    pub midpoint_residual: [[i32; GROUP_SIZE]; COMPONENTS],

    /// Reconstruction if the midpoint predictor is used. Encoder only.
    pub midpoint_recon: [[i32; GROUP_SIZE]; COMPONENTS],

    /// Whether the unit of each component uses the midpoint predictor.
    pub midpoint_selected: [bool; COMPONENTS],

    /// The rightmost reconstructed sample of the previous group.
    pub left_recon: [i32; COMPONENTS],

    /// Bits that the rate control accounts for each unit.
    pub rc_size_unit: [i32; COMPONENTS],

    /// Whether this group is coded with history indices.
    pub history_selected: bool,

    /// Whether the previous group was coded with history indices.
    pub previous_history_selected: bool,

    /// The history entry for each pixel of the group.
    pub history_indices: [usize; GROUP_SIZE],

    /// The history pixel for each pixel of the group. Encoder only.
    pub history_pixels: [[i32; COMPONENTS]; GROUP_SIZE],

    /// Whether each original pixel is close to some history entry. Encoder only.
    pub within_quant_error: [bool; GROUP_SIZE],

    /// Largest reconstruction errors of the group, scaled to 8 bits. Encoder only.
    pub max_error: [i32; COMPONENTS],
    pub max_midpoint_error: [i32; COMPONENTS],
    pub max_history_error: [i32; COMPONENTS],

    /// Whether the midpoint predictor is forced to keep the buffer from running empty. Encoder only.
    pub force_midpoint: bool,
}

impl GroupState {

    /// Fill the positions of a partial group at the end of a line.
    pub fn pad(&mut self, sample: usize) {
        debug_assert!(sample > 0, "group cannot be empty");
        self.history_indices[sample] = self.history_indices[sample - 1];

        for component in 0 .. COMPONENTS {
            self.quantized_residual[component][sample] = 0;
            self.midpoint_residual[component][sample] = 0;
        }
    }
}


/// The state of a slice coding pass.
/// Owned by exactly one encoder or decoder for exactly one slice.
#[derive(Debug)]
pub(crate) struct CodecState<'s> {
    pub config: &'s Config,
    pub rcb_bits: i32,
    pub flatness_det_thresh: i32,
    pub tables: QuantTables,

    /// Bits per sample of each component in the coding domain.
    /// Chroma has one more bit if converted from rgb.
    pub bit_depth: [i32; COMPONENTS],

    pub slice_width: i32,
    pub slice_height: i32,

    pub current: [LineBuffer; COMPONENTS],
    pub previous: [LineBuffer; COMPONENTS],
    pub original: [LineBuffer; COMPONENTS],

    pub history: History,
    pub block_search: BlockSearch,
    pub rate: RateState,
    pub flatness: FlatnessState,
    pub group: GroupState,

    /// The horizontal position of the end of the last completed group, including padding.
    pub h_pos: i32,

    /// The line that is being coded.
    pub v_pos: i32,

    /// Number of completed groups in the slice.
    pub group_count: i32,
}

impl<'s> CodecState<'s> {

    /// Create the initial state for coding a slice.
    pub fn new(setup: &'s Setup) -> Result<Self> {
        let config = &setup.config;
        let tables = config.quant_tables()?;

        let bits = i32::from(config.bits_per_component);
        let chroma_bits = if config.convert_rgb { bits + 1 } else { bits };
        let bit_depth = [ bits, chroma_bits, chroma_bits ];

        let width = config.slice_size.width();
        let line = |component: usize| {
            let initial = 1 << (bits - 1);
            let initial = if config.convert_rgb && component != 0 { initial * 2 } else { initial };
            LineBuffer::new(width, initial)
        };

        Ok(Self {
            config,
            rcb_bits: setup.rcb_bits,
            flatness_det_thresh: setup.flatness_det_thresh,
            tables,
            bit_depth,
            slice_width: width as i32,
            slice_height: config.slice_size.height() as i32,
            current: [ line(0), line(1), line(2) ],
            previous: [ line(0), line(1), line(2) ],
            original: [ LineBuffer::new(width, 0), LineBuffer::new(width, 0), LineBuffer::new(width, 0) ],
            history: History::default(),
            block_search: BlockSearch::new(config.groups_per_line()),
            rate: RateState::new(config),
            flatness: FlatnessState::default(),
            group: GroupState::default(),
            h_pos: 0,
            v_pos: 0,
            group_count: 0,
        })
    }

    /// The quantization level of the component at the qp.
    #[inline]
    pub fn level(&self, qp: i32, component: usize) -> i32 {
        self.tables.level(qp, component)
    }

    /// The largest residual size of a component at the qp.
    #[inline]
    pub fn max_residual_size(&self, component: usize, qp: i32) -> i32 {
        self.bit_depth[component] - self.level(qp, component)
    }

    /// The highest sample value of a component.
    #[inline]
    pub fn max_sample(&self, component: usize) -> i32 {
        (1 << self.bit_depth[component]) - 1
    }

    /// The midpoint predictor, which keeps the low bits of the sample to the left.
    #[inline]
    pub fn midpoint(&self, component: usize, level: i32) -> i32 {
        (1 << self.bit_depth[component]) / 2 + self.group.left_recon[component] % (1 << level)
    }

    /// Round a sample of the component to the line buffer depth.
    #[inline]
    pub fn to_line_buffer(&self, sample: i32, component: usize) -> i32 {
        to_line_buffer(sample, self.bit_depth[component], self.config.line_buffer_depth.into())
    }

    /// Replace the previous line with the bit reduced current line,
    /// replicating the outermost samples into the padding.
    pub fn advance_line(&mut self) {
        let last = self.slice_width - 1;

        for component in 0 .. COMPONENTS {
            let first = self.previous[component].first_position();
            let end = self.previous[component].last_position();

            for position in first ..= end {
                let sample = self.current[component][position.max(0).min(last)];
                self.previous[component][position] = self.to_line_buffer(sample, component);
            }
        }
    }

    /// Scaled difference between an original and a reconstructed sample.
    #[inline]
    pub fn scaled_error(&self, original: i32, reconstructed: i32) -> i32 {
        (original - reconstructed).abs() >> (i32::from(self.config.bits_per_component) - 8)
    }
}


#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn line_buffer_padding() {
        let mut line = LineBuffer::new(4, 7);
        assert_eq!(line.first_position(), -5);
        assert_eq!(line.last_position(), 8);

        line[-5] = 1;
        line[8] = 2;
        assert_eq!(line[-5], 1);
        assert_eq!(line[0], 7);
        assert_eq!(line.clamped(-20), 1);
        assert_eq!(line.clamped(20), 2);
    }

    #[test]
    fn line_buffer_rounding() {
        assert_eq!(to_line_buffer(200, 8, 9), 200);
        assert_eq!(to_line_buffer(201, 9, 8), 202);
        assert_eq!(to_line_buffer(511, 9, 8), 510);
        assert_eq!(to_line_buffer(1023, 10, 8), 1020);
        assert_eq!(to_line_buffer(6, 10, 8), 8);
    }
}
