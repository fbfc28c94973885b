
//! Quantization tables and the residual helpers built on them.

use crate::math::bit_length;


/// Pixels in one group, which is also the number of samples in one unit.
pub const GROUP_SIZE: usize = 3;

/// Number of groups that share one flatness signal.
pub const GROUPS_PER_SUPERGROUP: i32 = 4;

/// Number of colour components.
pub const COMPONENTS: usize = 3;

/// Number of rate control ranges.
pub const RANGE_COUNT: usize = 15;

/// Number of rate control buffer thresholds.
pub const THRESHOLD_COUNT: usize = RANGE_COUNT - 1;

/// Fractional bits of the rate control offsets.
pub const OFFSET_FRACTIONAL_BITS: i32 = 11;

/// Fractional bits of the rate control scale.
pub const RC_SCALE_BINARY_POINT: i32 = 3;

/// Above this (transformed) buffer fullness, the top range's maximum qp is forced.
pub const OVERFLOW_AVOID_THRESHOLD: i32 = -172;

/// Bits per index cache history entry index.
pub const HISTORY_INDEX_BITS: u32 = 5;

/// Number of index cache history entries.
pub const HISTORY_SIZE: usize = 1 << HISTORY_INDEX_BITS;

/// Entries that alias the previous line outside of the first line.
pub const HISTORY_PIXELS_ABOVE: usize = 7;

/// Samples that lie outside the slice on each side of a line buffer.
pub const PADDING: i32 = 5;


/// `2^level`, the step size of each quantization level.
pub const QUANT_DIVISOR: [i32; 13] = [ 1, 2, 4, 8, 16, 32, 64, 128, 256, 512, 1024, 2048, 4096 ];

/// Rounding offset for each quantization level, `2^(level-1) - 1`.
pub const QUANT_OFFSET: [i32; 13] = [ 0, 0, 1, 3, 7, 15, 31, 63, 127, 255, 511, 1023, 2047 ];

const LUMA_8: [u8; 16] = [ 0, 0, 0, 1, 1, 2, 2, 3, 3, 4, 4, 5, 5, 5, 6, 7 ];
const CHROMA_8: [u8; 16] = [ 0, 1, 2, 2, 3, 3, 4, 4, 5, 5, 6, 6, 7, 8, 8, 8 ];
const LUMA_10: [u8; 20] = [ 0, 0, 0, 1, 1, 2, 2, 3, 3, 4, 4, 5, 5, 6, 6, 7, 7, 7, 8, 9 ];
const CHROMA_10: [u8; 20] = [ 0, 1, 2, 2, 3, 3, 4, 4, 5, 5, 6, 6, 7, 7, 8, 8, 9, 10, 10, 10 ];
const LUMA_12: [u8; 24] = [ 0, 0, 0, 1, 1, 2, 2, 3, 3, 4, 4, 5, 5, 6, 6, 7, 7, 8, 8, 9, 9, 9, 10, 11 ];
const CHROMA_12: [u8; 24] = [ 0, 1, 2, 2, 3, 3, 4, 4, 5, 5, 6, 6, 7, 7, 8, 8, 9, 9, 10, 10, 11, 12, 12, 12 ];


/// Maps a quantization parameter to a quantization level,
/// separately for luma and for both chroma components.
/// The tables depend on the bits per component.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuantTables {
    luma: &'static [u8],
    chroma: &'static [u8],
}

impl QuantTables {

    /// The tables for 8, 10 or 12 bits per component.
    /// Returns `None` for any other bit depth.
    pub fn for_bits_per_component(bits: u8) -> Option<Self> {
        match bits {
            8 => Some(Self { luma: &LUMA_8, chroma: &CHROMA_8 }),
            10 => Some(Self { luma: &LUMA_10, chroma: &CHROMA_10 }),
            12 => Some(Self { luma: &LUMA_12, chroma: &CHROMA_12 }),
            _ => None,
        }
    }

    /// The quantization level for the component. Component zero is luma.
    #[inline]
    pub fn level(&self, qp: i32, component: usize) -> i32 {
        let table = if component == 0 { self.luma } else { self.chroma };
        i32::from(table[qp as usize])
    }

    /// The highest valid quantization parameter.
    pub fn max_qp(&self) -> i32 {
        self.luma.len() as i32 - 1
    }
}


/// Quantize a raw prediction error with the dead zone quantizer.
/// Positive and negative errors are rounded asymmetrically.
#[inline]
pub fn quantize(error: i32, level: i32) -> i32 {
    let offset = QUANT_OFFSET[level as usize];

    if error > 0 { (error + offset) >> level }
    else { -((offset - error) >> level) }
}

/// Number of bits needed to code the quantized residual in two's complement.
/// Zero needs no bits at all.
#[inline]
pub fn residual_size(residual: i32) -> i32 {
    if residual == 0 { 0 }
    else if residual < 0 { (bit_length(!residual) + 1).min(14) }
    else { (bit_length(residual) + 1).min(14) }
}

/// Predict the size of the next unit from the required sizes of the last one.
/// The last sample weighs double.
#[inline]
pub fn predict_size(required_sizes: [i32; GROUP_SIZE]) -> i32 {
    (2 + required_sizes[0] + required_sizes[1] + 2 * required_sizes[2]) >> 2
}

/// Clamp the value, testing the upper bound first.
#[inline]
pub fn clamp(value: i32, min: i32, max: i32) -> i32 {
    if value > max { max }
    else if value < min { min }
    else { value }
}


#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn dead_zone_quantizer() {
        assert_eq!(quantize(5, 2), 1);
        assert_eq!(quantize(-5, 2), -1);
        assert_eq!(quantize(2, 2), 0);
        assert_eq!(quantize(-2, 2), 0);
        assert_eq!(quantize(-3, 2), -1);
        assert_eq!(quantize(0, 3), 0);
        assert_eq!(quantize(-7, 0), -7);
        assert_eq!(quantize(9, 1), 4);
    }

    #[test]
    fn residual_sizes() {
        assert_eq!(residual_size(0), 0);
        assert_eq!(residual_size(-1), 1);
        assert_eq!(residual_size(1), 2);
        assert_eq!(residual_size(-2), 2);
        assert_eq!(residual_size(3), 3);
        assert_eq!(residual_size(-4), 3);
        assert_eq!(residual_size(-5), 4);
        assert_eq!(residual_size(127), 8);
        assert_eq!(residual_size(-128), 8);
        assert_eq!(residual_size(128), 9);
        assert_eq!(residual_size(4095), 13);
        assert_eq!(residual_size(5000), 14);
    }

    #[test]
    fn sizes_are_predicted_with_rounding() {
        assert_eq!(predict_size([0, 0, 0]), 0);
        assert_eq!(predict_size([1, 1, 0]), 1);
        assert_eq!(predict_size([2, 2, 4]), 3);
        assert_eq!(predict_size([8, 8, 8]), 8);
    }

    #[test]
    fn chroma_is_never_quantized_finer_than_luma() {
        for bits in [8, 10, 12] {
            let tables = QuantTables::for_bits_per_component(bits).unwrap();
            assert_eq!(tables.max_qp(), 15 + 2 * (i32::from(bits) - 8));

            for qp in 0 ..= tables.max_qp() {
                assert!(tables.level(qp, 1) >= tables.level(qp, 0));
                assert_eq!(tables.level(qp, 1), tables.level(qp, 2));
            }
        }

        assert!(QuantTables::for_bits_per_component(9).is_none());
    }

    #[test]
    fn clamp_prefers_upper_bound() {
        assert_eq!(clamp(5, 0, 3), 3);
        assert_eq!(clamp(-1, 0, 3), 0);
        assert_eq!(clamp(1, 3, 0), 0);
    }
}
