
//! Describes how a picture is coded:
//! the picture parameter set that travels with the stream,
//! and the user parameters it is derived from.

pub mod pps;

use std::convert::TryFrom;
use crate::compression::tables::{QuantTables, OFFSET_FRACTIONAL_BITS, RANGE_COUNT, THRESHOLD_COUNT};
use crate::error::{Error, Result, UnitResult};
use crate::math::{RoundingMode, Vec2};


/// The quantization bounds and the bit budget offset of one rate control range.
/// The rate control selects one of the 15 ranges for each group,
/// based on the fullness of the rate buffer model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct RangeParameters {

    /// The lowest quantization parameter that this range allows.
    pub min_qp: u8,

    /// The highest quantization parameter that this range allows.
    pub max_qp: u8,

    /// Bits per group added to the target while in this range.
    /// Negative values take bits away. Must be within `-32 ..= 31`.
    pub bpg_offset: i8,
}

/// The thresholds that separate the rate control ranges, for 8 bits per pixel.
pub const DEFAULT_BUFFER_THRESHOLDS: [u16; THRESHOLD_COUNT] = [
    896, 1792, 2688, 3584, 4480, 5376, 6272, 6720, 7168, 7616, 7744, 7872, 8000, 8064
];

/// The rate control ranges for 8 bits per component and 8 bits per pixel.
pub const DEFAULT_RANGES: [RangeParameters; RANGE_COUNT] = {
    const fn range(min_qp: u8, max_qp: u8, bpg_offset: i8) -> RangeParameters {
        RangeParameters { min_qp, max_qp, bpg_offset }
    }

    [
        range(0, 4, 2), range(0, 4, 0), range(1, 5, 0), range(1, 6, -2), range(3, 7, -4),
        range(3, 7, -6), range(3, 7, -8), range(3, 8, -8), range(3, 9, -8), range(3, 10, -10),
        range(5, 11, -10), range(5, 12, -12), range(5, 13, -12), range(7, 13, -12), range(13, 15, -12),
    ]
};


/// Everything a decoder needs to know about a stream.
/// This is exactly the contents of the picture parameter set.
/// Immutable while coding, shared by all slices of a picture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {

    /// Identifies the parameter set, not interpreted.
    pub pps_identifier: u8,

    /// Bits of each colour component, 8, 10, or 12.
    pub bits_per_component: u8,

    /// Bits per component stored in the previous line buffer.
    pub line_buffer_depth: u8,

    /// Whether the block predictor may be selected.
    pub block_prediction: bool,

    /// Whether the samples are converted from RGB to YCoCg before coding.
    pub convert_rgb: bool,

    /// Whether the picture has subsampled 4:2:2 chroma.
    /// The core always codes 4:4:4, the conversion happens outside of the slices.
    pub enable_422: bool,

    /// Whether variable bit rate is enabled, which disables stuffing bits
    /// and prefixes each chunk with its size.
    pub vbr: bool,

    /// Target bits per pixel, with 4 fractional bits.
    pub bits_per_pixel: u16,

    /// Width and height of the whole picture.
    pub picture_size: Vec2<usize>,

    /// Width and height of each slice. Slices at the right
    /// and bottom edge may reach beyond the picture.
    pub slice_size: Vec2<usize>,

    /// The byte size of each chunk. A chunk holds the bits
    /// of one slice line in constant bit rate mode.
    pub chunk_size: usize,

    /// Pixel times before the rate buffer model starts removing bits.
    pub initial_xmit_delay: u16,

    /// Pixel times the decoder waits before decoding.
    pub initial_dec_delay: u16,

    /// Rate control scale at the start of the slice, with 3 fractional bits.
    pub initial_scale_value: u8,

    /// Groups between scale increments at the end of the slice. Zero disables incrementing.
    pub scale_increment_interval: u16,

    /// Groups between scale decrements at the start of the slice.
    pub scale_decrement_interval: u16,

    /// Additional bits per group for the first line.
    pub first_line_bpg_offset: u8,

    /// Bits per group taken from each non-first line, with 11 fractional bits.
    pub nfl_bpg_offset: u16,

    /// Bits per group taken from each group to make room for the initial offset, with 11 fractional bits.
    pub slice_bpg_offset: u16,

    /// Rate control model offset at the start of the slice.
    pub initial_offset: u16,

    /// Rate control model offset at the end of the slice.
    pub final_offset: u16,

    /// The lowest quantization parameter that transmits flatness information.
    pub flatness_min_qp: u8,

    /// The highest quantization parameter that transmits flatness information.
    pub flatness_max_qp: u8,

    /// Size of the rate control model in bits.
    pub rc_model_size: u16,

    /// Relative bit growth that indicates an edge.
    pub rc_edge_factor: u8,

    /// Above this qp, increments are slowed down when the qp has recently increased.
    pub rc_quant_incr_limit0: u8,

    /// Above this qp, increments are slowed down when the qp has recently decreased.
    pub rc_quant_incr_limit1: u8,

    /// Tolerance above the target bits before the qp is increased.
    pub rc_target_offset_high: u8,

    /// Tolerance below the target bits before the qp is decreased.
    pub rc_target_offset_low: u8,

    /// The fullness thresholds between two ranges. Multiples of 64.
    pub rc_buffer_thresholds: [u16; THRESHOLD_COUNT],

    /// The rate control ranges, from an empty to a full buffer.
    pub rc_ranges: [RangeParameters; RANGE_COUNT],
}

/// A configuration along with the values that are not transmitted,
/// because each side computes them on its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Setup {

    /// The transmitted configuration.
    pub config: Config,

    /// The capacity of the rate buffer model in bits.
    pub rcb_bits: i32,

    /// The maximum difference between samples of a group that is still considered flat.
    /// Only used by the encoder.
    pub flatness_det_thresh: i32,
}


impl Config {

    /// Number of groups in one slice line. The last group may be partial.
    pub fn groups_per_line(&self) -> usize {
        (self.slice_size.width() + 2) / 3
    }

    /// Number of slices next to each other in one picture row.
    pub fn slices_per_line(&self) -> usize {
        RoundingMode::Up.divide(self.picture_size.width() as i64, self.slice_size.width() as i64) as usize
    }

    /// Number of slice rows in the picture.
    pub fn slice_rows(&self) -> usize {
        RoundingMode::Up.divide(self.picture_size.height() as i64, self.slice_size.height() as i64) as usize
    }

    /// The top left pixel of each slice, row by row.
    pub fn slice_origins(&self) -> impl Iterator<Item = Vec2<usize>> + '_ {
        (0 .. self.slice_rows()).flat_map(move |row| {
            (0 .. self.slices_per_line()).map(move |column| {
                Vec2(column * self.slice_size.width(), row * self.slice_size.height())
            })
        })
    }

    /// The number of bytes reserved for a single slice.
    pub fn slice_byte_capacity(&self) -> usize {
        self.chunk_size * self.slice_size.height()
    }

    /// The quantization level tables for the configured bit depth.
    pub fn quant_tables(&self) -> Result<QuantTables> {
        QuantTables::for_bits_per_component(self.bits_per_component)
            .ok_or_else(|| Error::unsupported("bits per component other than 8, 10, or 12"))
    }

    /// Below this qp, flat groups are always treated as somewhat flat.
    pub(crate) fn somewhat_flat_qp_threshold(&self) -> i32 {
        7 + 2 * (i32::from(self.bits_per_component) - 8)
    }

    /// The qp that very flat groups are forced to.
    pub(crate) fn very_flat_qp(&self) -> i32 {
        1 + 2 * (i32::from(self.bits_per_component) - 8)
    }

    /// Whether the given qp transmits flatness information.
    pub(crate) fn is_flatness_info_sent(&self, qp: i32) -> bool {
        qp >= i32::from(self.flatness_min_qp) && qp <= i32::from(self.flatness_max_qp)
    }

    /// Check the values that the slice coder relies on.
    /// Parsed parameter sets must pass this before any slice is decoded.
    pub fn validate(&self) -> UnitResult {
        let tables = self.quant_tables()?;

        if !(8 ..= 13).contains(&self.line_buffer_depth) {
            return Err(Error::invalid("line buffer depth"));
        }

        if self.picture_size.area() == 0 || self.slice_size.area() == 0 {
            return Err(Error::invalid("empty picture or slice"));
        }

        if self.picture_size.width() > 0xffff || self.picture_size.height() > 0xffff
            || self.slice_size.width() > 0xffff || self.slice_size.height() > 0xffff
        {
            return Err(Error::invalid("picture or slice dimensions"));
        }

        if self.bits_per_pixel == 0 || self.chunk_size == 0 {
            return Err(Error::invalid("bits per pixel"));
        }

        if self.enable_422 && self.convert_rgb {
            return Err(Error::unsupported("4:2:2 chroma with rgb samples"));
        }

        for range in &self.rc_ranges {
            if i32::from(range.max_qp) > tables.max_qp() || i32::from(range.min_qp) > tables.max_qp() {
                return Err(Error::invalid("rate control range qp"));
            }

            if !(-32 ..= 31).contains(&range.bpg_offset) {
                return Err(Error::invalid("rate control range bpg offset"));
            }
        }

        Ok(())
    }
}


impl Setup {

    /// Prepare decoding a parsed configuration.
    /// The rate buffer size is estimated from the transmitted delays.
    pub fn for_decoding(config: Config) -> Result<Self> {
        config.validate()?;

        let delay = i64::from(config.initial_xmit_delay) + i64::from(config.initial_dec_delay);
        let bits_per_group = RoundingMode::Up.divide(3 * i64::from(config.bits_per_pixel), 16);
        let rcb_bits = i32::try_from(delay * bits_per_group)?;

        Ok(Setup { config, rcb_bits, flatness_det_thresh: 2 })
    }
}


/// The knobs of the encoder, before any derived value is computed.
/// Use `Parameters::default()` for 8 bits per component at 8 bits per pixel.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameters {

    /// Target bits per pixel. Rounded to sixteenths.
    pub bits_per_pixel: f32,

    /// Bits of each colour component, 8, 10, or 12.
    pub bits_per_component: u8,

    /// Bits per component stored in the previous line buffer, `8 ..= 13`.
    pub line_buffer_depth: u8,

    /// Whether the block predictor may be selected.
    pub block_prediction: bool,

    /// Whether the picture samples are RGB and must be converted to YCoCg.
    pub convert_rgb: bool,

    /// Whether the picture has 4:2:2 chroma. Requires YCbCr samples.
    pub enable_422: bool,

    /// Enable variable bit rate.
    pub vbr: bool,

    /// Size of each slice, or `None` for a single slice covering the picture.
    pub slice_size: Option<Vec2<usize>>,

    /// Size of the rate control model in bits.
    pub rc_model_size: i32,

    /// Rate control model offset at the start of the slice. Must be smaller than the model size.
    pub initial_offset: i32,

    /// Pixel times before bits are removed from the rate buffer model, `0 ..= 1023`.
    pub initial_xmit_delay: i32,

    /// Additional bits per group for the first line of each slice, `0 ..= 31`.
    pub first_line_bpg_offset: i32,

    /// Tolerance above the target bits, `0 ..= 15`.
    pub rc_target_offset_high: i32,

    /// Tolerance below the target bits, `0 ..= 15`.
    pub rc_target_offset_low: i32,

    /// Relative bit growth that indicates an edge, `0 ..= 15`.
    pub rc_edge_factor: i32,

    /// Qp increment limit after an increase, `0 ..= 31`.
    pub rc_quant_incr_limit0: i32,

    /// Qp increment limit after a decrease, `0 ..= 31`.
    pub rc_quant_incr_limit1: i32,

    /// The lowest qp that transmits flatness, `0 ..= 31`.
    pub flatness_min_qp: i32,

    /// The highest qp that transmits flatness, `0 ..= 31`.
    pub flatness_max_qp: i32,

    /// The maximum sample difference of a flat group.
    pub flatness_det_thresh: i32,

    /// Thresholds between the rate control ranges, multiples of 64.
    pub rc_buffer_thresholds: [u16; THRESHOLD_COUNT],

    /// The rate control ranges.
    pub rc_ranges: [RangeParameters; RANGE_COUNT],

    /// Written to the parameter set as is.
    pub pps_identifier: u8,
}

impl Default for Parameters {
    fn default() -> Self {
        Parameters {
            bits_per_pixel: 8.0,
            bits_per_component: 8,
            line_buffer_depth: 9,
            block_prediction: true,
            convert_rgb: true,
            enable_422: false,
            vbr: false,
            slice_size: None,
            rc_model_size: 8192,
            initial_offset: 6144,
            initial_xmit_delay: 170,
            first_line_bpg_offset: 12,
            rc_target_offset_high: 3,
            rc_target_offset_low: 3,
            rc_edge_factor: 6,
            rc_quant_incr_limit0: 11,
            rc_quant_incr_limit1: 11,
            flatness_min_qp: 3,
            flatness_max_qp: 12,
            flatness_det_thresh: 2,
            rc_buffer_thresholds: DEFAULT_BUFFER_THRESHOLDS,
            rc_ranges: DEFAULT_RANGES,
            pps_identifier: 0,
        }
    }
}


/// Return the value as the target type if it is within the bounds.
fn range_checked<T: TryFrom<i64>>(name: &'static str, value: i64, min: i64, max: i64) -> Result<T> {
    if value < min || value > max {
        return Err(Error::invalid(format!(
            "{} is {}, but needs to be between {} and {}", name, value, min, max
        )));
    }

    T::try_from(value).map_err(|_| Error::invalid(name))
}


impl Parameters {

    /// Check all parameters and compute the full configuration
    /// for coding a picture of the specified size.
    /// Inconsistent tables are reported as warnings through the `log` crate.
    pub fn setup(&self, picture_size: Vec2<usize>) -> Result<Setup> {
        use RoundingMode::{Up, Down};

        if self.enable_422 && self.convert_rgb {
            return Err(Error::unsupported("4:2:2 chroma with rgb samples"));
        }

        if self.enable_422 && picture_size.width() % 2 != 0 {
            return Err(Error::invalid("4:2:2 picture width must be a multiple of 2"));
        }

        let bits_per_component = i64::from(self.bits_per_component);
        let tables = QuantTables::for_bits_per_component(self.bits_per_component)
            .ok_or_else(|| Error::invalid("bits per component must be either 8, 10, or 12"))?;

        let max_qp = i64::from(tables.max_qp());
        debug_assert_eq!(max_qp, 15 + 2 * (bits_per_component - 8));

        let picture_width: usize = range_checked("picture width", picture_size.width() as i64, 1, 0xffff)?;
        let picture_height: usize = range_checked("picture height", picture_size.height() as i64, 1, 0xffff)?;

        let bits_per_pixel = (f64::from(self.bits_per_pixel) * 16.0 + 0.5).floor() as i64;
        let bits_per_pixel: u16 = if self.vbr { range_checked("bits per pixel (x16)", bits_per_pixel, 96, 1023)? }
            else { range_checked("bits per pixel (x16)", bits_per_pixel, 96, 640)? };

        let bpp = i64::from(bits_per_pixel);

        let line_buffer_depth = range_checked("line buffer depth", i64::from(self.line_buffer_depth), 8, 13)?;
        let rc_target_offset_high = range_checked("rc target offset high", self.rc_target_offset_high.into(), 0, 15)?;
        let rc_target_offset_low = range_checked("rc target offset low", self.rc_target_offset_low.into(), 0, 15)?;
        let rc_edge_factor = range_checked("rc edge factor", self.rc_edge_factor.into(), 0, 15)?;
        if self.rc_edge_factor < 2 {
            log::warn!("the rate control will not work as designed with rc_edge_factor < 2");
        }

        let rc_quant_incr_limit1 = range_checked("rc quant incr limit1", self.rc_quant_incr_limit1.into(), 0, 31)?;
        let rc_quant_incr_limit0 = range_checked("rc quant incr limit0", self.rc_quant_incr_limit0.into(), 0, 31)?;

        let rc_model_size: u16 = range_checked("rc model size", self.rc_model_size.into(), 0, 0xffff)?;
        let model_size = i64::from(rc_model_size);

        for (index, range) in self.rc_ranges.iter().enumerate() {
            range_checked::<i8>("range bpg offset", range.bpg_offset.into(), -32, 31)?;
            range_checked::<u8>("range max qp", range.max_qp.into(), 0, max_qp)?;
            range_checked::<u8>("range min qp", range.min_qp.into(), 0, max_qp)?;

            if index > 0 {
                let previous = &self.rc_ranges[index - 1];
                if previous.bpg_offset < range.bpg_offset {
                    log::warn!("range bpg offsets should not increase as the range increases");
                }
                if previous.max_qp > range.max_qp {
                    log::warn!("range max qp values should not decrease as the range increases");
                }
                if previous.min_qp > range.min_qp {
                    log::warn!("range min qp values should not decrease as the range increases");
                }
            }
        }

        for (index, &threshold) in self.rc_buffer_thresholds.iter().enumerate() {
            range_checked::<u16>("rc buffer threshold", threshold.into(), 0, model_size)?;

            if threshold % 64 != 0 {
                return Err(Error::invalid("all rc buffer thresholds must be evenly divisible by 64"));
            }

            if threshold >> 6 > 0xff {
                return Err(Error::invalid("rc buffer threshold too large for the parameter set"));
            }

            if index > 0 && self.rc_buffer_thresholds[index - 1] > threshold {
                log::warn!("rc buffer thresholds should not decrease as the range increases");
            }
        }

        let initial_xmit_delay: u16 = range_checked("initial xmit delay", self.initial_xmit_delay.into(), 0, 1023)?;
        let xmit_delay = i64::from(initial_xmit_delay);

        let initial_offset: u16 = range_checked("initial offset", self.initial_offset.into(), 0, model_size)?;
        let first_line_bpg_offset: u8 = range_checked("first line bpg offset", self.first_line_bpg_offset.into(), 0, 31)?;
        let flatness_min_qp = range_checked("flatness min qp", self.flatness_min_qp.into(), 0, 31)?;
        let flatness_max_qp = range_checked("flatness max qp", self.flatness_max_qp.into(), 0, 31)?;

        if model_size <= i64::from(initial_offset) {
            return Err(Error::invalid("initial offset must be less than the rc model size"));
        }

        let model_headroom = model_size - i64::from(initial_offset);
        let mut initial_scale = range_checked::<i64>("initial scale value", 8 * model_size / model_headroom, 0, 63)?;

        let mut slice_size = self.slice_size.unwrap_or(picture_size);
        if self.enable_422 && slice_size.width() % 2 != 0 {
            slice_size.0 += 1;
            log::warn!("4:2:2 slice width must be a multiple of 2, adjusted to {}", slice_size.0);
        }

        let slice_width: usize = range_checked("slice width", slice_size.width() as i64, 1, 0xffff)?;
        let slice_height: usize = range_checked("slice height", slice_size.height() as i64, 1, 0xffff)?;

        let groups_per_line = (slice_width as i64 + 2) / 3;
        let chunk_size = range_checked("chunk size", Up.divide(slice_width as i64 * bpp, 8 * 16), 0, 0xffff)?;

        let minimum_buffer_size = model_headroom + Up.divide(xmit_delay * bpp, 16)
            + groups_per_line * i64::from(first_line_bpg_offset);

        let hrd_delay = Up.divide(minimum_buffer_size * 16, bpp);
        let rcb_bits = range_checked::<i32>("rate buffer size", Up.divide(hrd_delay * bpp, 16), 0, i64::from(i32::MAX))?;
        let initial_dec_delay = range_checked("initial dec delay", hrd_delay - xmit_delay, 0, 0xffff)?;

        if groups_per_line < initial_scale - 8 {
            initial_scale = groups_per_line + 8;
        }

        let scale_decrement_interval = range_checked(
            "scale decrement interval",
            if initial_scale > 8 { groups_per_line / (initial_scale - 8) } else { 4095 },
            0, 4095
        )?;

        let final_value = model_size - ((xmit_delay * bpp + 8) >> 4);
        let final_offset: u16 = range_checked("final offset", final_value, 0, 0xffff)?;

        if final_value >= model_size {
            return Err(Error::invalid("the final offset must be less than the rc model size, try increasing the initial xmit delay"));
        }

        let final_scale = 8 * model_size / (model_size - final_value);
        if final_scale > 63 {
            log::warn!("a final scale value above 63/8 may have undefined behaviour on some implementations, try increasing the initial xmit delay");
        }

        let nfl_bpg_offset = if slice_height > 1 {
            Up.divide(i64::from(first_line_bpg_offset) << OFFSET_FRACTIONAL_BITS, slice_height as i64 - 1)
        } else { 0 };

        let nfl_bpg_offset: u16 = range_checked("nfl bpg offset", nfl_bpg_offset, 0, 0xffff)?;

        let groups_total = groups_per_line * slice_height as i64;
        let slice_bpg_offset = Up.divide(model_headroom << OFFSET_FRACTIONAL_BITS, groups_total);
        let slice_bpg_offset: u16 = range_checked("slice bpg offset", slice_bpg_offset, 0, 0xffff)?;

        let line_offsets = i64::from(slice_bpg_offset) + i64::from(nfl_bpg_offset);

        if slice_height == 1 {
            if first_line_bpg_offset > 0 {
                return Err(Error::invalid("for a slice height of 1, the first line bpg offset must be 0"));
            }
        }
        else if 3 * bpp * (1 << OFFSET_FRACTIONAL_BITS) - 16 * line_offsets < 16 * 16 * (1 << OFFSET_FRACTIONAL_BITS) {
            return Err(Error::invalid("the bits per pixel for non-first lines are too low, consider decreasing the first line bpg offset"));
        }

        let scale_increment_interval = if final_scale > 9 {
            let interval = Down.divide(
                (1 << OFFSET_FRACTIONAL_BITS) * i64::from(final_offset),
                (final_scale - 9) * line_offsets.max(1)
            );

            if interval > 0xffff {
                return Err(Error::invalid("required scale increment interval is too high, consider smaller slices or a higher initial delay"));
            }

            interval as u16
        } else { 0 };

        let config = Config {
            pps_identifier: self.pps_identifier,
            bits_per_component: self.bits_per_component,
            line_buffer_depth,
            block_prediction: self.block_prediction,
            convert_rgb: self.convert_rgb,
            enable_422: self.enable_422,
            vbr: self.vbr,
            bits_per_pixel,
            picture_size: Vec2(picture_width, picture_height),
            slice_size: Vec2(slice_width, slice_height),
            chunk_size,
            initial_xmit_delay,
            initial_dec_delay,
            initial_scale_value: initial_scale as u8,
            scale_increment_interval,
            scale_decrement_interval,
            first_line_bpg_offset,
            nfl_bpg_offset,
            slice_bpg_offset,
            initial_offset,
            final_offset,
            flatness_min_qp,
            flatness_max_qp,
            rc_model_size,
            rc_edge_factor,
            rc_quant_incr_limit0,
            rc_quant_incr_limit1,
            rc_target_offset_high,
            rc_target_offset_low,
            rc_buffer_thresholds: self.rc_buffer_thresholds,
            rc_ranges: self.rc_ranges,
        };

        log::debug!(
            "derived configuration: chunk size {} bytes, rate buffer {} bits, scale {} (decrement every {}, increment every {})",
            config.chunk_size, rcb_bits, config.initial_scale_value,
            config.scale_decrement_interval, config.scale_increment_interval
        );

        Ok(Setup { config, rcb_bits, flatness_det_thresh: self.flatness_det_thresh })
    }
}


#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn default_setup_for_a_small_picture() {
        let setup = Parameters::default().setup(Vec2(64, 64)).unwrap();
        let config = &setup.config;

        assert_eq!(config.bits_per_pixel, 128);
        assert_eq!(config.chunk_size, 64);
        assert_eq!(config.groups_per_line(), 22);
        assert_eq!(config.initial_scale_value, 30);
        assert_eq!(config.scale_decrement_interval, 1);
        assert_eq!(config.final_offset, 8192 - 1360);
        assert_eq!(config.nfl_bpg_offset, 391);
        assert_eq!(config.slice_bpg_offset, 2979);
        assert_eq!(config.scale_increment_interval, 106);
        assert_eq!(config.initial_dec_delay, 459 - 170);
        assert_eq!(setup.rcb_bits, 3672);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn tiny_slices_overflow_the_slice_offset() {
        let error = Parameters::default().setup(Vec2(8, 8)).unwrap_err();
        assert!(error.is_configuration_error());
    }

    #[test]
    fn invalid_parameters_are_rejected() {
        let size = Vec2(64, 64);

        let parameters = Parameters { bits_per_component: 9, .. Parameters::default() };
        assert!(parameters.setup(size).is_err());

        let parameters = Parameters { bits_per_pixel: 5.0, .. Parameters::default() };
        assert!(parameters.setup(size).is_err());

        let parameters = Parameters { initial_offset: 8192, .. Parameters::default() };
        assert!(parameters.setup(size).is_err());

        let mut thresholds = DEFAULT_BUFFER_THRESHOLDS;
        thresholds[3] += 1;
        let parameters = Parameters { rc_buffer_thresholds: thresholds, .. Parameters::default() };
        assert!(parameters.setup(size).is_err());

        let mut ranges = DEFAULT_RANGES;
        ranges[14].max_qp = 16;
        let parameters = Parameters { rc_ranges: ranges, .. Parameters::default() };
        assert!(parameters.setup(size).is_err());

        let parameters = Parameters { enable_422: true, .. Parameters::default() };
        assert!(matches!(parameters.setup(size), Err(Error::NotSupported(_))));
    }

    #[test]
    fn slices_tile_the_picture() {
        let parameters = Parameters { slice_size: Some(Vec2(30, 32)), .. Parameters::default() };
        let setup = parameters.setup(Vec2(64, 70)).unwrap();

        let origins: Vec<_> = setup.config.slice_origins().collect();
        assert_eq!(setup.config.slices_per_line(), 3);
        assert_eq!(setup.config.slice_rows(), 3);
        assert_eq!(origins.len(), 9);
        assert_eq!(origins[0], Vec2(0, 0));
        assert_eq!(origins[2], Vec2(60, 0));
        assert_eq!(origins[8], Vec2(60, 64));
    }

    #[test]
    fn decoder_buffer_is_estimated_from_delays() {
        let setup = Parameters::default().setup(Vec2(64, 64)).unwrap();
        let decoding = Setup::for_decoding(setup.config.clone()).unwrap();
        assert_eq!(decoding.rcb_bits, 459 * 24);
        assert_eq!(decoding.config, setup.config);
    }
}
