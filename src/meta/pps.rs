
//! The picture parameter set, a fixed layout of bit fields
//! that describes the configuration of a stream.
//! Always 128 bytes, unused bits are zero.

use crate::error::{Error, Result};
use crate::io::{BitReader, BitWriter};
use crate::math::Vec2;
use super::{Config, RangeParameters};


/// The byte size of a picture parameter set.
pub const BYTE_SIZE: usize = 128;

/// The only supported major and minor version.
const VERSION: (i32, i32) = (1, 1);


/// Serialize the configuration into the picture parameter set layout.
pub fn write(config: &Config) -> Result<[u8; BYTE_SIZE]> {
    let mut bits = BitWriter::with_byte_capacity(BYTE_SIZE);
    let field = |value: usize, name: &'static str| -> Result<i32> {
        if value > 0xffff { Err(Error::invalid(name)) } else { Ok(value as i32) }
    };

    bits.write_bits(VERSION.0, 4);
    bits.write_bits(VERSION.1, 4);
    bits.write_bits(config.pps_identifier.into(), 8);
    bits.write_bits(0, 8);
    bits.write_bits(config.bits_per_component.into(), 4);
    bits.write_bits(config.line_buffer_depth.into(), 4);
    bits.write_bits(0, 2);
    bits.write_bit(config.block_prediction);
    bits.write_bit(config.convert_rgb);
    bits.write_bit(config.enable_422);
    bits.write_bit(config.vbr);
    bits.write_bits(config.bits_per_pixel.into(), 10);
    bits.write_bits(field(config.picture_size.height(), "picture height")?, 16);
    bits.write_bits(field(config.picture_size.width(), "picture width")?, 16);
    bits.write_bits(field(config.slice_size.height(), "slice height")?, 16);
    bits.write_bits(field(config.slice_size.width(), "slice width")?, 16);
    bits.write_bits(field(config.chunk_size, "chunk size")?, 16);
    bits.write_bits(0, 6);
    bits.write_bits(config.initial_xmit_delay.into(), 10);
    bits.write_bits(config.initial_dec_delay.into(), 16);
    bits.write_bits(0, 10);
    bits.write_bits(config.initial_scale_value.into(), 6);
    bits.write_bits(config.scale_increment_interval.into(), 16);
    bits.write_bits(0, 4);
    bits.write_bits(config.scale_decrement_interval.into(), 12);
    bits.write_bits(0, 11);
    bits.write_bits(config.first_line_bpg_offset.into(), 5);
    bits.write_bits(config.nfl_bpg_offset.into(), 16);
    bits.write_bits(config.slice_bpg_offset.into(), 16);
    bits.write_bits(config.initial_offset.into(), 16);
    bits.write_bits(config.final_offset.into(), 16);
    bits.write_bits(0, 3);
    bits.write_bits(config.flatness_min_qp.into(), 5);
    bits.write_bits(0, 3);
    bits.write_bits(config.flatness_max_qp.into(), 5);

    bits.write_bits(config.rc_model_size.into(), 16);
    bits.write_bits(0, 4);
    bits.write_bits(config.rc_edge_factor.into(), 4);
    bits.write_bits(0, 3);
    bits.write_bits(config.rc_quant_incr_limit0.into(), 5);
    bits.write_bits(0, 3);
    bits.write_bits(config.rc_quant_incr_limit1.into(), 5);
    bits.write_bits(config.rc_target_offset_high.into(), 4);
    bits.write_bits(config.rc_target_offset_low.into(), 4);

    for &threshold in &config.rc_buffer_thresholds {
        bits.write_bits(i32::from(threshold >> 6), 8);
    }

    for range in &config.rc_ranges {
        bits.write_bits(range.min_qp.into(), 5);
        bits.write_bits(range.max_qp.into(), 5);
        bits.write_bits(range.bpg_offset.into(), 6);
    }

    debug_assert!(bits.bit_count() <= BYTE_SIZE * 8, "parameter set too large");

    let mut bytes = [0_u8; BYTE_SIZE];
    let written = bits.into_bytes();
    bytes[.. written.len()].copy_from_slice(&written);
    Ok(bytes)
}


/// Parse a picture parameter set. Reserved bits are ignored.
/// The result is not validated, see `Config::validate`.
pub fn read(bytes: &[u8]) -> Result<Config> {
    if bytes.len() < BYTE_SIZE {
        return Err(Error::MissingBits);
    }

    let mut bits = BitReader::new(&bytes[.. BYTE_SIZE]);

    let major = bits.read_bits(4)?;
    let minor = bits.read_bits(4)?;
    if (major, minor) != VERSION {
        return Err(Error::unsupported(format!("stream version {}.{}", major, minor)));
    }

    // the widths of all fields fit into the target types
    let mut u8_field = |size: u32| -> Result<u8> { Ok(bits.read_bits(size)? as u8) };
    let pps_identifier = u8_field(8)?;
    u8_field(8)?;

    let bits_per_component = u8_field(4)?;
    let line_buffer_depth = u8_field(4)?;
    u8_field(2)?;

    let block_prediction = bits.read_bit()?;
    let convert_rgb = bits.read_bit()?;
    let enable_422 = bits.read_bit()?;
    let vbr = bits.read_bit()?;
    let bits_per_pixel = bits.read_bits(10)? as u16;

    let picture_height = bits.read_bits(16)? as usize;
    let picture_width = bits.read_bits(16)? as usize;
    let slice_height = bits.read_bits(16)? as usize;
    let slice_width = bits.read_bits(16)? as usize;
    let chunk_size = bits.read_bits(16)? as usize;

    bits.read_bits(6)?;
    let initial_xmit_delay = bits.read_bits(10)? as u16;
    let initial_dec_delay = bits.read_bits(16)? as u16;
    bits.read_bits(10)?;
    let initial_scale_value = bits.read_bits(6)? as u8;
    let scale_increment_interval = bits.read_bits(16)? as u16;
    bits.read_bits(4)?;
    let scale_decrement_interval = bits.read_bits(12)? as u16;
    bits.read_bits(11)?;
    let first_line_bpg_offset = bits.read_bits(5)? as u8;
    let nfl_bpg_offset = bits.read_bits(16)? as u16;
    let slice_bpg_offset = bits.read_bits(16)? as u16;
    let initial_offset = bits.read_bits(16)? as u16;
    let final_offset = bits.read_bits(16)? as u16;
    bits.read_bits(3)?;
    let flatness_min_qp = bits.read_bits(5)? as u8;
    bits.read_bits(3)?;
    let flatness_max_qp = bits.read_bits(5)? as u8;

    let rc_model_size = bits.read_bits(16)? as u16;
    bits.read_bits(4)?;
    let rc_edge_factor = bits.read_bits(4)? as u8;
    bits.read_bits(3)?;
    let rc_quant_incr_limit0 = bits.read_bits(5)? as u8;
    bits.read_bits(3)?;
    let rc_quant_incr_limit1 = bits.read_bits(5)? as u8;
    let rc_target_offset_high = bits.read_bits(4)? as u8;
    let rc_target_offset_low = bits.read_bits(4)? as u8;

    let mut rc_buffer_thresholds = [0_u16; 14];
    for threshold in &mut rc_buffer_thresholds {
        *threshold = (bits.read_bits(8)? as u16) << 6;
    }

    let mut rc_ranges = [RangeParameters::default(); 15];
    for range in &mut rc_ranges {
        range.min_qp = bits.read_bits(5)? as u8;
        range.max_qp = bits.read_bits(5)? as u8;
        range.bpg_offset = bits.read_signed_bits(6)? as i8;
    }

    Ok(Config {
        pps_identifier, bits_per_component, line_buffer_depth,
        block_prediction, convert_rgb, enable_422, vbr, bits_per_pixel,
        picture_size: Vec2(picture_width, picture_height),
        slice_size: Vec2(slice_width, slice_height),
        chunk_size, initial_xmit_delay, initial_dec_delay,
        initial_scale_value, scale_increment_interval, scale_decrement_interval,
        first_line_bpg_offset, nfl_bpg_offset, slice_bpg_offset,
        initial_offset, final_offset, flatness_min_qp, flatness_max_qp,
        rc_model_size, rc_edge_factor, rc_quant_incr_limit0, rc_quant_incr_limit1,
        rc_target_offset_high, rc_target_offset_low,
        rc_buffer_thresholds, rc_ranges,
    })
}


#[cfg(test)]
mod test {
    use super::*;
    use crate::meta::Parameters;

    #[test]
    fn parameter_set_reproduces_every_field() {
        let parameters = Parameters {
            bits_per_component: 10,
            vbr: true,
            bits_per_pixel: 9.5,
            slice_size: Some(Vec2(40, 16)),
            pps_identifier: 7,
            .. Parameters::default()
        };

        let config = parameters.setup(Vec2(80, 32)).unwrap().config;
        let bytes = write(&config).unwrap();
        assert_eq!(read(&bytes).unwrap(), config);
    }

    #[test]
    fn layout_of_the_first_bytes() {
        let config = Parameters::default().setup(Vec2(64, 48)).unwrap().config;
        let bytes = write(&config).unwrap();

        assert_eq!(bytes[0], 0x11);
        assert_eq!(bytes[1], 0);
        assert_eq!(bytes[2], 0);
        assert_eq!(bytes[3], 0x89);

        // block prediction and rgb flags, then the upper bits of 128
        assert_eq!(bytes[4], 0b0011_0000);
        assert_eq!(bytes[5], 128);

        assert_eq!(&bytes[6 .. 10], &[0, 48, 0, 64]);
    }

    #[test]
    fn unused_bits_are_zero() {
        let config = Parameters::default().setup(Vec2(64, 64)).unwrap().config;
        let bytes = write(&config).unwrap();

        // 88 bytes of fields
        assert!(bytes[88 ..].iter().all(|&byte| byte == 0));
        assert_ne!(bytes[87], 0);
    }

    #[test]
    fn negative_offsets_are_sign_extended() {
        let config = Parameters::default().setup(Vec2(64, 64)).unwrap().config;
        let parsed = read(&write(&config).unwrap()).unwrap();
        assert_eq!(parsed.rc_ranges[14].bpg_offset, -12);
        assert_eq!(parsed.rc_ranges[0].bpg_offset, 2);
    }

    #[test]
    fn unknown_versions_are_rejected() {
        let config = Parameters::default().setup(Vec2(64, 64)).unwrap().config;
        let mut bytes = write(&config).unwrap();
        bytes[0] = 0x12;

        assert!(matches!(read(&bytes), Err(Error::NotSupported(_))));
        assert!(matches!(read(&bytes[.. 100]), Err(Error::MissingBits)));
    }
}
