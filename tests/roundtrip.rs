extern crate dsc;

use std::io::Cursor;
use std::path::PathBuf;
use dsc::prelude::*;
use dsc::compression::tables::{QuantTables, QUANT_DIVISOR};
use dsc::error::Error;
use dsc::meta::pps;
use rand::{Rng, SeedableRng};
use rand::rngs::StdRng;


fn gradient(size: Vec2<usize>, format: ColorFormat, bits: u8) -> Picture {
    let max = (1_usize << bits) - 1;

    Picture::from_fn(size, format, bits, |channel, Vec2(x, y)| {
        let value = (x * (channel + 2) + y * 3) << (bits - 8);
        value.min(max) as u16
    })
}

fn noise(size: Vec2<usize>, seed: u64) -> Picture {
    let mut random = StdRng::seed_from_u64(seed);
    let mut picture = Picture::new(size, ColorFormat::Rgb, 8);

    for channel in &mut picture.channels {
        for sample in channel.iter_mut() {
            *sample = random.random_range(0 .. 256);
        }
    }

    picture
}

fn temporary_file(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("dsc-test-{}-{}.dsc", std::process::id(), name))
}

/// Encode into memory, read the container back, and decode it.
fn round_trip(parameters: &Parameters, picture: &Picture) -> (EncodedPicture, Vec<u8>, Picture) {
    let setup = parameters.setup(picture.size).unwrap();
    let encoded = compress(&setup, picture).unwrap();

    let mut bytes = Vec::new();
    encoded.compressed.write(&mut bytes).unwrap();

    let decoded = Compressed::read(&mut Cursor::new(&bytes)).unwrap().decompress().unwrap();
    assert_eq!(decoded, encoded.reconstructed);

    (encoded, bytes, decoded)
}

/// The largest error that quantization at `max_qp` can leave in a sample of each plane.
/// History entries are checked at a qp two above.
fn plane_error_bounds(bits: u8, max_qp: i32) -> [u16; 3] {
    let tables = QuantTables::for_bits_per_component(bits).unwrap();
    let qp = (max_qp + 2).min(tables.max_qp());
    let step = |component| QUANT_DIVISOR[tables.level(qp, component) as usize] as u16;
    [ step(0), step(1), step(2) ]
}

/// The largest error after converting the planes back to rgb.
fn rgb_error_bound(bits: u8, max_qp: i32) -> u16 {
    let [ luma, co, cg ] = plane_error_bounds(bits, max_qp);
    luma + 2 * co + 2 * cg + 2
}

/// Every qp is limited to zero, with a rate model small enough for an 8x8 slice.
fn lossless_parameters() -> Parameters {
    let mut thresholds = [0; 14];
    for (index, threshold) in thresholds.iter_mut().enumerate() {
        *threshold = 64 * (index as u16 + 1);
    }

    Parameters {
        rc_model_size: 1024,
        initial_offset: 832,
        initial_xmit_delay: 24,
        first_line_bpg_offset: 0,
        rc_buffer_thresholds: thresholds,
        rc_ranges: [RangeParameters::default(); 15],
        .. Parameters::default()
    }
}


#[test]
fn small_flat_rgb_picture_is_lossless() {
    let size = Vec2(8, 8);
    let picture = Picture::from_fn(size, ColorFormat::Rgb, 8, |channel, _| [ 200, 120, 40 ][channel]);

    let (encoded, bytes, decoded) = round_trip(&lossless_parameters(), &picture);
    assert_eq!(decoded, picture);
    assert_eq!(encoded.statistics.max_qp, 0);

    let config = &encoded.compressed.config;
    assert_eq!(&bytes[.. 4], b"DSCF");
    assert_eq!(&bytes[4 .. 4 + pps::BYTE_SIZE], &pps::write(config).unwrap()[..]);
    assert_eq!(bytes.len(), 4 + pps::BYTE_SIZE + 8 * config.chunk_size);

    let read = Compressed::read(&mut Cursor::new(&bytes)).unwrap();
    assert_eq!(&read.config, config);
    assert_eq!(pps::write(&read.config).unwrap(), pps::write(config).unwrap());
}

#[test]
fn default_rate_model_does_not_fit_tiny_slices() {
    let result = Parameters::default().setup(Vec2(8, 8));
    assert!(matches!(result, Err(ref error) if error.is_configuration_error()));
}

#[test]
fn multiple_slices_through_a_file() {
    let picture = gradient(Vec2(96, 64), ColorFormat::Rgb, 8);
    let parameters = Parameters { slice_size: Some(Vec2(32, 32)), .. Parameters::default() };
    let path = temporary_file("slices");

    let encoded = write_to_file(&path, &parameters, &picture).unwrap();
    assert_eq!(encoded.compressed.slices.len(), 6);

    let decoded = read_from_file(&path).unwrap();
    std::fs::remove_file(&path).unwrap();

    assert_eq!(decoded, encoded.reconstructed);

    let error = picture.max_difference(&decoded).unwrap();
    assert!(error <= rgb_error_bound(8, encoded.statistics.max_qp), "off by {}", error);
}

#[test]
fn noise_stays_within_the_rate_buffer() {
    let picture = noise(Vec2(64, 64), 7);
    let parameters = Parameters::default();
    let setup = parameters.setup(picture.size).unwrap();

    let (encoded, bytes, _) = round_trip(&parameters, &picture);
    assert!(encoded.statistics.max_qp > 0);
    assert!(encoded.statistics.max_buffer_fullness <= setup.rcb_bits);
    assert_eq!(bytes.len(), 4 + pps::BYTE_SIZE + 64 * setup.config.chunk_size);
}

#[test]
fn variable_bit_rate_chunks_are_prefixed_with_their_size() {
    let picture = gradient(Vec2(64, 64), ColorFormat::Rgb, 8);
    let constant = Parameters { slice_size: Some(Vec2(32, 32)), .. Parameters::default() };
    let variable = Parameters { vbr: true, .. constant.clone() };

    let (constant_encoded, constant_bytes, _) = round_trip(&constant, &picture);
    let (encoded, variable_bytes, _) = round_trip(&variable, &picture);

    let chunks: usize = encoded.compressed.slices.iter().map(|slice| slice.chunk_sizes.len()).sum();
    let payload: usize = encoded.compressed.slices.iter().map(|slice| slice.bytes.len()).sum();
    assert_eq!(chunks, 4 * 32);
    assert_eq!(variable_bytes.len(), 4 + pps::BYTE_SIZE + 2 * chunks + payload);
    assert_eq!(constant_bytes.len(), 4 + pps::BYTE_SIZE + 4 * 32 * constant_encoded.compressed.config.chunk_size);
}

#[test]
fn luma_chroma_pictures() {
    let parameters = Parameters { convert_rgb: false, .. Parameters::default() };
    let picture = gradient(Vec2(64, 32), ColorFormat::YCbCr444, 8);
    let (encoded, _, decoded) = round_trip(&parameters, &picture);

    let bound = plane_error_bounds(8, encoded.statistics.max_qp).iter().copied().max().unwrap();
    assert!(picture.max_difference(&decoded).unwrap() <= bound);

    let parameters = Parameters { enable_422: true, .. parameters };
    let picture = gradient(Vec2(64, 32), ColorFormat::YCbCr422, 8);
    let (encoded, _, decoded) = round_trip(&parameters, &picture);

    assert_eq!(decoded.channel_size(1), Vec2(32, 32));
    assert!(encoded.compressed.config.enable_422);
}

#[test]
fn ten_bit_pictures() {
    let parameters = Parameters { bits_per_component: 10, .. Parameters::default() };
    let picture = gradient(Vec2(64, 32), ColorFormat::Rgb, 10);

    let (encoded, _, decoded) = round_trip(&parameters, &picture);
    assert_eq!(encoded.compressed.config.bits_per_component, 10);
    assert_eq!(decoded.bits_per_component, 10);

    let error = picture.max_difference(&decoded).unwrap();
    assert!(error <= rgb_error_bound(10, encoded.statistics.max_qp), "off by {}", error);
}

#[test]
fn mismatching_pictures_are_rejected() {
    let setup = Parameters::default().setup(Vec2(64, 64)).unwrap();
    let picture = gradient(Vec2(64, 64), ColorFormat::YCbCr444, 8);

    let result = compress(&setup, &picture);
    assert!(matches!(result, Err(Error::Invalid(_))));
}

#[test]
fn corrupt_containers_are_rejected() {
    let picture = gradient(Vec2(64, 64), ColorFormat::Rgb, 8);
    let (_, mut bytes, _) = round_trip(&Parameters::default(), &picture);

    let truncated = &bytes[.. bytes.len() / 2];
    assert!(Compressed::read(&mut Cursor::new(truncated)).is_err());

    bytes[0] = b'E';
    assert!(matches!(Compressed::read(&mut Cursor::new(&bytes)), Err(Error::InvalidMagicNumber)));
}
