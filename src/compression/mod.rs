
//! Contains the slice codec and the types it operates on.
//! Each slice is coded on its own, so slices can be processed in parallel.


pub mod tables;

// private modules make non-breaking changes easier
mod state;
mod predict;
mod history;
mod flatness;
mod rate;
mod vlc;
mod slice;

pub use flatness::Flatness;
pub use predict::Predictor;

use crate::error::{Error, Result};
use crate::math::Vec2;
use crate::meta::Setup;
use self::slice::{code_slice, Decoder, Encoder};
use self::state::{CodecState, GroupState};
use self::tables::COMPONENTS;


/// A byte vector.
pub type ByteVec = Vec<u8>;

/// A byte slice.
pub type Bytes<'s> = &'s [u8];


/// Three equally sized planes of samples in the coding domain.
/// For rgb pictures these are the luma and the two chroma
/// planes after the reversible colour conversion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Planes {

    /// Width and height of each plane.
    pub size: Vec2<usize>,

    /// The samples of each plane, row by row.
    pub samples: [Vec<u16>; COMPONENTS],
}

impl Planes {

    /// Planes of the specified size, filled with zero.
    pub fn new(size: Vec2<usize>) -> Self {
        Self::from_fn(size, |_, _| 0)
    }

    /// Compute each sample from its component index and position.
    pub fn from_fn(size: Vec2<usize>, sample: impl Fn(usize, Vec2<usize>) -> u16) -> Self {
        let plane = |component: usize| {
            (0 .. size.height())
                .flat_map(|y| (0 .. size.width()).map(move |x| Vec2(x, y)))
                .map(|position| sample(component, position))
                .collect()
        };

        Self { size, samples: [ plane(0), plane(1), plane(2) ] }
    }

    #[inline]
    pub fn get(&self, component: usize, position: Vec2<usize>) -> u16 {
        self.samples[component][position.y() * self.size.width() + position.x()]
    }

    #[inline]
    pub fn set(&mut self, component: usize, position: Vec2<usize>, value: u16) {
        let width = self.size.width();
        self.samples[component][position.y() * width + position.x()] = value;
    }

    /// Copy the other planes into these, with their top left corner at `origin`.
    /// Samples outside of these planes are skipped.
    pub fn insert(&mut self, origin: Vec2<usize>, other: &Planes) {
        let width = other.size.width().min(self.size.width().saturating_sub(origin.x()));
        let height = other.size.height().min(self.size.height().saturating_sub(origin.y()));

        for component in 0 .. COMPONENTS {
            for y in 0 .. height {
                let source_start = y * other.size.width();
                let target_start = (origin.y() + y) * self.size.width() + origin.x();

                self.samples[component][target_start .. target_start + width]
                    .copy_from_slice(&other.samples[component][source_start .. source_start + width]);
            }
        }
    }
}


/// Counters that describe how a slice was coded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SliceStatistics {

    /// Number of coded groups.
    pub groups: usize,

    /// The highest qp that any group was coded with.
    pub max_qp: i32,

    /// Groups that were coded as history indices.
    pub history_groups: usize,

    /// Units that were coded with the midpoint predictor.
    pub midpoint_units: usize,

    /// Groups that received the flatness qp adjustment.
    pub flat_groups: usize,

    /// The highest fullness of the rate buffer model, in bits.
    pub max_buffer_fullness: i32,
}

impl SliceStatistics {

    pub(crate) fn account_group(&mut self, group: &GroupState, flat: bool) {
        self.groups += 1;
        self.max_qp = self.max_qp.max(group.previous_master_qp);

        if flat { self.flat_groups += 1; }

        if group.history_selected {
            self.history_groups += 1;
        }
        else {
            self.midpoint_units += group.midpoint_selected.iter().filter(|&&midpoint| midpoint).count();
        }
    }

    /// Combine the counters of two slices.
    pub fn merge(self, other: Self) -> Self {
        Self {
            groups: self.groups + other.groups,
            max_qp: self.max_qp.max(other.max_qp),
            history_groups: self.history_groups + other.history_groups,
            midpoint_units: self.midpoint_units + other.midpoint_units,
            flat_groups: self.flat_groups + other.flat_groups,
            max_buffer_fullness: self.max_buffer_fullness.max(other.max_buffer_fullness),
        }
    }
}


/// The result of encoding one slice.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedSlice {

    /// The coded slice, padded to the sum of all chunk sizes.
    pub bytes: ByteVec,

    /// The byte size of the chunk that is transmitted with each slice line.
    /// With a constant bit rate, all chunks have the configured chunk size.
    pub chunk_sizes: Vec<usize>,

    /// Number of bits that the groups of the slice occupy, without padding.
    pub bit_count: usize,

    /// The samples that a decoder will reconstruct, of slice size.
    pub reconstructed: Planes,

    pub statistics: SliceStatistics,
}


/// Encode the slice at `origin` of the source planes,
/// which must be of the picture size of the configuration.
pub fn encode_slice(setup: &Setup, source: &Planes, origin: Vec2<usize>) -> Result<EncodedSlice> {
    let config = &setup.config;

    if source.size != config.picture_size {
        return Err(Error::invalid("source planes do not match the picture size"));
    }

    if origin.x() >= config.picture_size.width() || origin.y() >= config.picture_size.height() {
        return Err(Error::invalid("slice origin outside of the picture"));
    }

    let mut state = CodecState::new(setup)?;
    let mut encoder = Encoder::new(source, origin, config.slice_byte_capacity());

    let (reconstructed, statistics) = code_slice(&mut state, &mut encoder)?;
    let (bytes, chunk_sizes, bit_count) = encoder.finish(&mut state)?;

    log::debug!(
        "encoded slice at {:?}: {} bits in {} bytes, max qp {}, {} history groups, {} midpoint units",
        origin, bit_count, bytes.len(), statistics.max_qp, statistics.history_groups, statistics.midpoint_units
    );

    Ok(EncodedSlice { bytes, chunk_sizes, bit_count, reconstructed, statistics })
}

/// Decode the bytes of one slice, which must contain all chunks of the slice in order.
/// Returns planes of the slice size.
pub fn decode_slice(setup: &Setup, bytes: Bytes<'_>) -> Result<Planes> {
    let mut state = CodecState::new(setup)?;
    let mut decoder = Decoder::new(bytes);

    let (planes, statistics) = code_slice(&mut state, &mut decoder)?;

    log::trace!(
        "decoded slice: {} of {} bytes consumed, max qp {}",
        (decoder.bit_count() + 7) / 8, bytes.len(), statistics.max_qp
    );

    Ok(planes)
}


#[cfg(test)]
mod test {
    use super::*;
    use crate::meta::{Parameters, RangeParameters};
    use rand::{Rng, SeedableRng};
    use rand::rngs::StdRng;

    fn gradient(size: Vec2<usize>) -> Planes {
        Planes::from_fn(size, |component, Vec2(x, y)| {
            let value = x * 3 + y * 2 + component * 40;
            if component == 0 { (value % 256) as u16 } else { (value % 512) as u16 }
        })
    }

    fn noise(size: Vec2<usize>, seed: u64) -> Planes {
        let mut random = StdRng::seed_from_u64(seed);
        let mut planes = Planes::new(size);

        for component in 0 .. COMPONENTS {
            let max = if component == 0 { 256 } else { 512 };
            for sample in &mut planes.samples[component] {
                *sample = random.random_range(0 .. max);
            }
        }

        planes
    }

    /// Every qp is forced to zero, with a rate buffer that still fits an 8x8 picture.
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
    fn decoder_reconstructs_what_the_encoder_predicted() {
        let size = Vec2(64, 64);
        let setup = Parameters::default().setup(size).unwrap();

        for source in &[ gradient(size), noise(size, 1) ] {
            let encoded = encode_slice(&setup, source, Vec2(0, 0)).unwrap();
            assert_eq!(encoded.bytes.len(), setup.config.slice_byte_capacity());
            assert!(encoded.bit_count <= encoded.bytes.len() * 8);

            let decoding = Setup::for_decoding(setup.config.clone()).unwrap();
            let decoded = decode_slice(&decoding, &encoded.bytes).unwrap();
            assert_eq!(decoded, encoded.reconstructed);
        }
    }

    #[test]
    fn encoding_is_deterministic() {
        let size = Vec2(64, 64);
        let setup = Parameters::default().setup(size).unwrap();
        let source = noise(size, 2);

        let first = encode_slice(&setup, &source, Vec2(0, 0)).unwrap();
        let second = encode_slice(&setup, &source, Vec2(0, 0)).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn noise_raises_the_qp() {
        let size = Vec2(64, 64);
        let setup = Parameters::default().setup(size).unwrap();

        let noisy = encode_slice(&setup, &noise(size, 3), Vec2(0, 0)).unwrap();
        assert!(noisy.statistics.max_qp > 0);
        assert!(noisy.statistics.max_buffer_fullness <= setup.rcb_bits);
        assert_eq!(noisy.statistics.groups, 22 * 64);
    }

    #[test]
    fn constant_planes_are_lossless() {
        let size = Vec2(64, 64);
        let setup = Parameters::default().setup(size).unwrap();
        let source = Planes::from_fn(size, |component, _| if component == 0 { 90 } else { 300 });

        let encoded = encode_slice(&setup, &source, Vec2(0, 0)).unwrap();
        assert!(encoded.statistics.flat_groups > 0);
        assert_eq!(encoded.reconstructed, source);

        let decoded = decode_slice(&Setup::for_decoding(setup.config.clone()).unwrap(), &encoded.bytes).unwrap();
        assert_eq!(decoded, source);
    }

    #[test]
    fn flatness_is_signalled_after_noise() {
        let size = Vec2(192, 96);
        let noisy = noise(size, 4);
        let source = Planes::from_fn(size, |component, position| {
            if position.y() < 32 { noisy.get(component, position) }
            else if component == 0 { 120 }
            else { 260 }
        });

        for &vbr in &[ false, true ] {
            let setup = Parameters { vbr, .. Parameters::default() }.setup(size).unwrap();
            let encoded = encode_slice(&setup, &source, Vec2(0, 0)).unwrap();
            assert!(encoded.statistics.flat_groups > 0);

            let decoded = decode_slice(&Setup::for_decoding(setup.config.clone()).unwrap(), &encoded.bytes).unwrap();
            assert_eq!(decoded, encoded.reconstructed);
        }
    }

    #[test]
    fn reconstruction_error_is_bounded_by_the_quantizer() {
        let size = Vec2(64, 64);
        let setup = Parameters::default().setup(size).unwrap();
        let tables = tables::QuantTables::for_bits_per_component(8).unwrap();

        for source in &[ gradient(size), noise(size, 5) ] {
            let encoded = encode_slice(&setup, source, Vec2(0, 0)).unwrap();

            // history entries are checked at a qp two above
            let qp = (encoded.statistics.max_qp + 2).min(tables.max_qp());

            for component in 0 .. COMPONENTS {
                let step = tables::QUANT_DIVISOR[tables.level(qp, component) as usize];

                let error = source.samples[component].iter()
                    .zip(encoded.reconstructed.samples[component].iter())
                    .map(|(&own, &other)| (i32::from(own) - i32::from(other)).abs())
                    .max().unwrap();

                assert!(error <= step, "component {} is off by {} at qp {}", component, error, qp);
            }
        }
    }

    #[test]
    fn forced_zero_qp_is_lossless() {
        let size = Vec2(8, 8);
        let setup = lossless_parameters().setup(size).unwrap();
        let source = Planes::from_fn(size, |component, _| [ 140, 250, 260 ][component]);

        let encoded = encode_slice(&setup, &source, Vec2(0, 0)).unwrap();
        assert_eq!(encoded.statistics.max_qp, 0);
        assert_eq!(encoded.reconstructed, source);

        let decoded = decode_slice(&Setup::for_decoding(setup.config.clone()).unwrap(), &encoded.bytes).unwrap();
        assert_eq!(decoded, source);
    }

    #[test]
    fn variable_bit_rate_chunks_cover_the_slice() {
        let size = Vec2(64, 16);
        let parameters = Parameters { vbr: true, .. Parameters::default() };
        let setup = parameters.setup(size).unwrap();
        let source = gradient(size);

        let encoded = encode_slice(&setup, &source, Vec2(0, 0)).unwrap();
        assert_eq!(encoded.chunk_sizes.len(), 16);
        assert_eq!(encoded.chunk_sizes.iter().sum::<usize>(), encoded.bytes.len());
        assert!(encoded.bytes.len() * 8 >= encoded.bit_count);

        let decoded = decode_slice(&Setup::for_decoding(setup.config.clone()).unwrap(), &encoded.bytes).unwrap();
        assert_eq!(decoded, encoded.reconstructed);
    }

    #[test]
    fn slices_beyond_the_picture_edge() {
        let size = Vec2(40, 40);
        let parameters = Parameters { slice_size: Some(Vec2(30, 32)), .. Parameters::default() };
        let setup = parameters.setup(size).unwrap();
        let source = gradient(size);

        let encoded = encode_slice(&setup, &source, Vec2(30, 32)).unwrap();
        assert_eq!(encoded.reconstructed.size, Vec2(30, 32));

        let decoded = decode_slice(&Setup::for_decoding(setup.config.clone()).unwrap(), &encoded.bytes).unwrap();
        assert_eq!(decoded, encoded.reconstructed);

        assert!(encode_slice(&setup, &source, Vec2(60, 0)).is_err());
        assert!(encode_slice(&setup, &gradient(Vec2(30, 32)), Vec2(0, 0)).is_err());
    }

    #[test]
    fn truncated_slices_are_rejected() {
        let size = Vec2(64, 64);
        let setup = Parameters::default().setup(size).unwrap();
        let encoded = encode_slice(&setup, &noise(size, 4), Vec2(0, 0)).unwrap();

        let decoding = Setup::for_decoding(setup.config.clone()).unwrap();
        let result = decode_slice(&decoding, &encoded.bytes[.. 100]);
        assert!(result.is_err());
        assert!(!result.unwrap_err().is_configuration_error());
    }

    #[test]
    fn insert_clips_at_the_edge() {
        let mut target = Planes::new(Vec2(4, 3));
        let source = Planes::from_fn(Vec2(3, 3), |_, Vec2(x, y)| (y * 3 + x + 1) as u16);

        target.insert(Vec2(2, 1), &source);
        assert_eq!(target.samples[0], vec![ 0, 0, 0, 0,  0, 0, 1, 2,  0, 0, 4, 5 ]);
    }
}
