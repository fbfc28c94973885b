
//! Compress whole pictures, and store them in a simple container.
//!
//! The container starts with the magic number `DSCF` and the 128 byte picture parameter set.
//! It is followed by the chunks of all slices, ordered by slice row,
//! then by line within the slice row, then by slice within the row.
//! With a variable bit rate, each chunk is preceded by its byte size as a big endian `u16`.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;
use smallvec::SmallVec;
use crate::compression::{decode_slice, encode_slice, ByteVec, Planes, SliceStatistics};
use crate::error::{usize_to_u16, Error, Result, UnitResult};
use crate::image::Picture;
use crate::io::{read_u16, write_u16, Read, Write};
use crate::math::Vec2;
use crate::meta::{pps, Config, Parameters, Setup};


/// The first four bytes of every container.
pub const MAGIC: [u8; 4] = *b"DSCF";


/// The coded bytes of one slice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompressedSlice {

    /// All chunks of the slice, concatenated.
    pub bytes: ByteVec,

    /// The byte size of the chunk of each slice line.
    pub chunk_sizes: Vec<usize>,
}

/// A compressed picture, as stored in the container.
#[derive(Debug, Clone, PartialEq)]
pub struct Compressed {
    pub config: Config,

    /// One entry per slice, in the order of `Config::slice_origins`.
    pub slices: Vec<CompressedSlice>,
}

/// The result of compressing a picture.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedPicture {
    pub compressed: Compressed,

    /// The picture that a decoder will reconstruct.
    pub reconstructed: Picture,

    /// The counters of all slices combined.
    pub statistics: SliceStatistics,
}


/// Encode all slices of the picture.
/// Uses multiple threads if the `rayon` feature is enabled.
pub fn compress(setup: &Setup, picture: &Picture) -> Result<EncodedPicture> {
    let config = &setup.config;
    let planes = picture.to_planes(config)?;
    let origins: Vec<Vec2<usize>> = config.slice_origins().collect();

    let encoded = for_each_slice(origins.len(), |index| encode_slice(setup, &planes, origins[index]))?;

    let mut reconstructed = Planes::new(config.picture_size);
    let mut statistics = SliceStatistics::default();
    let mut slices = Vec::with_capacity(encoded.len());

    for (&origin, slice) in origins.iter().zip(encoded) {
        reconstructed.insert(origin, &slice.reconstructed);
        statistics = statistics.merge(slice.statistics);
        slices.push(CompressedSlice { bytes: slice.bytes, chunk_sizes: slice.chunk_sizes });
    }

    log::info!(
        "compressed {}x{} pixels in {} slices, max qp {}",
        config.picture_size.width(), config.picture_size.height(), slices.len(), statistics.max_qp
    );

    Ok(EncodedPicture {
        compressed: Compressed { config: config.clone(), slices },
        reconstructed: Picture::from_planes(&reconstructed, config),
        statistics,
    })
}


impl Compressed {

    /// Decode all slices into a picture.
    /// Uses multiple threads if the `rayon` feature is enabled.
    pub fn decompress(&self) -> Result<Picture> {
        let setup = Setup::for_decoding(self.config.clone())?;
        let config = &setup.config;
        let origins: Vec<Vec2<usize>> = config.slice_origins().collect();

        if origins.len() != self.slices.len() {
            return Err(Error::invalid("slice count does not match the configuration"));
        }

        let decoded = for_each_slice(origins.len(), |index| decode_slice(&setup, &self.slices[index].bytes))?;

        let mut planes = Planes::new(config.picture_size);
        for (&origin, slice) in origins.iter().zip(decoded.iter()) {
            planes.insert(origin, slice);
        }

        Ok(Picture::from_planes(&planes, config))
    }

    /// Write the container to a byte stream. Consider using a buffered writer.
    pub fn write(&self, write: &mut impl Write) -> UnitResult {
        let config = &self.config;
        let height = config.slice_size.height();

        if self.slices.len() != config.slices_per_line() * config.slice_rows() {
            return Err(Error::invalid("slice count does not match the configuration"));
        }

        for slice in &self.slices {
            let sum: usize = slice.chunk_sizes.iter().sum();

            if slice.chunk_sizes.len() != height || sum != slice.bytes.len() {
                return Err(Error::invalid("chunk sizes do not match the slice"));
            }

            if !config.vbr && slice.chunk_sizes.iter().any(|&size| size != config.chunk_size) {
                return Err(Error::invalid("constant bit rate chunks must have the configured size"));
            }
        }

        write.write_all(&MAGIC)?;
        write.write_all(&pps::write(config)?)?;

        for row in self.slices.chunks(config.slices_per_line()) {
            let mut offsets: SmallVec<[usize; 8]> = smallvec![ 0; row.len() ];

            for line in 0 .. height {
                for (slice, offset) in row.iter().zip(offsets.iter_mut()) {
                    let size = slice.chunk_sizes[line];

                    if config.vbr {
                        write_u16(write, usize_to_u16(size, "chunk size")?)?;
                    }

                    write.write_all(&slice.bytes[*offset .. *offset + size])?;
                    *offset += size;
                }
            }
        }

        Ok(())
    }

    /// Read the container from a byte stream. Consider using a buffered reader.
    pub fn read(read: &mut impl Read) -> Result<Self> {
        let mut magic = [0_u8; 4];
        read.read_exact(&mut magic)?;

        if magic != MAGIC {
            return Err(Error::InvalidMagicNumber);
        }

        let mut parameter_set = [0_u8; pps::BYTE_SIZE];
        read.read_exact(&mut parameter_set)?;

        let config = pps::read(&parameter_set)?;
        config.validate()?;

        let height = config.slice_size.height();
        let mut slices = Vec::with_capacity(config.slices_per_line() * config.slice_rows());

        for _ in 0 .. config.slice_rows() {
            let mut row: SmallVec<[CompressedSlice; 8]> = (0 .. config.slices_per_line())
                .map(|_| CompressedSlice { bytes: Vec::new(), chunk_sizes: Vec::new() })
                .collect();

            for _ in 0 .. height {
                for slice in &mut row {
                    let size =
                        if config.vbr { usize::from(read_u16(read)?) }
                        else { config.chunk_size };

                    let start = slice.bytes.len();
                    slice.bytes.resize(start + size, 0);
                    read.read_exact(&mut slice.bytes[start ..])?;
                    slice.chunk_sizes.push(size);
                }
            }

            slices.extend(row);
        }

        log::debug!("read {} slices of {} lines", slices.len(), height);
        Ok(Compressed { config, slices })
    }
}


/// Compress the picture and write the container to a file.
/// The parameters must match the colour format and bit depth of the picture.
pub fn write_to_file(path: impl AsRef<Path>, parameters: &Parameters, picture: &Picture) -> Result<EncodedPicture> {
    let setup = parameters.setup(picture.size)?;
    let encoded = compress(&setup, picture)?;

    let mut file = BufWriter::new(File::create(path)?);
    encoded.compressed.write(&mut file)?;
    file.flush()?;

    Ok(encoded)
}

/// Read a container from a file and decode the picture.
pub fn read_from_file(path: impl AsRef<Path>) -> Result<Picture> {
    let mut file = BufReader::new(File::open(path)?);
    Compressed::read(&mut file)?.decompress()
}


/// Code each slice, returning the results in slice order.
/// The first error of any slice aborts the whole picture.
#[cfg(feature = "rayon")]
fn for_each_slice<T: Send>(count: usize, code: impl Fn(usize) -> Result<T> + Sync) -> Result<Vec<T>> {
    if count < 2 {
        return (0 .. count).map(&code).collect();
    }

    let pool = rayon_core::ThreadPoolBuilder::new()
        .thread_name(|index| format!("Slice Coder Thread #{}", index))
        .build();

    // thread pools are not available on every platform
    let pool = match pool {
        Ok(pool) => pool,
        Err(error) => {
            log::warn!("coding slices sequentially, no thread pool: {}", error);
            return (0 .. count).map(&code).collect();
        }
    };

    let (sender, receiver) = std::sync::mpsc::channel();
    let code = &code;

    pool.scope(move |scope| {
        for index in 0 .. count {
            let sender = sender.clone();

            scope.spawn(move |_| {
                // the receiver outlives the scope
                let _ = sender.send((index, code(index)));
            });
        }
    });

    let mut results: Vec<Option<T>> = (0 .. count).map(|_| None).collect();
    for (index, result) in receiver.try_iter() {
        results[index] = Some(result?);
    }

    results.into_iter()
        .map(|result| result.ok_or_else(|| Error::invalid("slice was not coded")))
        .collect()
}

/// Code each slice, returning the results in slice order.
#[cfg(not(feature = "rayon"))]
fn for_each_slice<T>(count: usize, code: impl Fn(usize) -> Result<T>) -> Result<Vec<T>> {
    (0 .. count).map(code).collect()
}


#[cfg(test)]
mod test {
    use super::*;
    use crate::image::ColorFormat;
    use std::io::Cursor;

    fn picture(size: Vec2<usize>) -> Picture {
        Picture::from_fn(size, ColorFormat::Rgb, 8, |channel, Vec2(x, y)| {
            ((x * (channel + 1) * 5 + y * 3) % 256) as u16
        })
    }

    fn round_trip(parameters: Parameters, size: Vec2<usize>) {
        let setup = parameters.setup(size).unwrap();
        let source = picture(size);
        let encoded = compress(&setup, &source).unwrap();

        let mut bytes = Vec::new();
        encoded.compressed.write(&mut bytes).unwrap();
        assert_eq!(&bytes[.. 4], b"DSCF");

        let compressed = Compressed::read(&mut Cursor::new(&bytes)).unwrap();
        assert_eq!(compressed, encoded.compressed);

        let decoded = compressed.decompress().unwrap();
        assert_eq!(decoded, encoded.reconstructed);
    }

    #[test]
    fn constant_bit_rate_container() {
        let parameters = Parameters { slice_size: Some(Vec2(32, 32)), .. Parameters::default() };
        round_trip(parameters, Vec2(64, 64));
    }

    #[test]
    fn variable_bit_rate_container() {
        let parameters = Parameters { slice_size: Some(Vec2(32, 32)), vbr: true, .. Parameters::default() };
        round_trip(parameters, Vec2(64, 64));
    }

    #[test]
    fn constant_bit_rate_container_size() {
        let setup = Parameters::default().setup(Vec2(64, 64)).unwrap();
        let encoded = compress(&setup, &picture(Vec2(64, 64))).unwrap();

        let mut bytes = Vec::new();
        encoded.compressed.write(&mut bytes).unwrap();
        assert_eq!(bytes.len(), 4 + pps::BYTE_SIZE + 64 * setup.config.chunk_size);
    }

    #[test]
    fn invalid_magic_number() {
        let bytes = b"DSCX and some more bytes";
        let result = Compressed::read(&mut Cursor::new(&bytes[..]));
        assert!(matches!(result, Err(Error::InvalidMagicNumber)));
    }

    #[test]
    fn truncated_container() {
        let setup = Parameters::default().setup(Vec2(64, 64)).unwrap();
        let encoded = compress(&setup, &picture(Vec2(64, 64))).unwrap();

        let mut bytes = Vec::new();
        encoded.compressed.write(&mut bytes).unwrap();
        bytes.truncate(bytes.len() - 10);

        let result = Compressed::read(&mut Cursor::new(&bytes));
        assert!(matches!(result, Err(Error::MissingBits)));
    }

    #[test]
    fn header_of_a_huge_picture_without_chunks() {
        let parameters = Parameters { slice_size: Some(Vec2(1920, 108)), .. Parameters::default() };
        let setup = parameters.setup(Vec2(1920, 1080)).unwrap();

        let mut bytes = MAGIC.to_vec();
        bytes.extend_from_slice(&pps::write(&setup.config).unwrap());
        bytes.extend_from_slice(&[ 0; 100 ]);

        let result = Compressed::read(&mut Cursor::new(&bytes));
        assert!(matches!(result, Err(Error::MissingBits)));
    }

    #[test]
    fn inconsistent_chunks_are_not_written() {
        let setup = Parameters::default().setup(Vec2(64, 64)).unwrap();
        let mut encoded = compress(&setup, &picture(Vec2(64, 64))).unwrap();
        encoded.compressed.slices[0].chunk_sizes.pop();

        assert!(encoded.compressed.write(&mut Vec::new()).is_err());
    }
}
