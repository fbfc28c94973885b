
//! Display stream compression: a fixed-rate, visually lossless
//! intra-frame codec for 8, 10 and 12 bit pictures.
//!
//! Pictures are split into slices, which are coded independently
//! in groups of three pixels, so that every line of a slice
//! occupies a predictable number of bytes.
//! Use `file::compress` or `file::write_to_file` to encode a picture,
//! and `file::read_from_file` or `file::Compressed::decompress` to decode it.

#![forbid(unsafe_code)]
#![forbid(
    clippy::all,
    clippy::restriction,
    clippy::pedantic,
    clippy::nursery,
    clippy::cargo,
)]


pub mod io;
pub mod math;
pub mod compression;
pub mod meta;
pub mod image;
pub mod file;
pub mod error;

#[macro_use]
extern crate smallvec;


pub mod prelude {
    // main exports
    pub use crate::file::{
        compress, read_from_file, write_to_file,
        Compressed, CompressedSlice, EncodedPicture,
    };

    // core data types
    pub use crate::image::{ColorFormat, Picture};
    pub use crate::meta::{Config, Parameters, Setup, RangeParameters};
    pub use crate::compression::{Planes, SliceStatistics};

    // secondary data types
    pub use crate::meta;
    pub use crate::error;
    pub use crate::math::Vec2;
}
