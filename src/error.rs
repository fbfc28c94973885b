
//! Error type definitions.

use std::borrow::Cow;
use std::io::ErrorKind;
pub use std::io::Error as IoError;
pub use std::io::Result as IoResult;
use std::convert::TryFrom;
use std::error;
use std::fmt;
use std::num::TryFromIntError;


/// A result that may contain a dsc error.
pub type Result<T> = std::result::Result<T, Error>;

/// A result that, if ok, contains nothing, and otherwise contains a dsc error.
pub type UnitResult = Result<()>;


/// An error that may happen while configuring, encoding or decoding a dsc stream.
///
/// `Invalid` and `NotSupported` are raised before any bit is produced,
/// they describe configurations or headers that cannot be coded.
/// The remaining variants are raised while a slice is being coded
/// and abort that slice as a whole. No partial slice is ever returned.
#[derive(Debug)]
pub enum Error {

    /// The configuration or the picture parameter set is contradicting or out of range.
    Invalid(Cow<'static, str>),

    /// The contents are valid, but this implementation does not handle them.
    NotSupported(Cow<'static, str>),

    /// The container does not start with the `DSCF` magic number.
    InvalidMagicNumber,

    /// The transformed rate control model fullness became positive.
    /// Rate control ranges or thresholds do not match the configured bit rate.
    RateControlOverflow {
        /// The transformed (scaled and offset) buffer fullness.
        model_fullness: i32,
    },

    /// The rate buffer model received more bits than it can hold.
    /// When decoding, this indicates a corrupt stream.
    BufferOverflow {
        /// The capacity of the rate buffer in bits.
        capacity: i32,

        /// The fullness that was attempted.
        fullness: i32,
    },

    /// In constant bit rate mode, the rate buffer model ran empty.
    BufferUnderflow {
        /// The (negative) fullness in bits.
        fullness: i32,
    },

    /// A slice left more bits in the rate buffer than the
    /// initial transmission delay allows.
    SliceRemainder {
        /// Bits left in the rate buffer.
        fullness: i32,

        /// The maximum number of bits allowed to remain.
        allowed: i32,
    },

    /// A bit fifo was asked to hold more bits than its capacity.
    FifoOverflow,

    /// A bit fifo was asked for more bits than it holds.
    FifoUnderflow,

    /// The compressed bytes ended before the slice was fully decoded.
    MissingBits,

    /// The underlying byte stream could not be read or written successfully.
    Io(IoError),
}


impl Error {

    /// Create an error of the variant `Invalid`.
    pub(crate) fn invalid(message: impl Into<Cow<'static, str>>) -> Self {
        Error::Invalid(message.into())
    }

    /// Create an error of the variant `NotSupported`.
    pub(crate) fn unsupported(message: impl Into<Cow<'static, str>>) -> Self {
        Error::NotSupported(message.into())
    }

    /// Whether this error was detected before any bits were coded.
    /// Such errors describe a rejected configuration, not a failed slice.
    pub fn is_configuration_error(&self) -> bool {
        matches!(self, Error::Invalid(_) | Error::NotSupported(_))
    }
}


/// Enable using the `?` operator on `std::io::Result`.
impl From<IoError> for Error {
    fn from(error: IoError) -> Self {
        if error.kind() == ErrorKind::UnexpectedEof {
            Error::MissingBits
        }
        else {
            Error::Io(error)
        }
    }
}

impl From<TryFromIntError> for Error {
    fn from(_: TryFromIntError) -> Self {
        Error::invalid("invalid size")
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match *self {
            Error::Io(ref err) => Some(err),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(err) => err.fmt(formatter),
            Error::NotSupported(message) => write!(formatter, "not supported: {}", message),
            Error::Invalid(message) => write!(formatter, "invalid: {}", message),
            Error::InvalidMagicNumber => write!(formatter, "not a dsc stream, invalid magic number"),

            Error::RateControlOverflow { model_fullness } => write!(
                formatter, "rate control model overflowed ({} bits), adjust the qp of the top ranges or lower their thresholds",
                model_fullness
            ),

            Error::BufferOverflow { capacity, fullness } => write!(
                formatter, "rate buffer overflow: size is {} bits, tried filling to {} bits",
                capacity, fullness
            ),

            Error::BufferUnderflow { fullness } => write!(
                formatter, "rate buffer underflow ({} bits), the constant bit rate is too high",
                fullness
            ),

            Error::SliceRemainder { fullness, allowed } => write!(
                formatter, "{} bits left in the rate buffer at the end of the slice, at most {} are allowed",
                fullness, allowed
            ),

            Error::FifoOverflow => write!(formatter, "bit fifo overflow"),
            Error::FifoUnderflow => write!(formatter, "bit fifo underflow"),
            Error::MissingBits => write!(formatter, "compressed data ended unexpectedly"),
        }
    }
}


/// Return error on invalid range.
#[inline]
pub(crate) fn usize_to_u16(value: usize, error_message: &'static str) -> Result<u16> {
    u16::try_from(value).map_err(|_| Error::invalid(error_message))
}


#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn unexpected_eof_means_missing_bits() {
        let io = IoError::new(ErrorKind::UnexpectedEof, "eof");
        assert!(matches!(Error::from(io), Error::MissingBits));

        let io = IoError::new(ErrorKind::PermissionDenied, "nope");
        assert!(matches!(Error::from(io), Error::Io(_)));
    }

    #[test]
    fn configuration_errors_are_distinct_from_runtime_errors() {
        assert!(Error::invalid("slice width").is_configuration_error());
        assert!(Error::unsupported("muxing").is_configuration_error());
        assert!(!Error::BufferUnderflow { fullness: -3 }.is_configuration_error());
        assert!(!Error::FifoOverflow.is_configuration_error());
    }
}
