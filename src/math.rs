
//! Simple math utilities.

/// A size or a position, in pixels or samples.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub struct Vec2<T> (pub T, pub T);

impl<T: Copy> Vec2<T> {

    /// Number of pixels within a size.
    pub fn area(self) -> T where T: std::ops::Mul<T, Output = T> {
        self.0 * self.1
    }

    pub fn width(self) -> T { self.0 }
    pub fn height(self) -> T { self.1 }

    pub fn x(self) -> T { self.0 }
    pub fn y(self) -> T { self.1 }
}


/// The number of bits needed to write the unsigned number,
/// which is `floor(log2(x)) + 1`. Returns 0 where argument is 0.
pub(crate) fn bit_length(number: i32) -> i32 {
    debug_assert!(number >= 0, "bit length of negative number");
    32 - (number as u32).leading_zeros() as i32
}


/// Round up or down in specific calculations.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum RoundingMode {

    /// Round down.
    Down,

    /// Round up.
    Up,
}

impl RoundingMode {

    /// Divide two non-negative numbers.
    pub(crate) fn divide(self, dividend: i64, divisor: i64) -> i64 {
        debug_assert!(dividend >= 0 && divisor > 0, "rounded division of negative numbers");

        match self {
            RoundingMode::Up => (dividend + divisor - 1) / divisor,
            RoundingMode::Down => dividend / divisor,
        }
    }
}
