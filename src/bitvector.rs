//! Fixed-width twos-complement values
//!
//! Bit indices are MSB-first: index 0 is the most significant bit, matching
//! the way instruction fields are numbered.

use std::fmt;
use std::ops::{BitAnd, BitOr, Not};

use crate::error::BitVectorError;

/// Width of a machine word (instructions, memory cells, general registers)
pub const WORD_WIDTH: u32 = 20;
/// Width of the PC, MAR and index registers
pub const ADDRESS_WIDTH: u32 = 13;
/// Width of the machine fault register
pub const FAULT_WIDTH: u32 = 4;
/// Width of MLT/DVD results
pub const PRODUCT_WIDTH: u32 = 40;

/// A word is simply a 20-bit vector
pub type Word = BitVector;

pub const MAX_WIDTH: u32 = 64;

fn mask(width: u32) -> u64 {
    if width >= 64 {
        u64::MAX
    } else {
        (1u64 << width) - 1
    }
}

fn check_width(width: u32) -> Result<(), BitVectorError> {
    if (1..=MAX_WIDTH).contains(&width) {
        Ok(())
    } else {
        Err(BitVectorError::InvalidWidth(width))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Left,
    Right,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShiftMode {
    Logical,
    Arithmetic,
}

/// Fixed-width (1-64 bit) value.
///
/// The accepted range is asymmetric: `-(2^(n-1) - 1)` through `2^n - 1`,
/// one negative value short of ordinary twos-complement.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct BitVector {
    width: u32,
    bits: u64,
}

impl BitVector {
    /// Builds a vector holding `value`, rejecting anything outside
    /// `min_signed(width)..=max_unsigned(width)`.
    pub fn new(width: u32, value: i128) -> Result<Self, BitVectorError> {
        check_width(width)?;
        let (min, max) = (Self::min_signed(width), Self::max_unsigned(width));
        if value < min || value > max {
            return Err(BitVectorError::OutOfRange {
                value,
                width,
                min,
                max,
            });
        }
        Ok(Self {
            width,
            bits: (value as u128 as u64) & mask(width),
        })
    }

    /// Builds a vector from raw bits, keeping only the low `width` bits.
    /// Panics on an invalid width; widths are compile-time constants in
    /// the datapath.
    pub fn from_bits(width: u32, bits: u64) -> Self {
        assert!((1..=MAX_WIDTH).contains(&width), "invalid width {width}");
        Self {
            width,
            bits: bits & mask(width),
        }
    }

    pub fn zero(width: u32) -> Self {
        Self::from_bits(width, 0)
    }

    /// Builds a 20-bit word
    pub fn word(value: i128) -> Result<Self, BitVectorError> {
        Self::new(WORD_WIDTH, value)
    }

    /// Largest signed value: 2^(n-1) - 1
    pub fn max_signed(width: u32) -> i128 {
        (1i128 << (width - 1)) - 1
    }

    /// Smallest accepted value: -(2^(n-1) - 1)
    pub fn min_signed(width: u32) -> i128 {
        -Self::max_signed(width)
    }

    /// Largest unsigned value: 2^n - 1
    pub fn max_unsigned(width: u32) -> i128 {
        (1i128 << width) - 1
    }

    /// Parses a binary string; spaces are ignored so fields can be grouped.
    /// The width is the number of digits.
    pub fn from_binary_string(binary: &str) -> Result<Self, BitVectorError> {
        let mut bits = 0u64;
        let mut width = 0usize;
        for c in binary.chars().filter(|c| *c != ' ') {
            let digit = match c {
                '0' => 0,
                '1' => 1,
                other => return Err(BitVectorError::InvalidDigit(other)),
            };
            width += 1;
            if width > MAX_WIDTH as usize {
                return Err(BitVectorError::TooLong(
                    binary.chars().filter(|c| *c != ' ').count(),
                ));
            }
            bits = (bits << 1) | digit;
        }
        if width == 0 {
            return Err(BitVectorError::Empty);
        }
        Ok(Self::from_bits(width as u32, bits))
    }

    /// Builds a vector from an MSB-first array of 0/1 digits
    pub fn from_bit_array(digits: &[u8]) -> Result<Self, BitVectorError> {
        if digits.is_empty() {
            return Err(BitVectorError::Empty);
        }
        if digits.len() > MAX_WIDTH as usize {
            return Err(BitVectorError::TooLong(digits.len()));
        }
        let mut bits = 0u64;
        for digit in digits {
            match digit {
                0 | 1 => bits = (bits << 1) | *digit as u64,
                other => {
                    return Err(BitVectorError::InvalidDigit(
                        char::from_digit(*other as u32, 10).unwrap_or('?'),
                    ))
                }
            }
        }
        Ok(Self::from_bits(digits.len() as u32, bits))
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn unsigned(&self) -> u64 {
        self.bits
    }

    /// Twos-complement reading of the bits
    pub fn signed(&self) -> i64 {
        let shift = 64 - self.width;
        ((self.bits << shift) as i64) >> shift
    }

    pub fn is_zero(&self) -> bool {
        self.bits == 0
    }

    pub fn to_binary_string(&self) -> String {
        (0..self.width)
            .map(|i| if self.bit_unchecked(i) { '1' } else { '0' })
            .collect()
    }

    /// MSB-first array of 0/1 digits
    pub fn to_bit_array(&self) -> Vec<u8> {
        (0..self.width).map(|i| self.bit_unchecked(i) as u8).collect()
    }

    fn bit_unchecked(&self, index: u32) -> bool {
        (self.bits >> (self.width - 1 - index)) & 1 == 1
    }

    /// Reads one bit, MSB-first
    pub fn bit(&self, index: u32) -> Result<bool, BitVectorError> {
        if index >= self.width {
            return Err(BitVectorError::IndexOutOfRange {
                start: index,
                stop: index,
                width: self.width,
            });
        }
        Ok(self.bit_unchecked(index))
    }

    /// Extracts bits `start..=stop` (MSB-first) as a new, narrower vector
    pub fn decompose(
        &self,
        start: u32,
        stop: u32,
    ) -> Result<Self, BitVectorError> {
        if start > stop || stop >= self.width {
            return Err(BitVectorError::IndexOutOfRange {
                start,
                stop,
                width: self.width,
            });
        }
        let width = stop - start + 1;
        let shift = self.width - 1 - stop;
        Ok(Self::from_bits(width, self.bits >> shift))
    }

    /// Zero-extends or truncates (keeping the low bits) to `width`
    pub fn resize(&self, width: u32) -> Self {
        Self::from_bits(width, self.bits)
    }

    /// Sign-extends or truncates to `width`
    pub fn sign_extend(&self, width: u32) -> Self {
        Self::from_bits(width, self.signed() as u64)
    }

    pub fn shift(
        &self,
        direction: Direction,
        count: u32,
        mode: ShiftMode,
    ) -> Self {
        let bits = match direction {
            Direction::Left if count >= self.width => 0,
            Direction::Left => self.bits << count,
            Direction::Right => match mode {
                ShiftMode::Logical if count >= self.width => 0,
                ShiftMode::Logical => self.bits >> count,
                ShiftMode::Arithmetic => {
                    (self.signed() >> count.min(63)) as u64
                }
            },
        };
        Self::from_bits(self.width, bits)
    }

    pub fn rotate(&self, direction: Direction, count: u32) -> Self {
        let count = count % self.width;
        if count == 0 {
            return *self;
        }
        let bits = match direction {
            Direction::Left => {
                (self.bits << count) | (self.bits >> (self.width - count))
            }
            Direction::Right => {
                (self.bits >> count) | (self.bits << (self.width - count))
            }
        };
        Self::from_bits(self.width, bits)
    }
}

impl Not for BitVector {
    type Output = BitVector;

    fn not(self) -> Self::Output {
        Self::from_bits(self.width, !self.bits)
    }
}

// Mixed widths zero-extend the narrower operand.
impl BitAnd for BitVector {
    type Output = BitVector;

    fn bitand(self, rhs: Self) -> Self::Output {
        Self::from_bits(self.width.max(rhs.width), self.bits & rhs.bits)
    }
}

impl BitOr for BitVector {
    type Output = BitVector;

    fn bitor(self, rhs: Self) -> Self::Output {
        Self::from_bits(self.width.max(rhs.width), self.bits | rhs.bits)
    }
}

impl fmt::Display for BitVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_binary_string())
    }
}

impl fmt::Debug for BitVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "BitVector({}){{b10={}, b2={}}}",
            self.width,
            self.signed(),
            self.to_binary_string()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn width_and_value() -> impl Strategy<Value = (u32, i128)> {
        (1u32..=64).prop_flat_map(|width| {
            (
                Just(width),
                BitVector::min_signed(width)..=BitVector::max_unsigned(width),
            )
        })
    }

    proptest! {
        #[test]
        fn test_value_round_trip((width, value) in width_and_value()) {
            let vector = BitVector::new(width, value).unwrap();
            if value < 0 {
                prop_assert_eq!(vector.signed() as i128, value);
            } else {
                prop_assert_eq!(vector.unsigned() as i128, value);
            }
        }

        #[test]
        fn test_binary_string_round_trip(binary in "[01]{1,64}") {
            let vector = BitVector::from_binary_string(&binary).unwrap();
            prop_assert_eq!(vector.width() as usize, binary.len());
            prop_assert_eq!(vector.to_binary_string(), binary);
        }

        #[test]
        fn test_bit_array_round_trip(
            digits in prop::collection::vec(0u8..=1, 1..=64)
        ) {
            let vector = BitVector::from_bit_array(&digits).unwrap();
            prop_assert_eq!(vector.width() as usize, digits.len());
            prop_assert_eq!(vector.to_bit_array(), digits);
        }
    }

    #[test]
    fn test_bit_array() {
        let v = BitVector::from_bit_array(&[1, 0, 1, 1]).unwrap();
        assert_eq!(v.to_binary_string(), "1011");
        assert_eq!(v.unsigned(), 11);
        assert_eq!(
            BitVector::from_bit_array(&[1, 2]),
            Err(BitVectorError::InvalidDigit('2'))
        );
        assert_eq!(BitVector::from_bit_array(&[]), Err(BitVectorError::Empty));
        assert_eq!(
            BitVector::from_bit_array(&[0; 65]),
            Err(BitVectorError::TooLong(65))
        );
    }

    #[test]
    fn test_asymmetric_range() {
        assert_eq!(BitVector::max_signed(5), 15);
        assert_eq!(BitVector::min_signed(5), -15);
        assert_eq!(BitVector::max_unsigned(5), 31);
        assert!(BitVector::new(5, -15).is_ok());
        assert!(BitVector::new(5, 31).is_ok());
        assert_eq!(
            BitVector::new(5, -16),
            Err(BitVectorError::OutOfRange {
                value: -16,
                width: 5,
                min: -15,
                max: 31,
            })
        );
        assert!(BitVector::new(5, 32).is_err());
        // One bit: only 0 and 1
        assert!(BitVector::new(1, -1).is_err());
        assert_eq!(BitVector::new(1, 1).unwrap().unsigned(), 1);
    }

    #[test]
    fn test_invalid_width() {
        assert_eq!(BitVector::new(0, 0), Err(BitVectorError::InvalidWidth(0)));
        assert_eq!(
            BitVector::new(65, 0),
            Err(BitVectorError::InvalidWidth(65))
        );
    }

    #[test]
    fn test_full_width_extremes() {
        let top = BitVector::new(64, BitVector::max_unsigned(64)).unwrap();
        assert_eq!(top.unsigned(), u64::MAX);
        let bottom = BitVector::new(64, BitVector::min_signed(64)).unwrap();
        assert_eq!(bottom.signed(), i64::MIN + 1);
    }

    #[test]
    fn test_negative_binary() {
        let v = BitVector::new(5, -1).unwrap();
        assert_eq!(v.to_binary_string(), "11111");
        assert_eq!(v.unsigned(), 31);
        assert_eq!(v.to_bit_array(), vec![1, 1, 1, 1, 1]);
    }

    #[test]
    fn test_binary_string_with_spaces() {
        let v =
            BitVector::from_binary_string("000001 11 00 1 0 00110100").unwrap();
        assert_eq!(v.width(), WORD_WIDTH);
        assert_eq!(v.to_binary_string(), "00000111001000110100");
        assert_eq!(
            BitVector::from_binary_string(""),
            Err(BitVectorError::Empty)
        );
        assert_eq!(
            BitVector::from_binary_string("0120"),
            Err(BitVectorError::InvalidDigit('2'))
        );
        assert_eq!(
            BitVector::from_binary_string(&"1".repeat(65)),
            Err(BitVectorError::TooLong(65))
        );
    }

    #[test]
    fn test_decompose() {
        let v =
            BitVector::from_binary_string("000001 11 00 1 0 00110100").unwrap();
        assert_eq!(v.decompose(0, 5).unwrap().unsigned(), 1);
        assert_eq!(v.decompose(6, 7).unwrap().unsigned(), 3);
        assert_eq!(v.decompose(8, 9).unwrap().unsigned(), 0);
        assert!(v.bit(10).unwrap());
        assert!(!v.bit(11).unwrap());
        assert_eq!(v.decompose(12, 19).unwrap().unsigned(), 52);
        assert!(v.decompose(12, 20).is_err());
        assert!(v.decompose(5, 4).is_err());
        assert!(v.bit(20).is_err());
    }

    #[test]
    fn test_bitwise() {
        let a = BitVector::from_binary_string("1100").unwrap();
        let b = BitVector::from_binary_string("1010").unwrap();
        assert_eq!((a & b).to_binary_string(), "1000");
        assert_eq!((a | b).to_binary_string(), "1110");
        assert_eq!((!a).to_binary_string(), "0011");
        let narrow = BitVector::from_binary_string("11").unwrap();
        assert_eq!((a | narrow).to_binary_string(), "1111");
    }

    #[test]
    fn test_shift() {
        let v = BitVector::from_binary_string("10110").unwrap();
        let left = v.shift(Direction::Left, 2, ShiftMode::Logical);
        assert_eq!(left.to_binary_string(), "11000");
        let logical = v.shift(Direction::Right, 2, ShiftMode::Logical);
        assert_eq!(logical.to_binary_string(), "00101");
        let arithmetic = v.shift(Direction::Right, 2, ShiftMode::Arithmetic);
        assert_eq!(arithmetic.to_binary_string(), "11101");
        let gone = v.shift(Direction::Left, 9, ShiftMode::Arithmetic);
        assert_eq!(gone.unsigned(), 0);
        let filled = v.shift(Direction::Right, 9, ShiftMode::Arithmetic);
        assert_eq!(filled.to_binary_string(), "11111");
    }

    #[test]
    fn test_rotate() {
        let v = BitVector::from_binary_string("10110").unwrap();
        assert_eq!(v.rotate(Direction::Left, 1).to_binary_string(), "01101");
        assert_eq!(v.rotate(Direction::Right, 1).to_binary_string(), "01011");
        assert_eq!(v.rotate(Direction::Right, 5), v);
        assert_eq!(v.rotate(Direction::Left, 7), v.rotate(Direction::Left, 2));
    }

    #[test]
    fn test_resize_and_sign_extend() {
        let v = BitVector::new(5, -3).unwrap();
        assert_eq!(v.sign_extend(8).to_binary_string(), "11111101");
        assert_eq!(v.resize(8).to_binary_string(), "00011101");
        assert_eq!(v.resize(3).to_binary_string(), "101");
    }
}
