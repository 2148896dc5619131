//! Typed bit-field accessors over 32-bit wire words.
//!
//! Every wire field (header bits, attribute bits, payload sub-fields) is
//! described by a [`BitField`] rather than by shifts repeated at each call
//! site. Ranges are validated when the field is constructed, so an accessor
//! can never address a bit above 31.

use std::fmt;

/// Extract bits `[msb, lsb]` of `word`, normalized to start at bit 0.
///
/// `msb` and `lsb` are inclusive. Callers must pass `msb >= lsb` and
/// `msb <= 31`; [`BitField::new`] is the checked way to build such a range.
#[inline]
pub const fn extract_bits(word: u32, msb: u8, lsb: u8) -> u32 {
    let width = (msb - lsb + 1) as u32;
    (word >> lsb) & mask(width)
}

#[inline]
const fn mask(width: u32) -> u32 {
    if width >= 32 { u32::MAX } else { (1u32 << width) - 1 }
}

/// An inclusive bit range `[msb, lsb]` within a 32-bit word.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BitField {
    msb: u8,
    lsb: u8,
}

impl BitField {
    /// The whole word, bits 31:0.
    pub const WORD: BitField = BitField { msb: 31, lsb: 0 };

    /// Build a bit range. Panics at compile time when used in a `const`
    /// context with an invalid range.
    pub const fn new(msb: u8, lsb: u8) -> Self {
        assert!(msb <= 31, "bit range exceeds 31");
        assert!(msb >= lsb, "msb must be >= lsb");
        Self { msb, lsb }
    }

    /// Fallible constructor for ranges that come from data rather than code.
    pub fn try_new(msb: u8, lsb: u8) -> Result<Self, BitFieldError> {
        if msb > 31 || msb < lsb {
            return Err(BitFieldError::InvalidRange { msb, lsb });
        }
        Ok(Self { msb, lsb })
    }

    /// A single-bit field.
    pub const fn bit(bit: u8) -> Self {
        Self::new(bit, bit)
    }

    pub const fn msb(self) -> u8 {
        self.msb
    }

    pub const fn lsb(self) -> u8 {
        self.lsb
    }

    /// Number of bits covered.
    pub const fn width(self) -> u32 {
        (self.msb - self.lsb + 1) as u32
    }

    /// Mask of this field in word position.
    pub const fn mask_in_place(self) -> u32 {
        mask(self.width()) << self.lsb
    }

    /// Largest value the field can hold.
    pub const fn max_value(self) -> u32 {
        mask(self.width())
    }

    /// Read the field out of `word`.
    #[inline]
    pub const fn get(self, word: u32) -> u32 {
        extract_bits(word, self.msb, self.lsb)
    }

    /// Write `value` into the field, leaving the other bits of `word` alone.
    pub fn set(self, word: u32, value: u32) -> Result<u32, BitFieldError> {
        if value > self.max_value() {
            return Err(BitFieldError::ValueTooWide { field: self, value });
        }
        Ok((word & !self.mask_in_place()) | (value << self.lsb))
    }

    /// Write `value`, truncating it to the field width.
    #[inline]
    pub const fn set_truncating(self, word: u32, value: u32) -> u32 {
        (word & !self.mask_in_place()) | ((value & self.max_value()) << self.lsb)
    }

    /// True when every bit of this field in `word` is zero.
    #[inline]
    pub const fn is_zero(self, word: u32) -> bool {
        word & self.mask_in_place() == 0
    }
}

impl fmt::Display for BitField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.msb == self.lsb {
            write!(f, "[{}]", self.msb)
        } else {
            write!(f, "[{}:{}]", self.msb, self.lsb)
        }
    }
}

/// Check that the reserved range of `word` is all zeroes.
///
/// Returns `Err` with the offending bits (normalized to bit 0) when any bit
/// inside `reserved` is set.
pub fn check_reserved_zero(word: u32, reserved: BitField) -> Result<(), u32> {
    match reserved.get(word) {
        0 => Ok(()),
        bits => Err(bits),
    }
}

/// Errors from bit-field construction and writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BitFieldError {
    /// `msb` above 31 or below `lsb`.
    InvalidRange { msb: u8, lsb: u8 },
    /// Value has bits set above the field width.
    ValueTooWide { field: BitField, value: u32 },
}

impl fmt::Display for BitFieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BitFieldError::InvalidRange { msb, lsb } => {
                write!(f, "invalid bit range [{}:{}]", msb, lsb)
            }
            BitFieldError::ValueTooWide { field, value } => {
                write!(f, "value {:#x} does not fit in bit field {}", value, field)
            }
        }
    }
}

impl std::error::Error for BitFieldError {}
