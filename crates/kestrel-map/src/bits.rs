//! Packing and unpacking of heterogeneous fixed-width integer fields.
//!
//! Every programming word on the K1 configuration bus is a sequence of
//! fields packed least-significant first into one machine word. The widths
//! come from [`kestrel_chip::ChipGeometry`]; this module is the single place
//! that turns `(value, width)` lists into words and back.
//!
//! Negative weights are carried as sign-magnitude with inverted magnitude
//! bits (one's complement), the representation the weight datapath expects.

use crate::error::{MapError, Result};

/// Widest packable word. Staying one bit under the machine word keeps every
/// intermediate shift in range.
pub const MAX_PACKED_BITS: u32 = 63;

/// Pack fields into a single word, least-significant field first.
///
/// # Errors
///
/// Returns [`MapError::PackTooWide`] if the summed widths exceed
/// [`MAX_PACKED_BITS`], or [`MapError::Overflow`] if any value does not fit
/// its declared width.
pub fn pack(fields: &[(u64, u32)]) -> Result<u64> {
    let total: u32 = fields.iter().map(|&(_, w)| w).sum();
    if total > MAX_PACKED_BITS {
        return Err(MapError::PackTooWide {
            total,
            max: MAX_PACKED_BITS,
        });
    }

    let mut word = 0u64;
    let mut offset = 0u32;
    for &(value, width) in fields {
        if value >= (1u64 << width) {
            return Err(MapError::overflow(value, width));
        }
        word |= value << offset;
        offset += width;
    }
    Ok(word)
}

/// Unpack a word into one field per width plus a remainder holding any bits
/// beyond the sum of widths. Exact left-inverse of [`pack`] for in-range
/// values: the fields round-trip and the remainder is zero.
///
/// # Errors
///
/// Returns [`MapError::PackTooWide`] if the summed widths exceed
/// [`MAX_PACKED_BITS`].
pub fn unpack(word: u64, widths: &[u32]) -> Result<(Vec<u64>, u64)> {
    let total: u32 = widths.iter().sum();
    if total > MAX_PACKED_BITS {
        return Err(MapError::PackTooWide {
            total,
            max: MAX_PACKED_BITS,
        });
    }

    let mut fields = Vec::with_capacity(widths.len());
    let mut rest = word;
    for &width in widths {
        fields.push(rest & mask(width));
        rest >>= width;
    }
    Ok((fields, rest))
}

/// Interpret a `width`-bit field as a signed value: the top bit is the sign
/// (two's complement decode).
#[must_use]
pub fn to_signed(x: u64, width: u32) -> i64 {
    debug_assert!(width >= 1 && width <= MAX_PACKED_BITS);
    let x = x & mask(width);
    if x >> (width - 1) == 0 {
        x as i64
    } else {
        x as i64 - (1i64 << width)
    }
}

/// Encode a signed value into a `width`-bit sign-magnitude field with the
/// magnitude bits inverted for negatives (one's complement).
///
/// # Errors
///
/// Returns [`MapError::Overflow`] if `|x| >= 2^(width-1)`.
pub fn to_ones_complement(x: i64, width: u32) -> Result<u64> {
    let magnitude = x.unsigned_abs();
    if magnitude >= (1u64 << (width - 1)) {
        return Err(MapError::overflow(magnitude, width - 1));
    }
    if x >= 0 {
        Ok(magnitude)
    } else {
        Ok((1u64 << (width - 1)) | (!magnitude & mask(width - 1)))
    }
}

/// Decode a `width`-bit one's-complement sign-magnitude field. Inverse of
/// [`to_ones_complement`].
#[must_use]
pub fn from_ones_complement(x: u64, width: u32) -> i64 {
    let x = x & mask(width);
    if x >> (width - 1) == 0 {
        x as i64
    } else {
        -((!x & mask(width - 1)) as i64)
    }
}

const fn mask(width: u32) -> u64 {
    if width >= 64 {
        u64::MAX
    } else {
        (1u64 << width) - 1
    }
}
