//! Fixed-Width Bit Packing
//!
//! Packs clamped integer fields into a single `u64` envelope and unpacks them again.
//!
//! ## Layout
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  inject(a, 4) → inject(b, 2)                                │
//! ├─────────────────────────────────────────────────────────────┤
//! │  acc = ((0 << 4) + a) << 2 + b                              │
//! │                                                             │
//! │  [.... aaaa bb]                                             │
//! │         │    └─ injected last, extracted first              │
//! │         └────── injected first, extracted last              │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Extraction always runs in the reverse order of injection.

/// A single packed field: its width in bits and the largest value it may carry.
///
/// `limit` can be smaller than the width allows (e.g. a cost of 0..500 in 9 bits).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Field {
    /// Width in bits.
    pub width: u32,
    /// Inclusive upper bound applied before injection.
    pub limit: u32,
}

impl Field {
    /// Create a field definition.
    pub const fn new(width: u32, limit: u32) -> Self {
        Self { width, limit }
    }

    /// Field whose limit is the full width.
    pub const fn full(width: u32) -> Self {
        Self { width, limit: max_for_width(width) as u32 }
    }
}

/// Largest value representable in `width` bits.
#[inline]
pub const fn max_for_width(width: u32) -> u64 {
    if width >= 64 {
        u64::MAX
    } else {
        (1u64 << width) - 1
    }
}

/// Saturate `value` into `0..=limit`.
///
/// Negative inputs become 0, anything above `limit` becomes `limit`.
#[inline]
pub fn clamp(value: i64, limit: u32) -> u32 {
    value.clamp(0, limit as i64) as u32
}

// =============================================================================
// PACKING
// =============================================================================

/// Accumulates fields into a single integer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BitPacker {
    acc: u64,
    bits: u32,
}

impl BitPacker {
    /// Start an empty envelope.
    pub const fn new() -> Self {
        Self { acc: 0, bits: 0 }
    }

    /// Shift the accumulator left by the field width and add the clamped value.
    #[inline]
    pub fn inject(mut self, value: i64, field: Field) -> Self {
        debug_assert!(self.bits + field.width <= 64, "envelope exceeds 64 bits");
        let clamped = clamp(value, field.limit) as u64 & max_for_width(field.width);
        self.acc = (self.acc << field.width) + clamped;
        self.bits += field.width;
        self
    }

    /// Bits injected so far.
    pub fn bits(&self) -> u32 {
        self.bits
    }

    /// Finish packing.
    pub fn finish(self) -> u64 {
        self.acc
    }
}

// =============================================================================
// UNPACKING
// =============================================================================

/// Pulls fields out of an envelope, low bits first.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BitUnpacker {
    acc: u64,
}

impl BitUnpacker {
    /// Wrap an envelope. Bits above `total_width` are discarded.
    pub fn new(envelope: u64, total_width: u32) -> Self {
        Self { acc: envelope & max_for_width(total_width) }
    }

    /// Take the low `field.width` bits, then shift them away.
    ///
    /// Values above `field.limit` saturate to it, so a decoded field is always
    /// within the range its encoder accepts.
    #[inline]
    pub fn extract(&mut self, field: Field) -> u32 {
        let value = self.acc & max_for_width(field.width);
        self.acc = if field.width >= 64 { 0 } else { self.acc >> field.width };
        value.min(field.limit as u64) as u32
    }

    /// Remaining unextracted bits.
    pub fn remaining(&self) -> u64 {
        self.acc
    }
}

// =============================================================================
// TESTS
// =============================================================================
