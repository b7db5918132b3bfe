//! Word layouts for bit-packed values and the version → layout policy seam.
//!
//! Two incompatible conventions exist for packing `bits`-wide values into
//! `u64` words:
//!
//! - [`PackingLayout::Aligned`]: each word holds `64 / bits` values and no
//!   value ever crosses a word boundary. Up to `64 % bits` high bits per word
//!   are left unused.
//! - [`PackingLayout::Interleaved`]: values are packed back to back with no
//!   padding, so a value may straddle two adjacent words.
//!
//! Which layout a file uses depends on the format version that wrote it. That
//! mapping is owned by the caller and supplied through [`LayoutPolicy`].

use serde::{Deserialize, Serialize};

/// Largest supported bit width. Keeps every raw value representable as `i64`.
pub const MAX_BITS: u8 = 63;

/// How values are laid out across `u64` words.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PackingLayout {
    /// Values never span two words.
    #[default]
    Aligned,
    /// Values are packed without padding and may span two words.
    Interleaved,
}

impl PackingLayout {
    /// Returns the exact number of words needed to hold `len` values of
    /// `bits` bits each.
    pub fn word_count(self, len: usize, bits: u8) -> usize {
        debug_assert!((1..=MAX_BITS).contains(&bits), "bits out of range");
        match self {
            PackingLayout::Aligned => len.div_ceil(values_per_word(bits)),
            PackingLayout::Interleaved => (len * bits as usize).div_ceil(64),
        }
    }

    /// Returns `true` if both layouts produce identical words at this width.
    ///
    /// This holds whenever `bits` divides 64: interleaved values then never
    /// straddle a word and the aligned layout wastes nothing.
    pub fn is_layout_neutral(bits: u8) -> bool {
        64 % bits as u32 == 0
    }
}

/// Number of values an aligned word holds at `bits` bits per value.
#[inline]
pub(crate) fn values_per_word(bits: u8) -> usize {
    64 / bits as usize
}

/// Selects a [`PackingLayout`] for a monotonic format version number.
pub trait LayoutPolicy {
    /// Returns the layout used by data written at `version`.
    fn layout_for(&self, version: u32) -> PackingLayout;
}

impl<F> LayoutPolicy for F
where
    F: Fn(u32) -> PackingLayout,
{
    fn layout_for(&self, version: u32) -> PackingLayout {
        self(version)
    }
}

impl LayoutPolicy for PackingLayout {
    /// A fixed layout regardless of version.
    fn layout_for(&self, _version: u32) -> PackingLayout {
        *self
    }
}

/// A single-threshold policy: versions at or above `aligned_since` use the
/// aligned layout, older versions use the interleaved one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionThreshold {
    /// First version that writes aligned words.
    pub aligned_since: u32,
}

impl VersionThreshold {
    /// Creates a threshold policy.
    pub fn new(aligned_since: u32) -> Self {
        Self { aligned_since }
    }
}

impl LayoutPolicy for VersionThreshold {
    fn layout_for(&self, version: u32) -> PackingLayout {
        if version >= self.aligned_since {
            PackingLayout::Aligned
        } else {
            PackingLayout::Interleaved
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
