//! Bit-packed array of fixed-width unsigned integers stored in `Vec<u64>`.
//!
//! Every element occupies `bits` bits under one of the two
//! [`PackingLayout`]s. The width grows automatically when a stored value no
//! longer fits and only shrinks on [`PackedArray::compact`] or
//! [`PackedArray::clear`]. An optional signed offset is applied to every value
//! on the way in and out, so raw words stay non-negative even when logical
//! values are not.

use std::collections::HashMap;
use std::hash::BuildHasher;
use std::iter::FusedIterator;

use serde::{Deserialize, Serialize};

use crate::error::{PaletteError, Result};
use crate::geometry::Geometry;
use crate::layout::{MAX_BITS, PackingLayout, values_per_word};

/// Minimum width for 16×16 height maps.
pub const HEIGHTMAP_MIN_BITS: u8 = 9;

/// Returns the number of bits needed to represent `raw` (0 for 0).
#[inline]
pub fn bits_required(raw: u64) -> u8 {
    (u64::BITS - raw.leading_zeros()) as u8
}

#[inline]
fn mask(bits: u8) -> u64 {
    (1u64 << bits) - 1
}

/// Packing parameters: where value `i` lives for a given width and layout.
#[derive(Clone, Copy, Debug)]
struct Codec {
    layout: PackingLayout,
    bits: u8,
}

impl Codec {
    #[inline]
    fn read(self, words: &[u64], index: usize) -> u64 {
        let bits = self.bits as usize;
        let mask = mask(self.bits);
        match self.layout {
            PackingLayout::Aligned => {
                let per = values_per_word(self.bits);
                let shift = (index % per) * bits;
                (words[index / per] >> shift) & mask
            }
            PackingLayout::Interleaved => {
                let bit = index * bits;
                let word = bit / 64;
                let shift = bit % 64;
                let mut raw = words[word] >> shift;
                if shift + bits > 64 {
                    raw |= words[word + 1] << (64 - shift);
                }
                raw & mask
            }
        }
    }

    #[inline]
    fn write(self, words: &mut [u64], index: usize, raw: u64) {
        let bits = self.bits as usize;
        let mask = mask(self.bits);
        let raw = raw & mask;
        match self.layout {
            PackingLayout::Aligned => {
                let per = values_per_word(self.bits);
                let word = index / per;
                let shift = (index % per) * bits;
                words[word] = (words[word] & !(mask << shift)) | (raw << shift);
            }
            PackingLayout::Interleaved => {
                let bit = index * bits;
                let word = bit / 64;
                let shift = bit % 64;
                words[word] = (words[word] & !(mask << shift)) | (raw << shift);
                if shift + bits > 64 {
                    let low_bits = 64 - shift;
                    let spill = (bits - low_bits) as u8;
                    words[word + 1] = (words[word + 1] & !self::mask(spill)) | (raw >> low_bits);
                }
            }
        }
    }
}

/// A fixed-length array of integers packed at a variable bit width.
///
/// The backing word vector always has exactly
/// [`PackingLayout::word_count`] words for the current length, width and
/// layout.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "PackedArrayRepr", into = "PackedArrayRepr")]
pub struct PackedArray {
    /// Raw storage; elements are packed into 64-bit words.
    words: Vec<u64>,
    /// Logical index space.
    geometry: Geometry,
    /// Word layout.
    layout: PackingLayout,
    /// Current bits per element.
    bits: u8,
    /// Floor for `bits`.
    min_bits: u8,
    /// Added to every raw value on read, subtracted on write.
    offset: i64,
}

impl PackedArray {
    /// Creates an array of zeros at `min_bits` bits per value.
    ///
    /// `min_bits` is clamped to `1..=MAX_BITS`.
    pub fn new(geometry: Geometry, layout: PackingLayout, min_bits: u8) -> Self {
        let min_bits = min_bits.clamp(1, MAX_BITS);
        Self {
            words: vec![0; layout.word_count(geometry.len(), min_bits)],
            geometry,
            layout,
            bits: min_bits,
            min_bits,
            offset: 0,
        }
    }

    /// Sets the logical offset. Every stored raw value `r` reads back as
    /// `r + offset`.
    pub fn with_offset(mut self, offset: i64) -> Self {
        self.offset = offset;
        self
    }

    /// Wraps pre-existing words packed at `bits` bits per value.
    ///
    /// Fails with [`PaletteError::MalformedContainer`] if `bits` lies outside
    /// `min_bits..=MAX_BITS` or `words` does not have exactly the number of
    /// words the geometry and layout call for.
    pub fn from_words(
        geometry: Geometry,
        layout: PackingLayout,
        min_bits: u8,
        bits: u8,
        words: Vec<u64>,
    ) -> Result<Self> {
        let min_bits = min_bits.clamp(1, MAX_BITS);
        if bits < min_bits || bits > MAX_BITS {
            return Err(PaletteError::malformed(format!(
                "bit width {bits} outside {min_bits}..={MAX_BITS}"
            )));
        }
        let expected = layout.word_count(geometry.len(), bits);
        if words.len() != expected {
            return Err(PaletteError::malformed(format!(
                "expected {expected} words for {} values at {bits} bits ({layout:?}), found {}",
                geometry.len(),
                words.len()
            )));
        }
        Ok(Self {
            words,
            geometry,
            layout,
            bits,
            min_bits,
            offset: 0,
        })
    }

    /// Wraps pre-existing words, recovering the bit width from the word count.
    ///
    /// Picks the smallest width at or above `min_bits` whose word count
    /// matches. Used for data whose width is implied by its length, such as
    /// height maps.
    pub fn from_words_inferred(
        geometry: Geometry,
        layout: PackingLayout,
        min_bits: u8,
        words: Vec<u64>,
    ) -> Result<Self> {
        let min_bits = min_bits.clamp(1, MAX_BITS);
        let len = geometry.len();
        match (min_bits..=MAX_BITS).find(|&bits| layout.word_count(len, bits) == words.len()) {
            Some(bits) => Self::from_words(geometry, layout, min_bits, bits, words),
            None => Err(PaletteError::malformed(format!(
                "no bit width packs {len} values into {} words ({layout:?})",
                words.len()
            ))),
        }
    }

    // --- Accessors ---

    /// Number of logical elements.
    pub fn len(&self) -> usize {
        self.geometry.len()
    }

    /// Returns `true` if the array has no elements.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current bits per element.
    pub fn bits(&self) -> u8 {
        self.bits
    }

    /// Minimum bits per element.
    pub fn min_bits(&self) -> u8 {
        self.min_bits
    }

    /// Current word layout.
    pub fn layout(&self) -> PackingLayout {
        self.layout
    }

    /// Index geometry.
    pub fn geometry(&self) -> Geometry {
        self.geometry
    }

    /// Logical offset applied to every value.
    pub fn offset(&self) -> i64 {
        self.offset
    }

    /// Smallest value that can be stored (the offset).
    pub fn min_value(&self) -> i64 {
        self.offset
    }

    /// Largest value storable without growing the bit width.
    pub fn max_value(&self) -> i64 {
        self.offset.saturating_add(mask(self.bits) as i64)
    }

    /// Raw packed words.
    pub fn words(&self) -> &[u64] {
        &self.words
    }

    /// Consumes the array, returning its packed words.
    pub fn into_words(self) -> Vec<u64> {
        self.words
    }

    /// Size of the backing storage in bytes.
    pub fn storage_bytes(&self) -> usize {
        self.words.len() * 8
    }

    /// Decodes every value into a vector.
    pub fn to_vec(&self) -> Vec<i64> {
        self.iter().collect()
    }

    // --- Reads ---

    /// Returns the value at `index`.
    pub fn get(&self, index: usize) -> Result<i64> {
        self.check_index(index)?;
        Ok(self.decode(self.raw(index)))
    }

    /// Returns the value at a wrapped 2D coordinate.
    pub fn get2d(&self, x: i32, z: i32) -> i64 {
        self.decode(self.raw(self.geometry.index2d(x, z)))
    }

    /// Returns the value at a wrapped 3D coordinate.
    pub fn get3d(&self, x: i32, y: i32, z: i32) -> i64 {
        self.decode(self.raw(self.geometry.index3d(x, y, z)))
    }

    /// Returns `true` if any element equals `value`.
    pub fn contains(&self, value: i64) -> bool {
        match self.encode(value) {
            Ok(raw) => self.raw_iter().any(|r| r == raw),
            Err(_) => false,
        }
    }

    /// Counts elements equal to `value`.
    pub fn count(&self, value: i64) -> usize {
        match self.encode(value) {
            Ok(raw) => self.raw_iter().filter(|&r| r == raw).count(),
            Err(_) => 0,
        }
    }

    /// Counts elements matching `predicate`.
    pub fn count_if(&self, mut predicate: impl FnMut(i64) -> bool) -> usize {
        self.iter().filter(|&v| predicate(v)).count()
    }

    /// Iterates over all decoded values.
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            array: self,
            front: 0,
            back: self.len(),
        }
    }

    /// A cursor over decoded values that can overwrite the last one yielded.
    pub fn cursor_mut(&mut self) -> CursorMut<'_> {
        let back = self.len();
        CursorMut {
            array: self,
            front: 0,
            back,
            current: None,
        }
    }

    // --- Writes ---

    /// Stores `value` at `index`, growing the bit width if needed.
    pub fn set(&mut self, index: usize, value: i64) -> Result<()> {
        self.check_index(index)?;
        let raw = self.encode(value)?;
        self.put(index, raw);
        Ok(())
    }

    /// Stores `value` at a wrapped 2D coordinate.
    pub fn set2d(&mut self, x: i32, z: i32, value: i64) -> Result<()> {
        let raw = self.encode(value)?;
        self.put(self.geometry.index2d(x, z), raw);
        Ok(())
    }

    /// Stores `value` at a wrapped 3D coordinate.
    pub fn set3d(&mut self, x: i32, y: i32, z: i32, value: i64) -> Result<()> {
        let raw = self.encode(value)?;
        self.put(self.geometry.index3d(x, y, z), raw);
        Ok(())
    }

    /// Stores `value` in every element.
    pub fn fill(&mut self, value: i64) -> Result<()> {
        let raw = self.encode(value)?;
        if raw == 0 {
            self.clear(false);
            return Ok(());
        }
        self.grow_for(raw);
        let codec = self.codec();
        for i in 0..self.len() {
            codec.write(&mut self.words, i, raw);
        }
        Ok(())
    }

    /// Raises the minimum bit width, widening storage if it is now too narrow.
    ///
    /// The floor never decreases.
    pub fn set_min_bits(&mut self, min_bits: u8) {
        let min_bits = min_bits.clamp(1, MAX_BITS);
        if min_bits > self.min_bits {
            self.min_bits = min_bits;
        }
        if min_bits > self.bits {
            self.repack(min_bits, self.layout);
        }
    }

    /// Re-encodes storage at exactly `bits` bits per value.
    ///
    /// `bits` is clamped to `min_bits..=MAX_BITS`. Fails with
    /// [`PaletteError::CapacityExceeded`], leaving the array untouched, if a
    /// stored value does not fit.
    pub fn resize(&mut self, bits: u8) -> Result<()> {
        let bits = bits.clamp(self.min_bits, MAX_BITS);
        let max = self.max_raw();
        if max > mask(bits) {
            return Err(PaletteError::CapacityExceeded { bits, raw: max });
        }
        self.repack(bits, self.layout);
        Ok(())
    }

    /// Re-encodes storage under `layout`, keeping every value.
    pub fn set_layout(&mut self, layout: PackingLayout) {
        self.repack(self.bits, layout);
    }

    /// Shrinks the bit width to the minimum that holds every stored value.
    pub fn compact(&mut self) {
        let target = bits_required(self.max_raw()).max(self.min_bits);
        if target != self.bits {
            self.repack(target, self.layout);
        }
    }

    /// Zeroes every raw value. With `auto_shrink`, also drops back to
    /// `min_bits`.
    pub fn clear(&mut self, auto_shrink: bool) {
        if auto_shrink && self.bits != self.min_bits {
            self.bits = self.min_bits;
            self.words = vec![0; self.layout.word_count(self.len(), self.bits)];
        } else {
            self.words.fill(0);
        }
    }

    /// Replaces every occurrence of `old` with `new`, returning how many
    /// elements changed.
    pub fn replace_all(&mut self, old: i64, new: i64) -> Result<usize> {
        let new_raw = self.encode(new)?;
        let Ok(old_raw) = self.encode(old) else {
            return Ok(0);
        };
        if old_raw == new_raw {
            return Ok(0);
        }
        Ok(self.remap_raw(|raw| if raw == old_raw { new_raw } else { raw }))
    }

    /// Rewrites every element through `f`.
    ///
    /// All rewritten values are validated before any is stored; if one falls
    /// outside the representable range the array is left unchanged.
    pub fn remap(&mut self, mut f: impl FnMut(i64) -> i64) -> Result<()> {
        let raws = self
            .iter()
            .map(|v| self.encode(f(v)))
            .collect::<Result<Vec<u64>>>()?;
        let max = raws.iter().copied().max().unwrap_or(0);
        let bits = bits_required(max).max(self.bits);
        let codec = Codec {
            layout: self.layout,
            bits,
        };
        let mut words = vec![0; self.layout.word_count(self.len(), bits)];
        for (i, raw) in raws.into_iter().enumerate() {
            codec.write(&mut words, i, raw);
        }
        self.words = words;
        self.bits = bits;
        Ok(())
    }

    /// Rewrites every element found as a key in `table` to the mapped value.
    /// Elements without an entry are kept.
    pub fn remap_table<S: BuildHasher>(&mut self, table: &HashMap<i64, i64, S>) -> Result<()> {
        self.remap(|v| table.get(&v).copied().unwrap_or(v))
    }

    // --- Raw (offset-free) access for palette indices ---

    /// Raw stored value at `index`. The index must be in range.
    #[inline]
    pub(crate) fn raw(&self, index: usize) -> u64 {
        self.codec().read(&self.words, index)
    }

    /// Iterates over raw stored values.
    pub(crate) fn raw_iter(&self) -> impl Iterator<Item = u64> + '_ {
        let codec = self.codec();
        (0..self.len()).map(move |i| codec.read(&self.words, i))
    }

    /// Stores a raw value at an in-range index, widening first if needed.
    pub(crate) fn put(&mut self, index: usize, raw: u64) {
        debug_assert!(index < self.len(), "index out of bounds");
        self.grow_for(raw);
        self.codec().write(&mut self.words, index, raw);
    }

    /// Rewrites raw values through `f`, widening once up front. Returns how
    /// many elements changed.
    pub(crate) fn remap_raw(&mut self, f: impl Fn(u64) -> u64) -> usize {
        let max = self.raw_iter().map(&f).max().unwrap_or(0);
        self.grow_for(max);
        let codec = self.codec();
        let mut changed = 0;
        for i in 0..self.len() {
            let raw = codec.read(&self.words, i);
            let mapped = f(raw);
            if mapped != raw {
                codec.write(&mut self.words, i, mapped);
                changed += 1;
            }
        }
        changed
    }

    /// Largest raw value currently stored.
    pub(crate) fn max_raw(&self) -> u64 {
        self.raw_iter().max().unwrap_or(0)
    }

    // --- Internals ---

    #[inline]
    fn codec(&self) -> Codec {
        Codec {
            layout: self.layout,
            bits: self.bits,
        }
    }

    #[inline]
    fn decode(&self, raw: u64) -> i64 {
        self.offset.wrapping_add(raw as i64)
    }

    fn encode(&self, value: i64) -> Result<u64> {
        let raw = i128::from(value) - i128::from(self.offset);
        if raw < 0 || raw > i128::from(mask(MAX_BITS)) {
            return Err(PaletteError::ValueOutOfRange {
                value,
                min: self.offset,
                max: self.offset.saturating_add(mask(MAX_BITS) as i64),
            });
        }
        Ok(raw as u64)
    }

    fn check_index(&self, index: usize) -> Result<()> {
        if index >= self.len() {
            return Err(PaletteError::IndexOutOfRange {
                index,
                len: self.len(),
            });
        }
        Ok(())
    }

    fn grow_for(&mut self, raw: u64) {
        if raw > mask(self.bits) {
            self.repack(bits_required(raw).max(self.min_bits), self.layout);
        }
    }

    /// Rebuilds storage under a new width and layout. Callers guarantee that
    /// every stored value fits `bits`.
    fn repack(&mut self, bits: u8, layout: PackingLayout) {
        if bits == self.bits && layout == self.layout {
            return;
        }
        if bits == self.bits && PackingLayout::is_layout_neutral(bits) {
            self.layout = layout;
            return;
        }
        tracing::trace!(
            "repacking {} values: {} bits {:?} -> {} bits {:?}",
            self.len(),
            self.bits,
            self.layout,
            bits,
            layout
        );
        let old = self.codec();
        let new = Codec { layout, bits };
        let mut words = vec![0; layout.word_count(self.len(), bits)];
        for i in 0..self.len() {
            new.write(&mut words, i, old.read(&self.words, i));
        }
        self.words = words;
        self.bits = bits;
        self.layout = layout;
    }
}

// ---------------------------------------------------------------------------
// Iteration
// ---------------------------------------------------------------------------

/// Double-ended iterator over the decoded values of a [`PackedArray`].
#[derive(Clone, Debug)]
pub struct Iter<'a> {
    array: &'a PackedArray,
    front: usize,
    back: usize,
}

impl Iterator for Iter<'_> {
    type Item = i64;

    fn next(&mut self) -> Option<i64> {
        if self.front >= self.back {
            return None;
        }
        let value = self.array.decode(self.array.raw(self.front));
        self.front += 1;
        Some(value)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.back - self.front;
        (remaining, Some(remaining))
    }
}

impl DoubleEndedIterator for Iter<'_> {
    fn next_back(&mut self) -> Option<i64> {
        if self.front >= self.back {
            return None;
        }
        self.back -= 1;
        Some(self.array.decode(self.array.raw(self.back)))
    }
}

impl ExactSizeIterator for Iter<'_> {}

impl FusedIterator for Iter<'_> {}

impl<'a> IntoIterator for &'a PackedArray {
    type Item = i64;
    type IntoIter = Iter<'a>;

    fn into_iter(self) -> Iter<'a> {
        self.iter()
    }
}

/// Cursor over a [`PackedArray`] that can overwrite the element it last
/// yielded, from either end.
#[derive(Debug)]
pub struct CursorMut<'a> {
    array: &'a mut PackedArray,
    front: usize,
    back: usize,
    current: Option<usize>,
}

impl CursorMut<'_> {
    /// Index of the element most recently yielded.
    pub fn index(&self) -> Option<usize> {
        self.current
    }

    /// Overwrites the element most recently yielded by `next` or `next_back`.
    pub fn set(&mut self, value: i64) -> Result<()> {
        let index = self.current.ok_or(PaletteError::CursorNotPositioned)?;
        self.array.set(index, value)
    }
}

impl Iterator for CursorMut<'_> {
    type Item = i64;

    fn next(&mut self) -> Option<i64> {
        if self.front >= self.back {
            return None;
        }
        let index = self.front;
        self.front += 1;
        self.current = Some(index);
        Some(self.array.decode(self.array.raw(index)))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.back - self.front;
        (remaining, Some(remaining))
    }
}

impl DoubleEndedIterator for CursorMut<'_> {
    fn next_back(&mut self) -> Option<i64> {
        if self.front >= self.back {
            return None;
        }
        self.back -= 1;
        self.current = Some(self.back);
        Some(self.array.decode(self.array.raw(self.back)))
    }
}

// ---------------------------------------------------------------------------
// Serde
// ---------------------------------------------------------------------------

/// Serialized form of [`PackedArray`], validated on deserialization.
#[derive(Serialize, Deserialize)]
struct PackedArrayRepr {
    geometry: Geometry,
    layout: PackingLayout,
    min_bits: u8,
    bits: u8,
    #[serde(default)]
    offset: i64,
    words: Vec<u64>,
}

impl TryFrom<PackedArrayRepr> for PackedArray {
    type Error = PaletteError;

    fn try_from(repr: PackedArrayRepr) -> Result<Self> {
        let array =
            PackedArray::from_words(repr.geometry, repr.layout, repr.min_bits, repr.bits, repr.words)?;
        Ok(array.with_offset(repr.offset))
    }
}

impl From<PackedArray> for PackedArrayRepr {
    fn from(array: PackedArray) -> Self {
        Self {
            geometry: array.geometry,
            layout: array.layout,
            min_bits: array.min_bits,
            bits: array.bits,
            offset: array.offset,
            words: array.words,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
