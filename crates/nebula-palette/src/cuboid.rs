//! Palette-compressed storage for power-of-two cubes of values.
//!
//! A [`PalettizedCuboid`] keeps a palette of distinct values and a
//! [`PackedArray`] of palette indices, one per cell. The index width grows as
//! the palette grows. Bulk replacement consolidates palette slots in place and
//! leaves tombstones behind; [`PalettizedCuboid::optimize_palette`] removes
//! them and shrinks the index width before serialization.

use std::iter::FusedIterator;

use crate::container::PaletteContainer;
use crate::cursor::Cursor;
use crate::error::{PaletteError, Result};
use crate::geometry::Geometry;
use crate::layout::{LayoutPolicy, PackingLayout};
use crate::packed_array::{PackedArray, bits_required};
use crate::palette::{PaletteEntry, Slot, fingerprint, position};

/// Edge length of a block section.
pub const BLOCK_EDGE: usize = 16;

/// Minimum index width for block palettes.
pub const BLOCK_MIN_BITS: u8 = 4;

/// Edge length of a biome section.
pub const BIOME_EDGE: usize = 4;

/// Minimum index width for biome palettes.
pub const BIOME_MIN_BITS: u8 = 1;

/// A cube of `edge³` cells, each holding a value from a shared palette.
///
/// Cells are ordered `y`-major: `index = (y * edge + z) * edge + x`.
/// Coordinate accessors wrap out-of-range coordinates into the cube.
///
/// A cuboid whose palette has a single entry is *uniform*: every cell holds
/// that value and the serialized form carries no index words.
#[derive(Clone, Debug)]
pub struct PalettizedCuboid<E> {
    /// Palette slots; indices in `indices` point here.
    palette: Vec<Slot<E>>,
    /// One palette index per cell.
    indices: PackedArray,
    /// Bumped on every structural palette change.
    modifications: u64,
}

impl<E: PaletteEntry> PalettizedCuboid<E> {
    /// Creates a cuboid with every cell set to `value`.
    ///
    /// `edge` must be a non-zero power of two.
    pub fn new(edge: usize, min_bits: u8, value: E) -> Result<Self> {
        let geometry = Geometry::cube(edge)?;
        Ok(Self::with_geometry(geometry, min_bits, value))
    }

    /// A 16³ block section filled with `value`.
    pub fn blocks(value: E) -> Self {
        Self::with_geometry(
            Geometry::cube_from_bits(BLOCK_EDGE.trailing_zeros()),
            BLOCK_MIN_BITS,
            value,
        )
    }

    /// A 4³ biome section filled with `value`.
    pub fn biomes(value: E) -> Self {
        Self::with_geometry(
            Geometry::cube_from_bits(BIOME_EDGE.trailing_zeros()),
            BIOME_MIN_BITS,
            value,
        )
    }

    fn with_geometry(geometry: Geometry, min_bits: u8, value: E) -> Self {
        Self {
            palette: vec![Slot::Value(value)],
            indices: PackedArray::new(geometry, PackingLayout::default(), min_bits),
            modifications: 0,
        }
    }

    // --- Accessors ---

    /// Edge length in cells.
    pub fn edge(&self) -> usize {
        self.indices.geometry().edge().unwrap_or(1)
    }

    /// Total number of cells (`edge³`).
    pub fn volume(&self) -> usize {
        self.indices.len()
    }

    /// Number of palette slots, tombstones included.
    pub fn palette_len(&self) -> usize {
        self.palette.len()
    }

    /// All palette slots in index order.
    pub fn palette_slots(&self) -> &[Slot<E>] {
        &self.palette
    }

    /// Live palette values in index order.
    pub fn palette_values(&self) -> impl Iterator<Item = &E> + '_ {
        self.palette.iter().filter_map(Slot::value)
    }

    /// Returns `true` if the palette has exactly one slot.
    pub fn is_uniform(&self) -> bool {
        self.palette.len() == 1
    }

    /// Current index width.
    pub fn bits(&self) -> u8 {
        self.indices.bits()
    }

    /// Current index layout.
    pub fn layout(&self) -> PackingLayout {
        self.indices.layout()
    }

    /// The packed palette indices.
    pub fn indices(&self) -> &PackedArray {
        &self.indices
    }

    /// Structural modification counter.
    pub fn modifications(&self) -> u64 {
        self.modifications
    }

    /// Linear cell index of a wrapped coordinate.
    pub fn index(&self, x: i32, y: i32, z: i32) -> usize {
        self.indices.geometry().index3d(x, y, z)
    }

    // --- Reads ---

    /// Returns a copy of the value at `(x, y, z)`.
    pub fn get(&self, x: i32, y: i32, z: i32) -> E {
        self.get_ref(x, y, z).clone()
    }

    /// Returns a copy of the value at a linear cell index.
    pub fn get_index(&self, index: usize) -> Result<E> {
        self.get_ref_index(index).cloned()
    }

    /// Returns the shared palette value at `(x, y, z)`.
    pub fn get_ref(&self, x: i32, y: i32, z: i32) -> &E {
        self.slot_value(self.slot_at(self.index(x, y, z)))
    }

    /// Returns the shared palette value at a linear cell index.
    pub fn get_ref_index(&self, index: usize) -> Result<&E> {
        self.check_index(index)?;
        Ok(self.slot_value(self.slot_at(index)))
    }

    /// Mutable access to the palette value used by `(x, y, z)`.
    ///
    /// The value is shared: changing it changes every cell that uses the same
    /// palette slot, and may leave two slots holding equal values. Active
    /// [`Cursor`]s report such in-place changes as
    /// [`PaletteError::PaletteCorrupted`]. Prefer [`PalettizedCuboid::set`].
    pub fn get_mut(&mut self, x: i32, y: i32, z: i32) -> &mut E {
        let slot = self.slot_at(self.index(x, y, z));
        match &mut self.palette[slot] {
            Slot::Value(value) => value,
            Slot::Tombstone => unreachable!("cell references tombstoned palette slot {slot}"),
        }
    }

    /// Returns `true` if any cell holds `value`.
    pub fn contains(&self, value: &E) -> bool {
        let slots = self.matching_slots(|v| v == value);
        self.indices.raw_iter().any(|raw| slots[raw as usize])
    }

    /// Counts cells holding `value`.
    pub fn count(&self, value: &E) -> usize {
        let slots = self.matching_slots(|v| v == value);
        self.indices
            .raw_iter()
            .filter(|&raw| slots[raw as usize])
            .count()
    }

    /// Counts cells whose value matches `predicate`.
    ///
    /// The predicate runs once per live palette slot. Fails with
    /// [`PaletteError::PaletteCorrupted`] if evaluating it changed a value.
    pub fn count_if(&self, predicate: impl FnMut(&E) -> bool) -> Result<usize> {
        let slots = self.scan(predicate)?;
        Ok(self
            .indices
            .raw_iter()
            .filter(|&raw| slots[raw as usize])
            .count())
    }

    /// Iterates over the values of all cells in index order.
    pub fn iter(&self) -> Iter<'_, E> {
        Iter {
            cuboid: self,
            front: 0,
            back: self.volume(),
        }
    }

    /// A detached cursor over all cells that checks for palette changes
    /// between steps.
    pub fn cursor(&self) -> Cursor {
        Cursor::new(self.volume(), self.modifications)
    }

    // --- Writes ---

    /// Sets the value at `(x, y, z)`, adding it to the palette if new.
    pub fn set(&mut self, x: i32, y: i32, z: i32, value: E) {
        let index = self.index(x, y, z);
        self.put(index, value);
    }

    /// Sets the value at a linear cell index.
    pub fn set_index(&mut self, index: usize, value: E) -> Result<()> {
        self.check_index(index)?;
        self.put(index, value);
        Ok(())
    }

    /// Resets every cell to `value`, leaving a single-entry palette.
    pub fn fill(&mut self, value: E) {
        self.palette = vec![Slot::Value(value)];
        self.indices.clear(true);
        self.modifications += 1;
    }

    /// Sets every cell in the inclusive box spanned by two `[x, y, z]`
    /// corners.
    ///
    /// Unlike the point accessors, corners are not wrapped: any coordinate
    /// outside `0..edge` fails with [`PaletteError::IndexOutOfRange`] and
    /// nothing is written.
    pub fn fill_box(&mut self, from: [usize; 3], to: [usize; 3], value: E) -> Result<()> {
        let edge = self.edge();
        for &c in from.iter().chain(to.iter()) {
            if c >= edge {
                return Err(PaletteError::IndexOutOfRange {
                    index: c,
                    len: edge,
                });
            }
        }
        let lo = [from[0].min(to[0]), from[1].min(to[1]), from[2].min(to[2])];
        let hi = [from[0].max(to[0]), from[1].max(to[1]), from[2].max(to[2])];
        let slot = self.slot_for(value) as u64;
        for y in lo[1]..=hi[1] {
            for z in lo[2]..=hi[2] {
                for x in lo[0]..=hi[0] {
                    self.indices.put((y * edge + z) * edge + x, slot);
                }
            }
        }
        Ok(())
    }

    /// Replaces `old` with `new` in every cell. Returns the number of cells
    /// rewritten.
    pub fn replace(&mut self, old: &E, new: E) -> usize {
        let slots = self.matching_slots(|v| v == old);
        self.consolidate(&slots, new)
    }

    /// Replaces every value in `olds` with `new`. Values that are not in the
    /// palette are ignored.
    pub fn replace_all(&mut self, olds: &[E], new: E) -> usize {
        let slots = self.matching_slots(|v| olds.contains(v));
        self.consolidate(&slots, new)
    }

    /// Replaces every value matching `predicate` with `new`.
    pub fn replace_if(&mut self, predicate: impl FnMut(&E) -> bool, new: E) -> Result<usize> {
        let slots = self.scan(predicate)?;
        Ok(self.consolidate(&slots, new))
    }

    /// Replaces every value not in `keep` with `new`.
    pub fn retain_all(&mut self, keep: &[E], new: E) -> usize {
        let slots = self.matching_slots(|v| !keep.contains(v));
        self.consolidate(&slots, new)
    }

    /// Drops unreferenced palette slots (tombstones included), renumbers the
    /// indices, and compacts the index width.
    ///
    /// Fails with [`PaletteError::DanglingIndex`] if a cell references a slot
    /// that does not hold a value.
    pub fn optimize_palette(&mut self) -> Result<()> {
        let len = self.palette.len();
        let mut used = vec![false; len];
        for raw in self.indices.raw_iter() {
            let index = raw as usize;
            match self.palette.get(index) {
                Some(Slot::Value(_)) => used[index] = true,
                _ => {
                    return Err(PaletteError::DanglingIndex {
                        index,
                        palette_len: len,
                    });
                }
            }
        }

        let live = used.iter().filter(|&&u| u).count();
        if live < len {
            let mut old_to_new = vec![0u64; len];
            let mut next = 0;
            for (old, &is_used) in used.iter().enumerate() {
                if is_used {
                    old_to_new[old] = next;
                    next += 1;
                }
            }
            self.indices.remap_raw(|raw| old_to_new[raw as usize]);

            let slots = std::mem::take(&mut self.palette);
            self.palette = slots
                .into_iter()
                .zip(used)
                .filter_map(|(slot, keep)| keep.then_some(slot))
                .collect();
            self.modifications += 1;
            tracing::debug!("defragmented palette: {} -> {} slots", len, live);
        }

        self.indices.compact();
        Ok(())
    }

    /// Re-encodes the index words under `layout`.
    pub fn set_packing_layout(&mut self, layout: PackingLayout) {
        self.indices.set_layout(layout);
    }

    /// Re-encodes the index words under the layout `policy` assigns to
    /// `version`.
    pub fn set_version<P: LayoutPolicy + ?Sized>(&mut self, policy: &P, version: u32) {
        self.set_packing_layout(policy.layout_for(version));
    }

    // --- Serialization ---

    /// Defragments and packs the cuboid for format `version`.
    ///
    /// `min_bits` raises the index width floor; the effective floor is the
    /// larger of it and the floor given at construction. A uniform cuboid
    /// produces no `data`.
    pub fn to_container<P: LayoutPolicy + ?Sized>(
        &mut self,
        policy: &P,
        version: u32,
        min_bits: u8,
    ) -> Result<PaletteContainer<E>> {
        self.optimize_palette()?;
        self.indices.set_min_bits(min_bits);

        let palette: Vec<E> = self.palette_values().cloned().collect();
        if palette.len() == 1 {
            return Ok(PaletteContainer::new(palette, None));
        }

        self.set_version(policy, version);
        self.indices.compact();
        Ok(PaletteContainer::new(
            palette,
            Some(self.indices.words().to_vec()),
        ))
    }

    /// Rebuilds a cuboid from a container written at format `version`.
    ///
    /// The index width is `max(min_bits, bits for palette.len() - 1)`, so
    /// `min_bits` must match the floor the writer used. Data packed wider is
    /// recognized only when its word count differs from the expected one; at
    /// widths whose word counts coincide (3 and 4 bits over 64 aligned cells)
    /// it decodes at the expected width. Any `data` attached to a
    /// single-entry palette is ignored.
    ///
    /// Fails with [`PaletteError::MalformedContainer`] if the palette is empty,
    /// `data` is missing for a multi-entry palette, the word count does not
    /// fit the geometry, or an index points past the palette.
    pub fn from_container<P: LayoutPolicy + ?Sized>(
        container: PaletteContainer<E>,
        edge: usize,
        min_bits: u8,
        policy: &P,
        version: u32,
    ) -> Result<Self> {
        let geometry = Geometry::cube(edge)?;
        let layout = policy.layout_for(version);
        let PaletteContainer { palette, data } = container;

        if palette.is_empty() {
            return Err(PaletteError::malformed("palette is missing or empty"));
        }

        let indices = if palette.len() == 1 {
            if data.is_some() {
                tracing::debug!("ignoring data attached to a single-entry palette");
            }
            PackedArray::new(geometry, layout, min_bits)
        } else {
            let Some(words) = data else {
                return Err(PaletteError::malformed(format!(
                    "data missing for a palette of {} entries",
                    palette.len()
                )));
            };
            let bits = bits_required(palette.len() as u64 - 1).max(min_bits);
            let indices = decode_indices(geometry, layout, min_bits, bits, words)?;
            if let Some(raw) = indices.raw_iter().find(|&raw| raw as usize >= palette.len()) {
                return Err(PaletteError::malformed(format!(
                    "index {raw} points past a palette of {} entries",
                    palette.len()
                )));
            }
            indices
        };

        Ok(Self {
            palette: palette.into_iter().map(Slot::Value).collect(),
            indices,
            modifications: 0,
        })
    }

    // --- Internals ---

    #[inline]
    pub(crate) fn slot_at(&self, index: usize) -> usize {
        self.indices.raw(index) as usize
    }

    #[inline]
    pub(crate) fn slot_value(&self, slot: usize) -> &E {
        match &self.palette[slot] {
            Slot::Value(value) => value,
            Slot::Tombstone => unreachable!("cell references tombstoned palette slot {slot}"),
        }
    }

    fn check_index(&self, index: usize) -> Result<()> {
        if index >= self.volume() {
            return Err(PaletteError::IndexOutOfRange {
                index,
                len: self.volume(),
            });
        }
        Ok(())
    }

    fn put(&mut self, index: usize, value: E) {
        let slot = self.slot_for(value);
        self.indices.put(index, slot as u64);
    }

    /// Finds the slot holding `value`, appending one if there is none.
    fn slot_for(&mut self, value: E) -> usize {
        if let Some(slot) = position(&self.palette, &value) {
            return slot;
        }
        self.palette.push(Slot::Value(value));
        self.modifications += 1;
        self.palette.len() - 1
    }

    /// Per-slot flags: `true` for live slots whose value satisfies `f`.
    fn matching_slots(&self, mut f: impl FnMut(&E) -> bool) -> Vec<bool> {
        self.palette
            .iter()
            .map(|slot| slot.value().is_some_and(&mut f))
            .collect()
    }

    /// Like [`Self::matching_slots`] for caller-supplied predicates, checking
    /// that evaluating the predicate left every value unchanged.
    fn scan(&self, mut predicate: impl FnMut(&E) -> bool) -> Result<Vec<bool>> {
        let mut flags = vec![false; self.palette.len()];
        for (slot, entry) in self.palette.iter().enumerate() {
            if let Slot::Value(value) = entry {
                let before = fingerprint(value);
                flags[slot] = predicate(value);
                if fingerprint(value) != before {
                    return Err(PaletteError::PaletteCorrupted { slot });
                }
            }
        }
        Ok(flags)
    }

    /// Merges every flagged slot into the slot holding `new`.
    ///
    /// Flagged slots become tombstones and every cell pointing at one is
    /// redirected. Returns the number of cells rewritten.
    fn consolidate(&mut self, flagged: &[bool], new: E) -> usize {
        if !flagged.contains(&true) {
            return 0;
        }
        let target = match position(&self.palette, &new) {
            Some(slot) => slot,
            None => {
                self.palette.push(Slot::Value(new));
                self.palette.len() - 1
            }
        };

        let mut doomed = flagged.to_vec();
        doomed.resize(self.palette.len(), false);
        doomed[target] = false;
        if !doomed.contains(&true) {
            return 0;
        }

        for (slot, &dead) in self.palette.iter_mut().zip(&doomed) {
            if dead {
                *slot = Slot::Tombstone;
            }
        }
        self.modifications += 1;

        let target = target as u64;
        let changed = self.indices.remap_raw(|raw| {
            if doomed[raw as usize] {
                target
            } else {
                raw
            }
        });
        tracing::trace!("consolidated palette slots into {}: {} cells", target, changed);
        changed
    }
}

/// Wraps index words, accepting a wider encoding if the expected width does
/// not match the word count.
fn decode_indices(
    geometry: Geometry,
    layout: PackingLayout,
    min_bits: u8,
    bits: u8,
    words: Vec<u64>,
) -> Result<PackedArray> {
    let expected = layout.word_count(geometry.len(), bits);
    if words.len() == expected {
        return PackedArray::from_words(geometry, layout, min_bits, bits, words);
    }
    let found = words.len();
    match PackedArray::from_words_inferred(geometry, layout, bits, words) {
        Ok(indices) => {
            tracing::debug!(
                "index words packed at {} bits, expected {}",
                indices.bits(),
                bits
            );
            Ok(indices)
        }
        Err(_) => Err(PaletteError::malformed(format!(
            "expected {expected} index words at {bits} bits ({layout:?}), found {found}"
        ))),
    }
}

// ---------------------------------------------------------------------------
// Iteration
// ---------------------------------------------------------------------------

/// Iterator over the values of all cells of a [`PalettizedCuboid`].
///
/// Borrows the cuboid, so the palette cannot change while it is alive.
#[derive(Clone, Debug)]
pub struct Iter<'a, E> {
    cuboid: &'a PalettizedCuboid<E>,
    front: usize,
    back: usize,
}

impl<'a, E: PaletteEntry> Iterator for Iter<'a, E> {
    type Item = &'a E;

    fn next(&mut self) -> Option<&'a E> {
        if self.front >= self.back {
            return None;
        }
        let cuboid = self.cuboid;
        let value = cuboid.slot_value(cuboid.slot_at(self.front));
        self.front += 1;
        Some(value)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.back - self.front;
        (remaining, Some(remaining))
    }
}

impl<'a, E: PaletteEntry> DoubleEndedIterator for Iter<'a, E> {
    fn next_back(&mut self) -> Option<&'a E> {
        if self.front >= self.back {
            return None;
        }
        self.back -= 1;
        let cuboid = self.cuboid;
        Some(cuboid.slot_value(cuboid.slot_at(self.back)))
    }
}

impl<E: PaletteEntry> ExactSizeIterator for Iter<'_, E> {}

impl<E: PaletteEntry> FusedIterator for Iter<'_, E> {}

impl<'a, E: PaletteEntry> IntoIterator for &'a PalettizedCuboid<E> {
    type Item = &'a E;
    type IntoIter = Iter<'a, E>;

    fn into_iter(self) -> Iter<'a, E> {
        self.iter()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::VersionThreshold;

    fn s(name: &str) -> String {
        name.to_string()
    }

    fn all_coords(edge: i32) -> impl Iterator<Item = (i32, i32, i32)> {
        (0..edge).flat_map(move |y| (0..edge).flat_map(move |z| (0..edge).map(move |x| (x, y, z))))
    }

    #[test]
    fn test_new_cuboid_is_uniform() {
        let cuboid = PalettizedCuboid::blocks(s("air"));
        assert_eq!(cuboid.edge(), 16);
        assert_eq!(cuboid.volume(), 4096);
        assert!(cuboid.is_uniform());
        assert_eq!(cuboid.bits(), BLOCK_MIN_BITS);
        assert_eq!(cuboid.get(3, 4, 5), "air");
    }

    #[test]
    fn test_rejects_non_power_of_two_edge() {
        assert_eq!(
            PalettizedCuboid::new(6, 4, 0u8).unwrap_err(),
            PaletteError::InvalidEdge(6)
        );
    }

    #[test]
    fn test_set_then_get_roundtrip() {
        let mut cuboid = PalettizedCuboid::blocks(s("air"));
        cuboid.set(5, 10, 15, s("stone"));
        assert_eq!(cuboid.get(5, 10, 15), "stone");
        assert_eq!(cuboid.get(4, 10, 15), "air");
        assert_eq!(cuboid.get(5, 11, 15), "air");
        assert_eq!(cuboid.palette_len(), 2);
        assert!(!cuboid.is_uniform());
    }

    #[test]
    fn test_point_accessors_wrap() {
        let mut cuboid = PalettizedCuboid::biomes(s("plains"));
        cuboid.set(-1, -1, -1, s("desert"));
        assert_eq!(cuboid.get(3, 3, 3), "desert");
        assert_eq!(cuboid.get(7, 7, 7), "desert");
        assert_eq!(cuboid.index(3, 3, 3), 63);
    }

    #[test]
    fn test_linear_accessors_check_range() {
        let mut cuboid = PalettizedCuboid::biomes(s("plains"));
        assert_eq!(
            cuboid.get_index(64),
            Err(PaletteError::IndexOutOfRange { index: 64, len: 64 })
        );
        assert!(cuboid.set_index(64, s("ocean")).is_err());
        cuboid.set_index(63, s("ocean")).unwrap();
        assert_eq!(cuboid.get_index(63).unwrap(), "ocean");
        assert_eq!(cuboid.get(3, 3, 3), "ocean");
    }

    #[test]
    fn test_equal_values_share_a_slot() {
        let mut cuboid = PalettizedCuboid::blocks(s("air"));
        cuboid.set(0, 0, 0, s("stone"));
        cuboid.set(9, 9, 9, s("stone"));
        assert_eq!(cuboid.palette_len(), 2);
        assert!(std::ptr::eq(cuboid.get_ref(0, 0, 0), cuboid.get_ref(9, 9, 9)));
    }

    #[test]
    fn test_index_width_grows_with_palette() {
        let mut cuboid = PalettizedCuboid::blocks(0u32);
        for i in 1..=16u32 {
            cuboid.set_index(i as usize, i).unwrap();
        }
        assert_eq!(cuboid.palette_len(), 17);
        assert_eq!(cuboid.bits(), 5);
        for i in 0..=16u32 {
            assert_eq!(cuboid.get_index(i as usize).unwrap(), i);
        }
    }

    #[test]
    fn test_fill_restores_uniform() {
        let mut cuboid = PalettizedCuboid::blocks(s("air"));
        for i in 0..40 {
            cuboid.set_index(i, format!("block{i}")).unwrap();
        }
        assert!(cuboid.bits() > BLOCK_MIN_BITS);
        cuboid.fill(s("water"));
        assert!(cuboid.is_uniform());
        assert_eq!(cuboid.bits(), BLOCK_MIN_BITS);
        assert!(cuboid.iter().all(|v| v == "water"));
    }

    #[test]
    fn test_fill_box_inclusive() {
        let mut cuboid = PalettizedCuboid::biomes(s("plains"));
        cuboid.fill_box([3, 1, 2], [1, 2, 3], s("forest")).unwrap();
        let mut filled = 0;
        for (x, y, z) in all_coords(4) {
            let inside = (1..=3).contains(&x) && (1..=2).contains(&y) && (2..=3).contains(&z);
            assert_eq!(cuboid.get(x, y, z) == "forest", inside, "({x},{y},{z})");
            filled += inside as usize;
        }
        assert_eq!(filled, 12);
        assert_eq!(cuboid.count(&s("forest")), 12);
    }

    #[test]
    fn test_fill_box_rejects_out_of_range() {
        let mut cuboid = PalettizedCuboid::biomes(s("plains"));
        let err = cuboid.fill_box([0, 0, 0], [4, 0, 0], s("forest")).unwrap_err();
        assert_eq!(err, PaletteError::IndexOutOfRange { index: 4, len: 4 });
        assert!(cuboid.is_uniform(), "failed fill leaves the palette alone");
    }

    #[test]
    fn test_replace_all_rewrites_only_matches() {
        let mut cuboid = PalettizedCuboid::blocks(s("air"));
        cuboid.set(0, 0, 0, s("a"));
        cuboid.set(1, 0, 0, s("b"));
        cuboid.set(2, 0, 0, s("keep"));
        cuboid.set(3, 0, 0, s("a"));

        let changed = cuboid.replace_all(&[s("a"), s("b"), s("missing")], s("c"));
        assert_eq!(changed, 3);
        assert_eq!(cuboid.get(0, 0, 0), "c");
        assert_eq!(cuboid.get(1, 0, 0), "c");
        assert_eq!(cuboid.get(3, 0, 0), "c");
        assert_eq!(cuboid.get(2, 0, 0), "keep");
        assert_eq!(cuboid.get(4, 0, 0), "air");
        assert!(!cuboid.contains(&s("a")));
        assert!(!cuboid.contains(&s("b")));

        // Consolidated slots wait as tombstones until defragmentation.
        let tombstones = cuboid.palette_slots().iter().filter(|s| s.is_tombstone()).count();
        assert_eq!(tombstones, 2);
        cuboid.optimize_palette().unwrap();
        assert_eq!(cuboid.palette_len(), 3);
        assert!(cuboid.palette_slots().iter().all(|s| !s.is_tombstone()));
        assert_eq!(cuboid.get(0, 0, 0), "c");
        assert_eq!(cuboid.get(2, 0, 0), "keep");
    }

    #[test]
    fn test_replace_into_existing_value() {
        let mut cuboid = PalettizedCuboid::biomes(s("plains"));
        cuboid.set(0, 0, 0, s("desert"));
        let before = cuboid.palette_len();
        assert_eq!(cuboid.replace(&s("desert"), s("plains")), 1);
        assert_eq!(cuboid.palette_len(), before, "target slot reused");
        assert_eq!(cuboid.count(&s("plains")), 64);
        assert_eq!(cuboid.replace(&s("plains"), s("plains")), 0);
    }

    #[test]
    fn test_replace_if_and_retain_all() {
        let mut cuboid = PalettizedCuboid::biomes(s("plains"));
        cuboid.set(0, 0, 0, s("ocean"));
        cuboid.set(1, 0, 0, s("deep_ocean"));
        cuboid.set(2, 0, 0, s("desert"));

        let changed = cuboid.replace_if(|v| v.ends_with("ocean"), s("beach")).unwrap();
        assert_eq!(changed, 2);
        assert_eq!(cuboid.count(&s("beach")), 2);

        let changed = cuboid.retain_all(&[s("plains")], s("void"));
        assert_eq!(changed, 3);
        assert_eq!(cuboid.count(&s("void")), 3);
        assert_eq!(cuboid.count(&s("plains")), 61);
        cuboid.optimize_palette().unwrap();
        assert_eq!(cuboid.palette_len(), 2);
    }

    #[test]
    fn test_count_if_evaluates_per_slot() {
        let mut cuboid = PalettizedCuboid::biomes(0u16);
        cuboid.set(0, 0, 0, 5);
        cuboid.set(1, 0, 0, 7);
        let mut calls = 0;
        let n = cuboid
            .count_if(|&v| {
                calls += 1;
                v > 4
            })
            .unwrap();
        assert_eq!(n, 2);
        assert_eq!(calls, 3);
    }

    #[test]
    fn test_optimize_returns_to_uniform() {
        let mut cuboid = PalettizedCuboid::blocks(s("air"));
        cuboid.set(1, 2, 3, s("stone"));
        cuboid.set(1, 2, 3, s("air"));
        assert_eq!(cuboid.palette_len(), 2);
        cuboid.optimize_palette().unwrap();
        assert!(cuboid.is_uniform());
        assert_eq!(cuboid.bits(), BLOCK_MIN_BITS);
    }

    #[test]
    fn test_optimize_remaps_indices() {
        let mut cuboid = PalettizedCuboid::blocks(0u32);
        for i in 1..=20u32 {
            cuboid.set_index(i as usize, i).unwrap();
        }
        // Drop every odd value; their slots become unused.
        for i in (1..=20u32).step_by(2) {
            cuboid.set_index(i as usize, 0).unwrap();
        }
        cuboid.optimize_palette().unwrap();
        assert_eq!(cuboid.palette_len(), 11);
        assert_eq!(cuboid.bits(), BLOCK_MIN_BITS);
        for i in 0..=20usize {
            let expected = if i % 2 == 0 { i as u32 } else { 0 };
            assert_eq!(cuboid.get_index(i).unwrap(), expected);
        }
    }

    #[test]
    fn test_optimize_detects_dangling_index() {
        let mut cuboid = PalettizedCuboid::biomes(s("plains"));
        cuboid.indices.put(5, 9);
        assert_eq!(
            cuboid.optimize_palette(),
            Err(PaletteError::DanglingIndex {
                index: 9,
                palette_len: 1
            })
        );
    }

    #[test]
    fn test_optimize_detects_index_into_tombstone() {
        let mut cuboid = PalettizedCuboid::biomes(s("plains"));
        cuboid.set(0, 0, 0, s("desert"));
        cuboid.replace(&s("desert"), s("plains"));
        assert!(cuboid.palette_slots()[1].is_tombstone());

        cuboid.indices.put(7, 1);
        assert_eq!(
            cuboid.optimize_palette(),
            Err(PaletteError::DanglingIndex {
                index: 1,
                palette_len: 2
            })
        );
    }

    /// Entry whose hash reads interior state, so a predicate can change it.
    #[derive(Clone, Debug, PartialEq)]
    struct Tagged(std::cell::Cell<u32>);

    impl std::hash::Hash for Tagged {
        fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
            self.0.get().hash(state);
        }
    }

    #[test]
    fn test_count_if_detects_predicate_mutation() {
        let cuboid = PalettizedCuboid::biomes(Tagged(std::cell::Cell::new(0)));
        let err = cuboid
            .count_if(|v| {
                v.0.set(v.0.get() + 1);
                true
            })
            .unwrap_err();
        assert_eq!(err, PaletteError::PaletteCorrupted { slot: 0 });
    }

    #[test]
    fn test_replace_if_detects_predicate_mutation() {
        let mut cuboid = PalettizedCuboid::biomes(Tagged(std::cell::Cell::new(0)));
        let before = cuboid.modifications();
        let err = cuboid
            .replace_if(
                |v| {
                    v.0.set(7);
                    true
                },
                Tagged(std::cell::Cell::new(1)),
            )
            .unwrap_err();
        assert_eq!(err, PaletteError::PaletteCorrupted { slot: 0 });
        assert_eq!(cuboid.palette_len(), 1, "nothing consolidated");
        assert_eq!(cuboid.modifications(), before);
    }

    #[test]
    fn test_modification_counter() {
        let mut cuboid = PalettizedCuboid::biomes(s("plains"));
        assert_eq!(cuboid.modifications(), 0);
        cuboid.set(0, 0, 0, s("plains"));
        assert_eq!(cuboid.modifications(), 0, "reusing a slot is not structural");
        cuboid.set(0, 0, 0, s("desert"));
        assert_eq!(cuboid.modifications(), 1);
        cuboid.replace(&s("desert"), s("ocean"));
        assert_eq!(cuboid.modifications(), 2);
        cuboid.optimize_palette().unwrap();
        assert_eq!(cuboid.modifications(), 3);
        cuboid.optimize_palette().unwrap();
        assert_eq!(cuboid.modifications(), 3, "nothing left to drop");
        cuboid.fill(s("plains"));
        assert_eq!(cuboid.modifications(), 4);
    }

    /// 16³ section with six palette entries survives an aligned round trip.
    #[test]
    fn test_block_section_roundtrip_aligned() {
        let mut cuboid = PalettizedCuboid::blocks(s("minecraft:stone"));
        let placed = [
            ((0, 0, 0), "minecraft:dirt"),
            ((15, 15, 15), "minecraft:granite"),
            ((7, 3, 12), "minecraft:diorite"),
            ((1, 14, 2), "minecraft:andesite"),
            ((8, 8, 8), "minecraft:gravel"),
        ];
        for ((x, y, z), name) in placed {
            cuboid.set(x, y, z, s(name));
        }
        assert_eq!(cuboid.palette_len(), 6);

        let container = cuboid
            .to_container(&PackingLayout::Aligned, 0, BLOCK_MIN_BITS)
            .unwrap();
        assert_eq!(container.palette.len(), 6);
        assert_eq!(container.data.as_ref().map(Vec::len), Some(256));

        let restored = PalettizedCuboid::from_container(
            container,
            BLOCK_EDGE,
            BLOCK_MIN_BITS,
            &PackingLayout::Aligned,
            0,
        )
        .unwrap();
        for (x, y, z) in all_coords(16) {
            assert_eq!(restored.get(x, y, z), cuboid.get(x, y, z), "({x},{y},{z})");
        }
    }

    #[test]
    fn test_roundtrip_interleaved_with_straddling_width() {
        let policy = VersionThreshold::new(2000);
        let mut cuboid = PalettizedCuboid::blocks(0u32);
        for i in 0..4096usize {
            cuboid.set_index(i, (i * 31 % 40) as u32).unwrap();
        }
        let container = cuboid.to_container(&policy, 1500, BLOCK_MIN_BITS).unwrap();
        assert_eq!(cuboid.layout(), PackingLayout::Interleaved);
        assert_eq!(cuboid.bits(), 6);
        assert_eq!(container.data.as_ref().map(Vec::len), Some(384));

        let restored =
            PalettizedCuboid::from_container(container, 16, BLOCK_MIN_BITS, &policy, 1500).unwrap();
        assert!(restored.iter().eq(cuboid.iter()));
    }

    #[test]
    fn test_uniform_biome_section_omits_data() {
        let mut cuboid = PalettizedCuboid::biomes(s("minecraft:plains"));
        let container = cuboid
            .to_container(&PackingLayout::Aligned, 0, BIOME_MIN_BITS)
            .unwrap();
        assert!(container.data.is_none());
        assert_eq!(container.palette.len(), 1);
        let json = serde_json::to_value(&container).unwrap();
        assert!(json.get("data").is_none());
        assert_eq!(json["palette"], serde_json::json!(["minecraft:plains"]));
    }

    #[test]
    fn test_fill_then_serialize_is_uniform() {
        let mut cuboid = PalettizedCuboid::blocks(s("air"));
        cuboid.set(1, 1, 1, s("stone"));
        cuboid.fill(s("bedrock"));
        let container = cuboid.to_container(&PackingLayout::Aligned, 0, 4).unwrap();
        assert_eq!(container, PaletteContainer::uniform(s("bedrock")));
    }

    #[test]
    fn test_from_container_rejects_malformed() {
        let aligned = PackingLayout::Aligned;
        let empty: PaletteContainer<String> = PaletteContainer::new(vec![], None);
        let err = PalettizedCuboid::from_container(empty, 16, 4, &aligned, 0).unwrap_err();
        assert!(err.is_data_error());

        let missing = PaletteContainer::new(vec![s("a"), s("b")], None);
        let err = PalettizedCuboid::from_container(missing, 16, 4, &aligned, 0).unwrap_err();
        assert!(err.is_data_error());

        let short = PaletteContainer::new(vec![s("a"), s("b")], Some(vec![0; 10]));
        let err = PalettizedCuboid::from_container(short, 16, 4, &aligned, 0).unwrap_err();
        assert!(err.is_data_error());

        // Index 3 with a two-entry palette.
        let mut words = vec![0u64; 256];
        words[0] = 3;
        let dangling = PaletteContainer::new(vec![s("a"), s("b")], Some(words));
        let err = PalettizedCuboid::from_container(dangling, 16, 4, &aligned, 0).unwrap_err();
        assert!(err.is_data_error());
    }

    #[test]
    fn test_from_container_accepts_wider_data() {
        // Two-entry palette written at 8 bits instead of the expected 4.
        let mut words = vec![0u64; 512];
        words[0] = 1;
        let container = PaletteContainer::new(vec![s("a"), s("b")], Some(words));
        let cuboid =
            PalettizedCuboid::from_container(container, 16, 4, &PackingLayout::Aligned, 0).unwrap();
        assert_eq!(cuboid.bits(), 8);
        assert_eq!(cuboid.get_index(0).unwrap(), "b");
        assert_eq!(cuboid.get_index(1).unwrap(), "a");
    }

    #[test]
    fn test_from_container_width_follows_reader_floor() {
        // Eight entries need 3 bits, but the writer's floor is 4. Over 64
        // aligned cells both widths take 4 words, so only the floor tells
        // them apart.
        let mut cuboid = PalettizedCuboid::new(4, 4, 0u8).unwrap();
        for i in 0..64usize {
            cuboid.set_index(i, (i % 8) as u8).unwrap();
        }
        let container = cuboid.to_container(&PackingLayout::Aligned, 0, 4).unwrap();
        assert_eq!(container.data.as_ref().map(Vec::len), Some(4));

        let restored =
            PalettizedCuboid::from_container(container, 4, 4, &PackingLayout::Aligned, 0).unwrap();
        assert_eq!(restored.bits(), 4);
        assert!(restored.iter().eq(cuboid.iter()));
    }

    #[test]
    fn test_from_container_ignores_data_for_single_entry() {
        let container = PaletteContainer::new(vec![s("a")], Some(vec![0xFF; 3]));
        let cuboid =
            PalettizedCuboid::from_container(container, 4, 1, &PackingLayout::Aligned, 0).unwrap();
        assert!(cuboid.is_uniform());
        assert!(cuboid.iter().all(|v| v == "a"));
    }

    #[test]
    fn test_set_packing_layout_keeps_values() {
        let mut cuboid = PalettizedCuboid::blocks(0u32);
        for i in 0..4096usize {
            cuboid.set_index(i, (i % 20) as u32).unwrap();
        }
        let before: Vec<u32> = cuboid.iter().copied().collect();
        cuboid.set_packing_layout(PackingLayout::Interleaved);
        assert_eq!(cuboid.layout(), PackingLayout::Interleaved);
        let after: Vec<u32> = cuboid.iter().copied().collect();
        assert_eq!(before, after);
    }

    #[test]
    fn test_iter_matches_index_order() {
        let mut cuboid = PalettizedCuboid::biomes(0u8);
        cuboid.set(1, 0, 0, 1);
        cuboid.set(0, 0, 1, 2);
        cuboid.set(0, 1, 0, 3);
        let values: Vec<u8> = cuboid.iter().copied().collect();
        assert_eq!(values.len(), 64);
        assert_eq!(values[1], 1);
        assert_eq!(values[4], 2);
        assert_eq!(values[16], 3);
        assert_eq!(cuboid.iter().rev().next(), Some(&0));
    }
}
