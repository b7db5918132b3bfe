//! A detached cursor over the cells of a [`PalettizedCuboid`].
//!
//! [`PalettizedCuboid::iter`] borrows the cuboid and so rules out any change
//! while it runs. A [`Cursor`] holds no borrow: it is advanced by handing it
//! the cuboid on every step, which leaves the caller free to mutate between
//! steps. Each step checks that
//!
//! - the palette modification counter is unchanged since the cursor was made,
//!   else [`PaletteError::ConcurrentModification`];
//! - the value yielded by the previous step still hashes the same, else
//!   [`PaletteError::PaletteCorrupted`].
//!
//! After reporting an error the cursor is finished.

use crate::cuboid::PalettizedCuboid;
use crate::error::{PaletteError, Result};
use crate::palette::{PaletteEntry, Slot, fingerprint};

/// Position in a forward scan over a cuboid's cells.
#[derive(Clone, Debug)]
pub struct Cursor {
    next: usize,
    len: usize,
    revision: u64,
    /// Palette slot and value hash of the last yielded element.
    last: Option<(usize, u64)>,
    finished: bool,
}

impl Cursor {
    pub(crate) fn new(len: usize, revision: u64) -> Self {
        Self {
            next: 0,
            len,
            revision,
            last: None,
            finished: false,
        }
    }

    /// Index of the next cell to be yielded.
    pub fn position(&self) -> usize {
        self.next
    }

    /// Returns `true` once the cursor has yielded every cell or an error.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Advances to the next cell of `cuboid`.
    ///
    /// Returns `None` when exhausted. The integrity checks also run before the
    /// final `None`, so a change after the last element is still reported.
    pub fn next<'a, E: PaletteEntry>(
        &mut self,
        cuboid: &'a PalettizedCuboid<E>,
    ) -> Option<Result<&'a E>> {
        if self.finished {
            return None;
        }
        if let Err(err) = self.verify(cuboid) {
            self.finished = true;
            return Some(Err(err));
        }
        if self.next >= self.len.min(cuboid.volume()) {
            self.finished = true;
            return None;
        }

        let slot = cuboid.slot_at(self.next);
        let value = cuboid.slot_value(slot);
        self.last = Some((slot, fingerprint(value)));
        self.next += 1;
        Some(Ok(value))
    }

    /// Drains the remaining cells, returning the first error encountered.
    pub fn for_each<E: PaletteEntry>(
        &mut self,
        cuboid: &PalettizedCuboid<E>,
        mut f: impl FnMut(&E),
    ) -> Result<()> {
        while let Some(step) = self.next(cuboid) {
            f(step?);
        }
        Ok(())
    }

    fn verify<E: PaletteEntry>(&self, cuboid: &PalettizedCuboid<E>) -> Result<()> {
        if cuboid.modifications() != self.revision {
            return Err(PaletteError::ConcurrentModification {
                expected: self.revision,
                found: cuboid.modifications(),
            });
        }
        if let Some((slot, hash)) = self.last {
            match cuboid.palette_slots().get(slot) {
                Some(Slot::Value(value)) if fingerprint(value) == hash => {}
                _ => return Err(PaletteError::PaletteCorrupted { slot }),
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
