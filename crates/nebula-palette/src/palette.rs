//! Palette slots and the bound on values a palette can hold.

use std::fmt;
use std::hash::{Hash, Hasher};

use rustc_hash::FxHasher;
use serde::{Deserialize, Serialize};

/// Values that can live in a palette: compared by equality, duplicated by
/// clone, hashed for in-place mutation checks.
pub trait PaletteEntry: Clone + PartialEq + Hash + fmt::Debug {}

impl<T> PaletteEntry for T where T: Clone + PartialEq + Hash + fmt::Debug {}

/// One palette slot.
///
/// A bulk replace turns the consolidated slots into [`Slot::Tombstone`]s. No
/// cell refers to a tombstone, and the next defragmentation removes them.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Slot<E> {
    /// A live palette value.
    Value(E),
    /// A slot pending removal.
    Tombstone,
}

impl<E> Slot<E> {
    /// The value held by this slot, if it is live.
    pub fn value(&self) -> Option<&E> {
        match self {
            Slot::Value(value) => Some(value),
            Slot::Tombstone => None,
        }
    }

    /// Mutable access to the value held by this slot, if it is live.
    pub fn value_mut(&mut self) -> Option<&mut E> {
        match self {
            Slot::Value(value) => Some(value),
            Slot::Tombstone => None,
        }
    }

    /// Returns `true` for [`Slot::Tombstone`].
    pub fn is_tombstone(&self) -> bool {
        matches!(self, Slot::Tombstone)
    }
}

/// Position of the first live slot equal to `value`.
pub(crate) fn position<E: PartialEq>(slots: &[Slot<E>], value: &E) -> Option<usize> {
    slots.iter().position(|slot| slot.value() == Some(value))
}

/// Stable hash of a palette value, used to detect in-place mutation.
pub(crate) fn fingerprint<E: Hash>(value: &E) -> u64 {
    let mut hasher = FxHasher::default();
    value.hash(&mut hasher);
    hasher.finish()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
