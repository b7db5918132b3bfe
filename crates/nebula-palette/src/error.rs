//! Error types for packed arrays, palettes, and serialized containers.

/// Errors produced by [`PackedArray`](crate::PackedArray),
/// [`PalettizedCuboid`](crate::PalettizedCuboid), and container decoding.
///
/// [`PaletteError::MalformedContainer`] signals corrupt or incompatible input
/// data. Every other variant indicates misuse of the API or a broken internal
/// invariant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PaletteError {
    /// A value cannot be represented by the array: it is below the configured
    /// offset, or its raw form needs more than the supported bit width.
    #[error("value {value} out of range (minimum {min}, maximum {max})")]
    ValueOutOfRange {
        /// The rejected logical value.
        value: i64,
        /// Smallest representable logical value (the offset).
        min: i64,
        /// Largest representable logical value at the maximum bit width.
        max: i64,
    },

    /// A resize target is too narrow for a value already stored.
    #[error("{bits} bits cannot hold stored raw value {raw}")]
    CapacityExceeded {
        /// Requested bit width.
        bits: u8,
        /// Offending raw (offset-adjusted) value.
        raw: u64,
    },

    /// Serialized input is missing required parts or disagrees with the
    /// declared geometry.
    #[error("malformed container: {0}")]
    MalformedContainer(String),

    /// The palette was structurally changed while a cursor or scan was active.
    #[error("palette modified during iteration (expected revision {expected}, found {found})")]
    ConcurrentModification {
        /// Modification counter observed when the scan began.
        expected: u64,
        /// Modification counter observed now.
        found: u64,
    },

    /// A palette value changed in place between cursor steps.
    #[error("palette slot {slot} was mutated in place")]
    PaletteCorrupted {
        /// Palette slot whose hash changed.
        slot: usize,
    },

    /// A linear index or bounded coordinate lies outside the container.
    #[error("index {index} out of range (length {len})")]
    IndexOutOfRange {
        /// Offending index or coordinate.
        index: usize,
        /// Exclusive upper bound.
        len: usize,
    },

    /// An edge length that is zero or not a power of two.
    #[error("edge length {0} is not a non-zero power of two")]
    InvalidEdge(usize),

    /// The index array references a palette slot that does not hold a value.
    #[error("index array references palette slot {index}, palette holds {palette_len}")]
    DanglingIndex {
        /// Referenced palette slot.
        index: usize,
        /// Palette size at the time of the check.
        palette_len: usize,
    },

    /// `set` was called on a cursor before it yielded anything.
    #[error("cursor has no current element")]
    CursorNotPositioned,
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, PaletteError>;

impl PaletteError {
    /// Builds a [`PaletteError::MalformedContainer`] from any message.
    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        PaletteError::MalformedContainer(reason.into())
    }

    /// Returns `true` for errors caused by bad input data rather than API misuse.
    pub fn is_data_error(&self) -> bool {
        matches!(self, PaletteError::MalformedContainer(_))
    }
}
