//! Palette compression and bit-packed integer storage for sectioned world
//! data.
//!
//! [`PackedArray`] stores fixed-width unsigned integers in 64-bit words under
//! either the [`PackingLayout::Aligned`] or the [`PackingLayout::Interleaved`]
//! layout, growing its width on demand. [`PalettizedCuboid`] layers a palette
//! on top for block and biome sections, and round-trips through the
//! [`PaletteContainer`] `{palette, data}` shape. Which layout a given format
//! version uses is decided by a [`LayoutPolicy`].

pub mod container;
pub mod cuboid;
pub mod cursor;
pub mod error;
pub mod geometry;
pub mod layout;
pub mod packed_array;
pub mod palette;

pub use container::PaletteContainer;
pub use cuboid::{BIOME_EDGE, BIOME_MIN_BITS, BLOCK_EDGE, BLOCK_MIN_BITS, PalettizedCuboid};
pub use cursor::Cursor;
pub use error::{PaletteError, Result};
pub use geometry::Geometry;
pub use layout::{LayoutPolicy, MAX_BITS, PackingLayout, VersionThreshold};
pub use packed_array::{HEIGHTMAP_MIN_BITS, PackedArray, bits_required};
pub use palette::{PaletteEntry, Slot};
