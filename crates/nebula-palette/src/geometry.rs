//! Index geometry for packed arrays: flat rows, squares, and cubes.
//!
//! Square and cube geometries have power-of-two edges so that coordinates can
//! be wrapped into range with a bit mask. Negative coordinates wrap too, which
//! lets callers pass world coordinates directly.

use serde::{Deserialize, Serialize};

use crate::error::{PaletteError, Result};

/// Shape of the logical index space of a [`PackedArray`](crate::PackedArray).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "GeometryRepr", into = "GeometryRepr")]
pub struct Geometry(Shape);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
enum Shape {
    Linear { len: usize },
    Square { edge_bits: u32 },
    Cube { edge_bits: u32 },
}

/// Serialized form of [`Geometry`], validated on deserialization.
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
enum GeometryRepr {
    Linear(usize),
    Square(usize),
    Cube(usize),
}

impl Geometry {
    /// A flat row of `len` values with no coordinate structure.
    pub fn linear(len: usize) -> Self {
        Self(Shape::Linear { len })
    }

    /// An `edge × edge` square, indexed `z * edge + x`.
    pub fn square(edge: usize) -> Result<Self> {
        let edge_bits = edge_bits(edge, 2)?;
        Ok(Self(Shape::Square { edge_bits }))
    }

    /// An `edge × edge × edge` cube, indexed `(y * edge + z) * edge + x`.
    pub fn cube(edge: usize) -> Result<Self> {
        let edge_bits = edge_bits(edge, 3)?;
        Ok(Self(Shape::Cube { edge_bits }))
    }

    /// A cube from a known edge exponent. `edge_bits` must be below 21.
    pub(crate) const fn cube_from_bits(edge_bits: u32) -> Self {
        Self(Shape::Cube { edge_bits })
    }

    /// Total number of cells.
    pub fn len(&self) -> usize {
        match self.0 {
            Shape::Linear { len } => len,
            Shape::Square { edge_bits } => 1 << (2 * edge_bits),
            Shape::Cube { edge_bits } => 1 << (3 * edge_bits),
        }
    }

    /// Returns `true` if the geometry has no cells.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Edge length for square and cube geometries.
    pub fn edge(&self) -> Option<usize> {
        match self.0 {
            Shape::Linear { .. } => None,
            Shape::Square { edge_bits } | Shape::Cube { edge_bits } => Some(1 << edge_bits),
        }
    }

    /// Linear index for a 2D coordinate. Coordinates wrap and never fail.
    ///
    /// A cube reads the `y = 0` plane; a linear row uses `x` modulo its length.
    pub fn index2d(&self, x: i32, z: i32) -> usize {
        match self.0 {
            Shape::Linear { len } => wrap_linear(x, len),
            Shape::Square { edge_bits } | Shape::Cube { edge_bits } => {
                let mask = (1i32 << edge_bits) - 1;
                (((z & mask) as usize) << edge_bits) | (x & mask) as usize
            }
        }
    }

    /// Linear index for a 3D coordinate. Coordinates wrap and never fail.
    ///
    /// A square ignores `y`; a linear row uses `x` modulo its length.
    pub fn index3d(&self, x: i32, y: i32, z: i32) -> usize {
        match self.0 {
            Shape::Linear { len } => wrap_linear(x, len),
            Shape::Square { .. } => self.index2d(x, z),
            Shape::Cube { edge_bits } => {
                let mask = (1i32 << edge_bits) - 1;
                (((y & mask) as usize) << (2 * edge_bits))
                    | (((z & mask) as usize) << edge_bits)
                    | (x & mask) as usize
            }
        }
    }
}

fn wrap_linear(x: i32, len: usize) -> usize {
    if len == 0 {
        return 0;
    }
    (i64::from(x).rem_euclid(len as i64)) as usize
}

/// Validates a power-of-two edge whose `dims`-th power fits the index space.
fn edge_bits(edge: usize, dims: u32) -> Result<u32> {
    if edge == 0 || !edge.is_power_of_two() {
        return Err(PaletteError::InvalidEdge(edge));
    }
    let bits = edge.trailing_zeros();
    // Coordinates are masked as i32, and the volume must fit usize.
    if bits >= 31 || bits * dims >= usize::BITS {
        return Err(PaletteError::InvalidEdge(edge));
    }
    Ok(bits)
}

impl TryFrom<GeometryRepr> for Geometry {
    type Error = PaletteError;

    fn try_from(repr: GeometryRepr) -> Result<Self> {
        match repr {
            GeometryRepr::Linear(len) => Ok(Geometry::linear(len)),
            GeometryRepr::Square(edge) => Geometry::square(edge),
            GeometryRepr::Cube(edge) => Geometry::cube(edge),
        }
    }
}

impl From<Geometry> for GeometryRepr {
    fn from(geometry: Geometry) -> Self {
        match geometry.0 {
            Shape::Linear { len } => GeometryRepr::Linear(len),
            Shape::Square { edge_bits } => GeometryRepr::Square(1 << edge_bits),
            Shape::Cube { edge_bits } => GeometryRepr::Cube(1 << edge_bits),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
