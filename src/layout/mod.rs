//! Spatial layouts: brick grid position <-> linear brick index
//!
//! Every LOD level of a dataset picks one layout at build time. The layout
//! decides how a 3D brick coordinate maps onto the linear index used as the
//! second half of a [`BrickKey`](crate::store::BrickKey).
//!
//! - [`Scanline`]: x-fastest row-major order
//! - [`Morton`]: Z-order bit interleave
//! - [`Hilbert`]: 3D Hilbert curve, better locality than Morton
//! - [`RandomLayout`]: seeded permutation of the scanline order, for
//!   access-pattern benchmarking
//!
//! Morton and Hilbert work on the enclosing power-of-two cube, so on other
//! grids their index space is sparse: [`SpatialLayout::index_span`] can be
//! larger than the brick count and some indices decode to no brick.

pub mod scanline;
pub mod morton;
pub mod hilbert;
pub mod random;

pub use scanline::Scanline;
pub use morton::Morton;
pub use hilbert::Hilbert;
pub use random::{RandomLayout, RANDOM_MAX_BRICKS};

use glam::UVec3;
use rkyv::{Archive, Deserialize, Serialize};
use thiserror::Error;

/// Errors raised by layout lookups
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LayoutError {
    #[error("position {pos:?} is outside brick grid {dims:?}")]
    PositionOutOfDomain { dims: UVec3, pos: UVec3 },

    #[error("index {index} does not address a brick of grid {dims:?}")]
    IndexOutOfDomain { dims: UVec3, index: u64 },

    #[error("brick grid {0:?} has a zero-sized axis")]
    EmptyGrid(UVec3),

    #[error("brick grid {dims:?} needs more than {max_bits} bits per axis for the {layout} layout")]
    TooLarge {
        dims: UVec3,
        layout: &'static str,
        max_bits: u32,
    },

    #[error("brick grid {dims:?} holds more than {max} bricks for the {layout} layout")]
    TooManyBricks {
        dims: UVec3,
        layout: &'static str,
        max: u64,
    },

    #[error("layout was built for grid {expected:?}, queried with {actual:?}")]
    GridMismatch { expected: UVec3, actual: UVec3 },
}

/// Maps brick grid coordinates to linear indices and back
pub trait SpatialLayout {
    /// Linear index of the brick at `pos` in a grid of `dims` bricks
    fn to_index(&self, dims: UVec3, pos: UVec3) -> Result<u64, LayoutError>;

    /// Grid position of the brick with linear `index`
    fn to_position(&self, dims: UVec3, index: u64) -> Result<UVec3, LayoutError>;

    /// Exclusive upper bound of the indices this layout produces for `dims`
    fn index_span(&self, dims: UVec3) -> u64;
}

/// Serializable description of a layout, stored per LOD
#[derive(Archive, Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LayoutKind {
    Scanline,
    Morton,
    Hilbert,
    /// Scanline order shuffled with a seeded permutation
    Random { seed: u64 },
}

impl LayoutKind {
    pub fn name(&self) -> &'static str {
        match self {
            LayoutKind::Scanline => "scanline",
            LayoutKind::Morton => "morton",
            LayoutKind::Hilbert => "hilbert",
            LayoutKind::Random { .. } => "random",
        }
    }
}

/// A constructed layout for one brick grid
#[derive(Debug, Clone)]
pub enum Layout {
    Scanline(Scanline),
    Morton(Morton),
    Hilbert(Hilbert),
    Random(RandomLayout),
}

impl Layout {
    /// Build the layout described by `kind` for a grid of `dims` bricks
    pub fn new(kind: LayoutKind, dims: UVec3) -> Result<Self, LayoutError> {
        check_dims(dims)?;
        Ok(match kind {
            LayoutKind::Scanline => Layout::Scanline(Scanline),
            LayoutKind::Morton => {
                Morton::bits_for(dims)?;
                Layout::Morton(Morton)
            }
            LayoutKind::Hilbert => {
                Hilbert::bits_for(dims)?;
                Layout::Hilbert(Hilbert)
            }
            LayoutKind::Random { seed } => Layout::Random(RandomLayout::new(dims, seed)?),
        })
    }

    pub fn kind(&self) -> LayoutKind {
        match self {
            Layout::Scanline(_) => LayoutKind::Scanline,
            Layout::Morton(_) => LayoutKind::Morton,
            Layout::Hilbert(_) => LayoutKind::Hilbert,
            Layout::Random(r) => LayoutKind::Random { seed: r.seed() },
        }
    }

    fn inner(&self) -> &dyn SpatialLayout {
        match self {
            Layout::Scanline(l) => l,
            Layout::Morton(l) => l,
            Layout::Hilbert(l) => l,
            Layout::Random(l) => l,
        }
    }
}

impl SpatialLayout for Layout {
    fn to_index(&self, dims: UVec3, pos: UVec3) -> Result<u64, LayoutError> {
        self.inner().to_index(dims, pos)
    }

    fn to_position(&self, dims: UVec3, index: u64) -> Result<UVec3, LayoutError> {
        self.inner().to_position(dims, index)
    }

    fn index_span(&self, dims: UVec3) -> u64 {
        self.inner().index_span(dims)
    }
}

/// Number of bricks in a grid, saturating at `u64::MAX`
pub fn brick_count(dims: UVec3) -> u64 {
    (dims.x as u64 * dims.y as u64).saturating_mul(dims.z as u64)
}

pub(crate) fn check_dims(dims: UVec3) -> Result<(), LayoutError> {
    if dims.x == 0 || dims.y == 0 || dims.z == 0 {
        return Err(LayoutError::EmptyGrid(dims));
    }
    if (dims.x as u64 * dims.y as u64).checked_mul(dims.z as u64).is_none() {
        return Err(LayoutError::TooManyBricks {
            dims,
            layout: "linear",
            max: u64::MAX,
        });
    }
    Ok(())
}

pub(crate) fn check_position(dims: UVec3, pos: UVec3) -> Result<(), LayoutError> {
    check_dims(dims)?;
    if pos.x >= dims.x || pos.y >= dims.y || pos.z >= dims.z {
        return Err(LayoutError::PositionOutOfDomain { dims, pos });
    }
    Ok(())
}

/// Bits needed per axis to address every coordinate below `max(dims)`
pub(crate) fn bits_per_axis(dims: UVec3) -> u32 {
    let extent = dims.max_element().max(2);
    32 - (extent - 1).leading_zeros()
}
