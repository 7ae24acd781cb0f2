//! Morton encoding (Z-order curve) layout

use glam::UVec3;

use super::{bits_per_axis, check_dims, check_position, LayoutError, SpatialLayout};

/// Largest per-axis coordinate width that fits a 64-bit code
pub const MORTON_MAX_BITS: u32 = 21;

/// Spread bits of a 21-bit integer into every third bit of a 64-bit integer
fn spread_bits(x: u32) -> u64 {
    let mut x = x as u64 & 0x1fffff;
    x = (x | (x << 32)) & 0x1f00000000ffff;
    x = (x | (x << 16)) & 0x1f0000ff0000ff;
    x = (x | (x << 8)) & 0x100f00f00f00f00f;
    x = (x | (x << 4)) & 0x10c30c30c30c30c3;
    x = (x | (x << 2)) & 0x1249249249249249;
    x
}

/// Compact every third bit of a 64-bit integer into a 21-bit integer
fn compact_bits(x: u64) -> u32 {
    let mut x = x & 0x1249249249249249;
    x = (x | (x >> 2)) & 0x10c30c30c30c30c3;
    x = (x | (x >> 4)) & 0x100f00f00f00f00f;
    x = (x | (x >> 8)) & 0x1f0000ff0000ff;
    x = (x | (x >> 16)) & 0x1f00000000ffff;
    x = (x | (x >> 32)) & 0x1fffff;
    x as u32
}

/// Encode 3D coordinates into a Morton code; x lands in bit 0, y in bit 1, z in bit 2
pub fn encode_morton_3d(pos: UVec3) -> u64 {
    spread_bits(pos.x) | (spread_bits(pos.y) << 1) | (spread_bits(pos.z) << 2)
}

/// Decode a Morton code back to 3D coordinates
pub fn decode_morton_3d(code: u64) -> UVec3 {
    UVec3::new(
        compact_bits(code),
        compact_bits(code >> 1),
        compact_bits(code >> 2),
    )
}

/// Z-order layout over the power-of-two cube enclosing the grid
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Morton;

impl Morton {
    /// Per-axis bit depth for `dims`, or `TooLarge` past 21 bits
    pub fn bits_for(dims: UVec3) -> Result<u32, LayoutError> {
        check_dims(dims)?;
        let bits = bits_per_axis(dims);
        if bits > MORTON_MAX_BITS {
            return Err(LayoutError::TooLarge {
                dims,
                layout: "morton",
                max_bits: MORTON_MAX_BITS,
            });
        }
        Ok(bits)
    }
}

impl SpatialLayout for Morton {
    fn to_index(&self, dims: UVec3, pos: UVec3) -> Result<u64, LayoutError> {
        check_position(dims, pos)?;
        Self::bits_for(dims)?;
        Ok(encode_morton_3d(pos))
    }

    fn to_position(&self, dims: UVec3, index: u64) -> Result<UVec3, LayoutError> {
        if index >= self.index_span(dims) {
            return Err(LayoutError::IndexOutOfDomain { dims, index });
        }
        let pos = decode_morton_3d(index);
        // Codes inside the padded cube but outside the grid address nothing
        if check_position(dims, pos).is_err() {
            return Err(LayoutError::IndexOutOfDomain { dims, index });
        }
        Ok(pos)
    }

    fn index_span(&self, dims: UVec3) -> u64 {
        match Self::bits_for(dims) {
            Ok(bits) => 1u64 << (3 * bits),
            Err(_) => 0,
        }
    }
}
