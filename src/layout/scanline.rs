//! Scanline (row-major, x fastest) layout

use glam::UVec3;

use super::{brick_count, check_dims, check_position, LayoutError, SpatialLayout};

/// `index = x + y * dims.x + z * dims.x * dims.y`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Scanline;

impl SpatialLayout for Scanline {
    fn to_index(&self, dims: UVec3, pos: UVec3) -> Result<u64, LayoutError> {
        check_position(dims, pos)?;
        let (dx, dy) = (dims.x as u64, dims.y as u64);
        Ok(pos.x as u64 + pos.y as u64 * dx + pos.z as u64 * dx * dy)
    }

    fn to_position(&self, dims: UVec3, index: u64) -> Result<UVec3, LayoutError> {
        check_dims(dims)?;
        if index >= brick_count(dims) {
            return Err(LayoutError::IndexOutOfDomain { dims, index });
        }
        let (dx, dy) = (dims.x as u64, dims.y as u64);
        Ok(UVec3::new(
            (index % dx) as u32,
            ((index / dx) % dy) as u32,
            (index / (dx * dy)) as u32,
        ))
    }

    fn index_span(&self, dims: UVec3) -> u64 {
        brick_count(dims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scanline_2x2x2() {
        let dims = UVec3::splat(2);
        assert_eq!(Scanline.to_index(dims, UVec3::new(1, 0, 1)).unwrap(), 5);
        assert_eq!(Scanline.to_index(dims, UVec3::new(1, 1, 1)).unwrap(), 7);
        assert_eq!(Scanline.to_position(dims, 6).unwrap(), UVec3::new(0, 1, 1));
    }

    #[test]
    fn test_scanline_is_sequential_along_x() {
        let dims = UVec3::new(7, 3, 2);
        let a = Scanline.to_index(dims, UVec3::new(2, 1, 1)).unwrap();
        let b = Scanline.to_index(dims, UVec3::new(3, 1, 1)).unwrap();
        assert_eq!(b, a + 1);
    }

    #[test]
    fn test_scanline_index_out_of_range() {
        let dims = UVec3::new(3, 3, 3);
        assert_eq!(
            Scanline.to_position(dims, 27),
            Err(LayoutError::IndexOutOfDomain { dims, index: 27 })
        );
    }
}
