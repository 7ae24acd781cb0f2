//! Randomized layout for access-pattern benchmarking
//!
//! The permutation is derived from a seed stored with the dataset, so a
//! client that knows the seed rebuilds exactly the server's table. Tables
//! are only reproducible across builds that link the same `rand` version.

use std::sync::Arc;

use glam::UVec3;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use super::{brick_count, check_dims, LayoutError, Scanline, SpatialLayout};

/// Largest grid a random table is built for; each brick costs two `u64` entries
pub const RANDOM_MAX_BRICKS: u64 = 1 << 24;

/// Scanline order passed through a fixed random permutation
#[derive(Debug, Clone)]
pub struct RandomLayout {
    dims: UVec3,
    seed: u64,
    /// scanline index -> layout index
    forward: Arc<[u64]>,
    /// layout index -> scanline index
    inverse: Arc<[u64]>,
}

impl RandomLayout {
    /// Build the permutation for a grid of `dims` bricks
    pub fn new(dims: UVec3, seed: u64) -> Result<Self, LayoutError> {
        check_dims(dims)?;
        let count = brick_count(dims);
        if count > RANDOM_MAX_BRICKS {
            return Err(LayoutError::TooManyBricks {
                dims,
                layout: "random",
                max: RANDOM_MAX_BRICKS,
            });
        }

        let mut forward: Vec<u64> = (0..count).collect();
        forward.shuffle(&mut StdRng::seed_from_u64(seed));

        let mut inverse = vec![0u64; forward.len()];
        for (scan, &index) in forward.iter().enumerate() {
            inverse[index as usize] = scan as u64;
        }

        Ok(Self {
            dims,
            seed,
            forward: forward.into(),
            inverse: inverse.into(),
        })
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn dims(&self) -> UVec3 {
        self.dims
    }

    fn check_grid(&self, dims: UVec3) -> Result<(), LayoutError> {
        if dims != self.dims {
            return Err(LayoutError::GridMismatch {
                expected: self.dims,
                actual: dims,
            });
        }
        Ok(())
    }
}

impl SpatialLayout for RandomLayout {
    fn to_index(&self, dims: UVec3, pos: UVec3) -> Result<u64, LayoutError> {
        self.check_grid(dims)?;
        let scan = Scanline.to_index(dims, pos)?;
        Ok(self.forward[scan as usize])
    }

    fn to_position(&self, dims: UVec3, index: u64) -> Result<UVec3, LayoutError> {
        self.check_grid(dims)?;
        let scan = self
            .inverse
            .get(index as usize)
            .copied()
            .ok_or(LayoutError::IndexOutOfDomain { dims, index })?;
        Scanline.to_position(dims, scan)
    }

    fn index_span(&self, dims: UVec3) -> u64 {
        brick_count(dims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_seed_same_table() {
        let dims = UVec3::new(4, 4, 4);
        let a = RandomLayout::new(dims, 7).unwrap();
        let b = RandomLayout::new(dims, 7).unwrap();
        assert_eq!(a.forward, b.forward);
    }

    #[test]
    fn test_is_a_permutation() {
        let dims = UVec3::new(5, 2, 3);
        let layout = RandomLayout::new(dims, 99).unwrap();
        let mut sorted = layout.forward.to_vec();
        sorted.sort_unstable();
        assert_eq!(sorted, (0..30).collect::<Vec<u64>>());
    }

    #[test]
    fn test_oversized_grid_is_rejected_before_allocating() {
        let dims = UVec3::new(1 << 12, 1 << 12, 2);
        assert!(matches!(
            RandomLayout::new(dims, 3),
            Err(LayoutError::TooManyBricks { max: RANDOM_MAX_BRICKS, .. })
        ));
        assert!(matches!(
            RandomLayout::new(UVec3::splat(u32::MAX), 3),
            Err(LayoutError::TooManyBricks { .. })
        ));
    }

    #[test]
    fn test_grid_mismatch() {
        let layout = RandomLayout::new(UVec3::splat(2), 1).unwrap();
        assert!(matches!(
            layout.to_index(UVec3::splat(3), UVec3::ZERO),
            Err(LayoutError::GridMismatch { .. })
        ));
    }
}
