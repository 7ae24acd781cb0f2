//! Hilbert curve layout
//!
//! Uses Skilling's transpose formulation ("Programming the Hilbert curve",
//! AIP Conf. Proc. 707, 2004). The generic routines work for any number of
//! dimensions `N` and bit depth `bits` as long as `N * bits` fits the 64-bit
//! index word; the layout instantiates them with `N = 3`.

use glam::UVec3;

use super::{bits_per_axis, check_dims, check_position, LayoutError, SpatialLayout};

/// Width of the index word produced by [`hilbert_encode`]
pub const WORD_BITS: u32 = u64::BITS;

/// Convert axis coordinates into the transposed Hilbert index in place
fn axes_to_transpose<const N: usize>(x: &mut [u32; N], bits: u32) {
    let m = 1u32 << (bits - 1);

    // Inverse undo
    let mut q = m;
    while q > 1 {
        let p = q - 1;
        for i in 0..N {
            if x[i] & q != 0 {
                x[0] ^= p;
            } else {
                let t = (x[0] ^ x[i]) & p;
                x[0] ^= t;
                x[i] ^= t;
            }
        }
        q >>= 1;
    }

    // Gray encode
    for i in 1..N {
        x[i] ^= x[i - 1];
    }
    let mut t = 0;
    let mut q = m;
    while q > 1 {
        if x[N - 1] & q != 0 {
            t ^= q - 1;
        }
        q >>= 1;
    }
    for xi in x.iter_mut() {
        *xi ^= t;
    }
}

/// Convert a transposed Hilbert index back into axis coordinates in place
fn transpose_to_axes<const N: usize>(x: &mut [u32; N], bits: u32) {
    let n = 2u32 << (bits - 1);

    // Gray decode
    let t = x[N - 1] >> 1;
    for i in (1..N).rev() {
        x[i] ^= x[i - 1];
    }
    x[0] ^= t;

    // Undo excess work
    let mut q = 2;
    while q != n {
        let p = q - 1;
        for i in (0..N).rev() {
            if x[i] & q != 0 {
                x[0] ^= p;
            } else {
                let t = (x[0] ^ x[i]) & p;
                x[0] ^= t;
                x[i] ^= t;
            }
        }
        q <<= 1;
    }
}

/// Encode `N`-dimensional coordinates of `bits` bits each into a Hilbert index
pub fn hilbert_encode<const N: usize>(coords: [u32; N], bits: u32) -> u64 {
    debug_assert!(bits >= 1 && N as u32 * bits <= WORD_BITS);
    let mut x = coords;
    axes_to_transpose(&mut x, bits);

    let mut index = 0u64;
    for j in (0..bits).rev() {
        for xi in &x {
            index = (index << 1) | ((xi >> j) & 1) as u64;
        }
    }
    index
}

/// Decode a Hilbert index into `N`-dimensional coordinates of `bits` bits each
pub fn hilbert_decode<const N: usize>(index: u64, bits: u32) -> [u32; N] {
    debug_assert!(bits >= 1 && N as u32 * bits <= WORD_BITS);
    let mut x = [0u32; N];
    let mut shift = N as u32 * bits;
    for j in (0..bits).rev() {
        for xi in x.iter_mut() {
            shift -= 1;
            *xi |= (((index >> shift) & 1) as u32) << j;
        }
    }
    transpose_to_axes(&mut x, bits);
    x
}

/// Hilbert layout over the power-of-two cube enclosing the grid
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Hilbert;

impl Hilbert {
    /// Per-axis bit depth for `dims`, or `TooLarge` when three axes overflow the index word
    pub fn bits_for(dims: UVec3) -> Result<u32, LayoutError> {
        check_dims(dims)?;
        let bits = bits_per_axis(dims);
        let max_bits = WORD_BITS / 3;
        if bits > max_bits {
            return Err(LayoutError::TooLarge {
                dims,
                layout: "hilbert",
                max_bits,
            });
        }
        Ok(bits)
    }
}

impl SpatialLayout for Hilbert {
    fn to_index(&self, dims: UVec3, pos: UVec3) -> Result<u64, LayoutError> {
        check_position(dims, pos)?;
        let bits = Self::bits_for(dims)?;
        Ok(hilbert_encode(pos.to_array(), bits))
    }

    fn to_position(&self, dims: UVec3, index: u64) -> Result<UVec3, LayoutError> {
        if index >= self.index_span(dims) {
            return Err(LayoutError::IndexOutOfDomain { dims, index });
        }
        let bits = Self::bits_for(dims)?;
        let pos = UVec3::from_array(hilbert_decode::<3>(index, bits));
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generic_roundtrip_2d_and_3d() {
        for bits in 1..=4 {
            let side = 1u32 << bits;
            for index in 0..(side as u64 * side as u64) {
                let p = hilbert_decode::<2>(index, bits);
                assert_eq!(hilbert_encode(p, bits), index);
            }
            for index in 0..(side as u64).pow(3) {
                let p = hilbert_decode::<3>(index, bits);
                assert_eq!(hilbert_encode(p, bits), index);
            }
        }
    }

    #[test]
    fn test_consecutive_indices_are_neighbours() {
        let bits = 3;
        let total = 1u64 << (3 * bits);
        let mut prev = hilbert_decode::<3>(0, bits);
        assert_eq!(prev, [0, 0, 0]);
        for index in 1..total {
            let cur = hilbert_decode::<3>(index, bits);
            let dist: u32 = prev.iter().zip(cur.iter()).map(|(a, b)| a.abs_diff(*b)).sum();
            assert_eq!(dist, 1, "step {} -> {} is not unit length", index - 1, index);
            prev = cur;
        }
    }

    #[test]
    fn test_layout_rejects_gap_indices() {
        let dims = UVec3::new(3, 3, 3);
        let span = Hilbert.index_span(dims);
        assert_eq!(span, 64);
        let valid = (0..span).filter(|&i| Hilbert.to_position(dims, i).is_ok()).count();
        assert_eq!(valid, 27);
    }
}
