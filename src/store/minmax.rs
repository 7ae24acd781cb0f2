//! Scalar and gradient extrema of a decoded brick

use glam::UVec3;

use super::{MinMaxRecord, NetDataType};

/// Reinterpret a raw brick buffer as scalars
///
/// Returns `None` when the element type has no wire mapping or the buffer
/// length is not a whole number of elements.
pub fn decode_scalars(voxels: &[u8], net_type: NetDataType) -> Option<Vec<f64>> {
    let elem = match net_type {
        NetDataType::UInt8 => 1,
        NetDataType::UInt16 => 2,
        NetDataType::UInt32 | NetDataType::Float32 => 4,
        NetDataType::Unsupported => return None,
    };
    if voxels.len() % elem != 0 {
        return None;
    }

    let values = match net_type {
        NetDataType::UInt8 => voxels.iter().map(|&v| v as f64).collect(),
        NetDataType::UInt16 => voxels
            .chunks_exact(elem)
            .map(|c| bytemuck::pod_read_unaligned::<u16>(c) as f64)
            .collect(),
        NetDataType::UInt32 => voxels
            .chunks_exact(elem)
            .map(|c| bytemuck::pod_read_unaligned::<u32>(c) as f64)
            .collect(),
        NetDataType::Float32 => voxels
            .chunks_exact(elem)
            .map(|c| bytemuck::pod_read_unaligned::<f32>(c) as f64)
            .collect(),
        NetDataType::Unsupported => return None,
    };
    Some(values)
}

/// Extrema of the scalars and of the gradient magnitude over a brick
///
/// The gradient uses central differences; at brick boundaries the
/// neighbour index is clamped and the divisor shrinks to match, giving a
/// one-sided difference. An axis one voxel thick contributes no gradient.
pub fn compute_minmax(values: &[f64], voxel_count: UVec3) -> Option<MinMaxRecord> {
    let (nx, ny, nz) = (voxel_count.x as usize, voxel_count.y as usize, voxel_count.z as usize);
    if values.is_empty() || values.len() != nx * ny * nz {
        return None;
    }

    let at = |x: usize, y: usize, z: usize| values[x + y * nx + z * nx * ny];
    let diff = |i: usize, n: usize, sample: &dyn Fn(usize) -> f64| -> f64 {
        let lo = i.saturating_sub(1);
        let hi = (i + 1).min(n - 1);
        if hi == lo {
            0.0
        } else {
            (sample(hi) - sample(lo)) / (hi - lo) as f64
        }
    };

    let mut record = MinMaxRecord {
        scalar_min: f64::INFINITY,
        scalar_max: f64::NEG_INFINITY,
        gradient_min: f64::INFINITY,
        gradient_max: f64::NEG_INFINITY,
    };

    for z in 0..nz {
        for y in 0..ny {
            for x in 0..nx {
                let v = at(x, y, z);
                record.scalar_min = record.scalar_min.min(v);
                record.scalar_max = record.scalar_max.max(v);

                let gx = diff(x, nx, &|i| at(i, y, z));
                let gy = diff(y, ny, &|i| at(x, i, z));
                let gz = diff(z, nz, &|i| at(x, y, i));
                let magnitude = (gx * gx + gy * gy + gz * gz).sqrt();
                record.gradient_min = record.gradient_min.min(magnitude);
                record.gradient_max = record.gradient_max.max(magnitude);
            }
        }
    }

    Some(record)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_brick_has_zero_gradient() {
        let values = vec![3.0; 27];
        let record = compute_minmax(&values, UVec3::splat(3)).unwrap();
        assert_eq!(record.scalar_min, 3.0);
        assert_eq!(record.scalar_max, 3.0);
        assert_eq!(record.gradient_min, 0.0);
        assert_eq!(record.gradient_max, 0.0);
    }

    #[test]
    fn test_linear_ramp_uses_one_sided_boundaries() {
        // f(x) = 2x along x; every difference, central or one-sided, is 2
        let values: Vec<f64> = (0..4).map(|x| 2.0 * x as f64).collect();
        let record = compute_minmax(&values, UVec3::new(4, 1, 1)).unwrap();
        assert_eq!(record.scalar_min, 0.0);
        assert_eq!(record.scalar_max, 6.0);
        assert_eq!(record.gradient_min, 2.0);
        assert_eq!(record.gradient_max, 2.0);
    }

    #[test]
    fn test_step_gradient() {
        // [0, 0, 10]: x=0 -> 0, x=1 -> (10-0)/2 = 5, x=2 -> (10-0)/1 = 10
        let values = vec![0.0, 0.0, 10.0];
        let record = compute_minmax(&values, UVec3::new(3, 1, 1)).unwrap();
        assert_eq!(record.gradient_min, 0.0);
        assert_eq!(record.gradient_max, 10.0);
    }

    #[test]
    fn test_decode_scalars() {
        let raw: Vec<u8> = [1u16, 500, 65535].iter().flat_map(|v| v.to_ne_bytes()).collect();
        assert_eq!(
            decode_scalars(&raw, NetDataType::UInt16).unwrap(),
            vec![1.0, 500.0, 65535.0]
        );
        let floats: Vec<u8> = [-1.5f32, 2.0].iter().flat_map(|v| v.to_ne_bytes()).collect();
        assert_eq!(decode_scalars(&floats, NetDataType::Float32).unwrap(), vec![-1.5, 2.0]);
        assert!(decode_scalars(&raw[..5], NetDataType::UInt16).is_none());
        assert!(decode_scalars(&raw, NetDataType::Unsupported).is_none());
    }

    #[test]
    fn test_size_mismatch() {
        assert!(compute_minmax(&[1.0, 2.0], UVec3::splat(2)).is_none());
    }
}
