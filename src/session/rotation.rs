//! View-driven brick streams
//!
//! A `Rotation` command hands the server a view matrix. A [`BrickSelector`]
//! turns it into an ordered list of brick keys, which a [`RotationCursor`]
//! then cuts into batches of at most `batch_size` bricks. The client pulls
//! one batch per `NextBatch` command until the cursor runs dry or the
//! stream is cancelled.

use glam::{Mat4, Vec3};
use rkyv::{Archive, Deserialize, Serialize};

use crate::compression::CompressedBrick;
use crate::store::{BrickKey, DatasetMetadata};
use crate::wire::wire_record;

/// Bricks the server will stream for one rotation, in delivery order
#[derive(Archive, Deserialize, Serialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct RotateInfo {
    pub keys: Vec<BrickKey>,
}

/// Header of one batch; the payloads follow it in the same response
#[derive(Archive, Deserialize, Serialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchInfo {
    pub keys: Vec<BrickKey>,
    /// Voxel element count of each brick
    pub brick_sizes: Vec<u64>,
    /// False on the last batch of the stream
    pub more_data_coming: bool,
}

wire_record!(RotateInfo, BatchInfo);

/// One delivered batch
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    pub info: BatchInfo,
    pub bricks: Vec<CompressedBrick>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.bricks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bricks.is_empty()
    }

    /// Keys paired with their payloads
    pub fn iter(&self) -> impl Iterator<Item = (BrickKey, &CompressedBrick)> {
        self.info.keys.iter().copied().zip(&self.bricks)
    }
}

/// Visibility policy: which bricks to stream for a view, and in what order
pub trait BrickSelector: Send + Sync {
    fn select(&self, metadata: &DatasetMetadata, view: &Mat4) -> Vec<BrickKey>;
}

/// Every brick of one LOD, nearest to the eye first
///
/// With no LOD configured the coarsest level is used. Ties are broken by
/// linear index so the order is deterministic.
#[derive(Debug, Clone, Copy, Default)]
pub struct FrontToBackSelector {
    pub lod: Option<u32>,
}

impl FrontToBackSelector {
    pub fn new(lod: Option<u32>) -> Self {
        Self { lod }
    }
}

impl BrickSelector for FrontToBackSelector {
    fn select(&self, metadata: &DatasetMetadata, view: &Mat4) -> Vec<BrickKey> {
        let Some(coarsest) = metadata.lod_count().checked_sub(1) else {
            return Vec::new();
        };
        let lod = self.lod.map_or(coarsest, |lod| lod.min(coarsest));
        let eye = view.inverse().transform_point3(Vec3::ZERO);

        let mut bricks: Vec<(f32, BrickKey)> = metadata
            .bricks_in_lod(lod)
            .map(|b| (b.center().distance_squared(eye), b.key))
            .collect();
        bricks.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.index.cmp(&b.1.index)));
        bricks.into_iter().map(|(_, key)| key).collect()
    }
}

/// Server-side position within an active rotation stream
#[derive(Debug, Clone)]
pub struct RotationCursor {
    keys: Vec<BrickKey>,
    next: usize,
    batch_size: usize,
}

impl RotationCursor {
    /// `batch_size` is clamped to at least one brick
    pub fn new(keys: Vec<BrickKey>, batch_size: u32) -> Self {
        Self {
            keys,
            next: 0,
            batch_size: batch_size.max(1) as usize,
        }
    }

    pub fn keys(&self) -> &[BrickKey] {
        &self.keys
    }

    pub fn remaining(&self) -> usize {
        self.keys.len() - self.next
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining() == 0
    }

    /// Keys of the next batch; empty once exhausted
    pub fn next_batch(&mut self) -> &[BrickKey] {
        let start = self.next;
        self.next = (start + self.batch_size).min(self.keys.len());
        &self.keys[start..self.next]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::LayoutKind;
    use crate::store::{BrickMetadata, LodGrid, TypeInfo};
    use crate::wire::WireRecord;
    use glam::UVec3;

    fn two_lod_metadata() -> DatasetMetadata {
        let mut bricks = Vec::new();
        for index in 0..8u64 {
            let pos = UVec3::new(index as u32 % 2, (index as u32 / 2) % 2, index as u32 / 4);
            bricks.push(BrickMetadata::new(
                BrickKey::new(0, index),
                pos.as_vec3() + Vec3::splat(0.5),
                Vec3::ONE,
                UVec3::splat(4),
            ));
        }
        bricks.push(BrickMetadata::new(
            BrickKey::new(1, 0),
            Vec3::ONE,
            Vec3::splat(2.0),
            UVec3::splat(4),
        ));
        DatasetMetadata {
            lods: vec![
                LodGrid::new(UVec3::splat(2), LayoutKind::Scanline),
                LodGrid::new(UVec3::ONE, LayoutKind::Scanline),
            ],
            bricks,
            type_info: TypeInfo::U8,
        }
    }

    #[test]
    fn test_cursor_batches() {
        let keys: Vec<BrickKey> = (0..7).map(|i| BrickKey::new(0, i)).collect();
        let mut cursor = RotationCursor::new(keys, 3);
        assert_eq!(cursor.next_batch().len(), 3);
        assert_eq!(cursor.next_batch().len(), 3);
        assert_eq!(cursor.remaining(), 1);
        assert_eq!(cursor.next_batch(), &[BrickKey::new(0, 6)]);
        assert!(cursor.is_exhausted());
        assert!(cursor.next_batch().is_empty());
    }

    #[test]
    fn test_zero_batch_size_clamped() {
        let mut cursor = RotationCursor::new(vec![BrickKey::new(0, 0), BrickKey::new(0, 1)], 0);
        assert_eq!(cursor.next_batch().len(), 1);
    }

    #[test]
    fn test_selector_defaults_to_coarsest_lod() {
        let meta = two_lod_metadata();
        let keys = FrontToBackSelector::default().select(&meta, &Mat4::IDENTITY);
        assert_eq!(keys, vec![BrickKey::new(1, 0)]);
    }

    #[test]
    fn test_selector_orders_front_to_back() {
        let meta = two_lod_metadata();
        let selector = FrontToBackSelector::new(Some(0));

        // Identity view: the eye sits at the origin, next to brick 0
        let keys = selector.select(&meta, &Mat4::IDENTITY);
        assert_eq!(keys.len(), 8);
        assert_eq!(keys.first(), Some(&BrickKey::new(0, 0)));
        assert_eq!(keys.last(), Some(&BrickKey::new(0, 7)));

        // Eye moved to (3, 3, 3): the far corner brick comes first
        let view = Mat4::from_translation(Vec3::splat(-3.0));
        let keys = selector.select(&meta, &view);
        assert_eq!(keys.first(), Some(&BrickKey::new(0, 7)));
        assert_eq!(keys.last(), Some(&BrickKey::new(0, 0)));
    }

    #[test]
    fn test_selector_clamps_lod() {
        let meta = two_lod_metadata();
        let keys = FrontToBackSelector::new(Some(9)).select(&meta, &Mat4::IDENTITY);
        assert_eq!(keys, vec![BrickKey::new(1, 0)]);
    }

    #[test]
    fn test_batch_info_record() {
        let info = BatchInfo {
            keys: vec![BrickKey::new(0, 1), BrickKey::new(0, 2)],
            brick_sizes: vec![64, 64],
            more_data_coming: true,
        };
        let bytes = info.to_record_bytes().unwrap();
        assert_eq!(BatchInfo::from_record_bytes(&bytes).unwrap(), info);
    }
}
